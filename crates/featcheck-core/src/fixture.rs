//! Fixture declarations: the expected outcome paired with an exemplar.
//!
//! A fixture is a capability, not a schema: anything that can produce an
//! optional expected stdout and an optional expected exit code implements
//! [`FixtureSource`]. Two mechanisms ship with the harness:
//!
//! - [`SiblingFiles`]: `<stem>.stdout` (exact bytes) and `<stem>.exit`
//!   (decimal integer) next to the source file.
//! - [`EmbeddedComment`]: a `/* featcheck:expect ... */` block inside the
//!   source file.
//!
//! Sources are consulted in order; for each field the first declaration wins.

use std::path::{Path, PathBuf};

use crate::error::DiscoveryError;

/// Token marking a volatile, address-dependent value in expected stdout.
pub const ADDR_WILDCARD: &str = "{{addr}}";

/// Opening line of an embedded fixture block.
pub const EMBEDDED_MARKER: &str = "/* featcheck:expect";

/// The declared expected outcome for one exemplar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureDecl {
    /// Exact expected stdout, possibly containing [`ADDR_WILDCARD`] tokens.
    pub expected_stdout: Option<Vec<u8>>,
    /// Expected exit code (absent means 0).
    pub expected_exit: Option<i32>,
}

impl FixtureDecl {
    /// Whether every field has been declared.
    pub fn is_complete(&self) -> bool {
        self.expected_stdout.is_some() && self.expected_exit.is_some()
    }

    /// Fill the fields this declaration leaves open from `fallback`.
    pub fn or(self, fallback: FixtureDecl) -> FixtureDecl {
        FixtureDecl {
            expected_stdout: self.expected_stdout.or(fallback.expected_stdout),
            expected_exit: self.expected_exit.or(fallback.expected_exit),
        }
    }
}

/// Anything that can declare an expected outcome for a source file.
pub trait FixtureSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Load the declaration for `source`. Returns an empty declaration when
    /// this mechanism has nothing to say about the file.
    fn load(&self, source: &Path) -> Result<FixtureDecl, DiscoveryError>;
}

/// Sibling fixture files: `<stem>.stdout` and `<stem>.exit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiblingFiles;

impl SiblingFiles {
    /// Path of the expected-stdout file for `source`.
    pub fn stdout_path(source: &Path) -> PathBuf {
        source.with_extension("stdout")
    }

    /// Path of the expected-exit-code file for `source`.
    pub fn exit_path(source: &Path) -> PathBuf {
        source.with_extension("exit")
    }
}

impl FixtureSource for SiblingFiles {
    fn name(&self) -> &'static str {
        "sibling_files"
    }

    fn load(&self, source: &Path) -> Result<FixtureDecl, DiscoveryError> {
        let expected_stdout = read_optional(&Self::stdout_path(source))?;

        let exit_path = Self::exit_path(source);
        let expected_exit = match read_optional(&exit_path)? {
            Some(bytes) => Some(parse_exit_code(&exit_path, &String::from_utf8_lossy(&bytes))?),
            None => None,
        };

        Ok(FixtureDecl {
            expected_stdout,
            expected_exit,
        })
    }
}

/// Fixture embedded in the source as a block comment:
///
/// ```text
/// /* featcheck:expect
/// exit: 0
/// stdout:
/// Sum: 55
/// */
/// ```
///
/// Every line after `stdout:` up to the closing `*/` line is one expected
/// stdout line, terminated by `\n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedComment;

impl FixtureSource for EmbeddedComment {
    fn name(&self) -> &'static str {
        "embedded_comment"
    }

    fn load(&self, source: &Path) -> Result<FixtureDecl, DiscoveryError> {
        let bytes = std::fs::read(source).map_err(|e| DiscoveryError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        parse_embedded(source, &String::from_utf8_lossy(&bytes))
    }
}

/// The fixture sources consulted by default, in precedence order.
pub fn default_sources() -> Vec<Box<dyn FixtureSource>> {
    vec![Box::new(SiblingFiles), Box::new(EmbeddedComment)]
}

/// Merge the declarations of every source for `source`, first one wins.
pub fn resolve(
    sources: &[Box<dyn FixtureSource>],
    source: &Path,
) -> Result<FixtureDecl, DiscoveryError> {
    let mut decl = FixtureDecl::default();
    for fixture_source in sources {
        if decl.is_complete() {
            break;
        }
        let loaded = fixture_source.load(source)?;
        if loaded != FixtureDecl::default() {
            tracing::trace!(
                source = %source.display(),
                mechanism = fixture_source.name(),
                "Loaded fixture declaration"
            );
        }
        decl = decl.or(loaded);
    }
    Ok(decl)
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, DiscoveryError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DiscoveryError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn parse_exit_code(path: &Path, text: &str) -> Result<i32, DiscoveryError> {
    text.trim()
        .parse::<i32>()
        .map_err(|e| DiscoveryError::InvalidFixture {
            path: path.to_path_buf(),
            reason: format!("exit code {:?} is not an integer: {}", text.trim(), e),
        })
}

fn parse_embedded(path: &Path, text: &str) -> Result<FixtureDecl, DiscoveryError> {
    let mut lines = text.lines();
    if !lines.by_ref().any(|line| line.trim() == EMBEDDED_MARKER) {
        return Ok(FixtureDecl::default());
    }

    let mut decl = FixtureDecl::default();
    let mut stdout: Option<Vec<u8>> = None;

    for line in lines {
        if line.trim() == "*/" {
            decl.expected_stdout = stdout;
            return Ok(decl);
        }

        if let Some(buf) = stdout.as_mut() {
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
            continue;
        }

        let directive = line.trim();
        if directive.is_empty() {
            continue;
        }
        if directive == "stdout:" {
            stdout = Some(Vec::new());
        } else if let Some(code) = directive.strip_prefix("exit:") {
            decl.expected_exit = Some(parse_exit_code(path, code)?);
        } else {
            return Err(DiscoveryError::InvalidFixture {
                path: path.to_path_buf(),
                reason: format!("unknown directive {:?}", directive),
            });
        }
    }

    Err(DiscoveryError::InvalidFixture {
        path: path.to_path_buf(),
        reason: "unterminated featcheck:expect block".to_string(),
    })
}
