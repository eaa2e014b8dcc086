//! Integration tests running the shipped corpus through the real toolchain.
//!
//! Every test skips itself when no `cc` is installed.

use featcheck_core::{Harness, HarnessConfig, OutcomeKind, Report};
use std::path::{Path, PathBuf};

fn corpus_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../corpus")
}

fn have_cc() -> bool {
    let available = std::process::Command::new("cc")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("skipping: no `cc` toolchain available");
    }
    available
}

fn config(root: &Path) -> HarnessConfig {
    let mut config = HarnessConfig {
        root: root.to_path_buf(),
        jobs: 4,
        ..Default::default()
    };
    config.sandbox.timeout_ms = 5_000;
    config
}

/// Copy the corpus into a scratch directory so tests can add or edit files.
fn scratch_corpus() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    copy_tree(&corpus_root(), dir.path());
    dir
}

fn copy_tree(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}

fn kind_of(report: &Report, id: &str) -> OutcomeKind {
    report
        .outcomes
        .iter()
        .find(|o| o.exemplar == id)
        .unwrap_or_else(|| panic!("no outcome for {}", id))
        .kind
}

async fn run(config: HarnessConfig) -> Report {
    Harness::new(config).run().await.expect("harness run failed")
}

/// Test: every shipped exemplar passes against its fixture
#[tokio::test]
async fn test_corpus_all_pass() {
    if !have_cc() {
        return;
    }

    let report = run(config(&corpus_root())).await;

    assert!(report.success, "{}", report.render_text());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.outcomes.len(), 14);
    assert_eq!(report.categories["tests"].pass, 13);
    assert_eq!(report.categories["tests2"].pass, 1);
    assert_ne!(report.run.toolchain, "");
}

/// Test: two runs over an unchanged corpus agree outcome for outcome
#[tokio::test]
async fn test_runs_are_deterministic() {
    if !have_cc() {
        return;
    }

    let first = run(config(&corpus_root())).await;
    let second = run(config(&corpus_root())).await;

    let kinds = |r: &Report| {
        r.outcomes
            .iter()
            .map(|o| (o.exemplar.clone(), o.kind))
            .collect::<Vec<_>>()
    };
    assert_eq!(kinds(&first), kinds(&second));
    assert_eq!(first.run.corpus_digest, second.run.corpus_digest);
    assert_ne!(first.run.run_id, second.run.run_id);
    assert_eq!(kind_of(&first, "tests/pointer.c"), OutcomeKind::Pass);
}

/// Test: concurrent runs that write the same relative file never see each other
#[tokio::test]
async fn test_concurrent_file_io_is_isolated() {
    if !have_cc() {
        return;
    }

    let corpus = scratch_corpus();
    let tests = corpus.path().join("tests");
    std::fs::copy(tests.join("file_io.c"), tests.join("file_io_copy.c")).unwrap();
    std::fs::copy(tests.join("file_io.stdout"), tests.join("file_io_copy.stdout")).unwrap();

    // Appends, so a shared working directory would show more than one line.
    let append = r#"#include "io.c"
int main(void) {
  FILE *f = fopen("test.txt", "a");
  if (f == NULL) return 1;
  fprintf(f, "x\n");
  fclose(f);
  f = fopen("test.txt", "r");
  int lines = 0, c;
  while ((c = fgetc(f)) != EOF) if (c == '\n') lines++;
  fclose(f);
  printf("lines: %d\n", lines);
  return 0;
}
"#;
    for name in ["append_a", "append_b", "append_c"] {
        std::fs::write(tests.join(format!("{}.c", name)), append).unwrap();
        std::fs::write(tests.join(format!("{}.stdout", name)), "lines: 1\n").unwrap();
    }

    let mut config = config(corpus.path());
    config.jobs = 2;
    let report = run(config).await;

    for id in [
        "tests/file_io.c",
        "tests/file_io_copy.c",
        "tests/append_a.c",
        "tests/append_b.c",
        "tests/append_c.c",
    ] {
        assert_eq!(kind_of(&report, id), OutcomeKind::Pass, "{}", report.render_text());
    }
    assert!(!corpus.path().join("test.txt").exists());
    assert!(!tests.join("test.txt").exists());
}

/// Test: an infinite loop is classified as a timeout and does not hold up the run
#[tokio::test]
async fn test_infinite_loop_times_out() {
    if !have_cc() {
        return;
    }

    let corpus = scratch_corpus();
    std::fs::write(
        corpus.path().join("tests/spin.c"),
        "#include \"io.c\"\nint main(void) { volatile int x = 0; for (;;) { x++; } return 0; }\n",
    )
    .unwrap();

    let mut config = config(corpus.path());
    config.sandbox.timeout_ms = 500;
    let report = run(config).await;

    let spin = report
        .outcomes
        .iter()
        .find(|o| o.exemplar == "tests/spin.c")
        .unwrap();
    assert_eq!(spin.kind, OutcomeKind::Timeout);
    assert!(spin.duration_ms < 30_000, "took {}ms", spin.duration_ms);
    assert_eq!(report.totals.pass, 14);
    assert_eq!(report.exit_code(), 1);
}

/// Test: a syntax error only affects its own exemplar
#[tokio::test]
async fn test_compile_failure_is_isolated() {
    if !have_cc() {
        return;
    }

    let corpus = scratch_corpus();
    std::fs::write(
        corpus.path().join("tests/broken.c"),
        "#include \"io.c\"\nint main(void) { int x = 1 return x; }\n",
    )
    .unwrap();

    let report = run(config(corpus.path())).await;

    let broken = report
        .outcomes
        .iter()
        .find(|o| o.exemplar == "tests/broken.c")
        .unwrap();
    assert_eq!(broken.kind, OutcomeKind::CompileFailure);
    assert!(broken.detail.as_deref().unwrap_or("").contains("broken.c"));
    assert_eq!(report.totals.compile_failure, 1);
    assert_eq!(report.totals.pass, 14);
    assert!(report.summary_line().contains("1 compile failure(s)"));
}

/// Test: the loop exemplar must print exactly 55 for each method
#[tokio::test]
async fn test_loop_off_by_one_is_mismatch() {
    if !have_cc() {
        return;
    }

    for wrong in ["54", "56"] {
        let corpus = scratch_corpus();
        let fixture = corpus.path().join("tests/loop.stdout");
        let expected = std::fs::read_to_string(&fixture).unwrap();
        std::fs::write(&fixture, expected.replace(": 55", &format!(": {}", wrong))).unwrap();

        let mut config = config(corpus.path());
        config.categories = vec!["tests".to_string()];
        let report = run(config).await;

        let looped = report
            .outcomes
            .iter()
            .find(|o| o.exemplar == "tests/loop.c")
            .unwrap();
        assert_eq!(looped.kind, OutcomeKind::RuntimeMismatch);
        assert!(looped.explanation.contains("line 1"), "{}", looped.explanation);
        assert_eq!(report.totals.runtime_mismatch, 1);
    }
}

/// Test: the bitwise exemplar reports the expected values for a=5, b=3
#[tokio::test]
async fn test_bitwise_exemplar() {
    if !have_cc() {
        return;
    }

    let mut config = config(&corpus_root());
    config.categories = vec!["tests2".to_string()];
    let report = run(config).await;

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(kind_of(&report, "tests2/bitwise.c"), OutcomeKind::Pass);

    let fixture = std::fs::read_to_string(corpus_root().join("tests2/bitwise.stdout")).unwrap();
    for value in ["= 1\n", "= 7\n", "= 6\n", "= -6\n", "= 10\n", "= 2\n"] {
        assert!(fixture.contains(value), "missing {:?}", value);
    }
}

/// Test: a missing toolchain fails the run instead of producing outcomes
#[tokio::test]
async fn test_missing_toolchain_fails_run() {
    let mut config = config(&corpus_root());
    config.toolchain.program = "featcheck-no-such-cc".to_string();

    let err = Harness::new(config).run().await.unwrap_err();
    assert!(err.to_string().contains("featcheck-no-such-cc"));
}
