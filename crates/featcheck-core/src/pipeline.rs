//! Run orchestration: discovery, bounded parallel build/execute/compare, report.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::build::{BuildAdapter, ToolchainBuilder};
use crate::compare;
use crate::config::HarnessConfig;
use crate::error::{HarnessFault, HarnessResult};
use crate::outcome::{Outcome, OutcomeKind};
use crate::registry::{Exemplar, Registry};
use crate::report::Report;
use crate::run_spec::RunSpec;
use crate::sandbox::ExecutionSandbox;

/// Explanation recorded for exemplars cut off by the run-level deadline.
pub const RUN_TIMEOUT_EXPLANATION: &str = "run-level timeout exceeded";

/// Conformance harness orchestrator.
pub struct Harness {
    config: HarnessConfig,
    builder: Arc<dyn BuildAdapter>,
    sandbox: Arc<ExecutionSandbox>,
}

impl Harness {
    /// Create a harness that builds with the configured toolchain.
    pub fn new(config: HarnessConfig) -> Self {
        let builder = ToolchainBuilder::new(
            config.toolchain.clone(),
            config.root.clone(),
            config.sandbox.scratch_root(),
        );
        Self::with_builder(config, Arc::new(builder))
    }

    /// Create a harness with a custom build adapter.
    pub fn with_builder(config: HarnessConfig, builder: Arc<dyn BuildAdapter>) -> Self {
        let sandbox = Arc::new(ExecutionSandbox::new(config.sandbox.clone()));
        Self {
            config,
            builder,
            sandbox,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Registry over the configured root and categories.
    pub fn registry(&self) -> Registry {
        Registry::new(self.config.root.clone()).with_categories(self.config.categories.clone())
    }

    /// Execute a complete run.
    ///
    /// Discovery, configuration and harness faults abort the run; everything
    /// an exemplar does wrong ends up as an [`Outcome`] in the report.
    pub async fn run(&self) -> HarnessResult<Report> {
        let start = Instant::now();
        self.config.validate()?;

        let exemplars = self.registry().discover()?;
        let toolchain = self.builder.identify().await?;
        let run = RunSpec::new(
            self.config.root.clone(),
            self.config.categories.clone(),
            &exemplars,
            toolchain,
        )?;

        info!(
            run_id = %run.run_id,
            exemplars = exemplars.len(),
            jobs = self.config.jobs,
            toolchain = %run.toolchain,
            "Starting featcheck run"
        );

        let outcomes = self.execute_all(exemplars).await?;
        let report = Report::new(run, outcomes, start.elapsed().as_millis() as u64);

        if report.success {
            info!(run_id = %report.run.run_id, "{}", report.summary_line());
        } else {
            warn!(run_id = %report.run.run_id, "{}", report.summary_line());
        }
        Ok(report)
    }

    /// Run every exemplar through build, execute and compare, at most
    /// `jobs` at a time. Returns one outcome per exemplar, in completion
    /// order.
    pub async fn execute_all(&self, exemplars: Vec<Exemplar>) -> Result<Vec<Outcome>, HarnessFault> {
        let semaphore = Arc::new(Semaphore::new(self.config.jobs.max(1)));
        let mut pending: BTreeMap<String, Exemplar> = BTreeMap::new();
        let mut tasks: JoinSet<Result<Outcome, HarnessFault>> = JoinSet::new();

        for exemplar in exemplars {
            pending.insert(exemplar.id.clone(), exemplar.clone());

            let builder = Arc::clone(&self.builder);
            let sandbox = Arc::clone(&self.sandbox);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| HarnessFault::Worker("worker pool closed".to_string()))?;
                run_exemplar(builder.as_ref(), &sandbox, &exemplar).await
            });
        }

        let deadline = self.config.run_timeout_secs.and_then(|secs| {
            let deadline = tokio::time::Instant::now().checked_add(Duration::from_secs(secs));
            if deadline.is_none() {
                warn!(
                    run_timeout_secs = secs,
                    "Run timeout is unrepresentable; running without a deadline"
                );
            }
            deadline
        });

        let mut outcomes = Vec::with_capacity(pending.len());
        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(
                            remaining = pending.len(),
                            "Run-level timeout reached; cancelling remaining exemplars"
                        );
                        shutdown(&mut tasks, &mut pending, &mut outcomes).await;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok(Ok(outcome)) => {
                    pending.remove(&outcome.exemplar);
                    outcomes.push(outcome);
                }
                Ok(Err(fault)) => {
                    error!(error = %fault, "Harness fault; aborting run");
                    shutdown(&mut tasks, &mut pending, &mut outcomes).await;
                    return Err(fault);
                }
                Err(e) => {
                    error!(error = %e, "Worker task failed; aborting run");
                    shutdown(&mut tasks, &mut pending, &mut outcomes).await;
                    return Err(HarnessFault::Worker(e.to_string()));
                }
            }
        }

        for exemplar in pending.into_values() {
            outcomes.push(Outcome::new(&exemplar, OutcomeKind::Timeout, RUN_TIMEOUT_EXPLANATION));
        }

        Ok(outcomes)
    }
}

/// Cancel every task and wait until each has been dropped, so process-group
/// guards and scratch directories are released before returning. Outcomes
/// that completed in the meantime are kept.
async fn shutdown(
    tasks: &mut JoinSet<Result<Outcome, HarnessFault>>,
    pending: &mut BTreeMap<String, Exemplar>,
    outcomes: &mut Vec<Outcome>,
) {
    tasks.abort_all();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Ok(outcome)) = joined {
            pending.remove(&outcome.exemplar);
            outcomes.push(outcome);
        }
    }
}

/// Build, execute and classify a single exemplar.
pub async fn run_exemplar(
    builder: &dyn BuildAdapter,
    sandbox: &ExecutionSandbox,
    exemplar: &Exemplar,
) -> Result<Outcome, HarnessFault> {
    let start = Instant::now();
    debug!(exemplar = %exemplar.id, "Building exemplar");

    let artifact = builder.build(exemplar).await?;
    let execution = match artifact.binary() {
        Some(binary) => {
            debug!(exemplar = %exemplar.id, build_ms = artifact.duration_ms, "Executing artifact");
            Some(sandbox.execute(binary).await?)
        }
        None => None,
    };

    let outcome = compare::classify(exemplar, &artifact, execution.as_ref())
        .with_duration(start.elapsed());
    drop(artifact);

    if outcome.passed() {
        debug!(exemplar = %exemplar.id, duration_ms = outcome.duration_ms, "Exemplar passed");
    } else {
        info!(
            exemplar = %exemplar.id,
            kind = %outcome.kind,
            explanation = %outcome.explanation,
            "Exemplar did not pass"
        );
    }
    Ok(outcome)
}
