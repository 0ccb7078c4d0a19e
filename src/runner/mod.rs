//! Checkpointed parallel job runner
//!
//! One job per (variant, query). Variants run one after another; the jobs of
//! a variant run concurrently, bounded by a semaphore. Every outcome is
//! appended to the variant's checkpoint log before it counts, so a crashed
//! run resumes with only the missing queries.

pub mod checkpoint;
pub mod report;

use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::EvalConfig;
use crate::errors::{EvalError, Result};
use crate::metrics::{evaluate, ranked_doc_ids};
use crate::strategy::{CompiledStrategy, PipelineExecutor, PipelineServices, StrategyContext, StrategyVariant};
use crate::types::{Document, EvaluationResult, TestCase};

pub use checkpoint::{checkpoint_path, validate_path_id, CheckpointHeader, CheckpointLog, CheckpointRecord, CheckpointState, FailedQuery};
pub use report::{RunReport, VariantReport};

/// Runner settings
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Maximum jobs in flight
    pub concurrency: usize,
    pub k_values: Vec<usize>,
    pub checkpoint_dir: PathBuf,
    /// Resume this run instead of starting a new one
    pub run_id: Option<String>,
    /// Name of the dataset under evaluation
    pub test_id: String,
}

impl RunnerOptions {
    pub fn from_config(config: &EvalConfig, test_id: impl Into<String>) -> Self {
        Self {
            concurrency: config.runner.concurrency,
            k_values: config.runner.k_values.clone(),
            checkpoint_dir: config.checkpoint_dir(),
            run_id: None,
            test_id: test_id.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(EvalError::ConfigError("concurrency must be greater than 0".into()));
        }
        if self.k_values.is_empty() || self.k_values.contains(&0) {
            return Err(EvalError::ConfigError("k values must be non-empty and greater than 0".into()));
        }
        if let Some(run_id) = &self.run_id {
            validate_path_id("run", run_id)?;
        }
        Ok(())
    }
}

/// Requests a graceful stop: in-flight jobs finish, nothing new is dispatched
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reported after every finished job
#[derive(Debug, Clone)]
pub struct JobProgress {
    pub variant_id: String,
    pub query_id: String,
    pub succeeded: bool,
    /// Queries of this variant with an outcome, including resumed ones
    pub done: usize,
    pub total: usize,
}

pub type ProgressHook = Arc<dyn Fn(&JobProgress) + Send + Sync>;

enum JobOutcome {
    Completed(EvaluationResult),
    Failed(FailedQuery),
}

/// Run the pipeline for one query and score the final list
pub async fn evaluate_query(
    strategy: &CompiledStrategy,
    services: &PipelineServices,
    documents: Arc<Vec<Document>>,
    test_case: &TestCase,
    k_values: &[usize],
) -> Result<EvaluationResult> {
    let ctx = StrategyContext::new(test_case, documents);
    let output = strategy.run(ctx, services).await?;
    let ranked = ranked_doc_ids(&output.retrieved_docs);
    let metrics = evaluate(&ranked, &test_case.judgments(), k_values);

    Ok(EvaluationResult {
        query_id: test_case.id.clone(),
        retrieved_docs: output.retrieved_docs,
        metrics,
        usage_latency_ms: output.total_ms,
        stage_timings: output.context.stage_timings,
    })
}

/// Shared inputs of every job in one variant
struct VariantJobs {
    variant_id: String,
    strategy: Arc<CompiledStrategy>,
    services: PipelineServices,
    documents: Arc<Vec<Document>>,
    k_values: Arc<Vec<usize>>,
    log: Arc<CheckpointLog>,
    done: Arc<AtomicUsize>,
    total: usize,
    progress: Option<ProgressHook>,
}

impl VariantJobs {
    async fn run_one(&self, test_case: TestCase) -> Result<JobOutcome> {
        let outcome = match evaluate_query(
            &self.strategy,
            &self.services,
            self.documents.clone(),
            &test_case,
            &self.k_values,
        )
        .await
        {
            Ok(result) => {
                self.log.record_completed(&result).await?;
                JobOutcome::Completed(result)
            }
            Err(e) => {
                warn!(variant = %self.variant_id, query_id = %test_case.id, error = %e, "job failed");
                let error = e.to_string();
                self.log.record_failed(&test_case.id, &error).await?;
                JobOutcome::Failed(FailedQuery {
                    query_id: test_case.id.clone(),
                    error,
                })
            }
        };

        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.progress {
            hook(&JobProgress {
                variant_id: self.variant_id.clone(),
                query_id: test_case.id,
                succeeded: matches!(outcome, JobOutcome::Completed(_)),
                done,
                total: self.total,
            });
        }
        Ok(outcome)
    }
}

/// Schedules pipeline jobs and aggregates their results
pub struct JobRunner {
    executor: PipelineExecutor,
    services: PipelineServices,
    options: RunnerOptions,
    stop: StopHandle,
    progress: Option<ProgressHook>,
}

impl JobRunner {
    pub fn new(executor: PipelineExecutor, services: PipelineServices, options: RunnerOptions) -> Self {
        Self {
            executor,
            services,
            options,
            stop: StopHandle::default(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Evaluate every variant over every test case.
    ///
    /// Configuration errors abort before any job runs. Job failures are
    /// recorded per query and never stop the run.
    #[instrument(skip_all, fields(variants = variants.len(), queries = test_cases.len()))]
    pub async fn run(
        &self,
        variants: &[StrategyVariant],
        documents: Arc<Vec<Document>>,
        test_cases: &[TestCase],
    ) -> Result<RunReport> {
        self.options.validate()?;

        let mut seen = HashSet::new();
        for test_case in test_cases {
            if !seen.insert(test_case.id.as_str()) {
                return Err(EvalError::ConfigError(format!("duplicate query id '{}'", test_case.id)));
            }
        }

        for variant in variants {
            validate_path_id("variant", &variant.id)?;
        }
        let compiled = variants
            .iter()
            .map(|variant| self.executor.compile(&variant.stages).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let run_id = self
            .options
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let started_at = Utc::now();
        info!(run_id = %run_id, "starting evaluation run");

        let mut reports = Vec::with_capacity(variants.len());
        for (variant, strategy) in variants.iter().zip(compiled) {
            let report = self
                .run_variant(&run_id, variant, strategy, documents.clone(), test_cases)
                .await?;
            info!(
                variant = %report.variant_id,
                succeeded = report.succeeded,
                failed = report.failed,
                pending = report.pending,
                "variant finished"
            );
            reports.push(report);
            if self.stop.is_stopped() {
                break;
            }
        }

        Ok(RunReport {
            run_id,
            test_id: self.options.test_id.clone(),
            started_at,
            finished_at: Utc::now(),
            k_values: self.options.k_values.clone(),
            interrupted: self.stop.is_stopped(),
            variants: reports,
        })
    }

    async fn run_variant(
        &self,
        run_id: &str,
        variant: &StrategyVariant,
        strategy: Arc<CompiledStrategy>,
        documents: Arc<Vec<Document>>,
        test_cases: &[TestCase],
    ) -> Result<VariantReport> {
        let path = checkpoint_path(&self.options.checkpoint_dir, run_id, &variant.id);
        let header = CheckpointHeader::new(run_id, &self.options.test_id, &variant.id);
        let (log, mut resumed) = CheckpointLog::open(path, header).await?;

        // outcomes for queries outside this query set do not count
        let wanted: HashSet<&str> = test_cases.iter().map(|t| t.id.as_str()).collect();
        resumed.completed.retain(|r| wanted.contains(r.query_id.as_str()));
        resumed.failed.retain(|f| wanted.contains(f.query_id.as_str()));

        let done_ids = resumed.done_ids();
        let remaining: Vec<&TestCase> = test_cases.iter().filter(|t| !done_ids.contains(&t.id)).collect();
        if !resumed.is_empty() {
            info!(variant = %variant.id, resumed = resumed.len(), remaining = remaining.len(), "resuming from checkpoint");
        }

        let jobs = Arc::new(VariantJobs {
            variant_id: variant.id.clone(),
            strategy,
            services: self.services.clone(),
            documents,
            k_values: Arc::new(self.options.k_values.clone()),
            log: Arc::new(log),
            done: Arc::new(AtomicUsize::new(resumed.len())),
            total: test_cases.len(),
            progress: self.progress.clone(),
        });

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut join_set = JoinSet::new();
        for test_case in remaining {
            if self.stop.is_stopped() {
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EvalError::Generic(format!("worker pool closed: {e}")))?;
            if self.stop.is_stopped() {
                break;
            }
            let jobs = jobs.clone();
            let test_case = test_case.clone();
            join_set.spawn(async move {
                let _permit = permit;
                jobs.run_one(test_case).await
            });
        }

        let CheckpointState {
            mut completed,
            mut failed,
        } = resumed;
        let mut fatal: Option<EvalError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(JobOutcome::Completed(result))) => completed.push(result),
                Ok(Ok(JobOutcome::Failed(failure))) => failed.push(failure),
                Ok(Err(e)) => {
                    error!(variant = %variant.id, error = %e, "checkpoint write failed, aborting variant");
                    join_set.abort_all();
                    fatal.get_or_insert(e);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    // left without an outcome so a resumed run retries it
                    error!(variant = %variant.id, error = %e, "job panicked");
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        Ok(VariantReport::from_outcomes(
            &variant.id,
            &variant.description,
            test_cases.len(),
            completed,
            failed,
        ))
    }
}
