//! Integration tests for embedeval
//!
//! Runs full evaluations through the job runner with in-process providers;
//! nothing here needs a network or a model download.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use embedeval::runner::{checkpoint_path, JobProgress};
use embedeval::strategy::presets::preset_names;
use embedeval::{
    Document, EmbeddingCache, EmbeddingProvider, EvalError, HashEmbeddingProvider, JobRunner, Judge,
    PipelineExecutor, PipelineServices, Result, RunnerOptions, StrategyVariant, TestCase,
};

/// Topic-axis embeddings: perfect for the two-document scenario
struct TopicProvider;

#[async_trait]
impl EmbeddingProvider for TopicProvider {
    fn name(&self) -> &str {
        "topic"
    }

    fn model(&self) -> &str {
        "axes-v1"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let ml = if text.contains("machine learning") { 1.0 } else { 0.0 };
        let bread = if text.contains("bread") { 1.0 } else { 0.0 };
        Ok(vec![ml, bread])
    }
}

/// Hash embeddings that fail for any text containing "explode"
struct FlakyProvider {
    inner: HashEmbeddingProvider,
}

#[async_trait]
impl EmbeddingProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        if text.contains("explode") {
            return Err(EvalError::ProviderError("upstream returned 503".into()));
        }
        self.inner.embed(text).await
    }
}

/// Judge that always fails
struct DownJudge;

#[async_trait]
impl Judge for DownJudge {
    async fn score(&self, _query: &str, _candidate: &str) -> Result<f64> {
        Err(EvalError::JudgeError("judge unavailable".into()))
    }
}

/// Hash embeddings that count provider calls
struct CountingProvider {
    inner: HashEmbeddingProvider,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }
}

fn options(dir: &TempDir, run_id: &str) -> RunnerOptions {
    RunnerOptions {
        concurrency: 3,
        k_values: vec![1, 5, 10],
        checkpoint_dir: dir.path().to_path_buf(),
        run_id: Some(run_id.to_string()),
        test_id: "integration".to_string(),
    }
}

fn corpus() -> Arc<Vec<Document>> {
    Arc::new(vec![
        Document::new("d1", "rust ownership rules and the borrow checker"),
        Document::new("d2", "sourdough bread needs a healthy starter"),
        Document::new("d3", "tokio runs async rust tasks on a thread pool"),
        Document::new("d4", "espresso extraction depends on grind size"),
        Document::new("d5", "vector databases index embeddings for search"),
    ])
}

fn queries() -> Vec<TestCase> {
    vec![
        TestCase::new("q1", "borrow checker ownership", ["d1"]),
        TestCase::new("q2", "sourdough starter", ["d2"]),
        TestCase::new("q3", "async tasks tokio", ["d3", "d1"]).with_scores(vec![2.0, 1.0]),
        TestCase::new("q4", "espresso grind", ["d4"]),
        TestCase::new("q5", "embeddings search index", ["d5"]),
    ]
}

fn hash_services() -> PipelineServices {
    PipelineServices::new().with_provider(Arc::new(HashEmbeddingProvider::default()))
}

#[tokio::test]
async fn test_baseline_with_perfect_embeddings() {
    let dir = TempDir::new().unwrap();
    let docs = Arc::new(vec![
        Document::new("d1", "machine learning basics"),
        Document::new("d2", "sourdough bread recipe"),
    ]);
    let cases = vec![TestCase::new("q1", "what is machine learning", ["d1"])];

    let runner = JobRunner::new(
        PipelineExecutor::default(),
        PipelineServices::new().with_provider(Arc::new(TopicProvider)),
        options(&dir, "e2e"),
    );
    let report = runner
        .run(&[StrategyVariant::preset("baseline").unwrap()], docs, &cases)
        .await
        .unwrap();

    let baseline = report.variant("baseline").unwrap();
    assert_eq!(baseline.succeeded, 1);
    assert_eq!(baseline.results[0].retrieved_docs[0].id, "d1");
    assert!(baseline.results[0].retrieved_docs[0].is_relevant);

    let at10 = &baseline.metrics[&10];
    assert_eq!(at10.ndcg, 1.0);
    assert_eq!(at10.recall, 1.0);
    assert_eq!(at10.mrr, 1.0);
}

#[tokio::test]
async fn test_every_preset_runs_end_to_end() {
    let dir = TempDir::new().unwrap();
    let variants: Vec<_> = preset_names()
        .into_iter()
        .map(|name| StrategyVariant::preset(name).unwrap())
        .collect();

    let runner = JobRunner::new(PipelineExecutor::default(), hash_services(), options(&dir, "presets"));
    let report = runner.run(&variants, corpus(), &queries()).await.unwrap();

    assert_eq!(report.variants.len(), variants.len());
    for variant in &report.variants {
        assert_eq!(variant.failed, 0, "{} had failures: {:?}", variant.variant_id, variant.failed_queries);
        assert_eq!(variant.succeeded, 5);
        for set in variant.metrics.values() {
            assert!((0.0..=1.0).contains(&set.ndcg));
            assert!((0.0..=1.0).contains(&set.recall));
        }
    }
}

#[tokio::test]
async fn test_resume_processes_only_missing_queries() {
    let variants = vec![
        StrategyVariant::preset("hybrid-bm25").unwrap(),
        StrategyVariant::preset("mmr-diversity").unwrap(),
    ];
    let all = queries();

    let fresh_dir = TempDir::new().unwrap();
    let fresh = JobRunner::new(PipelineExecutor::default(), hash_services(), options(&fresh_dir, "fresh"))
        .run(&variants, corpus(), &all)
        .await
        .unwrap();

    // a run that stopped after three queries
    let resume_dir = TempDir::new().unwrap();
    JobRunner::new(PipelineExecutor::default(), hash_services(), options(&resume_dir, "resumed"))
        .run(&variants, corpus(), &all[..3])
        .await
        .unwrap();

    let executed = Arc::new(AtomicUsize::new(0));
    let counter = executed.clone();
    let resumed = JobRunner::new(PipelineExecutor::default(), hash_services(), options(&resume_dir, "resumed"))
        .with_progress(Arc::new(move |_: &JobProgress| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .run(&variants, corpus(), &all)
        .await
        .unwrap();

    assert_eq!(executed.load(Ordering::SeqCst), 2 * variants.len());
    for variant in &variants {
        let a = fresh.variant(&variant.id).unwrap();
        let b = resumed.variant(&variant.id).unwrap();
        assert_eq!(b.succeeded, 5);
        assert_eq!(a.metrics, b.metrics);
    }
}

#[tokio::test]
async fn test_resume_after_torn_checkpoint_write() {
    let dir = TempDir::new().unwrap();
    let variants = vec![StrategyVariant::preset("baseline").unwrap()];
    let all = queries();

    JobRunner::new(PipelineExecutor::default(), hash_services(), options(&dir, "torn"))
        .run(&variants, corpus(), &all[..2])
        .await
        .unwrap();

    let path = checkpoint_path(dir.path(), "torn", "baseline");
    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str(r#"{"completed":{"queryId":"q3","retrievedDocs":[{"id":"#);
    std::fs::write(&path, contents).unwrap();

    let report = JobRunner::new(PipelineExecutor::default(), hash_services(), options(&dir, "torn"))
        .run(&variants, corpus(), &all)
        .await
        .unwrap();
    let baseline = report.variant("baseline").unwrap();
    assert_eq!(baseline.succeeded, 5);
    assert_eq!(baseline.results.len(), 5);
}

#[tokio::test]
async fn test_failures_are_isolated_per_query() {
    let dir = TempDir::new().unwrap();
    let mut cases = queries();
    cases.push(TestCase::new("q6", "explode the embedder", ["d1"]));

    let services = PipelineServices::new().with_provider(Arc::new(FlakyProvider {
        inner: HashEmbeddingProvider::default(),
    }));
    let variants = vec![
        StrategyVariant::preset("baseline").unwrap(),
        StrategyVariant::preset("fixed-chunks").unwrap(),
    ];
    let report = JobRunner::new(PipelineExecutor::default(), services, options(&dir, "flaky"))
        .run(&variants, corpus(), &cases)
        .await
        .unwrap();

    for variant in &report.variants {
        assert_eq!(variant.total, 6);
        assert_eq!(variant.succeeded, 5);
        assert_eq!(variant.failed, 1);
        assert_eq!(variant.failed_query_ids(), vec!["q6"]);
        assert!(variant.failed_queries[0].error.contains("503"));
    }
    assert_eq!(report.total_failed(), 2);

    // failed queries are not retried on resume
    let again = JobRunner::new(
        PipelineExecutor::default(),
        PipelineServices::new().with_provider(Arc::new(HashEmbeddingProvider::default())),
        options(&dir, "flaky"),
    )
    .run(&variants, corpus(), &cases)
    .await
    .unwrap();
    assert_eq!(again.variants[0].failed, 1);
}

#[tokio::test]
async fn test_judge_outage_does_not_fail_jobs() {
    let dir = TempDir::new().unwrap();
    let services = hash_services().with_judge(Arc::new(DownJudge));
    let report = JobRunner::new(PipelineExecutor::default(), services, options(&dir, "judge"))
        .run(&[StrategyVariant::preset("llm-reranked").unwrap()], corpus(), &queries())
        .await
        .unwrap();
    assert_eq!(report.variants[0].succeeded, 5);
}

#[tokio::test]
async fn test_cache_serves_second_run() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let cache = EmbeddingCache::open(cache_dir.path(), 1 << 20).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let services = PipelineServices::new()
        .with_provider(Arc::new(CountingProvider {
            inner: HashEmbeddingProvider::default(),
            calls: calls.clone(),
        }))
        .with_cache(cache.clone());
    let variants = vec![StrategyVariant::preset("baseline").unwrap()];

    let first = JobRunner::new(PipelineExecutor::default(), services.clone(), options(&dir, "cache-1"))
        .run(&variants, corpus(), &queries())
        .await
        .unwrap();
    let after_first = calls.load(Ordering::SeqCst);
    assert!(after_first > 0);

    let second = JobRunner::new(PipelineExecutor::default(), services, options(&dir, "cache-2"))
        .run(&variants, corpus(), &queries())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), after_first);
    assert_eq!(first.variants[0].metrics, second.variants[0].metrics);

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 10);
    assert!(stats.hits > 0);
}
