//! End-to-end pipeline flows with scripted providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use insightlens_rag::{
    AskOutcome, BackoffPolicy, Document, EmbedMode, EmbeddingProvider, Generation,
    GenerationProvider, InMemoryVectorStore, LoadReport, PipelineTimings, RagConfig, RagError,
    RagPipeline, Result, SummarizeOptions, VectorStore,
};

/// Letter-frequency embeddings: texts sharing words land close together.
struct LetterEmbedder {
    dims: usize,
    failures_left: AtomicUsize,
}

impl LetterEmbedder {
    fn new() -> Self {
        Self { dims: 26, failures_left: AtomicUsize::new(0) }
    }

    fn failing(times: usize) -> Self {
        Self { dims: 26, failures_left: AtomicUsize::new(times) }
    }

    fn with_dims(dims: usize) -> Self {
        Self { dims, failures_left: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn name(&self) -> &str {
        "Letters"
    }

    async fn embed(&self, text: &str, _mode: EmbedMode) -> Result<Vec<f32>> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(RagError::EmbeddingError {
                provider: "Letters".into(),
                message: "503 Service Unavailable".into(),
            });
        }
        let mut v = vec![0.0; self.dims];
        for c in text.chars().filter(char::is_ascii_alphabetic) {
            let slot = (c.to_ascii_lowercase() as usize - 'a' as usize) % self.dims;
            v[slot] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1.0);
        Ok(v.into_iter().map(|x| x / norm).collect())
    }
}

type Script = Box<dyn Fn(&str) -> Result<Generation> + Send + Sync>;

/// Answers every prompt through a script and records what it was asked.
struct ScriptedModel {
    prompts: Mutex<Vec<String>>,
    script: Script,
}

impl ScriptedModel {
    fn new(script: impl Fn(&str) -> Result<Generation> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { prompts: Mutex::new(Vec::new()), script: Box::new(script) })
    }

    fn echo() -> Arc<Self> {
        Self::new(|prompt| Ok(Generation::Answer(format!("answer #{}", prompt.len()))))
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedModel {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<Generation> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.script)(prompt)
    }
}

fn config() -> RagConfig {
    RagConfig::builder().chunk_size(60).chunk_overlap(10).top_k(2).build().unwrap()
}

fn pipeline_with(
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<ScriptedModel>,
    store: Arc<dyn VectorStore>,
) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .generation_provider(model)
        .vector_store(store)
        .backoff(BackoffPolicy::none())
        .timings(PipelineTimings::zero())
        .build()
        .unwrap()
}

fn pipeline(model: Arc<ScriptedModel>) -> (RagPipeline, Arc<InMemoryVectorStore>) {
    let store = Arc::new(InMemoryVectorStore::new());
    (pipeline_with(config(), Arc::new(LetterEmbedder::new()), model, store.clone()), store)
}

fn handbook() -> Document {
    Document::new(
        "handbook.txt",
        "Refunds are issued within thirty days of purchase.\n\n\
         Shipping takes five business days inside the country.\n\n\
         Support is available by email around the clock.",
    )
}

#[tokio::test]
async fn load_then_ask_answers_from_the_closest_chunks() {
    let model = ScriptedModel::echo();
    let (pipeline, store) = pipeline(model.clone());

    let report = pipeline.load("docs", &handbook(), false).await.unwrap();
    let LoadReport::Stored { chunks, replaced, add } = report else {
        panic!("expected a stored report");
    };
    assert_eq!((chunks, replaced, add.total), (3, 0, 3));
    assert!(!add.ids_regenerated);
    assert_eq!(store.count("docs").await.unwrap(), 3);

    let outcome = pipeline.ask("docs", "How many days for refunds?", None, None).await.unwrap();
    let AskOutcome::Answered { answer, sources, context_used } = outcome else {
        panic!("expected an answer");
    };
    assert!(answer.starts_with("answer #"));
    assert_eq!(sources.len(), 2);
    assert_eq!(context_used, 2);
    assert!(sources.iter().all(|s| s.id.starts_with("handbook.txt_")));
    assert_eq!(sources[0].source_document().as_deref(), Some("handbook.txt"));

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(&sources[0].document));
    assert!(prompts[0].contains("User Question: How many days for refunds?"));
}

#[tokio::test]
async fn reloading_is_skipped_unless_forced() {
    let (pipeline, store) = pipeline(ScriptedModel::echo());
    pipeline.load("docs", &handbook(), false).await.unwrap();

    let again = pipeline.load("docs", &handbook(), false).await.unwrap();
    assert_eq!(again, LoadReport::AlreadyLoaded { existing: 3 });

    let shorter = Document::new("handbook.txt", "Refunds are no longer offered.");
    let forced = pipeline.load("docs", &shorter, true).await.unwrap();
    let LoadReport::Stored { chunks, replaced, add } = forced else {
        panic!("expected a stored report");
    };
    assert_eq!((chunks, replaced, add.total), (1, 3, 1));
    assert_eq!(store.count("docs").await.unwrap(), 1);
}

#[tokio::test]
async fn forced_reload_beside_other_documents_drops_only_stale_chunks() {
    let (pipeline, store) = pipeline(ScriptedModel::echo());
    pipeline.load("docs", &handbook(), false).await.unwrap();
    pipeline.load("docs", &Document::new("other.txt", "Unrelated notes."), false).await.unwrap();

    let shorter = Document::new("handbook.txt", "Refunds are no longer offered.");
    let LoadReport::Stored { replaced, add, .. } =
        pipeline.load("docs", &shorter, true).await.unwrap()
    else {
        panic!("expected a stored report");
    };
    assert_eq!(replaced, 3);
    assert_eq!(add.total, 2);
    assert_eq!(store.count("docs").await.unwrap(), 2);

    let ids = store.ids_where("docs", "source_document", &"handbook.txt".into()).await.unwrap();
    assert_eq!(ids, vec!["handbook.txt_0".to_string()]);
}

#[tokio::test]
async fn forced_reload_of_the_only_document_may_change_dimensionality() {
    let store = Arc::new(InMemoryVectorStore::new());
    let model = ScriptedModel::echo();
    let first =
        pipeline_with(config(), Arc::new(LetterEmbedder::new()), model.clone(), store.clone());
    first.load("docs", &handbook(), false).await.unwrap();

    let resized =
        pipeline_with(config(), Arc::new(LetterEmbedder::with_dims(5)), model, store.clone());
    let report = resized.load("docs", &handbook(), true).await.unwrap();
    assert!(matches!(report, LoadReport::Stored { chunks: 3, replaced: 3, .. }));
    assert_eq!(store.count("docs").await.unwrap(), 3);
    assert!(matches!(
        resized.ask("docs", "refunds?", None, None).await.unwrap(),
        AskOutcome::Answered { .. }
    ));
}

#[tokio::test]
async fn rejected_forced_reload_keeps_previous_records() {
    let store = Arc::new(InMemoryVectorStore::new());
    let model = ScriptedModel::echo();
    let first =
        pipeline_with(config(), Arc::new(LetterEmbedder::new()), model.clone(), store.clone());
    first.load("docs", &handbook(), false).await.unwrap();
    first.load("docs", &Document::new("other.txt", "Unrelated notes."), false).await.unwrap();

    let resized =
        pipeline_with(config(), Arc::new(LetterEmbedder::with_dims(5)), model, store.clone());
    let err = resized.load("docs", &handbook(), true).await.unwrap_err();
    assert!(matches!(err, RagError::StorageUnavailable { .. }));

    assert_eq!(store.count("docs").await.unwrap(), 4);
    let ids = store.ids_where("docs", "source_document", &"handbook.txt".into()).await.unwrap();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn empty_collection_yields_no_context_without_generating() {
    let model = ScriptedModel::echo();
    let (pipeline, _) = pipeline(model.clone());

    let outcome = pipeline.ask("empty", "Anything there?", Some("a librarian"), None).await.unwrap();
    assert_eq!(outcome, AskOutcome::NoContext);
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn safety_block_is_reported_not_raised() {
    let model = ScriptedModel::new(|_| Ok(Generation::Blocked { reason: "SAFETY".into() }));
    let (pipeline, _) = pipeline(model);
    pipeline.load("docs", &handbook(), false).await.unwrap();

    let outcome = pipeline.ask("docs", "refunds?", None, None).await.unwrap();
    assert_eq!(outcome, AskOutcome::Blocked { reason: "SAFETY".into() });
}

#[tokio::test]
async fn persona_reaches_the_prompt() {
    let model = ScriptedModel::echo();
    let (pipeline, _) = pipeline(model.clone());
    pipeline.load("docs", &handbook(), false).await.unwrap();

    pipeline.ask("docs", "shipping?", Some("a pirate"), Some(1)).await.unwrap();
    assert!(model.prompts()[0].contains("Please answer from the perspective of a pirate."));
}

#[tokio::test]
async fn storage_failure_is_not_mistaken_for_missing_context() {
    let store = Arc::new(InMemoryVectorStore::new());
    let model = ScriptedModel::echo();
    let loader =
        pipeline_with(config(), Arc::new(LetterEmbedder::new()), model.clone(), store.clone());
    loader.load("docs", &handbook(), false).await.unwrap();

    let mismatched = pipeline_with(config(), Arc::new(LetterEmbedder::with_dims(3)), model, store);
    let err = mismatched.ask("docs", "refunds?", None, None).await.unwrap_err();
    assert!(matches!(err, RagError::StorageUnavailable { .. }));
}

#[tokio::test]
async fn blank_document_is_a_pipeline_error_and_writes_nothing() {
    let (pipeline, store) = pipeline(ScriptedModel::echo());
    let err = pipeline.load("docs", &Document::new("blank.txt", " \n\n \t"), false).await.unwrap_err();
    assert!(matches!(err, RagError::PipelineError(_)));
    assert!(!store.collection_exists("docs").await.unwrap());
}

#[tokio::test]
async fn embedding_failures_are_retried_then_surface() {
    let store = Arc::new(InMemoryVectorStore::new());
    let flaky = pipeline_with(
        config(),
        Arc::new(LetterEmbedder::failing(2)),
        ScriptedModel::echo(),
        store.clone(),
    );
    // No retries configured: the first failure aborts and nothing is written.
    let err = flaky.load("docs", &handbook(), false).await.unwrap_err();
    assert!(err.is_collaborator_failure());
    assert!(!store.collection_exists("docs").await.unwrap());

    let retrying = RagPipeline::builder()
        .config(config())
        .embedding_provider(Arc::new(LetterEmbedder::failing(2)))
        .generation_provider(ScriptedModel::echo())
        .vector_store(store.clone())
        .backoff(BackoffPolicy::immediate(3))
        .timings(PipelineTimings::zero())
        .build()
        .unwrap();
    let report = retrying.load("docs", &handbook(), false).await.unwrap();
    assert!(matches!(report, LoadReport::Stored { chunks: 3, .. }));
}

fn sections(n: usize) -> Document {
    let text = (0..n).map(|i| format!("section {i} body text")).collect::<Vec<_>>().join("\n\n");
    Document::new("report.md", text)
}

fn summary_config() -> RagConfig {
    RagConfig::builder().chunk_size(25).chunk_overlap(0).build().unwrap()
}

fn summary_pipeline(model: Arc<ScriptedModel>) -> RagPipeline {
    pipeline_with(
        summary_config(),
        Arc::new(LetterEmbedder::new()),
        model,
        Arc::new(InMemoryVectorStore::new()),
    )
}

fn is_chunk_prompt(prompt: &str) -> bool {
    prompt.starts_with("Please provide a concise summary")
}

#[tokio::test]
async fn summarize_skips_failed_chunks_and_synthesizes_the_rest() {
    let model = ScriptedModel::new(|prompt| {
        if prompt.contains("section 1 ") {
            Err(RagError::GenerationError { provider: "Scripted".into(), message: "500".into() })
        } else if prompt.contains("section 2 ") {
            Ok(Generation::Blocked { reason: "SAFETY".into() })
        } else if is_chunk_prompt(prompt) {
            Ok(Generation::Answer("part".into()))
        } else {
            Ok(Generation::Answer("the whole report".into()))
        }
    });
    let pipeline = summary_pipeline(model.clone());

    let report = pipeline.summarize(&sections(4), SummarizeOptions::default()).await.unwrap();
    assert_eq!(report.summary, "the whole report");
    assert_eq!((report.chunks_total, report.chunks_summarized, report.reduce_rounds), (4, 2, 0));

    let prompts = model.prompts();
    let last = prompts.last().unwrap();
    assert!(last.contains("titled 'report.md'"));
    assert!(last.contains("part\n\n---\n\npart"));
}

#[tokio::test]
async fn max_chunks_caps_the_work() {
    let model = ScriptedModel::new(|_| Ok(Generation::Answer("s".into())));
    let pipeline = summary_pipeline(model.clone());
    let options = SummarizeOptions { max_chunks: 2, ..Default::default() };

    let report = pipeline.summarize(&sections(6), options).await.unwrap();
    assert_eq!(report.chunks_total, 2);
    assert_eq!(model.prompts().iter().filter(|p| is_chunk_prompt(p)).count(), 2);
}

#[tokio::test]
async fn no_surviving_summaries_is_a_pipeline_error() {
    let model = ScriptedModel::new(|_| {
        Err(RagError::GenerationError { provider: "Scripted".into(), message: "down".into() })
    });
    let err = summary_pipeline(model).summarize(&sections(3), SummarizeOptions::default()).await;
    assert!(matches!(err, Err(RagError::PipelineError(_))));
}

#[tokio::test]
async fn blocked_final_synthesis_is_fatal() {
    let model = ScriptedModel::new(|prompt| {
        if is_chunk_prompt(prompt) {
            Ok(Generation::Answer("part".into()))
        } else {
            Ok(Generation::Blocked { reason: "OTHER".into() })
        }
    });
    let err = summary_pipeline(model).summarize(&sections(2), SummarizeOptions::default()).await;
    assert!(matches!(err, Err(RagError::PipelineError(msg)) if msg.contains("OTHER")));
}

#[tokio::test]
async fn reduce_rounds_combine_in_groups_before_the_final_call() {
    let model = ScriptedModel::new(|prompt| {
        if is_chunk_prompt(prompt) {
            Ok(Generation::Answer("part".into()))
        } else if prompt.contains("Combined Summary:") {
            Ok(Generation::Answer("merged".into()))
        } else {
            Ok(Generation::Answer("final".into()))
        }
    });
    let pipeline = summary_pipeline(model.clone());
    let options = SummarizeOptions { reduce_batch_size: 2, ..Default::default() };

    let report = pipeline.summarize(&sections(5), options).await.unwrap();
    assert_eq!(report.summary, "final");
    // 5 summaries -> 3 (two combine calls) -> 2 (one combine call).
    assert_eq!(report.reduce_rounds, 2);
    let prompts = model.prompts();
    assert_eq!(prompts.iter().filter(|p| p.contains("Combined Summary:")).count(), 3);
    assert!(prompts.last().unwrap().contains("merged\n\n---\n\n"));
}

#[tokio::test]
async fn failed_combine_keeps_the_raw_summaries() {
    let model = ScriptedModel::new(|prompt| {
        if is_chunk_prompt(prompt) {
            Ok(Generation::Answer("part".into()))
        } else if prompt.contains("Combined Summary:") {
            Err(RagError::GenerationError { provider: "Scripted".into(), message: "429".into() })
        } else {
            Ok(Generation::Answer("final".into()))
        }
    });
    let pipeline = summary_pipeline(model.clone());
    let options = SummarizeOptions { reduce_batch_size: 3, ..Default::default() };

    let report = pipeline.summarize(&sections(4), options).await.unwrap();
    assert_eq!(report.reduce_rounds, 1);
    let last = model.prompts().pop().unwrap();
    assert!(last.contains("part\n\n---\n\npart\n\n---\n\npart\n\n---\n\npart"));
}

#[test]
fn builder_reports_missing_parts() {
    let err = RagPipeline::builder().config(RagConfig::default()).build().unwrap_err();
    assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("embedding_provider")));

    let err = RagPipeline::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(LetterEmbedder::new()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build()
        .unwrap_err();
    assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("generation_provider")));
}
