//! Command handlers.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use insightlens_docs::{OutputFormat, read_document, render_summary};
use insightlens_rag::gemini::GeminiProvider;
use insightlens_rag::openai::OpenAIProvider;
use insightlens_rag::{
    AskOutcome, BackoffPolicy, Document, EmbeddingProvider, GenerationProvider,
    InMemoryVectorStore, LoadReport, LocalVectorStore, PipelineTimings, RagConfig, RagPipeline,
    SummarizeOptions, VectorStore, VectorStoreManager,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};

use crate::cli::{Cli, Command, ProviderKind};
use crate::settings;

const RESET_PROMPT: &str = "Are you sure you want to delete all data in this collection?";

/// The embedding and generation models a command talks to.
#[derive(Clone)]
pub struct Providers {
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub generation: Arc<dyn GenerationProvider>,
}

impl Providers {
    /// Build providers for `kind` from the environment.
    pub fn from_env(kind: ProviderKind, timeout: Duration) -> Result<Self> {
        match kind {
            ProviderKind::Gemini => {
                let provider = GeminiProvider::from_env()
                    .and_then(|p| p.with_timeout(timeout))
                    .context(
                        "Please ensure your GEMINI_API_KEY is set in a .env file or as an environment variable.",
                    )?;
                let provider = Arc::new(provider);
                Ok(Self { embedding: provider.clone(), generation: provider })
            }
            ProviderKind::Openai => {
                let provider = OpenAIProvider::from_env()
                    .and_then(|p| p.with_timeout(timeout))
                    .context(
                        "Please ensure your OPENAI_API_KEY is set in a .env file or as an environment variable.",
                    )?;
                let provider = Arc::new(provider);
                Ok(Self { embedding: provider.clone(), generation: provider })
            }
        }
    }
}

enum ProviderSource {
    Env { kind: ProviderKind, timeout: Duration },
    Fixed(Providers),
}

type Confirm = Box<dyn Fn(&str) -> Result<bool>>;

/// Everything a command needs besides its own arguments.
pub struct Context {
    data_dir: PathBuf,
    providers: ProviderSource,
    backoff: BackoffPolicy,
    timings: PipelineTimings,
    confirm: Confirm,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            data_dir: cli.data_dir.clone(),
            providers: ProviderSource::Env {
                kind: cli.provider,
                timeout: Duration::from_secs(cli.timeout_secs),
            },
            backoff: BackoffPolicy::default(),
            timings: PipelineTimings::default(),
            confirm: Box::new(prompt_yes_no),
        }
    }

    /// A context with fixed providers, no retries, no pauses, and every
    /// confirmation declined.
    pub fn with_providers(data_dir: impl Into<PathBuf>, providers: Providers) -> Self {
        Self {
            data_dir: data_dir.into(),
            providers: ProviderSource::Fixed(providers),
            backoff: BackoffPolicy::none(),
            timings: PipelineTimings::zero(),
            confirm: Box::new(|_| Ok(false)),
        }
    }

    /// Replace how interactive confirmations are answered.
    pub fn with_confirm(mut self, confirm: impl Fn(&str) -> Result<bool> + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn providers(&self) -> Result<Providers> {
        match &self.providers {
            ProviderSource::Env { kind, timeout } => Providers::from_env(*kind, *timeout),
            ProviderSource::Fixed(providers) => Ok(providers.clone()),
        }
    }

    async fn local_store(&self) -> Result<Arc<dyn VectorStore>> {
        let store = LocalVectorStore::open(&self.data_dir)
            .await
            .with_context(|| format!("failed to open data directory {}", self.data_dir.display()))?;
        Ok(Arc::new(store))
    }

    fn pipeline(&self, config: RagConfig, store: Arc<dyn VectorStore>) -> Result<RagPipeline> {
        let providers = self.providers()?;
        Ok(RagPipeline::builder()
            .config(config)
            .embedding_provider(providers.embedding)
            .generation_provider(providers.generation)
            .vector_store(store)
            .backoff(self.backoff.clone())
            .timings(self.timings)
            .build()?)
    }
}

/// Entry point used by the binary.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let context = Context::from_cli(&cli);
    let mut stdout = std::io::stdout();
    execute(&context, cli.command, &mut stdout).await
}

/// Run one command, writing user-facing output to `out`.
///
/// Fatal failures are returned as errors. A declined reset returns
/// [`ExitCode::FAILURE`] without an error.
pub async fn execute<W: Write>(context: &Context, command: Command, out: &mut W) -> Result<ExitCode> {
    let config = settings::load(&context.data_dir).await?;

    match command {
        Command::Load { filepath, collection_name, force_reload } => {
            let collection = collection_name.unwrap_or_else(|| config.collection.clone());
            load(context, config, &filepath, &collection, force_reload, out).await?;
        }
        Command::Ask { query, collection_name, persona, top_k } => {
            let collection = collection_name.unwrap_or_else(|| config.collection.clone());
            ask(context, config, &collection, &query, persona.as_deref(), top_k, out).await?;
        }
        Command::SummarizeDoc {
            filepath,
            output_format,
            max_chunks_to_summarize,
            chunk_summary_batch_size,
            output_dir,
        } => {
            let options = SummarizeOptions {
                max_chunks: max_chunks_to_summarize,
                reduce_batch_size: chunk_summary_batch_size,
            };
            summarize(context, config, &filepath, output_format, options, &output_dir, out).await?;
        }
        Command::Configure { chunk_size, chunk_overlap, top_k, collection_name } => {
            configure(context, config, chunk_size, chunk_overlap, top_k, collection_name, out)
                .await?;
        }
        Command::ResetCollection { collection_name, confirm } => {
            if !confirm && !(context.confirm)(RESET_PROMPT)? {
                writeln!(out, "Reset cancelled.")?;
                return Ok(ExitCode::FAILURE);
            }
            reset(context, &collection_name, out).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read(filepath: &Path) -> Result<Document> {
    let Some(text) = read_document(filepath) else {
        bail!("Failed to load document: {}", filepath.display());
    };
    let name = filepath
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filepath.display().to_string());
    Ok(Document { name, text, source_path: Some(filepath.to_path_buf()) })
}

async fn load<W: Write>(
    context: &Context,
    config: RagConfig,
    filepath: &Path,
    collection: &str,
    force_reload: bool,
    out: &mut W,
) -> Result<()> {
    let document = read(filepath)?;
    writeln!(
        out,
        "Document '{}' loaded successfully. ({} characters)",
        document.name,
        document.text.chars().count()
    )?;

    let pipeline = context.pipeline(config, context.local_store().await?)?;
    let report = pipeline
        .load(collection, &document, force_reload)
        .await
        .with_context(|| format!("failed to process '{}'", document.name))?;

    match report {
        LoadReport::Stored { chunks, replaced, add } => {
            writeln!(out, "Document split into {chunks} chunks.")?;
            if replaced > 0 {
                writeln!(out, "Replaced {replaced} chunks from an earlier load.")?;
            }
            writeln!(
                out,
                "Document '{}' processed and stored in collection '{collection}'. ({} chunks in collection)",
                document.name, add.total
            )?;
        }
        LoadReport::AlreadyLoaded { existing } => {
            writeln!(
                out,
                "Document '{}' is already in collection '{collection}' ({existing} chunks). Use --force-reload to embed it again.",
                document.name
            )?;
        }
    }
    Ok(())
}

async fn ask<W: Write>(
    context: &Context,
    config: RagConfig,
    collection: &str,
    query: &str,
    persona: Option<&str>,
    top_k: Option<usize>,
    out: &mut W,
) -> Result<()> {
    let pipeline = context.pipeline(config, context.local_store().await?)?;
    match pipeline.ask(collection, query, persona, top_k).await? {
        AskOutcome::NoContext => {
            writeln!(out, "No relevant context found in collection '{collection}' for your query.")?;
            writeln!(out, "Consider loading relevant documents or refining your query.")?;
        }
        AskOutcome::Answered { answer, sources, context_used } => {
            writeln!(out, "\nInsightLens says:")?;
            writeln!(out, "{}", answer.trim_end())?;
            writeln!(out, "\nSources:")?;
            for source in sources.iter().take(context_used) {
                writeln!(
                    out,
                    "  - {} (distance {:.4})",
                    source.source_document().unwrap_or_else(|| source.id.clone()),
                    source.distance
                )?;
            }
        }
        AskOutcome::Blocked { reason } => {
            writeln!(out, "InsightLens could not generate an answer: the request was blocked ({reason}).")?;
        }
    }
    Ok(())
}

async fn summarize<W: Write>(
    context: &Context,
    config: RagConfig,
    filepath: &Path,
    format: OutputFormat,
    options: SummarizeOptions,
    output_dir: &Path,
    out: &mut W,
) -> Result<()> {
    let document = read(filepath)?;
    writeln!(out, "Initiating summarization for: {}", document.name)?;

    // Summaries never touch the persistent index.
    let pipeline = context.pipeline(config, Arc::new(InMemoryVectorStore::new()))?;
    let report = pipeline
        .summarize(&document, options)
        .await
        .with_context(|| format!("failed to summarize '{}'", document.name))?;

    if report.chunks_summarized < report.chunks_total {
        warn!(
            skipped = report.chunks_total - report.chunks_summarized,
            "some chunks could not be summarized"
        );
    }
    writeln!(
        out,
        "Summarized {} of {} chunks.",
        report.chunks_summarized, report.chunks_total
    )?;
    writeln!(out, "\n--- Generated Document Summary ---")?;
    writeln!(out, "{}", report.summary.trim_end())?;

    if let Some(path) = render_summary(format, &document.name, &report.summary, output_dir)? {
        writeln!(out, "\nSummary saved to: {}", path.display())?;
    }
    Ok(())
}

async fn configure<W: Write>(
    context: &Context,
    current: RagConfig,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    top_k: Option<usize>,
    collection: Option<String>,
    out: &mut W,
) -> Result<()> {
    if chunk_size.is_none() && chunk_overlap.is_none() && top_k.is_none() && collection.is_none() {
        writeln!(out, "Current configuration:")?;
        writeln!(out, "  Collection: {}", current.collection)?;
        writeln!(out, "  Chunk Size: {}", current.chunk_size)?;
        writeln!(out, "  Chunk Overlap: {}", current.chunk_overlap)?;
        writeln!(out, "  Top-K Retrieval: {}", current.top_k)?;
        writeln!(out, "Use options to set new values.")?;
        return Ok(());
    }

    let mut builder = current.to_builder();
    if let Some(size) = chunk_size {
        builder = builder.chunk_size(size);
    }
    if let Some(overlap) = chunk_overlap {
        builder = builder.chunk_overlap(overlap);
    }
    if let Some(k) = top_k {
        builder = builder.top_k(k);
    }
    if let Some(name) = &collection {
        insightlens_rag::validate_collection_name(name)?;
        builder = builder.collection(name.clone());
    }
    let updated = builder.build().context("configuration not saved")?;
    settings::save(&context.data_dir, &updated).await?;

    if let Some(size) = chunk_size {
        writeln!(out, "Chunk size set to: {size}")?;
    }
    if let Some(overlap) = chunk_overlap {
        writeln!(out, "Chunk overlap set to: {overlap}")?;
    }
    if let Some(k) = top_k {
        writeln!(out, "Top-K retrieval set to: {k}")?;
    }
    if let Some(name) = collection {
        writeln!(out, "Default collection set to: {name}")?;
    }
    Ok(())
}

async fn reset<W: Write>(context: &Context, collection: &str, out: &mut W) -> Result<()> {
    let manager = VectorStoreManager::new(context.local_store().await?);
    let existed = manager.reset(collection).await?;
    info!(collection, existed, "collection reset");
    writeln!(out, "Collection '{collection}' has been reset.")?;
    Ok(())
}

fn prompt_yes_no(question: &str) -> Result<bool> {
    let mut editor = DefaultEditor::new()?;
    match editor.readline(&format!("{question} [y/N]: ")) {
        Ok(answer) => Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
