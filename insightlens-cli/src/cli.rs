//! Command-line surface.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use insightlens_docs::OutputFormat;

/// Default location of collections and saved settings.
pub const DEFAULT_DATA_DIR: &str = "./insightlens_data";

#[derive(Debug, Parser)]
#[command(name = "insightlens", version, about = "InsightLens: Query your documents with AI.")]
pub struct Cli {
    /// Directory holding collections and saved settings
    #[arg(long, global = true, env = "INSIGHTLENS_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Remote model provider used for embeddings and generation
    #[arg(
        long,
        global = true,
        env = "INSIGHTLENS_PROVIDER",
        value_enum,
        default_value_t = ProviderKind::Gemini
    )]
    pub provider: ProviderKind,

    /// Timeout for each provider request, in seconds
    #[arg(long, global = true, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Log more detail to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Gemini,
    Openai,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a document (PDF, DOCX, TXT, MD) into a collection
    Load {
        /// Path to the document
        filepath: PathBuf,

        /// Collection to store the document in [default: saved setting]
        #[arg(long)]
        collection_name: Option<String>,

        /// Re-embed the document even if it is already in the collection
        #[arg(short, long)]
        force_reload: bool,
    },

    /// Ask a question about the loaded documents
    Ask {
        /// Your question
        query: String,

        /// Collection to query [default: saved setting]
        #[arg(long)]
        collection_name: Option<String>,

        /// Persona for the answer, e.g. "a domain expert"
        #[arg(long)]
        persona: Option<String>,

        /// Number of chunks to retrieve [default: saved setting]
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Summarize a whole document
    SummarizeDoc {
        /// Path to the document
        filepath: PathBuf,

        /// Output format: text, pdf, or docx
        #[arg(long, default_value = "text")]
        output_format: OutputFormat,

        /// Only summarize the first N chunks (0 for all)
        #[arg(long, default_value_t = 0)]
        max_chunks_to_summarize: usize,

        /// Combine chunk summaries in groups of N before the final summary
        /// (0 combines them all in one call)
        #[arg(long, default_value_t = 0)]
        chunk_summary_batch_size: usize,

        /// Directory for pdf/docx output
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Show or change the saved chunking and retrieval settings
    Configure {
        /// Characters per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks of one paragraph
        #[arg(long)]
        chunk_overlap: Option<usize>,

        /// Chunks retrieved per question
        #[arg(long)]
        top_k: Option<usize>,

        /// Default collection
        #[arg(long)]
        collection_name: Option<String>,
    },

    /// Delete all data in a collection
    ResetCollection {
        /// Collection to reset
        collection_name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        confirm: bool,
    },
}
