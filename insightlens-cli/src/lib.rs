//! # insightlens-cli
//!
//! The `insightlens` command: load documents into a collection, ask
//! questions against it, summarize whole documents, and manage settings
//! and collections.
//!
//! The binary is a thin wrapper over [`run`]. Tests and embedders can drive
//! [`execute`] directly with a [`Context`] that carries fixed providers.

pub mod cli;
pub mod commands;
pub mod settings;

pub use cli::{Cli, Command, DEFAULT_DATA_DIR, ProviderKind};
pub use commands::{Context, Providers, execute, run};
