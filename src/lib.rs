//! # Portfolio assistant (library root)
//!
//! A retrieval-augmented chat assistant that answers visitor questions about
//! one person from a small curated knowledge base.
//!
//! - Knowledge model and scoring types (`knowledge`, `language`).
//! - Retrieval: `keyword_search`, `vector_search`, `fusion`, backed by the
//!   content-addressed `embedding_cache`.
//! - Generation: `translator`, `response`, and the deterministic `fallback` ladder.
//! - Orchestration (`pipeline`) and the axum HTTP surface (`server`).
//! - Providers (`llm`), persistence (`store`, `models`, `schema`), configuration
//!   (`config`) and the CLI definition (`commands`).
//!
//! ## Wiring
//!
//! ```no_run
//! use portfolio_assistant::{config, pipeline::{ChatPipeline, ChatRequest, Collaborators}};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = config::load_config("config.yaml")?;
//! let pipeline = ChatPipeline::new(Collaborators::from_config(&cfg).await?, &cfg);
//! let outcome = pipeline
//!     .handle(&ChatRequest { message: "Where did Yiming study?".into(), ..Default::default() })
//!     .await;
//! println!("{}", outcome.response);
//! # Ok(()) }
//! ```

use directories::ProjectDirs;
use std::error::Error;

pub mod commands;
pub mod config;
pub mod embedding_cache;
pub mod fallback;
pub mod fusion;
pub mod keyword_search;
pub mod knowledge;
pub mod language;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod response;
pub mod schema;
pub mod server;
pub mod store;
pub mod translator;
pub mod vector_search;

#[cfg(test)]
mod test_support;

/// Return the per-platform configuration directory.
///
/// Uses [`directories::ProjectDirs`] with `("com", "folio", "folio")`, e.g.
/// `~/.config/folio` on Linux. The directory is not created.
///
/// # Errors
/// When the platform has no home/config directory.
pub fn config_dir() -> Result<std::path::PathBuf, Box<dyn Error>> {
    let proj_dirs =
        ProjectDirs::from("com", "folio", "folio").ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
