//! Command-line interface for the `folio` binary, built with `clap`.
//!
//! ```text
//! folio serve                      # HTTP API on server.bind_address
//! folio ask "Where did Yiming study?" --language zh
//! folio init                       # default config.yaml + knowledge.yaml
//! folio import knowledge.yaml
//! folio embed                      # backfill every missing embedding
//! ```
//!
//! ```no_run
//! use clap::Parser;
//! use portfolio_assistant::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! if let Commands::Ask { question, .. } = cli.command {
//!     println!("asking: {question}");
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to config.yaml. Defaults to the per-platform config directory.
    #[arg(long, short = 'c', global = true, env = "FOLIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Provider API key; overrides `provider.api_key` from the config file.
    #[arg(long, global = true, env = "FOLIO_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Serve the chat API.
    #[clap(name = "serve", alias = "s")]
    Serve {
        /// Overrides `server.bind_address`.
        #[arg(long, short = 'b')]
        bind: Option<String>,
    },

    /// Ask one question and print the answer with its sources.
    #[clap(name = "ask", alias = "a")]
    Ask {
        question: String,

        /// `auto`, `en` or `zh`.
        #[arg(long, short = 'l')]
        language: Option<String>,

        #[arg(long, short = 's')]
        session: Option<String>,
    },

    /// Write a default config.yaml and a sample knowledge.yaml.
    Init,

    /// Load knowledge entries from a YAML file.
    #[clap(name = "import", alias = "i")]
    Import { file: PathBuf },

    /// Embed every active knowledge entry that has no embedding yet.
    #[clap(name = "embed", alias = "e")]
    Embed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_takes_question_and_options() {
        let cli = Cli::try_parse_from(["folio", "ask", "Where did Yiming study?", "-l", "zh"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Ask {
                question: "Where did Yiming study?".to_string(),
                language: Some("zh".to_string()),
                session: None,
            }
        );
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from(["folio", "serve", "--config", "/tmp/c.yaml", "-b", "127.0.0.1:9000"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
        assert_eq!(
            cli.command,
            Commands::Serve {
                bind: Some("127.0.0.1:9000".to_string())
            }
        );
    }

    #[test]
    fn import_requires_a_file() {
        assert!(Cli::try_parse_from(["folio", "import"]).is_err());
        let cli = Cli::try_parse_from(["folio", "i", "kb.yaml"]).unwrap();
        assert_eq!(cli.command, Commands::Import { file: PathBuf::from("kb.yaml") });
    }
}
