//! CLI command definitions for the `swbd` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod provider;
pub mod quota;
pub mod submit;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Route LLM tasks across free-tier providers without exceeding their quotas.
#[derive(Parser)]
#[command(name = "swbd", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (default: ~/.switchboard/switchboard.toml).
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Export spans to stdout through OpenTelemetry.
        #[arg(long)]
        otel: bool,

        /// Do not reload when the config file changes.
        #[arg(long)]
        no_watch: bool,
    },

    /// Submit one task and print the outcome.
    Submit {
        /// Task type: default, synthesis, embedding, or a custom name.
        #[arg(long, default_value = "default")]
        task_type: String,

        /// Estimated tokens to reserve against provider quotas.
        #[arg(long)]
        tokens: u64,

        /// Prompt text, sent as a single user message.
        #[arg(long, conflicts_with = "payload")]
        prompt: Option<String>,

        /// Raw JSON payload handed to the provider client.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Show daily/monthly quota and request rate per provider.
    Quota,

    /// Show usage aggregates per provider.
    Usage {
        /// Trailing window in hours.
        #[arg(long, default_value = "24")]
        since_hours: u32,
    },

    /// List configured providers in priority order.
    Providers,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Format token count with K/M suffixes.
pub fn format_tokens(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_parses_flags() {
        let cli = Cli::try_parse_from([
            "swbd",
            "--json",
            "submit",
            "--task-type",
            "synthesis",
            "--tokens",
            "1200",
            "--prompt",
            "Summarize the abstract",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Submit {
                task_type,
                tokens,
                prompt,
                payload,
            } => {
                assert_eq!(task_type, "synthesis");
                assert_eq!(tokens, 1200);
                assert_eq!(prompt.as_deref(), Some("Summarize the abstract"));
                assert!(payload.is_none());
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn prompt_and_payload_conflict() {
        let result = Cli::try_parse_from([
            "swbd", "submit", "--tokens", "1", "--prompt", "a", "--payload", "{}",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["swbd", "serve"]).unwrap();
        match cli.command {
            Commands::Serve {
                port,
                host,
                otel,
                no_watch,
            } => {
                assert_eq!(port, 3000);
                assert_eq!(host, "127.0.0.1");
                assert!(!otel);
                assert!(!no_watch);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn format_tokens_units() {
        assert_eq!(format_tokens(950), "950");
        assert_eq!(format_tokens(1_500), "1.5K");
        assert_eq!(format_tokens(10_000_000), "10.0M");
    }
}
