//! promoctl CLI: promote, evaluate and serve registered models.
//!
//! Every subcommand exits 0 on success and 1 on failure, so the binary can
//! gate CI/CD jobs directly.

mod commands;

use anyhow::Context as _;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// promoctl: gated promotion of registered model versions
#[derive(Parser, Debug)]
#[command(name = "promoctl", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Registered model name (overrides configuration)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "promoctl", "promoctl")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "promoctl.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = resolve_workspace(&cli.workspace)?;

    let mut config =
        promoctl_core::load_config(Some(&workspace), cli.config.as_deref(), None)
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(model) = cli.model {
        config.model_name = model;
    }

    let ctx = commands::Context {
        workspace,
        config,
        json: cli.json,
    };
    commands::handle_command(cli.command, &ctx).await
}

/// The registry lives under the workspace, so a mistyped path must not fall
/// back to another directory.
fn resolve_workspace(path: &Path) -> anyhow::Result<PathBuf> {
    let workspace = path
        .canonicalize()
        .with_context(|| format!("Workspace directory '{}' does not exist", path.display()))?;
    if !workspace.is_dir() {
        anyhow::bail!("Workspace '{}' is not a directory", path.display());
    }
    Ok(workspace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use commands::{Commands, ConfigAction};

    #[test]
    fn test_parse_promote() {
        let cli = Cli::try_parse_from(["promoctl", "promote", "dev"]).unwrap();
        match cli.command {
            Commands::Promote { environment } => assert_eq!(environment, "dev"),
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.workspace, PathBuf::from("."));
    }

    #[test]
    fn test_parse_evaluate_with_threshold() {
        let cli = Cli::try_parse_from([
            "promoctl",
            "evaluate",
            "Champion",
            "--threshold",
            "0.95",
            "-v",
        ])
        .unwrap();
        match cli.command {
            Commands::Evaluate {
                target,
                threshold,
                version,
            } => {
                assert_eq!(target, "Champion");
                assert_eq!(threshold, Some(0.95));
                assert_eq!(version, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_parse_serve_and_global_flags() {
        let cli = Cli::try_parse_from([
            "promoctl",
            "--model",
            "iris_model",
            "serve",
            "--version",
            "10",
            "--port",
            "8080",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.model.as_deref(), Some("iris_model"));
        assert!(cli.json);
        match cli.command {
            Commands::Serve {
                version,
                alias,
                port,
                host,
            } => {
                assert_eq!(version, Some(10));
                assert_eq!(alias, None);
                assert_eq!(port, Some(8080));
                assert_eq!(host, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_serve_version_conflicts_with_alias() {
        assert!(
            Cli::try_parse_from(["promoctl", "serve", "--version", "1", "--alias", "Champion"])
                .is_err()
        );
    }

    #[test]
    fn test_parse_config_and_register() {
        let cli = Cli::try_parse_from(["promoctl", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
        let cli = Cli::try_parse_from(["promoctl", "register", "model.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Register { .. }));
    }

    #[test]
    fn test_resolve_workspace() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolved = resolve_workspace(dir.path()).unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap());

        let missing = dir.path().join("no-such-dir");
        let err = resolve_workspace(&missing).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let file = dir.path().join("config.toml");
        std::fs::write(&file, "").unwrap();
        assert!(resolve_workspace(&file).is_err());
    }

    #[test]
    fn test_promote_requires_environment() {
        assert!(Cli::try_parse_from(["promoctl", "promote"]).is_err());
        assert!(Cli::try_parse_from(["promoctl"]).is_err());
    }
}
