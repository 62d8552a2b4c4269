//! Subcommand handlers.

use anyhow::Context as _;
use promoctl_core::{Evaluation, PromoteConfig, PromotionController, QualityGate, VersionId};
use promoctl_ml::{ArtifactGate, ModelArtifact, ServingState};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Promote the version held by the preceding stage into an environment
    Promote {
        /// Target environment (dev, preprod, prod) or stage name
        environment: String,
    },
    /// Score a model against a quality threshold without changing the registry
    Evaluate {
        /// Environment (checks its promotion candidate) or stage/alias name
        target: String,
        /// Override the threshold
        #[arg(long)]
        threshold: Option<f64>,
        /// Evaluate this version instead of the current occupant
        #[arg(long)]
        version: Option<VersionId>,
    },
    /// Show which version each stage currently holds
    Status,
    /// Register a trained artifact and place it in the initial stage
    Register {
        /// Artifact path or URI
        artifact: String,
    },
    /// Serve predictions over HTTP
    Serve {
        /// Serve this version
        #[arg(long, conflicts_with = "alias")]
        version: Option<VersionId>,
        /// Serve the version under this alias/stage
        #[arg(long)]
        alias: Option<String>,
        /// Bind address
        #[arg(long)]
        host: Option<String>,
        /// Port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration to `.promoctl/config.toml`
    Init,
}

/// Resolved invocation state shared by every handler.
pub struct Context {
    pub workspace: PathBuf,
    pub config: PromoteConfig,
    pub json: bool,
}

pub async fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Promote { environment } => promote(ctx, &environment).await,
        Commands::Evaluate {
            target,
            threshold,
            version,
        } => evaluate(ctx, &target, threshold, version).await,
        Commands::Status => status(ctx).await,
        Commands::Register { artifact } => register(ctx, &artifact).await,
        Commands::Serve {
            version,
            alias,
            host,
            port,
        } => serve(ctx, version, alias, host, port).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => config_show(ctx),
            ConfigAction::Init => config_init(&ctx.workspace),
        },
    }
}

fn build_controller(ctx: &Context) -> anyhow::Result<PromotionController> {
    let config = &ctx.config;
    let registry = promoctl_core::registry::open(&config.registry, &ctx.workspace)
        .context("Failed to open model registry")?;
    let gate: Option<Arc<dyn QualityGate>> = if config.evaluation.gate_enabled {
        Some(Arc::new(ArtifactGate::iris(config.evaluation.split)?))
    } else {
        None
    };
    let controller = PromotionController::from_config(config, registry, gate)?;
    tracing::debug!(?controller, "Controller ready");
    Ok(controller)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn promote(ctx: &Context, environment: &str) -> anyhow::Result<()> {
    let controller = build_controller(ctx)?;
    let outcome = controller.promote(environment).await?;
    if ctx.json {
        return print_json(&outcome);
    }
    if outcome.already_promoted {
        println!(
            "{} already holds {} version {}; {} is empty, nothing to promote",
            outcome.target_stage, outcome.model_name, outcome.version, outcome.source_stage
        );
        return Ok(());
    }
    println!(
        "Promoted {} version {} from {} to {}",
        outcome.model_name, outcome.version, outcome.source_stage, outcome.target_stage
    );
    if let Some(eval) = outcome.evaluation {
        println!(
            "  accuracy {:.4} (threshold {:.2})",
            eval.accuracy, eval.threshold
        );
    }
    Ok(())
}

async fn evaluate(
    ctx: &Context,
    target: &str,
    threshold: Option<f64>,
    version: Option<VersionId>,
) -> anyhow::Result<()> {
    let controller = build_controller(ctx)?;
    let eval = match (version, threshold) {
        (Some(version), None) => controller.evaluate(version, target).await?,
        (Some(version), Some(threshold)) => {
            let scored = controller.evaluate(version, target).await?;
            Evaluation::judge(scored.version, scored.accuracy, threshold)?
        }
        (None, threshold) => controller.check(target, threshold).await?,
    };

    if ctx.json {
        print_json(&eval)?;
    } else if eval.passed {
        println!(
            "Test passed: version {} accuracy {:.4} (threshold {:.2})",
            eval.version, eval.accuracy, eval.threshold
        );
    }
    if !eval.passed {
        anyhow::bail!(
            "Test failed: version {} accuracy {:.4} below threshold {:.2}",
            eval.version,
            eval.accuracy,
            eval.threshold
        );
    }
    Ok(())
}

async fn status(ctx: &Context) -> anyhow::Result<()> {
    let controller = build_controller(ctx)?;
    let assignments = controller.status().await?;
    if ctx.json {
        return print_json(&assignments);
    }
    println!("{} ({:?} mode)", controller.model_name(), controller.mode());
    for a in assignments {
        println!(
            "  {:<24} {:<10} {}",
            a.stage,
            a.environment.as_deref().unwrap_or("-"),
            a.version.map_or_else(|| "-".to_string(), |v| v.to_string())
        );
    }
    Ok(())
}

async fn register(ctx: &Context, artifact: &str) -> anyhow::Result<()> {
    let source = normalize_source(artifact, &ctx.workspace);
    ModelArtifact::load(&source)
        .await
        .with_context(|| format!("'{source}' is not a valid model artifact"))?;

    let controller = build_controller(ctx)?;
    let registered = controller.register_candidate(&source).await?;
    if ctx.json {
        return print_json(&registered);
    }
    println!(
        "Registered {} version {} as {}",
        registered.name,
        registered.version,
        controller.pipeline().initial().name
    );
    Ok(())
}

/// Local paths are stored absolute so other working directories can load them.
fn normalize_source(artifact: &str, workspace: &Path) -> String {
    if artifact.contains("://") {
        return artifact.to_string();
    }
    let path = Path::new(artifact);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    };
    path.canonicalize()
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

async fn serve(
    ctx: &Context,
    version: Option<VersionId>,
    alias: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let serving = &ctx.config.serving;
    let controller = build_controller(ctx)?;

    let (version, alias) = match (version, alias) {
        (None, None) => (serving.model_version, serving.model_alias.clone()),
        explicit => explicit,
    };
    let state = ServingState::resolve(&controller, version, alias.as_deref()).await?;

    let host = host.unwrap_or_else(|| serving.host.clone());
    let port = port.unwrap_or(serving.port);
    if !ctx.json {
        println!(
            "Serving {} version {} on http://{}:{}",
            state.model_name, state.version, host, port
        );
    }
    promoctl_ml::serving::run(Arc::new(state), &host, port).await?;
    Ok(())
}

fn config_show(ctx: &Context) -> anyhow::Result<()> {
    if ctx.json {
        return print_json(&ctx.config);
    }
    print!("{}", toml::to_string_pretty(&ctx.config)?);
    Ok(())
}

fn config_init(workspace: &Path) -> anyhow::Result<()> {
    let path = workspace.join(".promoctl").join("config.toml");
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, toml::to_string_pretty(&PromoteConfig::default())?)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use promoctl_core::RegistryStore;
    use tempfile::TempDir;

    fn ctx(dir: &Path) -> Context {
        Context {
            workspace: dir.to_path_buf(),
            config: PromoteConfig::default(),
            json: true,
        }
    }

    #[test]
    fn test_normalize_source() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("m.json"), "{}").unwrap();
        let normalized = normalize_source("m.json", dir.path());
        assert!(Path::new(&normalized).is_absolute());
        assert!(normalized.ends_with("m.json"));
        assert_eq!(
            normalize_source("http://host/m.json", dir.path()),
            "http://host/m.json"
        );
    }

    #[test]
    fn test_default_config_is_valid_toml() {
        let text = toml::to_string_pretty(&PromoteConfig::default()).unwrap();
        assert!(text.contains("model_name = \"iris_classifier\""));
        assert!(text.contains("policy = \"stride\""));
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        config_init(dir.path()).unwrap();
        assert!(dir.path().join(".promoctl/config.toml").exists());
        assert!(config_init(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_register_then_status_against_local_registry() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(dir.path());
        let err = register(&ctx, "missing.json").await.unwrap_err();
        assert!(err.to_string().contains("not a valid model artifact"));

        let controller = build_controller(&ctx).unwrap();
        let status = controller.status().await.unwrap();
        assert_eq!(status.len(), 4);
        assert!(status.iter().all(|s| s.version.is_none()));

        let err = promote(&ctx, "dev").await.unwrap_err();
        assert!(err.to_string().contains("Challenger"));
    }

    #[tokio::test]
    async fn test_registry_written_under_workspace() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(dir.path());
        let registry = promoctl_core::registry::open(&ctx.config.registry, dir.path()).unwrap();
        registry.register_version("iris_classifier", "a.json").await.unwrap();
        assert!(dir.path().join(".promoctl/registry.json").exists());
    }
}
