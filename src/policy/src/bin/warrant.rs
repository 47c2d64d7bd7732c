//! Warrant - evaluate authorization decisions from policy documents on disk
//!
//! ```text
//! warrant --policies policies.json --roles roles.json \
//!     check ident:UpdateMyAccount --context ctx.json
//! warrant --policies policies.json --roles roles.json --engine graph \
//!     actions --context ctx.json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use warrant_expr::{BasicKeyResolver, ConstKeyHandler, Key, KeyResolver};
use warrant_policy::{
    expression_engine, BasicPolicyEngine, DocumentCompiler, EngineConfig, ListPolicySource,
    PolicyContext, PolicyEngine, PolicySource, RoleGraphPolicyEngine,
};

/// Warrant policy decision CLI
#[derive(Parser)]
#[command(name = "warrant")]
#[command(about = "Evaluate authorization decisions against policy documents")]
#[command(version)]
struct Cli {
    /// JSON array of policy documents
    #[arg(short, long, env = "WARRANT_POLICIES")]
    policies: PathBuf,

    /// JSON array of role documents
    #[arg(short, long, env = "WARRANT_ROLES")]
    roles: Option<PathBuf>,

    /// TOML engine configuration
    #[arg(short, long, env = "WARRANT_CONFIG")]
    config: Option<PathBuf>,

    /// JSON object of constant keys (`{"ident:organization": "em2m"}`)
    #[arg(short, long)]
    keys: Option<PathBuf>,

    /// Decision strategy
    #[arg(short, long, value_enum, default_value_t = EngineKind::Basic)]
    engine: EngineKind,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// Deny-overrides over the caller's role policies
    Basic,
    /// Allow-only over the inherited role graph
    Graph,
}

#[derive(Subcommand)]
enum Command {
    /// Decide a single action
    Check {
        /// Action name (`ident:UpdateMyAccount`)
        action: String,

        /// JSON decision context (`claims`, `environment`, `resource`)
        #[arg(long)]
        context: PathBuf,
    },

    /// List the actions allowed for a context
    Actions {
        /// JSON decision context (`claims`, `environment`, `resource`)
        #[arg(long)]
        context: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let mut keys: Vec<Arc<dyn KeyResolver>> = Vec::new();
    if let Some(path) = &cli.keys {
        keys.push(Arc::new(load_keys(path)?));
    }
    let exprs = Arc::new(expression_engine(&config, keys));
    let compiler = DocumentCompiler::new(exprs.clone());

    let policies = read_json(&cli.policies)?;
    let roles = match &cli.roles {
        Some(path) => read_json(path)?,
        None => Value::Null,
    };
    let source: Arc<dyn PolicySource> = Arc::new(
        ListPolicySource::from_json(&compiler, policies, roles)
            .context("Failed to compile policy documents")?,
    );
    info!(
        policies = source.policies().len(),
        roles = source.roles().len(),
        "loaded policy documents"
    );

    match cli.command {
        Command::Check { action, context } => {
            let context = read_context(&context)?;
            let output = match cli.engine {
                EngineKind::Basic => {
                    let engine = BasicPolicyEngine::new(source, exprs, config)?;
                    let check = engine.check_action(&action, &context)?;
                    json!({ "action": action, "allowed": check.allowed, "check": check })
                }
                EngineKind::Graph => {
                    let engine = RoleGraphPolicyEngine::new(source, exprs, config)?;
                    let allowed = engine.is_action_allowed(&action, &context)?;
                    json!({ "action": action, "allowed": allowed })
                }
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Actions { context } => {
            let context = read_context(&context)?;
            let engine: Box<dyn PolicyEngine> = match cli.engine {
                EngineKind::Basic => Box::new(BasicPolicyEngine::new(source, exprs, config)?),
                EngineKind::Graph => Box::new(RoleGraphPolicyEngine::new(source, exprs, config)?),
            };
            let actions = engine.find_allowed_actions(&context)?;
            println!("{}", serde_json::to_string_pretty(&actions)?);
        }
    }

    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn read_context(path: &Path) -> Result<PolicyContext> {
    PolicyContext::from_value(read_json(path)?)
        .with_context(|| format!("Invalid decision context in {}", path.display()))
}

/// Constant key handlers from a JSON object keyed by `namespace:name`
fn load_keys(path: &Path) -> Result<BasicKeyResolver> {
    let Value::Object(entries) = read_json(path)? else {
        bail!("{} must hold a JSON object of keys", path.display());
    };
    let mut resolver = BasicKeyResolver::new();
    for (name, value) in entries {
        let key = Key::parse(&name).with_context(|| format!("Invalid key '{name}'"))?;
        resolver = resolver.key(key, ConstKeyHandler::new(value));
    }
    Ok(resolver)
}
