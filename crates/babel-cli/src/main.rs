//! Babel CLI: entry point.
//!
//! # Commands
//!
//! - `babel translate [TEXT] [-i FILE] [-p PROVIDER]`: translate text or a file
//! - `babel providers`: list providers and their key status
//! - `babel models [--ram-gb N]`: list local models that fit in RAM
//! - `babel hardware`: show detected hardware and the best local model
//! - `babel download MODEL`: fetch a local model into the model store

mod helpers;
mod info;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use babel_core::config::{load_config, Config};
use babel_core::types::TranslationConfig;
use babel_local::WorkerCoordinator;
use babel_providers::registry::provider_names;
use babel_translator::LlmTranslator;

/// Provider name routed to the multi-worker local coordinator.
const MULTI_WORKER_PROVIDER: &str = "llamacpp-multi";

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Babel: literary translation through hosted and local LLMs
#[derive(Parser)]
#[command(name = "babel", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate text (argument, file, or stdin)
    Translate {
        /// Text to translate. Omit to read `--input` or stdin.
        text: Option<String>,

        /// Read the source text from a file
        #[arg(short, long)]
        input: Option<std::path::PathBuf>,

        /// Provider name (defaults to the configured provider)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,

        /// Source language code
        #[arg(long)]
        from: Option<String>,

        /// Target language code
        #[arg(long)]
        to: Option<String>,

        /// Free-form context passed to the prompt (e.g. chapter title)
        #[arg(short, long, default_value = "")]
        context: String,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// List supported providers
    Providers,

    /// List local models that fit in the given RAM
    Models {
        /// RAM budget in GB (defaults to detected available RAM)
        #[arg(long)]
        ram_gb: Option<f64>,
    },

    /// Show detected hardware capabilities
    Hardware {
        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Download a local model into the model store
    Download {
        /// Model identifier (see `babel models`)
        model: String,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Translate {
            text,
            input,
            provider,
            model,
            from,
            to,
            context,
            logs,
        } => {
            init_logging(logs);
            let source = helpers::read_source(text, input.as_deref())?;
            let config = load_config(None);
            let overrides = Overrides {
                provider,
                model,
                from,
                to,
            };
            run_translate(&config, &overrides, &source, &context).await
        }
        Commands::Providers => info::providers(&load_config(None)),
        Commands::Models { ram_gb } => info::models(&load_config(None), ram_gb),
        Commands::Hardware { json } => info::hardware(json),
        Commands::Download { model, logs } => {
            init_logging(logs);
            info::download(&load_config(None), &model).await
        }
    }
}

// ─────────────────────────────────────────────
// Translate command
// ─────────────────────────────────────────────

#[derive(Debug, Default)]
struct Overrides {
    provider: Option<String>,
    model: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

/// Resolve the client config from the file config plus command-line overrides.
fn resolve_config(config: &Config, overrides: &Overrides) -> TranslationConfig {
    let mut cfg = config.translation_config(overrides.provider.as_deref());
    if let Some(model) = &overrides.model {
        cfg.model = model.clone();
    }
    if let Some(from) = &overrides.from {
        cfg.source_lang = from.clone();
    }
    if let Some(to) = &overrides.to {
        cfg.target_lang = to.clone();
    }
    cfg
}

/// Build the translator for the resolved provider.
fn build_translator(config: &Config, cfg: TranslationConfig) -> Result<LlmTranslator> {
    if cfg.provider == MULTI_WORKER_PROVIDER {
        let mut local = config.local.clone();
        if !cfg.source_lang.is_empty() {
            local.source_lang = cfg.source_lang.clone();
        }
        if !cfg.target_lang.is_empty() {
            local.target_lang = cfg.target_lang.clone();
        }
        let coordinator = WorkerCoordinator::new(local);
        let stats = coordinator.stats();
        if stats.available_workers == 0 {
            bail!(
                "no local workers available ({} configured); check `local.workers` in the config",
                stats.total_workers
            );
        }
        return Ok(LlmTranslator::with_client(cfg, Box::new(coordinator)));
    }

    let provider = cfg.provider.clone();
    LlmTranslator::new(cfg).with_context(|| {
        format!(
            "failed to create translator for '{provider}' (known providers: {}, {MULTI_WORKER_PROVIDER})",
            provider_names()
        )
    })
}

async fn run_translate(
    config: &Config,
    overrides: &Overrides,
    source: &str,
    context: &str,
) -> Result<()> {
    let cfg = resolve_config(config, overrides);
    let translator = build_translator(config, cfg)?;

    info!(translator = %translator.name(), bytes = source.len(), "translating");
    let result = translator
        .translate(source, context)
        .await
        .context("translation failed")?;

    helpers::print_translation(&result);
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("babel=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_config_overrides() {
        let config = Config::default();
        let overrides = Overrides {
            provider: Some("deepseek".into()),
            model: Some("deepseek-coder".into()),
            from: Some("en".into()),
            to: Some("sr-latn".into()),
        };
        let cfg = resolve_config(&config, &overrides);
        assert_eq!(cfg.provider, "deepseek");
        assert_eq!(cfg.model, "deepseek-coder");
        assert_eq!(cfg.source_lang, "en");
        assert_eq!(cfg.target_lang, "sr-latn");
        assert!(cfg.temperature().is_some());
    }

    #[test]
    fn test_resolve_config_keeps_file_values() {
        let config = Config::default();
        let cfg = resolve_config(&config, &Overrides::default());
        assert_eq!(cfg.provider, config.translation.provider);
        assert_eq!(cfg.source_lang, config.translation.source_lang);
    }

    #[test]
    fn test_unknown_provider_mentions_known_ones() {
        let config = Config::default();
        let cfg = TranslationConfig::new("nope");
        let err = build_translator(&config, cfg).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("unsupported LLM provider: nope"));
        assert!(msg.contains("llamacpp-multi"));
    }

    #[test]
    fn test_multi_worker_without_workers() {
        let config = Config::default();
        let cfg = TranslationConfig::new(MULTI_WORKER_PROVIDER);
        let err = build_translator(&config, cfg).unwrap_err();
        assert!(err.to_string().contains("no local workers available"));
    }
}
