//! Informational commands: providers, models, hardware, download.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;

use babel_core::config::Config;
use babel_core::utils::{expand_home, get_models_path};
use babel_local::models::{filter_by_ram, find_best_model, find_by_id, recommendations_for_hardware};
use babel_local::{HardwareCapabilities, ModelStore, MODELS};
use babel_providers::PROVIDERS;

use crate::helpers::gb;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn model_store(config: &Config) -> ModelStore {
    match &config.local.models_dir {
        Some(dir) => ModelStore::new(expand_home(dir)),
        None => ModelStore::new(get_models_path()),
    }
}

/// `babel providers`
pub fn providers(config: &Config) -> Result<()> {
    println!();
    println!("{}", "Providers".cyan().bold());
    println!();
    println!(
        "  {:<18} {}",
        "Default:".bold(),
        config.translation.provider
    );
    println!();

    for spec in PROVIDERS {
        let configured = config
            .providers
            .get_by_name(spec.name)
            .is_some_and(|p| p.is_configured());
        let from_env = spec
            .env_key
            .is_some_and(|var| std::env::var(var).is_ok_and(|v| !v.is_empty()));

        let status = if spec.is_local {
            format!("{}", "· local".dimmed())
        } else if !spec.needs_api_key {
            format!("{}", "· no key needed".dimmed())
        } else if configured {
            format!("{} (key set)", "✓".green())
        } else if from_env {
            format!("{} (from env)", "✓".green())
        } else {
            format!("{}", "· not configured".dimmed())
        };

        println!(
            "    {:<12} {:<20} {:<22} {}",
            spec.name,
            spec.display_name,
            spec.default_model.dimmed(),
            status
        );
    }
    println!(
        "    {:<12} {:<20} {:<22} {}",
        crate::MULTI_WORKER_PROVIDER,
        "llama.cpp workers",
        "".dimmed(),
        format!("{} ({} configured)", "· local".dimmed(), config.local.workers.len())
    );
    println!();
    Ok(())
}

/// `babel models [--ram-gb N]`
pub fn models(config: &Config, ram_gb: Option<f64>) -> Result<()> {
    let ram_gb = match ram_gb {
        Some(v) => v,
        None => HardwareCapabilities::detect().available_ram as f64 / GIB,
    };
    let store = model_store(config);
    let downloaded = store.list_downloaded();
    let fitting = filter_by_ram((ram_gb * GIB) as u64);

    println!();
    println!(
        "{} {}",
        "Local models".cyan().bold(),
        format!("(RAM budget {ram_gb:.1} GB)").dimmed()
    );
    println!();

    for model in MODELS {
        let fits = fitting.iter().any(|m| m.id == model.id);
        let marker = if downloaded.iter().any(|id| id == model.id) {
            "✓".green().to_string()
        } else if fits {
            "·".to_string()
        } else {
            "✗".red().to_string()
        };
        println!(
            "  {} {:<28} {:<9} min {:<9} {}",
            marker,
            model.id,
            model.quality,
            gb(model.min_ram),
            model.optimized_for.dimmed()
        );
    }

    let recs = recommendations_for_hardware(ram_gb);
    println!();
    if recs.is_empty() {
        println!("  {}", "No model fits this RAM budget.".yellow());
    } else {
        println!("  {}", "Recommended:".bold());
        for model in recs {
            println!("    {}", model.name);
        }
    }
    println!();
    println!("  {:<18} {}", "Model store:".bold(), store.dir().display());
    println!();
    Ok(())
}

/// `babel hardware [--json]`
pub fn hardware(json: bool) -> Result<()> {
    let hw = HardwareCapabilities::detect();
    if json {
        println!("{}", serde_json::to_string_pretty(&hw)?);
        return Ok(());
    }

    println!();
    println!("{}", "Hardware".cyan().bold());
    println!();
    println!("  {:<18} {}", "Architecture:".bold(), hw.architecture);
    println!("  {:<18} {} ({} cores)", "CPU:".bold(), hw.cpu_model, hw.cpu_cores);
    println!(
        "  {:<18} {} total, {} available",
        "RAM:".bold(),
        gb(hw.total_ram),
        gb(hw.available_ram)
    );
    println!("  {:<18} {}", "GPU:".bold(), hw.gpu);
    println!(
        "  {:<18} {:.1}B parameters",
        "Max model size:".bold(),
        hw.max_model_size as f64 / 1e9
    );
    println!("  {:<18} {}", "Threads:".bold(), hw.optimal_threads());

    if let Err(e) = hw.validate() {
        println!("  {:<18} {}", "Warning:".bold(), e.yellow());
    }

    let best = find_best_model(hw.available_ram, &["ru", "sr"], hw.has_gpu());
    match best {
        Ok(model) => println!("  {:<18} {}", "Best model:".bold(), model.name.green()),
        Err(e) => println!("  {:<18} {}", "Best model:".bold(), e.to_string().red()),
    }
    println!();
    Ok(())
}

/// `babel download MODEL`
pub async fn download(config: &Config, id: &str) -> Result<()> {
    let model = find_by_id(id).ok_or_else(|| {
        let known: Vec<&str> = MODELS.iter().map(|m| m.id).collect();
        anyhow!("unknown model '{id}'. Known models: {}", known.join(", "))
    })?;
    let store = model_store(config);

    println!("{} {}", "Fetching".cyan().bold(), model.name);
    let path = store
        .ensure(model)
        .await
        .with_context(|| format!("failed to download {}", model.id))?;
    println!("  {} {}", "✓".green(), path.display());
    Ok(())
}
