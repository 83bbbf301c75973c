use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use bridgecore::config;
use bridgecore::drivers::register_builtin_drivers;
use bridgecore::logging::{self, LogConfig};
use bridgecore::registry::DriverRegistry;
use bridgecore::router::Router;
use bridgecore::rules::RuleSet;
use bridgecore::sensitive::SensitiveIndex;
use bridgecore::supervisor::Supervisor;
use bridgecore::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Convert { src, dst } => run_convert(&src, &dst),
        Commands::Run { data_path } => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            runtime.block_on(run_bridge(data_path))
        }
    }
}

fn run_convert(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    match config::convert(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("convert failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_bridge(data_path_override: Option<std::path::PathBuf>) -> Result<()> {
    let data_dir = data_path_override.unwrap_or_else(config::data_path);

    let (_config_path, config_value) = config::load_from_data_dir(&data_dir)?;
    let sensitive = Arc::new(SensitiveIndex::extract(&config_value));

    logging::install_panic_hook();
    logging::init(LogConfig::from_env(), sensitive.clone());

    let registry = DriverRegistry::new();
    register_builtin_drivers(&registry)?;

    config::schema::validate_top_level(&config_value, &registry)?;

    let rules_path = data_dir.join("rules.json");
    let rule_set = if rules_path.is_file() {
        RuleSet::load(&rules_path)?
    } else {
        tracing::warn!(path = %rules_path.display(), "no rules file found, bridge will route nothing");
        RuleSet::default()
    };

    let platforms = config_value
        .as_object()
        .context("top-level config must be an object")?;

    let mut known_instances = HashSet::new();
    for (platform, instances) in platforms {
        if !registry.contains(platform) {
            continue;
        }
        let Some(instances) = instances.as_object() else { continue };
        for instance_id in instances.keys() {
            known_instances.insert(instance_id.clone());
        }
    }
    rule_set.validate_instances(&known_instances)?;

    let router = Arc::new(Router::new(rule_set.rules.clone(), sensitive));
    let mut supervisor = Supervisor::new(router.clone());

    for (platform, instances) in platforms {
        if !registry.contains(platform) {
            continue;
        }
        let Some(instances) = instances.as_object() else { continue };
        for (instance_id, instance_cfg) in instances {
            let driver = registry.construct(platform, instance_id.clone(), instance_cfg.clone())?;
            supervisor.spawn(driver);
        }
    }

    if supervisor.instance_count() == 0 {
        tracing::error!("no drivers configured — nothing to do, exiting");
        return Ok(());
    }

    tracing::info!(instances = supervisor.instance_count(), "bridgecore running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    supervisor.cancel_all();
    supervisor.join_all().await;
    tracing::info!("bridgecore stopped");
    Ok(())
}
