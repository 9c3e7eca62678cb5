use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use colored::Colorize;
use strata_maintenance::MaintenanceJobController;
use strata_server::{ServerConfig, StrataServer};
use strata_store::{ConfigProvider, FileConfigProvider, FileStore, ObjectStore};
use strata_types::{ObjectId, ShardDepth};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli.config.as_deref(), cli.root.as_deref())?;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args),
        Command::Put(args) => cmd_put(&config, args),
        Command::Get(args) => cmd_get(&config, args),
        Command::Update(args) => cmd_update(&config, args),
        Command::Rm(args) => cmd_rm(&config, args),
        Command::Locate(args) => cmd_locate(&config, args),
        Command::Depth(args) => cmd_depth(&config, args),
        Command::Rebalance(args) => cmd_rebalance(config, args),
    }
}

/// Configuration file (or defaults) with the `--root` override applied.
pub fn resolve_config(path: Option<&Path>, root: Option<&Path>) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(root) = root {
        config.store.root_folder = root.to_path_buf();
    }
    Ok(config)
}

fn provider(config: &ServerConfig) -> Arc<FileConfigProvider> {
    Arc::new(FileConfigProvider::new(config.store.clone()))
}

fn open_store(config: &ServerConfig) -> FileStore {
    FileStore::new(provider(config))
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        return Ok(data);
    }
    std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

fn parse_id(text: &str) -> anyhow::Result<ObjectId> {
    ObjectId::parse(text).with_context(|| format!("{} is not an object identifier", text.bold()))
}

fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(base) = args.base_path {
        config.api_base_path = base;
    }
    println!(
        "{} Strata server on {} (data: {})",
        "▶".green().bold(),
        config.bind_addr.to_string().bold(),
        config.store.data_root()?.display()
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(StrataServer::new(config).serve())?;
    Ok(())
}

fn cmd_put(config: &ServerConfig, args: PutArgs) -> anyhow::Result<()> {
    let data = read_input(&args.file)?;
    let id = open_store(config).create(&data)?;
    println!("{} Stored {} bytes as {}", "✓".green().bold(), data.len(), id.to_string().yellow());
    Ok(())
}

fn cmd_get(config: &ServerConfig, args: GetArgs) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let data = open_store(config).read(&id)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, &data)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("{} Wrote {} bytes to {}", "✓".green(), data.len(), path.display());
        }
        None => io::stdout().write_all(&data)?,
    }
    Ok(())
}

fn cmd_update(config: &ServerConfig, args: UpdateArgs) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let data = read_input(&args.file)?;
    open_store(config).update(&id, &data)?;
    println!("{} Updated {}", "✓".green().bold(), id.to_string().yellow());
    Ok(())
}

fn cmd_rm(config: &ServerConfig, args: RmArgs) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    open_store(config).delete(&id)?;
    println!("{} Deleted {}", "✓".green().bold(), id.to_string().yellow());
    Ok(())
}

fn cmd_locate(config: &ServerConfig, args: LocateArgs) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let store = open_store(config);
    let configured = store.config().shard_depth()?;
    let copies = store.locate(&id)?;
    println!("Object {} (configured depth {})", id.to_string().yellow().bold(), configured);
    for (i, copy) in copies.iter().enumerate() {
        let marker = if i == 0 { "*".green().bold() } else { " ".normal() };
        let depth = copy.descriptor.depth();
        let depth_label = if depth == configured {
            format!("depth {depth}").green()
        } else {
            format!("depth {depth}").red()
        };
        let modified: DateTime<Utc> = copy.modified.into();
        println!(
            "{} {}  {}  {} bytes  {}",
            marker,
            depth_label,
            modified.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
            copy.size,
            copy.descriptor.path().display()
        );
    }
    Ok(())
}

fn cmd_depth(config: &ServerConfig, args: DepthArgs) -> anyhow::Result<()> {
    let provider = provider(config);
    match args.action {
        None => {
            let depth = provider.shard_depth()?;
            let source = if provider.settings().depth_file_path()?.is_file() {
                "control file"
            } else if config.store.default_depth.is_some() {
                "default_depth"
            } else {
                "built-in fallback"
            };
            println!("Shard depth: {} ({})", depth.to_string().bold(), source.dimmed());
        }
        Some(DepthAction::Set { depth }) => {
            provider.set_shard_depth(ShardDepth::new(depth))?;
            println!("{} Shard depth set to {}", "✓".green().bold(), depth.to_string().bold());
            println!("  Run {} to move existing objects.", "strata rebalance".cyan());
        }
        Some(DepthAction::Clear) => {
            if provider.clear_shard_depth()? {
                println!(
                    "{} Control file removed, depth is now {}",
                    "✓".green().bold(),
                    provider.shard_depth()?.to_string().bold()
                );
            } else {
                println!("No control file to remove.");
            }
        }
    }
    Ok(())
}

fn cmd_rebalance(mut config: ServerConfig, args: RebalanceArgs) -> anyhow::Result<()> {
    if let Some(workers) = args.concurrency {
        config.store.maintenance_concurrency = workers;
    }
    let provider: Arc<dyn ConfigProvider> = provider(&config);
    let depth = provider.shard_depth()?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let jobs = MaintenanceJobController::new(provider);
        jobs.start()?;
        println!("Rebalancing to depth {}", depth.to_string().bold());

        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        let mut last = jobs.status().metrics;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    if jobs.stop().await {
                        println!("{} Rebalance interrupted; run again to finish.", "!".yellow().bold());
                    }
                    return Ok(());
                }
            }
            if !jobs.is_running() {
                break;
            }
            last = jobs.status().metrics;
            print!("\r[{}] {:>5.1}%", last.progress_bar(), last.progress() * 100.0);
            io::stdout().flush()?;
        }
        println!(
            "\r[{}] {:>5.1}%",
            "█".repeat(strata_maintenance::BAR_WIDTH),
            100.0
        );
        println!(
            "{} Rebalance complete ({} entries)",
            "✓".green().bold(),
            last.number_to_process.max(last.number_processed)
        );
        Ok::<(), anyhow::Error>(())
    })
}

/// Default tracing filter for the given verbosity.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}
