use colored::Colorize;
use polaris_server::{PolarisServer, ServerConfig};
use polaris_types::{IdKind, Sid, UniqueId};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::RootStore(args) => cmd_root_store(args),
        Command::Inspect(args) => cmd_inspect(args),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    println!("{} Polaris server on {}", "▶".green().bold(), config.bind_addr.to_string().bold());
    println!(
        "  transform pages: {}, batch operations: {}",
        config.engine.max_transform_batch.to_string().cyan(),
        config.engine.max_batch_operations.to_string().cyan()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(PolarisServer::new(config).serve())?;
    Ok(())
}

fn cmd_root_store(args: RootStoreArgs) -> anyhow::Result<()> {
    let sid = Sid::root_store_for(&args.user);
    println!("{} {}", args.user.bold(), sid.to_hex().yellow());
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let id = UniqueId::from_hex(args.id.trim())?;
    match IdKind::classify(id)? {
        IdKind::Object(oid) => {
            let kind = if oid.is_anchor() {
                "anchor"
            } else if oid.is_sentinel() {
                "sentinel"
            } else {
                "object"
            };
            println!("{} {}", kind.cyan().bold(), oid.to_hex().yellow());
            if let Ok(sid) = oid.anchored_sid() {
                println!("  mounts store {}", sid.to_hex().yellow());
            }
        }
        IdKind::Store(sid) => {
            let kind = if sid.is_root_store() { "root store" } else { "shared store" };
            println!("{} {}", kind.cyan().bold(), sid.to_hex().yellow());
            if let Ok(folder) = sid.folder() {
                println!("  converted from folder {}", folder.to_hex().yellow());
            }
        }
        IdKind::Device(did) => println!("{} {}", "device".cyan().bold(), did.to_hex().yellow()),
    }
    Ok(())
}
