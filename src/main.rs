use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use dashgate::config::{ConfigArgs, GateConfig};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct GateArgs {
    /// Print gate configuration data (JSON) and exit.
    #[arg(long)]
    pub print_config: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

async fn run(args: GateArgs) -> Result<()> {
    let cfg: GateConfig = args.config.load("gate")?;

    if args.print_config {
        let json = serde_json::to_string_pretty(&cfg).context("encode config json")?;
        println!("{json}");
        return Ok(());
    }

    cfg.logs.init("gate")?;

    let store = cfg.build_store()?;
    let ctx = cfg.build_ctx(store);
    let srv = cfg.build_server(ctx)?;

    srv.run().await.context("run gate server")?;

    info!("Server exited by user");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = GateArgs::parse();
    match run(args).await {
        Ok(()) => {}
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
