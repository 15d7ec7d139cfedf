use clap::Parser;
use ghostgate_core::api::load;

mod client;
mod commands;
mod http;
mod logging;

use commands::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    let cfg = load(args.config.as_deref())?;
    let _guard = logging::init_logging(&cfg.logging)?;

    let exit = commands::dispatch(args, cfg).await?;
    if exit != 0 {
        std::process::exit(exit);
    }
    Ok(())
}
