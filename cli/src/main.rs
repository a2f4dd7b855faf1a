use clap::Parser;
use dqm_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dqm_cli::init_logging(cli.log_level.as_deref());
    cli.run().await
}
