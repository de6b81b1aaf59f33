use clap::Parser;
use tracing_subscriber::EnvFilter;
use tusk_cli::cmd::Cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = Cli::parse().run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
