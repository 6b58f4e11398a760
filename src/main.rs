use anyhow::Result;
use clap::Parser;
use thesis_rs::cli::Args;
use thesis_rs::launch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let (config, request) = args.into_launch()?;
    let state = launch(&config, request).await?;

    if let Some(error) = &state.error {
        eprintln!("❌ 运行失败 [{}]: {}", error.kind, error.message);
        std::process::exit(1);
    }
    Ok(())
}
