use clap::Parser;
use widget_publish::cli::{run, Cli};

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries only the publish output.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli).await {
        Ok(()) => tracing::info!("CLI completed successfully"),
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
