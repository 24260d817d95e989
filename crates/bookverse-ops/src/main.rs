use bookverse_ops::cli::Cli;
use bookverse_ops::exit::error_code;
use clap::Parser;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if let Err(err) = bvo_telemetry::install("bookverse-ops") {
        eprintln!("telemetry disabled: {err:#}");
    }

    let code = match bookverse_ops::run(cli).await {
        Ok(exit) => exit.code(),
        Err(err) => {
            tracing::error!("❌ {err:#}");
            error_code(&err)
        }
    };
    bvo_telemetry::shutdown();
    std::process::exit(code);
}
