//! socialbench - run the social-network workload against one backend.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use socialbench::{run, Args, OutputFormat};

fn main() -> ExitCode {
    // A missing .env file is fine; the environment and flags still apply.
    let _ = dotenv::dotenv();

    // Logs go to stderr; stdout carries the benchmark lines.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "socialbench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let format = args.format;
    let config = args.into_config();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %config.backend,
        users = config.counts.users,
        seed = config.seed,
        "configuration loaded"
    );

    let mut stdout = io::stdout();
    let report = match run(&config, &mut stdout) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let summary = match format {
        OutputFormat::Text => Ok(report.render_text()),
        OutputFormat::Json => report.to_json(),
    };
    match summary {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
