use clap::Parser;
use plankit_cli::{EXIT_ERROR, PlankitCli};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_logging();
    let cli = PlankitCli::parse();

    let (json, code) = match cli.execute() {
        Ok(output) => (output.json, output.exit_code),
        Err(err) => {
            tracing::error!("{err:#}");
            (serde_json::json!({ "error": format!("{err:#}") }), EXIT_ERROR)
        }
    };

    match serde_json::to_string_pretty(&json) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            eprintln!("failed to render output: {err}");
            return ExitCode::from(EXIT_ERROR);
        }
    }
    ExitCode::from(code)
}

fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
