use brrtdispatch::cli::{run_cli, Cli};
use brrtdispatch::logging::{self, LogConfig};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init_logging(&LogConfig::from_env()) {
        eprintln!("logging disabled: {e:#}");
    }

    let code = match run_cli(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "brrtdispatch failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    };
    logging::shutdown();
    code
}
