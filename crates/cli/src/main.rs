use fieldops_core::config::{AppConfig, LoadOptions};
use std::process::ExitCode;

fn main() -> ExitCode {
    // Commands report configuration failures themselves.
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        fieldops_cli::init_logging(&config);
    }
    fieldops_cli::run()
}
