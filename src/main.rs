//! client: answers ex_string challenges and prints the secret flag
//!
//! The client connects to the server (plain TCP or TLS), says HELLO with
//! its identifier, answers every FIND challenge with a COUNT, and prints the
//! flag carried by the final BYE.
//!
//! Features:
//! - Fragment-safe newline framing with per-message timeouts
//! - Strict validation of every server message
//! - Configuration via CLI arguments or TOML file

use ex_string_client::config::Config;
use ex_string_client::{flag, session};
use std::io::Write;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; stdout is reserved for the flag
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        tls = config.tls,
        timeout_secs = config.io_timeout.map(|t| t.as_secs()),
        "Starting ex_string client"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    // Reported once through tracing; the exit status carries the failure.
    let outcome = match runtime.block_on(session::run(&config)) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, protocol_anomaly = e.is_protocol_anomaly(), "Session failed");
            return Ok(ExitCode::FAILURE);
        }
    };

    if !flag::is_well_formed(&outcome.result) {
        warn!(
            len = outcome.result.len(),
            expected = flag::SECRET_FLAG_LEN,
            "Flag has unexpected length"
        );
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&outcome.result)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;

    if let Some(path) = &config.flag_file {
        flag::record(path, &outcome.result)?;
        info!(path = %path.display(), "Recorded flag");
    }

    Ok(ExitCode::SUCCESS)
}
