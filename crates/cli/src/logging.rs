//! Logging setup.
//!
//! Logs go to stderr so stdout stays reserved for probe results.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. `RUST_LOG` takes precedence
/// over the verbosity flag.
pub fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "probe=info,probe.runtime=info",
        1 => "probe=debug,probe.runtime=debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
