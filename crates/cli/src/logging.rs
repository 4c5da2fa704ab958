use callsync_core::config::{LogFormat, LoggingConfig};
use tracing::Level;

/// Logs go to stderr so stdout stays a single JSON outcome per command.
pub fn init_logging(settings: &LoggingConfig) {
    let log_level = settings.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when commands run in-process.
    let _ = match settings.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
