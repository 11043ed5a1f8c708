use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Every link and dock packet.
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Crates whose logs follow `--log-level`; everything else stays at warn.
const STACK_CRATES: [&str; 5] = [
    "newtonkit",
    "newton_transport",
    "newton_mnp",
    "newton_nsof",
    "newton_dock",
];

fn default_directives(level: LogLevel) -> String {
    let level = LevelFilter::from(level);
    let mut directives = level.min(LevelFilter::WARN).to_string();
    for krate in STACK_CRATES {
        directives.push_str(&format!(",{krate}={level}"));
    }
    directives
}

/// `directives` (e.g. `newton_mnp=trace`) replace the per-crate defaults.
fn build_filter(level: LogLevel, directives: Option<&str>) -> Result<EnvFilter, ParseError> {
    match directives {
        Some(directives) => EnvFilter::try_new(directives),
        None => EnvFilter::try_new(default_directives(level)),
    }
}

/// Log to stderr; stdout carries session events.
pub fn init_logging(
    format: LogFormat,
    level: LogLevel,
    directives: Option<&str>,
) -> Result<(), ParseError> {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, directives)?)
        .with_ansi(false)
        .with_target(matches!(level, LogLevel::Debug | LogLevel::Trace) || directives.is_some());

    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    Ok(())
}
