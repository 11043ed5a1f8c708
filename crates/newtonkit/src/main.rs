mod dock;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::dock::DockArgs;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "newch", version, about = "Dock with a Newton over a serial line")]
struct Cli {
    /// Event output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Per-crate log directives, e.g. `newton_mnp=trace` (overrides --log-level).
    #[arg(long, value_name = "DIRECTIVES", env = "NEWCH_LOG", global = true)]
    log_filter: Option<String>,

    #[command(flatten)]
    dock: DockArgs,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    if let Err(err) = init_logging(cli.log_format, cli.log_level, cli.log_filter.as_deref()) {
        eprintln!("error: invalid --log-filter: {err}");
        std::process::exit(exit::USAGE);
    }

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match dock::run(cli.dock, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_path() {
        let cli = Cli::try_parse_from(["newch", "/dev/ttyUSB0"]).expect("device should parse");
        assert_eq!(cli.dock.device, std::path::PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(cli.dock.baud, 38_400);
        assert_eq!(cli.dock.timeout, 60);
    }

    #[test]
    fn parses_line_options() {
        let cli = Cli::try_parse_from([
            "newch",
            "--baud",
            "57600",
            "--format",
            "json",
            "/dev/ttyS0",
        ])
        .expect("options should parse");
        assert_eq!(cli.dock.baud, 57_600);
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }

    #[test]
    fn parses_log_filter() {
        let cli = Cli::try_parse_from(["newch", "--log-filter", "newton_mnp=trace", "/dev/ttyS0"])
            .expect("filter should parse");
        assert_eq!(cli.log_filter.as_deref(), Some("newton_mnp=trace"));
    }

    #[test]
    fn missing_device_is_usage_error() {
        let err = Cli::try_parse_from(["newch"]).expect_err("device is required");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
        assert!(err.use_stderr());
    }
}
