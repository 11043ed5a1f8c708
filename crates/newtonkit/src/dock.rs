use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use newton_dock::DockConfig;
use newton_transport::{SerialConfig, SerialPort, DEFAULT_BAUD_RATE};
use newtonkit::{Pipeline, PipelineConfig};
use tracing::{info, warn};

use crate::exit::{dock_error, io_error, is_fatal, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// How long a read waits before the stop flag is checked again.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Args, Debug)]
pub struct DockArgs {
    /// Serial device the Newton is attached to.
    pub device: PathBuf,
    /// Line speed.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Idle timeout, in seconds, requested from the device.
    #[arg(long, default_value_t = 60)]
    pub timeout: u32,
}

pub fn run(args: DockArgs, format: OutputFormat) -> CliResult<i32> {
    let serial = SerialConfig {
        baud_rate: args.baud,
        read_timeout: Some(POLL_INTERVAL),
    };
    let mut port = SerialPort::open_with_config(&args.device, &serial)
        .map_err(|err| transport_error("open failed", err))?;
    let device = args.device.display().to_string();

    let config = PipelineConfig {
        dock: DockConfig {
            timeout_seconds: args.timeout,
            ..DockConfig::default()
        },
        ..PipelineConfig::default()
    };
    let mut pipeline =
        Pipeline::with_config(config).map_err(|err| dock_error("setup failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(%device, baud = args.baud, "waiting for device");
    let mut buf = [0u8; 1024];
    while running.load(Ordering::SeqCst) {
        let n = match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error("read failed", err)),
        };

        let received = pipeline.receive(&buf[..n]);
        flush(&mut port, &mut pipeline, &device, format)?;

        if let Err(err) = received {
            if is_fatal(&err) {
                let _ = pipeline.disconnect();
                flush(&mut port, &mut pipeline, &device, format)?;
                return Err(dock_error("dock session failed", err));
            }
            warn!(error = %err, "dropped malformed input");
        }
    }

    info!(%device, "stopping");
    pipeline
        .disconnect()
        .map_err(|err| dock_error("disconnect failed", err))?;
    flush(&mut port, &mut pipeline, &device, format)?;
    Ok(SUCCESS)
}

/// Write pending output to the device and print pending events.
fn flush(
    port: &mut SerialPort,
    pipeline: &mut Pipeline,
    device: &str,
    format: OutputFormat,
) -> CliResult<()> {
    let output = pipeline.take_output();
    if !output.is_empty() {
        port.write_all(&output)
            .and_then(|()| port.flush())
            .map_err(|err| io_error("write failed", err))?;
    }
    for event in pipeline.take_events() {
        print_event(&event, device, format);
    }
    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
