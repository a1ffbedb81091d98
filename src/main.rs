#![forbid(unsafe_code)]

mod cli;
mod config;
mod constants;
mod endpoint;
mod error;
mod host;
mod launcher;
mod layout;
mod lifecycle;
mod mask;
mod terminal;
mod x11_utils;

use std::io;

use clap::Parser;
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use cli::Args;
use config::Profile;
use endpoint::Endpoint;
use error::{Result, StartError};
use host::Host;
use layout::Layout;
use x11_utils::Inspector;

fn main() {
    let args = Args::parse();

    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not install the log subscriber: {err}");
    }

    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(error = %err, "startup failed");
            std::process::exit(err.exit_code());
        }
    }
}

fn run(args: &Args) -> Result<i32> {
    let profile = Profile::load(&args.config_dir, &args.config)?;
    info!(profile = %profile.name(), "configuration loaded");
    let beam_host = profile.host("beam")?;
    let data_host = profile.host("data")?;

    if args.mask {
        return record_mask(&beam_host, &profile);
    }

    let endpoint = Endpoint::from_profile(&profile)?;
    let bin_dir = profile.daq_dir()?.join("bin");

    let inspector = Inspector::connect()?;
    let (max_w, max_h) = inspector.monitor_size(profile.monitor_number()?)?;
    let count = profile.window_count();
    let mut layout = Layout::new(
        max_w,
        max_h,
        count,
        profile.spacing()?,
        profile.window_height()?,
    );
    info!(
        monitor = profile.monitor_number()?,
        width = max_w,
        height = max_h,
        windows = count,
        device_width = layout.device_width(),
        endpoint = %endpoint,
        "layout computed"
    );

    if args.test {
        // Same resolution path as a real run, but nothing is touched.
        let plan = launcher::build_plan(&profile, &endpoint, &layout, &data_host, &bin_dir, 0)?;
        for device in &plan.devices {
            info!(title = %device.title, host = %device.host, "would start");
        }
        info!("test mode, nothing was killed or launched");
        return Ok(0);
    }

    lifecycle::kill_all(&beam_host, &data_host)?;
    if let Err(err) = lifecycle::protect_previous_data(&data_host, &profile) {
        warn!(error = %err, "could not protect the previous raw data");
    }

    let calibration = terminal::calibrate(&inspector);
    let plan = launcher::build_plan(
        &profile,
        &endpoint,
        &layout,
        &data_host,
        &bin_dir,
        calibration.x_min,
    )?;
    let report = launcher::launch(plan, &mut layout, &inspector, &calibration, &bin_dir)?;

    if report.all_started() {
        Ok(0)
    } else {
        for (title, err) in &report.failed {
            warn!(device = %title, error = %err, "device did not start");
        }
        Ok(4)
    }
}

fn record_mask(beam: &Host, profile: &Profile) -> Result<i32> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    match mask::record(&mut stdin.lock(), &mut stdout.lock(), beam, profile) {
        Ok(_) => Ok(0),
        // The shifter keeps their session; the mask just has to be redone
        // once the beam host is reachable again.
        Err(err @ StartError::RemoteCommandFailed { .. }) => {
            warn!(error = %err, "mask was not written");
            Ok(1)
        }
        Err(err) => Err(err),
    }
}
