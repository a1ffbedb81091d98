//! Sequential fleet launcher.
//!
//! The fleet comes up in a fixed dependency order: run-control, then
//! log-control, then the data collector, then every enabled producer, then
//! the online monitor. Control processes draw their own windows and take
//! geometry as arguments; everything else is hosted in an xterm placed by
//! the layout engine.
//!
//! Every profile lookup happens while the plan is built, so a broken
//! profile aborts before a single process is started. During execution a
//! device that fails to start is reported and skipped; the control windows
//! are load-bearing and their failures abort the run.

use std::path::Path;

use tracing::{info, warn};

use crate::config::Profile;
use crate::constants::{delays, fleet};
use crate::endpoint::Endpoint;
use crate::error::{Result, StartError};
use crate::host::{Host, ProcessSpec};
use crate::layout::{Layout, WindowSpec};
use crate::terminal::{self, Calibration};
use crate::x11_utils::Inspector;

/// The resolved launch sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub run_control: ProcessSpec,
    pub log_control: ProcessSpec,
    /// Collector first, then enabled producers, then the monitor.
    pub devices: Vec<ProcessSpec>,
}

/// What actually came up. Failed devices leave the rest of the fleet
/// running.
#[derive(Debug, Default)]
pub struct LaunchReport {
    pub started: Vec<String>,
    pub failed: Vec<(String, StartError)>,
}

impl LaunchReport {
    pub fn all_started(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Resolve the full launch sequence from the profile. `x_min` is the
/// measured frame offset applied to the log-control position.
pub fn build_plan(
    profile: &Profile,
    endpoint: &Endpoint,
    layout: &Layout,
    data_host: &Host,
    bin_dir: &Path,
    x_min: i16,
) -> Result<LaunchPlan> {
    let connect = endpoint.connect_string();

    let run_control = {
        let window = layout.run_control_window();
        let args = control_args(&window, "-a", endpoint.listen_string());
        ProcessSpec::new(
            window.title,
            bin_path(bin_dir, fleet::RUN_CONTROL),
            args,
            Host::Local,
        )
    };
    let log_control = {
        let window = layout.log_control_window(x_min);
        let args = control_args(&window, "-r", connect.clone());
        ProcessSpec::new(
            window.title,
            bin_path(bin_dir, fleet::LOG_CONTROL),
            args,
            Host::Local,
        )
    };

    // Producer kinds and names resolve unconditionally so profile mistakes
    // surface even for disabled devices.
    let collector = collector_spec(profile, data_host, bin_dir, &connect)?;
    let tlu = producer_spec(
        profile,
        bin_dir,
        &connect,
        "tlu",
        profile.misc("tlu producer")?,
        profile.role_name("tlu producer")?,
        Some("EUDET TLU"),
    );
    let cmsref = producer_spec(
        profile,
        bin_dir,
        &connect,
        "cmsref",
        "CMSPixelProducerREF",
        "CMSREF",
        None,
    );
    let cmsdut = producer_spec(
        profile,
        bin_dir,
        &connect,
        "cmsdut",
        "CMSPixelProducerDUT",
        "CMSDUT",
        None,
    );
    let ni = producer_spec(
        profile,
        bin_dir,
        &connect,
        "ni",
        "NiProducer",
        "ni_mimosa",
        Some("EUDET TELESCOPE"),
    );
    let monitor = monitor_spec(profile, bin_dir, &connect)?;

    let devices = std::iter::once(collector)
        .chain([tlu, cmsref, cmsdut, ni, monitor].into_iter().flatten())
        .collect();

    Ok(LaunchPlan {
        run_control,
        log_control,
        devices,
    })
}

/// Start the whole fleet, consuming the plan. Device windows are measured
/// as they come up so the next window starts where the last one really
/// ended.
pub fn launch(
    plan: LaunchPlan,
    layout: &mut Layout,
    inspector: &Inspector,
    calibration: &Calibration,
    bin_dir: &Path,
) -> Result<LaunchReport> {
    info!("starting subprocesses");
    // Fleet binaries expect to run from the DAQ bin directory; every child
    // inherits it.
    std::env::set_current_dir(bin_dir)?;

    let mut report = LaunchReport::default();
    for control in [plan.run_control, plan.log_control] {
        start_control(&control)?;
        report.started.push(control.title);
    }

    for process in plan.devices {
        let window = layout.next_device_window(&process.title);
        if let Err(err) = terminal::spawn_in_window(&window, &process, calibration) {
            warn!(device = %process.title, error = %err, "device failed to start, continuing");
            report.failed.push((process.title, err));
            continue;
        }
        terminal::settle(delays::WINDOW);
        // Every later position depends on this measurement; without it the
        // row cannot continue.
        let rect = inspector.measure(&window.title)?;
        layout.advance(rect.width, rect.x);
        report.started.push(process.title);
    }

    info!(
        started = report.started.len(),
        failed = report.failed.len(),
        windows = layout.placed(),
        "fleet start complete"
    );
    Ok(report)
}

fn start_control(spec: &ProcessSpec) -> Result<()> {
    info!(title = %spec.title, "starting control window");
    spec.command()
        .spawn()
        .map(drop)
        .map_err(|source| StartError::Spawn {
            title: spec.title.clone(),
            source,
        })?;
    terminal::settle(delays::CONTROL);
    Ok(())
}

fn collector_spec(
    profile: &Profile,
    data_host: &Host,
    bin_dir: &Path,
    connect: &str,
) -> Result<ProcessSpec> {
    let kind = profile.misc("data collector")?;
    let name = profile.role_name("data collector")?;
    Ok(match data_host {
        Host::Local => ProcessSpec::new(
            "Data Collector TLU",
            bin_path(bin_dir, fleet::COLLECTOR),
            vec![
                "-n".to_string(),
                kind.to_string(),
                "-t".to_string(),
                name.to_string(),
                "-r".to_string(),
                connect.to_string(),
            ],
            Host::Local,
        ),
        // The remote collector host carries its own launch script with the
        // collector configuration baked in.
        remote => ProcessSpec::new(
            "Data Collector TLU",
            fleet::REMOTE_COLLECTOR_SCRIPT,
            Vec::new(),
            remote.clone(),
        ),
    })
}

fn producer_spec(
    profile: &Profile,
    bin_dir: &Path,
    connect: &str,
    device: &str,
    kind: &str,
    name: &str,
    title: Option<&str>,
) -> Option<ProcessSpec> {
    if !profile.device_enabled(device) {
        return None;
    }
    Some(ProcessSpec::new(
        title.unwrap_or(name),
        bin_path(bin_dir, fleet::PRODUCER),
        vec![
            "-n".to_string(),
            kind.to_string(),
            "-t".to_string(),
            name.to_string(),
            "-r".to_string(),
            connect.to_string(),
        ],
        Host::Local,
    ))
}

fn monitor_spec(profile: &Profile, bin_dir: &Path, connect: &str) -> Result<Option<ProcessSpec>> {
    let name = profile.misc("online monitor")?;
    if !profile.device_enabled("onlinemonitor") {
        return Ok(None);
    }
    Ok(Some(ProcessSpec::new(
        "ONLINE MONITOR",
        bin_path(bin_dir, fleet::MONITOR),
        vec![
            "-t".to_string(),
            name.to_string(),
            "-r".to_string(),
            connect.to_string(),
        ],
        Host::Local,
    )))
}

fn control_args(window: &WindowSpec, flag: &str, address: String) -> Vec<String> {
    vec![
        "-x".to_string(),
        window.x.to_string(),
        "-y".to_string(),
        window.y.to_string(),
        "-w".to_string(),
        window.width.to_string(),
        "-g".to_string(),
        window.height.to_string(),
        flag.to_string(),
        address,
    ]
}

fn bin_path(bin_dir: &Path, name: &str) -> String {
    bin_dir.join(name).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const FULL_INI: &str = "\
[PORT]
rc = 44000

[WINDOW]
monitor number = 0
spacing = 0.05
height = 400

[DEVICE]
tlu = 1
cmsref = 1
cmsdut = 1
ni = 1
onlinemonitor = 1

[HOST]
data = none
beam = none

[DIR]
daq = /opt/eudaq
data = software/eudaq
telescope = telescope

[MISC]
data collector = EventIDSyncDataCollector
tlu producer = EudetTluProducer
online monitor = StdEventMonitor

[NAME]
data collector = TLU
tlu producer = tlu
";

    fn profile_from(contents: &str) -> Profile {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("fixture.ini"), contents).unwrap();
        Profile::load(dir.path(), "fixture").unwrap()
    }

    fn plan_for(profile: &Profile, data_host: &Host) -> LaunchPlan {
        let endpoint = Endpoint::from_profile(profile).unwrap();
        let layout = Layout::new(1920, 1080, profile.window_count(), 0.05, 400);
        build_plan(
            profile,
            &endpoint,
            &layout,
            data_host,
            &PathBuf::from("/opt/eudaq/bin"),
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_devices_keep_the_fixed_launch_order() {
        let plan = plan_for(&profile_from(FULL_INI), &Host::Local);
        let titles: Vec<&str> = plan.devices.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(
            titles,
            [
                "Data Collector TLU",
                "EUDET TLU",
                "CMSREF",
                "CMSDUT",
                "EUDET TELESCOPE",
                "ONLINE MONITOR",
            ]
        );
    }

    #[test]
    fn test_run_control_listens_and_takes_its_geometry() {
        let plan = plan_for(&profile_from(FULL_INI), &Host::Local);
        assert_eq!(plan.run_control.program, "/opt/eudaq/bin/euRun");
        assert_eq!(
            plan.run_control.args,
            ["-x", "0", "-y", "0", "-w", "640", "-g", "720", "-a", "tcp://44000"]
        );
    }

    #[test]
    fn test_log_control_connects_and_clears_the_frame_offset() {
        let plan = plan_for(&profile_from(FULL_INI), &Host::Local);
        assert_eq!(plan.log_control.program, "/opt/eudaq/bin/euLog");
        assert_eq!(
            plan.log_control.args,
            ["-x", "642", "-y", "0", "-w", "640", "-g", "720", "-r", "tcp://127.0.0.1:44000"]
        );
    }

    #[test]
    fn test_local_collector_runs_the_cli_binary() {
        let plan = plan_for(&profile_from(FULL_INI), &Host::Local);
        let collector = &plan.devices[0];
        assert_eq!(collector.program, "/opt/eudaq/bin/euCliCollector");
        assert_eq!(
            collector.args,
            [
                "-n",
                "EventIDSyncDataCollector",
                "-t",
                "TLU",
                "-r",
                "tcp://127.0.0.1:44000",
            ]
        );
        assert_eq!(collector.host, Host::Local);
    }

    #[test]
    fn test_remote_collector_delegates_to_the_host_script() {
        let remote = Host::parse("rapidshare@pim-pc");
        let plan = plan_for(&profile_from(FULL_INI), &remote);
        let collector = &plan.devices[0];
        assert_eq!(collector.program, "scripts/StartDataCollector.sh");
        assert!(collector.args.is_empty());
        assert_eq!(collector.host, remote);
        assert_eq!(
            collector.argv(),
            ["ssh", "-tY", "rapidshare@pim-pc", "scripts/StartDataCollector.sh"]
        );
    }

    #[test]
    fn test_producer_arguments_name_kind_and_instance() {
        let plan = plan_for(&profile_from(FULL_INI), &Host::Local);
        let cmsref = &plan.devices[2];
        assert_eq!(cmsref.program, "/opt/eudaq/bin/euCliProducer");
        assert_eq!(
            cmsref.args,
            ["-n", "CMSPixelProducerREF", "-t", "CMSREF", "-r", "tcp://127.0.0.1:44000"]
        );
    }

    #[test]
    fn test_disabled_devices_are_left_out() {
        let notlu = FULL_INI.replace("tlu = 1", "tlu = 0").replace(
            "onlinemonitor = 1",
            "onlinemonitor = 0",
        );
        let plan = plan_for(&profile_from(&notlu), &Host::Local);
        let titles: Vec<&str> = plan.devices.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, ["Data Collector TLU", "CMSREF", "CMSDUT", "EUDET TELESCOPE"]);
    }

    #[test]
    fn test_monitor_takes_its_instance_from_the_profile() {
        let plan = plan_for(&profile_from(FULL_INI), &Host::Local);
        let monitor = plan.devices.last().unwrap();
        assert_eq!(monitor.program, "/opt/eudaq/bin/StdEventMonitor");
        assert_eq!(
            monitor.args,
            ["-t", "StdEventMonitor", "-r", "tcp://127.0.0.1:44000"]
        );
    }

    #[test]
    fn test_profile_mistakes_fail_the_plan_before_any_launch() {
        let broken = FULL_INI.replace("tlu producer = EudetTluProducer\n", "");
        let profile = profile_from(&broken);
        let endpoint = Endpoint::from_profile(&profile).unwrap();
        let layout = Layout::new(1920, 1080, profile.window_count(), 0.05, 400);
        let err = build_plan(
            &profile,
            &endpoint,
            &layout,
            &Host::Local,
            &PathBuf::from("/opt/eudaq/bin"),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, StartError::MissingOption { .. }));
    }
}
