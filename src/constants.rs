//! Application-wide constants
//!
//! Single source of truth for the external program names, timing values and
//! magic strings the orchestrator depends on.

/// DAQ fleet executables, addressed relative to the `bin/` directory of the
/// configured DAQ installation root.
pub mod fleet {
    /// Run-control GUI (draws its own window, takes geometry flags)
    pub const RUN_CONTROL: &str = "euRun";

    /// Log-collector GUI (draws its own window, takes geometry flags)
    pub const LOG_CONTROL: &str = "euLog";

    /// Data collector CLI
    pub const COLLECTOR: &str = "euCliCollector";

    /// Producer CLI shared by all device producers
    pub const PRODUCER: &str = "euCliProducer";

    /// Online monitor executable
    pub const MONITOR: &str = "StdEventMonitor";

    /// Startup script used instead of a direct collector invocation when the
    /// data host is remote (path relative to the remote home)
    pub const REMOTE_COLLECTOR_SCRIPT: &str = "scripts/StartDataCollector.sh";

    /// Process names swept by the kill step before a new run starts
    pub const KILL_SWEEP: [&str; 6] = [
        RUN_CONTROL,
        LOG_CONTROL,
        COLLECTOR,
        PRODUCER,
        MONITOR,
        "xterm",
    ];
}

/// Terminal emulator hosting every device process
pub mod xterm {
    /// xterm binary name
    pub const PROGRAM: &str = "xterm";

    /// Resource string keeping launched programs from retitling the window,
    /// which would break title-based geometry measurement
    pub const FIXED_TITLE_RESOURCE: &str = "XTerm.vt100.allowTitleOps: false";

    /// Cell size of the default `fixed` font, used when probe calibration is
    /// unavailable
    pub const FALLBACK_CELL_WIDTH: u16 = 6;
    pub const FALLBACK_CELL_HEIGHT: u16 = 13;

    /// Character geometry of the calibration probe window
    pub const PROBE_COLUMNS: u16 = 100;
    pub const PROBE_ROWS: u16 = 30;

    /// Title of the calibration probe window
    pub const PROBE_TITLE: &str = "geometry probe";
}

/// Settle delays standing in for readiness synchronization (see
/// `terminal::settle`)
pub mod delays {
    use std::time::Duration;

    /// Pause after starting run-control or log-control
    pub const CONTROL: Duration = Duration::from_secs(1);

    /// Pause after opening a device window, before it is measured
    pub const WINDOW: Duration = Duration::from_millis(500);

    /// Interval between window-measurement retries
    pub const MEASURE_RETRY: Duration = Duration::from_millis(250);

    /// Measurement attempts before giving up on a window
    pub const MEASURE_ATTEMPTS: u32 = 8;
}

/// Raw data files protected between runs
pub mod data {
    /// Data files are named `run<number>_<timestamp>.raw`
    pub const RAW_PREFIX: &str = "run";
    pub const RAW_SUFFIX: &str = ".raw";

    /// Shell glob matching the same files on a remote data host
    pub const RAW_GLOB: &str = "run*.raw";

    /// Read-only mode applied to previous runs
    pub const READ_ONLY_MODE: u32 = 0o444;
}

/// Remote-shell transport
pub mod ssh {
    pub const PROGRAM: &str = "ssh";

    /// Force a tty and trusted X forwarding, as the fleet scripts expect
    pub const FORCE_TTY: &str = "-tY";
}

/// Run-control rendezvous endpoint
pub mod endpoint {
    pub const SCHEME: &str = "tcp";

    /// Rendezvous address handed to every fleet process
    pub const LOOPBACK: &str = "127.0.0.1";
}
