//! xterm hosting for device processes.
//!
//! Every device process runs inside its own xterm so its output stays
//! visible on the control-room screen. xterm takes geometry in character
//! cells while the layout engine works in pixels, so a short-lived probe
//! window with a known cell count is measured once to learn the cell size
//! and the window manager's frame offset.

use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::{delays, xterm};
use crate::error::{Result, StartError};
use crate::host::ProcessSpec;
use crate::layout::WindowSpec;
use crate::x11_utils::Inspector;

/// Measured conversion between the layout engine's pixels and xterm's
/// character-cell geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub cell_width: u16,
    pub cell_height: u16,
    /// Horizontal frame offset the manager adds to requested positions.
    pub x_min: i16,
}

impl Default for Calibration {
    /// Cell size of the default xterm fixed font, for when the probe
    /// cannot run.
    fn default() -> Calibration {
        Calibration {
            cell_width: xterm::FALLBACK_CELL_WIDTH,
            cell_height: xterm::FALLBACK_CELL_HEIGHT,
            x_min: 0,
        }
    }
}

/// Learn the cell size and frame offset from a probe window. Probe
/// failures fall back to the fixed-font cell size rather than aborting.
pub fn calibrate(inspector: &Inspector) -> Calibration {
    match probe(inspector) {
        Ok(calibration) => {
            info!(
                cell_width = calibration.cell_width,
                cell_height = calibration.cell_height,
                x_min = calibration.x_min,
                "calibrated terminal geometry"
            );
            calibration
        }
        Err(err) => {
            warn!(error = %err, "geometry probe failed, using fixed-font cell size");
            Calibration::default()
        }
    }
}

fn probe(inspector: &Inspector) -> Result<Calibration> {
    let mut child = Command::new(xterm::PROGRAM)
        .arg("-xrm")
        .arg(xterm::FIXED_TITLE_RESOURCE)
        .arg("-geometry")
        .arg(format!(
            "{}x{}+0+0",
            xterm::PROBE_COLUMNS,
            xterm::PROBE_ROWS
        ))
        .arg("-T")
        .arg(xterm::PROBE_TITLE)
        .spawn()
        .map_err(|source| StartError::Spawn {
            title: xterm::PROBE_TITLE.to_string(),
            source,
        })?;

    settle(delays::WINDOW);
    let measured = inspector.measure(xterm::PROBE_TITLE);
    // The probe has served its purpose either way.
    let _ = child.kill();
    let _ = child.wait();
    let rect = measured?;

    Ok(Calibration {
        cell_width: (rect.width / xterm::PROBE_COLUMNS).max(1),
        cell_height: (rect.height / xterm::PROBE_ROWS).max(1),
        x_min: rect.x.max(0),
    })
}

/// xterm argv for one device window: title changes pinned, pixel geometry
/// converted to cells, and the hosted command after `-e`.
pub fn xterm_args(window: &WindowSpec, process: &ProcessSpec, cal: &Calibration) -> Vec<String> {
    let columns = (window.width / cal.cell_width).max(1);
    let rows = (window.height / cal.cell_height).max(1);
    let mut args = vec![
        "-xrm".to_string(),
        xterm::FIXED_TITLE_RESOURCE.to_string(),
        "-geometry".to_string(),
        format!("{columns}x{rows}+{}+{}", window.x, window.y),
        "-hold".to_string(),
        "-T".to_string(),
        window.title.clone(),
        "-e".to_string(),
    ];
    args.extend(process.argv());
    args
}

/// Open the terminal window and leave it running. The child handle is
/// dropped on purpose: fleet processes outlive the orchestrator and are
/// only ever stopped by the next run's kill sweep.
pub fn spawn_in_window(
    window: &WindowSpec,
    process: &ProcessSpec,
    cal: &Calibration,
) -> Result<()> {
    info!(title = %window.title, x = window.x, y = window.y, "opening terminal window");
    let args = xterm_args(window, process, cal);
    debug!(?args, "xterm invocation");
    Command::new(xterm::PROGRAM)
        .args(args)
        .spawn()
        .map(drop)
        .map_err(|source| StartError::Spawn {
            title: window.title.clone(),
            source,
        })
}

/// Single suspension point between launch steps, standing in for real
/// readiness probes.
pub fn settle(duration: Duration) {
    thread::sleep(duration);
}
