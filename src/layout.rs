//! Screen layout for the fleet's windows.
//!
//! The fleet occupies two rows of one monitor. Run-control and log-control
//! sit at the top, each a third of the monitor wide and two thirds tall.
//! Device windows share a lower row anchored at three quarters of the
//! monitor height, all with the same width, shrinking as more windows are
//! requested.
//!
//! Requested geometry is a hint, not a promise: window managers add frames
//! and may resize terminals to whole character cells. The horizontal cursor
//! therefore advances by the width each window actually received, and the
//! first placement additionally absorbs the manager's frame offset so later
//! windows clear it.

/// Pixel geometry requested for one window, with the title it is found
/// under once mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub width: u16,
    pub height: u16,
    pub x: i16,
    pub y: i16,
    pub title: String,
}

/// Shared width of the device-row windows for `count` total windows on a
/// `max_w` x `max_h` monitor:
///
/// `floor((max_w - (count - 1) * max_w * spacing / max_h) / count) - 4`
///
/// The height-normalized spacing term and the 4 px trim match the geometry
/// the control-room displays were tuned with; negative results clamp to 0.
pub fn device_width(max_w: u16, max_h: u16, count: usize, spacing: f64) -> u16 {
    let max_w = f64::from(max_w);
    let n = count as f64;
    let width = ((max_w - (n - 1.0) * max_w * spacing / f64::from(max_h)) / n).floor() - 4.0;
    width.max(0.0) as u16
}

/// Window placement engine. The shared device width is fixed at
/// construction from the full window count; placements then consume the
/// horizontal cursor left to right.
#[derive(Debug)]
pub struct Layout {
    max_w: u16,
    max_h: u16,
    spacing: f64,
    width: u16,
    device_height: u16,
    x_pos: i16,
    placed: usize,
}

impl Layout {
    /// `count` must be the full window count (run-control, log-control and
    /// one per enabled device) before anything is positioned.
    pub fn new(max_w: u16, max_h: u16, count: usize, spacing: f64, device_height: u16) -> Layout {
        Layout {
            max_w,
            max_h,
            spacing,
            width: device_width(max_w, max_h, count, spacing),
            device_height,
            x_pos: 0,
            placed: 0,
        }
    }

    pub fn device_width(&self) -> u16 {
        self.width
    }

    /// Run-control window: top-left corner, a third of the monitor wide
    /// and two thirds tall.
    pub fn run_control_window(&self) -> WindowSpec {
        WindowSpec {
            width: self.control_width(),
            height: self.control_height(),
            x: 0,
            y: 0,
            title: "RunControl".to_string(),
        }
    }

    /// Log-control window: same size as run-control, placed directly to
    /// its right. `x_min` is the measured frame offset, so the two frames
    /// do not overlap.
    pub fn log_control_window(&self, x_min: i16) -> WindowSpec {
        WindowSpec {
            width: self.control_width(),
            height: self.control_height(),
            x: self.control_width() as i16 + x_min,
            y: 0,
            title: "LogControl".to_string(),
        }
    }

    /// Next device window at the cursor, on the lower row.
    pub fn next_device_window(&self, title: &str) -> WindowSpec {
        WindowSpec {
            width: self.width,
            height: self.device_height,
            x: self.x_pos,
            y: self.device_row_y(),
            title: title.to_string(),
        }
    }

    /// Advance the cursor past a placed window. `measured_width` and
    /// `measured_x` come from the window manager; the frame offset of the
    /// first window is added once so every later window clears it.
    pub fn advance(&mut self, measured_width: u16, measured_x: i16) {
        let frame_offset = if self.placed == 0 {
            f64::from(measured_x).max(0.0)
        } else {
            0.0
        };
        self.x_pos += (f64::from(measured_width) + self.spacing + frame_offset).floor() as i16;
        self.placed += 1;
    }

    /// Device windows placed so far.
    pub fn placed(&self) -> usize {
        self.placed
    }

    fn control_width(&self) -> u16 {
        self.max_w / 3
    }

    fn control_height(&self) -> u16 {
        (u32::from(self.max_h) * 2 / 3) as u16
    }

    fn device_row_y(&self) -> i16 {
        (u32::from(self.max_h) * 3 / 4) as i16
    }
}
