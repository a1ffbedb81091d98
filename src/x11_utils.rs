//! X11 window introspection.
//!
//! After each window is opened the manager's placement is treated as
//! ground truth: the window is located by its title through the EWMH
//! client list and its final geometry is read back, so the layout cursor
//! tracks what is actually on screen rather than what was requested.

use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::randr::ConnectionExt as RandrExt;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

use crate::constants::delays;
use crate::error::{Result, StartError};

/// Root-absolute pixel geometry of a mapped window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

/// Pre-cached X11 atoms to avoid repeated roundtrips
struct CachedAtoms {
    net_client_list: Atom,
    wm_name: Atom,
    net_wm_name: Atom,
    utf8_string: Atom,
}

impl CachedAtoms {
    fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            net_client_list: conn.intern_atom(false, b"_NET_CLIENT_LIST")?.reply()?.atom,
            wm_name: conn.intern_atom(false, b"WM_NAME")?.reply()?.atom,
            net_wm_name: conn.intern_atom(false, b"_NET_WM_NAME")?.reply()?.atom,
            utf8_string: conn.intern_atom(false, b"UTF8_STRING")?.reply()?.atom,
        })
    }
}

/// Live X11 connection plus the root window it inspects.
pub struct Inspector {
    conn: RustConnection,
    root: Window,
    atoms: CachedAtoms,
}

impl Inspector {
    /// Connect to the display named by `DISPLAY` and cache the atoms used
    /// for title lookups.
    pub fn connect() -> Result<Inspector> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        info!(
            screen = screen_num,
            width = screen.width_in_pixels,
            height = screen.height_in_pixels,
            "connected to X11"
        );
        let atoms = CachedAtoms::new(&conn)?;
        Ok(Inspector { conn, root, atoms })
    }

    /// Pixel size of the monitor at `index` in the RandR monitor list.
    pub fn monitor_size(&self, index: usize) -> Result<(u16, u16)> {
        let reply = self.conn.randr_get_monitors(self.root, true)?.reply()?;
        let available = reply.monitors.len();
        let monitor = reply
            .monitors
            .get(index)
            .ok_or(StartError::Monitor { index, available })?;
        Ok((monitor.width, monitor.height))
    }

    /// Find a mapped window whose title is exactly `title`.
    pub fn find_window(&self, title: &str) -> Result<Option<Window>> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms.net_client_list,
                AtomEnum::WINDOW,
                0,
                u32::MAX,
            )?
            .reply()?;
        let Some(windows) = reply.value32() else {
            warn!("window manager did not return a usable client list");
            return Ok(None);
        };
        for window in windows {
            // Windows can vanish between the list and the title read.
            match self.window_title(window) {
                Ok(Some(name)) if name == title => return Ok(Some(window)),
                Ok(_) => {}
                Err(err) => debug!(window, error = %err, "skipping unreadable window"),
            }
        }
        Ok(None)
    }

    /// WM_NAME first (terminals set it), _NET_WM_NAME for toolkit windows.
    fn window_title(&self, window: Window) -> Result<Option<String>> {
        let reply = self
            .conn
            .get_property(false, window, self.atoms.wm_name, AtomEnum::STRING, 0, 1024)?
            .reply()?;
        if !reply.value.is_empty() {
            return Ok(Some(String::from_utf8_lossy(&reply.value).into_owned()));
        }

        let reply = self
            .conn
            .get_property(
                false,
                window,
                self.atoms.net_wm_name,
                self.atoms.utf8_string,
                0,
                1024,
            )?
            .reply()?;
        if reply.value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&reply.value).into_owned()))
        }
    }

    /// Root-absolute geometry of a window.
    pub fn geometry(&self, window: Window) -> Result<Rect> {
        let geom = self.conn.get_geometry(window)?.reply()?;
        let abs = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)?
            .reply()?;
        Ok(Rect {
            x: abs.dst_x,
            y: abs.dst_y,
            width: geom.width,
            height: geom.height,
        })
    }

    /// Measure the window carrying `title`, retrying over a bounded settle
    /// window while the manager maps it.
    pub fn measure(&self, title: &str) -> Result<Rect> {
        for attempt in 0..delays::MEASURE_ATTEMPTS {
            if let Some(window) = self.find_window(title)? {
                let rect = self.geometry(window)?;
                debug!(title, ?rect, attempt, "measured window");
                return Ok(rect);
            }
            std::thread::sleep(delays::MEASURE_RETRY);
        }
        Err(StartError::WindowMeasurement(title.to_string()))
    }
}
