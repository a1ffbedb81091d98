//! Interactive detector-mask capture.
//!
//! Between runs the shifter records the noisy region of the two pixel
//! planes. The answers become a timestamped `.msk` file in the telescope
//! directory on the beam host, one `cornBot`/`cornTop` corner pair per
//! plane, which the analysis chain picks up by file name.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local};
use tracing::info;

use crate::config::Profile;
use crate::constants::ssh;
use crate::error::{Result, StartError};
use crate::host::Host;

/// Masked region of one detector plane, as (low, high) pixel ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneMask {
    pub x: (u32, u32),
    pub y: (u32, u32),
}

/// Ask for the detector names and both plane ranges, then write the mask
/// file to the beam host. Returns the path written.
pub fn record(
    input: &mut impl BufRead,
    output: &mut impl Write,
    beam: &Host,
    profile: &Profile,
) -> Result<PathBuf> {
    let detectors = prompt(input, output, "Enter the name of the detectors with a \"-\": ")?;
    let planes = [
        prompt_plane(input, output, 1)?,
        prompt_plane(input, output, 2)?,
    ];

    let file_name = mask_file_name(&detectors, Local::now());
    let contents = format_mask(&planes);
    let path = mask_dir(beam, profile)?.join(&file_name);
    write_mask(beam, &path, &contents)?;

    writeln!(output, "{file_name}")?;
    info!(file = %path.display(), "mask recorded");
    Ok(path)
}

/// `<detectors>_<YYYY-MM-DD_HH-MM-SS>.msk`
pub fn mask_file_name(detectors: &str, now: DateTime<Local>) -> String {
    format!("{detectors}_{}.msk", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Fixed-width mask layout: per plane the bottom corner on the low end of
/// both ranges, the top corner on the high end, coordinates right-aligned
/// to two columns.
pub fn format_mask(planes: &[PlaneMask; 2]) -> String {
    let mut out = String::new();
    for (index, plane) in planes.iter().enumerate() {
        let n = index + 1;
        out.push_str(&format!("cornBot {n} {:>2} {:>2}\n", plane.x.0, plane.y.0));
        out.push_str(&format!("cornTop {n} {:>2} {:>2}\n\n", plane.x.1, plane.y.1));
    }
    out
}

fn prompt_plane(
    input: &mut impl BufRead,
    output: &mut impl Write,
    plane: usize,
) -> Result<PlaneMask> {
    let x = prompt_pair(
        input,
        output,
        &format!("Enter the x-range for plane {plane} (x1 x2): "),
    )?;
    let y = prompt_pair(
        input,
        output,
        &format!("Enter the y-range for plane {plane} (y1 y2): "),
    )?;
    Ok(PlaneMask { x, y })
}

fn prompt(input: &mut impl BufRead, output: &mut impl Write, text: &str) -> Result<String> {
    write!(output, "{text}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_pair(
    input: &mut impl BufRead,
    output: &mut impl Write,
    text: &str,
) -> Result<(u32, u32)> {
    let line = prompt(input, output, text)?;
    let mut parts = line.split_whitespace().map(str::parse::<u32>);
    match (parts.next(), parts.next()) {
        (Some(Ok(low)), Some(Ok(high))) => Ok((low, high)),
        _ => Err(StartError::MaskInput(line)),
    }
}

/// Telescope directory on the beam host. An absolute configured path is
/// honored as-is, a relative one lives under the beam host's home.
fn mask_dir(beam: &Host, profile: &Profile) -> Result<PathBuf> {
    let telescope = PathBuf::from(profile.telescope_dir()?);
    if telescope.is_absolute() {
        Ok(telescope)
    } else {
        Ok(beam.home()?.join(telescope))
    }
}

fn write_mask(beam: &Host, path: &Path, contents: &str) -> Result<()> {
    match beam {
        Host::Local => Ok(std::fs::write(path, contents)?),
        Host::Remote(id) => {
            let mut cmd = Command::new(ssh::PROGRAM);
            cmd.arg(ssh::FORCE_TTY)
                .arg(id)
                .arg(remote_write_line(contents, path));
            beam.run_checked("write mask file", &mut cmd)
        }
    }
}

/// One remote shell line; the quotes keep the multi-line contents a single
/// word for the redirect.
fn remote_write_line(contents: &str, path: &Path) -> String {
    format!("echo '{contents}' > {}", path.display())
}
