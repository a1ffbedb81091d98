//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

/// Start the beam-test DAQ fleet described by a configuration profile.
#[derive(Parser, Debug)]
#[command(name = "beamstart", version, about)]
pub struct Args {
    /// Configuration profile name, with or without the .ini extension; a
    /// hyphenated name layers overrides over the base profile (desy-notlu)
    #[arg(default_value = "desy")]
    pub config: String,

    /// Resolve the configuration and compute the layout without touching
    /// any process
    #[arg(short = 't', long)]
    pub test: bool,

    /// Record a detector mask instead of starting a run
    #[arg(short = 'm', long)]
    pub mask: bool,

    /// Directory holding the configuration profiles
    #[arg(short = 'c', long, default_value = "config")]
    pub config_dir: PathBuf,
}
