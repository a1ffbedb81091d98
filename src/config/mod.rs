//! Configuration profiles for the orchestrator.
//!
//! Profiles are INI files in a configuration directory, selected by name on
//! the command line and optionally layered through hyphenated names
//! (`desy-notlu` = `desy.ini` plus the `desy-notlu.ini` overrides).

pub mod profile;

pub use profile::Profile;
