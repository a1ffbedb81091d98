//! Layered INI profile loading and typed access.
//!
//! A profile name selects `<dir>/<name>.ini`. A single hyphen splits the
//! name into a base and an override layer: `desy-notlu` loads `desy.ini`
//! first and merges `desy-notlu.ini` on top, option by option, so the layer
//! only has to carry the values it changes. The merged result is held as a
//! section/option string map and read through typed accessors; sections and
//! options are matched case-insensitively, as INI consumers expect.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, File, FileFormat};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, StartError};
use crate::host::Host;

/// Section name → option name → value, keys normalized to lowercase.
type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// Shape of a parsed profile before key normalization.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawSections(Sections);

/// A resolved configuration profile. Built once at startup and immutable
/// for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    name: String,
    sections: Sections,
}

impl Profile {
    /// Load the named profile from `dir`. A trailing `.ini` on the name is
    /// tolerated. The base file must exist; a missing override layer is
    /// skipped with a warning so `base-base` style names stay harmless.
    pub fn load(dir: &Path, name: &str) -> Result<Profile> {
        let name = name.trim_end_matches(".ini");
        let base = name.split('-').next().unwrap_or(name);
        let base_path = dir.join(format!("{base}.ini"));
        if !base_path.is_file() {
            return Err(StartError::ConfigNotFound(base_path));
        }

        let mut builder =
            Config::builder().add_source(File::from(base_path.as_path()).format(FileFormat::Ini));
        if name.contains('-') {
            let layer_path = dir.join(format!("{name}.ini"));
            if layer_path.is_file() {
                debug!(layer = %layer_path.display(), "applying override layer");
                builder = builder
                    .add_source(File::from(layer_path.as_path()).format(FileFormat::Ini));
            } else {
                warn!(
                    layer = %layer_path.display(),
                    "override layer not found, using the base profile alone"
                );
            }
        }

        let raw: RawSections = builder.build()?.try_deserialize()?;
        Ok(Profile::from_sections(name, raw.0))
    }

    fn from_sections(name: &str, raw: Sections) -> Profile {
        let mut sections = Sections::new();
        for (section, options) in raw {
            let entry = sections.entry(section.to_lowercase()).or_default();
            for (option, value) in options {
                entry.insert(option.to_lowercase(), value);
            }
        }
        Profile {
            name: name.to_string(),
            sections,
        }
    }

    /// Profile name as loaded, without the `.ini` extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw option lookup, case-insensitive in section and option.
    pub fn get(&self, section: &str, option: &str) -> Option<&str> {
        self.sections
            .get(&section.to_lowercase())?
            .get(&option.to_lowercase())
            .map(String::as_str)
    }

    fn require(&self, section: &str, option: &str) -> Result<&str> {
        self.get(section, option)
            .ok_or_else(|| StartError::MissingOption {
                section: section.to_string(),
                option: option.to_string(),
            })
    }

    fn parse<T: FromStr>(&self, section: &str, option: &str) -> Result<T> {
        let value = self.require(section, option)?;
        value
            .trim()
            .parse()
            .map_err(|_| StartError::InvalidOption {
                section: section.to_string(),
                option: option.to_string(),
                value: value.to_string(),
            })
    }

    /// Run-control port, `[port] rc`.
    pub fn rc_port(&self) -> Result<u16> {
        self.parse("port", "rc")
    }

    /// Index of the monitor the fleet is laid out on.
    pub fn monitor_number(&self) -> Result<usize> {
        self.parse("window", "monitor number")
    }

    /// Horizontal spacing factor between device windows.
    pub fn spacing(&self) -> Result<f64> {
        self.parse("window", "spacing")
    }

    /// Height of the device-row windows in pixels.
    pub fn window_height(&self) -> Result<u16> {
        self.parse("window", "height")
    }

    /// The `[device]` section as an ordered device → enabled map.
    pub fn devices(&self) -> BTreeMap<String, bool> {
        self.sections
            .get("device")
            .map(|options| {
                options
                    .iter()
                    .map(|(device, value)| (device.clone(), parse_flag(value)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a device is enabled. Devices absent from the profile count
    /// as disabled.
    pub fn device_enabled(&self, device: &str) -> bool {
        self.get("device", device).map(parse_flag).unwrap_or(false)
    }

    /// Number of windows the layout has to accommodate: run-control and
    /// log-control plus one per enabled device.
    pub fn window_count(&self) -> usize {
        2 + self.devices().values().filter(|&&enabled| enabled).count()
    }

    /// Where the given role runs, `[host] <role>`. The literal `none`
    /// keeps the role on the orchestrating machine.
    pub fn host(&self, role: &str) -> Result<Host> {
        Ok(Host::parse(self.require("host", role)?))
    }

    /// DAQ installation root, `[dir] daq`, with a leading `~` expanded.
    pub fn daq_dir(&self) -> Result<PathBuf> {
        expand_home(self.require("dir", "daq")?)
    }

    /// Data directory fragment under the data host's home.
    pub fn data_dir(&self) -> Result<&str> {
        self.require("dir", "data")
    }

    /// Telescope directory the mask files are written under.
    pub fn telescope_dir(&self) -> Result<&str> {
        self.require("dir", "telescope")
    }

    /// Free-form `[misc]` values (collector kind, producer kinds, ...).
    pub fn misc(&self, option: &str) -> Result<&str> {
        self.require("misc", option)
    }

    /// Instance names from the `[name]` section.
    pub fn role_name(&self, role: &str) -> Result<&str> {
        self.require("name", role)
    }
}

/// ConfigParser-style booleans: `1`, `true`, `yes` and `on` enable a
/// device, anything else disables it.
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn expand_home(dir: &str) -> Result<PathBuf> {
    if dir == "~" {
        return dirs::home_dir().ok_or(StartError::HomeDir);
    }
    if let Some(rest) = dir.strip_prefix("~/") {
        return Ok(dirs::home_dir().ok_or(StartError::HomeDir)?.join(rest));
    }
    Ok(PathBuf::from(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DESY_INI: &str = "\
[PORT]
rc = 44000

[WINDOW]
monitor number = 0
spacing = 0.05
height = 400

[DEVICE]
tlu = 1
cmsref = 1
cmsdut = 0
ni = true
onlinemonitor = no

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
inet device = eth0

[NAME]
data collector = TLU
tlu producer = tlu
";

    fn write_profile(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(format!("{name}.ini")), contents).unwrap();
    }

    fn desy_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_profile(&dir, "desy", DESY_INI);
        dir
    }

    #[test]
    fn test_load_reads_schema_values() {
        let dir = desy_dir();
        let profile = Profile::load(dir.path(), "desy").unwrap();

        assert_eq!(profile.name(), "desy");
        assert_eq!(profile.rc_port().unwrap(), 44000);
        assert_eq!(profile.monitor_number().unwrap(), 0);
        assert_eq!(profile.spacing().unwrap(), 0.05);
        assert_eq!(profile.window_height().unwrap(), 400);
        assert_eq!(profile.data_dir().unwrap(), "software/eudaq");
        assert_eq!(profile.telescope_dir().unwrap(), "telescope");
        assert_eq!(profile.misc("tlu producer").unwrap(), "EudetTluProducer");
        assert_eq!(profile.role_name("data collector").unwrap(), "TLU");
        assert_eq!(profile.daq_dir().unwrap(), PathBuf::from("/opt/eudaq"));
    }

    #[test]
    fn test_load_strips_ini_extension() {
        let dir = desy_dir();
        let profile = Profile::load(dir.path(), "desy.ini").unwrap();
        assert_eq!(profile.name(), "desy");
        assert_eq!(profile.rc_port().unwrap(), 44000);
    }

    #[test]
    fn test_missing_base_is_config_not_found() {
        let dir = TempDir::new().unwrap();
        let err = Profile::load(dir.path(), "nosuch").unwrap_err();
        assert!(matches!(err, StartError::ConfigNotFound(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_layering_base_over_itself_changes_nothing() {
        let dir = desy_dir();
        write_profile(&dir, "desy-desy", DESY_INI);

        let plain = Profile::load(dir.path(), "desy").unwrap();
        let mut layered = Profile::load(dir.path(), "desy-desy").unwrap();
        layered.name = plain.name.clone();
        assert_eq!(plain, layered);
    }

    #[test]
    fn test_layering_overrides_only_named_options() {
        let dir = desy_dir();
        write_profile(&dir, "desy-lowwin", "[WINDOW]\nheight = 250\n");

        let base = Profile::load(dir.path(), "desy").unwrap();
        let layered = Profile::load(dir.path(), "desy-lowwin").unwrap();

        assert_eq!(layered.window_height().unwrap(), 250);
        // Every other option keeps the base value, including the rest of
        // the overridden section.
        assert_eq!(layered.spacing().unwrap(), base.spacing().unwrap());
        assert_eq!(
            layered.monitor_number().unwrap(),
            base.monitor_number().unwrap()
        );
        assert_eq!(layered.rc_port().unwrap(), base.rc_port().unwrap());
        assert_eq!(layered.devices(), base.devices());
        assert_eq!(layered.host("data").unwrap(), base.host("data").unwrap());
    }

    #[test]
    fn test_missing_override_layer_falls_back_to_base() {
        let dir = desy_dir();
        let profile = Profile::load(dir.path(), "desy-nosuch").unwrap();
        assert_eq!(profile.rc_port().unwrap(), 44000);
    }

    #[test]
    fn test_device_flags_accept_ini_booleans() {
        let dir = desy_dir();
        let profile = Profile::load(dir.path(), "desy").unwrap();

        assert!(profile.device_enabled("tlu"));
        assert!(profile.device_enabled("cmsref"));
        assert!(profile.device_enabled("ni"));
        assert!(!profile.device_enabled("cmsdut"));
        assert!(!profile.device_enabled("onlinemonitor"));
        // Absent devices are disabled, not an error.
        assert!(!profile.device_enabled("drs4"));
    }

    #[test]
    fn test_window_count_is_two_plus_enabled_devices() {
        let dir = desy_dir();
        let profile = Profile::load(dir.path(), "desy").unwrap();
        // tlu, cmsref and ni are enabled in the fixture.
        assert_eq!(profile.window_count(), 5);

        write_profile(
            &dir,
            "desy-tluonly",
            "[DEVICE]\ntlu = 1\ncmsref = 0\ncmsdut = 0\nni = 0\nonlinemonitor = 0\n",
        );
        let tlu_only = Profile::load(dir.path(), "desy-tluonly").unwrap();
        assert_eq!(tlu_only.window_count(), 3);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let dir = desy_dir();
        let profile = Profile::load(dir.path(), "desy").unwrap();
        assert_eq!(profile.get("PORT", "RC"), Some("44000"));
        assert_eq!(profile.get("Window", "Monitor Number"), Some("0"));
    }

    #[test]
    fn test_missing_option_names_the_key() {
        let dir = desy_dir();
        let profile = Profile::load(dir.path(), "desy").unwrap();
        let err = profile.misc("converter").unwrap_err();
        assert!(matches!(
            err,
            StartError::MissingOption { ref section, ref option }
                if section == "misc" && option == "converter"
        ));
    }

    #[test]
    fn test_invalid_numeric_option_is_reported() {
        let dir = TempDir::new().unwrap();
        write_profile(&dir, "bad", "[PORT]\nrc = not-a-port\n");
        let profile = Profile::load(dir.path(), "bad").unwrap();
        let err = profile.rc_port().unwrap_err();
        assert!(matches!(err, StartError::InvalidOption { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_parse_flag_variants() {
        for enabled in ["1", "true", "YES", "On", " 1 "] {
            assert!(parse_flag(enabled), "{enabled:?} should enable");
        }
        for disabled in ["0", "false", "off", "no", "", "banana"] {
            assert!(!parse_flag(disabled), "{disabled:?} should disable");
        }
    }

    #[test]
    fn test_expand_home_passes_absolute_paths_through() {
        assert_eq!(
            expand_home("/opt/eudaq").unwrap(),
            PathBuf::from("/opt/eudaq")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/eudaq").unwrap(), home.join("eudaq"));
        }
    }
}
