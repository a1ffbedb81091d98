//! Fleet lifecycle steps that run before anything is launched.
//!
//! A new run never coexists with the previous one: every fleet process is
//! killed first, on this machine and on every remote host the profile
//! names. The previous run's raw data files are then made read-only so a
//! dying process cannot touch them while the new fleet comes up.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, ExitStatus};

use tracing::{debug, info};

use crate::config::Profile;
use crate::constants::{data, fleet, ssh};
use crate::error::{Result, StartError};
use crate::host::Host;

/// Build the kill sweep as argv lists: one `pkill -9` per fleet process
/// name locally, then a single combined sweep per distinct remote host.
/// Process names are matched by command name, not full command line, so
/// the sweep cannot kill its own remote shell.
pub fn kill_commands(beam: &Host, data: &Host) -> Vec<Vec<String>> {
    let mut commands: Vec<Vec<String>> = fleet::KILL_SWEEP
        .iter()
        .map(|name| vec!["pkill".to_string(), "-9".to_string(), (*name).to_string()])
        .collect();

    for id in remote_ids(beam, data) {
        let sweep = fleet::KILL_SWEEP
            .iter()
            .map(|name| format!("pkill -9 {name}"))
            .collect::<Vec<_>>()
            .join("; ");
        commands.push(vec![
            ssh::PROGRAM.to_string(),
            ssh::FORCE_TTY.to_string(),
            id.to_string(),
            sweep,
        ]);
    }
    commands
}

fn remote_ids<'a>(beam: &'a Host, data: &'a Host) -> Vec<&'a str> {
    let mut ids = Vec::new();
    for host in [beam, data] {
        if let Some(id) = host.id() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Build the protect step as argv lists: a local data host is walked
/// directly and yields none; a remote one yields a single chmod over
/// the raw-file glob.
pub fn protect_commands(data_host: &Host, profile: &Profile) -> Result<Vec<Vec<String>>> {
    Ok(match data_host {
        Host::Local => Vec::new(),
        Host::Remote(id) => vec![vec![
            ssh::PROGRAM.to_string(),
            ssh::FORCE_TTY.to_string(),
            id.clone(),
            "chmod".to_string(),
            format!("{:o}", data::READ_ONLY_MODE),
            remote_raw_glob(data_host, profile)?,
        ]],
    })
}

/// Terminate every fleet process from previous runs. Blocks until the
/// whole sweep has run; pkill's "nothing matched" exit is not an error.
pub fn kill_all(beam: &Host, data: &Host) -> Result<()> {
    info!("stopping previous fleet processes");
    for argv in kill_commands(beam, data) {
        if let Some(status) = run_argv(&argv)? {
            if !status.success() {
                debug!(command = ?argv, %status, "kill step exited non-zero");
            }
        }
    }
    Ok(())
}

/// Make the previous run's raw files read-only. A local data host is
/// walked directly; a remote one gets a single chmod over the raw-file
/// glob, expanded by the remote shell.
pub fn protect_previous_data(data_host: &Host, profile: &Profile) -> Result<()> {
    match data_host {
        Host::Local => {
            let data_dir = profile.daq_dir()?.join("data");
            let count = protect_local(&data_dir)?;
            info!(count, dir = %data_dir.display(), "previous raw files set read-only");
            Ok(())
        }
        Host::Remote(_) => {
            for argv in protect_commands(data_host, profile)? {
                if let Some(status) = run_argv(&argv)? {
                    if !status.success() {
                        return Err(StartError::RemoteCommandFailed {
                            host: data_host.to_string(),
                            step: "protect raw data".to_string(),
                            status,
                        });
                    }
                }
            }
            info!(host = %data_host, "previous raw files set read-only");
            Ok(())
        }
    }
}

/// Run one pre-rendered argv to completion; empty lists are skipped.
fn run_argv(argv: &[String]) -> Result<Option<ExitStatus>> {
    let Some((program, args)) = argv.split_first() else {
        return Ok(None);
    };
    debug!(command = ?argv, "running");
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| StartError::Spawn {
            title: argv.join(" "),
            source,
        })?;
    Ok(Some(status))
}

fn protect_local(data_dir: &Path) -> Result<usize> {
    if !data_dir.is_dir() {
        debug!(dir = %data_dir.display(), "no data directory, nothing to protect");
        return Ok(0);
    }
    let mut protected = 0;
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(data::RAW_PREFIX) && name.ends_with(data::RAW_SUFFIX) {
            let mut permissions = entry.metadata()?.permissions();
            permissions.set_mode(data::READ_ONLY_MODE);
            fs::set_permissions(entry.path(), permissions)?;
            protected += 1;
        }
    }
    Ok(protected)
}

/// `/home/<user>/<data dir>/data/run*.raw` on the data host.
fn remote_raw_glob(host: &Host, profile: &Profile) -> Result<String> {
    let dir = host.home()?.join(profile.data_dir()?).join("data");
    Ok(format!("{}/{}", dir.display(), data::RAW_GLOB))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_hosts_sweep_without_ssh() {
        let commands = kill_commands(&Host::Local, &Host::Local);
        assert_eq!(commands.len(), 6);
        for argv in &commands {
            assert_eq!(argv[0], "pkill");
            assert_eq!(argv[1], "-9");
        }
        let names: Vec<&str> = commands.iter().map(|argv| argv[2].as_str()).collect();
        assert_eq!(
            names,
            ["euRun", "euLog", "euCliCollector", "euCliProducer", "StdEventMonitor", "xterm"]
        );
    }

    #[test]
    fn test_shared_remote_host_is_swept_once() {
        let remote = Host::parse("rapidshare@pim-pc");
        let commands = kill_commands(&remote, &remote);
        assert_eq!(commands.len(), 7);

        let sweep = commands.last().unwrap();
        assert_eq!(sweep[0], "ssh");
        assert_eq!(sweep[1], "-tY");
        assert_eq!(sweep[2], "rapidshare@pim-pc");
        assert!(sweep[3].starts_with("pkill -9 euRun; pkill -9 euLog;"));
        assert!(sweep[3].ends_with("pkill -9 xterm"));
    }

    #[test]
    fn test_distinct_remote_hosts_are_each_swept() {
        let commands = kill_commands(&Host::parse("a@one"), &Host::parse("b@two"));
        assert_eq!(commands.len(), 8);
        let targets: Vec<&str> = commands[6..].iter().map(|argv| argv[2].as_str()).collect();
        assert_eq!(targets, ["a@one", "b@two"]);
    }

    #[test]
    fn test_protect_local_touches_only_raw_files() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("run000123_250101120000.raw");
        let other = dir.path().join("notes.txt");
        fs::write(&raw, b"data").unwrap();
        fs::write(&other, b"text").unwrap();

        let count = protect_local(dir.path()).unwrap();
        assert_eq!(count, 1);

        let raw_mode = fs::metadata(&raw).unwrap().permissions().mode() & 0o777;
        assert_eq!(raw_mode, 0o444);
        let other_mode = fs::metadata(&other).unwrap().permissions().mode() & 0o777;
        assert_ne!(other_mode, 0o444);
    }

    #[test]
    fn test_protect_local_missing_directory_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let count = protect_local(&dir.path().join("data")).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_remote_raw_glob_lives_under_the_remote_home() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("psi.ini"),
            "[DIR]\ndata = software/eudaq\n",
        )
        .unwrap();
        let profile = Profile::load(dir.path(), "psi").unwrap();
        let host = Host::parse("rapidshare@pim-pc");
        assert_eq!(
            remote_raw_glob(&host, &profile).unwrap(),
            "/home/rapidshare/software/eudaq/data/run*.raw"
        );
    }

    #[test]
    fn test_remote_data_host_gets_exactly_one_chmod() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("psi.ini"),
            "[DIR]\ndata = software/eudaq\n",
        )
        .unwrap();
        let profile = Profile::load(dir.path(), "psi").unwrap();

        let commands = protect_commands(&Host::parse("rapidshare@pim-pc"), &profile).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0],
            [
                "ssh",
                "-tY",
                "rapidshare@pim-pc",
                "chmod",
                "444",
                "/home/rapidshare/software/eudaq/data/run*.raw",
            ]
        );
    }

    #[test]
    fn test_local_data_host_needs_no_protect_commands() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("desy.ini"), "[DIR]\ndata = software/eudaq\n").unwrap();
        let profile = Profile::load(dir.path(), "desy").unwrap();
        assert!(protect_commands(&Host::Local, &profile).unwrap().is_empty());
    }
}
