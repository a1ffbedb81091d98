//! Local-vs-remote execution of fleet commands.
//!
//! Every role in the profile's `[host]` section resolves to a [`Host`].
//! The literal value `none` keeps the role on the orchestrating machine;
//! anything else is an ssh target, optionally `user@machine`. Remote
//! commands are wrapped in `ssh -tY` so X11 forwarding and a terminal are
//! available on the far side, matching how the control-room machines are
//! reached by hand.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::constants::ssh;
use crate::error::{Result, StartError};

/// Where a fleet role runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Local,
    Remote(String),
}

impl Host {
    /// Parse a `[host]` value. `none` in any case means local.
    pub fn parse(value: &str) -> Host {
        let value = value.trim();
        if value.eq_ignore_ascii_case("none") {
            Host::Local
        } else {
            Host::Remote(value.to_string())
        }
    }

    /// The ssh target, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Host::Local => None,
            Host::Remote(id) => Some(id),
        }
    }

    /// User part of a `user@machine` target.
    pub fn user(&self) -> Option<&str> {
        self.id()
            .and_then(|id| id.split_once('@'))
            .map(|(user, _)| user)
    }

    /// Home directory of the role: the local home, `/home/<user>` for a
    /// `user@machine` target, or `~` left for the remote shell to expand.
    pub fn home(&self) -> Result<PathBuf> {
        match self {
            Host::Local => dirs::home_dir().ok_or(StartError::HomeDir),
            Host::Remote(_) => Ok(match self.user() {
                Some(user) => PathBuf::from("/home").join(user),
                None => PathBuf::from("~"),
            }),
        }
    }

    /// Build `program args...` for this host, ssh-wrapped when remote.
    /// ssh joins its trailing arguments into one remote shell line, so
    /// globs and redirects in the arguments expand on the far side.
    pub fn command<I, S>(&self, program: &str, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        match self {
            Host::Local => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            Host::Remote(id) => {
                let mut cmd = Command::new(ssh::PROGRAM);
                cmd.arg(ssh::FORCE_TTY).arg(id).arg(program).args(args);
                cmd
            }
        }
    }

    /// Run a step to completion and require success.
    pub fn run_checked(&self, step: &str, cmd: &mut Command) -> Result<()> {
        debug!(host = %self, step, command = ?cmd, "running");
        let status = cmd.status().map_err(|source| StartError::Spawn {
            title: step.to_string(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(StartError::RemoteCommandFailed {
                host: self.to_string(),
                step: step.to_string(),
                status,
            })
        }
    }

}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Local => f.write_str("local"),
            Host::Remote(id) => f.write_str(id),
        }
    }
}

/// A fully formed fleet invocation: what to run, the window title it is
/// presented under, and where it executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub title: String,
    pub program: String,
    pub args: Vec<String>,
    pub host: Host,
}

impl ProcessSpec {
    pub fn new(
        title: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        host: Host,
    ) -> ProcessSpec {
        ProcessSpec {
            title: title.into(),
            program: program.into(),
            args,
            host,
        }
    }

    /// The concrete invocation, ssh-wrapped when the host is remote.
    pub fn command(&self) -> Command {
        self.host.command(&self.program, &self.args)
    }

    /// Argv rendering for a terminal emulator's `-e`, which takes the
    /// hosted command as discrete trailing arguments.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 4);
        if let Host::Remote(id) = &self.host {
            argv.push(ssh::PROGRAM.to_string());
            argv.push(ssh::FORCE_TTY.to_string());
            argv.push(id.clone());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}
