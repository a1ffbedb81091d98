//! Run-control rendezvous endpoint.
//!
//! Every fleet process is pointed at the same run-control address. The
//! address is always loopback on the configured `[port] rc`; the fleet
//! processes that run remotely reach it through the forwarded ssh session.

use std::fmt;

use crate::config::Profile;
use crate::constants::endpoint::{LOOPBACK, SCHEME};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    address: String,
    port: u16,
}

impl Endpoint {
    pub fn from_profile(profile: &Profile) -> Result<Endpoint> {
        Ok(Endpoint {
            address: LOOPBACK.to_string(),
            port: profile.rc_port()?,
        })
    }

    /// Address producers, collectors and monitors connect to (`-r`).
    pub fn connect_string(&self) -> String {
        format!("{SCHEME}://{}:{}", self.address, self.port)
    }

    /// Port-only form run-control listens on (`-a`).
    pub fn listen_string(&self) -> String {
        format!("{SCHEME}://{}", self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connect_string())
    }
}
