use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A worker's addressable RPC endpoint as a `host:port` string. Used for
/// queue topology and master registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    pub fn new(host: &str, port: u16) -> Self {
        Self(format!("{host}:{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn host(&self) -> &str {
        self.0.rsplit_once(':').map(|(host, _)| host).unwrap_or(&self.0)
    }

    pub fn port(&self) -> Option<u16> {
        self.0
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }

    /// The HTTP URL this node's JSON-RPC endpoint answers on.
    pub fn http_url(&self) -> String {
        format!("http://{}", self.0)
    }
}

impl FromStr for NodeIdentity {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let Some((host, port)) = value.rsplit_once(':') else {
            bail!("node identity {value:?} is not of the form host:port");
        };
        if host.is_empty() {
            bail!("node identity {value:?} has an empty host");
        }
        if port.parse::<u16>().is_err() {
            bail!("node identity {value:?} has an invalid port");
        }
        Ok(Self(value.to_owned()))
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
