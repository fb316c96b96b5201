//! Port forwarding specifications carried by a master.

use crate::SshError;
use scir_parsers::is_simple_hostname;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelDirection {
    /// `-L`: accept locally, connect from the remote side
    Forward,
    /// `-R`: accept remotely, connect from this side
    Reverse,
}

impl TunnelDirection {
    pub fn flag(self) -> &'static str {
        match self {
            TunnelDirection::Forward => "-L",
            TunnelDirection::Reverse => "-R",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TunnelDirection::Forward => "forward",
            TunnelDirection::Reverse => "reverse",
        }
    }
}

/// One end of a tunnel. On the accepting side `host` is an optional bind
/// address; on the destination side it is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEndpoint {
    Tcp { host: Option<String>, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for TunnelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelEndpoint::Tcp { host: Some(host), port } => write!(f, "{}:{}", host, port),
            TunnelEndpoint::Tcp { host: None, port } => write!(f, "{}", port),
            TunnelEndpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub accept: TunnelEndpoint,
    pub dest: TunnelEndpoint,
}

impl TunnelSpec {
    pub fn tcp(accept_port: u16, dest_host: &str, dest_port: u16) -> Self {
        Self {
            accept: TunnelEndpoint::Tcp {
                host: None,
                port: accept_port,
            },
            dest: TunnelEndpoint::Tcp {
                host: Some(dest_host.to_string()),
                port: dest_port,
            },
        }
    }

    /// Check both ends. The accepting socket path is only checked for
    /// forward tunnels, where it lives on this machine.
    pub(crate) fn validate(&self, direction: TunnelDirection) -> Result<(), SshError> {
        let invalid = |reason: &str| SshError::InvalidTunnel {
            spec: self.to_string(),
            reason: reason.to_string(),
        };
        match &self.accept {
            TunnelEndpoint::Tcp { port, .. } if !(1025..65535).contains(port) => {
                return Err(invalid("accept port must be between 1025 and 65534"));
            }
            TunnelEndpoint::Tcp { host: Some(bind), .. } if !is_simple_hostname(bind) => {
                return Err(invalid("bad bind address"));
            }
            TunnelEndpoint::Unix(path)
                if direction == TunnelDirection::Forward && path.exists() =>
            {
                return Err(invalid("accept socket already exists"));
            }
            _ => {}
        }
        match &self.dest {
            TunnelEndpoint::Tcp { host: None, .. } => Err(invalid("destination host missing")),
            TunnelEndpoint::Tcp { host: Some(host), .. } if !is_simple_hostname(host) => {
                Err(invalid("bad destination host"))
            }
            TunnelEndpoint::Tcp { port: 0 | 65535, .. } => Err(invalid("bad destination port")),
            _ => Ok(()),
        }
    }
}

/// The argument of `-L`/`-R`.
impl fmt::Display for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.accept, self.dest)
    }
}

fn parse_port(spec: &str, port: &str) -> Result<u16, SshError> {
    port.parse().map_err(|_| SshError::InvalidTunnel {
        spec: spec.to_string(),
        reason: format!("'{}' is not a port", port),
    })
}

/// Parses `[bind:]port|/path` followed by `host:port|/path`, as written
/// after `-L` on an ssh command line.
impl FromStr for TunnelSpec {
    type Err = SshError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = spec.split(':').collect();
        let last = parts.pop().unwrap_or_default();

        let dest = if last.starts_with('/') {
            TunnelEndpoint::Unix(PathBuf::from(last))
        } else {
            let host = parts.pop().ok_or_else(|| SshError::InvalidTunnel {
                spec: spec.to_string(),
                reason: "destination host missing".to_string(),
            })?;
            TunnelEndpoint::Tcp {
                host: Some(host.to_string()),
                port: parse_port(spec, last)?,
            }
        };

        let accept = match parts.as_slice() {
            [path] if path.starts_with('/') => TunnelEndpoint::Unix(PathBuf::from(path)),
            [port] => TunnelEndpoint::Tcp {
                host: None,
                port: parse_port(spec, port)?,
            },
            [bind, port] => TunnelEndpoint::Tcp {
                host: Some(bind.to_string()),
                port: parse_port(spec, port)?,
            },
            _ => {
                return Err(SshError::InvalidTunnel {
                    spec: spec.to_string(),
                    reason: "expected [bind:]port or a socket path before the destination"
                        .to_string(),
                });
            }
        };
        Ok(Self { accept, dest })
    }
}
