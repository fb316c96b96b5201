//! Master identity: who we connect as, where, and under which label.

use crate::SshError;
use scir_parsers::shell::{is_simple_hostname, is_word};
use std::fmt;

pub const DEFAULT_PORT: u16 = 22;

fn validate_port(port: u32) -> Result<u16, SshError> {
    match u16::try_from(port) {
        Ok(p) if (1..65535).contains(&p) => Ok(p),
        _ => Err(SshError::InvalidPort(port)),
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<String, SshError> {
    if is_simple_hostname(value) {
        Ok(value.to_string())
    } else {
        Err(SshError::InvalidKey {
            field,
            value: value.to_string(),
        })
    }
}

fn validate_word(field: &'static str, value: Option<&str>) -> Result<Option<String>, SshError> {
    match value {
        Some(v) if !is_word(v) => Err(SshError::InvalidKey {
            field,
            value: v.to_string(),
        }),
        other => Ok(other.map(str::to_string)),
    }
}

/// The `(user, host, port, category, uniq)` tuple identifying one master.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MasterKey {
    user: String,
    host: String,
    port: u16,
    category: Option<String>,
    uniq: Option<String>,
}

impl MasterKey {
    pub fn new(user: &str, host: &str, port: u32) -> Result<Self, SshError> {
        Ok(Self {
            user: validate_name("user", user)?,
            host: validate_name("host", host)?,
            port: validate_port(port)?,
            category: None,
            uniq: None,
        })
    }

    /// Group masters under a sub-directory of the socket and pid directories.
    pub fn with_category(mut self, category: Option<&str>) -> Result<Self, SshError> {
        self.category = validate_word("category", category)?;
        Ok(self)
    }

    /// Distinguish several masters to the same account.
    pub fn with_uniq(mut self, uniq: Option<&str>) -> Result<Self, SshError> {
        self.uniq = validate_word("uniq", uniq)?;
        Ok(self)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn uniq(&self) -> Option<&str> {
        self.uniq.as_deref()
    }

    /// `user@host:port`
    pub fn simple_key(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    /// `user@host`, the ssh destination.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Renders as `[category/]user@host:port[/uniq]`.
impl fmt::Display for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(category) = &self.category {
            write!(f, "{}/", category)?;
        }
        write!(f, "{}", self.simple_key())?;
        if let Some(uniq) = &self.uniq {
            write!(f, "/{}", uniq)?;
        }
        Ok(())
    }
}

/// Parse `[user@]host[:port]`, taking the user from `default_user` when absent.
pub fn parse_destination(spec: &str, default_user: &str) -> Result<MasterKey, SshError> {
    let (user, rest) = spec.split_once('@').unwrap_or((default_user, spec));
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u32>().map_err(|_| SshError::InvalidKey {
                field: "port",
                value: port.to_string(),
            })?;
            (host, port)
        }
        None => (rest, u32::from(DEFAULT_PORT)),
    };
    MasterKey::new(user, host, port)
}

/// An intermediate host reached before the target, passed as `-J`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpHost {
    user: String,
    host: String,
    port: u16,
}

impl JumpHost {
    pub fn new(user: &str, host: &str, port: u32) -> Result<Self, SshError> {
        Ok(Self {
            user: validate_name("jump user", user)?,
            host: validate_name("jump host", host)?,
            port: validate_port(port)?,
        })
    }
}

impl fmt::Display for JumpHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}
