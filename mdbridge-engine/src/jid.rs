// ABOUTME: Protocol identifiers (JIDs) for users, devices and groups.
// ABOUTME: Parses host-supplied addresses and renders them back for display and keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Server used for regular user accounts
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
/// Server used for group chats
pub const GROUP_SERVER: &str = "g.us";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JidError {
    #[error("empty address")]
    Empty,
    #[error("invalid address '{0}': missing user part")]
    MissingUser(String),
    #[error("invalid address '{0}': missing server part")]
    MissingServer(String),
    #[error("invalid address '{0}': bad device number")]
    BadDevice(String),
}

/// A protocol identifier: `user[:device]@server`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    pub user: String,
    pub device: u16,
    pub server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: 0,
            server: server.into(),
        }
    }

    /// Identifier for a regular user account on the default server
    pub fn user(user: impl Into<String>) -> Self {
        Self::new(user, DEFAULT_USER_SERVER)
    }

    pub fn with_device(mut self, device: u16) -> Self {
        self.device = device;
        self
    }

    /// Strip the device part, yielding the account-level identifier
    pub fn to_non_ad(&self) -> Jid {
        Self {
            user: self.user.clone(),
            device: 0,
            server: self.server.clone(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    /// Parse an address typed by a user.
    ///
    /// A leading `+` is dropped and a bare phone number is treated as a user
    /// on the default server. Anything containing `@` is parsed as a full JID.
    pub fn parse_address(input: &str) -> Result<Jid, JidError> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(JidError::Empty);
        }
        if !trimmed.contains('@') {
            return Ok(Jid::user(trimmed));
        }
        trimmed.parse()
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(JidError::Empty);
        }
        let (user_part, server) = s
            .split_once('@')
            .ok_or_else(|| JidError::MissingServer(s.to_string()))?;
        if server.is_empty() {
            return Err(JidError::MissingServer(s.to_string()));
        }
        let (user, device) = match user_part.split_once(':') {
            Some((user, device)) => {
                let device = device
                    .parse::<u16>()
                    .map_err(|_| JidError::BadDevice(s.to_string()))?;
                (user, device)
            }
            None => (user_part, 0),
        };
        if user.is_empty() {
            return Err(JidError::MissingUser(s.to_string()));
        }
        Ok(Jid {
            user: user.to_string(),
            device,
            server: server.to_string(),
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

impl TryFrom<String> for Jid {
    type Error = JidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_jid() {
        let jid: Jid = "4915112345678@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "4915112345678");
        assert_eq!(jid.device, 0);
        assert_eq!(jid.server, DEFAULT_USER_SERVER);
    }

    #[test]
    fn test_parse_device_jid_and_strip() {
        let jid: Jid = "123:7@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.device, 7);
        assert_eq!(jid.to_string(), "123:7@s.whatsapp.net");
        assert_eq!(jid.to_non_ad().to_string(), "123@s.whatsapp.net");
    }

    #[test]
    fn test_parse_address_phone_number() {
        let jid = Jid::parse_address("+4915112345678").unwrap();
        assert_eq!(jid, Jid::user("4915112345678"));
    }

    #[test]
    fn test_parse_address_group() {
        let jid = Jid::parse_address("123-456@g.us").unwrap();
        assert!(jid.is_group());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(Jid::parse_address(""), Err(JidError::Empty));
        assert_eq!(Jid::parse_address("+"), Err(JidError::Empty));
        assert!(matches!(
            Jid::parse_address("@s.whatsapp.net"),
            Err(JidError::MissingUser(_))
        ));
        assert!(matches!(
            Jid::parse_address("123@"),
            Err(JidError::MissingServer(_))
        ));
        assert!(matches!(
            Jid::parse_address("123:x@s.whatsapp.net"),
            Err(JidError::BadDevice(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let jid = Jid::user("42").with_device(3);
        let json = serde_json::to_string(&jid).unwrap();
        assert_eq!(json, "\"42:3@s.whatsapp.net\"");
        let back: Jid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, jid);
    }
}
