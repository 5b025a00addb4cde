use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag every task token issued by the server starts with.
pub const UPID_PREFIX: &str = "UPID:";

/// Minimum number of colon-separated fields in a well-formed token.
const MIN_FIELDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpidError {
    #[error("task token does not start with \"UPID:\"")]
    MissingPrefix,
    #[error("task token has {found} fields, expected at least 8")]
    TooFewFields { found: usize },
}

/// Identifier of a long-running server task.
///
/// Parsed from a token of the form `UPID:node:pid:pstart:starttime:type:id:user:`.
/// The value is immutable once parsed; two parses of the same token are equal.
///
/// On the wire it is always the raw token string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Upid {
    raw: String,
    node: String,
    pid: String,
    pstart: String,
    start_time: String,
    kind: String,
    object_id: String,
    user: String,
}

impl Upid {
    /// Parse a raw task token.
    pub fn parse(raw: impl Into<String>) -> Result<Self, UpidError> {
        let raw = raw.into();
        if !raw.starts_with(UPID_PREFIX) {
            return Err(UpidError::MissingPrefix);
        }

        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() < MIN_FIELDS {
            return Err(UpidError::TooFewFields { found: parts.len() });
        }

        Ok(Self {
            node: parts[1].to_string(),
            pid: parts[2].to_string(),
            pstart: parts[3].to_string(),
            start_time: parts[4].to_string(),
            kind: parts[5].to_string(),
            object_id: parts[6].to_string(),
            user: parts[7].to_string(),
            raw,
        })
    }

    /// Returns `true` if `s` carries the task token tag.
    #[inline]
    pub fn looks_like(s: &str) -> bool {
        s.starts_with(UPID_PREFIX)
    }

    /// Raw token, exactly as issued by the server.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Cluster node that owns the task.
    #[inline]
    pub fn node(&self) -> &str {
        &self.node
    }

    #[inline]
    pub fn pid(&self) -> &str {
        &self.pid
    }

    #[inline]
    pub fn pstart(&self) -> &str {
        &self.pstart
    }

    #[inline]
    pub fn start_time(&self) -> &str {
        &self.start_time
    }

    /// Task type, e.g. `qmstart`, `vzdump`, `qmclone`.
    #[inline]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Object the task works on (usually a guest id); may be empty.
    #[inline]
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Principal that started the task, e.g. `root@pam`.
    #[inline]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// A task can only be polled when both the token and the owning node are known.
    pub fn is_pollable(&self) -> bool {
        !self.raw.is_empty() && !self.node.is_empty()
    }
}

impl FromStr for Upid {
    type Err = UpidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Upid::parse(s)
    }
}

impl TryFrom<String> for Upid {
    type Error = UpidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Upid::parse(value)
    }
}

impl From<Upid> for String {
    fn from(upid: Upid) -> Self {
        upid.raw
    }
}

impl fmt::Display for Upid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "UPID:nodeA:1234:abcd:1700000000:qmstart:100:user@pam:";

    #[test]
    fn parse_splits_all_fields() {
        let upid = Upid::parse(TOKEN).unwrap();
        assert_eq!(upid.node(), "nodeA");
        assert_eq!(upid.pid(), "1234");
        assert_eq!(upid.pstart(), "abcd");
        assert_eq!(upid.start_time(), "1700000000");
        assert_eq!(upid.kind(), "qmstart");
        assert_eq!(upid.object_id(), "100");
        assert_eq!(upid.user(), "user@pam");
        assert_eq!(upid.as_str(), TOKEN);
        assert!(upid.is_pollable());
    }

    #[test]
    fn parse_twice_yields_equal_values() {
        let a = Upid::parse(TOKEN).unwrap();
        let b: Upid = TOKEN.parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parse_without_trailing_colon_still_has_eight_fields() {
        let upid = Upid::parse("UPID:pve:0000C0DE:0012ABCD:65A1B2C3:vzdump::root@pam").unwrap();
        assert_eq!(upid.node(), "pve");
        assert_eq!(upid.object_id(), "");
        assert_eq!(upid.user(), "root@pam");
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        assert_eq!(
            Upid::parse("TASK:nodeA:1:2:3:qmstart:100:root@pam:"),
            Err(UpidError::MissingPrefix)
        );
    }

    #[test]
    fn parse_rejects_short_token() {
        assert_eq!(
            Upid::parse("UPID:nodeA:1234"),
            Err(UpidError::TooFewFields { found: 3 })
        );
    }

    #[test]
    fn empty_node_is_not_pollable() {
        let upid = Upid::parse("UPID::1:2:3:qmstart:100:root@pam:").unwrap();
        assert!(!upid.is_pollable());
    }

    #[test]
    fn serde_uses_raw_token() {
        let upid = Upid::parse(TOKEN).unwrap();
        let json = serde_json::to_string(&upid).unwrap();
        assert_eq!(json, format!("\"{TOKEN}\""));

        let back: Upid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, upid);

        assert!(serde_json::from_str::<Upid>("\"not-a-task\"").is_err());
    }
}
