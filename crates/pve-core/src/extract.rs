//! Task detection on arbitrary request results.
//!
//! Write endpoints return the task token in several shapes: bare, wrapped in the
//! envelope, or as the `upid` field of a richer object. Each shape maps to one
//! [`Heuristic`]; they are tried strictly in declaration order.

use std::{any::Any, fmt};

use pve_model::{UPID_PREFIX, Upid};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Upper bound on the token length taken by the free-text scan, in characters.
const SCAN_LIMIT: usize = 200;

/// Which rule recovered the task identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heuristic {
    /// The result already is a [`Upid`].
    TypedIdentity,
    /// The result is a string starting with the token tag.
    BareString,
    /// `{ "data": "UPID:..." }`.
    EnvelopeString,
    /// `{ "upid": "UPID:...", ... }`.
    FieldUpid,
    /// First tag occurrence in the textual form of the result.
    ///
    /// Low confidence: it also fires on unrelated strings that merely echo a token.
    FreeTextScan,
}

impl Heuristic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Heuristic::TypedIdentity => "typed",
            Heuristic::BareString => "bare_string",
            Heuristic::EnvelopeString => "envelope",
            Heuristic::FieldUpid => "upid_field",
            Heuristic::FreeTextScan => "free_text",
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        matches!(self, Heuristic::FreeTextScan)
    }
}

impl fmt::Display for Heuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result shape, as seen by the extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Typed(Upid),
    Text(String),
    Tree(Value),
    /// The value could not be serialized.
    Opaque,
}

/// Identity recovered from a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub upid: Upid,
    pub heuristic: Heuristic,
}

pub fn classify<T: Serialize + 'static>(value: &T) -> Shape {
    if let Some(upid) = (value as &dyn Any).downcast_ref::<Upid>() {
        return Shape::Typed(upid.clone());
    }
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => Shape::Text(s),
        Ok(v) => Shape::Tree(v),
        Err(_) => Shape::Opaque,
    }
}

/// Look for a pollable task identity in `value`.
///
/// Every rule only accepts tokens that parse into a pollable identity, so a
/// malformed match falls through to the next rule. Returns `None` when nothing
/// matches.
pub fn find_task<T: Serialize + 'static>(value: &T) -> Option<Extracted> {
    let found = match classify(value) {
        Shape::Typed(upid) => upid.is_pollable().then_some(Extracted {
            upid,
            heuristic: Heuristic::TypedIdentity,
        }),
        Shape::Text(s) => tagged(&s, Heuristic::BareString).or_else(|| scan(&s)),
        Shape::Tree(v) => from_tree(&v),
        Shape::Opaque => None,
    }?;

    debug!(
        target: "pve.core.extract",
        upid = %found.upid,
        heuristic = %found.heuristic,
        low_confidence = found.heuristic.is_low_confidence(),
        "task detected"
    );
    Some(found)
}

fn from_tree(v: &Value) -> Option<Extracted> {
    let field = |name: &str, heuristic: Heuristic| {
        v.get(name)
            .and_then(Value::as_str)
            .and_then(|s| tagged(s, heuristic))
    };

    field("data", Heuristic::EnvelopeString)
        .or_else(|| field("upid", Heuristic::FieldUpid))
        .or_else(|| scan(&v.to_string()))
}

fn tagged(s: &str, heuristic: Heuristic) -> Option<Extracted> {
    if !Upid::looks_like(s) {
        return None;
    }
    let upid = Upid::parse(s).ok().filter(Upid::is_pollable)?;
    Some(Extracted { upid, heuristic })
}

/// First tag occurrence in `text` that parses into a pollable identity.
fn scan(text: &str) -> Option<Extracted> {
    text.match_indices(UPID_PREFIX).find_map(|(start, _)| {
        let rest = &text[start..];
        let quote = rest.find('"').unwrap_or(rest.len());
        let limit = rest
            .char_indices()
            .nth(SCAN_LIMIT)
            .map_or(rest.len(), |(i, _)| i);

        tagged(&rest[..quote.min(limit)], Heuristic::FreeTextScan)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOKEN: &str = "UPID:nodeA:1234:abcd:1700000000:qmstart:100:user@pam:";

    fn upid() -> Upid {
        Upid::parse(TOKEN).unwrap()
    }

    #[test]
    fn typed_identity_is_accepted_as_is() {
        let found = find_task(&upid()).unwrap();
        assert_eq!(found.heuristic, Heuristic::TypedIdentity);
        assert_eq!(found.upid, upid());
    }

    #[test]
    fn typed_identity_without_node_is_rejected() {
        let upid = Upid::parse("UPID::1:2:3:qmstart:100:root@pam:").unwrap();
        assert_eq!(find_task(&upid), None);
    }

    #[test]
    fn bare_string() {
        let found = find_task(&TOKEN.to_string()).unwrap();
        assert_eq!(found.heuristic, Heuristic::BareString);
        assert_eq!(found.upid, upid());
    }

    #[test]
    fn envelope_matches_direct_parse() {
        let found = find_task(&json!({ "data": TOKEN })).unwrap();
        assert_eq!(found.heuristic, Heuristic::EnvelopeString);
        assert_eq!(found.upid, Upid::parse(TOKEN).unwrap());
    }

    #[test]
    fn upid_field() {
        let found = find_task(&json!({ "upid": TOKEN, "status": "running" })).unwrap();
        assert_eq!(found.heuristic, Heuristic::FieldUpid);
        assert_eq!(found.upid, upid());
    }

    #[test]
    fn envelope_wins_over_field() {
        let other = "UPID:nodeB:1:2:3:qmstop:101:root@pam:";
        let found = find_task(&json!({ "data": other, "upid": TOKEN })).unwrap();
        assert_eq!(found.upid.node(), "nodeB");
    }

    #[test]
    fn unpollable_envelope_falls_through_to_field() {
        let found = find_task(&json!({
            "data": "UPID::1:2:3:qmstart:100:root@pam:",
            "upid": TOKEN,
        }))
        .unwrap();
        assert_eq!(found.heuristic, Heuristic::FieldUpid);
        assert_eq!(found.upid.as_str(), TOKEN);
    }

    #[test]
    fn scan_skips_malformed_occurrences() {
        let found = find_task(&json!({ "data": "UPID:bad", "log": [TOKEN] })).unwrap();
        assert_eq!(found.heuristic, Heuristic::FreeTextScan);
        assert_eq!(found.upid.as_str(), TOKEN);
    }

    #[test]
    fn free_text_scan_is_last_resort() {
        let found = find_task(&json!({ "log": [format!("started {TOKEN}")] })).unwrap();
        assert_eq!(found.heuristic, Heuristic::FreeTextScan);
        assert!(found.heuristic.is_low_confidence());
        assert_eq!(found.upid, upid());
    }

    #[test]
    fn free_text_scan_stops_at_limit() {
        let long = format!("{TOKEN}{}", "x".repeat(500));
        let found = find_task(&format!("task: {long}")).unwrap();
        assert_eq!(found.upid.as_str().chars().count(), SCAN_LIMIT);
    }

    #[test]
    fn struct_with_upid_field() {
        #[derive(Serialize)]
        struct Started {
            upid: String,
            vmid: u32,
        }

        let found = find_task(&Started {
            upid: TOKEN.into(),
            vmid: 100,
        })
        .unwrap();
        assert_eq!(found.heuristic, Heuristic::FieldUpid);
    }

    #[test]
    fn nothing_to_find() {
        assert_eq!(find_task(&json!({ "vmid": 100, "status": "running" })), None);
        assert_eq!(find_task(&json!(null)), None);
        assert_eq!(find_task(&"OK".to_string()), None);
        assert_eq!(find_task(&json!({ "data": "UPID:short" })), None);
        assert_eq!(find_task(&()), None);
    }
}
