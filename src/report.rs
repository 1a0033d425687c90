//! Reporting payload assembly
//!
//! A tracker renders its state as an ordered string-to-string payload. Both
//! the key vocabulary and the emission order are a wire contract with the
//! downstream collector. Collectors transmit payloads as query parameters,
//! hence the short keys.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Fixed payload key vocabulary.
pub mod keys {
    /// View identifier
    pub const VIEW_ID: &str = "p";
    /// Human-readable view title
    pub const VIEW_TITLE: &str = "i";
    /// Id of the in-app view that referred the user here (omitted for
    /// externally entered views)
    pub const INTERNAL_REFERRER: &str = "v";
    /// Per-install user token
    pub const TOKEN: &str = "t";
    /// Engaged time in minutes, one decimal place
    pub const TIME_ON_VIEW_MINUTES: &str = "c";
    /// Latest vertical scroll offset in pixels
    pub const SCROLL_POSITION_TOP: &str = "x";
    /// Viewport height in pixels
    pub const SCROLL_WINDOW_HEIGHT: &str = "w";
    /// Full content height in pixels
    pub const TOTAL_CONTENT_HEIGHT: &str = "y";
    /// Rendered document width in pixels
    pub const FULLY_RENDERED_DOC_WIDTH: &str = "o";
    /// Maximum scroll offset reached while the view was active
    pub const MAX_SCROLL_DEPTH: &str = "m";
    /// Content sections (omitted when never set)
    pub const SECTIONS: &str = "g0";
    /// Content authors (omitted when never set)
    pub const AUTHORS: &str = "g1";
    /// Content zones (omitted when never set)
    pub const ZONES: &str = "g2";
    /// Page load time in seconds
    pub const PAGE_LOAD_TIME: &str = "b";
}

/// Insertion-ordered string-to-string reporting payload.
///
/// Repeated renders of unchanged tracker state must produce an identical key
/// sequence, so the payload preserves insertion order rather than sorting or
/// hashing keys. Serializes as a JSON object whose members appear in
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportPayload {
    entries: Vec<(&'static str, String)>,
}

impl ReportPayload {
    /// Create an empty payload
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a key-value pair at the end of the emission order
    pub fn push(&mut self, key: &'static str, value: String) {
        self.entries.push((key, value));
    }

    /// Look up the value for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Keys in emission order
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    /// All pairs in emission order
    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the payload has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ReportPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_preserves_order() {
        let mut payload = ReportPayload::new();
        payload.push(keys::VIEW_ID, "v1".to_string());
        payload.push(keys::VIEW_TITLE, "Home".to_string());
        payload.push(keys::TOKEN, "tok".to_string());

        let keys: Vec<&str> = payload.keys().collect();
        assert_eq!(keys, vec!["p", "i", "t"]);
    }

    #[test]
    fn test_get_returns_value_for_key() {
        let mut payload = ReportPayload::new();
        payload.push(keys::VIEW_ID, "v1".to_string());
        payload.push(keys::MAX_SCROLL_DEPTH, "50".to_string());

        assert_eq!(payload.get("p"), Some("v1"));
        assert_eq!(payload.get("m"), Some("50"));
        assert_eq!(payload.get("zz"), None);
    }

    #[test]
    fn test_serializes_as_ordered_json_object() {
        let mut payload = ReportPayload::new();
        payload.push(keys::VIEW_ID, "v1".to_string());
        payload.push(keys::TIME_ON_VIEW_MINUTES, "0.0".to_string());
        payload.push(keys::SCROLL_POSITION_TOP, "-1".to_string());

        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"p":"v1","c":"0.0","x":"-1"}"#);
    }

    #[test]
    fn test_empty_payload() {
        let payload = ReportPayload::new();
        assert!(payload.is_empty());
        assert_eq!(payload.len(), 0);
        assert_eq!(serde_json::to_string(&payload).unwrap(), "{}");
    }
}
