//! Parsed SIP datagram model.
//!
//! A datagram is two halves: an insertion-ordered header map and the raw
//! SDP lines that rode along in the body. Header lookup is
//! case-insensitive (the protocol is), but the map remembers the spelling
//! each header arrived with and the serializer emits it back unchanged.

use indexmap::IndexMap;

use crate::methods::Method;

/// The pseudo-header the parser stores the request method under.
pub const METHOD_HEADER: &str = "Method";

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    /// Spelling as first received (or last overlaid).
    name: String,
    value: String,
}

/// An insertion-ordered, case-preserving SIP header map.
///
/// Duplicated headers are collapsed into one entry whose values are
/// joined with `", "` in arrival order, mirroring how `Via` chains are
/// carried through proxies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: IndexMap<String, HeaderEntry>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|entry| entry.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Replace a header wholesale, adopting the caller's spelling. New
    /// headers keep their insertion position at the end of the map.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        let entry = HeaderEntry {
            name,
            value: value.into(),
        };
        self.entries.insert(key, entry);
    }

    /// Append a value to a header, joining repeated arrivals with `", "`.
    /// The spelling of the first arrival wins.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.value.push_str(", ");
                entry.value.push_str(&value.into());
            }
            None => {
                self.entries.insert(
                    key,
                    HeaderEntry {
                        name,
                        value: value.into(),
                    },
                );
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .shift_remove(&name.to_ascii_lowercase())
            .map(|entry| entry.value)
    }

    /// Iterate `(name, value)` pairs in insertion order, names spelled as
    /// received.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|entry| (entry.name.as_str(), entry.value.as_str()))
    }
}

/// A parsed SIP datagram: headers plus any SDP lines from the body.
///
/// A datagram lives inside a single worker invocation; it is never shared
/// across requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SipDatagram {
    pub sip: HeaderMap,
    pub sdp: Vec<String>,
}

impl SipDatagram {
    pub fn new() -> Self {
        Self::default()
    }

    /// The request method, read back from the `Method` pseudo-header.
    pub fn method(&self) -> Option<Method> {
        self.sip.get(METHOD_HEADER).and_then(Method::from_token)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.sip.get("Call-ID")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_but_spelling_is_preserved() {
        let mut map = HeaderMap::new();
        map.insert("Call-ID", "abc@host");
        assert_eq!(map.get("call-id"), Some("abc@host"));
        assert_eq!(map.get("CALL-ID"), Some("abc@host"));
        let (name, _) = map.iter().next().unwrap();
        assert_eq!(name, "Call-ID");
    }

    #[test]
    fn append_joins_with_comma_space_in_arrival_order() {
        let mut map = HeaderMap::new();
        map.append("Via", "SIP/2.0/UDP a:5060");
        map.append("Via", "SIP/2.0/UDP b:5060");
        assert_eq!(map.get("Via"), Some("SIP/2.0/UDP a:5060, SIP/2.0/UDP b:5060"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn insert_replaces_value_and_spelling() {
        let mut map = HeaderMap::new();
        map.append("allow", "INVITE");
        map.insert("Allow", "INVITE, BYE");
        assert_eq!(map.get("allow"), Some("INVITE, BYE"));
        let (name, _) = map.iter().next().unwrap();
        assert_eq!(name, "Allow");
    }

    #[test]
    fn insertion_order_survives_mutation() {
        let mut map = HeaderMap::new();
        map.insert("From", "a");
        map.insert("To", "b");
        map.insert("From", "c");
        let names: Vec<&str> = map.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["From", "To"]);
    }

    #[test]
    fn datagram_reads_method_pseudo_header() {
        let mut datagram = SipDatagram::new();
        datagram.sip.insert(METHOD_HEADER, "INVITE");
        assert_eq!(datagram.method(), Some(Method::Invite));
    }
}
