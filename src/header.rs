//! `HeaderBag` (§3) — insertion-order-preserving, case-insensitive multimap.

use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, Default)]
pub struct HeaderBag {
    // Insertion-ordered (name, value) pairs, exactly as they will be emitted
    // on the wire. `name` retains the case it was added with; lookups compare
    // case-insensitively.
    entries: Vec<(String, String)>,
}

/// Headers whose multiple values must never be folded with `, ` on the wire
/// (each instance is semantically distinct — RFC 7230 §3.2.2 carve-out).
const NEVER_COMBINE: &[&str] = &["set-cookie"];

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping any existing values for `name`.
    pub fn add(&mut self, name: &str, value: &str) -> Result<(), Error> {
        validate_token(name)?;
        validate_value(value)?;
        self.entries.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Replace all existing values for `name` with a single new value.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), Error> {
        validate_token(name)?;
        validate_value(value)?;
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.entries.push((name.to_string(), value.to_string()));
        Ok(())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Remove and return all values for `name`.
    pub fn pop(&mut self, name: &str) -> Vec<String> {
        let mut popped = Vec::new();
        self.entries.retain(|(n, v)| {
            if n.eq_ignore_ascii_case(name) {
                popped.push(v.clone());
                false
            } else {
                true
            }
        });
        popped
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Merge `other` in with lower precedence: anything already set on
    /// `self` for a given name is left untouched (used for default headers,
    /// §4.8 / §6, which apply only where the caller didn't already set one).
    pub fn merge_defaults(&mut self, other: &HeaderBag) {
        for (name, value) in other.iter() {
            if !self.contains(name) {
                // `validate_*` already ran when `other` was built; trust it.
                self.entries.push((name.to_string(), value.to_string()));
            }
        }
    }

    /// Value joined per §3's combining rule (`, ` except `Set-Cookie`, which
    /// is never combined and should be read via `get_all` instead).
    pub fn combined(&self, name: &str) -> Option<String> {
        if NEVER_COMBINE.contains(&name.to_ascii_lowercase().as_str()) {
            return self.get(name).map(str::to_string);
        }
        let values = self.get_all(name);
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}

impl fmt::Display for HeaderBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

fn validate_token(name: &str) -> Result<(), Error> {
    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
    {
        return Err(Error::Protocol(format!("invalid header name '{name}'")));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<(), Error> {
    if value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
        return Err(Error::Protocol("header value contains CR/LF/NUL".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get_and_contains() {
        let mut h = HeaderBag::new();
        h.add("Content-Type", "text/plain").unwrap();
        assert!(h.contains("content-type"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn add_preserves_insertion_order_for_multi_valued_headers() {
        let mut h = HeaderBag::new();
        h.add("X-Trace", "a").unwrap();
        h.add("X-Trace", "b").unwrap();
        assert_eq!(h.get_all("x-trace"), vec!["a", "b"]);
        assert_eq!(h.combined("x-trace"), Some("a, b".to_string()));
    }

    #[test]
    fn set_replaces_all_prior_values() {
        let mut h = HeaderBag::new();
        h.add("X-A", "1").unwrap();
        h.add("X-A", "2").unwrap();
        h.set("X-A", "3").unwrap();
        assert_eq!(h.get_all("x-a"), vec!["3"]);
    }

    #[test]
    fn set_cookie_is_never_combined() {
        let mut h = HeaderBag::new();
        h.add("Set-Cookie", "a=1").unwrap();
        h.add("Set-Cookie", "b=2").unwrap();
        assert_eq!(h.combined("set-cookie"), Some("a=1".to_string()));
        assert_eq!(h.get_all("set-cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn rejects_crlf_in_values() {
        let mut h = HeaderBag::new();
        assert!(h.add("X-A", "bad\r\nvalue").is_err());
    }

    #[test]
    fn rejects_invalid_token_names() {
        let mut h = HeaderBag::new();
        assert!(h.add("bad name", "v").is_err());
        assert!(h.add("bad:name", "v").is_err());
    }

    #[test]
    fn merge_defaults_does_not_override_existing() {
        let mut h = HeaderBag::new();
        h.add("User-Agent", "custom/1.0").unwrap();
        let mut defaults = HeaderBag::new();
        defaults.add("User-Agent", "hermes-http/0.1").unwrap();
        defaults.add("Accept", "*/*").unwrap();
        h.merge_defaults(&defaults);
        assert_eq!(h.get("user-agent"), Some("custom/1.0"));
        assert_eq!(h.get("accept"), Some("*/*"));
    }

    #[test]
    fn pop_removes_and_returns_values() {
        let mut h = HeaderBag::new();
        h.add("Authorization", "Bearer x").unwrap();
        let popped = h.pop("authorization");
        assert_eq!(popped, vec!["Bearer x".to_string()]);
        assert!(!h.contains("authorization"));
    }
}
