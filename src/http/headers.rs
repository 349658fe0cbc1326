//! HTTP headers handling
//!
//! This module provides an ordered multi-map of header fields. Names are
//! stored in canonical form (`content-type` becomes `Content-Type`), so
//! lookups are case-insensitive and HTTP/1.1 and HTTP/2 field names land on
//! the same key.

use super::{Error, Result};
use std::fmt;

/// Check whether a byte may appear in a header field name (RFC 7230 token)
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Canonical form of a header name
///
/// The first letter and every letter following a hyphen are upper-cased, the
/// rest lower-cased. Names containing bytes that are not valid in a field
/// name are returned unchanged.
pub fn canonical_header_key(name: &str) -> String {
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// HTTP headers collection
///
/// Keys keep the order of their first occurrence. A repeated name appends
/// another value under the existing key; nothing is overwritten by `insert`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    /// Create a new empty headers collection
    pub fn new() -> Self {
        Headers {
            entries: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Insert a header
    ///
    /// If a header with the same name (case-insensitive) already exists,
    /// this adds another value rather than replacing it.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref();
        let value = value.into();

        match self.position(name) {
            Some(idx) => self.entries[idx].1.push(value),
            None => self
                .entries
                .push((canonical_header_key(name), vec![value])),
        }
    }

    /// Replace every value of a header with a single value
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref();
        let value = value.into();

        match self.position(name) {
            Some(idx) => self.entries[idx].1 = vec![value],
            None => self
                .entries
                .push((canonical_header_key(name), vec![value])),
        }
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|idx| self.entries[idx].1.first())
            .map(String::as_str)
    }

    /// Get all values for a header (case-insensitive), in arrival order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.position(name)
            .map(|idx| self.entries[idx].1.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Check whether a comma-separated header carries `token`
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .iter()
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Remove a header, returning how many values it had
    pub fn remove(&mut self, name: &str) -> usize {
        match self.position(name) {
            Some(idx) => self.entries.remove(idx).1.len(),
            None => 0,
        }
    }

    /// Get the number of distinct header names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over keys with all their values
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Iterate over every (name, value) pair, one per value
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(n, vs)| vs.iter().map(move |v| (n.as_str(), v.as_str())))
    }

    /// Parse a header line into name and value
    pub fn parse_header_line(line: &str) -> Result<(String, String)> {
        if let Some(colon_pos) = line.find(':') {
            let name = &line[..colon_pos];
            let value = line[colon_pos + 1..].trim().to_string();

            if name.is_empty() {
                return Err(Error::InvalidHeader("Empty header name".to_string()));
            }
            if !name.bytes().all(is_token_byte) {
                return Err(Error::InvalidHeader(format!("Bad header name: {:?}", name)));
            }

            Ok((name.to_string(), value))
        } else {
            Err(Error::InvalidHeader(format!("No colon in header: {}", line)))
        }
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

impl<N: AsRef<str>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
