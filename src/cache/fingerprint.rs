//! Request fingerprinting.
//!
//! A fingerprint is the SHA-256 of the method, the path, the query pairs
//! sorted by key and the whitelisted request headers. It is both the cache
//! key and the single-flight key.
//!
//! Every component is length-prefixed before hashing, so no two distinct
//! inputs can produce the same byte stream.

use std::fmt;

use axum::http::{HeaderMap, HeaderName, Method};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// Deterministic identity of a cacheable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a request.
    pub fn compute(
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        whitelist: &FingerprintHeaders,
    ) -> Self {
        let mut hasher = Sha256::new();
        write_field(&mut hasher, method.as_str().as_bytes());
        write_field(&mut hasher, path.as_bytes());

        let mut pairs: Vec<(String, String)> = query
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        // Stable: repeated keys keep their relative order.
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        write_count(&mut hasher, pairs.len());
        for (key, value) in &pairs {
            write_field(&mut hasher, key.as_bytes());
            write_field(&mut hasher, value.as_bytes());
        }

        for name in whitelist.names() {
            let values: Vec<_> = headers.get_all(name).iter().collect();
            write_field(&mut hasher, name.as_str().as_bytes());
            write_count(&mut hasher, values.len());
            for value in values {
                write_field(&mut hasher, value.as_bytes());
            }
        }

        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn write_count(hasher: &mut Sha256, n: usize) {
    hasher.update((n as u64).to_le_bytes());
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    write_count(hasher, bytes.len());
    hasher.update(bytes);
}

/// The request headers that take part in fingerprinting.
#[derive(Debug, Clone, Default)]
pub struct FingerprintHeaders {
    names: Vec<HeaderName>,
}

impl FingerprintHeaders {
    /// Build the whitelist from configured names. Invalid names are skipped.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut parsed: Vec<HeaderName> = names
            .iter()
            .filter_map(|n| match HeaderName::from_bytes(n.as_ref().trim().as_bytes()) {
                Ok(name) => Some(name),
                Err(_) => {
                    tracing::warn!(header = %n.as_ref(), "Ignoring invalid fingerprint header name");
                    None
                }
            })
            .collect();
        // Order-independent configuration.
        parsed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        parsed.dedup();
        Self { names: parsed }
    }

    pub fn names(&self) -> &[HeaderName] {
        &self.names
    }
}
