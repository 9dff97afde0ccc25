//! Client identities and the server-side allow-list.

use std::collections::BTreeSet;
use std::fmt;

/// A client identity that the server has accepted, or that a client is
/// configured to present.
///
/// Identities are plain labels, not secrets. The server takes the identity it
/// passes to the pull script from [`AllowList::verify`], so the script only
/// ever sees a label that appears in the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identities the server is willing to serve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    identities: BTreeSet<String>,
}

impl AllowList {
    /// Parse a comma-separated list. Entries are trimmed; empty entries are
    /// dropped.
    pub fn parse(list: &str) -> Self {
        let identities = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_owned)
            .collect();
        Self { identities }
    }

    /// Exact-match lookup of a handshake line.
    pub fn verify(&self, candidate: &str) -> Option<Identity> {
        self.identities
            .get(candidate)
            .map(|known| Identity(known.clone()))
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.identities.contains(candidate)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(String::as_str)
    }
}
