//! User context for a feed request.
//!
//! Authentication happens outside this crate; by the time a request reaches the
//! feed it carries (at most) a user id, resolved here against a directory of
//! known users with their linked accounts, weight overrides, and RSS groups.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::FeedError;

/// Credentials for a linked third-party account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkedAccount {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    /// Per-source weight overrides, keyed by source name (normalized on lookup).
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Named RSS groups; each group becomes one provider.
    #[serde(default)]
    pub rss_groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub reddit: Option<LinkedAccount>,
    #[serde(default)]
    pub facebook: Option<LinkedAccount>,
    #[serde(default)]
    pub twitter: Option<LinkedAccount>,
}

/// In-memory lookup of the users known to this instance.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<String, Arc<User>>,
}

impl UserDirectory {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.id.clone(), Arc::new(u)))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<User>> {
        self.users.get(id).cloned()
    }

    /// Resolve an optional caller-supplied id. No id means an anonymous request.
    pub fn resolve(&self, id: Option<&str>) -> Result<Option<Arc<User>>, FeedError> {
        match id.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(id) => self
                .get(id)
                .map(Some)
                .ok_or_else(|| FeedError::UnknownUser(anon_id(id))),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Short, stable, non-reversible id for logs. Raw user ids never hit the log.
pub fn anon_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
