//! # Posts
//! The item type flowing through the feed, plus the envelope the upstream
//! page services answer with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One item produced by a content source. Immutable once a generator hands it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    /// Source/platform identifier, e.g. "hacker-news", "reddit", "rss".
    pub platform: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Publication timestamp; drives the freshness term of the rank.
    pub date: DateTime<Utc>,
}

impl Post {
    pub fn new(id: impl Into<String>, platform: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
            title: String::new(),
            url: None,
            author: None,
            content: None,
            date,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Response body of a paginated page service: one page plus where to go next.
/// An empty `next_url` means the source has nothing further to offer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientPage {
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default, alias = "NextURL", alias = "nextURL")]
    pub next_url: String,
}
