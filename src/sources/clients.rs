//! Platform clients. Each one fronts a page service speaking the shared
//! `ClientPage` protocol; what differs is the entry URL and the credentials.

use async_trait::async_trait;
use metrics::counter;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use super::http::{OnError, PagedHttpGenerator, SnapshotGenerator};
use super::{Client, EmptyGenerator, PageGenerator};
use crate::config::SourcesConfig;
use crate::error::SourceError;
use crate::metrics::SOURCE_FAILURES;
use crate::users::User;

/// Posts requested per upstream page.
const PAGE_COUNT: &str = "20";

/// `base` with its path replaced by `segments` (each segment percent-encoded).
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, SourceError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SourceError::Misconfigured(format!("{base} cannot be a base URL")))?
        .clear()
        .extend(segments);
    Ok(url)
}

fn parse_base(base_url: &str) -> Result<Url, SourceError> {
    Ok(Url::parse(base_url)?)
}

pub struct HackerNews {
    http: reqwest::Client,
    base: Url,
}

impl HackerNews {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            http,
            base: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl Client for HackerNews {
    fn name(&self) -> &str {
        "hacker-news"
    }

    async fn page_generator(&self, _user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        let mut url = endpoint(&self.base, &["v1", "posts"])?;
        url.query_pairs_mut().append_pair("count", PAGE_COUNT);
        Ok(Box::new(PagedHttpGenerator::new(self.http.clone(), self.name(), url)))
    }
}

/// Personal front page when the user linked an account, the public one otherwise.
pub struct Reddit {
    http: reqwest::Client,
    base: Url,
}

impl Reddit {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            http,
            base: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl Client for Reddit {
    fn name(&self) -> &str {
        "reddit"
    }

    async fn page_generator(&self, user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        let linked = user
            .and_then(|u| u.reddit.as_ref())
            .filter(|a| !a.username.is_empty());

        let generator = match linked {
            Some(account) => {
                let url = endpoint(&self.base, &["v1", &account.username, "posts"])?;
                PagedHttpGenerator::new(self.http.clone(), self.name(), url)
                    .with_auth_body(json!({ "bearertoken": account.token }))
            }
            None => {
                let url = endpoint(&self.base, &["v1", "posts"])?;
                PagedHttpGenerator::new(self.http.clone(), self.name(), url)
            }
        };
        Ok(Box::new(generator))
    }
}

/// Not paginated: one snapshot per session.
pub struct GoogleNews {
    http: reqwest::Client,
    base: Url,
}

impl GoogleNews {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            http,
            base: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl Client for GoogleNews {
    fn name(&self) -> &str {
        "google-news"
    }

    async fn page_generator(&self, _user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        let mut url = endpoint(&self.base, &["v1", "posts"])?;
        url.query_pairs_mut().append_pair("count", PAGE_COUNT);
        Ok(Box::new(SnapshotGenerator::new(self.http.clone(), self.name(), url)))
    }
}

/// Needs the user's access token. Upstream failures are treated as transient.
pub struct Facebook {
    http: reqwest::Client,
    base: Url,
}

impl Facebook {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            http,
            base: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl Client for Facebook {
    fn name(&self) -> &str {
        "facebook"
    }

    async fn page_generator(&self, user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        let token = user
            .and_then(|u| u.facebook.as_ref())
            .map(|a| a.token.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SourceError::missing_credentials(self.name(), "empty auth token"))?;

        let mut url = endpoint(&self.base, &["v1", "posts"])?;
        url.query_pairs_mut().append_pair("fb_token", token);
        Ok(Box::new(
            PagedHttpGenerator::new(self.http.clone(), self.name(), url).on_error(OnError::Retry),
        ))
    }
}

/// Only available for users with a linked account.
pub struct Twitter {
    http: reqwest::Client,
    base: Url,
}

impl Twitter {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            http,
            base: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl Client for Twitter {
    fn name(&self) -> &str {
        "twitter"
    }

    async fn page_generator(&self, user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        let (user, account) = user
            .and_then(|u| u.twitter.as_ref().map(|a| (u, a)))
            .filter(|(_, a)| !a.username.is_empty())
            .ok_or_else(|| SourceError::missing_credentials(self.name(), "no linked account"))?;

        let url = endpoint(&self.base, &["v1", &user.username, "posts"])?;
        let body = json!({
            "token": account.token,
            "secret": account.secret.clone().unwrap_or_default(),
        });
        Ok(Box::new(
            PagedHttpGenerator::new(self.http.clone(), self.name(), url).with_auth_body(body),
        ))
    }
}

/// The RSS page service. It is not a source itself; each named group of
/// feeds becomes a source through [`RssClient::group`].
pub struct RssClient {
    http: reqwest::Client,
    base: Url,
}

impl RssClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            http,
            base: parse_base(base_url)?,
        })
    }

    pub fn group(self: &Arc<Self>, name: &str, feeds: Vec<String>) -> RssGroup {
        RssGroup {
            rss: Arc::clone(self),
            name: name.to_string(),
            feeds,
        }
    }

    fn generator(&self, source: &str, feeds: &[String]) -> Result<Box<dyn PageGenerator>, SourceError> {
        if feeds.is_empty() {
            return Ok(Box::new(EmptyGenerator));
        }
        let mut url = endpoint(&self.base, &["v1", "posts"])?;
        url.query_pairs_mut()
            .append_pair("count", PAGE_COUNT)
            .append_pair("feeds", &feeds.join(","));
        Ok(Box::new(PagedHttpGenerator::new(self.http.clone(), source, url)))
    }
}

/// One named group of RSS feeds, weighted as a source of its own.
pub struct RssGroup {
    rss: Arc<RssClient>,
    name: String,
    feeds: Vec<String>,
}

#[async_trait]
impl Client for RssGroup {
    fn name(&self) -> &str {
        &self.name
    }

    async fn page_generator(&self, _user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        self.rss.generator(&self.name, &self.feeds)
    }
}

/// Keep a client that was built, or log and count the one that was not.
fn configured<C>(name: &str, built: Result<C, SourceError>) -> Option<C> {
    match built {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(source = name, error = %e, "source misconfigured, skipped");
            counter!(SOURCE_FAILURES, "source" => name.to_string()).increment(1);
            None
        }
    }
}

/// Instantiate every enabled platform client from configuration.
/// Returns the fixed clients in a stable order plus the RSS service, if
/// enabled. A client whose configuration is unusable is left out.
pub fn from_config(
    cfg: &SourcesConfig,
    http: &reqwest::Client,
) -> (Vec<Arc<dyn Client>>, Option<Arc<RssClient>>) {
    let mut fixed: Vec<Arc<dyn Client>> = Vec::new();

    if cfg.hacker_news.enabled {
        if let Some(c) = configured("hacker-news", HackerNews::new(http.clone(), &cfg.hacker_news.base_url)) {
            fixed.push(Arc::new(c));
        }
    }
    if cfg.reddit.enabled {
        if let Some(c) = configured("reddit", Reddit::new(http.clone(), &cfg.reddit.base_url)) {
            fixed.push(Arc::new(c));
        }
    }
    if cfg.google_news.enabled {
        if let Some(c) = configured("google-news", GoogleNews::new(http.clone(), &cfg.google_news.base_url)) {
            fixed.push(Arc::new(c));
        }
    }
    if cfg.facebook.enabled {
        if let Some(c) = configured("facebook", Facebook::new(http.clone(), &cfg.facebook.base_url)) {
            fixed.push(Arc::new(c));
        }
    }
    if cfg.twitter.enabled {
        if let Some(c) = configured("twitter", Twitter::new(http.clone(), &cfg.twitter.base_url)) {
            fixed.push(Arc::new(c));
        }
    }

    let rss = cfg
        .rss
        .enabled
        .then(|| configured("rss", RssClient::new(http.clone(), &cfg.rss.base_url)))
        .flatten()
        .map(Arc::new);

    (fixed, rss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::LinkedAccount;

    fn http() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[test]
    fn endpoint_encodes_segments() {
        let base = Url::parse("http://reddit-client:3001").unwrap();
        let url = endpoint(&base, &["v1", "a b", "posts"]).unwrap();
        assert_eq!(url.as_str(), "http://reddit-client:3001/v1/a%20b/posts");
    }

    #[test]
    fn bad_base_url_is_a_config_error() {
        assert!(matches!(
            HackerNews::new(http(), "not a url"),
            Err(SourceError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn facebook_requires_token() {
        let fb = Facebook::new(http(), "http://facebook-client:5000").unwrap();
        assert!(matches!(
            fb.page_generator(None).await,
            Err(SourceError::MissingCredentials { .. })
        ));

        let user = User {
            id: "u".into(),
            facebook: Some(LinkedAccount {
                token: "tok".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(fb.page_generator(Some(&user)).await.is_ok());
    }

    #[tokio::test]
    async fn twitter_requires_linked_account() {
        let tw = Twitter::new(http(), "https://twitter-client:3003").unwrap();
        let anon = User {
            id: "u".into(),
            username: "jack".into(),
            ..Default::default()
        };
        assert!(matches!(
            tw.page_generator(Some(&anon)).await,
            Err(SourceError::MissingCredentials { .. })
        ));
    }

    #[tokio::test]
    async fn rss_group_without_feeds_is_empty() {
        let rss = Arc::new(RssClient::new(http(), "http://rss-client:4000").unwrap());
        let group = rss.group("tech", Vec::new());
        assert_eq!(group.name(), "tech");
        let mut g = group.page_generator(None).await.unwrap();
        assert!(g.next_page().await.is_empty());
    }

    #[test]
    fn from_config_respects_enabled_flags() {
        let mut cfg = SourcesConfig::default();
        cfg.facebook.enabled = false;
        cfg.rss.enabled = false;
        let (fixed, rss) = from_config(&cfg, &http());
        let names: Vec<_> = fixed.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["hacker-news", "reddit", "google-news", "twitter"]);
        assert!(rss.is_none());
    }

    #[test]
    fn unparsable_base_url_skips_only_that_source() {
        let mut cfg = SourcesConfig::default();
        cfg.twitter.base_url = String::new();
        cfg.rss.base_url = "::".into();
        let (fixed, rss) = from_config(&cfg, &http());
        let names: Vec<_> = fixed.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["hacker-news", "reddit", "google-news", "facebook"]);
        assert!(rss.is_none());
    }
}
