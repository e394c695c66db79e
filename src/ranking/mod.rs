//! # Ranking
//! Weighted merge of many providers into one stream.
//!
//! Each round scores the current item of every eligible provider and emits the
//! best one:
//!
//! ```text
//! score = weight / ((age_minutes + 720)^1.2 * (1 + run)^0.2 * jitter)
//! ```
//!
//! `run` is how many rounds in a row the provider has just won. It is reset on
//! every other provider each round, so it only damps streaks and never the
//! provider's overall share.

pub mod jitter;
pub mod provider;

pub use jitter::{FixedJitter, Jitter, JitterMode, RandomJitter};
pub use provider::ContentProvider;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::post::Post;

/// Every item is aged by an extra 12 hours so brand-new items don't dominate.
const AGE_OFFSET_MINUTES: f64 = 12.0 * 60.0;
const AGE_EXPONENT: f64 = 1.2;
const RUN_EXPONENT: f64 = 0.2;

/// Score of `post` offered by a provider of `weight` that has won
/// `sequence_length` rounds in a row. Zero when the denominator is not
/// positive (including items dated far enough in the future to make it NaN).
pub fn rank(post: &Post, weight: f64, sequence_length: u32, now: DateTime<Utc>, jitter: f64) -> f64 {
    let age_minutes = (now - post.date).num_milliseconds() as f64 / 60_000.0 + AGE_OFFSET_MINUTES;
    let multiplier = age_minutes.powf(AGE_EXPONENT)
        * (1.0 + f64::from(sequence_length)).powf(RUN_EXPONENT)
        * jitter;
    if !(multiplier > 0.0) {
        return 0.0;
    }
    weight / multiplier
}

/// Index of the provider to emit from next, or `None` when no provider has
/// an item and a positive weight.
///
/// Ties go to the lowest index. An eligible provider is picked even when its
/// score is 0. Jitter is drawn once per eligible provider, in index order.
pub fn next_provider_index(
    providers: &[ContentProvider],
    now: DateTime<Utc>,
    jitter: &mut dyn Jitter,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in providers.iter().enumerate() {
        if !(p.weight() > 0.0) {
            continue;
        }
        let Some(post) = p.current_item() else {
            continue;
        };
        let score = rank(post, p.weight(), p.sequence_length(), now, jitter.next_factor());
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// The providers of one session, in build order.
#[derive(Debug, Default)]
pub struct ProviderSet {
    providers: Vec<ContentProvider>,
}

impl ProviderSet {
    pub fn new(providers: Vec<ContentProvider>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn providers(&self) -> &[ContentProvider] {
        &self.providers
    }

    /// Sources with an item to offer right now.
    pub fn available(&self) -> usize {
        self.providers
            .iter()
            .filter(|p| p.current_item().is_some())
            .count()
    }

    /// Give every provider without a current item another chance to load a
    /// page, concurrently. Returns how many now have an item again.
    pub async fn revive(&mut self) -> usize {
        let idle = self
            .providers
            .iter_mut()
            .filter(|p| p.current_item().is_none())
            .map(|p| async move {
                p.advance().await;
                p.current_item().is_some()
            });
        join_all(idle).await.into_iter().filter(|&back| back).count()
    }
}

impl FromIterator<ContentProvider> for ProviderSet {
    fn from_iter<I: IntoIterator<Item = ContentProvider>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Emits items from a provider set according to [`rank`].
pub struct SelectionEngine {
    jitter: Box<dyn Jitter>,
}

impl SelectionEngine {
    pub fn new(jitter: Box<dyn Jitter>) -> Self {
        Self { jitter }
    }

    /// Up to `count` items. Fewer means the set ran dry, which is not an error.
    pub async fn get_posts(&mut self, set: &mut ProviderSet, count: usize) -> Vec<Post> {
        self.get_posts_at(set, count, Utc::now()).await
    }

    /// [`SelectionEngine::get_posts`] with a fixed clock.
    pub async fn get_posts_at(
        &mut self,
        set: &mut ProviderSet,
        count: usize,
        now: DateTime<Utc>,
    ) -> Vec<Post> {
        let mut out = Vec::with_capacity(count);

        while out.len() < count {
            let Some(i) = next_provider_index(&set.providers, now, self.jitter.as_mut()) else {
                break;
            };
            let winner = &mut set.providers[i];
            let Some(post) = winner.current_item().cloned() else {
                break;
            };
            let run = winner.sequence_length.saturating_add(1);
            winner.advance().await;

            for p in set.providers.iter_mut() {
                p.sequence_length = 0;
            }
            set.providers[i].sequence_length = run;

            out.push(post);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{EmptyGenerator, StaticPages};
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    const LIMIT: Duration = Duration::from_secs(5);

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn aged(id: &str, hours: i64) -> Post {
        Post::new(id, "test", now() - ChronoDuration::hours(hours))
    }

    async fn provider(name: &str, weight: f64, posts: Vec<Post>) -> ContentProvider {
        ContentProvider::new(name, weight, Box::new(StaticPages::single(posts)), LIMIT).await
    }

    #[test]
    fn rank_matches_formula() {
        let p = aged("a", 1);
        let expected = 20.0 / (780.0f64).powf(1.2);
        assert!((rank(&p, 20.0, 0, now(), 1.0) - expected).abs() < 1e-12);

        let with_run = 20.0 / ((780.0f64).powf(1.2) * 3.0f64.powf(0.2) * 1.05);
        assert!((rank(&p, 20.0, 2, now(), 1.05) - with_run).abs() < 1e-12);
    }

    #[test]
    fn fresher_scores_higher_and_runs_are_penalised() {
        let fresh = aged("f", 0);
        let old = aged("o", 48);
        assert!(rank(&fresh, 1.0, 0, now(), 1.0) > rank(&old, 1.0, 0, now(), 1.0));
        assert!(rank(&fresh, 1.0, 0, now(), 1.0) > rank(&fresh, 1.0, 3, now(), 1.0));
    }

    #[test]
    fn far_future_items_score_zero() {
        let future = Post::new("x", "test", now() + ChronoDuration::hours(13));
        assert_eq!(rank(&future, 10.0, 0, now(), 1.0), 0.0);
        assert_eq!(rank(&future, 10.0, 0, now(), 0.0), 0.0);
    }

    #[tokio::test]
    async fn ties_go_to_lowest_index() {
        let set = vec![
            provider("a", 5.0, vec![aged("a", 1)]).await,
            provider("b", 5.0, vec![aged("b", 1)]).await,
        ];
        assert_eq!(next_provider_index(&set, now(), &mut FixedJitter(1.0)), Some(0));
    }

    #[tokio::test]
    async fn zero_weight_and_empty_providers_are_not_eligible() {
        let set = vec![
            ContentProvider::new("empty", 9.0, Box::new(EmptyGenerator), LIMIT).await,
            provider("muted", 0.0, vec![aged("m", 0)]).await,
            provider("old", 0.1, vec![aged("o", 500)]).await,
        ];
        assert_eq!(next_provider_index(&set, now(), &mut FixedJitter(1.0)), Some(2));
        assert_eq!(next_provider_index(&set[..2], now(), &mut FixedJitter(1.0)), None);
    }

    #[tokio::test]
    async fn sequence_lengths_track_only_the_last_winner() {
        let mut set = ProviderSet::new(vec![
            provider("a", 100.0, (0..5).map(|i| aged(&format!("a{i}"), 1)).collect()).await,
            provider("b", 1.0, vec![aged("b", 1)]).await,
        ]);
        let mut engine = SelectionEngine::new(Box::new(FixedJitter(1.0)));
        let out = engine.get_posts_at(&mut set, 3, now()).await;
        assert!(out.iter().all(|p| p.id.starts_with('a')));
        assert_eq!(set.providers()[0].sequence_length(), 3);
        assert_eq!(set.providers()[1].sequence_length(), 0);
    }

    #[tokio::test]
    async fn revive_reloads_idle_providers() {
        let g = StaticPages::new([Vec::new(), vec![aged("late", 0)]]);
        let mut set = ProviderSet::new(vec![
            ContentProvider::new("poll", 1.0, Box::new(g), LIMIT).await,
            provider("a", 1.0, vec![aged("a", 1)]).await,
        ]);
        assert_eq!(set.available(), 1);
        assert_eq!(set.revive().await, 1);
        assert_eq!(set.available(), 2);
    }
}
