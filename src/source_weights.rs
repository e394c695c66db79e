//! # Source Weights
//!
//! Maps content sources ("hacker news", "reddit", an RSS group name, ...) to
//! relative emission weights `>= 0`. A weight of exactly 0 keeps a source in
//! the provider set but never lets it win a selection round.
//!
//! - Loads from JSON (weights + aliases), or TOML via `AppConfig`.
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - Aliases map alternative spellings to canonical sources.
//! - Fallback order: user override → aliases → exact match → default.
//! - Includes a built-in `default_seed()` with the platforms this service ships.

use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

use crate::users::User;

/// Default per-source weights, loaded from config or the built-in seed.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeightsConfig {
    /// Weight for sources with no explicit entry.
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    /// Explicit weights for canonical source names.
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Aliases mapping non-canonical names → canonical names.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f64 {
    1.0
}

impl Default for SourceWeightsConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceWeightsConfig {
    /// Load configuration from a JSON file.
    /// Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "source weights file unreadable, using defaults");
                Self::default_seed()
            }),
            Err(_) => Self::default_seed(),
        }
    }

    /// Default weight for a source, ignoring any user preference.
    pub fn weight_for(&self, source: &str) -> f64 {
        let s = normalize(source);
        let canon = self.canonical(&s);

        if let Some(&w) = self.weights.get(&canon) {
            return non_negative(w);
        }
        if let Some(&w) = self.weights.get(&s) {
            return non_negative(w);
        }
        non_negative(self.default_weight)
    }

    /// Weight for `(source, user)`: the user's own preference wins when present.
    ///
    /// User keys are matched in order: the name as given, then its canonical
    /// form, then any alias of it. Within a tier the smallest raw key wins.
    pub fn resolve(&self, source: &str, user: Option<&User>) -> f64 {
        if let Some(user) = user {
            let s = normalize(source);
            let canon = self.canonical(&s);
            let pref = user
                .weights
                .iter()
                .filter_map(|(k, &w)| {
                    let n = normalize(k);
                    let tier = if n == s {
                        0
                    } else if n == canon {
                        1
                    } else if self.canonical(&n) == canon {
                        2
                    } else {
                        return None;
                    };
                    Some(((tier, k.as_str()), w))
                })
                .min_by(|a, b| a.0.cmp(&b.0))
                .map(|(_, w)| w);
            if let Some(w) = pref {
                return non_negative(w);
            }
        }
        self.weight_for(source)
    }

    fn canonical(&self, normalized: &str) -> String {
        match self.aliases.get(normalized) {
            Some(c) => normalize(c),
            None => normalized.to_string(),
        }
    }

    /// Built-in seed covering the bundled platform clients.
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("hacker news", 4.0),
            ("reddit", 4.0),
            ("facebook", 1.0),
            ("google news", 8.0),
            ("twitter", 4.0),
        ] {
            weights.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("hn", "hacker news"),
            ("hackernews", "hacker news"),
            ("gn", "google news"),
            ("googlenews", "google news"),
            ("fb", "facebook"),
            ("x", "twitter"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: 1.0,
            weights,
            aliases,
        }
    }
}

/// Normalize input string: lowercase, replace punctuation/dashes with spaces,
/// collapse multiple spaces into one.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_ascii_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }

    out = out.replace(['\n', '\r', '\t', '.', ',', '\''], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Negative or NaN weights are treated as "never select".
fn non_negative(x: f64) -> f64 {
    if x.is_nan() || x < 0.0 {
        0.0
    } else {
        x
    }
}
