//! Content provider: one source's generator, its weight, the page being read,
//! and a background fetch of the page after it.
//!
//! The fetch is an explicit state machine. The generator is moved into the
//! spawned fetch task and comes back with the page, so a provider never holds
//! its generator and a running fetch at the same time and at most one fetch is
//! ever in flight.

use std::fmt;
use std::mem;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::post::Post;
use crate::sources::PageGenerator;

type Fetch = JoinHandle<(Box<dyn PageGenerator>, Vec<Post>)>;

enum Prefetch {
    /// Generator at rest, owned here.
    Idle(Box<dyn PageGenerator>),
    /// Generator lent to a running fetch task.
    InFlight(Fetch),
    /// The fetch task panicked or was cancelled and took the generator with it.
    Lost,
}

impl Prefetch {
    fn label(&self) -> &'static str {
        match self {
            Prefetch::Idle(_) => "idle",
            Prefetch::InFlight(_) => "in_flight",
            Prefetch::Lost => "lost",
        }
    }
}

pub struct ContentProvider {
    source: String,
    weight: f64,
    page: Vec<Post>,
    /// Index of the current item; `page.len()` once the page is used up.
    cursor: usize,
    pub(super) sequence_length: u32,
    prefetch: Prefetch,
    page_timeout: Duration,
}

impl ContentProvider {
    /// Wrap `generator` and load its first page. Returns once the current item
    /// is known (present, absent, or the first fetch ran past `page_timeout`).
    pub async fn new(
        source: impl Into<String>,
        weight: f64,
        generator: Box<dyn PageGenerator>,
        page_timeout: Duration,
    ) -> Self {
        let mut provider = Self {
            source: source.into(),
            weight,
            page: Vec::new(),
            cursor: 0,
            sequence_length: 0,
            prefetch: Prefetch::Idle(generator),
            page_timeout,
        };
        provider.advance().await;
        provider
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn sequence_length(&self) -> u32 {
        self.sequence_length
    }

    /// What this provider would emit right now. `None` means nothing is
    /// available at the moment, not that the source is finished.
    pub fn current_item(&self) -> Option<&Post> {
        self.page.get(self.cursor)
    }

    pub fn is_prefetching(&self) -> bool {
        matches!(self.prefetch, Prefetch::InFlight(_))
    }

    /// Move past the current item.
    ///
    /// Starts the next fetch once the cursor reaches the middle of the page.
    /// At the end of the page it waits (bounded by the page timeout) for that
    /// fetch and swaps the result in. Never fails: an empty or late page just
    /// leaves the provider without a current item.
    pub async fn advance(&mut self) {
        if self.cursor < self.page.len() {
            self.cursor += 1;
        }
        self.maybe_prefetch();

        if self.cursor < self.page.len() {
            return;
        }

        if let Some(page) = self.await_page().await {
            debug!(source = %self.source, posts = page.len(), "page loaded");
            self.page = page;
            self.cursor = 0;
            self.maybe_prefetch();
        }
    }

    fn maybe_prefetch(&mut self) {
        if !self.page.is_empty() && self.cursor >= self.page.len() / 2 {
            self.start_fetch();
        }
    }

    /// Idle → InFlight. No-op in any other state.
    fn start_fetch(&mut self) {
        match mem::replace(&mut self.prefetch, Prefetch::Lost) {
            Prefetch::Idle(mut generator) => {
                self.prefetch = Prefetch::InFlight(tokio::spawn(async move {
                    let page = generator.next_page().await;
                    (generator, page)
                }));
            }
            other => self.prefetch = other,
        }
    }

    /// Next page from the in-flight fetch, starting one first if needed.
    /// `None` when the fetch is late (it stays in flight) or the generator is gone.
    async fn await_page(&mut self) -> Option<Vec<Post>> {
        self.start_fetch();
        let limit = self.page_timeout;

        let outcome = match &mut self.prefetch {
            Prefetch::InFlight(handle) => tokio::time::timeout(limit, handle).await,
            _ => return None,
        };

        match outcome {
            Ok(Ok((generator, page))) => {
                self.prefetch = Prefetch::Idle(generator);
                Some(page)
            }
            Ok(Err(e)) => {
                error!(source = %self.source, error = %e, "page fetch task failed, source retired");
                self.prefetch = Prefetch::Lost;
                None
            }
            Err(_) => {
                warn!(source = %self.source, after = ?limit, "page fetch still pending");
                None
            }
        }
    }
}

impl Drop for ContentProvider {
    fn drop(&mut self) {
        if let Prefetch::InFlight(handle) = &self.prefetch {
            handle.abort();
        }
    }
}

impl fmt::Debug for ContentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentProvider")
            .field("source", &self.source)
            .field("weight", &self.weight)
            .field("cursor", &self.cursor)
            .field("page_len", &self.page.len())
            .field("sequence_length", &self.sequence_length)
            .field("prefetch", &self.prefetch.label())
            .finish()
    }
}
