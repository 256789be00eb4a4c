//! Infinite-scroll discovery listing.
//!
//! Every `set_intent` starts a new generation. Fetch tasks are tagged with the generation
//! that issued them and their responses are dropped when it is no longer current, so a slow
//! response can never overwrite the listing of a newer query. The underlying HTTP call is not
//! aborted; only the debounce timer is.

use crate::error::FailureKind;
use crate::models::{MovieSummary, PagedResult, QueryIntent};
use crate::tmdb::{CatalogApi, CatalogResult};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Quiet period after the last `set_intent` before the first page is requested.
    pub debounce: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No intent has been set yet.
    Idle,
    /// Waiting out the debounce window or the page-1 response.
    FetchingFirstPage,
    Ready,
    FetchingNextPage,
    /// Page 1 failed. Only a new intent leaves this phase.
    Failed,
    /// A later page came back empty.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub page: u32,
    pub message: String,
}

/// Read-only snapshot handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryView {
    pub intent: QueryIntent,
    pub generation: u64,
    pub phase: Phase,
    pub page: u32,
    pub has_more: bool,
    pub results: Vec<MovieSummary>,
    pub is_loading_first_page: bool,
    pub is_loading_more: bool,
    pub last_error: Option<FetchFailure>,
}

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Merged { page: u32, count: usize },
    Failed { page: u32 },
    Stale { generation: u64 },
}

struct PageState {
    generation: u64,
    intent: QueryIntent,
    phase: Phase,
    page: u32,
    has_more: bool,
    results: Vec<MovieSummary>,
    last_error: Option<FetchFailure>,
    debounce: Option<JoinHandle<()>>,
}

impl PageState {
    fn view(&self) -> DiscoveryView {
        DiscoveryView {
            intent: self.intent.clone(),
            generation: self.generation,
            phase: self.phase,
            page: self.page,
            has_more: self.has_more,
            results: self.results.clone(),
            is_loading_first_page: self.phase == Phase::FetchingFirstPage,
            is_loading_more: self.phase == Phase::FetchingNextPage,
            last_error: self.last_error.clone(),
        }
    }
}

struct Shared {
    catalog: Arc<dyn CatalogApi>,
    config: DiscoveryConfig,
    state: Mutex<PageState>,
    view_tx: watch::Sender<DiscoveryView>,
}

/// Owns the active query intent, the page cursor and the accumulated listing.
///
/// Mutators return immediately and must be called from within a tokio runtime; results
/// arrive through [`DiscoveryController::subscribe`].
#[derive(Clone)]
pub struct DiscoveryController {
    shared: Arc<Shared>,
}

impl DiscoveryController {
    pub fn new(catalog: Arc<dyn CatalogApi>, config: DiscoveryConfig) -> Self {
        let state = PageState {
            generation: 0,
            intent: QueryIntent::default(),
            phase: Phase::Idle,
            page: 1,
            has_more: true,
            results: Vec::new(),
            last_error: None,
            debounce: None,
        };
        let (view_tx, _) = watch::channel(state.view());
        Self {
            shared: Arc::new(Shared {
                catalog,
                config,
                state: Mutex::new(state),
                view_tx,
            }),
        }
    }

    /// Activates `intent`, clearing the listing, and schedules its first page once the
    /// debounce window passes without another call. Returns the new generation.
    pub fn set_intent(&self, intent: QueryIntent) -> u64 {
        let mut state = self.shared.lock();
        if let Some(pending) = state.debounce.take() {
            pending.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        debug!(generation, intent = %intent.label(), "Intent changed");

        state.intent = intent;
        state.phase = Phase::FetchingFirstPage;
        state.page = 1;
        state.has_more = true;
        state.results.clear();
        state.last_error = None;

        let shared = Arc::clone(&self.shared);
        state.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(shared.config.debounce).await;
            shared.fetch_first_page(generation).await;
        }));
        self.shared.publish(&state);
        generation
    }

    /// Requests the next page of the active intent. Returns `false` without doing anything
    /// when the listing is exhausted, failed, or already has a fetch outstanding.
    pub fn advance_page(&self) -> bool {
        let mut state = self.shared.lock();
        if state.phase != Phase::Ready || !state.has_more {
            debug!(
                generation = state.generation,
                phase = ?state.phase,
                has_more = state.has_more,
                "Ignoring advance request"
            );
            return false;
        }
        state.page += 1;
        state.phase = Phase::FetchingNextPage;
        state.last_error = None;

        let generation = state.generation;
        let page = state.page;
        let intent = state.intent.clone();
        info!(generation, page, intent = %intent.label(), "Fetching next page");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let response = shared.fetch(&intent, page).await;
            shared.complete(generation, page, response);
        });
        self.shared.publish(&state);
        true
    }

    pub fn view(&self) -> DiscoveryView {
        self.shared.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DiscoveryView> {
        self.shared.view_tx.subscribe()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &PageState) {
        self.view_tx.send_replace(state.view());
    }

    async fn fetch_first_page(&self, generation: u64) {
        let intent = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            // Past the timer: a newer intent now supersedes this fetch instead of aborting it.
            state.debounce = None;
            state.intent.clone()
        };
        info!(generation, intent = %intent.label(), "Fetching first page");
        let response = self.fetch(&intent, 1).await;
        self.complete(generation, 1, response);
    }

    async fn fetch(&self, intent: &QueryIntent, page: u32) -> CatalogResult<PagedResult> {
        match intent {
            QueryIntent::Search(text) => self.catalog.fetch_search(text, page).await,
            QueryIntent::GenreFilter(genre_id) => {
                self.catalog.fetch_by_genre(*genre_id, page).await
            }
            QueryIntent::Popular => self.catalog.fetch_popular(page).await,
        }
    }

    fn complete(&self, generation: u64, page: u32, response: CatalogResult<PagedResult>) -> Applied {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                page,
                "Dropping response from superseded intent"
            );
            return Applied::Stale { generation };
        }

        let applied = match response {
            Ok(paged) => {
                let count = paged.results.len();
                if page == 1 {
                    // A short or empty first page does not end pagination.
                    state.results = paged.results;
                    state.has_more = true;
                    state.phase = Phase::Ready;
                } else {
                    state.results.extend(paged.results);
                    state.has_more = count > 0;
                    state.phase = if state.has_more {
                        Phase::Ready
                    } else {
                        Phase::Exhausted
                    };
                }
                state.last_error = None;
                debug!(
                    generation,
                    page,
                    count,
                    total = state.results.len(),
                    has_more = state.has_more,
                    "Merged page"
                );
                Applied::Merged { page, count }
            }
            Err(err) => {
                warn!(generation, page, "Catalog fetch failed: {}", err);
                state.last_error = Some(FetchFailure {
                    kind: err.kind(),
                    page,
                    message: err.to_string(),
                });
                if page == 1 {
                    state.phase = Phase::Failed;
                } else {
                    // Roll the cursor back so the next advance retries this page.
                    state.page = page - 1;
                    state.phase = Phase::Ready;
                }
                Applied::Failed { page }
            }
        };
        self.publish(&state);
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use crate::models::{Genre, MovieDetail};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};

    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn movies(first_id: u64, count: usize) -> Vec<MovieSummary> {
        (0..count as u64)
            .map(|i| MovieSummary {
                id: first_id + i,
                title: format!("Movie {}", first_id + i),
                overview: String::new(),
                poster_path: None,
                backdrop_path: None,
                vote_average: 6.0,
                release_date: None,
            })
            .collect()
    }

    #[derive(Default)]
    struct ScriptedCatalog {
        pages: HashMap<(String, u32), Vec<MovieSummary>>,
        delays: HashMap<(String, u32), Duration>,
        failures: HashSet<(String, u32)>,
        undecodable: HashSet<(String, u32)>,
        calls: Mutex<Vec<(String, u32)>>,
    }

    impl ScriptedCatalog {
        fn page(mut self, intent: &QueryIntent, page: u32, results: Vec<MovieSummary>) -> Self {
            self.pages.insert((intent.label(), page), results);
            self
        }

        fn delay(mut self, intent: &QueryIntent, page: u32, delay: Duration) -> Self {
            self.delays.insert((intent.label(), page), delay);
            self
        }

        fn fail(mut self, intent: &QueryIntent, page: u32) -> Self {
            self.failures.insert((intent.label(), page));
            self
        }

        fn fail_decode(mut self, intent: &QueryIntent, page: u32) -> Self {
            self.undecodable.insert((intent.label(), page));
            self
        }

        fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().unwrap().clone()
        }

        async fn respond(&self, intent: QueryIntent, page: u32) -> CatalogResult<PagedResult> {
            let key = (intent.label(), page);
            self.calls.lock().unwrap().push(key.clone());
            if let Some(delay) = self.delays.get(&key) {
                tokio::time::sleep(*delay).await;
            }
            if self.failures.contains(&key) {
                return Err(CatalogError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            if self.undecodable.contains(&key) {
                let err = serde_json::from_str::<PagedResult>("{\"results\": [").unwrap_err();
                return Err(CatalogError::Decode(err));
            }
            Ok(PagedResult {
                results: self.pages.get(&key).cloned().unwrap_or_default(),
            })
        }
    }

    #[async_trait]
    impl CatalogApi for ScriptedCatalog {
        async fn fetch_popular(&self, page: u32) -> CatalogResult<PagedResult> {
            self.respond(QueryIntent::Popular, page).await
        }
        async fn fetch_by_genre(&self, genre_id: u32, page: u32) -> CatalogResult<PagedResult> {
            self.respond(QueryIntent::GenreFilter(genre_id), page).await
        }
        async fn fetch_search(&self, text: &str, page: u32) -> CatalogResult<PagedResult> {
            self.respond(QueryIntent::Search(text.to_string()), page)
                .await
        }
        async fn fetch_genres(&self) -> CatalogResult<Vec<Genre>> {
            Ok(Vec::new())
        }
        async fn fetch_detail(&self, _id: u64) -> CatalogResult<MovieDetail> {
            unreachable!("discovery never fetches details")
        }
        async fn fetch_recommendations(&self, _id: u64) -> CatalogResult<PagedResult> {
            unreachable!("discovery never fetches recommendations")
        }
        async fn fetch_top_rated(&self, _page: u32) -> CatalogResult<PagedResult> {
            unreachable!("discovery never fetches top rated")
        }
        async fn fetch_upcoming(&self) -> CatalogResult<PagedResult> {
            unreachable!("discovery never fetches upcoming")
        }
    }

    fn controller(catalog: &Arc<ScriptedCatalog>) -> DiscoveryController {
        DiscoveryController::new(
            catalog.clone(),
            DiscoveryConfig { debounce: DEBOUNCE },
        )
    }

    async fn settle() {
        tokio::time::sleep(DEBOUNCE + Duration::from_millis(100)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn starts_idle_without_fetching() {
        let catalog = Arc::new(ScriptedCatalog::default());
        let discovery = controller(&catalog);
        settle().await;
        let view = discovery.view();
        assert_eq!(view.phase, Phase::Idle);
        assert_eq!(view.page, 1);
        assert!(view.has_more);
        assert!(catalog.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_intents_issues_one_fetch_for_the_last() {
        let catalog = Arc::new(ScriptedCatalog::default().page(
            &QueryIntent::Search("dune".to_string()),
            1,
            movies(1, 5),
        ));
        let discovery = controller(&catalog);

        for text in ["d", "du", "dun", "dune"] {
            discovery.set_intent(QueryIntent::Search(text.to_string()));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(catalog.calls().is_empty());
        settle().await;

        assert_eq!(catalog.calls(), vec![("search:dune".to_string(), 1)]);
        let view = discovery.view();
        assert_eq!(view.results.len(), 5);
        assert_eq!(view.phase, Phase::Ready);
        assert!(!view.is_loading_first_page);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_flag_covers_debounce_and_request() {
        let catalog = Arc::new(
            ScriptedCatalog::default()
                .page(&QueryIntent::Popular, 1, movies(1, 20))
                .delay(&QueryIntent::Popular, 1, Duration::from_secs(1)),
        );
        let discovery = controller(&catalog);
        discovery.set_intent(QueryIntent::Popular);
        assert!(discovery.view().is_loading_first_page);

        settle().await;
        let view = discovery.view();
        assert!(view.is_loading_first_page);
        assert!(!view.is_loading_more);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!discovery.view().is_loading_first_page);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_second_page_ends_pagination() {
        let catalog =
            Arc::new(ScriptedCatalog::default().page(&QueryIntent::Popular, 1, movies(1, 20)));
        let discovery = controller(&catalog);
        discovery.set_intent(QueryIntent::Popular);
        settle().await;
        assert_eq!(discovery.view().results.len(), 20);

        assert!(discovery.advance_page());
        settle().await;

        let view = discovery.view();
        assert!(!view.has_more);
        assert_eq!(view.results.len(), 20);
        assert_eq!(view.phase, Phase::Exhausted);
        assert_eq!(view.page, 2);

        assert!(!discovery.advance_page());
        settle().await;
        assert_eq!(catalog.calls().len(), 2);
        assert_eq!(discovery.view(), view);
    }

    #[tokio::test(start_paused = true)]
    async fn short_first_page_keeps_has_more() {
        let catalog = Arc::new(
            ScriptedCatalog::default()
                .page(&QueryIntent::GenreFilter(99), 1, movies(1, 3))
                .page(&QueryIntent::GenreFilter(99), 2, movies(4, 2)),
        );
        let discovery = controller(&catalog);
        discovery.set_intent(QueryIntent::GenreFilter(99));
        settle().await;
        assert!(discovery.view().has_more);

        assert!(discovery.advance_page());
        settle().await;
        let view = discovery.view();
        assert_eq!(
            view.results.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert!(view.has_more);
        assert_eq!(view.page, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn advance_is_ignored_while_a_fetch_is_outstanding() {
        let catalog = Arc::new(
            ScriptedCatalog::default()
                .page(&QueryIntent::Popular, 1, movies(1, 20))
                .page(&QueryIntent::Popular, 2, movies(21, 20))
                .delay(&QueryIntent::Popular, 2, Duration::from_secs(2)),
        );
        let discovery = controller(&catalog);
        discovery.set_intent(QueryIntent::Popular);
        assert!(!discovery.advance_page());
        settle().await;

        assert!(discovery.advance_page());
        let before = discovery.view();
        assert!(before.is_loading_more);
        assert!(!discovery.advance_page());
        assert!(!discovery.advance_page());
        assert_eq!(discovery.view(), before);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            catalog.calls(),
            vec![("popular".to_string(), 1), ("popular".to_string(), 2)]
        );
        assert_eq!(discovery.view().results.len(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_search_response_is_discarded() {
        let dune = QueryIntent::Search("dune".to_string());
        let scifi = QueryIntent::GenreFilter(878);
        let catalog = Arc::new(
            ScriptedCatalog::default()
                .page(&dune, 1, movies(100, 5))
                .delay(&dune, 1, Duration::from_secs(5))
                .page(&scifi, 1, movies(878, 20)),
        );
        let discovery = controller(&catalog);

        discovery.set_intent(dune);
        settle().await;
        discovery.set_intent(scifi.clone());
        settle().await;
        assert_eq!(discovery.view().results.len(), 20);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let view = discovery.view();
        assert_eq!(view.intent, scifi);
        assert_eq!(view.results.len(), 20);
        assert!(view.results.iter().all(|m| m.id >= 878));
        assert_eq!(view.last_error, None);
        assert_eq!(catalog.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_for_old_generation_reports_stale() {
        let catalog = Arc::new(ScriptedCatalog::default());
        let discovery = controller(&catalog);
        let old = discovery.set_intent(QueryIntent::Popular);
        discovery.set_intent(QueryIntent::GenreFilter(12));

        let applied = discovery.shared.complete(
            old,
            1,
            Ok(PagedResult {
                results: movies(1, 3),
            }),
        );
        assert_eq!(applied, Applied::Stale { generation: old });
        assert!(discovery.view().results.is_empty());
        assert!(discovery.view().is_loading_first_page);
    }

    #[tokio::test(start_paused = true)]
    async fn first_page_failure_is_terminal_until_new_intent() {
        let catalog = Arc::new(
            ScriptedCatalog::default()
                .fail(&QueryIntent::Popular, 1)
                .page(&QueryIntent::GenreFilter(28), 1, movies(1, 4)),
        );
        let discovery = controller(&catalog);
        discovery.set_intent(QueryIntent::Popular);
        settle().await;

        let view = discovery.view();
        assert_eq!(view.phase, Phase::Failed);
        assert!(view.results.is_empty());
        assert!(!view.is_loading_first_page);
        let failure = view.last_error.expect("error surfaced");
        assert_eq!(failure.kind, FailureKind::NetworkFailure);
        assert_eq!(failure.page, 1);

        assert!(!discovery.advance_page());

        discovery.set_intent(QueryIntent::GenreFilter(28));
        settle().await;
        let view = discovery.view();
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.results.len(), 4);
        assert_eq!(view.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn next_page_failure_keeps_results_and_retries_same_page() {
        let catalog = Arc::new(
            ScriptedCatalog::default()
                .page(&QueryIntent::Popular, 1, movies(1, 20))
                .fail(&QueryIntent::Popular, 2),
        );
        let discovery = controller(&catalog);
        discovery.set_intent(QueryIntent::Popular);
        settle().await;

        assert!(discovery.advance_page());
        settle().await;
        let view = discovery.view();
        assert_eq!(view.results.len(), 20);
        assert!(view.has_more);
        assert_eq!(view.page, 1);
        assert_eq!(view.phase, Phase::Ready);
        assert!(!view.is_loading_more);
        assert_eq!(view.last_error.map(|e| e.page), Some(2));

        assert!(discovery.advance_page());
        assert_eq!(discovery.view().last_error, None);
        settle().await;
        assert_eq!(
            catalog.calls(),
            vec![
                ("popular".to_string(), 1),
                ("popular".to_string(), 2),
                ("popular".to_string(), 2)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn next_page_decode_failure_is_classified_and_keeps_results() {
        let catalog = Arc::new(
            ScriptedCatalog::default()
                .page(&QueryIntent::Popular, 1, movies(1, 20))
                .fail_decode(&QueryIntent::Popular, 2),
        );
        let discovery = controller(&catalog);
        discovery.set_intent(QueryIntent::Popular);
        settle().await;

        assert!(discovery.advance_page());
        settle().await;
        let view = discovery.view();
        let failure = view.last_error.clone().expect("decode failure recorded");
        assert_eq!(failure.kind, FailureKind::DecodeFailure);
        assert_eq!(failure.page, 2);
        assert_eq!(view.results.len(), 20);
        assert_eq!(view.page, 1);
        assert_eq!(view.phase, Phase::Ready);
        assert!(view.has_more);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_observe_updates() {
        let catalog =
            Arc::new(ScriptedCatalog::default().page(&QueryIntent::Popular, 1, movies(1, 2)));
        let discovery = controller(&catalog);
        let mut rx = discovery.subscribe();
        discovery.set_intent(QueryIntent::Popular);

        let view = rx
            .wait_for(|v| v.phase == Phase::Ready)
            .await
            .expect("controller alive")
            .clone();
        assert_eq!(view.results.len(), 2);
        assert_eq!(view.generation, 1);
    }
}
