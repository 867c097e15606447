use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::config::AppConfig;
use crate::spotify::api::{CatalogClient, CatalogError, CatalogResult};
use crate::spotify::track::{normalize_page, NormalizedPage, Track};
use crate::sync::{progress_percent, ProgressObserver};

/// Pagination and rate limit knobs. Every field can be overridden from the
/// `fetch` section of the config file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct FetchPolicy {
    pub page_size: usize,
    pub inter_request_delay_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_ceiling_ms: u64,
    pub max_retries: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            page_size: AppConfig::SPOTIFY_PAGE_SIZE,
            inter_request_delay_ms: 100,
            backoff_base_ms: 1_000,
            backoff_ceiling_ms: 60_000,
            max_retries: 3,
        }
    }
}

impl FetchPolicy {
    pub fn page_size(&self) -> usize {
        self.page_size.clamp(1, AppConfig::SPOTIFY_PAGE_SIZE)
    }

    pub fn inter_request_delay(&self) -> Duration {
        Duration::from_millis(self.inter_request_delay_ms)
    }

    /// `min(max(retry_after, base * 2^retry_count), ceiling)`
    pub fn backoff_delay(&self, retry_after: Option<Duration>, retry_count: u32) -> Duration {
        let exponential = Duration::from_millis(self.backoff_base_ms)
            .saturating_mul(2u32.saturating_pow(retry_count));
        retry_after
            .unwrap_or_default()
            .max(exponential)
            .min(Duration::from_millis(self.backoff_ceiling_ms))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbandonReason {
    /// The same offset was rate limited `attempts` times in a row.
    RateLimited { attempts: u32 },
    Failed(CatalogError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchState {
    Requesting { offset: usize, attempt: u32 },
    Backoff { offset: usize, attempt: u32, delay: Duration },
    Done,
    Abandoned { offset: usize, reason: AbandonReason },
}

/// What a single page request produced.
#[derive(Clone, Debug)]
pub enum PageEvent {
    Fetched(NormalizedPage),
    RateLimited { retry_after: Option<Duration> },
    Failed(CatalogError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchStatus {
    Complete,
    /// Nothing at or after `offset` was fetched.
    Incomplete { offset: usize, reason: AbandonReason },
}

/// Attached to a fetch error: tracks read before the failing offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchedSoFar(pub usize);

#[derive(Clone, Debug)]
pub struct FetchOutcome {
    pub tracks: Vec<Track>,
    pub skipped: usize,
    pub status: FetchStatus,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == FetchStatus::Complete
    }
}

/// Cumulative state of one full playlist pull.
#[derive(Debug)]
pub struct FetchSession {
    policy: FetchPolicy,
    total: usize,
    next_offset: usize,
    retry_count: u32,
    accumulated: Vec<Track>,
    skipped: usize,
}

impl FetchSession {
    pub fn new(total: usize, policy: FetchPolicy) -> Self {
        Self {
            policy,
            total,
            next_offset: 0,
            retry_count: 0,
            accumulated: Vec::with_capacity(total),
            skipped: 0,
        }
    }

    pub fn start(&self) -> FetchState {
        if self.total == 0 {
            FetchState::Done
        } else {
            FetchState::Requesting {
                offset: 0,
                attempt: 0,
            }
        }
    }

    pub fn total_batches(&self) -> usize {
        self.total.div_ceil(self.policy.page_size())
    }

    pub fn progress(&self) -> u8 {
        progress_percent(
            self.next_offset / self.policy.page_size(),
            self.total_batches(),
        )
    }

    pub fn accumulated(&self) -> &[Track] {
        &self.accumulated
    }

    pub fn transition(&mut self, event: PageEvent) -> FetchState {
        let offset = self.next_offset;
        match event {
            PageEvent::Fetched(page) => {
                let room = self.total.saturating_sub(self.accumulated.len());
                self.skipped += page.skipped;
                self.accumulated.extend(page.tracks.into_iter().take(room));
                self.retry_count = 0;
                self.next_offset += self.policy.page_size();
                if self.next_offset >= self.total {
                    FetchState::Done
                } else {
                    FetchState::Requesting {
                        offset: self.next_offset,
                        attempt: 0,
                    }
                }
            }
            PageEvent::RateLimited { retry_after } => {
                if self.retry_count >= self.policy.max_retries {
                    return FetchState::Abandoned {
                        offset,
                        reason: AbandonReason::RateLimited {
                            attempts: self.retry_count + 1,
                        },
                    };
                }
                let delay = self.policy.backoff_delay(retry_after, self.retry_count);
                self.retry_count += 1;
                FetchState::Backoff {
                    offset,
                    attempt: self.retry_count,
                    delay,
                }
            }
            PageEvent::Failed(error) => FetchState::Abandoned {
                offset,
                reason: AbandonReason::Failed(error),
            },
        }
    }

    pub fn finish(self, status: FetchStatus) -> FetchOutcome {
        FetchOutcome {
            tracks: self.accumulated,
            skipped: self.skipped,
            status,
        }
    }
}

/// Pulls every track of a playlist, one page at a time, in offset order.
pub struct PaginatedFetcher<'a, C: CatalogClient + ?Sized> {
    client: &'a C,
    policy: FetchPolicy,
    progress: &'a dyn ProgressObserver,
}

impl<'a, C: CatalogClient + ?Sized> PaginatedFetcher<'a, C> {
    pub fn new(client: &'a C, policy: FetchPolicy, progress: &'a dyn ProgressObserver) -> Self {
        Self {
            client,
            policy,
            progress,
        }
    }

    /// Rate limits are retried on the same offset, other failures abandon the
    /// fetch with an incomplete outcome. `AuthExpired` and `NotFound` are
    /// returned as errors carrying [`FetchedSoFar`].
    pub async fn fetch(&self, playlist_id: &str, total: usize) -> CatalogResult<FetchOutcome> {
        let page_size = self.policy.page_size();
        let mut session = FetchSession::new(total, self.policy.clone());
        let mut state = session.start();
        log::info!(
            "Fetching {} tracks of playlist {} in {} pages",
            total,
            playlist_id,
            session.total_batches()
        );
        let status = loop {
            state = match &state {
                FetchState::Requesting { offset, attempt } => {
                    self.progress.on_progress(session.progress());
                    log::debug!("Requesting offset {} (attempt {})", offset, attempt + 1);
                    let event = match self
                        .client
                        .list_playlist_tracks(playlist_id, *offset, page_size)
                        .await
                    {
                        Ok(page) => {
                            log::debug!(
                                "Offset {} served {} of {} requested items",
                                page.offset,
                                page.items.len(),
                                page.limit
                            );
                            PageEvent::Fetched(normalize_page(&page.items))
                        }
                        Err(report) => {
                            let error = report.current_context().clone();
                            match error {
                                CatalogError::AuthExpired | CatalogError::NotFound => {
                                    self.progress.on_progress(100);
                                    let fetched = FetchedSoFar(session.accumulated().len());
                                    return Err(report.attach(fetched));
                                }
                                CatalogError::RateLimited { retry_after } => {
                                    log::warn!("Rate limited at offset {}", offset);
                                    PageEvent::RateLimited { retry_after }
                                }
                                error => {
                                    log::warn!(
                                        "Abandoning fetch at offset {}: {:?}",
                                        offset,
                                        report
                                    );
                                    PageEvent::Failed(error)
                                }
                            }
                        }
                    };
                    let fetched = matches!(event, PageEvent::Fetched(_));
                    let next = session.transition(event);
                    if fetched && matches!(next, FetchState::Requesting { .. }) {
                        sleep(self.policy.inter_request_delay()).await;
                    }
                    next
                }
                FetchState::Backoff {
                    offset,
                    attempt,
                    delay,
                } => {
                    log::info!(
                        "Waiting {:?} before retrying offset {} (retry {})",
                        delay,
                        offset,
                        attempt
                    );
                    sleep(*delay).await;
                    FetchState::Requesting {
                        offset: *offset,
                        attempt: *attempt,
                    }
                }
                FetchState::Done => break FetchStatus::Complete,
                FetchState::Abandoned { offset, reason } => {
                    break FetchStatus::Incomplete {
                        offset: *offset,
                        reason: reason.clone(),
                    }
                }
            };
        };
        self.progress.on_progress(100);
        let outcome = session.finish(status);
        log::info!(
            "Fetched {} tracks ({} skipped), status {:?}",
            outcome.tracks.len(),
            outcome.skipped,
            outcome.status
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;
    use crate::spotify::mock::{FakeCatalog, SOURCE_PLAYLIST_ID};

    fn rate_limited() -> CatalogError {
        CatalogError::RateLimited { retry_after: None }
    }

    fn ids(tracks: &[Track]) -> Vec<String> {
        tracks.iter().map(|track| track.id.clone()).collect()
    }

    fn expected_ids(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|index| format!("t{}", index)).collect()
    }

    async fn fetch_all(catalog: &FakeCatalog, total: usize) -> CatalogResult<FetchOutcome> {
        let observer = |_: u8| {};
        let fetcher = PaginatedFetcher::new(catalog, FetchPolicy::default(), &observer);
        fetcher.fetch(SOURCE_PLAYLIST_ID, total).await
    }

    fn page(count: usize) -> NormalizedPage {
        NormalizedPage {
            tracks: (0..count)
                .map(|index| Track {
                    id: format!("t{}", index),
                    title: String::new(),
                    duration_ms: 0,
                    artists: vec![],
                    album: String::new(),
                    release_date: None,
                    uri: format!("spotify:track:t{}", index),
                })
                .collect(),
            skipped: 0,
        }
    }

    #[test]
    fn test_backoff_delay() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.backoff_delay(None, 0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(None, 2), Duration::from_secs(4));
        assert_eq!(
            policy.backoff_delay(Some(Duration::from_secs(5)), 1),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.backoff_delay(Some(Duration::from_millis(10)), 1),
            Duration::from_secs(2)
        );
        assert_eq!(
            policy.backoff_delay(Some(Duration::from_secs(120)), 0),
            Duration::from_secs(60)
        );
        assert_eq!(policy.backoff_delay(None, 40), Duration::from_secs(60));
    }

    #[test]
    fn test_session_retries_same_offset_then_abandons() {
        let mut session = FetchSession::new(250, FetchPolicy::default());
        assert_eq!(
            session.start(),
            FetchState::Requesting {
                offset: 0,
                attempt: 0
            }
        );
        assert_eq!(
            session.transition(PageEvent::Fetched(page(100))),
            FetchState::Requesting {
                offset: 100,
                attempt: 0
            }
        );
        let delays = (1..=3)
            .map(|attempt| match session.transition(PageEvent::RateLimited { retry_after: None }) {
                FetchState::Backoff {
                    offset: 100,
                    attempt: seen,
                    delay,
                } => {
                    assert_eq!(seen, attempt);
                    delay
                }
                other => panic!("unexpected state {:?}", other),
            })
            .collect::<Vec<_>>();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert_eq!(
            session.transition(PageEvent::RateLimited { retry_after: None }),
            FetchState::Abandoned {
                offset: 100,
                reason: AbandonReason::RateLimited { attempts: 4 }
            }
        );
        assert_eq!(session.accumulated().len(), 100);
    }

    #[test]
    fn test_session_resets_retry_counter_after_success() {
        let mut session = FetchSession::new(300, FetchPolicy::default());
        session.transition(PageEvent::RateLimited { retry_after: None });
        session.transition(PageEvent::RateLimited { retry_after: None });
        session.transition(PageEvent::Fetched(page(100)));
        assert_eq!(
            session.transition(PageEvent::RateLimited { retry_after: None }),
            FetchState::Backoff {
                offset: 100,
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn test_session_never_exceeds_total() {
        let mut session = FetchSession::new(50, FetchPolicy::default());
        assert_eq!(session.transition(PageEvent::Fetched(page(80))), FetchState::Done);
        assert_eq!(session.accumulated().len(), 50);
    }

    #[test]
    fn test_session_with_empty_total_is_done() {
        let session = FetchSession::new(0, FetchPolicy::default());
        assert_eq!(session.start(), FetchState::Done);
        assert_eq!(session.total_batches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_250_tracks_in_three_pages() {
        let catalog = FakeCatalog::new("me", "Source", 250);
        let started = Instant::now();
        let outcome = fetch_all(&catalog, 250).await.unwrap();
        assert_eq!(catalog.requested_offsets(), vec![0, 100, 200]);
        assert!(outcome.is_complete());
        assert_eq!(ids(&outcome.tracks), expected_ids(0..250));
        assert_eq!(outcome.tracks[200..].len(), 50);
        // one pause between each pair of successful requests
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_issues_ceil_total_over_page_size_requests() {
        for total in [1, 99, 100, 101, 199, 200, 1000] {
            let catalog = FakeCatalog::new("me", "Source", total);
            let outcome = fetch_all(&catalog, total).await.unwrap();
            assert_eq!(catalog.requested_offsets().len(), total.div_ceil(100));
            assert_eq!(outcome.tracks.len(), total);
            assert!(outcome.is_complete());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_empty_playlist_makes_no_requests() {
        let catalog = FakeCatalog::new("me", "Source", 0);
        let seen = Mutex::new(vec![]);
        let observer = |percent: u8| seen.lock().unwrap().push(percent);
        let fetcher = PaginatedFetcher::new(&catalog, FetchPolicy::default(), &observer);
        let outcome = fetcher.fetch(SOURCE_PLAYLIST_ID, 0).await.unwrap();
        assert!(outcome.tracks.is_empty());
        assert!(outcome.is_complete());
        assert!(catalog.requested_offsets().is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_recovers_from_three_rate_limits() {
        let catalog = FakeCatalog::new("me", "Source", 250)
            .fail_tracks_at(100, vec![rate_limited(), rate_limited(), rate_limited()]);
        let started = Instant::now();
        let outcome = fetch_all(&catalog, 250).await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(ids(&outcome.tracks), expected_ids(0..250));
        assert_eq!(catalog.requested_offsets(), vec![0, 100, 100, 100, 100, 200]);
        // 100ms pause, 1s + 2s + 4s of backoff, 100ms pause
        assert_eq!(started.elapsed(), Duration::from_millis(7_200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_honours_retry_after() {
        let catalog = FakeCatalog::new("me", "Source", 100).fail_tracks_at(
            0,
            vec![CatalogError::RateLimited {
                retry_after: Some(Duration::from_secs(9)),
            }],
        );
        let started = Instant::now();
        let outcome = fetch_all(&catalog, 100).await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(started.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_abandons_after_four_rate_limits() {
        let catalog = FakeCatalog::new("me", "Source", 250).fail_tracks_at(
            100,
            vec![rate_limited(), rate_limited(), rate_limited(), rate_limited()],
        );
        let outcome = fetch_all(&catalog, 250).await.unwrap();
        assert_eq!(
            outcome.status,
            FetchStatus::Incomplete {
                offset: 100,
                reason: AbandonReason::RateLimited { attempts: 4 }
            }
        );
        assert_eq!(ids(&outcome.tracks), expected_ids(0..100));
        assert_eq!(catalog.requested_offsets(), vec![0, 100, 100, 100, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_abandons_on_transient_error() {
        let catalog = FakeCatalog::new("me", "Source", 250)
            .fail_tracks_at(100, vec![CatalogError::TransientNetwork]);
        let outcome = fetch_all(&catalog, 250).await.unwrap();
        assert_eq!(
            outcome.status,
            FetchStatus::Incomplete {
                offset: 100,
                reason: AbandonReason::Failed(CatalogError::TransientNetwork)
            }
        );
        assert_eq!(outcome.tracks.len(), 100);
        assert_eq!(catalog.requested_offsets(), vec![0, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_propagates_auth_expired() {
        let catalog =
            FakeCatalog::new("me", "Source", 250).fail_tracks_at(100, vec![CatalogError::AuthExpired]);
        let report = fetch_all(&catalog, 250).await.unwrap_err();
        assert_eq!(report.current_context(), &CatalogError::AuthExpired);
        assert_eq!(catalog.requested_offsets(), vec![0, 100]);
        assert_eq!(report.downcast_ref::<FetchedSoFar>(), Some(&FetchedSoFar(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_ends_progress_and_keeps_count() {
        let catalog =
            FakeCatalog::new("me", "Source", 250).fail_tracks_at(200, vec![CatalogError::NotFound]);
        let seen = Mutex::new(vec![]);
        let observer = |percent: u8| seen.lock().unwrap().push(percent);
        let fetcher = PaginatedFetcher::new(&catalog, FetchPolicy::default(), &observer);
        let report = fetcher.fetch(SOURCE_PLAYLIST_ID, 250).await.unwrap_err();

        assert_eq!(report.current_context(), &CatalogError::NotFound);
        assert_eq!(report.downcast_ref::<FetchedSoFar>(), Some(&FetchedSoFar(200)));
        assert_eq!(*seen.lock().unwrap(), vec![0, 33, 67, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_reports_progress_before_each_request() {
        let catalog = FakeCatalog::new("me", "Source", 250).fail_tracks_at(100, vec![rate_limited()]);
        let seen = Mutex::new(vec![]);
        let observer = |percent: u8| seen.lock().unwrap().push(percent);
        let fetcher = PaginatedFetcher::new(&catalog, FetchPolicy::default(), &observer);
        fetcher.fetch(SOURCE_PLAYLIST_ID, 250).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 33, 33, 67, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_counts_skipped_items() {
        let mut items = (0..5)
            .map(|index| FakeCatalog::track_item(index, "2001"))
            .collect::<Vec<_>>();
        items[2] = serde_json::json!({ "track": null });
        let catalog = FakeCatalog::new("me", "Source", 0).with_items(items);
        let outcome = fetch_all(&catalog, 5).await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.skipped, 1);
        assert_eq!(ids(&outcome.tracks), vec!["t0", "t1", "t3", "t4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_stops_at_declared_total() {
        let catalog = FakeCatalog::new("me", "Source", 250);
        let outcome = fetch_all(&catalog, 150).await.unwrap();
        assert_eq!(catalog.requested_offsets(), vec![0, 100]);
        assert_eq!(outcome.tracks.len(), 150);
    }
}
