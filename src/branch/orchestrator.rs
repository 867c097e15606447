use error_stack::Report;
use tokio::time::sleep;

use crate::branch::{
    BranchError, BranchOutcome, BranchPhase, BranchRequest, BranchResult, SessionInvalidator,
};
use crate::config::AppConfig;
use crate::filter::filter;
use crate::spotify::api::{CatalogClient, CatalogError};
use crate::sync::fetcher::{FetchPolicy, FetchedSoFar, PaginatedFetcher};
use crate::sync::ProgressObserver;

pub type BranchResultOf<T> = error_stack::Result<T, BranchError>;

/// Fetches a source playlist, filters it and writes the matches to a new
/// playlist owned by the current user.
pub struct BranchOrchestrator<'a, C: CatalogClient + ?Sized> {
    client: &'a C,
    policy: FetchPolicy,
    progress: &'a dyn ProgressObserver,
    invalidator: &'a dyn SessionInvalidator,
}

impl<'a, C: CatalogClient + ?Sized> BranchOrchestrator<'a, C> {
    pub fn new(
        client: &'a C,
        policy: FetchPolicy,
        progress: &'a dyn ProgressObserver,
        invalidator: &'a dyn SessionInvalidator,
    ) -> Self {
        Self {
            client,
            policy,
            progress,
            invalidator,
        }
    }

    /// A failed write batch is counted and the remaining batches are still
    /// sent. An expired credential invalidates the session and aborts.
    pub async fn branch_playlist(&self, request: &BranchRequest) -> BranchResultOf<BranchOutcome> {
        let user = self
            .client
            .current_user()
            .await
            .map_err(|report| self.fail(report, BranchPhase::ResolveUser, 0))?;
        let source = self
            .client
            .get_playlist(&request.source_playlist_id)
            .await
            .map_err(|report| self.fail(report, BranchPhase::ResolveSource, 0))?;

        let fetcher = PaginatedFetcher::new(self.client, self.policy.clone(), self.progress);
        let fetched = fetcher
            .fetch(&source.id, source.total_tracks)
            .await
            .map_err(|report| {
                let processed = report
                    .downcast_ref::<FetchedSoFar>()
                    .map_or(0, |fetched| fetched.0);
                self.fail(report, BranchPhase::FetchTracks, processed)
            })?;
        if !fetched.is_complete() {
            log::warn!(
                "Branching from an incomplete copy of {}: {:?}",
                source.name,
                fetched.status
            );
        }

        let matching = filter(&fetched.tracks, &request.criteria);
        log::info!(
            "{} of {} tracks from {} match {}",
            matching.len(),
            fetched.tracks.len(),
            source.name,
            request.criteria
        );
        if matching.is_empty() {
            return Ok(BranchOutcome::NoMatchingTracks {
                source_name: source.name,
                scanned: fetched.tracks.len(),
                fetch_status: fetched.status,
            });
        }

        let draft = request.playlist_draft(&source.name);
        let playlist_id = self
            .client
            .create_playlist(&user.id, &draft)
            .await
            .map_err(|report| self.fail(report, BranchPhase::CreatePlaylist, 0))?;
        log::info!("Created playlist {} ({})", draft.name, playlist_id);

        let uris = matching
            .iter()
            .map(|track| track.uri.clone())
            .collect::<Vec<_>>();
        let batches_total = uris.len().div_ceil(AppConfig::SPOTIFY_WRITE_BATCH_SIZE);
        let mut tracks_written = 0;
        let mut batches_failed = 0;
        for (index, batch) in uris
            .chunks(AppConfig::SPOTIFY_WRITE_BATCH_SIZE)
            .enumerate()
        {
            if index > 0 {
                sleep(self.policy.inter_request_delay()).await;
            }
            match self.client.add_tracks(&playlist_id, batch).await {
                Ok(()) => tracks_written += batch.len(),
                Err(report) if CatalogError::is_auth_expired(&report) => {
                    return Err(self
                        .fail(report, BranchPhase::WriteTracks, tracks_written)
                        .attach_printable(format!(
                            "Playlist {} was left with {} tracks",
                            playlist_id, tracks_written
                        )));
                }
                Err(report) => {
                    log::warn!(
                        "Batch {} of {} failed: {:?}",
                        index + 1,
                        batches_total,
                        report
                    );
                    batches_failed += 1;
                }
            }
        }

        Ok(BranchOutcome::Created(BranchResult {
            playlist_id,
            playlist_name: draft.name,
            tracks_written,
            batches_total,
            batches_failed,
            fetch_status: fetched.status,
            skipped: fetched.skipped,
        }))
    }

    fn fail(
        &self,
        report: Report<CatalogError>,
        phase: BranchPhase,
        processed: usize,
    ) -> Report<BranchError> {
        if CatalogError::is_auth_expired(&report) {
            log::warn!("Credential expired while {}, clearing the session", phase);
            self.invalidator.invalidate();
        }
        report.change_context(BranchError { phase, processed })
    }
}
