use std::fmt;

use crate::filter::FilterCriteria;
use crate::spotify::playlist::{PlaylistDraft, Visibility};
use crate::sync::fetcher::FetchStatus;

pub mod orchestrator;

/// Step of a branch operation, reported when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchPhase {
    ResolveUser,
    ResolveSource,
    FetchTracks,
    CreatePlaylist,
    WriteTracks,
}

impl fmt::Display for BranchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            BranchPhase::ResolveUser => "resolving the current user",
            BranchPhase::ResolveSource => "reading the source playlist",
            BranchPhase::FetchTracks => "fetching the source tracks",
            BranchPhase::CreatePlaylist => "creating the branch playlist",
            BranchPhase::WriteTracks => "writing tracks to the branch playlist",
        };
        f.write_str(phase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchError {
    pub phase: BranchPhase,
    /// Tracks already read when fetching fails, or already written when
    /// writing fails. Zero for the other phases.
    pub processed: usize,
}

impl fmt::Display for BranchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Branch error while {} ({} tracks processed)",
            self.phase, self.processed
        )
    }
}

impl std::error::Error for BranchError {}

/// Called when the catalog reports the bearer credential as expired.
pub trait SessionInvalidator: Send + Sync {
    fn invalidate(&self);
}

impl<F> SessionInvalidator for F
where
    F: Fn() + Send + Sync,
{
    fn invalidate(&self) {
        self()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRequest {
    pub source_playlist_id: String,
    pub criteria: FilterCriteria,
    /// Overrides the derived playlist name.
    pub name: Option<String>,
    pub visibility: Visibility,
}

impl BranchRequest {
    pub fn new(source_playlist_id: String, criteria: FilterCriteria) -> Self {
        Self {
            source_playlist_id,
            criteria,
            name: None,
            visibility: Visibility::Private,
        }
    }

    pub fn derived_name(&self, source_name: &str) -> String {
        match &self.criteria {
            FilterCriteria::ReleaseDate(range) => format!("{} [{}]", source_name, range),
        }
    }

    pub fn playlist_draft(&self, source_name: &str) -> PlaylistDraft {
        PlaylistDraft {
            name: self
                .name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| self.derived_name(source_name)),
            description: format!("Tracks from {} {}", source_name, self.criteria),
            visibility: self.visibility,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchResult {
    pub playlist_id: String,
    pub playlist_name: String,
    pub tracks_written: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub fetch_status: FetchStatus,
    /// Source items the normalizer dropped.
    pub skipped: usize,
}

impl BranchResult {
    pub fn is_partial(&self) -> bool {
        self.batches_failed > 0 || self.fetch_status != FetchStatus::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    Created(BranchResult),
    /// Nothing matched, so nothing was created.
    NoMatchingTracks {
        source_name: String,
        scanned: usize,
        fetch_status: FetchStatus,
    },
}
