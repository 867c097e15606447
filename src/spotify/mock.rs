//! Scripted in-memory catalog for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use error_stack::Report;
use serde_json::{json, Value};

use crate::spotify::api::{CatalogClient, CatalogError, CatalogResult, CurrentUser};
use crate::spotify::playlist::{Page, PlaylistDraft, PlaylistSummary, PlaylistsPage};

pub const SOURCE_PLAYLIST_ID: &str = "source";
pub const CREATED_PLAYLIST_ID: &str = "branch";

pub struct FakeCatalog {
    user_id: String,
    playlist: PlaylistSummary,
    items: Vec<Value>,
    listed: Vec<PlaylistSummary>,
    user_failure: Option<CatalogError>,
    create_failure: Option<CatalogError>,
    track_failures: Mutex<HashMap<usize, VecDeque<CatalogError>>>,
    add_failures: HashMap<usize, CatalogError>,
    requested_offsets: Mutex<Vec<usize>>,
    created: Mutex<Vec<(String, PlaylistDraft)>>,
    add_calls: Mutex<Vec<Vec<String>>>,
    written: Mutex<Vec<String>>,
}

impl FakeCatalog {
    /// A source playlist with `total` tracks, all released on 2000-01-01.
    pub fn new(user_id: &str, playlist_name: &str, total: usize) -> Self {
        let items = (0..total)
            .map(|index| Self::track_item(index, "2000-01-01"))
            .collect::<Vec<_>>();
        Self {
            user_id: user_id.to_string(),
            playlist: Self::summary(SOURCE_PLAYLIST_ID, playlist_name, user_id, total),
            items,
            listed: vec![],
            user_failure: None,
            create_failure: None,
            track_failures: Mutex::new(HashMap::new()),
            add_failures: HashMap::new(),
            requested_offsets: Mutex::new(vec![]),
            created: Mutex::new(vec![]),
            add_calls: Mutex::new(vec![]),
            written: Mutex::new(vec![]),
        }
    }

    pub fn summary(id: &str, name: &str, owner_id: &str, total_tracks: usize) -> PlaylistSummary {
        PlaylistSummary {
            id: id.to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            total_tracks,
            public: Some(false),
        }
    }

    pub fn track_item(index: usize, release_date: &str) -> Value {
        json!({
            "track": {
                "id": format!("t{}", index),
                "name": format!("Track {}", index),
                "duration_ms": 180000,
                "artists": [{ "name": "Artist" }],
                "album": { "name": "Album", "release_date": release_date },
                "available_markets": ["US"],
                "uri": format!("spotify:track:t{}", index),
                "type": "track"
            }
        })
    }

    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.playlist.total_tracks = items.len();
        self.items = items;
        self
    }

    pub fn with_listed_playlists(mut self, playlists: Vec<PlaylistSummary>) -> Self {
        self.listed = playlists;
        self
    }

    /// Answers the next requests at `offset` with `errors`, in order.
    pub fn fail_tracks_at(self, offset: usize, errors: Vec<CatalogError>) -> Self {
        self.track_failures
            .lock()
            .unwrap()
            .insert(offset, errors.into_iter().collect());
        self
    }

    /// Fails the add call with this zero-based index.
    pub fn fail_add_call(mut self, call_index: usize, error: CatalogError) -> Self {
        self.add_failures.insert(call_index, error);
        self
    }

    pub fn fail_create(mut self, error: CatalogError) -> Self {
        self.create_failure = Some(error);
        self
    }

    pub fn fail_current_user(mut self, error: CatalogError) -> Self {
        self.user_failure = Some(error);
        self
    }

    pub fn requested_offsets(&self) -> Vec<usize> {
        self.requested_offsets.lock().unwrap().clone()
    }

    pub fn created_playlists(&self) -> Vec<(String, PlaylistDraft)> {
        self.created.lock().unwrap().clone()
    }

    pub fn add_calls(&self) -> Vec<Vec<String>> {
        self.add_calls.lock().unwrap().clone()
    }

    pub fn written_uris(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn current_user(&self) -> CatalogResult<CurrentUser> {
        if let Some(error) = &self.user_failure {
            return Err(Report::new(error.clone()));
        }
        Ok(CurrentUser {
            id: self.user_id.clone(),
            display_name: None,
        })
    }

    async fn get_playlist(&self, playlist_id: &str) -> CatalogResult<PlaylistSummary> {
        if playlist_id != self.playlist.id {
            return Err(Report::new(CatalogError::NotFound));
        }
        Ok(self.playlist.clone())
    }

    async fn list_my_playlists(&self, offset: usize, limit: usize) -> CatalogResult<PlaylistsPage> {
        let end = (offset + limit).min(self.listed.len());
        let start = offset.min(end);
        Ok(PlaylistsPage {
            playlists: self.listed[start..end].to_vec(),
            total: self.listed.len(),
            has_next: end < self.listed.len(),
        })
    }

    async fn list_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> CatalogResult<Page> {
        self.requested_offsets.lock().unwrap().push(offset);
        if playlist_id != self.playlist.id {
            return Err(Report::new(CatalogError::NotFound));
        }
        let scripted = self
            .track_failures
            .lock()
            .unwrap()
            .get_mut(&offset)
            .and_then(|errors| errors.pop_front());
        if let Some(error) = scripted {
            return Err(Report::new(error));
        }
        let end = (offset + limit).min(self.items.len());
        let start = offset.min(end);
        Ok(Page {
            offset,
            limit,
            total: self.items.len(),
            items: self.items[start..end].to_vec(),
        })
    }

    async fn create_playlist(&self, owner_id: &str, draft: &PlaylistDraft) -> CatalogResult<String> {
        if let Some(error) = &self.create_failure {
            return Err(Report::new(error.clone()));
        }
        self.created
            .lock()
            .unwrap()
            .push((owner_id.to_string(), draft.clone()));
        Ok(CREATED_PLAYLIST_ID.to_string())
    }

    async fn add_tracks(&self, _playlist_id: &str, uris: &[String]) -> CatalogResult<()> {
        let call_index = {
            let mut calls = self.add_calls.lock().unwrap();
            calls.push(uris.to_vec());
            calls.len() - 1
        };
        if let Some(error) = self.add_failures.get(&call_index) {
            return Err(Report::new(error.clone()));
        }
        self.written.lock().unwrap().extend(uris.iter().cloned());
        Ok(())
    }
}
