use std::time::Duration;

use async_trait::async_trait;
use error_stack::{IntoReport, Report, ResultExt};
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::AppConfig;
use crate::spotify::playlist::{
    ApiPlaylist, ApiPlaylistsPage, ApiTracksPage, Page, PlaylistDraft, PlaylistSummary,
    PlaylistsPage,
};
use crate::spotify::{SpotifyError, SpotifyResult};

/// Failure classes of a single catalog round trip. The fetcher and the
/// orchestrator branch on these, so every HTTP outcome maps to exactly one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Spotify rate limit reached (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Spotify could not be reached")]
    TransientNetwork,
    #[error("Spotify access token expired or was revoked")]
    AuthExpired,
    #[error("Spotify resource not found")]
    NotFound,
    #[error("Spotify rejected the request with status {status}")]
    Rejected { status: u16 },
    #[error("Spotify response could not be decoded")]
    Decode,
    #[error("Batch of {len} uris exceeds the add tracks limit")]
    BatchTooLarge { len: usize },
}

pub type CatalogResult<T> = error_stack::Result<T, CatalogError>;

impl CatalogError {
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => CatalogError::AuthExpired,
            StatusCode::NOT_FOUND => CatalogError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => CatalogError::RateLimited { retry_after },
            StatusCode::REQUEST_TIMEOUT => CatalogError::TransientNetwork,
            status if status.is_server_error() => CatalogError::TransientNetwork,
            status => CatalogError::Rejected {
                status: status.as_u16(),
            },
        }
    }

    /// Finds the catalog failure behind a report, whatever context was added on top.
    pub fn of<C>(report: &Report<C>) -> Option<&CatalogError> {
        report.downcast_ref::<CatalogError>()
    }

    pub fn is_auth_expired<C>(report: &Report<C>) -> bool {
        matches!(Self::of(report), Some(CatalogError::AuthExpired))
    }
}

/// Spotify sends `Retry-After` as whole seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
struct CreatedPlaylist {
    id: String,
}

/// The remote catalog as the pipeline sees it. Every method is one round trip.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn current_user(&self) -> CatalogResult<CurrentUser>;

    async fn get_playlist(&self, playlist_id: &str) -> CatalogResult<PlaylistSummary>;

    async fn list_my_playlists(&self, offset: usize, limit: usize) -> CatalogResult<PlaylistsPage>;

    async fn list_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> CatalogResult<Page>;

    /// Returns the id of the new playlist.
    async fn create_playlist(&self, owner_id: &str, draft: &PlaylistDraft) -> CatalogResult<String>;

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> CatalogResult<()>;
}

pub enum SpotifyEndpoint<'a> {
    Me,
    MyPlaylists { offset: usize, limit: usize },
    Playlist { playlist_id: &'a str },
    PlaylistTracks { playlist_id: &'a str, offset: usize, limit: usize },
    AddPlaylistTracks { playlist_id: &'a str },
    CreatePlaylist { owner_id: &'a str },
}

impl<'a> SpotifyEndpoint<'a> {
    pub fn url(&self, base_url: &Url) -> Url {
        let mut url = base_url.clone();
        let segments: Vec<&str> = match self {
            SpotifyEndpoint::Me => vec!["me"],
            SpotifyEndpoint::MyPlaylists { .. } => vec!["me", "playlists"],
            SpotifyEndpoint::Playlist { playlist_id } => vec!["playlists", *playlist_id],
            SpotifyEndpoint::PlaylistTracks { playlist_id, .. }
            | SpotifyEndpoint::AddPlaylistTracks { playlist_id } => {
                vec!["playlists", *playlist_id, "tracks"]
            }
            SpotifyEndpoint::CreatePlaylist { owner_id } => vec!["users", *owner_id, "playlists"],
        };
        // http(s) base urls always accept path segments
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        match self {
            SpotifyEndpoint::MyPlaylists { offset, limit } => {
                url.query_pairs_mut()
                    .append_pair("offset", &offset.to_string())
                    .append_pair("limit", &limit.to_string());
            }
            SpotifyEndpoint::Playlist { .. } => {
                url.query_pairs_mut()
                    .append_pair("fields", "id,name,public,owner.id,tracks.total");
            }
            SpotifyEndpoint::PlaylistTracks { offset, limit, .. } => {
                url.query_pairs_mut()
                    .append_pair("offset", &offset.to_string())
                    .append_pair("limit", &limit.to_string());
            }
            _ => {}
        }
        url
    }
}

/// reqwest implementation of [`CatalogClient`] holding the bearer credential.
pub struct SpotifyApi {
    client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl SpotifyApi {
    pub fn new(access_token: String) -> SpotifyResult<Self> {
        Self::with_base_url(access_token, AppConfig::SPOTIFY_API_BASE_URL)
    }

    pub fn with_base_url(access_token: String, base_url: &str) -> SpotifyResult<Self> {
        let base_url = Url::parse(base_url)
            .into_report()
            .change_context(SpotifyError)
            .attach_printable_lazy(|| format!("Invalid Spotify base url: {}", base_url))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(AppConfig::HTTP_TIMEOUT_SECS))
            .build()
            .into_report()
            .change_context(SpotifyError)?;
        Ok(Self {
            client,
            base_url,
            access_token,
        })
    }

    async fn send(&self, request: RequestBuilder) -> CatalogResult<Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .into_report()
            .change_context(CatalogError::TransientNetwork)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        log::debug!("Spotify answered {} for {}: {}", status, url, body);
        Err(Report::new(CatalogError::from_status(status, retry_after))
            .attach_printable(format!("{} {}", status, url)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> CatalogResult<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .into_report()
            .change_context(CatalogError::Decode)
    }

    fn get(&self, endpoint: SpotifyEndpoint) -> RequestBuilder {
        self.client.get(endpoint.url(&self.base_url))
    }

    fn post(&self, endpoint: SpotifyEndpoint) -> RequestBuilder {
        self.client.post(endpoint.url(&self.base_url))
    }
}

#[async_trait]
impl CatalogClient for SpotifyApi {
    async fn current_user(&self) -> CatalogResult<CurrentUser> {
        self.send_json(self.get(SpotifyEndpoint::Me)).await
    }

    async fn get_playlist(&self, playlist_id: &str) -> CatalogResult<PlaylistSummary> {
        let playlist: ApiPlaylist = self
            .send_json(self.get(SpotifyEndpoint::Playlist { playlist_id }))
            .await?;
        Ok(playlist.into())
    }

    async fn list_my_playlists(&self, offset: usize, limit: usize) -> CatalogResult<PlaylistsPage> {
        let page: ApiPlaylistsPage = self
            .send_json(self.get(SpotifyEndpoint::MyPlaylists { offset, limit }))
            .await?;
        Ok(page.into())
    }

    async fn list_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> CatalogResult<Page> {
        let page: ApiTracksPage = self
            .send_json(self.get(SpotifyEndpoint::PlaylistTracks {
                playlist_id,
                offset,
                limit,
            }))
            .await?;
        Ok(Page {
            offset,
            limit,
            total: page.total,
            items: page.items,
        })
    }

    async fn create_playlist(&self, owner_id: &str, draft: &PlaylistDraft) -> CatalogResult<String> {
        let body = json!({
            "name": draft.name,
            "description": draft.description,
            "public": draft.visibility.is_public(),
        });
        let created: CreatedPlaylist = self
            .send_json(self.post(SpotifyEndpoint::CreatePlaylist { owner_id }).json(&body))
            .await?;
        Ok(created.id)
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> CatalogResult<()> {
        if uris.len() > AppConfig::SPOTIFY_WRITE_BATCH_SIZE {
            return Err(Report::new(CatalogError::BatchTooLarge { len: uris.len() }));
        }
        let body = json!({ "uris": uris });
        self.send(
            self.post(SpotifyEndpoint::AddPlaylistTracks { playlist_id })
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
