use error_stack::{IntoReport, Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::AppConfig;
use crate::spotify::api::{CatalogClient, CatalogResult};
use crate::spotify::{SpotifyError, SpotifyResult};

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct ApiOwner {
    pub id: String,
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct ApiTracksRef {
    pub total: usize,
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct ApiPlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub public: Option<bool>,
    pub owner: ApiOwner,
    pub tracks: ApiTracksRef,
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct ApiPlaylistsPage {
    pub items: Vec<Option<ApiPlaylist>>,
    pub total: usize,
    pub next: Option<String>,
}

/// Raw playlist tracks page as Spotify returns it. Items are kept as JSON so a
/// single malformed entry never fails the page; the normalizer decides what
/// survives.
#[derive(Deserialize, Clone, Debug)]
pub(crate) struct ApiTracksPage {
    pub items: Vec<Value>,
    pub total: usize,
}

/// Enough about a playlist to branch it and to list it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub total_tracks: usize,
    pub public: Option<bool>,
}

impl From<ApiPlaylist> for PlaylistSummary {
    fn from(playlist: ApiPlaylist) -> Self {
        Self {
            id: playlist.id,
            name: playlist.name,
            owner_id: playlist.owner.id,
            total_tracks: playlist.tracks.total,
            public: playlist.public,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlaylistsPage {
    pub playlists: Vec<PlaylistSummary>,
    pub total: usize,
    pub has_next: bool,
}

impl From<ApiPlaylistsPage> for PlaylistsPage {
    fn from(page: ApiPlaylistsPage) -> Self {
        Self {
            playlists: page.items.into_iter().flatten().map(Into::into).collect(),
            total: page.total,
            has_next: page.next.is_some(),
        }
    }
}

/// One batch of raw playlist items fetched at `offset`.
#[derive(Clone, Debug)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
    /// Playlist size the provider declared when serving this page.
    pub total: usize,
    pub items: Vec<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// Everything needed to create a playlist, minus the owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistDraft {
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
}

/// Accepts either a bare playlist id or an `open.spotify.com/playlist/<id>` url.
pub fn parse_playlist_id(input: &str) -> SpotifyResult<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Report::new(SpotifyError).attach_printable("Playlist id is empty"));
    }
    if let Some(id) = input.strip_prefix("spotify:playlist:") {
        return Ok(id.to_string());
    }
    if !input.contains('/') {
        return Ok(input.to_string());
    }
    let playlist_url = Url::parse(input)
        .into_report()
        .change_context(SpotifyError)
        .attach_printable_lazy(|| format!("Not a playlist id nor a valid url: {}", input))?;
    let mut sections = playlist_url
        .path_segments()
        .ok_or(SpotifyError)
        .into_report()?;
    if sections.next() != Some("playlist") {
        return Err(Report::new(SpotifyError).attach_printable("Url is not a playlist url"));
    }
    match sections.next() {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(Report::new(SpotifyError).attach_printable("Playlist url has no id")),
    }
}

/// Lists every playlist the user follows, keeps the ones they own and sorts
/// them by declared size, biggest first.
pub async fn list_owned_playlists<C>(client: &C, user_id: &str) -> CatalogResult<Vec<PlaylistSummary>>
where
    C: CatalogClient + ?Sized,
{
    let limit = AppConfig::SPOTIFY_PLAYLISTS_PAGE_SIZE;
    let mut offset = 0;
    let mut owned = vec![];
    loop {
        let page = client.list_my_playlists(offset, limit).await?;
        let fetched = page.playlists.len();
        owned.extend(
            page.playlists
                .into_iter()
                .filter(|playlist| playlist.owner_id == user_id),
        );
        offset += limit;
        if !page.has_next || fetched == 0 || offset >= page.total {
            break;
        }
    }
    owned.sort_by(|a, b| b.total_tracks.cmp(&a.total_tracks));
    Ok(owned)
}
