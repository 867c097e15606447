/// `AppConfig` holds static configuration values for the application,
/// such as the Spotify endpoints and the provider limits the pipeline obeys.
pub struct AppConfig;

impl AppConfig {
    /// The public client ID for the Spotify API, used to refresh access tokens.
    pub const SPOTIFY_CLIENT_ID: &'static str = "a57ab1ceee1f4094b55924d3e228ae53";
    pub const SPOTIFY_API_BASE_URL: &'static str = "https://api.spotify.com/v1";
    pub const SPOTIFY_TOKEN_URL: &'static str = "https://accounts.spotify.com/api/token";
    /// Maximum number of items Spotify returns for one playlist tracks page.
    pub const SPOTIFY_PAGE_SIZE: usize = 100;
    /// Maximum number of URIs accepted by one add-tracks call.
    pub const SPOTIFY_WRITE_BATCH_SIZE: usize = 100;
    /// Page size used when listing the user's playlists.
    pub const SPOTIFY_PLAYLISTS_PAGE_SIZE: usize = 50;
    pub const HTTP_TIMEOUT_SECS: u64 = 30;
    pub const ACCESS_TOKEN_ENV: &'static str = "SPOTIFY_ACCESS_TOKEN";
    pub const CONFIG_FOLDER: &'static str = ".playlist_branch";
}
