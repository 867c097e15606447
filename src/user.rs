use std::path::{Path, PathBuf};
use std::{env, fmt, fs};

use colored::Colorize;
use error_stack::{IntoReport, Report, ResultExt};
use serde::{Deserialize, Serialize};

use crate::branch::SessionInvalidator;
use crate::config::AppConfig;
use crate::sync::fetcher::FetchPolicy;
use crate::Suggestion;

#[derive(Debug, Clone)]
pub struct UserError;
impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("User config error")
    }
}
impl std::error::Error for UserError {}

pub type UserResult<T> = error_stack::Result<T, UserError>;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct User {
    #[serde(default)]
    pub spotify_access_token: String,
    #[serde(default)]
    pub spotify_refresh_token: String,
    #[serde(default)]
    pub fetch: FetchPolicy,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl User {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the config file when present and applies the environment override.
    pub fn load() -> UserResult<Self> {
        let mut user = User::new();
        if Self::config_file_exists()? {
            user.read_config_file()?;
        }
        dotenvy::dotenv().ok();
        user.override_access_token(env::var(AppConfig::ACCESS_TOKEN_ENV).ok());
        Ok(user)
    }

    pub fn override_access_token(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|token| !token.trim().is_empty()) {
            log::debug!("Using the access token from {}", AppConfig::ACCESS_TOKEN_ENV);
            self.spotify_access_token = token;
        }
    }

    pub fn access_token(&self) -> UserResult<String> {
        if self.spotify_access_token.is_empty() {
            return Err(Report::new(UserError)
                .attach_printable("No Spotify access token stored")
                .attach(Suggestion(format!(
                    "Run `playlist-branch login` or set {}",
                    AppConfig::ACCESS_TOKEN_ENV
                ))));
        }
        Ok(self.spotify_access_token.clone())
    }

    /// Copy safe to print, tokens reduced to their last four characters.
    pub fn masked(&self) -> Self {
        fn mask(token: &str) -> String {
            let visible = token.chars().rev().take(4).collect::<Vec<_>>();
            if token.is_empty() {
                String::new()
            } else {
                format!("****{}", visible.into_iter().rev().collect::<String>())
            }
        }
        Self {
            spotify_access_token: mask(&self.spotify_access_token),
            spotify_refresh_token: mask(&self.spotify_refresh_token),
            fetch: self.fetch.clone(),
        }
    }

    pub fn read_config_file(&mut self) -> UserResult<()> {
        let config_path =
            Self::get_config_file_path().attach_printable("Failed to get the config file path")?;
        let config = Self::read_from(&config_path)?;
        self.clone_from(&config);
        Ok(())
    }

    pub fn read_from(config_path: &Path) -> UserResult<Self> {
        if !config_path.exists() {
            return Err(Report::new(UserError)
                .attach_printable(format!(
                    "Config file not found at: {}",
                    config_path.display()
                ))
                .attach(Suggestion("Run `playlist-branch login` first".to_string())));
        }
        let config_content = fs::read_to_string(config_path)
            .into_report()
            .attach_printable(format!(
                "Failed to read config file at {}",
                config_path.display()
            ))
            .change_context(UserError)?;
        serde_json::from_str(&config_content)
            .into_report()
            .attach_printable("Failed to parse the config file. Ensure it is valid JSON.")
            .change_context(UserError)
    }

    pub fn save_config_file(&self) -> UserResult<()> {
        let config_path =
            Self::get_config_file_path().attach_printable("Failed to get the config file path")?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> UserResult<()> {
        let serialized = serde_json::to_string_pretty(self)
            .into_report()
            .attach_printable("Failed to serialize the user configuration to JSON")
            .change_context(UserError)?;
        if let Some(folder_path) = config_path.parent() {
            fs::create_dir_all(folder_path)
                .into_report()
                .attach_printable(format!(
                    "Failed to create directory at {}",
                    folder_path.display()
                ))
                .change_context(UserError)?;
        }
        fs::write(config_path, serialized)
            .into_report()
            .attach_printable(format!(
                "Failed to write config file at {}",
                config_path.display()
            ))
            .change_context(UserError)?;
        Ok(())
    }

    pub fn get_config_file_path() -> UserResult<PathBuf> {
        dirs::home_dir()
            .ok_or(UserError)
            .into_report()
            .attach_printable("Failed to retrieve the home directory")
            .map(|home_path| home_path.join(AppConfig::CONFIG_FOLDER).join("config.json"))
    }

    pub fn config_file_exists() -> UserResult<bool> {
        let config_path =
            Self::get_config_file_path().attach_printable("Failed to get the config file path")?;
        Ok(config_path.exists())
    }

    pub fn clear_spotify_token(&mut self) -> UserResult<()> {
        self.spotify_access_token.clear();
        self.save_config_file()
    }

    pub async fn refresh_spotify_token(&mut self) -> UserResult<()> {
        if self.spotify_refresh_token.is_empty() {
            return Err(Report::new(UserError)
                .attach_printable("No refresh token available")
                .attach(Suggestion("Run `playlist-branch login` again".to_string())));
        }

        let params = [
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", self.spotify_refresh_token.clone()),
            ("client_id", AppConfig::SPOTIFY_CLIENT_ID.to_string()),
        ];
        let response = reqwest::Client::new()
            .post(AppConfig::SPOTIFY_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .into_report()
            .change_context(UserError)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Report::new(UserError).attach_printable(format!(
                "Failed to refresh Spotify token ({}): {}",
                status, body
            )));
        }
        let token_response: TokenResponse = response
            .json()
            .await
            .into_report()
            .change_context(UserError)?;

        self.spotify_access_token = token_response.access_token;
        if let Some(new_refresh_token) = token_response.refresh_token {
            self.spotify_refresh_token = new_refresh_token;
        }
        self.save_config_file()?;
        println!("{}", "Spotify token refreshed successfully.".green());
        Ok(())
    }
}

/// Drops the stored access token so the next run asks for a new one.
impl SessionInvalidator for User {
    fn invalidate(&self) {
        let mut user = match User::get_config_file_path().and_then(|path| {
            if path.exists() {
                User::read_from(&path)
            } else {
                Ok(User::new())
            }
        }) {
            Ok(user) => user,
            Err(report) => {
                log::warn!("Could not read the config to clear the token: {:?}", report);
                return;
            }
        };
        if let Err(report) = user.clear_spotify_token() {
            log::warn!("Could not clear the stored access token: {:?}", report);
        }
    }
}
