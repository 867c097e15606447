use std::fmt;

use clap::{Parser, Subcommand};
use colored::Colorize;
use error_stack::fmt::{Charset, ColorMode};
use error_stack::{FutureExt, Report, ResultExt};
use tracing_subscriber::EnvFilter;

use crate::dialoguer::Dialoguer;
use crate::spotify::commands::{BranchCli, SpotifyCommands, TracksCli};
use crate::user::User;

mod branch;
mod config;
mod dialoguer;
mod filter;
mod spotify;
mod sync;
mod user;

#[derive(Debug)]
pub struct PlaylistBranchError;
impl fmt::Display for PlaylistBranchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Playlist branch error")
    }
}
impl std::error::Error for PlaylistBranchError {}

pub type PlaylistBranchResult<T> = error_stack::Result<T, PlaylistBranchError>;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Branch Spotify playlists by release date")]
struct Cli {
    /// Verbose logging
    #[clap(long, global = true, action)]
    debug: bool,
    #[command(subcommand)]
    command: Option<PlaylistBranchCommands>,
}

/// Without a command an interactive menu is shown
#[derive(Subcommand, Debug, PartialEq, Clone)]
enum PlaylistBranchCommands {
    /// Stores the Spotify access and refresh tokens
    Login,
    /// Exchanges the stored refresh token for a new access token
    Refresh,
    /// Reads the current config file
    Config,
    /// Lists the playlists you own, biggest first
    Playlists,
    /// Shows one page of a playlist's tracks
    Tracks(TracksCli),
    /// Creates a new playlist with the tracks released inside a date range
    Branch(BranchCli),
}

impl PlaylistBranchCommands {
    pub async fn execute(&self) -> PlaylistBranchResult<()> {
        match self {
            PlaylistBranchCommands::Login => {
                let mut user = if User::config_file_exists().change_context(PlaylistBranchError)? {
                    let mut user = User::new();
                    user.read_config_file()
                        .change_context(PlaylistBranchError)?;
                    user
                } else {
                    User::new()
                };
                user.spotify_access_token =
                    Dialoguer::password("Spotify access token: ".to_string(), false)
                        .change_context(PlaylistBranchError)?;
                user.spotify_refresh_token = Dialoguer::password(
                    "Spotify refresh token (optional): ".to_string(),
                    true,
                )
                .change_context(PlaylistBranchError)?;
                user.save_config_file()
                    .change_context(PlaylistBranchError)?;
                println!(
                    "Spotify credentials successfully stored:\n {:#?}",
                    user.masked()
                );
                Ok(())
            }
            PlaylistBranchCommands::Refresh => {
                let mut user = User::new();
                user.read_config_file()
                    .change_context(PlaylistBranchError)?;
                user.refresh_spotify_token()
                    .change_context(PlaylistBranchError)
                    .await
            }
            PlaylistBranchCommands::Config => {
                let user = User::load().change_context(PlaylistBranchError)?;
                let config_path = User::get_config_file_path().change_context(PlaylistBranchError)?;
                println!(
                    "Current config ({}):\n{:#?}",
                    config_path.display().to_string().cyan(),
                    user.masked()
                );
                Ok(())
            }
            PlaylistBranchCommands::Playlists => SpotifyCommands::list_playlists()
                .change_context(PlaylistBranchError)
                .await,
            PlaylistBranchCommands::Tracks(cli) => SpotifyCommands::view_tracks(cli)
                .change_context(PlaylistBranchError)
                .await,
            PlaylistBranchCommands::Branch(cli) => SpotifyCommands::branch(cli)
                .change_context(PlaylistBranchError)
                .await,
        }
    }
}

pub struct Suggestion(String);

impl Suggestion {
    pub fn set_report() {
        Report::set_charset(Charset::Utf8);
        Report::set_color_mode(ColorMode::Color);
        Report::install_debug_hook::<Self>(|Self(value), context| {
            context.push_body(format!("{}: {value}", "suggestion".yellow()))
        });
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("warn,playlist_branch=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,playlist_branch=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn run() -> PlaylistBranchResult<()> {
    let cli = Cli::parse();

    init_logging(cli.debug);
    Suggestion::set_report();

    match cli.command {
        Some(command) => command.execute().await,
        None => SpotifyCommands::execute()
            .change_context(PlaylistBranchError)
            .await,
    }
}

#[tokio::main]
async fn main() -> PlaylistBranchResult<()> {
    run().await
}
