use clap::Args;
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use error_stack::{IntoReport, Report, ResultExt};
use indicatif::{ProgressBar, ProgressStyle};
use inflector::Inflector;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::branch::orchestrator::BranchOrchestrator;
use crate::branch::{BranchOutcome, BranchRequest, BranchResult, SessionInvalidator};
use crate::config::AppConfig;
use crate::dialoguer::Dialoguer;
use crate::filter::{DateRange, FilterCriteria};
use crate::spotify::api::{CatalogClient, CatalogError, SpotifyApi};
use crate::spotify::playlist::{list_owned_playlists, parse_playlist_id, Visibility};
use crate::spotify::track::normalize_page;
use crate::spotify::{SpotifyError, SpotifyResult};
use crate::sync::fetcher::{AbandonReason, FetchStatus};
use crate::user::User;
use crate::Suggestion;

#[derive(Args, Debug, Clone, PartialEq)]
pub struct TracksCli {
    /// Playlist id or open.spotify.com url
    pub playlist: String,
    #[clap(long, default_value_t = 0)]
    pub offset: usize,
    #[clap(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct BranchCli {
    /// Playlist id or open.spotify.com url
    pub playlist: String,
    /// Earliest release date kept (YYYY, YYYY-MM or YYYY-MM-DD)
    #[clap(long)]
    pub from: String,
    /// Latest release date kept (YYYY, YYYY-MM or YYYY-MM-DD)
    #[clap(long)]
    pub to: String,
    /// Name of the new playlist, derived from the source when missing
    #[clap(long)]
    pub name: Option<String>,
    /// Create the playlist as public
    #[clap(long, action)]
    pub public: bool,
}

impl BranchCli {
    pub fn to_request(&self) -> SpotifyResult<BranchRequest> {
        let playlist_id = parse_playlist_id(&self.playlist)?;
        let range = DateRange::parse(&self.from, &self.to).change_context(SpotifyError)?;
        let mut request = BranchRequest::new(playlist_id, FilterCriteria::ReleaseDate(range));
        request.name = self.name.clone();
        if self.public {
            request.visibility = Visibility::Public;
        }
        Ok(request)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, strum_macros::Display, strum_macros::EnumIter)]
pub enum SpotifyCommands {
    ListPlaylists,
    ViewTracks,
    BranchPlaylist,
}

impl SpotifyCommands {
    pub async fn execute() -> SpotifyResult<()> {
        let options = Self::get_options();
        let selection =
            Dialoguer::select("Select".to_string(), options, None).change_context(SpotifyError)?;
        match Self::get_selection(selection) {
            SpotifyCommands::ListPlaylists => Self::list_playlists().await,
            SpotifyCommands::ViewTracks => {
                let cli = Self::prompt_tracks()?;
                Self::view_tracks(&cli).await
            }
            SpotifyCommands::BranchPlaylist => {
                let cli = Self::prompt_branch().await?;
                Self::branch(&cli).await
            }
        }
    }

    fn get_options() -> Vec<String> {
        Self::iter()
            .map(|element| element.to_string().to_sentence_case())
            .collect::<Vec<_>>()
    }

    fn get_selection(selection: usize) -> Self {
        let options = Self::iter().collect::<Vec<_>>();
        options[selection].clone()
    }

    fn prompt_tracks() -> SpotifyResult<TracksCli> {
        let playlist = Dialoguer::input("Spotify playlist url or id: ".to_string())
            .change_context(SpotifyError)?;
        let offset = Dialoguer::input_with_default("Offset: ".to_string(), "0".to_string())
            .change_context(SpotifyError)?
            .parse::<usize>()
            .into_report()
            .change_context(SpotifyError)?;
        Ok(TracksCli {
            playlist,
            offset,
            limit: 20,
        })
    }

    async fn prompt_branch() -> SpotifyResult<BranchCli> {
        let (user, api) = Self::connect()?;
        let me = api
            .current_user()
            .await
            .map_err(|report| Self::on_catalog_error(report, &user))?;
        let playlists = list_owned_playlists(&api, &me.id)
            .await
            .map_err(|report| Self::on_catalog_error(report, &user))?;
        if playlists.is_empty() {
            return Err(Report::new(SpotifyError).attach_printable("You don't own any playlist"));
        }
        let names = playlists
            .iter()
            .map(|playlist| format!("{} ({} tracks)", playlist.name, playlist.total_tracks))
            .collect::<Vec<_>>();
        let selection = Dialoguer::select("Source playlist".to_string(), names, None)
            .change_context(SpotifyError)?;
        let from = Dialoguer::input("Released from (YYYY, YYYY-MM or YYYY-MM-DD): ".to_string())
            .change_context(SpotifyError)?;
        let to = Dialoguer::input("Released to (YYYY, YYYY-MM or YYYY-MM-DD): ".to_string())
            .change_context(SpotifyError)?;
        let name = Dialoguer::input_with_default(
            "Playlist name (empty for the default): ".to_string(),
            String::new(),
        )
        .change_context(SpotifyError)?;
        let visibility = Dialoguer::select(
            "Visibility".to_string(),
            vec!["private", "public"],
            Some(0),
        )
        .change_context(SpotifyError)?;
        Ok(BranchCli {
            playlist: playlists[selection].id.clone(),
            from,
            to,
            name: Some(name).filter(|name| !name.trim().is_empty()),
            public: visibility == 1,
        })
    }

    pub async fn list_playlists() -> SpotifyResult<()> {
        let (user, api) = Self::connect()?;
        let me = api
            .current_user()
            .await
            .map_err(|report| Self::on_catalog_error(report, &user))?;
        let playlists = list_owned_playlists(&api, &me.id)
            .await
            .map_err(|report| Self::on_catalog_error(report, &user))?;
        if playlists.is_empty() {
            println!("{}", "You don't own any playlist".yellow());
            return Ok(());
        }
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Name", "Tracks", "Public", "Id"]);
        for playlist in playlists.iter() {
            let public = match playlist.public {
                Some(true) => "yes",
                Some(false) => "no",
                None => "-",
            };
            table.add_row(vec![
                Cell::new(&playlist.name),
                Cell::new(playlist.total_tracks),
                Cell::new(public),
                Cell::new(&playlist.id),
            ]);
        }
        println!("{table}");
        println!(
            "{} playlists owned by {}",
            playlists.len(),
            me.display_name.unwrap_or(me.id).cyan()
        );
        Ok(())
    }

    pub async fn view_tracks(cli: &TracksCli) -> SpotifyResult<()> {
        let playlist_id = parse_playlist_id(&cli.playlist)?;
        let (user, api) = Self::connect()?;
        let limit = cli.limit.clamp(1, AppConfig::SPOTIFY_PAGE_SIZE);
        let page = api
            .list_playlist_tracks(&playlist_id, cli.offset, limit)
            .await
            .map_err(|report| Self::on_catalog_error(report, &user))?;
        let normalized = normalize_page(&page.items);
        if normalized.tracks.is_empty() {
            println!(
                "{}",
                format!("No tracks at offset {} (playlist has {})", cli.offset, page.total)
                    .yellow()
            );
            return Ok(());
        }
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["#", "Title", "Artists", "Album", "Duration", "Released"]);
        for (index, track) in normalized.tracks.iter().enumerate() {
            let released = track
                .release_date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                Cell::new(page.offset + index + 1),
                Cell::new(&track.title),
                Cell::new(track.artists_string()),
                Cell::new(&track.album),
                Cell::new(track.duration_string()),
                Cell::new(released),
            ]);
        }
        println!("{table}");
        println!(
            "Showing {}-{} of {} tracks",
            page.offset + 1,
            (page.offset + page.items.len()).min(page.total),
            page.total
        );
        if normalized.skipped > 0 {
            println!(
                "{}",
                format!(
                    "{} items hidden (local files, episodes or unavailable tracks)",
                    normalized.skipped
                )
                .yellow()
            );
        }
        Ok(())
    }

    pub async fn branch(cli: &BranchCli) -> SpotifyResult<()> {
        let request = cli.to_request()?;
        let (user, api) = Self::connect()?;

        let progress_bar = ProgressBar::new(100);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.white/blue}] {pos}% {msg}")
                .into_report()
                .change_context(SpotifyError)?
                .progress_chars("█  "),
        );
        progress_bar.set_message(format!("Reading {}", request.source_playlist_id.clone().cyan()));

        let orchestrator =
            BranchOrchestrator::new(&api, user.fetch.clone(), &progress_bar, &user);
        let outcome = orchestrator.branch_playlist(&request).await;
        progress_bar.finish_and_clear();

        let outcome = outcome.change_context(SpotifyError).map_err(|report| {
            if CatalogError::is_auth_expired(&report) {
                report.attach(Suggestion(
                    "Run `playlist-branch refresh` or `playlist-branch login`".to_string(),
                ))
            } else {
                report
            }
        })?;
        match outcome {
            BranchOutcome::Created(result) => Self::print_branch_result(&result),
            BranchOutcome::NoMatchingTracks {
                source_name,
                scanned,
                fetch_status,
            } => {
                println!(
                    "{}",
                    format!(
                        "No track of {} ({} scanned) was {}, no playlist was created",
                        source_name, scanned, request.criteria
                    )
                    .yellow()
                );
                Self::print_fetch_status(&fetch_status);
            }
        }
        Ok(())
    }

    fn print_branch_result(result: &BranchResult) {
        println!(
            "Playlist {} created with {} tracks: {}",
            result.playlist_name.green(),
            result.tracks_written.to_string().cyan(),
            format!("https://open.spotify.com/playlist/{}", result.playlist_id).blue()
        );
        if result.batches_failed > 0 {
            println!(
                "{}",
                format!(
                    "{} of {} batches could not be written, the playlist is incomplete",
                    result.batches_failed, result.batches_total
                )
                .red()
            );
        }
        Self::print_fetch_status(&result.fetch_status);
        if result.skipped > 0 {
            println!(
                "{} source items skipped (local files, episodes or unavailable tracks)",
                result.skipped
            );
        }
    }

    fn print_fetch_status(status: &FetchStatus) {
        let FetchStatus::Incomplete { offset, reason } = status else {
            return;
        };
        let cause = match reason {
            AbandonReason::RateLimited { attempts } => {
                format!("still rate limited after {} attempts", attempts)
            }
            AbandonReason::Failed(error) => error.to_string(),
        };
        println!(
            "{}",
            format!(
                "The source was only read up to track {} ({}), later tracks were not considered",
                offset, cause
            )
            .yellow()
        );
    }

    fn connect() -> SpotifyResult<(User, SpotifyApi)> {
        let user = User::load().change_context(SpotifyError)?;
        let token = user.access_token().change_context(SpotifyError)?;
        let api = SpotifyApi::new(token)?;
        Ok((user, api))
    }

    fn on_catalog_error(report: Report<CatalogError>, user: &User) -> Report<SpotifyError> {
        let expired = CatalogError::is_auth_expired(&report);
        let report = report.change_context(SpotifyError);
        if expired {
            user.invalidate();
            return report.attach(Suggestion(
                "Run `playlist-branch refresh` or `playlist-branch login`".to_string(),
            ));
        }
        report
    }
}
