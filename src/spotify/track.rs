use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

/// An album release date as Spotify reports it: `1999`, `1999-06` or `1999-06-14`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReleaseDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl ReleaseDate {
    /// Returns `None` for malformed input and for Spotify's `0000` placeholder.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let year_part = parts.next()?;
        if year_part.len() != 4 {
            return None;
        }
        let year = year_part.parse::<i32>().ok().filter(|year| *year > 0)?;
        let month = match parts.next() {
            Some(month) => Some(month.parse::<u32>().ok()?),
            None => None,
        };
        let day = match parts.next() {
            Some(day) => Some(day.parse::<u32>().ok()?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }
        let date = Self { year, month, day };
        // rejects 1999-13 and 1999-02-30
        date.first_day()?;
        Some(date)
    }

    pub fn precision(&self) -> DatePrecision {
        match (self.month, self.day) {
            (Some(_), Some(_)) => DatePrecision::Day,
            (Some(_), None) => DatePrecision::Month,
            _ => DatePrecision::Year,
        }
    }

    /// First calendar day of the covered period. This is the date the filter
    /// compares, so `1999` sorts as 1999-01-01 and `1999-06` as 1999-06-01.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }

    /// Last calendar day of the covered period.
    pub fn last_day(&self) -> Option<NaiveDate> {
        match self.precision() {
            DatePrecision::Day => self.first_day(),
            DatePrecision::Month => {
                let first = self.first_day()?;
                let next_month = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
                };
                next_month.pred_opt()
            }
            DatePrecision::Year => NaiveDate::from_ymd_opt(self.year, 12, 31),
        }
    }
}

impl fmt::Display for ReleaseDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        if let Some(month) = self.month {
            write!(f, "-{:02}", month)?;
        }
        if let Some(day) = self.day {
            write!(f, "-{:02}", day)?;
        }
        Ok(())
    }
}

/// Canonical track record. Built once by [`normalize_item`] and never mutated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub duration_ms: u64,
    pub artists: Vec<String>,
    pub album: String,
    pub release_date: Option<ReleaseDate>,
    pub uri: String,
}

impl Track {
    pub fn artists_string(&self) -> String {
        self.artists.join(", ")
    }

    pub fn duration_string(&self) -> String {
        let seconds = self.duration_ms / 1000;
        format!("{}:{:02}", seconds / 60, seconds % 60)
    }
}

#[derive(Deserialize, Debug)]
struct ApiArtist {
    name: String,
}

#[derive(Deserialize, Debug)]
struct ApiAlbum {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiTrack {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    album: Option<ApiAlbum>,
    uri: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PlaylistItem {
    track: Option<ApiTrack>,
}

/// Tracks that survived normalization plus how many items were dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedPage {
    pub tracks: Vec<Track>,
    pub skipped: usize,
}

/// Builds a [`Track`] from one raw playlist item. Episodes, removed tracks and
/// items without an id or uri yield `None`.
pub fn normalize_item(raw: &Value) -> Option<Track> {
    let item = PlaylistItem::deserialize(raw).ok()?;
    let track = item.track?;
    if track.kind.as_deref().is_some_and(|kind| kind != "track") {
        return None;
    }
    let id = track.id.filter(|id| !id.is_empty())?;
    let uri = track.uri.filter(|uri| !uri.is_empty())?;
    let (album, release_date) = match track.album {
        Some(album) => (
            album.name.unwrap_or_default(),
            album.release_date.as_deref().and_then(ReleaseDate::parse),
        ),
        None => (String::new(), None),
    };
    Some(Track {
        id,
        title: track.name.unwrap_or_default(),
        duration_ms: track.duration_ms,
        artists: track.artists.into_iter().map(|artist| artist.name).collect(),
        album,
        release_date,
        uri,
    })
}

pub fn normalize_page(items: &[Value]) -> NormalizedPage {
    let mut page = NormalizedPage::default();
    for raw in items {
        match normalize_item(raw) {
            Some(track) => page.tracks.push(track),
            None => {
                log::debug!("Skipping playlist item without a usable track: {}", raw);
                page.skipped += 1;
            }
        }
    }
    page
}
