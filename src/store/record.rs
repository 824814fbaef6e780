//! Typed record model for the games table.
//!
//! Each external catalog gets its own nested block on the record instead of a
//! stringly-keyed field map. The store maps these blocks to/from the
//! source-prefixed column set.

use serde::{Deserialize, Serialize};

/// External catalog whose fields live in their own column namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Rawg,
    Igdb,
}

impl Source {
    /// Column-name prefix, e.g. `rawg` for `rawg__rating`.
    pub fn prefix(&self) -> &'static str {
        match self {
            Source::Rawg => "rawg",
            Source::Igdb => "igdb",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Rawg => "RAWG",
            Source::Igdb => "IGDB",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.to_ascii_lowercase().as_str() {
            "rawg" => Some(Source::Rawg),
            "igdb" => Some(Source::Igdb),
            _ => None,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Common id/name/slug triple used by both catalogs for genres, tags,
/// developers and similar lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdName {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawgTrailer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawgAchievement {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// RAWG reports unlock percentage as a string, e.g. "42.50".
    #[serde(default)]
    pub percent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawgStoreLink {
    #[serde(default)]
    pub store_id: Option<i64>,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// RAWG enrichment field set. Written wholesale on every sync; list values
/// land as JSON text columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawgFields {
    pub id: Option<i64>,
    pub slug: Option<String>,
    pub name: Option<String>,
    pub released: Option<String>,
    pub tba: Option<bool>,
    pub rating: Option<f64>,
    pub rating_top: Option<i64>,
    pub ratings_count: Option<i64>,
    pub metacritic: Option<i64>,
    pub metacritic_url: Option<String>,
    pub description_raw: Option<String>,
    pub website: Option<String>,
    pub playtime: Option<i64>,
    pub background_image: Option<String>,
    pub background_image_additional: Option<String>,
    pub genres: Vec<IdName>,
    pub tags: Vec<IdName>,
    pub platforms: Vec<String>,
    pub parent_platforms: Vec<String>,
    pub esrb_rating: Option<String>,
    pub screenshots: Vec<String>,
    pub trailers: Vec<RawgTrailer>,
    pub achievements: Vec<RawgAchievement>,
    pub stores: Vec<RawgStoreLink>,
    pub developers: Vec<IdName>,
    pub publishers: Vec<IdName>,
    pub reddit_url: Option<String>,
    pub reddit_name: Option<String>,
    pub reddit_count: Option<i64>,
    pub twitch_count: Option<i64>,
    pub youtube_count: Option<i64>,
    /// Best-effort ranges inferred from tag text; unset when no tag matched.
    pub local_players_min: Option<i64>,
    pub local_players_max: Option<i64>,
    pub online_players_min: Option<i64>,
    pub online_players_max: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgdbVideo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgdbWebsite {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgdbInvolvedCompany {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub developer: bool,
    #[serde(default)]
    pub publisher: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgdbMultiplayerMode {
    #[serde(default)]
    pub campaigncoop: Option<bool>,
    #[serde(default)]
    pub lancoop: Option<bool>,
    #[serde(default)]
    pub splitscreen: Option<bool>,
    #[serde(default)]
    pub offlinemax: Option<i64>,
    #[serde(default)]
    pub offlinecoopmax: Option<i64>,
    #[serde(default)]
    pub onlinemax: Option<i64>,
    #[serde(default)]
    pub onlinecoopmax: Option<i64>,
}

/// IGDB enrichment field set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgdbFields {
    pub id: Option<i64>,
    pub slug: Option<String>,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub storyline: Option<String>,
    pub url: Option<String>,
    /// Unix timestamp, as IGDB reports it.
    pub first_release_date: Option<i64>,
    pub category: Option<i64>,
    pub status: Option<i64>,
    pub rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub total_rating: Option<f64>,
    pub total_rating_count: Option<i64>,
    pub aggregated_rating: Option<f64>,
    pub aggregated_rating_count: Option<i64>,
    pub hypes: Option<i64>,
    pub follows: Option<i64>,
    pub cover: Option<String>,
    pub artworks: Vec<String>,
    pub screenshots: Vec<String>,
    pub videos: Vec<IgdbVideo>,
    pub genres: Vec<String>,
    pub themes: Vec<String>,
    pub game_modes: Vec<String>,
    pub player_perspectives: Vec<String>,
    pub platforms: Vec<String>,
    pub keywords: Vec<String>,
    pub alternative_names: Vec<String>,
    pub multiplayer_modes: Vec<IgdbMultiplayerMode>,
    pub involved_companies: Vec<IgdbInvolvedCompany>,
    pub developers: Vec<String>,
    pub publishers: Vec<String>,
    pub websites: Vec<IgdbWebsite>,
}

/// One source's enrichment payload, ready for a wholesale column write.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment {
    Rawg(RawgFields),
    Igdb(IgdbFields),
}

impl Enrichment {
    pub fn source(&self) -> Source {
        match self {
            Enrichment::Rawg(_) => Source::Rawg,
            Enrichment::Igdb(_) => Source::Igdb,
        }
    }
}

/// Per-source block as read back from the table: the field set plus the
/// source-scoped sync marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceBlock<T> {
    pub synced: bool,
    pub synced_at: Option<String>,
    #[serde(flatten)]
    pub fields: T,
}

/// One row of the games table, enrichment blocks deserialized.
#[derive(Debug, Clone, Serialize)]
pub struct GameRecord {
    pub id: i64,
    pub title: String,
    pub source_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub rawg: SourceBlock<RawgFields>,
    pub igdb: SourceBlock<IgdbFields>,
}

/// Identity-only projection used when iterating sync candidates.
#[derive(Debug, Clone, Serialize)]
pub struct GameStub {
    pub id: i64,
    pub title: String,
    pub source_id: Option<String>,
}
