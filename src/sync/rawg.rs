//! RAWG catalog client: key-authenticated REST fetch plus the pure mapping
//! from RAWG payload shapes into the store's RAWG block.

use crate::store::{
    Enrichment, IdName, RawgAchievement, RawgFields, RawgStoreLink, RawgTrailer, Source,
};
use crate::sync::{CatalogClient, SearchHit};
use crate::tasks::TaskLog;
use crate::util::env::{env_parse, env_req};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const RAWG_BASE_URL: &str = "https://api.rawg.io/api";

#[derive(Debug, Deserialize)]
struct RawgListResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawgSearchRow {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    released: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawgIdNameSlug {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawgPlatformEntry {
    #[serde(default)]
    platform: Option<RawgIdNameSlug>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawgEsrb {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawgGameDetail {
    id: i64,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    released: Option<String>,
    #[serde(default)]
    tba: Option<bool>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    rating_top: Option<i64>,
    #[serde(default)]
    ratings_count: Option<i64>,
    #[serde(default)]
    metacritic: Option<i64>,
    #[serde(default)]
    metacritic_url: Option<String>,
    #[serde(default)]
    description_raw: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    playtime: Option<i64>,
    #[serde(default)]
    background_image: Option<String>,
    #[serde(default)]
    background_image_additional: Option<String>,
    #[serde(default)]
    genres: Vec<RawgIdNameSlug>,
    #[serde(default)]
    tags: Vec<RawgIdNameSlug>,
    #[serde(default)]
    platforms: Vec<RawgPlatformEntry>,
    #[serde(default)]
    parent_platforms: Vec<RawgPlatformEntry>,
    #[serde(default)]
    esrb_rating: Option<RawgEsrb>,
    #[serde(default)]
    developers: Vec<RawgIdNameSlug>,
    #[serde(default)]
    publishers: Vec<RawgIdNameSlug>,
    #[serde(default)]
    reddit_url: Option<String>,
    #[serde(default)]
    reddit_name: Option<String>,
    #[serde(default)]
    reddit_count: Option<i64>,
    #[serde(default)]
    twitch_count: Option<i64>,
    #[serde(default)]
    youtube_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawgScreenshotRow {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawgMovieRow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    preview: Option<String>,
    /// Quality-keyed clip urls, e.g. {"480": ..., "max": ...}.
    #[serde(default)]
    data: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawgAchievementRow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    percent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawgStoreRow {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    store: Option<RawgIdNameSlug>,
}

pub struct RawgClient {
    http: Client,
    api_key: String,
    base_url: String,
    delay: Duration,
}

impl RawgClient {
    pub fn from_env() -> Result<Self> {
        let api_key = env_req("RAWG_API_KEY")
            .context("RAWG sync requires RAWG_API_KEY (free key at https://rawg.io/apidocs)")?;
        let http = Client::builder()
            .user_agent("game-shelf/0.1")
            .build()
            .context("failed to construct RAWG HTTP client")?;
        Ok(Self {
            http,
            api_key,
            base_url: RAWG_BASE_URL.to_string(),
            delay: Duration::from_millis(env_parse("SYNC_REQUEST_DELAY_MS", 1000u64)),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, extra: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(extra)
            .send()
            .await
            .with_context(|| format!("rawg request failed: {path}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("rawg request failed (status={status}): {path}");
        }
        resp.json()
            .await
            .with_context(|| format!("parsing rawg response: {path}"))
    }

    async fn search_rows(&self, query: &str, page_size: u32) -> Result<Vec<RawgSearchRow>> {
        let size = page_size.to_string();
        let list: RawgListResponse<RawgSearchRow> = self
            .get_json("/games", &[("search", query), ("page_size", size.as_str())])
            .await?;
        Ok(list.results)
    }

    async fn detail(&self, remote_id: i64) -> Result<RawgGameDetail> {
        self.get_json(&format!("/games/{remote_id}"), &[]).await
    }

    async fn sub_resource<T: DeserializeOwned>(&self, remote_id: i64, kind: &str) -> Result<Vec<T>> {
        let list: RawgListResponse<T> = self
            .get_json(&format!("/games/{remote_id}/{kind}"), &[])
            .await?;
        Ok(list.results)
    }
}

#[async_trait]
impl CatalogClient for RawgClient {
    fn source(&self) -> Source {
        Source::Rawg
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let rows = self.search_rows(query, 10).await?;
        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                remote_id: row.id,
                name: row.name,
                released: row.released,
            })
            .collect())
    }

    /// RAWG search exposes no edition classification, so the first (highest
    /// relevance) result wins.
    async fn resolve_title(&self, title: &str) -> Result<Option<i64>> {
        let rows = self.search_rows(title, 1).await?;
        Ok(rows.first().map(|row| row.id))
    }

    async fn enrich(&self, remote_id: i64, log: &TaskLog) -> Result<Enrichment> {
        log.push("[api] fetching game details...".to_string());
        let detail = self.detail(remote_id).await?;
        tokio::time::sleep(self.delay).await;

        // Sub-resources are fetched independently; a rate-limit pause sits
        // between each call.
        log.push("[api] fetching screenshots...".to_string());
        let screenshots: Vec<RawgScreenshotRow> =
            self.sub_resource(remote_id, "screenshots").await?;
        log.push(format!("  -> {} screenshots", screenshots.len()));
        tokio::time::sleep(self.delay).await;

        log.push("[api] fetching achievements...".to_string());
        let achievements: Vec<RawgAchievementRow> =
            self.sub_resource(remote_id, "achievements").await?;
        log.push(format!("  -> {} achievements", achievements.len()));
        tokio::time::sleep(self.delay).await;

        log.push("[api] fetching trailers...".to_string());
        let trailers: Vec<RawgMovieRow> = self.sub_resource(remote_id, "movies").await?;
        log.push(format!("  -> {} trailers", trailers.len()));
        tokio::time::sleep(self.delay).await;

        log.push("[api] fetching store links...".to_string());
        let stores: Vec<RawgStoreRow> = self.sub_resource(remote_id, "stores").await?;
        log.push(format!("  -> {} stores", stores.len()));

        Ok(Enrichment::Rawg(extract(
            detail,
            screenshots,
            achievements,
            trailers,
            stores,
        )))
    }

    fn request_delay(&self) -> Duration {
        self.delay
    }
}

fn id_name(rows: Vec<RawgIdNameSlug>) -> Vec<IdName> {
    rows.into_iter()
        .map(|row| IdName {
            id: row.id,
            name: row.name.unwrap_or_default(),
            slug: row.slug,
        })
        .collect()
}

fn platform_names(rows: Vec<RawgPlatformEntry>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.platform.and_then(|p| p.name))
        .collect()
}

/// Flatten the detail payload plus sub-resources into the store's RAWG
/// block. Pure transformation.
pub fn extract(
    detail: RawgGameDetail,
    screenshots: Vec<RawgScreenshotRow>,
    achievements: Vec<RawgAchievementRow>,
    trailers: Vec<RawgMovieRow>,
    stores: Vec<RawgStoreRow>,
) -> RawgFields {
    let tag_names: Vec<String> = detail
        .tags
        .iter()
        .filter_map(|t| t.name.as_deref())
        .map(|n| n.to_ascii_lowercase())
        .collect();
    let players = infer_player_counts(&tag_names);

    RawgFields {
        id: Some(detail.id),
        slug: detail.slug,
        name: detail.name,
        released: detail.released,
        tba: detail.tba,
        rating: detail.rating,
        rating_top: detail.rating_top,
        ratings_count: detail.ratings_count,
        metacritic: detail.metacritic,
        metacritic_url: detail.metacritic_url,
        description_raw: detail.description_raw,
        website: detail.website,
        playtime: detail.playtime,
        background_image: detail.background_image,
        background_image_additional: detail.background_image_additional,
        genres: id_name(detail.genres),
        tags: id_name(detail.tags),
        platforms: platform_names(detail.platforms),
        parent_platforms: platform_names(detail.parent_platforms),
        esrb_rating: detail.esrb_rating.and_then(|e| e.name),
        screenshots: screenshots.into_iter().filter_map(|s| s.image).collect(),
        trailers: trailers
            .into_iter()
            .map(|m| RawgTrailer {
                url: m
                    .data
                    .get("max")
                    .or_else(|| m.data.get("480"))
                    .cloned(),
                name: m.name,
                preview: m.preview,
            })
            .collect(),
        achievements: achievements
            .into_iter()
            .map(|a| RawgAchievement {
                name: a.name,
                description: a.description,
                percent: a.percent,
            })
            .collect(),
        stores: stores
            .into_iter()
            .map(|s| {
                let store = s.store.unwrap_or_default();
                RawgStoreLink {
                    store_id: store.id,
                    store_name: store.name,
                    url: s.url,
                }
            })
            .collect(),
        developers: id_name(detail.developers),
        publishers: id_name(detail.publishers),
        reddit_url: detail.reddit_url,
        reddit_name: detail.reddit_name,
        reddit_count: detail.reddit_count,
        twitch_count: detail.twitch_count,
        youtube_count: detail.youtube_count,
        local_players_min: players.local_min,
        local_players_max: players.local_max,
        online_players_min: players.online_min,
        online_players_max: players.online_max,
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct PlayerCounts {
    pub local_min: Option<i64>,
    pub local_max: Option<i64>,
    pub online_min: Option<i64>,
    pub online_max: Option<i64>,
}

/// Best-effort player-count inference from tag text. The max values are
/// defaults, not verified per-title capacities; when no tag matches the
/// range stays unset rather than assuming single-player.
pub fn infer_player_counts(tag_names: &[String]) -> PlayerCounts {
    let has = |needle: &str| tag_names.iter().any(|t| t == needle);
    let mut counts = PlayerCounts::default();

    if has("singleplayer") || has("single-player") {
        counts.local_min = Some(1);
        counts.local_max = Some(1);
    }

    if has("local co-op") || has("local multiplayer") || has("split screen") || has("co-op") {
        counts.local_min.get_or_insert(1);
        counts.local_max = Some(4);
    }

    if has("multiplayer") || has("online co-op") || has("mmo") || has("massively multiplayer") {
        counts.online_min = Some(1);
        counts.online_max = if has("mmo") || has("massively multiplayer") {
            Some(1000)
        } else {
            Some(64)
        };
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn no_matching_tag_leaves_ranges_unset() {
        let counts = infer_player_counts(&tags(&["indie", "atmospheric"]));
        assert_eq!(counts, PlayerCounts::default());
    }

    #[test]
    fn singleplayer_tag_pins_local_to_one() {
        let counts = infer_player_counts(&tags(&["singleplayer"]));
        assert_eq!(counts.local_min, Some(1));
        assert_eq!(counts.local_max, Some(1));
        assert_eq!(counts.online_max, None);
    }

    #[test]
    fn local_coop_widens_local_max_but_keeps_min() {
        let counts = infer_player_counts(&tags(&["singleplayer", "split screen"]));
        assert_eq!(counts.local_min, Some(1));
        assert_eq!(counts.local_max, Some(4));
    }

    #[test]
    fn mmo_tag_raises_online_ceiling() {
        let counts = infer_player_counts(&tags(&["multiplayer"]));
        assert_eq!(counts.online_max, Some(64));
        let counts = infer_player_counts(&tags(&["multiplayer", "massively multiplayer"]));
        assert_eq!(counts.online_max, Some(1000));
        assert_eq!(counts.online_min, Some(1));
    }

    #[test]
    fn extract_flattens_nested_shapes() {
        let detail: RawgGameDetail = serde_json::from_value(json!({
            "id": 3498,
            "slug": "grand-theft-auto-v",
            "name": "Grand Theft Auto V",
            "released": "2013-09-17",
            "rating": 4.47,
            "metacritic": 92,
            "genres": [{ "id": 4, "name": "Action", "slug": "action" }],
            "tags": [
                { "id": 31, "name": "Singleplayer", "slug": "singleplayer" },
                { "id": 7, "name": "Multiplayer", "slug": "multiplayer" }
            ],
            "platforms": [
                { "platform": { "id": 4, "name": "PC", "slug": "pc" } },
                { "platform": { "id": 187, "name": "PlayStation 5", "slug": "playstation5" } }
            ],
            "esrb_rating": { "id": 4, "name": "Mature" }
        }))
        .unwrap();
        let screenshots: Vec<RawgScreenshotRow> = serde_json::from_value(json!([
            { "image": "https://example.com/s1.jpg" },
            { "image": "https://example.com/s2.jpg" }
        ]))
        .unwrap();
        let trailers: Vec<RawgMovieRow> = serde_json::from_value(json!([
            { "name": "Launch Trailer", "preview": "https://example.com/p.jpg",
              "data": { "480": "https://example.com/480.mp4", "max": "https://example.com/max.mp4" } }
        ]))
        .unwrap();
        let stores: Vec<RawgStoreRow> = serde_json::from_value(json!([
            { "url": "https://store.example.com/gta-v",
              "store": { "id": 3, "name": "Epic Games", "slug": "epic-games" } }
        ]))
        .unwrap();

        let fields = extract(detail, screenshots, vec![], trailers, stores);

        assert_eq!(fields.id, Some(3498));
        assert_eq!(fields.metacritic, Some(92));
        assert_eq!(fields.platforms, vec!["PC", "PlayStation 5"]);
        assert_eq!(fields.esrb_rating.as_deref(), Some("Mature"));
        assert_eq!(fields.screenshots.len(), 2);
        assert_eq!(
            fields.trailers[0].url.as_deref(),
            Some("https://example.com/max.mp4")
        );
        assert_eq!(fields.stores[0].store_name.as_deref(), Some("Epic Games"));
        // Tag heuristics: singleplayer + multiplayer.
        assert_eq!(fields.local_players_min, Some(1));
        assert_eq!(fields.local_players_max, Some(1));
        assert_eq!(fields.online_players_max, Some(64));
        assert!(fields.achievements.is_empty());
    }
}
