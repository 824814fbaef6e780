//! IGDB catalog client. Auth is Twitch client-credentials with an in-process
//! token cache; queries go over the Apicalypse POST body protocol.

use crate::store::{
    Enrichment, IgdbFields, IgdbInvolvedCompany, IgdbMultiplayerMode, IgdbVideo, IgdbWebsite,
    Source,
};
use crate::sync::{CatalogClient, SearchHit};
use crate::tasks::TaskLog;
use crate::util::env::{env_parse, env_req};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const IGDB_BASE_URL: &str = "https://api.igdb.com/v4";
const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Main-game category value; other categories are DLC, bundles, mods etc.
const CATEGORY_MAIN_GAME: i64 = 0;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TwitchTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IgdbSearchRow {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<i64>,
    #[serde(default)]
    pub version_parent: Option<i64>,
    #[serde(default)]
    pub first_release_date: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NamedRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ImageRef {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct VideoRef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WebsiteRef {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    category: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CompanyRef {
    #[serde(default)]
    company: Option<NamedRef>,
    #[serde(default)]
    developer: bool,
    #[serde(default)]
    publisher: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MultiplayerModeRef {
    #[serde(default)]
    campaigncoop: Option<bool>,
    #[serde(default)]
    lancoop: Option<bool>,
    #[serde(default)]
    splitscreen: Option<bool>,
    #[serde(default)]
    offlinemax: Option<i64>,
    #[serde(default)]
    offlinecoopmax: Option<i64>,
    #[serde(default)]
    onlinemax: Option<i64>,
    #[serde(default)]
    onlinecoopmax: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IgdbGameDetail {
    id: i64,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    storyline: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    first_release_date: Option<i64>,
    #[serde(default)]
    category: Option<i64>,
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    rating_count: Option<i64>,
    #[serde(default)]
    total_rating: Option<f64>,
    #[serde(default)]
    total_rating_count: Option<i64>,
    #[serde(default)]
    aggregated_rating: Option<f64>,
    #[serde(default)]
    aggregated_rating_count: Option<i64>,
    #[serde(default)]
    hypes: Option<i64>,
    #[serde(default)]
    follows: Option<i64>,
    #[serde(default)]
    cover: Option<ImageRef>,
    #[serde(default)]
    artworks: Vec<ImageRef>,
    #[serde(default)]
    screenshots: Vec<ImageRef>,
    #[serde(default)]
    videos: Vec<VideoRef>,
    #[serde(default)]
    genres: Vec<NamedRef>,
    #[serde(default)]
    themes: Vec<NamedRef>,
    #[serde(default)]
    game_modes: Vec<NamedRef>,
    #[serde(default)]
    player_perspectives: Vec<NamedRef>,
    #[serde(default)]
    platforms: Vec<NamedRef>,
    #[serde(default)]
    keywords: Vec<NamedRef>,
    #[serde(default)]
    alternative_names: Vec<NamedRef>,
    #[serde(default)]
    multiplayer_modes: Vec<MultiplayerModeRef>,
    #[serde(default)]
    involved_companies: Vec<CompanyRef>,
    #[serde(default)]
    websites: Vec<WebsiteRef>,
}

pub struct IgdbClient {
    http: Client,
    client_id: String,
    client_secret: String,
    base_url: String,
    token: Mutex<Option<CachedToken>>,
    delay: Duration,
}

impl IgdbClient {
    pub fn from_env() -> Result<Self> {
        let client_id = env_req("TWITCH_CLIENT_ID")
            .context("IGDB sync requires TWITCH_CLIENT_ID (register at dev.twitch.tv)")?;
        let client_secret = env_req("TWITCH_CLIENT_SECRET")
            .context("IGDB sync requires TWITCH_CLIENT_SECRET")?;
        let http = Client::builder()
            .user_agent("game-shelf/0.1")
            .build()
            .context("failed to construct IGDB HTTP client")?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            base_url: IGDB_BASE_URL.to_string(),
            token: Mutex::new(None),
            delay: Duration::from_millis(env_parse("SYNC_REQUEST_DELAY_MS", 1000u64)),
        })
    }

    async fn request_new_token(&self) -> Result<CachedToken> {
        let resp = self
            .http
            .post(TWITCH_TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .context("twitch token request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("twitch token request rejected (status={status})");
        }
        let token: TwitchTokenResponse = resp
            .json()
            .await
            .context("parsing twitch token response")?;
        // Expire 30s early so an in-flight call never carries a stale token.
        let ttl = token.expires_in.saturating_sub(30).max(30);
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(ttl),
        })
    }

    async fn bearer_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }
        let fresh = self.request_new_token().await?;
        let access = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(access)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Run one Apicalypse query. A 401 invalidates the cached token and the
    /// query is retried once with a fresh one.
    async fn execute<T: DeserializeOwned>(&self, endpoint: &str, body: &str) -> Result<Vec<T>> {
        for attempt in 0..2 {
            let token = self.bearer_token().await?;
            let resp = self
                .http
                .post(format!("{}/{endpoint}", self.base_url))
                .header("Client-ID", &self.client_id)
                .bearer_auth(&token)
                .body(body.to_string())
                .send()
                .await
                .with_context(|| format!("igdb request failed: {endpoint}"))?;
            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED && attempt == 0 {
                self.invalidate_token().await;
                continue;
            }
            if !status.is_success() {
                bail!("igdb request failed (status={status}): {endpoint}");
            }
            return resp
                .json()
                .await
                .with_context(|| format!("parsing igdb response: {endpoint}"));
        }
        unreachable!("retry loop always returns")
    }

    async fn search_rows(&self, query: &str, limit: u32) -> Result<Vec<IgdbSearchRow>> {
        let body = format!(
            "search \"{}\"; fields id,name,category,version_parent,first_release_date; limit {limit};",
            escape_query(query)
        );
        self.execute("games", &body).await
    }

    async fn detail(&self, remote_id: i64) -> Result<Option<IgdbGameDetail>> {
        let body = format!(
            "fields id,slug,name,summary,storyline,url,first_release_date,category,status,\
             rating,rating_count,total_rating,total_rating_count,aggregated_rating,\
             aggregated_rating_count,hypes,follows,cover.url,artworks.url,screenshots.url,\
             videos.name,videos.video_id,genres.name,themes.name,game_modes.name,\
             player_perspectives.name,platforms.name,keywords.name,alternative_names.name,\
             multiplayer_modes.*,involved_companies.company.name,involved_companies.developer,\
             involved_companies.publisher,websites.url,websites.category; \
             where id = {remote_id};"
        );
        let mut rows: Vec<IgdbGameDetail> = self.execute("games", &body).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }
}

#[async_trait]
impl CatalogClient for IgdbClient {
    fn source(&self) -> Source {
        Source::Igdb
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let rows = self.search_rows(query, 10).await?;
        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                remote_id: row.id,
                name: row.name.unwrap_or_default(),
                released: row.first_release_date.and_then(format_release_date),
            })
            .collect())
    }

    async fn resolve_title(&self, title: &str) -> Result<Option<i64>> {
        let rows = self.search_rows(title, 5).await?;
        Ok(pick_best(&rows).map(|row| row.id))
    }

    async fn enrich(&self, remote_id: i64, log: &TaskLog) -> Result<Enrichment> {
        log.push("[api] fetching expanded game record...".to_string());
        let detail = match self.detail(remote_id).await? {
            Some(detail) => detail,
            None => bail!("igdb has no game with id {remote_id}"),
        };
        let fields = extract(detail);
        log.push(format!(
            "  -> {} screenshots, {} videos, {} companies",
            fields.screenshots.len(),
            fields.videos.len(),
            fields.involved_companies.len()
        ));
        Ok(Enrichment::Igdb(fields))
    }

    fn request_delay(&self) -> Duration {
        self.delay
    }
}

/// Escape a free-text query for inclusion in an Apicalypse string literal.
fn escape_query(query: &str) -> String {
    query.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Search tie-break: prefer a main-game entry that is not an edition of
/// another game, then any non-edition entry, then the first row.
pub fn pick_best(rows: &[IgdbSearchRow]) -> Option<&IgdbSearchRow> {
    rows.iter()
        .find(|row| row.category == Some(CATEGORY_MAIN_GAME) && row.version_parent.is_none())
        .or_else(|| rows.iter().find(|row| row.version_parent.is_none()))
        .or_else(|| rows.first())
}

fn format_release_date(unix: i64) -> Option<String> {
    DateTime::from_timestamp(unix, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Normalize an IGDB image url: protocol-relative becomes https, and the
/// thumbnail size token is upgraded to the requested one.
pub fn upgrade_image(url: &str, size: &str) -> String {
    let absolute = if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        url.to_string()
    };
    absolute.replace("t_thumb", size)
}

fn names(rows: Vec<NamedRef>) -> Vec<String> {
    rows.into_iter().filter_map(|row| row.name).collect()
}

fn images(rows: Vec<ImageRef>, size: &str) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.url)
        .map(|url| upgrade_image(&url, size))
        .collect()
}

/// Flatten the expanded detail payload into the store's IGDB block. Pure
/// transformation.
pub fn extract(detail: IgdbGameDetail) -> IgdbFields {
    let involved: Vec<IgdbInvolvedCompany> = detail
        .involved_companies
        .into_iter()
        .map(|c| IgdbInvolvedCompany {
            name: c.company.and_then(|n| n.name),
            developer: c.developer,
            publisher: c.publisher,
        })
        .collect();
    let developers = involved
        .iter()
        .filter(|c| c.developer)
        .filter_map(|c| c.name.clone())
        .collect();
    let publishers = involved
        .iter()
        .filter(|c| c.publisher)
        .filter_map(|c| c.name.clone())
        .collect();

    IgdbFields {
        id: Some(detail.id),
        slug: detail.slug,
        name: detail.name,
        summary: detail.summary,
        storyline: detail.storyline,
        url: detail.url,
        first_release_date: detail.first_release_date,
        category: detail.category,
        status: detail.status,
        rating: detail.rating,
        rating_count: detail.rating_count,
        total_rating: detail.total_rating,
        total_rating_count: detail.total_rating_count,
        aggregated_rating: detail.aggregated_rating,
        aggregated_rating_count: detail.aggregated_rating_count,
        hypes: detail.hypes,
        follows: detail.follows,
        cover: detail
            .cover
            .and_then(|c| c.url)
            .map(|url| upgrade_image(&url, "t_cover_big")),
        artworks: images(detail.artworks, "t_screenshot_big"),
        screenshots: images(detail.screenshots, "t_screenshot_big"),
        videos: detail
            .videos
            .into_iter()
            .map(|v| IgdbVideo {
                name: v.name,
                video_id: v.video_id,
            })
            .collect(),
        genres: names(detail.genres),
        themes: names(detail.themes),
        game_modes: names(detail.game_modes),
        player_perspectives: names(detail.player_perspectives),
        platforms: names(detail.platforms),
        keywords: names(detail.keywords),
        alternative_names: names(detail.alternative_names),
        multiplayer_modes: detail
            .multiplayer_modes
            .into_iter()
            .map(|m| IgdbMultiplayerMode {
                campaigncoop: m.campaigncoop,
                lancoop: m.lancoop,
                splitscreen: m.splitscreen,
                offlinemax: m.offlinemax,
                offlinecoopmax: m.offlinecoopmax,
                onlinemax: m.onlinemax,
                onlinecoopmax: m.onlinecoopmax,
            })
            .collect(),
        involved_companies: involved,
        developers,
        publishers,
        websites: detail
            .websites
            .into_iter()
            .map(|w| IgdbWebsite {
                url: w.url,
                category: w.category,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: i64, category: Option<i64>, version_parent: Option<i64>) -> IgdbSearchRow {
        IgdbSearchRow {
            id,
            name: Some(format!("game {id}")),
            category,
            version_parent,
            first_release_date: None,
        }
    }

    #[test]
    fn pick_best_prefers_main_game_without_parent() {
        let rows = vec![
            row(1, Some(3), None),       // bundle
            row(2, Some(0), Some(9)),    // edition of another game
            row(3, Some(0), None),       // main game
            row(4, Some(0), None),
        ];
        assert_eq!(pick_best(&rows).map(|r| r.id), Some(3));
    }

    #[test]
    fn pick_best_falls_back_to_non_edition_then_first() {
        let rows = vec![row(1, Some(1), Some(9)), row(2, Some(1), None)];
        assert_eq!(pick_best(&rows).map(|r| r.id), Some(2));

        let rows = vec![row(7, Some(1), Some(9)), row(8, Some(2), Some(9))];
        assert_eq!(pick_best(&rows).map(|r| r.id), Some(7));

        assert!(pick_best(&[]).is_none());
    }

    #[test]
    fn image_urls_get_https_and_size_upgrade() {
        assert_eq!(
            upgrade_image("//images.igdb.com/igdb/image/upload/t_thumb/co1wyy.jpg", "t_cover_big"),
            "https://images.igdb.com/igdb/image/upload/t_cover_big/co1wyy.jpg"
        );
        // Already-absolute urls keep their scheme.
        assert_eq!(
            upgrade_image("https://images.igdb.com/t_thumb/sc6lvd.jpg", "t_screenshot_big"),
            "https://images.igdb.com/t_screenshot_big/sc6lvd.jpg"
        );
    }

    #[test]
    fn stale_token_is_not_fresh() {
        let token = CachedToken {
            access_token: "abc".into(),
            expires_at: Instant::now() - Duration::from_secs(1),
        };
        assert!(!token.is_fresh());
        let token = CachedToken {
            access_token: "abc".into(),
            expires_at: Instant::now() + Duration::from_secs(60),
        };
        assert!(token.is_fresh());
    }

    #[test]
    fn query_escaping_handles_quotes() {
        assert_eq!(escape_query(r#"Don't "Starve""#), r#"Don't \"Starve\""#);
        assert_eq!(escape_query(r"back\slash"), r"back\\slash");
    }

    #[test]
    fn extract_flattens_expanded_references() {
        let detail: IgdbGameDetail = serde_json::from_value(json!({
            "id": 1942,
            "slug": "the-witcher-3-wild-hunt",
            "name": "The Witcher 3: Wild Hunt",
            "first_release_date": 1431993600,
            "category": 0,
            "rating": 94.5,
            "cover": { "url": "//images.igdb.com/t_thumb/co1wyy.jpg" },
            "screenshots": [ { "url": "//images.igdb.com/t_thumb/sc1.jpg" } ],
            "genres": [ { "name": "Role-playing (RPG)" } ],
            "platforms": [ { "name": "PC (Microsoft Windows)" }, { "name": "PlayStation 4" } ],
            "multiplayer_modes": [ { "splitscreen": false, "onlinemax": 0 } ],
            "involved_companies": [
                { "company": { "name": "CD Projekt RED" }, "developer": true, "publisher": false },
                { "company": { "name": "CD Projekt" }, "developer": false, "publisher": true }
            ],
            "websites": [ { "url": "https://thewitcher.com", "category": 1 } ]
        }))
        .unwrap();

        let fields = extract(detail);
        assert_eq!(fields.id, Some(1942));
        assert_eq!(
            fields.cover.as_deref(),
            Some("https://images.igdb.com/t_cover_big/co1wyy.jpg")
        );
        assert_eq!(
            fields.screenshots,
            vec!["https://images.igdb.com/t_screenshot_big/sc1.jpg"]
        );
        assert_eq!(fields.genres, vec!["Role-playing (RPG)"]);
        assert_eq!(fields.developers, vec!["CD Projekt RED"]);
        assert_eq!(fields.publishers, vec!["CD Projekt"]);
        assert_eq!(fields.websites[0].category, Some(1));
        assert_eq!(fields.multiplayer_modes[0].splitscreen, Some(false));
    }
}
