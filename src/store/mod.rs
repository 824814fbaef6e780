//! Catalog record store: one SQLite row per game title.
//!
//! The table is flat; each enrichment source owns a prefixed column range
//! (`rawg__*`, `igdb__*`) ending in a `__synced` flag and `__synced_at`
//! timestamp. Every call opens its own short-lived connection, which is
//! acceptable for the single-desktop-user access pattern this crate targets.

pub mod record;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use record::{
    Enrichment, GameRecord, GameStub, IdName, IgdbFields, IgdbInvolvedCompany,
    IgdbMultiplayerMode, IgdbVideo, IgdbWebsite, RawgAchievement, RawgFields, RawgStoreLink,
    RawgTrailer, Source, SourceBlock,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE,
    source_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    rawg__id INTEGER,
    rawg__slug TEXT,
    rawg__name TEXT,
    rawg__released TEXT,
    rawg__tba INTEGER,
    rawg__rating REAL,
    rawg__rating_top INTEGER,
    rawg__ratings_count INTEGER,
    rawg__metacritic INTEGER,
    rawg__metacritic_url TEXT,
    rawg__description_raw TEXT,
    rawg__website TEXT,
    rawg__playtime INTEGER,
    rawg__background_image TEXT,
    rawg__background_image_additional TEXT,
    rawg__genres TEXT,
    rawg__tags TEXT,
    rawg__platforms TEXT,
    rawg__parent_platforms TEXT,
    rawg__esrb_rating TEXT,
    rawg__screenshots TEXT,
    rawg__trailers TEXT,
    rawg__achievements TEXT,
    rawg__stores TEXT,
    rawg__developers TEXT,
    rawg__publishers TEXT,
    rawg__reddit_url TEXT,
    rawg__reddit_name TEXT,
    rawg__reddit_count INTEGER,
    rawg__twitch_count INTEGER,
    rawg__youtube_count INTEGER,
    rawg__local_players_min INTEGER,
    rawg__local_players_max INTEGER,
    rawg__online_players_min INTEGER,
    rawg__online_players_max INTEGER,
    rawg__synced INTEGER DEFAULT 0,
    rawg__synced_at TEXT,

    igdb__id INTEGER,
    igdb__slug TEXT,
    igdb__name TEXT,
    igdb__summary TEXT,
    igdb__storyline TEXT,
    igdb__url TEXT,
    igdb__first_release_date INTEGER,
    igdb__category INTEGER,
    igdb__status INTEGER,
    igdb__rating REAL,
    igdb__rating_count INTEGER,
    igdb__total_rating REAL,
    igdb__total_rating_count INTEGER,
    igdb__aggregated_rating REAL,
    igdb__aggregated_rating_count INTEGER,
    igdb__hypes INTEGER,
    igdb__follows INTEGER,
    igdb__cover TEXT,
    igdb__artworks TEXT,
    igdb__screenshots TEXT,
    igdb__videos TEXT,
    igdb__genres TEXT,
    igdb__themes TEXT,
    igdb__game_modes TEXT,
    igdb__player_perspectives TEXT,
    igdb__platforms TEXT,
    igdb__keywords TEXT,
    igdb__alternative_names TEXT,
    igdb__multiplayer_modes TEXT,
    igdb__involved_companies TEXT,
    igdb__developers TEXT,
    igdb__publishers TEXT,
    igdb__websites TEXT,
    igdb__synced INTEGER DEFAULT 0,
    igdb__synced_at TEXT
)
";

/// Handle to the library database. Cheap to clone; connections are opened
/// per call and closed on drop.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating data dir {}", parent.display()))?;
            }
        }
        let store = Self { path };
        let conn = store.conn()?;
        conn.execute(SCHEMA, [])
            .context("initializing games schema")?;
        info!(db = %store.path.display(), "library store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("opening sqlite db {}", self.path.display()))
    }

    /// Idempotent insert-by-title. Returns `(id, was_new)`; a duplicate title
    /// is not an error, it resolves to the existing row.
    pub fn add_game(&self, title: &str, source_id: Option<&str>) -> Result<(i64, bool)> {
        let title = title.trim();
        if title.is_empty() {
            bail!("title must be non-empty");
        }
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO games (title, source_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![title, source_id, now],
        )?;
        if inserted > 0 {
            return Ok((conn.last_insert_rowid(), true));
        }
        let id: i64 = conn
            .query_row("SELECT id FROM games WHERE title = ?1", params![title], |r| {
                r.get(0)
            })
            .context("looking up existing title")?;
        Ok((id, false))
    }

    /// Wholesale overwrite of one source's column block. Sets the source's
    /// synced flag and timestamp and bumps `updated_at`. `Ok(false)` means the
    /// id matched no row.
    pub fn update_enrichment(&self, id: i64, enrichment: &Enrichment) -> Result<bool> {
        let mut pairs = match enrichment {
            Enrichment::Rawg(f) => rawg_column_values(f),
            Enrichment::Igdb(f) => igdb_column_values(f),
        };
        let now = Utc::now().to_rfc3339();
        let prefix = enrichment.source().prefix();
        pairs.push((
            format!("{prefix}__synced"),
            SqlValue::Integer(1),
        ));
        pairs.push((format!("{prefix}__synced_at"), SqlValue::Text(now.clone())));
        pairs.push(("updated_at".to_string(), SqlValue::Text(now)));

        let set_clause: Vec<String> = pairs.iter().map(|(col, _)| format!("{col} = ?")).collect();
        let sql = format!("UPDATE games SET {} WHERE id = ?", set_clause.join(", "));

        let mut values: Vec<SqlValue> = pairs.into_iter().map(|(_, v)| v).collect();
        values.push(SqlValue::Integer(id));

        let conn = self.conn()?;
        let affected = conn
            .execute(&sql, params_from_iter(values))
            .context("writing enrichment block")?;
        Ok(affected > 0)
    }

    /// All records, title ascending, JSON columns deserialized.
    pub fn get_all(&self) -> Result<Vec<GameRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM games ORDER BY title ASC")?;
        let rows = stmt.query_map([], record_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<GameRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM games WHERE id = ?1")?;
        let record = stmt
            .query_row(params![id], record_from_row)
            .optional()
            .context("reading game by id")?;
        Ok(record)
    }

    /// Records not yet synced with the given source (flag false or NULL).
    pub fn unsynced(&self, source: Source) -> Result<Vec<GameStub>> {
        let prefix = source.prefix();
        let sql = format!(
            "SELECT id, title, source_id FROM games
             WHERE {prefix}__synced = 0 OR {prefix}__synced IS NULL
             ORDER BY title ASC"
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(GameStub {
                id: row.get(0)?,
                title: row.get(1)?,
                source_id: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Identity projection of every record, title ascending (force-resync path).
    pub fn all_stubs(&self) -> Result<Vec<GameStub>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, title, source_id FROM games ORDER BY title ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(GameStub {
                id: row.get(0)?,
                title: row.get(1)?,
                source_id: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM games", [], |r| r.get(0))?;
        Ok(count)
    }

    pub fn synced_count(&self, source: Source) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM games WHERE {}__synced = 1",
            source.prefix()
        );
        let conn = self.conn()?;
        let count = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(count)
    }

    /// (local, online) counts of games whose inferred player-count max
    /// exceeds one.
    pub fn multiplayer_counts(&self) -> Result<(i64, i64)> {
        let conn = self.conn()?;
        let local = conn.query_row(
            "SELECT COUNT(*) FROM games WHERE rawg__local_players_max > 1",
            [],
            |r| r.get(0),
        )?;
        let online = conn.query_row(
            "SELECT COUNT(*) FROM games WHERE rawg__online_players_max > 1",
            [],
            |r| r.get(0),
        )?;
        Ok((local, online))
    }

    /// Destructive bulk reset. Test/tooling use only.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM games", [])?;
        warn!("cleared all games from library store");
        Ok(())
    }
}

fn text(v: &Option<String>) -> SqlValue {
    match v {
        Some(s) => SqlValue::Text(s.clone()),
        None => SqlValue::Null,
    }
}

fn int(v: Option<i64>) -> SqlValue {
    v.map(SqlValue::Integer).unwrap_or(SqlValue::Null)
}

fn real(v: Option<f64>) -> SqlValue {
    v.map(SqlValue::Real).unwrap_or(SqlValue::Null)
}

fn flag(v: Option<bool>) -> SqlValue {
    v.map(|b| SqlValue::Integer(b as i64)).unwrap_or(SqlValue::Null)
}

fn json_list<T: Serialize>(v: &[T]) -> SqlValue {
    SqlValue::Text(serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string()))
}

/// Parse a JSON text column back into its list form. Malformed content is
/// swallowed into an empty container so a partial write never poisons reads.
fn parse_list<T: DeserializeOwned>(column: &str, raw: Option<String>) -> Vec<T> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        warn!(column, error = %err, "malformed json column; substituting empty list");
        Vec::new()
    })
}

fn rawg_column_values(f: &RawgFields) -> Vec<(String, SqlValue)> {
    let c = |name: &str| format!("rawg__{name}");
    vec![
        (c("id"), int(f.id)),
        (c("slug"), text(&f.slug)),
        (c("name"), text(&f.name)),
        (c("released"), text(&f.released)),
        (c("tba"), flag(f.tba)),
        (c("rating"), real(f.rating)),
        (c("rating_top"), int(f.rating_top)),
        (c("ratings_count"), int(f.ratings_count)),
        (c("metacritic"), int(f.metacritic)),
        (c("metacritic_url"), text(&f.metacritic_url)),
        (c("description_raw"), text(&f.description_raw)),
        (c("website"), text(&f.website)),
        (c("playtime"), int(f.playtime)),
        (c("background_image"), text(&f.background_image)),
        (
            c("background_image_additional"),
            text(&f.background_image_additional),
        ),
        (c("genres"), json_list(&f.genres)),
        (c("tags"), json_list(&f.tags)),
        (c("platforms"), json_list(&f.platforms)),
        (c("parent_platforms"), json_list(&f.parent_platforms)),
        (c("esrb_rating"), text(&f.esrb_rating)),
        (c("screenshots"), json_list(&f.screenshots)),
        (c("trailers"), json_list(&f.trailers)),
        (c("achievements"), json_list(&f.achievements)),
        (c("stores"), json_list(&f.stores)),
        (c("developers"), json_list(&f.developers)),
        (c("publishers"), json_list(&f.publishers)),
        (c("reddit_url"), text(&f.reddit_url)),
        (c("reddit_name"), text(&f.reddit_name)),
        (c("reddit_count"), int(f.reddit_count)),
        (c("twitch_count"), int(f.twitch_count)),
        (c("youtube_count"), int(f.youtube_count)),
        (c("local_players_min"), int(f.local_players_min)),
        (c("local_players_max"), int(f.local_players_max)),
        (c("online_players_min"), int(f.online_players_min)),
        (c("online_players_max"), int(f.online_players_max)),
    ]
}

fn igdb_column_values(f: &IgdbFields) -> Vec<(String, SqlValue)> {
    let c = |name: &str| format!("igdb__{name}");
    vec![
        (c("id"), int(f.id)),
        (c("slug"), text(&f.slug)),
        (c("name"), text(&f.name)),
        (c("summary"), text(&f.summary)),
        (c("storyline"), text(&f.storyline)),
        (c("url"), text(&f.url)),
        (c("first_release_date"), int(f.first_release_date)),
        (c("category"), int(f.category)),
        (c("status"), int(f.status)),
        (c("rating"), real(f.rating)),
        (c("rating_count"), int(f.rating_count)),
        (c("total_rating"), real(f.total_rating)),
        (c("total_rating_count"), int(f.total_rating_count)),
        (c("aggregated_rating"), real(f.aggregated_rating)),
        (c("aggregated_rating_count"), int(f.aggregated_rating_count)),
        (c("hypes"), int(f.hypes)),
        (c("follows"), int(f.follows)),
        (c("cover"), text(&f.cover)),
        (c("artworks"), json_list(&f.artworks)),
        (c("screenshots"), json_list(&f.screenshots)),
        (c("videos"), json_list(&f.videos)),
        (c("genres"), json_list(&f.genres)),
        (c("themes"), json_list(&f.themes)),
        (c("game_modes"), json_list(&f.game_modes)),
        (c("player_perspectives"), json_list(&f.player_perspectives)),
        (c("platforms"), json_list(&f.platforms)),
        (c("keywords"), json_list(&f.keywords)),
        (c("alternative_names"), json_list(&f.alternative_names)),
        (c("multiplayer_modes"), json_list(&f.multiplayer_modes)),
        (c("involved_companies"), json_list(&f.involved_companies)),
        (c("developers"), json_list(&f.developers)),
        (c("publishers"), json_list(&f.publishers)),
        (c("websites"), json_list(&f.websites)),
    ]
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<GameRecord> {
    let rawg = SourceBlock {
        synced: row
            .get::<_, Option<bool>>("rawg__synced")?
            .unwrap_or(false),
        synced_at: row.get("rawg__synced_at")?,
        fields: RawgFields {
            id: row.get("rawg__id")?,
            slug: row.get("rawg__slug")?,
            name: row.get("rawg__name")?,
            released: row.get("rawg__released")?,
            tba: row.get("rawg__tba")?,
            rating: row.get("rawg__rating")?,
            rating_top: row.get("rawg__rating_top")?,
            ratings_count: row.get("rawg__ratings_count")?,
            metacritic: row.get("rawg__metacritic")?,
            metacritic_url: row.get("rawg__metacritic_url")?,
            description_raw: row.get("rawg__description_raw")?,
            website: row.get("rawg__website")?,
            playtime: row.get("rawg__playtime")?,
            background_image: row.get("rawg__background_image")?,
            background_image_additional: row.get("rawg__background_image_additional")?,
            genres: parse_list("rawg__genres", row.get("rawg__genres")?),
            tags: parse_list("rawg__tags", row.get("rawg__tags")?),
            platforms: parse_list("rawg__platforms", row.get("rawg__platforms")?),
            parent_platforms: parse_list(
                "rawg__parent_platforms",
                row.get("rawg__parent_platforms")?,
            ),
            esrb_rating: row.get("rawg__esrb_rating")?,
            screenshots: parse_list("rawg__screenshots", row.get("rawg__screenshots")?),
            trailers: parse_list("rawg__trailers", row.get("rawg__trailers")?),
            achievements: parse_list("rawg__achievements", row.get("rawg__achievements")?),
            stores: parse_list("rawg__stores", row.get("rawg__stores")?),
            developers: parse_list("rawg__developers", row.get("rawg__developers")?),
            publishers: parse_list("rawg__publishers", row.get("rawg__publishers")?),
            reddit_url: row.get("rawg__reddit_url")?,
            reddit_name: row.get("rawg__reddit_name")?,
            reddit_count: row.get("rawg__reddit_count")?,
            twitch_count: row.get("rawg__twitch_count")?,
            youtube_count: row.get("rawg__youtube_count")?,
            local_players_min: row.get("rawg__local_players_min")?,
            local_players_max: row.get("rawg__local_players_max")?,
            online_players_min: row.get("rawg__online_players_min")?,
            online_players_max: row.get("rawg__online_players_max")?,
        },
    };
    let igdb = SourceBlock {
        synced: row
            .get::<_, Option<bool>>("igdb__synced")?
            .unwrap_or(false),
        synced_at: row.get("igdb__synced_at")?,
        fields: IgdbFields {
            id: row.get("igdb__id")?,
            slug: row.get("igdb__slug")?,
            name: row.get("igdb__name")?,
            summary: row.get("igdb__summary")?,
            storyline: row.get("igdb__storyline")?,
            url: row.get("igdb__url")?,
            first_release_date: row.get("igdb__first_release_date")?,
            category: row.get("igdb__category")?,
            status: row.get("igdb__status")?,
            rating: row.get("igdb__rating")?,
            rating_count: row.get("igdb__rating_count")?,
            total_rating: row.get("igdb__total_rating")?,
            total_rating_count: row.get("igdb__total_rating_count")?,
            aggregated_rating: row.get("igdb__aggregated_rating")?,
            aggregated_rating_count: row.get("igdb__aggregated_rating_count")?,
            hypes: row.get("igdb__hypes")?,
            follows: row.get("igdb__follows")?,
            cover: row.get("igdb__cover")?,
            artworks: parse_list("igdb__artworks", row.get("igdb__artworks")?),
            screenshots: parse_list("igdb__screenshots", row.get("igdb__screenshots")?),
            videos: parse_list("igdb__videos", row.get("igdb__videos")?),
            genres: parse_list("igdb__genres", row.get("igdb__genres")?),
            themes: parse_list("igdb__themes", row.get("igdb__themes")?),
            game_modes: parse_list("igdb__game_modes", row.get("igdb__game_modes")?),
            player_perspectives: parse_list(
                "igdb__player_perspectives",
                row.get("igdb__player_perspectives")?,
            ),
            platforms: parse_list("igdb__platforms", row.get("igdb__platforms")?),
            keywords: parse_list("igdb__keywords", row.get("igdb__keywords")?),
            alternative_names: parse_list(
                "igdb__alternative_names",
                row.get("igdb__alternative_names")?,
            ),
            multiplayer_modes: parse_list(
                "igdb__multiplayer_modes",
                row.get("igdb__multiplayer_modes")?,
            ),
            involved_companies: parse_list(
                "igdb__involved_companies",
                row.get("igdb__involved_companies")?,
            ),
            developers: parse_list("igdb__developers", row.get("igdb__developers")?),
            publishers: parse_list("igdb__publishers", row.get("igdb__publishers")?),
            websites: parse_list("igdb__websites", row.get("igdb__websites")?),
        },
    };
    Ok(GameRecord {
        id: row.get("id")?,
        title: row.get("title")?,
        source_id: row.get("source_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        rawg,
        igdb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store backed by a uniquely named temp file, removed on drop.
    struct TempStore {
        store: Store,
    }

    impl TempStore {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!(
                "game-shelf-test-{}.db",
                uuid::Uuid::new_v4()
            ));
            let store = Store::open(&path).expect("open temp store");
            Self { store }
        }
    }

    impl Drop for TempStore {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(self.store.path());
        }
    }

    fn sample_rawg() -> RawgFields {
        RawgFields {
            id: Some(3498),
            slug: Some("grand-theft-auto-v".into()),
            name: Some("Grand Theft Auto V".into()),
            metacritic: Some(92),
            genres: vec![
                IdName {
                    id: Some(4),
                    name: "Action".into(),
                    slug: Some("action".into()),
                },
                IdName {
                    id: Some(3),
                    name: "Adventure".into(),
                    slug: Some("adventure".into()),
                },
            ],
            screenshots: vec!["https://example.com/a.jpg".into(), "https://example.com/b.jpg".into()],
            local_players_min: Some(1),
            local_players_max: Some(4),
            online_players_min: Some(1),
            online_players_max: Some(64),
            ..Default::default()
        }
    }

    #[test]
    fn add_game_is_idempotent_by_title() {
        let t = TempStore::new();
        let (id1, new1) = t.store.add_game("Hades", None).unwrap();
        let (id2, new2) = t.store.add_game("Hades", Some("epic-123")).unwrap();
        assert_eq!(id1, id2);
        assert!(new1);
        assert!(!new2);
        assert_eq!(t.store.count().unwrap(), 1);
    }

    #[test]
    fn add_game_rejects_empty_title() {
        let t = TempStore::new();
        assert!(t.store.add_game("   ", None).is_err());
    }

    #[test]
    fn get_all_orders_by_title() {
        let t = TempStore::new();
        t.store.add_game("Celeste", None).unwrap();
        t.store.add_game("Among Us", None).unwrap();
        t.store.add_game("Bastion", None).unwrap();
        let titles: Vec<String> = t
            .store
            .get_all()
            .unwrap()
            .into_iter()
            .map(|g| g.title)
            .collect();
        assert_eq!(titles, vec!["Among Us", "Bastion", "Celeste"]);
    }

    #[test]
    fn enrichment_namespaces_are_isolated() {
        let t = TempStore::new();
        let (id, _) = t.store.add_game("Hades", None).unwrap();

        assert!(t
            .store
            .update_enrichment(id, &Enrichment::Rawg(sample_rawg()))
            .unwrap());

        let record = t.store.get_by_id(id).unwrap().unwrap();
        assert!(record.rawg.synced);
        assert!(record.rawg.synced_at.is_some());
        assert!(!record.igdb.synced);
        assert!(record.igdb.synced_at.is_none());
        assert_eq!(record.igdb.fields, IgdbFields::default());

        // Still a sync candidate for the other source.
        let pending = t.store.unsynced(Source::Igdb).unwrap();
        assert_eq!(pending.len(), 1);
        assert!(t.store.unsynced(Source::Rawg).unwrap().is_empty());

        // And the reverse direction leaves the RAWG block alone.
        let igdb = IgdbFields {
            id: Some(1115),
            name: Some("Hades".into()),
            genres: vec!["Role-playing (RPG)".into()],
            ..Default::default()
        };
        assert!(t
            .store
            .update_enrichment(id, &Enrichment::Igdb(igdb))
            .unwrap());
        let record = t.store.get_by_id(id).unwrap().unwrap();
        assert_eq!(record.rawg.fields.metacritic, Some(92));
        assert!(record.rawg.synced);
        assert!(record.igdb.synced);
    }

    #[test]
    fn unsynced_reflects_sync_state() {
        let t = TempStore::new();
        let (id, _) = t.store.add_game("Hades", None).unwrap();
        assert_eq!(t.store.unsynced(Source::Rawg).unwrap().len(), 1);
        t.store
            .update_enrichment(id, &Enrichment::Rawg(sample_rawg()))
            .unwrap();
        assert!(t.store.unsynced(Source::Rawg).unwrap().is_empty());
        assert_eq!(t.store.synced_count(Source::Rawg).unwrap(), 1);
        assert_eq!(t.store.synced_count(Source::Igdb).unwrap(), 0);
    }

    #[test]
    fn list_fields_round_trip() {
        let t = TempStore::new();
        let (id, _) = t.store.add_game("GTA V", None).unwrap();
        let fields = sample_rawg();
        t.store
            .update_enrichment(id, &Enrichment::Rawg(fields.clone()))
            .unwrap();
        let record = t.store.get_by_id(id).unwrap().unwrap();
        assert_eq!(record.rawg.fields.genres, fields.genres);
        assert_eq!(record.rawg.fields.screenshots, fields.screenshots);
    }

    #[test]
    fn resync_overwrites_previous_block_wholesale() {
        let t = TempStore::new();
        let (id, _) = t.store.add_game("GTA V", None).unwrap();
        t.store
            .update_enrichment(id, &Enrichment::Rawg(sample_rawg()))
            .unwrap();
        // Second sync reports fewer fields; the old values must not linger.
        let sparse = RawgFields {
            id: Some(3498),
            name: Some("Grand Theft Auto V".into()),
            genres: vec![IdName {
                id: Some(4),
                name: "Action".into(),
                slug: None,
            }],
            ..Default::default()
        };
        t.store
            .update_enrichment(id, &Enrichment::Rawg(sparse))
            .unwrap();
        let record = t.store.get_by_id(id).unwrap().unwrap();
        assert_eq!(record.rawg.fields.metacritic, None);
        assert_eq!(record.rawg.fields.genres.len(), 1);
        assert!(record.rawg.fields.screenshots.is_empty());
        assert!(record.rawg.synced);
    }

    #[test]
    fn update_enrichment_unknown_id_reports_no_rows() {
        let t = TempStore::new();
        let hit = t
            .store
            .update_enrichment(9999, &Enrichment::Rawg(sample_rawg()))
            .unwrap();
        assert!(!hit);
    }

    #[test]
    fn malformed_json_column_reads_as_empty_list() {
        let t = TempStore::new();
        let (id, _) = t.store.add_game("Hades", None).unwrap();
        t.store
            .update_enrichment(id, &Enrichment::Rawg(sample_rawg()))
            .unwrap();
        // Simulate a partial/corrupted write directly.
        let conn = Connection::open(t.store.path()).unwrap();
        conn.execute(
            "UPDATE games SET rawg__genres = 'not valid json' WHERE id = ?1",
            params![id],
        )
        .unwrap();
        drop(conn);
        let record = t.store.get_by_id(id).unwrap().unwrap();
        assert!(record.rawg.fields.genres.is_empty());
        // Other columns are unaffected.
        assert_eq!(record.rawg.fields.screenshots.len(), 2);
    }

    #[test]
    fn multiplayer_counts_use_inferred_ranges() {
        let t = TempStore::new();
        let (a, _) = t.store.add_game("GTA V", None).unwrap();
        let (b, _) = t.store.add_game("Journey", None).unwrap();
        t.store
            .update_enrichment(a, &Enrichment::Rawg(sample_rawg()))
            .unwrap();
        let solo = RawgFields {
            local_players_min: Some(1),
            local_players_max: Some(1),
            ..Default::default()
        };
        t.store
            .update_enrichment(b, &Enrichment::Rawg(solo))
            .unwrap();
        assert_eq!(t.store.multiplayer_counts().unwrap(), (1, 1));
    }

    #[test]
    fn clear_all_empties_the_table() {
        let t = TempStore::new();
        t.store.add_game("Hades", None).unwrap();
        t.store.add_game("Celeste", None).unwrap();
        t.store.clear_all().unwrap();
        assert_eq!(t.store.count().unwrap(), 0);
    }
}
