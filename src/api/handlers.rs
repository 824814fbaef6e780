// HTTP request handlers for API endpoints

use crate::api::models::*;
use crate::importer::{self, BrowserSession, ImporterConfig};
use crate::store::{Source, Store};
use crate::sync::igdb::IgdbClient;
use crate::sync::rawg::RawgClient;
use crate::sync::{self, CatalogClient};
use crate::tasks::{TaskKind, TaskLog, TaskRegistry};
use actix_web::{web, HttpResponse, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub tasks: Arc<TaskRegistry>,
    /// Slot for the interactive import browser between the open and run
    /// phases. At most one session at a time.
    pub browser: Arc<Mutex<Option<Arc<BrowserSession>>>>,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            tasks: Arc::new(TaskRegistry::new()),
            browser: Arc::new(Mutex::new(None)),
        }
    }
}

/// Catalog clients are built per request from the environment so credential
/// problems surface as API errors instead of boot failures.
fn catalog_client(source: Source) -> anyhow::Result<Box<dyn CatalogClient>> {
    Ok(match source {
        Source::Rawg => Box::new(RawgClient::from_env()?),
        Source::Igdb => Box::new(IgdbClient::from_env()?),
    })
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::<()>::error(message))
}

fn internal_error(err: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::InternalServerError().json(ApiResponse::<()>::error(format!("{err:#}")))
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let db_status = match state.store.count() {
        Ok(_) => "connected",
        Err(_) => "error",
    };
    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
    });
    Ok(HttpResponse::Ok().json(response))
}

/// Full library listing, enrichment blocks included
pub async fn list_games(state: web::Data<AppState>) -> Result<HttpResponse> {
    match state.store.get_all() {
        Ok(games) => Ok(HttpResponse::Ok().json(ApiResponse::success(games))),
        Err(err) => Ok(internal_error(err)),
    }
}

/// Single record by id
pub async fn get_game(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let id = path.into_inner();
    match state.store.get_by_id(id) {
        Ok(Some(game)) => Ok(HttpResponse::Ok().json(ApiResponse::success(game))),
        Ok(None) => Ok(HttpResponse::NotFound()
            .json(ApiResponse::<()>::error(format!("no game with id {id}")))),
        Err(err) => Ok(internal_error(err)),
    }
}

/// Add a title manually, attached to a caller-chosen catalog match. The
/// enrichment runs inline since it is a single record.
pub async fn create_game(
    state: web::Data<AppState>,
    payload: web::Json<CreateGameRequest>,
) -> Result<HttpResponse> {
    let Some(source) = Source::from_slug(&payload.source) else {
        return Ok(bad_request(format!("unknown source '{}'", payload.source)));
    };
    let client = match catalog_client(source) {
        Ok(client) => client,
        Err(err) => return Ok(internal_error(err)),
    };
    let (id, was_new) = match state.store.add_game(&payload.title, None) {
        Ok(added) => added,
        Err(err) => return Ok(bad_request(format!("{err:#}"))),
    };

    let log = TaskLog::default();
    let synced = sync::sync_from_remote(client.as_ref(), &state.store, id, payload.remote_id, &log).await;
    match state.store.get_by_id(id) {
        Ok(Some(game)) => Ok(HttpResponse::Created().json(ApiResponse::success(json!({
            "game": game,
            "new": was_new,
            "synced": synced,
            "logs": log.snapshot(),
        })))),
        Ok(None) => Ok(internal_error("record vanished after insert")),
        Err(err) => Ok(internal_error(err)),
    }
}

/// Re-run enrichment for one record against one source
pub async fn resync_game(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    payload: web::Json<ResyncRequest>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let Some(source) = Source::from_slug(&payload.source) else {
        return Ok(bad_request(format!("unknown source '{}'", payload.source)));
    };
    let game = match state.store.get_by_id(id) {
        Ok(Some(game)) => game,
        Ok(None) => {
            return Ok(HttpResponse::NotFound()
                .json(ApiResponse::<()>::error(format!("no game with id {id}"))))
        }
        Err(err) => return Ok(internal_error(err)),
    };
    let client = match catalog_client(source) {
        Ok(client) => client,
        Err(err) => return Ok(internal_error(err)),
    };

    let log = TaskLog::default();
    let synced = sync::sync_one(client.as_ref(), &state.store, id, &game.title, &log).await;
    match state.store.get_by_id(id) {
        Ok(Some(game)) => Ok(HttpResponse::Ok().json(ApiResponse::success(json!({
            "game": game,
            "synced": synced,
            "logs": log.snapshot(),
        })))),
        Ok(None) => Ok(internal_error("record vanished during resync")),
        Err(err) => Ok(internal_error(err)),
    }
}

/// Dashboard counters
pub async fn get_stats(state: web::Data<AppState>) -> Result<HttpResponse> {
    let stats = (|| -> anyhow::Result<StatsResponse> {
        let (local, online) = state.store.multiplayer_counts()?;
        Ok(StatsResponse {
            total_games: state.store.count()?,
            rawg_synced: state.store.synced_count(Source::Rawg)?,
            igdb_synced: state.store.synced_count(Source::Igdb)?,
            local_multiplayer: local,
            online_multiplayer: online,
        })
    })();
    match stats {
        Ok(stats) => Ok(HttpResponse::Ok().json(ApiResponse::success(stats))),
        Err(err) => Ok(internal_error(err)),
    }
}

/// Free-text candidate search against one catalog
pub async fn search_catalog(
    path: web::Path<String>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let Some(source) = Source::from_slug(&slug) else {
        return Ok(bad_request(format!("unknown source '{slug}'")));
    };
    if query.q.trim().is_empty() {
        return Ok(bad_request("query parameter 'q' must not be empty"));
    }
    let client = match catalog_client(source) {
        Ok(client) => client,
        Err(err) => return Ok(internal_error(err)),
    };
    match client.search(query.q.trim()).await {
        Ok(hits) => Ok(HttpResponse::Ok().json(ApiResponse::success(hits))),
        Err(err) => Ok(internal_error(err)),
    }
}

/// Import phase one: launch the browser on the storefront for interactive
/// login. Runs as a background task (chromedriver startup is slow); the
/// session is parked in state until `/import/run`. Both phases share the
/// import task category since they are strictly sequential.
pub async fn import_open(state: web::Data<AppState>) -> Result<HttpResponse> {
    if state.browser.lock().await.is_some() {
        return Ok(bad_request(
            "a browser session is already open; run the import or restart",
        ));
    }

    let config = ImporterConfig::from_env();
    let slot = Arc::clone(&state.browser);
    let accepted = state.tasks.spawn(TaskKind::Import, move |log| async move {
        match importer::open_session(&config, &log).await {
            Ok(session) => {
                let session_id = session.id().to_string();
                *slot.lock().await = Some(Arc::new(session));
                json!({
                    "success": true,
                    "session_id": session_id,
                    "message": "browser opened; log in, then call /api/import/run",
                })
            }
            Err(err) => {
                log.push(format!("[error] browser open failed: {err:#}"));
                json!({ "success": false, "error": format!("{err:#}") })
            }
        }
    });

    if !accepted {
        return Ok(bad_request("an import task is already running"));
    }
    Ok(HttpResponse::Accepted().json(ApiResponse::success(json!({
        "message": "browser opening; poll /api/tasks/import/status",
    }))))
}

/// Import phase two: walk the purchase history in a background task. The
/// session is closed and the slot cleared when the run finishes.
pub async fn import_run(state: web::Data<AppState>) -> Result<HttpResponse> {
    let session = match state.browser.lock().await.as_ref() {
        Some(session) => Arc::clone(session),
        None => {
            return Ok(bad_request(
                "no open browser session; call /api/import/open first",
            ))
        }
    };

    let config = ImporterConfig::from_env();
    let store = state.store.clone();
    let slot = Arc::clone(&state.browser);
    let accepted = state.tasks.spawn(TaskKind::Import, move |log| async move {
        let outcome = importer::run_extraction(&session, &config, &store, &log).await;
        if let Err(err) = session.close().await {
            log.push(format!("[warn] browser session close failed: {err:#}"));
        }
        slot.lock().await.take();
        serde_json::to_value(&outcome).unwrap_or_else(|err| {
            json!({ "success": false, "error": format!("outcome serialization failed: {err}") })
        })
    });

    if !accepted {
        return Ok(bad_request("import is already running"));
    }
    Ok(HttpResponse::Accepted().json(ApiResponse::success(json!({
        "message": "import started; poll /api/tasks/import/status",
    }))))
}

/// Kick off a batch enrichment run for one source
pub async fn start_sync(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: Option<web::Json<SyncRequest>>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let Some(source) = Source::from_slug(&slug) else {
        return Ok(bad_request(format!("unknown source '{slug}'")));
    };
    let kind = match source {
        Source::Rawg => TaskKind::RawgSync,
        Source::Igdb => TaskKind::IgdbSync,
    };
    let force_resync = payload.map(|p| p.force_resync).unwrap_or(false);

    // Fail fast on missing credentials before claiming the task slot.
    let client = match catalog_client(source) {
        Ok(client) => client,
        Err(err) => return Ok(internal_error(err)),
    };

    let store = state.store.clone();
    let accepted = state.tasks.spawn(kind, move |log| async move {
        match sync::sync_library(client.as_ref(), &store, force_resync, &log).await {
            Ok(summary) => json!({
                "success": true,
                "synced": summary.synced,
                "failed": summary.failed,
                "total": summary.total,
            }),
            Err(err) => {
                log.push(format!("[error] sync aborted: {err:#}"));
                json!({ "success": false, "error": format!("{err:#}") })
            }
        }
    });

    if !accepted {
        return Ok(bad_request(format!("{} sync is already running", source.display_name())));
    }
    Ok(HttpResponse::Accepted().json(ApiResponse::success(json!({
        "message": format!("{} sync started; poll /api/tasks/{}/status", source.display_name(), kind.slug()),
        "force_resync": force_resync,
    }))))
}

/// Poll one task category's running flag, log buffer and final result
pub async fn task_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let Some(kind) = TaskKind::from_slug(&slug) else {
        return Ok(bad_request(format!("unknown task category '{slug}'")));
    };
    let status = state.tasks.handle(kind).status();
    Ok(HttpResponse::Ok().json(ApiResponse::success(status)))
}

/// Drop one task category's log and result without touching a live run
pub async fn task_clear(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let Some(kind) = TaskKind::from_slug(&slug) else {
        return Ok(bad_request(format!("unknown task category '{slug}'")));
    };
    state.tasks.handle(kind).clear();
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "cleared": kind.slug() }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::path::PathBuf;
    use std::time::Duration;

    fn temp_store() -> (Store, PathBuf) {
        let path = std::env::temp_dir().join(format!("game-shelf-api-{}.db", uuid::Uuid::new_v4()));
        (Store::open(&path).expect("temp store"), path)
    }

    #[actix_web::test]
    async fn import_open_runs_in_background_and_reports_through_task_status() {
        let (store, path) = temp_store();
        let state = AppState::new(store);
        // Point the session launch at a closed port so it fails fast.
        std::env::set_var("WEBDRIVER_URL", "http://127.0.0.1:9");
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes::configure_routes),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/import/open").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let handle = state.tasks.handle(TaskKind::Import);
        for _ in 0..200 {
            if !handle.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let status = handle.status();
        assert!(!status.running, "open step should finish on its own");
        let result = status.result.expect("open step publishes a result");
        assert_eq!(result["success"], json!(false));
        assert!(state.browser.lock().await.is_none());

        std::env::remove_var("WEBDRIVER_URL");
        let _ = std::fs::remove_file(path);
    }

    #[actix_web::test]
    async fn import_run_without_open_session_is_rejected() {
        let (store, path) = temp_store();
        let state = AppState::new(store);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes::configure_routes),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/import/run").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let _ = std::fs::remove_file(path);
    }
}
