use anyhow::{Context, Result};
use game_shelf::api::handlers::AppState;
use game_shelf::api::server::ApiServer;
use game_shelf::store::Store;
use game_shelf::util::env as env_util;
use tracing::info;

#[actix_web::main]
async fn main() -> Result<()> {
    env_util::init_env();
    game_shelf::tracing::init_tracing("info,actix_web=warn")?;

    let db_path = env_util::env_opt("LIBRARY_DB_PATH")
        .unwrap_or_else(|| "data/library.db".to_string());
    let store = Store::open(&db_path)
        .with_context(|| format!("opening library database at {db_path}"))?;
    info!(games = store.count().unwrap_or(0), db = %db_path, "library database ready");

    let server = ApiServer::from_env()?;
    server.run(AppState::new(store)).await
}
