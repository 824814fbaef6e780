//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    init_env();
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("GAME_SHELF_TEST_PARSE", "not-a-number");
        assert_eq!(env_parse("GAME_SHELF_TEST_PARSE", 42u64), 42);
        std::env::set_var("GAME_SHELF_TEST_PARSE", "7");
        assert_eq!(env_parse("GAME_SHELF_TEST_PARSE", 42u64), 7);
        std::env::remove_var("GAME_SHELF_TEST_PARSE");
    }

    #[test]
    fn env_opt_treats_blank_as_unset() {
        std::env::set_var("GAME_SHELF_TEST_BLANK", "   ");
        assert_eq!(env_opt("GAME_SHELF_TEST_BLANK"), None);
        std::env::remove_var("GAME_SHELF_TEST_BLANK");
    }
}
