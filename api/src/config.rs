use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://lyricslib.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 16;

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub public_base_url: String,
    pub max_connections: u32,
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            static_dir: PathBuf::from("./static"),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            secure_cookies: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address like 0.0.0.0:3001")?;

        let static_dir = lookup("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./static"));

        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?
                .max(1),
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let secure_cookies = match lookup("SECURE_COOKIES") {
            Some(raw) => parse_flag(&raw).context("SECURE_COOKIES must be true or false")?,
            None => false,
        };

        Ok(Self {
            database_url,
            bind_addr,
            static_dir,
            public_base_url,
            max_connections,
            secure_cookies,
        })
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("unrecognized flag value '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_addr.port(), 3001);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(!config.secure_cookies);
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("PUBLIC_BASE_URL", "https://lyrics.example/"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("SECURE_COOKIES", "yes"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.public_base_url, "https://lyrics.example");
        assert_eq!(config.max_connections, 4);
        assert!(config.secure_cookies);
    }

    #[test]
    fn rejects_bad_bind_addr() {
        assert!(Config::from_lookup(lookup_from(&[("BIND_ADDR", "nope")])).is_err());
    }
}
