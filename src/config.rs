use std::str::FromStr;

/// Where bookings live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store, optionally provisioned from a JSON seed file.
    Memory { seed: Option<String> },
    /// A Postgres database reached through `tokio-postgres`.
    Postgres { url: String },
}

/// Server settings, read from `BARBERSLOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub password: String,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    pub backend: StoreBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5434,
            password: "barberslot".into(),
            max_connections: 256,
            metrics_port: None,
            backend: StoreBackend::Memory { seed: None },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable numbers fall back to
    /// their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let backend = match get("BARBERSLOT_DATABASE_URL").filter(|s| !s.is_empty()) {
            Some(url) => StoreBackend::Postgres { url },
            None => StoreBackend::Memory {
                seed: get("BARBERSLOT_SEED").filter(|s| !s.is_empty()),
            },
        };
        Self {
            bind: get("BARBERSLOT_BIND").unwrap_or(defaults.bind),
            port: parsed(&get, "BARBERSLOT_PORT").unwrap_or(defaults.port),
            password: get("BARBERSLOT_PASSWORD").unwrap_or(defaults.password),
            max_connections: parsed(&get, "BARBERSLOT_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            metrics_port: parsed(&get, "BARBERSLOT_METRICS_PORT"),
            backend,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|s| s.trim().parse().ok())
}
