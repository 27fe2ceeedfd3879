//! Connection configuration.

use serde::{Deserialize, Serialize};
use std::env;

/// Environment variable holding the store URL.
pub const URL_ENV: &str = "DB_URL";
/// Environment variable holding the database name.
pub const DATABASE_NAME_ENV: &str = "DB_NAME";

const DEFAULT_URL: &str = "mongodb://localhost:27017";
const DEFAULT_DATABASE_NAME: &str = "test";

/// Where and what to connect to.
///
/// Missing fields fall back to `mongodb://localhost:27017` and `test` when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Store connection string.
    pub url: String,
    /// Name of the database holding the collections.
    pub database_name: String,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database_name: database_name.into(),
        }
    }

    /// Reads `DB_URL` and `DB_NAME`, falling back to the defaults for unset variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            url: lookup(URL_ENV).unwrap_or(defaults.url),
            database_name: lookup(DATABASE_NAME_ENV).unwrap_or(defaults.database_name),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_database_name(mut self, database_name: impl Into<String>) -> Self {
        self.database_name = database_name.into();
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL, DEFAULT_DATABASE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let config = ConnectionConfig::from_lookup(|_| None);

        assert_eq!(config.url, "mongodb://localhost:27017");
        assert_eq!(config.database_name, "test");
    }

    #[test]
    fn variables_override_defaults() {
        let config = ConnectionConfig::from_lookup(|key| match key {
            "DB_NAME" => Some("inventory".to_string()),
            _ => None,
        });

        assert_eq!(config.url, "mongodb://localhost:27017");
        assert_eq!(config.database_name, "inventory");
    }

    #[test]
    fn partial_documents_deserialize_with_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{ "database_name": "inventory" }"#).unwrap();

        assert_eq!(config, ConnectionConfig::default().with_database_name("inventory"));
    }
}
