//! Extension de partyconfig pour le backend GraphQL
//!
//! Les getters persistent la valeur par défaut dans la configuration si
//! elle n'existe pas encore.
//!
//! ```no_run
//! use partyconfig::get_config;
//! use partygql::GraphqlConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! println!("GraphQL endpoint: {}", config.get_graphql_http_url()?);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use partyconfig::Config;
use serde_yaml::Value;

use crate::client::{DEFAULT_HTTP_URL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_WS_URL};

/// Trait d'extension pour la configuration du serveur GraphQL
pub trait GraphqlConfigExt {
    /// URL HTTP des queries et mutations
    fn get_graphql_http_url(&self) -> Result<String>;

    fn set_graphql_http_url(&self, url: String) -> Result<()>;

    /// URL WebSocket des subscriptions (`ws://` ou `wss://`)
    fn get_graphql_ws_url(&self) -> Result<String>;

    fn set_graphql_ws_url(&self, url: String) -> Result<()>;

    /// Timeout des requêtes, en secondes
    fn get_graphql_timeout_secs(&self) -> Result<u64>;

    fn set_graphql_timeout_secs(&self, secs: u64) -> Result<()>;
}

impl GraphqlConfigExt for Config {
    fn get_graphql_http_url(&self) -> Result<String> {
        match self.get_value(&["backend", "http_url"]) {
            Ok(Value::String(url)) if !url.trim().is_empty() => Ok(url),
            _ => {
                self.set_graphql_http_url(DEFAULT_HTTP_URL.to_string())?;
                Ok(DEFAULT_HTTP_URL.to_string())
            }
        }
    }

    fn set_graphql_http_url(&self, url: String) -> Result<()> {
        self.set_value(&["backend", "http_url"], Value::String(url))
    }

    fn get_graphql_ws_url(&self) -> Result<String> {
        match self.get_value(&["backend", "ws_url"]) {
            Ok(Value::String(url)) if !url.trim().is_empty() => Ok(url),
            _ => {
                self.set_graphql_ws_url(DEFAULT_WS_URL.to_string())?;
                Ok(DEFAULT_WS_URL.to_string())
            }
        }
    }

    fn set_graphql_ws_url(&self, url: String) -> Result<()> {
        self.set_value(&["backend", "ws_url"], Value::String(url))
    }

    fn get_graphql_timeout_secs(&self) -> Result<u64> {
        match self.get_value(&["backend", "timeout_secs"]) {
            Ok(Value::Number(n)) if n.as_u64().is_some_and(|secs| secs > 0) => {
                Ok(n.as_u64().unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
            }
            _ => {
                self.set_graphql_timeout_secs(DEFAULT_REQUEST_TIMEOUT_SECS)?;
                Ok(DEFAULT_REQUEST_TIMEOUT_SECS)
            }
        }
    }

    fn set_graphql_timeout_secs(&self, secs: u64) -> Result<()> {
        self.set_value(
            &["backend", "timeout_secs"],
            Value::Number(serde_yaml::Number::from(secs)),
        )
    }
}
