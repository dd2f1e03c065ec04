//! # partyconfig
//!
//! Configuration management for the party synchronization workspace:
//! - Loading configuration from a YAML file
//! - Merging it with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for configuration values
//! - Thread-safe singleton access
//!
//! ## Usage
//!
//! ```no_run
//! use partyconfig::get_config;
//!
//! let config = get_config();
//! let site = config.get_site_host_fragment();
//! let user = config.get_user_id()?;
//! println!("{user} watches parties on {site}");
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;
use uuid::Uuid;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("partysync.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load partysync configuration"));
}

const ENV_CONFIG_DIR: &str = "PARTYSYNC_CONFIG";
const ENV_PREFIX: &str = "PARTYSYNC_CONFIG__";
const CONFIG_DIR_NAME: &str = ".partysync";

const DEFAULT_SITE_HOST_FRAGMENT: &str = "youtube";
const DEFAULT_SITE_BASE_URL: &str = "https://www.youtube.com";
const DEFAULT_LOG_BUFFER_CAPACITY: usize = 500;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Generates a getter/setter pair for usize values with a default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path)? {
                Value::Number(n) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                Value::String(s) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: usize) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Generates a getter/setter pair for bool values with a default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path)? {
                Value::Bool(b) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Generates a getter/setter pair for string values with a default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.trim().is_empty() => s,
                Ok(_) | Err(_) => $default.to_string(),
            }
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Configuration manager
///
/// Holds the merged YAML tree and the path of the `config.yaml` file it is
/// saved to. Every setter persists the whole tree immediately.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().unwrap().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PARTYSYNC_CONFIG` environment variable
    /// 3. `.partysync` in the current directory
    /// 4. `.partysync` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external `config.yaml` file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Directory holding `config.yaml` and the managed sub-directories
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// `path` is an array of keys, e.g. `&["site", "base_url"]`.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a path relative to the config directory and creates it if needed
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let path = Path::new(dir_path);

        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created managed directory");
        }

        Ok(absolute_path.to_string_lossy().to_string())
    }

    /// Returns a directory managed by the configuration
    ///
    /// The directory may be absolute or relative to the configuration
    /// directory. It is created when missing, and `default` is written back
    /// when the key is not configured.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    /// Sets a directory managed by the configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Returns the identity of the local user, generating one on first use
    ///
    /// The id is a UUID v4 persisted under `party.user_id`, so the same
    /// browser instance keeps the same identity across restarts.
    pub fn get_user_id(&self) -> Result<String> {
        let path = &["party", "user_id"];
        match self.get_value(path) {
            Ok(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
            _ => {
                let new_id = Uuid::new_v4().to_string();
                self.set_value(path, Value::String(new_id.clone()))?;
                info!(user_id = %new_id, "Generated local user identity");
                Ok(new_id)
            }
        }
    }

    /// Overrides the identity of the local user
    pub fn set_user_id(&self, user_id: String) -> Result<()> {
        self.set_value(&["party", "user_id"], Value::String(user_id.trim().to_string()))
    }

    impl_string_config!(
        get_site_host_fragment,
        set_site_host_fragment,
        &["site", "host_fragment"],
        DEFAULT_SITE_HOST_FRAGMENT
    );

    impl_string_config!(
        get_site_base_url,
        set_site_base_url,
        &["site", "base_url"],
        DEFAULT_SITE_BASE_URL
    );

    impl_usize_config!(
        get_log_cache_size,
        set_log_cache_size,
        &["host", "logger", "buffer_capacity"],
        DEFAULT_LOG_BUFFER_CAPACITY
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Minimum log level (`ERROR`, `WARN`, `INFO`, `DEBUG`, `TRACE`)
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"])? {
            Value::String(s) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Returns the global configuration instance, loaded on first access
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges an external YAML tree into the default one
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_are_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);

        assert_eq!(config.get_site_host_fragment(), "youtube");
        assert_eq!(config.get_site_base_url(), "https://www.youtube.com");
        assert_eq!(config.get_log_cache_size().unwrap(), 500);
        assert!(config.get_log_enable_console().unwrap());
        assert_eq!(config.get_log_min_level().unwrap(), "INFO");
        assert!(dir.path().join("config.yaml").exists());
    }

    #[test]
    fn test_external_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "site:\n  host_fragment: vimeo\n",
        )
        .unwrap();

        let config = load(&dir);
        assert_eq!(config.get_site_host_fragment(), "vimeo");
        // untouched keys keep their default
        assert_eq!(config.get_site_base_url(), "https://www.youtube.com");
    }

    #[test]
    fn test_user_id_is_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = load(&dir).get_user_id().unwrap();
        assert!(Uuid::parse_str(&first).is_ok());

        let second = load(&dir).get_user_id().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_set_value_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);
        config.set_log_cache_size(42).unwrap();
        config.set_site_base_url("https://example.org".into()).unwrap();

        let reloaded = load(&dir);
        assert_eq!(reloaded.get_log_cache_size().unwrap(), 42);
        assert_eq!(reloaded.get_site_base_url(), "https://example.org");
    }

    #[test]
    fn test_managed_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);
        let managed = config
            .get_managed_dir(&["party", "store", "directory"], "party")
            .unwrap();
        assert!(Path::new(&managed).is_dir());
        assert!(managed.starts_with(dir.path().to_str().unwrap()));
    }

    #[test]
    fn test_merge_yaml_replaces_scalars() {
        let mut base: Value = serde_yaml::from_str("a: 1\nb:\n  c: 2\n  d: 3\n").unwrap();
        let ext: Value = serde_yaml::from_str("b:\n  c: 5\ne: x\n").unwrap();
        merge_yaml(&mut base, &ext);

        let config_value = Config::lower_keys_value(base);
        assert_eq!(
            Config::get_value_internal(&config_value, &["b", "c"]).unwrap(),
            Value::Number(Number::from(5))
        );
        assert_eq!(
            Config::get_value_internal(&config_value, &["b", "d"]).unwrap(),
            Value::Number(Number::from(3))
        );
        assert!(Config::get_value_internal(&config_value, &["missing"]).is_err());
    }
}
