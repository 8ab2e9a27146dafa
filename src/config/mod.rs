use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::search::SortMode;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "ReturnDeadlines";
const APP_NAME: &str = "return-deadlines";

pub const CONFIG_ENV: &str = "RETURN_DEADLINES_CONFIG";
pub const DATA_ENV: &str = "RETURN_DEADLINES_DATA";

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_LOCAL_FILE: &str = "return-deadlines.json";
const DEFAULT_LEGACY_FILE: &str = "return-deadline-tracker.v1.json";
const DEFAULT_EXPORT_FILE: &str = "return-deadlines.csv";

/// Written on first run. Must parse to [`AppConfig::default`].
const DEFAULT_CONFIG_TOML: &str = r#"# return-deadlines configuration

# Order for `list`: due-asc, due-desc, purchase-asc, purchase-desc or store.
default_sort = "due-asc"
# Show returned purchases without passing --all.
include_returned = false

[remote]
# JSON endpoint answering GET with {"ok": true, "items": [...]} and accepting
# POST {"items": [...]}. Unset keeps records on this machine only.
# endpoint = "https://example.invalid/api/returns"
timeout_ms = 3000

[storage]
# Relative paths resolve against the data directory.
local_file = "return-deadlines.json"
legacy_file = "return-deadline-tracker.v1.json"

[export]
file_name = "return-deadlines.csv"
"#;

/// Explicit locations from the command line. Each one wins over its
/// environment variable.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// A `.toml` path names the config file; anything else is a directory.
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            config: env::var_os(CONFIG_ENV).map(PathBuf::from),
            data_dir: env::var_os(DATA_ENV).map(PathBuf::from),
        }
    }

    /// Fills unset fields from `fallback`.
    pub fn or(self, fallback: Overrides) -> Self {
        Self {
            config: self.config.or(fallback.config),
            data_dir: self.data_dir.or(fallback.data_dir),
        }
    }
}

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    /// Resolves paths from `overrides`, then the environment, then the
    /// platform directories.
    pub fn discover(overrides: Overrides) -> Result<Self> {
        let paths = ConfigPaths::discover(overrides.or(Overrides::from_env()))?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Loads the config file, writing the commented default first when there
    /// is none.
    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            fs::write(&self.paths.config_file, DEFAULT_CONFIG_TOML).with_context(|| {
                format!("writing default config {}", self.paths.config_file.display())
            })?;
            tracing::info!(path = %self.paths.config_file.display(), "wrote default config");
        }
        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config {}", self.paths.config_file.display()))?;
        cfg.post_load(&self.paths);
        Ok(cfg)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover(overrides: Overrides) -> Result<Self> {
        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving platform directories")?;
        Ok(Self::resolve(
            overrides,
            project_dirs.config_dir(),
            project_dirs.data_dir(),
        ))
    }

    fn resolve(overrides: Overrides, default_config_dir: &Path, default_data_dir: &Path) -> Self {
        let (config_dir, config_file) = match overrides.config {
            Some(path) if path.extension().map_or(false, |ext| ext == "toml") => {
                let dir = path
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
                (dir, path)
            }
            Some(dir) => (dir.clone(), dir.join(CONFIG_FILE_NAME)),
            None => (
                default_config_dir.to_path_buf(),
                default_config_dir.join(CONFIG_FILE_NAME),
            ),
        };
        Self {
            config_dir,
            config_file,
            data_dir: overrides
                .data_dir
                .unwrap_or_else(|| default_data_dir.to_path_buf()),
        }
    }

    /// Paths rooted under a single directory.
    pub fn rooted(root: &Path) -> Self {
        Self::resolve(Overrides::default(), &root.join("config"), &root.join("data"))
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub default_sort: SortMode,
    pub include_returned: bool,
    pub remote: RemoteOptions,
    pub storage: StorageOptions,
    pub export: ExportOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_sort: SortMode::DueAsc,
            include_returned: false,
            remote: RemoteOptions::default(),
            storage: StorageOptions::default(),
            export: ExportOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) {
        self.storage.resolve(paths);
        self.remote.sanitize();
        if self.export.file_name.trim().is_empty() {
            self.export.file_name = DEFAULT_EXPORT_FILE.to_string();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteOptions {
    /// JSON endpoint answering GET with `{ok, items}` and accepting POST
    /// `{items}`. Unset means local-only.
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RemoteOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn sanitize(&mut self) {
        if self
            .endpoint
            .as_deref()
            .map(|url| url.trim().is_empty())
            .unwrap_or(false)
        {
            self.endpoint = None;
        }
        if self.timeout_ms == 0 {
            tracing::warn!(
                default_ms = DEFAULT_TIMEOUT_MS,
                "remote timeout of 0 ms in config, using default"
            );
            self.timeout_ms = DEFAULT_TIMEOUT_MS;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    pub local_file: PathBuf,
    /// Slot written by older releases, adopted once when the primary load
    /// comes back empty.
    pub legacy_file: PathBuf,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            local_file: PathBuf::from(DEFAULT_LOCAL_FILE),
            legacy_file: PathBuf::from(DEFAULT_LEGACY_FILE),
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.local_file.as_os_str().is_empty() {
            self.local_file = PathBuf::from(DEFAULT_LOCAL_FILE);
        }
        if self.legacy_file.as_os_str().is_empty() {
            self.legacy_file = PathBuf::from(DEFAULT_LEGACY_FILE);
        }
        if self.local_file.is_relative() {
            self.local_file = paths.data_dir.join(&self.local_file);
        }
        if self.legacy_file.is_relative() {
            self.legacy_file = paths.data_dir.join(&self.legacy_file);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub file_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_EXPORT_FILE.to_string(),
        }
    }
}
