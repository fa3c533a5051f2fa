use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::sync::SyncOptions;

pub const APP_DIR: &str = "tend";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub sync: SyncOptions,
    pub backup: BackupOptions,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackupOptions {
    /// How many backups `tend backup prune` keeps when no count is given.
    pub keep: usize,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self { keep: 10 }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// An explicit path must exist; the default location may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub(crate) fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Flag (or `TEND_DATA_DIR`) first, then the file, then the platform
    /// data directory.
    pub fn resolve_data_dir(&self, flag: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = flag {
            return Ok(expand_home(dir));
        }
        if let Some(dir) = &self.data_dir {
            return Ok(expand_home(dir));
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(ConfigError::NoDataDir)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    NoDataDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config '{}': {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config '{}': {}", path.display(), source)
            }
            ConfigError::NoDataDir => write!(
                f,
                "cannot determine a data directory; pass --data-dir or set TEND_DATA_DIR"
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::NoDataDir => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::path::{Path, PathBuf};

    use uuid::Uuid;

    use super::{Config, ConfigError};

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").expect("empty config should parse");
        assert_eq!(config, Config::default());
        assert!(!config.sync.enabled);
        assert!(config.sync.auto_commit);
        assert_eq!(config.sync.commit_message, "auto");
        assert_eq!(config.sync.debounce_ms, 2000);
        assert_eq!(config.backup.keep, 10);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
data_dir = "/srv/tend"

[sync]
enabled = true
auto_push = true
debounce_ms = 500

[backup]
keep = 3
"#,
        )
        .expect("config should parse");
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/tend")));
        assert!(config.sync.enabled);
        assert!(config.sync.auto_push);
        assert!(config.sync.auto_commit);
        assert!(!config.sync.pull_on_startup);
        assert_eq!(config.sync.debounce_ms, 500);
        assert_eq!(config.backup.keep, 3);
    }

    #[test]
    fn data_dir_precedence_is_flag_then_file() {
        let config = Config {
            data_dir: Some(PathBuf::from("/from/file")),
            ..Config::default()
        };
        assert_eq!(
            config
                .resolve_data_dir(Some(Path::new("/from/flag")))
                .expect("flag should resolve"),
            PathBuf::from("/from/flag")
        );
        assert_eq!(
            config.resolve_data_dir(None).expect("file should resolve"),
            PathBuf::from("/from/file")
        );
    }

    #[test]
    fn explicit_missing_or_invalid_file_is_an_error() {
        let root = std::env::temp_dir().join(format!("tend-config-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("workspace should be creatable");

        let missing = Config::load(Some(&root.join("nope.toml"))).expect_err("missing file");
        assert!(matches!(missing, ConfigError::Io { .. }));
        assert!(missing.source().is_some());

        let bad = root.join("bad.toml");
        std::fs::write(&bad, "[sync]\nenabled = \"yes\"\n").expect("bad config should write");
        let invalid = Config::load(Some(&bad)).expect_err("invalid file");
        assert!(matches!(invalid, ConfigError::Parse { .. }));
        assert!(invalid.to_string().contains("invalid config"));

        let _ = std::fs::remove_dir_all(root);
    }
}
