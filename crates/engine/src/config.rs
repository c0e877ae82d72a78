//! Source and store configuration files
//!
//! A source tree carries `.backup/config.toml` with two optional keys,
//! `store` (path, `~` honored) and `name` (project label). A store carries
//! the `.backup/store.toml` marker. Unknown keys are ignored in both.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of a source's `.backup/config.toml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    /// Path to the backup store, absolute or relative to the source root
    #[serde(default)]
    pub store: Option<String>,
    /// Project name; snapshots are grouped under this label in the store
    #[serde(default)]
    pub name: Option<String>,
}

/// Content written to a store's `.backup/store.toml` marker
pub const STORE_MARKER: &str = "store = \".\"\n";

pub fn load_source_config(path: &Path) -> Result<SourceConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

pub fn write_source_config(path: &Path, store: &str, name: &str) -> Result<()> {
    let content = format!("store = {:?}\nname = {:?}\n", store, name);
    std::fs::write(path, content)
        .with_context(|| format!("failed to write config {}", path.display()))
}

/// Expand a leading `~` to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home);
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "store = \"/backups/main\"\nname = \"website\"\n")?;

        let config = load_source_config(&path)?;
        assert_eq!(config.store.as_deref(), Some("/backups/main"));
        assert_eq!(config.name.as_deref(), Some("website"));
        Ok(())
    }

    #[test]
    fn test_load_config_ignores_unknown_keys() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "store = \".\"\nfuture_option = 42\n")?;

        let config = load_source_config(&path)?;
        assert_eq!(config.store.as_deref(), Some("."));
        assert!(config.name.is_none());
        Ok(())
    }

    #[test]
    fn test_load_config_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(load_source_config(&temp_dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("config.toml");

        write_source_config(&path, "../store", "docs")?;
        let config = load_source_config(&path)?;

        assert_eq!(config.store.as_deref(), Some("../store"));
        assert_eq!(config.name.as_deref(), Some("docs"));
        Ok(())
    }

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(expand_tilde("~"), PathBuf::from("/home/tester"));
        assert_eq!(
            expand_tilde("~/backups"),
            PathBuf::from("/home/tester/backups")
        );
        assert_eq!(expand_tilde("/absolute"), PathBuf::from("/absolute"));
        assert_eq!(expand_tilde("relative/path"), PathBuf::from("relative/path"));
    }
}
