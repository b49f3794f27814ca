use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

/// Source that produced the listing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListingConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Top-level listing settings. These decide which trees an engine covers and
/// how eagerly it starts working.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Root directories the engine scans and keeps watched. Each engine
    /// instance owns a disjoint set of roots.
    pub roots: Vec<PathBuf>,
    /// Ask the catalog for the persisted file-state snapshot and start a full
    /// scan as soon as the engine initializes.
    pub scan_at_startup: bool,
    /// Register OS watches while scanning so changed directories and files
    /// trigger scoped rescans. Watching is best-effort either way; with this
    /// off the engine only re-synchronizes on explicit refreshes.
    pub watch_for_changes: bool,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            scan_at_startup: true,
            watch_for_changes: true,
        }
    }
}

impl ListingConfig {
    /// Load listing configuration overrides using environment variables.
    /// Evaluation order:
    /// 1) `$MELODEX_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$MELODEX_CONFIG_JSON` (inline JSON),
    /// 3) `melodex.toml` in the working directory,
    /// 4) defaults if none is set.
    pub fn load_from_env() -> anyhow::Result<(Self, ListingConfigSource)> {
        if let Ok(path_str) = env::var("MELODEX_CONFIG_PATH")
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ListingConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var("MELODEX_CONFIG_JSON")
            && !raw.trim().is_empty()
        {
            let parsed =
                Self::parse_json(&raw).context("failed to parse MELODEX_CONFIG_JSON")?;
            return Ok((parsed, ListingConfigSource::EnvInline));
        }

        let default_file = PathBuf::from("melodex.toml");
        if default_file.is_file() {
            let config = Self::load_from_file(&default_file)?;
            return Ok((config, ListingConfigSource::File(default_file)));
        }

        Ok((Self::default(), ListingConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read listing config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents)
                .with_context(|| format!("invalid listing config {}", path.display())),
            Some("toml") | Some("tml") => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid listing config {}: {}", path.display(), err)),
            _ => Self::parse_json(&contents)
                .or_else(|_| toml::from_str(&contents).map_err(anyhow::Error::from))
                .with_context(|| {
                    format!(
                        "listing config {} is neither valid JSON nor TOML",
                        path.display()
                    )
                }),
        }
    }

    fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(anyhow::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ListingConfig::default();
        assert!(config.roots.is_empty());
        assert!(config.scan_at_startup);
        assert!(config.watch_for_changes);
    }

    #[test]
    fn test_parse_toml_overrides() {
        let raw = r#"
            roots = ["/srv/music", "/home/me/Music"]
            watch_for_changes = false
        "#;
        let config: ListingConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.roots.len(), 2);
        assert_eq!(config.roots[0], PathBuf::from("/srv/music"));
        assert!(config.scan_at_startup);
        assert!(!config.watch_for_changes);
    }

    #[test]
    fn test_parse_json_overrides() {
        let raw = r#"{ "roots": ["/srv/music"], "scan_at_startup": false }"#;
        let config = ListingConfig::parse_json(raw).unwrap();
        assert_eq!(config.roots, vec![PathBuf::from("/srv/music")]);
        assert!(!config.scan_at_startup);
    }

    #[test]
    fn test_load_from_file_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("melodex.toml");
        fs::write(&path, "roots = [\"/music\"]\n").unwrap();

        let config = ListingConfig::load_from_file(&path).unwrap();
        assert_eq!(config.roots, vec![PathBuf::from("/music")]);
    }
}
