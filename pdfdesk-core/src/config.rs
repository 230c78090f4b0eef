use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::cache::{DEFAULT_BUDGET_BYTES, DEFAULT_ZOOM_BUCKET_PERCENT};
use crate::undo::UndoManager;
use crate::viewport::{ViewMode, ViewportSettings};

/// Editor tunables, read from `config.toml` in the platform config directory.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    pub cache_budget_bytes: usize,
    pub zoom_bucket_percent: u32,
    pub lookahead_pages: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "scroll_debounce_ms")]
    pub scroll_debounce: Duration,
    pub undo_depth: usize,
    /// Render worker count; 0 picks one per core.
    pub render_threads: usize,
    pub page_gap: f32,
    pub view_mode: ViewMode,
    pub pdfium_library: Option<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: DEFAULT_BUDGET_BYTES,
            zoom_bucket_percent: DEFAULT_ZOOM_BUCKET_PERCENT,
            lookahead_pages: 1,
            scroll_debounce: Duration::from_millis(250),
            undo_depth: UndoManager::DEFAULT_DEPTH,
            render_threads: 0,
            page_gap: 8.0,
            view_mode: ViewMode::Continuous,
            pdfium_library: None,
        }
    }
}

impl EditorConfig {
    pub fn default_path(project_dirs: &ProjectDirs) -> PathBuf {
        project_dirs.config_dir().join("config.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config file {:?}", path))
    }

    /// Loads `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn viewport_settings(&self) -> ViewportSettings {
        ViewportSettings {
            page_gap: self.page_gap.max(0.0),
            lookahead_pages: self.lookahead_pages,
            scroll_debounce: self.scroll_debounce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = EditorConfig::load_or_default(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.cache_budget_bytes, 500 * 1024 * 1024);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "scroll_debounce_ms = 120\nview_mode = \"two_page\"\nzoom_bucket_percent = 10\n",
        )
        .unwrap();
        let config = EditorConfig::load(&path).unwrap();
        assert_eq!(config.scroll_debounce, Duration::from_millis(120));
        assert_eq!(config.view_mode, ViewMode::TwoPage);
        assert_eq!(config.zoom_bucket_percent, 10);
        assert_eq!(config.undo_depth, 200);
        assert_eq!(config.viewport_settings().lookahead_pages, 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "cache_budget = 3\n").unwrap();
        let err = EditorConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config file"));
    }
}
