use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root the public/ tree hangs off.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Drop zone the dispatcher observes, relative to `root`.
    #[serde(default = "default_watch_dir")]
    pub watch_dir: String,

    /// Worker pool size; 0 means the CPU count.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Skip all persistence and archival; just list (or simulate-OCR) files.
    #[serde(default)]
    pub dry_run: bool,

    /// In dry-run: actually run OCR to show potential amounts.
    #[serde(default)]
    pub simulate_ocr: bool,

    /// Per-file debug logging.
    #[serde(default)]
    pub verbose: bool,

    /// Profile to attribute newly discovered files to. When absent the
    /// admin user's profile is resolved at startup.
    #[serde(default)]
    pub profile_id: Option<i64>,

    /// Updater tool: minimum confidence to accept a re-OCR result.
    #[serde(default = "default_min_conf")]
    pub min_conf: f64,

    /// SQLite database path; ":memory:" for ephemeral runs.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Tesseract language(s), e.g. "eng" or "eng+ind".
    #[serde(default = "default_ocr_lang")]
    pub ocr_lang: String,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_watch_dir() -> String {
    "public/keu".to_string()
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_min_conf() -> f64 {
    0.12
}

fn default_database_path() -> String {
    "catatkeu.db".to_string()
}

fn default_ocr_lang() -> String {
    "eng".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            watch_dir: default_watch_dir(),
            workers: default_workers(),
            dry_run: false,
            simulate_ocr: false,
            verbose: false,
            profile_id: None,
            min_conf: default_min_conf(),
            database_path: default_database_path(),
            ocr_lang: default_ocr_lang(),
        }
    }
}

impl Config {
    /// Absolute-ish path of the watched directory.
    pub fn watch_path(&self) -> PathBuf {
        self.root.join(&self.watch_dir)
    }

    /// Worker count with the CPU-count default applied.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.watch_dir, "public/keu");
        assert_eq!(config.min_conf, 0.12);
        assert_eq!(config.ocr_lang, "eng");
        assert!(config.effective_workers() >= 1);
        assert!(config.profile_id.is_none());
        assert!(!config.dry_run);
    }

    #[test]
    fn test_watch_path_joins_root() {
        let mut config = Config::default();
        config.root = PathBuf::from("/srv/app");
        assert_eq!(config.watch_path(), PathBuf::from("/srv/app/public/keu"));
    }

    #[test]
    fn test_zero_workers_falls_back_to_cpu_count() {
        let mut config = Config::default();
        config.workers = 0;
        assert!(config.effective_workers() >= 1);
        config.workers = 3;
        assert_eq!(config.effective_workers(), 3);
    }
}
