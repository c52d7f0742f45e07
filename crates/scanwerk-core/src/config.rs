// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ScanwerkError};
use crate::retry::RetryConfig;
use crate::types::ExportConfig;

/// File name of the persisted configuration inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default per-owner remote storage quota (1 GiB).
pub const DEFAULT_QUOTA_BYTES: u64 = 1024 * 1024 * 1024;

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// User id new documents are filed under.
    pub owner: String,
    /// Export settings used when the caller does not override them.
    pub export: ExportConfig,
    pub assembler: AssemblerConfig,
    pub ocr: OcrConfig,
    pub sync: SyncConfig,
    pub assistant: AssistantConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            owner: "local".into(),
            export: ExportConfig::default(),
            assembler: AssemblerConfig::default(),
            ocr: OcrConfig::default(),
            sync: SyncConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

/// Layout analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Fraction of the smaller fragment height two fragments must overlap
    /// vertically to share a line.
    pub line_overlap: f32,
    /// Language assumed when the OCR result carries none.
    pub language_hint: Option<String>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            line_overlap: 0.5,
            language_hint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Per-call timeout.
    pub timeout_secs: u64,
    /// Fragments below this confidence are discarded.
    pub min_confidence: f32,
    pub retry: RetryConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            min_confidence: 0.0,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub retry: RetryConfig,
    /// Remote storage allowance per owner.
    pub quota_bytes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            quota_bytes: DEFAULT_QUOTA_BYTES,
        }
    }
}

/// Language-assistant endpoint settings. The key itself is never stored;
/// only the name of the environment variable holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            model: "gpt-3.5-turbo".into(),
            api_key_env: "SCANWERK_ASSISTANT_KEY".into(),
            timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load `config.json` from `data_dir`, falling back to defaults when the
    /// file does not exist yet.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(json) => {
                let config: AppConfig = serde_json::from_str(&json)?;
                config.validate()?;
                info!(path = %path.display(), "configuration loaded");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "no configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        self.validate()?;
        std::fs::create_dir_all(data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(data_dir.join(CONFIG_FILE_NAME), json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.assembler.line_overlap) {
            return Err(ScanwerkError::Config(format!(
                "assembler.line_overlap must be within [0, 1], got {}",
                self.assembler.line_overlap
            )));
        }
        if !(0.0..=1.0).contains(&self.ocr.min_confidence) {
            return Err(ScanwerkError::Config(format!(
                "ocr.min_confidence must be within [0, 1], got {}",
                self.ocr.min_confidence
            )));
        }
        if self.export.dpi <= 0.0 {
            return Err(ScanwerkError::Config("export.dpi must be positive".into()));
        }
        if self.owner.trim().is_empty() {
            return Err(ScanwerkError::Config("owner cannot be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig::load(dir.path()).expect("load");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.sync.quota_bytes, DEFAULT_QUOTA_BYTES);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.owner = "alice".into();
        config.assembler.language_hint = Some("de".into());
        config.save(dir.path()).expect("save");

        let loaded = AppConfig::load(dir.path()).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{"owner":"bob"}"#)
            .expect("write");
        let loaded = AppConfig::load(dir.path()).expect("load");
        assert_eq!(loaded.owner, "bob");
        assert_eq!(loaded.assembler.line_overlap, 0.5);
    }

    #[test]
    fn out_of_range_overlap_is_rejected() {
        let mut config = AppConfig::default();
        config.assembler.line_overlap = 1.5;
        assert!(matches!(config.validate(), Err(ScanwerkError::Config(_))));
    }
}
