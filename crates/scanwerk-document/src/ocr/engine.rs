// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// On-device OCR backed by the pure-Rust `ocrs` engine (`rten` models).
//
// # Feature Gate
//
// Only compiled with the `ocr` feature:
//
// ```toml
// scanwerk-document = { path = "crates/scanwerk-document", features = ["ocr"] }
// ```
//
// # Model Setup
//
// Two model files are needed: `text-detection.rten` locates words,
// `text-recognition.rten` decodes them. Running `ocrs-cli` once downloads
// both to `$XDG_CACHE_HOME/ocrs` (typically `~/.cache/ocrs`), which is where
// `OcrsConfig::default()` looks.
//
// The `ocrs` and `rten` crates must be compiled in release mode; debug
// builds are 10-100x slower.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams, TextItem};
use rten::Model;
use scanwerk_core::error::OcrError;
use scanwerk_core::geometry::{Point, Polygon};
use scanwerk_core::model::RectifiedImage;
use tracing::{debug, info, instrument};

use crate::ocr::adapter::{OcrAdapter, RecognitionResult, TextFragment};
use crate::ocr::language::detect_language;

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// Default directory for cached OCR model files: `$XDG_CACHE_HOME/ocrs`,
/// falling back to `~/.cache/ocrs`.
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where the two model files live.
#[derive(Debug, Clone)]
pub struct OcrsConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrsConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrsConfig {
    /// Expects `dir` to contain `text-detection.rten` and
    /// `text-recognition.rten`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn validate(&self) -> Result<(), OcrError> {
        for path in [&self.detection_model_path, &self.recognition_model_path] {
            if !path.exists() {
                return Err(OcrError::Unavailable(format!(
                    "model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Both model files are present.
    pub fn models_available(&self) -> bool {
        self.validate().is_ok()
    }
}

/// `OcrAdapter` over a loaded `ocrs` engine. Loading is the expensive step;
/// build once and share.
pub struct OcrsAdapter {
    engine: Arc<OcrsEngine>,
}

impl OcrsAdapter {
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn load(config: &OcrsConfig) -> Result<Self, OcrError> {
        config.validate()?;

        info!("Loading OCR detection model");
        let detection_model = Model::load_file(&config.detection_model_path).map_err(|err| {
            OcrError::Unavailable(format!("failed to load detection model: {err}"))
        })?;

        info!("Loading OCR recognition model");
        let recognition_model =
            Model::load_file(&config.recognition_model_path).map_err(|err| {
                OcrError::Unavailable(format!("failed to load recognition model: {err}"))
            })?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| OcrError::Unavailable(format!("failed to initialise OCR engine: {err}")))?;

        info!("OCR engine initialised");
        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

/// Word-level recognition. `ocrs` reports no per-word score, so every
/// fragment carries confidence 1.0.
fn recognize_words(
    engine: &OcrsEngine,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<RecognitionResult, OcrError> {
    let source = ImageSource::from_bytes(pixels, (width, height)).map_err(|err| {
        OcrError::Unavailable(format!("failed to create image source ({width}x{height}): {err}"))
    })?;
    let input = engine
        .prepare_input(source)
        .map_err(|err| OcrError::Unavailable(format!("OCR preprocessing failed: {err}")))?;

    let word_rects = engine
        .detect_words(&input)
        .map_err(|err| OcrError::Unavailable(format!("word detection failed: {err}")))?;
    let line_rects = engine.find_text_lines(&input, &word_rects);
    let lines = engine
        .recognize_text(&input, &line_rects)
        .map_err(|err| OcrError::Unavailable(format!("line recognition failed: {err}")))?;

    let mut fragments = Vec::new();
    for line in lines.iter().flatten() {
        for word in line.words() {
            let text = word.to_string();
            if text.trim().is_empty() {
                continue;
            }
            let corners = word
                .rotated_rect()
                .corners()
                .map(|c| Point::new(c.x, c.y));
            fragments.push(TextFragment {
                polygon: Polygon::new(corners.to_vec()),
                text,
                confidence: 1.0,
            });
        }
    }
    debug!(
        words = word_rects.len(),
        lines = line_rects.len(),
        fragments = fragments.len(),
        "OCR recognition complete"
    );

    let all_text: String = fragments.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join(" ");
    let language = Some(detect_language(&all_text)).filter(|l| l != "und");
    Ok(RecognitionResult {
        fragments,
        language,
    })
}

#[async_trait]
impl OcrAdapter for OcrsAdapter {
    async fn recognize(&self, image: &RectifiedImage) -> Result<RecognitionResult, OcrError> {
        let engine = Arc::clone(&self.engine);
        let (width, height) = (image.width(), image.height());
        let pixels = image.pixels().to_vec();
        tokio::task::spawn_blocking(move || recognize_words(&engine, width, height, &pixels))
            .await
            .map_err(|err| OcrError::Unavailable(format!("OCR worker failed: {err}")))?
    }

    fn engine_name(&self) -> &str {
        "ocrs"
    }
}
