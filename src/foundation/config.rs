use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::color::Rgba8;
use crate::foundation::error::{CaptionError, CaptionResult};

/// Largest accepted shadow blur; the kernel grows linearly with it.
pub const MAX_SHADOW_BLUR: f32 = 256.0;

/// How the caption outline is drawn beneath the fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outline {
    /// Glyph outlines stroked with `width` pixels before the fill pass.
    Stroke { color: Rgba8, width: f32 },
    /// Blurred copy of the glyphs painted beneath the fill.
    Shadow { color: Rgba8, blur: f32 },
    None,
}

impl Default for Outline {
    fn default() -> Self {
        Self::Stroke {
            color: Rgba8::BLACK,
            width: 3.0,
        }
    }
}

/// Every visual parameter of a caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    pub font_size: f32,
    pub font_weight: f32,
    pub fill: Rgba8,
    pub outline: Outline,
    /// Extra gap added to `font_size` between consecutive baselines.
    pub line_padding: f32,
    /// Distance from the bottom edge to the last baseline.
    pub bottom_margin: f32,
    /// Horizontal inset on each side used to derive the wrap width.
    pub side_margin: f32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            font_weight: 700.0,
            fill: Rgba8::WHITE,
            outline: Outline::default(),
            line_padding: 8.0,
            bottom_margin: 20.0,
            side_margin: 20.0,
        }
    }
}

impl CaptionStyle {
    pub fn line_spacing(&self) -> f32 {
        self.font_size + self.line_padding
    }

    /// Maximum line width for an image `image_width` pixels wide.
    pub fn wrap_width(&self, image_width: u32) -> f32 {
        (image_width as f32 - 2.0 * self.side_margin).max(1.0)
    }

    pub fn validate(&self) -> CaptionResult<()> {
        fn finite_non_negative(name: &str, v: f32) -> CaptionResult<()> {
            if !v.is_finite() || v < 0.0 {
                return Err(CaptionError::config(format!(
                    "style {name} must be finite and >= 0"
                )));
            }
            Ok(())
        }

        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(CaptionError::config(
                "style font_size must be finite and > 0",
            ));
        }
        if !(1.0..=1000.0).contains(&self.font_weight) {
            return Err(CaptionError::config(
                "style font_weight must be in 1..=1000",
            ));
        }
        finite_non_negative("line_padding", self.line_padding)?;
        finite_non_negative("bottom_margin", self.bottom_margin)?;
        finite_non_negative("side_margin", self.side_margin)?;
        match self.outline {
            Outline::Stroke { width, .. } => finite_non_negative("outline width", width)?,
            Outline::Shadow { blur, .. } => {
                finite_non_negative("shadow blur", blur)?;
                if blur > MAX_SHADOW_BLUR {
                    return Err(CaptionError::config(format!(
                        "style shadow blur must be <= {MAX_SHADOW_BLUR}"
                    )));
                }
            }
            Outline::None => {}
        }
        Ok(())
    }
}

/// Worker-pool knobs for the per-image stage of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchThreading {
    pub parallel: bool,
    pub threads: Option<usize>,
}

impl Default for BatchThreading {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: None,
        }
    }
}

/// What a render response hands back for each produced image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// `/images/output/<file>` served from the published generation.
    ///
    /// Files live under `gen-NNNNNN/`, not the output root, so the server behind the prefix must
    /// map names through `OutputStore::resolve`.
    #[default]
    PublicPath,
    /// Self-contained `data:image/jpeg;base64,...` URL.
    DataUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub originals_dir: PathBuf,
    pub output_dir: PathBuf,
    pub font_path: PathBuf,
    pub font_dirs: Vec<PathBuf>,
    pub reference_mode: ReferenceMode,
    pub public_originals_prefix: String,
    pub public_output_prefix: String,
    pub style: CaptionStyle,
    pub threading: BatchThreading,
    /// Published generations kept on disk, the current one included.
    pub keep_generations: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            originals_dir: PathBuf::from("public/images/originals"),
            output_dir: PathBuf::from("public/images/output"),
            font_path: PathBuf::from("ComicSansMSBold.ttf"),
            font_dirs: vec![PathBuf::from("fonts"), PathBuf::from("assets")],
            reference_mode: ReferenceMode::PublicPath,
            public_originals_prefix: "/images/originals".to_string(),
            public_output_prefix: "/images/output".to_string(),
            style: CaptionStyle::default(),
            threading: BatchThreading::default(),
            keep_generations: 2,
        }
    }
}

impl AppConfig {
    pub fn from_json_file(path: &Path) -> CaptionResult<Self> {
        let f = std::fs::File::open(path)
            .with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(std::io::BufReader::new(f))
            .map_err(|e| CaptionError::config(format!("parse '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CaptionResult<()> {
        self.style.validate()?;
        if self.keep_generations == 0 {
            return Err(CaptionError::config("keep_generations must be >= 1"));
        }
        if let Some(0) = self.threading.threads {
            return Err(CaptionError::config(
                "threading.threads must be >= 1 when set",
            ));
        }
        Ok(())
    }
}
