use std::path::{Path, PathBuf};
use std::sync::Arc;

use usvg::fontdb;

use crate::foundation::error::{CaptionError, CaptionResult};

/// Where the caption face came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    /// The configured font file.
    File(PathBuf),
    /// First usable font found in a fallback directory.
    FallbackDir(PathBuf),
    /// Installed system face.
    System,
}

impl std::fmt::Display for FontSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(p) => write!(f, "file {}", p.display()),
            Self::FallbackDir(p) => write!(f, "fallback {}", p.display()),
            Self::System => f.write_str("system"),
        }
    }
}

/// A single loaded face: raw font data plus the index into it.
#[derive(Clone)]
pub struct FontFace {
    pub bytes: Arc<Vec<u8>>,
    pub index: u32,
    pub family: String,
    pub source: FontSource,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("bytes_len", &self.bytes.len())
            .field("index", &self.index)
            .field("family", &self.family)
            .field("source", &self.source)
            .finish()
    }
}

impl FontFace {
    /// Parse `bytes` and keep the first face they contain.
    pub fn from_bytes(bytes: Vec<u8>, source: FontSource) -> CaptionResult<Self> {
        let mut db = fontdb::Database::new();
        db.load_font_data(bytes);
        let face = db
            .faces()
            .next()
            .ok_or_else(|| CaptionError::font_unavailable("font data contains no faces"))?;
        let family = face
            .families
            .first()
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let index = face.index;
        let id = face.id;

        let bytes = db
            .with_face_data(id, |data, _| data.to_vec())
            .ok_or_else(|| CaptionError::font_unavailable("font data vanished after load"))?;

        Ok(Self {
            bytes: Arc::new(bytes),
            index,
            family,
            source,
        })
    }

    pub fn from_file(path: &Path, source: FontSource) -> CaptionResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            CaptionError::font_unavailable(format!("read '{}': {e}", path.display()))
        })?;
        Self::from_bytes(bytes, source)
    }
}

/// Supplies the caption face. Resolution never fails outright: a missing configured font
/// degrades to the next candidate, and when nothing at all is usable the provider is empty and
/// each image reports a render failure instead.
#[derive(Debug, Clone, Default)]
pub struct FontProvider {
    face: Option<FontFace>,
}

impl FontProvider {
    pub fn resolve(primary: &Path, fallback_dirs: &[PathBuf], weight: u16) -> Self {
        match FontFace::from_file(primary, FontSource::File(primary.to_path_buf())) {
            Ok(face) => {
                tracing::info!(family = %face.family, path = %primary.display(), "caption font loaded");
                return Self { face: Some(face) };
            }
            Err(e) => {
                tracing::warn!(path = %primary.display(), error = %e, "caption font unavailable, trying fallbacks");
            }
        }

        for dir in fallback_dirs {
            if let Some(face) = first_font_in_dir(dir) {
                tracing::info!(family = %face.family, source = %face.source, "using fallback caption font");
                return Self { face: Some(face) };
            }
        }

        match system_face(weight) {
            Some(face) => {
                tracing::info!(family = %face.family, "using system caption font");
                Self { face: Some(face) }
            }
            None => {
                tracing::error!("no caption font could be resolved; captions will fail to render");
                Self { face: None }
            }
        }
    }

    pub fn from_face(face: FontFace) -> Self {
        Self { face: Some(face) }
    }

    /// System face only, skipping file lookups.
    pub fn system(weight: u16) -> Self {
        Self {
            face: system_face(weight),
        }
    }

    pub fn face(&self) -> Option<&FontFace> {
        self.face.as_ref()
    }

    pub(crate) fn require_face(&self) -> CaptionResult<&FontFace> {
        self.face
            .as_ref()
            .ok_or_else(|| CaptionError::font_unavailable("no caption font resolved"))
    }
}

fn first_font_in_dir(dir: &Path) -> Option<FontFace> {
    let rd = std::fs::read_dir(dir).ok()?;

    let mut candidates: Vec<PathBuf> = rd
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_font_file(path))
        .collect();
    candidates.sort();

    candidates.into_iter().find_map(|path| {
        FontFace::from_file(&path, FontSource::FallbackDir(path.clone()))
            .map_err(|e| tracing::debug!(path = %path.display(), error = %e, "skipping font"))
            .ok()
    })
}

fn is_font_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
        return false;
    };
    matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc")
}

fn system_face(weight: u16) -> Option<FontFace> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    let families = [fontdb::Family::SansSerif, fontdb::Family::Serif];
    let query = fontdb::Query {
        families: &families,
        weight: fontdb::Weight(weight),
        stretch: fontdb::Stretch::Normal,
        style: fontdb::Style::Normal,
    };
    let id = db.query(&query).or_else(|| db.faces().next().map(|f| f.id))?;
    let info = db.face(id)?;
    let family = info
        .families
        .first()
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let (bytes, index) = db.with_face_data(id, |data, index| (data.to_vec(), index))?;
    Some(FontFace {
        bytes: Arc::new(bytes),
        index,
        family,
        source: FontSource::System,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = FontFace::from_bytes(b"definitely not a font".to_vec(), FontSource::System)
            .unwrap_err();
        assert!(matches!(err, CaptionError::FontUnavailable(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = FontFace::from_file(
            Path::new("target/no-such-font.ttf"),
            FontSource::File(PathBuf::from("target/no-such-font.ttf")),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no-such-font.ttf"));
    }

    #[test]
    fn font_extension_filter() {
        assert!(is_font_file(Path::new("a/Comic.TTF")));
        assert!(is_font_file(Path::new("b.otf")));
        assert!(!is_font_file(Path::new("c.woff2")));
        assert!(!is_font_file(Path::new("noext")));
    }

    #[test]
    fn empty_provider_requires_face() {
        let provider = FontProvider::default();
        assert!(provider.face().is_none());
        assert!(matches!(
            provider.require_face(),
            Err(CaptionError::FontUnavailable(_))
        ));
    }

    #[test]
    fn unresolvable_primary_degrades_instead_of_failing() {
        // Whatever the host has installed, resolution must return a provider.
        let provider = FontProvider::resolve(
            Path::new("target/missing/ComicSansMSBold.ttf"),
            &[PathBuf::from("target/missing-font-dir")],
            700,
        );
        if let Some(face) = provider.face() {
            assert_eq!(face.source, FontSource::System);
        }
    }
}
