use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{CaptionError, CaptionResult};

const SOURCE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Read-only access to the gallery of source images.
pub trait OriginalsRepository: Send + Sync {
    /// File names of every captionable source, in enumeration order.
    fn list(&self) -> CaptionResult<Vec<String>>;

    fn read(&self, name: &str) -> CaptionResult<Vec<u8>>;
}

/// Originals stored as plain files in one directory.
#[derive(Debug, Clone)]
pub struct DirOriginals {
    dir: PathBuf,
}

impl DirOriginals {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl OriginalsRepository for DirOriginals {
    fn list(&self) -> CaptionResult<Vec<String>> {
        list_originals(&self.dir)
    }

    fn read(&self, name: &str) -> CaptionResult<Vec<u8>> {
        if !is_plain_file_name(name) {
            return Err(CaptionError::source_decode(name, "not a plain file name"));
        }
        let path = self.dir.join(name);
        std::fs::read(&path)
            .map_err(|e| CaptionError::source_decode(name, format!("read '{}': {e}", path.display())))
    }
}

/// Whether `name` ends in one of the source extensions, ignoring case.
///
/// Only the suffix is checked, so a dotfile such as `.png` qualifies.
pub fn is_source_image_name(name: &str) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    SOURCE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
}

/// Regular files in `dir` with a source extension, sorted by name.
pub fn list_originals(dir: &Path) -> CaptionResult<Vec<String>> {
    let rd = std::fs::read_dir(dir)
        .with_context(|| format!("list originals in '{}'", dir.display()))?;

    let mut names = Vec::new();
    for entry in rd {
        let entry = entry.with_context(|| format!("read entry in '{}'", dir.display()))?;
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::debug!(path = %entry.path().display(), "skipping non-utf8 file name");
            continue;
        };
        if is_source_image_name(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from("target").join("originals_tests").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(is_source_image_name("cat.JPG"));
        assert!(is_source_image_name("dog.jpeg"));
        assert!(is_source_image_name("a b.Png"));
        assert!(!is_source_image_name("notes.txt"));
        assert!(!is_source_image_name("anim.gif"));
        assert!(!is_source_image_name("png"));
        assert!(!is_source_image_name("photo.png.txt"));
    }

    #[test]
    fn bare_extension_names_are_listed() {
        assert!(is_source_image_name(".png"));
        assert!(is_source_image_name(".JPG"));

        let dir = scratch_dir("dotfile");
        std::fs::write(dir.join(".png"), b"x").unwrap();
        std::fs::write(dir.join(".hidden"), b"x").unwrap();
        assert_eq!(list_originals(&dir).unwrap(), vec![".png".to_string()]);
    }

    #[test]
    fn listing_skips_directories_and_other_files() {
        let dir = scratch_dir("listing");
        std::fs::write(dir.join("b.png"), b"x").unwrap();
        std::fs::write(dir.join("a.JPEG"), b"x").unwrap();
        std::fs::write(dir.join("readme.md"), b"x").unwrap();
        std::fs::create_dir_all(dir.join("nested.jpg")).unwrap();

        let names = list_originals(&dir).unwrap();
        assert_eq!(names, vec!["a.JPEG".to_string(), "b.png".to_string()]);
    }

    #[test]
    fn missing_dir_is_an_error() {
        assert!(list_originals(Path::new("target/originals_tests/does-not-exist")).is_err());
    }

    #[test]
    fn read_rejects_traversal() {
        let dir = scratch_dir("traversal");
        let repo = DirOriginals::new(&dir);
        assert!(repo.read("../secret.png").is_err());
        assert!(repo.read("").is_err());
    }

    #[test]
    fn read_returns_bytes() {
        let dir = scratch_dir("read");
        std::fs::write(dir.join("x.png"), b"payload").unwrap();
        let repo = DirOriginals::new(&dir);
        assert_eq!(repo.read("x.png").unwrap(), b"payload");
    }
}
