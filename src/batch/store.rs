//! Generation-based output storage.
//!
//! Every batch renders into a private staging directory. Publishing renames the staging
//! directory to `gen-NNNNNN` and then atomically replaces the `CURRENT` pointer file, so a
//! reader resolving names through the pointer always sees one complete generation. Older
//! generations are pruned once the pointer has moved.
//!
//! A batch holds an exclusive lock on the `LOCK` file in the root from cleaning to publishing,
//! so batches from separate processes sharing one root never interleave.
//!
//! Published files live under `gen-NNNNNN/`, not directly in the root. Anything serving outputs
//! by name must resolve them through [`OutputStore::resolve`] (or [`OutputStore::current_dir`]);
//! a static file server pointed at the root will not find them.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::assets::originals::is_plain_file_name;
use crate::foundation::error::{CaptionError, CaptionResult};

const POINTER_FILE: &str = "CURRENT";
const POINTER_TMP: &str = "CURRENT.tmp";
const LOCK_FILE: &str = "LOCK";
const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationId(pub u64);

impl GenerationId {
    fn dir_name(self) -> String {
        format!("{GENERATION_PREFIX}{:06}", self.0)
    }

    fn staging_name(self) -> String {
        format!("{STAGING_PREFIX}{:06}", self.0)
    }

    fn parse(name: &str, prefix: &str) -> Option<Self> {
        name.strip_prefix(prefix)?.parse().ok().map(Self)
    }
}

impl std::fmt::Display for GenerationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// Durable home of the most recently published batch.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
    keep_generations: usize,
}

impl OutputStore {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, keep_generations: usize) -> CaptionResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            CaptionError::output_location(format!("create '{}': {e}", root.display()))
        })?;
        Ok(Self {
            root,
            keep_generations: keep_generations.max(1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_generation(&self) -> CaptionResult<Option<GenerationId>> {
        let pointer = self.root.join(POINTER_FILE);
        let text = match std::fs::read_to_string(&pointer) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CaptionError::output_location(format!(
                    "read '{}': {e}",
                    pointer.display()
                )));
            }
        };
        GenerationId::parse(text.trim(), GENERATION_PREFIX)
            .map(Some)
            .ok_or_else(|| {
                CaptionError::output_location(format!(
                    "pointer '{}' holds '{}'",
                    pointer.display(),
                    text.trim()
                ))
            })
    }

    pub fn current_dir(&self) -> CaptionResult<Option<PathBuf>> {
        Ok(self
            .current_generation()?
            .map(|id| self.root.join(id.dir_name())))
    }

    /// File names in the published generation, sorted.
    pub fn list_current(&self) -> CaptionResult<Vec<String>> {
        let Some(dir) = self.current_dir()? else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        let rd = std::fs::read_dir(&dir)
            .with_context(|| format!("list generation '{}'", dir.display()))?;
        for entry in rd.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Path of `name` in the published generation, if it exists.
    pub fn resolve(&self, name: &str) -> CaptionResult<Option<PathBuf>> {
        if !is_plain_file_name(name) {
            return Ok(None);
        }
        let Some(dir) = self.current_dir()? else {
            return Ok(None);
        };
        let path = dir.join(name);
        Ok(path.is_file().then_some(path))
    }

    pub fn read_current(&self, name: &str) -> CaptionResult<Option<Vec<u8>>> {
        let Some(path) = self.resolve(name)? else {
            return Ok(None);
        };
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read output '{}'", path.display()))?;
        Ok(Some(bytes))
    }

    /// Take the batch lock, waiting for a batch that holds it.
    pub fn lock(&self) -> CaptionResult<StoreLock> {
        let file = self.open_lock_file()?;
        file.lock().map_err(|e| {
            CaptionError::output_location(format!("lock '{}': {e}", self.root.display()))
        })?;
        Ok(StoreLock {
            root: self.root.clone(),
            _file: file,
        })
    }

    /// Take the batch lock unless another batch holds it.
    pub fn try_lock(&self) -> CaptionResult<Option<StoreLock>> {
        let file = self.open_lock_file()?;
        match file.try_lock() {
            Ok(()) => Ok(Some(StoreLock {
                root: self.root.clone(),
                _file: file,
            })),
            Err(std::fs::TryLockError::WouldBlock) => Ok(None),
            Err(std::fs::TryLockError::Error(e)) => Err(CaptionError::output_location(format!(
                "lock '{}': {e}",
                self.root.display()
            ))),
        }
    }

    fn open_lock_file(&self) -> CaptionResult<std::fs::File> {
        let path = self.root.join(LOCK_FILE);
        std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| CaptionError::output_location(format!("open '{}': {e}", path.display())))
    }

    /// Start a new generation under `lock`.
    ///
    /// Stale staging directories and loose files in the root are removed first; the returned
    /// staging directory is new and empty.
    pub fn begin(&self, lock: &StoreLock) -> CaptionResult<StagedGeneration> {
        if lock.root != self.root {
            return Err(CaptionError::output_location(format!(
                "lock for '{}' used on '{}'",
                lock.root.display(),
                self.root.display()
            )));
        }
        let mut max_seen = self.current_generation()?.map_or(0, |id| id.0);

        let rd = std::fs::read_dir(&self.root).map_err(|e| {
            CaptionError::output_location(format!("list '{}': {e}", self.root.display()))
        })?;
        for entry in rd {
            let entry = entry.map_err(|e| {
                CaptionError::output_location(format!("list '{}': {e}", self.root.display()))
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                if let Some(id) = GenerationId::parse(&name, GENERATION_PREFIX) {
                    max_seen = max_seen.max(id.0);
                } else if let Some(id) = GenerationId::parse(&name, STAGING_PREFIX) {
                    max_seen = max_seen.max(id.0);
                    tracing::debug!(dir = %name, "removing stale staging generation");
                    remove_dir_if_present(&entry.path())?;
                }
                continue;
            }

            if file_type.is_file() && name != POINTER_FILE && name != LOCK_FILE {
                tracing::debug!(file = %name, "removing stray output entry");
                std::fs::remove_file(entry.path()).map_err(|e| {
                    CaptionError::output_location(format!("remove '{name}': {e}"))
                })?;
            }
        }

        let mut id = GenerationId(max_seen + 1);
        let dir = loop {
            let dir = self.root.join(id.staging_name());
            match std::fs::create_dir(&dir) {
                Ok(()) => break dir,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => id = GenerationId(id.0 + 1),
                Err(e) => {
                    return Err(CaptionError::output_location(format!(
                        "create '{}': {e}",
                        dir.display()
                    )));
                }
            }
        };

        Ok(StagedGeneration {
            id,
            dir,
            root: self.root.clone(),
            keep_generations: self.keep_generations,
            committed: false,
        })
    }

    fn generations(&self) -> CaptionResult<Vec<GenerationId>> {
        let rd = std::fs::read_dir(&self.root).map_err(|e| {
            CaptionError::output_location(format!("list '{}': {e}", self.root.display()))
        })?;
        let mut ids: Vec<GenerationId> = rd
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| GenerationId::parse(n, GENERATION_PREFIX))
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Exclusive right to clean and publish one store; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    root: PathBuf,
    _file: std::fs::File,
}

/// A generation being filled. Dropped without [`commit`](Self::commit), it is deleted.
#[derive(Debug)]
pub struct StagedGeneration {
    id: GenerationId,
    dir: PathBuf,
    root: PathBuf,
    keep_generations: usize,
    committed: bool,
}

impl StagedGeneration {
    pub fn id(&self) -> GenerationId {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` as `name`, visible only once fully written.
    ///
    /// Returns the path the file will have after the generation is published.
    pub fn write(&self, name: &str, bytes: &[u8]) -> CaptionResult<PathBuf> {
        if !is_plain_file_name(name) {
            return Err(CaptionError::output_write(name, "not a plain file name"));
        }
        let partial = self.dir.join(format!("{name}{PARTIAL_SUFFIX}"));
        let target = self.dir.join(name);

        let written = std::fs::write(&partial, bytes)
            .and_then(|()| std::fs::rename(&partial, &target));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&partial);
            if !self.dir.is_dir() {
                return Err(CaptionError::output_location(format!(
                    "staging directory '{}' disappeared: {e}",
                    self.dir.display()
                )));
            }
            return Err(CaptionError::output_write(name, e));
        }

        Ok(self.root.join(self.id.dir_name()).join(name))
    }

    /// Publish this generation and prune the ones it supersedes.
    pub fn commit(mut self) -> CaptionResult<GenerationId> {
        let published = self.root.join(self.id.dir_name());
        std::fs::rename(&self.dir, &published).map_err(|e| {
            CaptionError::output_location(format!(
                "publish '{}' -> '{}': {e}",
                self.dir.display(),
                published.display()
            ))
        })?;
        self.committed = true;

        let tmp = self.root.join(POINTER_TMP);
        std::fs::write(&tmp, self.id.dir_name())
            .and_then(|()| std::fs::rename(&tmp, self.root.join(POINTER_FILE)))
            .map_err(|e| CaptionError::output_location(format!("swap pointer: {e}")))?;
        tracing::info!(generation = %self.id, "published output generation");

        let store = OutputStore {
            root: self.root.clone(),
            keep_generations: self.keep_generations,
        };
        match store.generations() {
            Ok(ids) => {
                let cut = ids.len().saturating_sub(self.keep_generations);
                for old in ids.into_iter().take(cut) {
                    if let Err(e) = remove_dir_if_present(&self.root.join(old.dir_name())) {
                        tracing::warn!(generation = %old, error = %e, "failed to prune generation");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to enumerate generations for pruning"),
        }

        Ok(self.id)
    }

    /// Throw away everything written so far.
    pub fn discard(self) {}
}

impl Drop for StagedGeneration {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}

fn remove_dir_if_present(dir: &Path) -> CaptionResult<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CaptionError::output_location(format!(
            "remove '{}': {e}",
            dir.display()
        ))),
    }
}
