use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;

use crate::assets::decode::{SourceImage, decode_source};
use crate::assets::originals::OriginalsRepository;
use crate::batch::store::{GenerationId, OutputStore, StagedGeneration};
use crate::foundation::config::BatchThreading;
use crate::foundation::error::{CaptionError, CaptionResult};
use crate::render::compositor::CaptionCompositor;
use crate::text::shaper::ShaperSource;

/// Lifecycle of one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Validating,
    CleaningOutput,
    Rendering,
    Completed,
    Failed,
}

/// Cooperative cancellation flag, checked between images.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A successfully captioned image.
#[derive(Clone, PartialEq, Eq)]
pub struct ProducedImage {
    pub name: String,
    /// Location inside the published generation.
    pub path: PathBuf,
    /// The encoded bytes as written, independent of later pruning.
    pub jpeg: Arc<Vec<u8>>,
    pub lines: usize,
}

impl std::fmt::Debug for ProducedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducedImage")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("jpeg_len", &self.jpeg.len())
            .field("lines", &self.lines)
            .finish()
    }
}

#[derive(Debug)]
pub struct ImageOutcome {
    pub name: String,
    pub result: CaptionResult<ProducedImage>,
}

/// Every per-image outcome of a completed batch, in enumeration order.
#[derive(Debug)]
pub struct BatchReport {
    pub generation: GenerationId,
    /// The phrase as rendered, trimmed.
    pub phrase: String,
    pub outcomes: Vec<ImageOutcome>,
}

impl BatchReport {
    pub fn produced(&self) -> impl Iterator<Item = &ProducedImage> + '_ {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &CaptionError)> + '_ {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.name.as_str(), e)))
    }

    pub fn produced_names(&self) -> Vec<String> {
        self.produced().map(|p| p.name.clone()).collect()
    }
}

/// Runs captioning batches against one originals set and one output store.
///
/// Batches are serialized: at most one is cleaning or rendering at any time. Within a renderer a
/// mutex orders callers; across renderers and processes the store's lock file does.
pub struct BatchRenderer<S: ShaperSource, R: OriginalsRepository> {
    originals: R,
    store: OutputStore,
    compositor: CaptionCompositor,
    shapers: S,
    pool: Option<rayon::ThreadPool>,
    batch_lock: Mutex<()>,
    state: Mutex<BatchState>,
}

impl<S: ShaperSource, R: OriginalsRepository> BatchRenderer<S, R> {
    pub fn new(
        originals: R,
        store: OutputStore,
        compositor: CaptionCompositor,
        shapers: S,
        threading: BatchThreading,
    ) -> CaptionResult<Self> {
        let pool = if threading.parallel {
            Some(build_thread_pool(threading.threads)?)
        } else {
            None
        };
        Ok(Self {
            originals,
            store,
            compositor,
            shapers,
            pool,
            batch_lock: Mutex::new(()),
            state: Mutex::new(BatchState::Idle),
        })
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn originals(&self) -> &R {
        &self.originals
    }

    /// State of the running batch, or the outcome of the last one.
    pub fn state(&self) -> BatchState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a batch, waiting for any batch already in flight.
    pub fn render(&self, phrase: &str, cancel: &CancelToken) -> CaptionResult<BatchReport> {
        let _guard = self
            .batch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.run_locked(phrase, cancel, Wait::Block)
    }

    /// Run a batch unless another one is in flight.
    pub fn try_render(&self, phrase: &str, cancel: &CancelToken) -> CaptionResult<BatchReport> {
        let _guard = match self.batch_lock.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::Poisoned(p)) => p.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => return Err(CaptionError::BatchInProgress),
        };
        self.run_locked(phrase, cancel, Wait::Fail)
    }

    fn set_state(&self, next: BatchState) {
        tracing::debug!(state = ?next, "batch state");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    #[tracing::instrument(skip_all, fields(phrase_len = phrase.len()))]
    fn run_locked(
        &self,
        phrase: &str,
        cancel: &CancelToken,
        wait: Wait,
    ) -> CaptionResult<BatchReport> {
        let result = self.run_stages(phrase, cancel, wait);
        match &result {
            Ok(report) => {
                self.set_state(BatchState::Completed);
                tracing::info!(
                    generation = %report.generation,
                    produced = report.produced().count(),
                    failed = report.failures().count(),
                    "batch completed"
                );
            }
            Err(e) => {
                self.set_state(BatchState::Failed);
                tracing::error!(error = %e, "batch failed");
            }
        }
        result
    }

    fn run_stages(
        &self,
        phrase: &str,
        cancel: &CancelToken,
        wait: Wait,
    ) -> CaptionResult<BatchReport> {
        self.set_state(BatchState::Validating);
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(CaptionError::invalid_phrase("phrase must not be empty"));
        }

        let store_lock = match wait {
            Wait::Block => self.store.lock()?,
            Wait::Fail => self
                .store
                .try_lock()?
                .ok_or(CaptionError::BatchInProgress)?,
        };

        self.set_state(BatchState::CleaningOutput);
        let staged = self.store.begin(&store_lock)?;

        self.set_state(BatchState::Rendering);
        let names = self.originals.list()?;
        tracing::info!(sources = names.len(), generation = %staged.id(), "rendering batch");

        let results: Vec<CaptionResult<ProducedImage>> = match &self.pool {
            Some(pool) => pool.install(|| {
                names
                    .par_iter()
                    .map_init(
                        || self.shapers.shaper(self.compositor.style()),
                        |shaper, name| self.process_one(shaper, name, phrase, &staged, cancel),
                    )
                    .collect()
            }),
            None => {
                let mut shaper = self.shapers.shaper(self.compositor.style());
                names
                    .iter()
                    .map(|name| self.process_one(&mut shaper, name, phrase, &staged, cancel))
                    .collect()
            }
        };

        if cancel.is_cancelled() {
            staged.discard();
            return Err(CaptionError::Cancelled);
        }

        let mut outcomes = Vec::with_capacity(results.len());
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Err(e) if !e.is_per_image() => {
                    staged.discard();
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "skipping image");
                    outcomes.push(ImageOutcome {
                        name,
                        result: Err(e),
                    });
                }
                Ok(produced) => outcomes.push(ImageOutcome {
                    name,
                    result: Ok(produced),
                }),
            }
        }

        let generation = staged.commit()?;
        Ok(BatchReport {
            generation,
            phrase: phrase.to_string(),
            outcomes,
        })
    }

    fn process_one(
        &self,
        shaper: &mut CaptionResult<S::Shaper>,
        name: &str,
        phrase: &str,
        staged: &StagedGeneration,
        cancel: &CancelToken,
    ) -> CaptionResult<ProducedImage> {
        if cancel.is_cancelled() {
            return Err(CaptionError::Cancelled);
        }
        let shaper = match shaper {
            Ok(shaper) => shaper,
            Err(e) => return Err(CaptionError::render(name, e.to_string())),
        };

        let bytes = self
            .originals
            .read(name)
            .map_err(|e| e.for_file(name))?;
        let image = decode_source(name, &bytes)?;
        let (rendered, lines) = self.caption(shaper, &image, phrase)?;
        let path = staged.write(name, &rendered)?;
        tracing::debug!(file = %name, lines, bytes = rendered.len(), "captioned image");

        Ok(ProducedImage {
            name: name.to_string(),
            path,
            jpeg: Arc::new(rendered),
            lines,
        })
    }

    fn caption(
        &self,
        shaper: &mut S::Shaper,
        image: &SourceImage,
        phrase: &str,
    ) -> CaptionResult<(Vec<u8>, usize)> {
        let layout = self.compositor.layout(shaper, phrase, image.width);
        let rendered = self.compositor.render(image, &layout, shaper)?;
        Ok((rendered.jpeg, layout.line_count()))
    }
}

/// What a batch does when another one holds the store.
#[derive(Clone, Copy, Debug)]
enum Wait {
    Block,
    Fail,
}

fn build_thread_pool(threads: Option<usize>) -> CaptionResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(CaptionError::config(
            "batch threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| CaptionError::config(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(build_thread_pool(Some(0)).is_err());
        assert!(build_thread_pool(Some(1)).is_ok());
    }
}
