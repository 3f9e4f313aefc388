//! Captioner draws a phrase over every image of a fixed gallery.
//!
//! The pipeline is:
//!
//! - Wrap the phrase to the image width ([`text::wrap`])
//! - Shape and draw each line centered above the bottom margin, outline first and fill on top
//!   ([`render::compositor`])
//! - Run the whole gallery as one batch and publish it as a single output generation
//!   ([`batch::renderer`], [`batch::store`])
#![forbid(unsafe_code)]

pub mod api;
pub mod assets;
pub mod batch;
pub mod foundation;
pub mod render;
pub mod text;

pub use crate::api::{ApiResponse, ImageList, RenderEndpoint, RenderRequest};
pub use crate::assets::decode::SourceImage;
pub use crate::assets::originals::{DirOriginals, OriginalsRepository};
pub use crate::batch::renderer::{
    BatchRenderer, BatchReport, BatchState, CancelToken, ImageOutcome, ProducedImage,
};
pub use crate::batch::store::{GenerationId, OutputStore, StoreLock};
pub use crate::foundation::color::Rgba8;
pub use crate::foundation::config::{
    AppConfig, BatchThreading, CaptionStyle, Outline, ReferenceMode,
};
pub use crate::foundation::error::{CaptionError, CaptionResult};
pub use crate::render::compositor::{CaptionCompositor, RenderedImage};
pub use crate::text::font::{FontFace, FontProvider, FontSource};
pub use crate::text::shaper::{CaptionShaper, ParleyShaper, ShapedLine, ShaperSource};
pub use crate::text::wrap::{WrappedLayout, wrap};
