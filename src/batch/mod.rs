//! One captioning run over the whole gallery, and where its results land.

pub mod renderer;
pub mod store;
