//! Fonts, shaping and line wrapping.

pub mod font;
pub mod shaper;
pub mod wrap;
