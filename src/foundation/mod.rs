/// RGBA colors and their config syntax.
pub mod color;
/// JSON configuration and caption style.
pub mod config;
/// Crate error type.
pub mod error;
