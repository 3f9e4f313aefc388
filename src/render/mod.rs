pub mod blur;
pub mod compositor;
