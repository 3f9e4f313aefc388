/// Source decoding, JPEG encoding and pixmap helpers.
pub mod decode;
/// The read-only gallery of source images.
pub mod originals;
