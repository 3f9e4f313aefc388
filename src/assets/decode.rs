use std::io::Cursor;
use std::sync::Arc;

use crate::foundation::error::{CaptionError, CaptionResult};

/// Decoded source image in premultiplied RGBA8.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}

pub fn decode_source(name: &str, bytes: &[u8]) -> CaptionResult<SourceImage> {
    let dyn_img =
        image::load_from_memory(bytes).map_err(|e| CaptionError::source_decode(name, e))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(CaptionError::source_decode(name, "image has zero area"));
    }

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(SourceImage {
        name: name.to_string(),
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

/// JPEG-encode premultiplied RGBA8 at the codec's default quality.
///
/// Alpha is dropped after premultiplication, which flattens translucent pixels onto black.
pub fn encode_jpeg(rgba8_premul: &[u8], width: u32, height: u32) -> CaptionResult<Vec<u8>> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| CaptionError::render("", "jpeg buffer size overflow"))?;
    if rgba8_premul.len() != expected {
        return Err(CaptionError::render("", "jpeg input byte len mismatch"));
    }

    let mut rgb = Vec::with_capacity(expected / 4 * 3);
    for px in rgba8_premul.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    let img = image::RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| CaptionError::render("", "jpeg buffer does not match dimensions"))?;

    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
        .map_err(|e| CaptionError::render("", format!("jpeg encode: {e}")))?;
    Ok(out)
}

pub(crate) fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> CaptionResult<vello_cpu::Pixmap> {
    let (w, h) = pixmap_dims(width, height)?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(CaptionError::render("", "pixmap byte len mismatch"));
    }
    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity((width as usize) * (height as usize));
    for px in bytes.chunks_exact(4) {
        may_have_opacities |= px[3] != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        });
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

pub(crate) fn pixmap_image(pixmap: vello_cpu::Pixmap) -> vello_cpu::Image {
    vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    }
}

pub(crate) fn pixmap_dims(width: u32, height: u32) -> CaptionResult<(u16, u16)> {
    let w: u16 = width
        .try_into()
        .map_err(|_| CaptionError::render("", "image width exceeds 65535"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| CaptionError::render("", "image height exceeds 65535"))?;
    Ok((w, h))
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(img: image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decode_png_dimensions_and_premul() {
        let img = image::RgbaImage::from_raw(1, 1, vec![100u8, 50u8, 200u8, 128u8]).unwrap();
        let prepared = decode_source("one.png", &png_bytes(img)).unwrap();
        assert_eq!(prepared.name, "one.png");
        assert_eq!((prepared.width, prepared.height), (1, 1));
        assert_eq!(
            prepared.rgba8_premul.as_slice(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn garbage_is_a_decode_failure_naming_the_file() {
        let err = decode_source("broken.jpg", b"not an image at all").unwrap_err();
        match err {
            CaptionError::SourceDecode { file, .. } => assert_eq!(file, "broken.jpg"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn jpeg_roundtrip_keeps_dimensions() {
        let (w, h) = (16u32, 8u32);
        let premul = [200u8, 30, 30, 255].repeat((w * h) as usize);
        let jpeg = encode_jpeg(&premul, w, h).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let back = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg).unwrap();
        assert_eq!((back.width(), back.height()), (w, h));
    }

    #[test]
    fn jpeg_rejects_short_buffers() {
        assert!(encode_jpeg(&[0u8; 12], 2, 2).is_err());
    }

    #[test]
    fn pixmap_dims_reject_oversized() {
        assert!(pixmap_dims(70_000, 10).is_err());
        assert_eq!(pixmap_dims(400, 300).unwrap(), (400, 300));
    }
}
