use kurbo::Point;

use crate::assets::decode::{
    SourceImage, encode_jpeg, pixmap_dims, pixmap_from_premul_bytes, pixmap_image,
};
use crate::foundation::color::Rgba8;
use crate::foundation::config::{CaptionStyle, Outline};
use crate::foundation::error::CaptionResult;
use crate::render::blur::{blur_rgba8_premul, shadow_kernel_params};
use crate::text::shaper::{CaptionShaper, ShapedLine};
use crate::text::wrap::{WrappedLayout, layout_phrase};

/// Encoded output for one source, named after it.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub name: String,
    pub jpeg: Vec<u8>,
}

impl std::fmt::Debug for RenderedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedImage")
            .field("name", &self.name)
            .field("jpeg_len", &self.jpeg.len())
            .finish()
    }
}

/// Where one caption line lands: `origin` is the left end of its baseline.
#[derive(Debug, Clone)]
pub struct PlacedLine {
    pub line: ShapedLine,
    pub origin: Point,
}

/// Baselines for `line_count` lines, top to bottom.
///
/// The last baseline sits at `image_height - bottom_margin`; earlier lines stack upward by the
/// line spacing, so the block grows toward the top as lines are added.
pub fn line_baselines(image_height: u32, line_count: usize, style: &CaptionStyle) -> Vec<f32> {
    let bottom = image_height as f32 - style.bottom_margin;
    let spacing = style.line_spacing();
    (0..line_count)
        .map(|i| bottom - (line_count - 1 - i) as f32 * spacing)
        .collect()
}

/// Left edge of a line of `line_width` centered on the image's vertical axis.
pub fn line_origin_x(image_width: u32, line_width: f32) -> f32 {
    image_width as f32 / 2.0 - line_width / 2.0
}

/// Draws wrapped captions onto source images.
#[derive(Debug, Clone)]
pub struct CaptionCompositor {
    style: CaptionStyle,
}

impl CaptionCompositor {
    pub fn new(style: CaptionStyle) -> CaptionResult<Self> {
        style.validate()?;
        Ok(Self { style })
    }

    pub fn style(&self) -> &CaptionStyle {
        &self.style
    }

    /// Wrap `phrase` to the usable width of an image `image_width` pixels wide.
    pub fn layout<S: CaptionShaper + ?Sized>(
        &self,
        shaper: &mut S,
        phrase: &str,
        image_width: u32,
    ) -> WrappedLayout {
        layout_phrase(
            phrase,
            |line| shaper.measure_width(line),
            self.style.wrap_width(image_width),
            self.style.line_spacing(),
        )
    }

    /// Shape every line and compute its anchor on `image`.
    pub fn place_lines<S: CaptionShaper + ?Sized>(
        &self,
        image: &SourceImage,
        layout: &WrappedLayout,
        shaper: &mut S,
    ) -> CaptionResult<Vec<PlacedLine>> {
        let baselines = line_baselines(image.height, layout.line_count(), &self.style);
        layout
            .lines
            .iter()
            .zip(baselines)
            .map(|(text, baseline)| {
                let line = shaper.shape_line(text)?;
                let x = line_origin_x(image.width, line.width);
                Ok(PlacedLine {
                    line,
                    origin: Point::new(f64::from(x), f64::from(baseline)),
                })
            })
            .collect()
    }

    /// Composite `layout` over `image` and return premultiplied RGBA8 pixels.
    pub fn compose<S: CaptionShaper + ?Sized>(
        &self,
        image: &SourceImage,
        layout: &WrappedLayout,
        shaper: &mut S,
    ) -> CaptionResult<Vec<u8>> {
        self.compose_inner(image, layout, shaper)
            .map_err(|e| e.for_file(&image.name))
    }

    /// Composite and JPEG-encode.
    pub fn render<S: CaptionShaper + ?Sized>(
        &self,
        image: &SourceImage,
        layout: &WrappedLayout,
        shaper: &mut S,
    ) -> CaptionResult<RenderedImage> {
        let pixels = self.compose(image, layout, shaper)?;
        let jpeg = encode_jpeg(&pixels, image.width, image.height)
            .map_err(|e| e.for_file(&image.name))?;
        Ok(RenderedImage {
            name: image.name.clone(),
            jpeg,
        })
    }

    fn compose_inner<S: CaptionShaper + ?Sized>(
        &self,
        image: &SourceImage,
        layout: &WrappedLayout,
        shaper: &mut S,
    ) -> CaptionResult<Vec<u8>> {
        let (w, h) = pixmap_dims(image.width, image.height)?;
        let full = vello_cpu::kurbo::Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
        let placed = self.place_lines(image, layout, shaper)?;

        let background =
            pixmap_image(pixmap_from_premul_bytes(&image.rgba8_premul, image.width, image.height)?);
        let shadow = match self.style.outline {
            Outline::Shadow { color, blur } => Some(shadow_layer(w, h, &placed, color, blur)?),
            Outline::Stroke { .. } | Outline::None => None,
        };

        let mut ctx = vello_cpu::RenderContext::new(w, h);
        ctx.set_paint(background);
        ctx.fill_rect(&full);
        if let Some(shadow) = shadow {
            ctx.set_paint(shadow);
            ctx.fill_rect(&full);
        }

        for placed_line in &placed {
            ctx.set_transform(translate_to(placed_line.origin));
            if let Outline::Stroke { color, width } = self.style.outline
                && width > 0.0
            {
                ctx.set_stroke(vello_cpu::kurbo::Stroke::new(f64::from(width)));
                ctx.set_paint(color.to_cpu_color());
                for run in &placed_line.line.runs {
                    ctx.glyph_run(&run.font)
                        .font_size(run.font_size)
                        .stroke_glyphs(run.glyphs.iter().copied());
                }
            }
            paint_fill(&mut ctx, &placed_line.line, self.style.fill);
        }

        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut pixmap);
        Ok(pixmap.data_as_u8_slice().to_vec())
    }
}

fn paint_fill(ctx: &mut vello_cpu::RenderContext, line: &ShapedLine, color: Rgba8) {
    ctx.set_paint(color.to_cpu_color());
    for run in &line.runs {
        ctx.glyph_run(&run.font)
            .font_size(run.font_size)
            .fill_glyphs(run.glyphs.iter().copied());
    }
}

fn shadow_layer(
    w: u16,
    h: u16,
    placed: &[PlacedLine],
    color: Rgba8,
    blur: f32,
) -> CaptionResult<vello_cpu::Image> {
    let mut ctx = vello_cpu::RenderContext::new(w, h);
    for placed_line in placed {
        ctx.set_transform(translate_to(placed_line.origin));
        paint_fill(&mut ctx, &placed_line.line, color);
    }
    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut pixmap);

    let (radius, sigma) = shadow_kernel_params(blur);
    let blurred = blur_rgba8_premul(
        pixmap.data_as_u8_slice(),
        u32::from(w),
        u32::from(h),
        radius,
        sigma,
    )?;
    let pixmap = pixmap_from_premul_bytes(&blurred, u32::from(w), u32::from(h))?;
    Ok(pixmap_image(pixmap))
}

fn translate_to(p: Point) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::translate((p.x, p.y))
}
