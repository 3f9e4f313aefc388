use std::borrow::Cow;

use crate::foundation::config::CaptionStyle;
use crate::foundation::error::{CaptionError, CaptionResult};
use crate::text::font::{FontFace, FontProvider};

/// Glyphs of one run, positioned relative to the line origin on its baseline.
#[derive(Clone)]
pub struct ShapedRun {
    pub font: vello_cpu::peniko::FontData,
    pub font_size: f32,
    pub glyphs: Vec<vello_cpu::Glyph>,
}

/// A single caption line ready to be painted.
#[derive(Clone)]
pub struct ShapedLine {
    pub text: String,
    pub width: f32,
    pub runs: Vec<ShapedRun>,
}

impl std::fmt::Debug for ShapedLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapedLine")
            .field("text", &self.text)
            .field("width", &self.width)
            .field("runs", &self.runs.len())
            .finish()
    }
}

impl ShapedLine {
    /// A line with a known width and nothing to paint.
    pub fn blank(text: impl Into<String>, width: f32) -> Self {
        Self {
            text: text.into(),
            width,
            runs: Vec::new(),
        }
    }
}

/// Text measurement and shaping for caption lines.
pub trait CaptionShaper {
    /// Advance width of `text` set on a single line.
    fn measure_width(&mut self, text: &str) -> f32;

    fn shape_line(&mut self, text: &str) -> CaptionResult<ShapedLine>;
}

/// Hands out one shaper per worker thread.
pub trait ShaperSource: Send + Sync {
    type Shaper: CaptionShaper;

    fn shaper(&self, style: &CaptionStyle) -> CaptionResult<Self::Shaper>;
}

impl ShaperSource for FontProvider {
    type Shaper = ParleyShaper;

    fn shaper(&self, style: &CaptionStyle) -> CaptionResult<ParleyShaper> {
        ParleyShaper::new(self.require_face()?, style)
    }
}

/// Parley-backed shaper bound to one face and size.
pub struct ParleyShaper {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<()>,
    family: String,
    font: vello_cpu::peniko::FontData,
    font_size: f32,
    font_weight: f32,
}

impl ParleyShaper {
    pub fn new(face: &FontFace, style: &CaptionStyle) -> CaptionResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx.collection.register_fonts(
            parley::fontique::Blob::from(face.bytes.as_ref().clone()),
            None,
        );
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            CaptionError::font_unavailable("no font families registered from font bytes")
        })?;
        let family = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| CaptionError::font_unavailable("registered font family has no name"))?
            .to_string();

        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(face.bytes.as_ref().clone()),
            face.index,
        );

        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family,
            font,
            font_size: style.font_size,
            font_weight: style.font_weight,
        })
    }

    fn build_layout(&mut self, text: &str) -> parley::Layout<()> {
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(self.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(self.font_size));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::new(self.font_weight),
        ));

        let mut layout: parley::Layout<()> = builder.build(text);
        layout.break_all_lines(None);
        layout
    }
}

impl CaptionShaper for ParleyShaper {
    fn measure_width(&mut self, text: &str) -> f32 {
        self.build_layout(text).width()
    }

    fn shape_line(&mut self, text: &str) -> CaptionResult<ShapedLine> {
        let layout = self.build_layout(text);

        let mut runs = Vec::new();
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let baseline = run.baseline();
                let glyphs: Vec<vello_cpu::Glyph> = run
                    .positioned_glyphs()
                    .map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x,
                        y: g.y - baseline,
                    })
                    .collect();
                if glyphs.is_empty() {
                    continue;
                }
                runs.push(ShapedRun {
                    font: self.font.clone(),
                    font_size: run.run().font_size(),
                    glyphs,
                });
            }
        }

        Ok(ShapedLine {
            text: text.to_string(),
            width: layout.width(),
            runs,
        })
    }
}
