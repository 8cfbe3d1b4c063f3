use euclid::{Size2D, UnknownUnit};

use crate::font_store::FontStore;

/// A rasterized glyph ready for atlas upload.
///
/// The coverage buffer is row-major A8 with `size.width * size.height`
/// bytes. The box is one line height tall with the glyph sitting on the
/// font baseline, so every glyph of a size class shares the same height.
pub struct RasterGlyph {
    pub size: Size2D<u32, UnknownUnit>,
    /// Horizontal advance of the glyph in pixels.
    pub advance: f32,
    pub coverage: Vec<u8>,
}

/// Produces bitmaps and advance metrics for single characters.
///
/// The atlas never touches font data directly; everything it needs from the
/// font stack comes through this trait. [`FontdueRasterizer`] is the
/// fontdue-backed implementation.
pub trait GlyphRasterizer {
    /// Pixel footprint a glyph occupies in an atlas: bitmap width by line
    /// height. `None` when the family is unknown.
    fn footprint(
        &mut self,
        family: &str,
        size: u32,
        code: char,
    ) -> Option<Size2D<u32, UnknownUnit>>;

    /// Line height (the atlas row advance) for a font size.
    fn line_height(&mut self, family: &str, size: u32) -> Option<u32>;

    /// Horizontal advance of a glyph in pixels.
    fn advance(&mut self, family: &str, size: u32, code: char) -> Option<f32>;

    /// Rasterizes one glyph. `None` when the family is unknown or the font
    /// cannot produce a bitmap for `code`.
    fn rasterize(&mut self, family: &str, size: u32, code: char) -> Option<RasterGlyph>;
}

/// [`GlyphRasterizer`] backed by [`FontStore`] and `fontdue`.
pub struct FontdueRasterizer {
    store: FontStore,
}

impl Default for FontdueRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FontdueRasterizer {
    /// Creates a rasterizer over an empty font store.
    pub fn new() -> Self {
        Self {
            store: FontStore::new(),
        }
    }

    /// Creates a rasterizer over an existing font store.
    pub fn with_store(store: FontStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FontStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut FontStore {
        &mut self.store
    }

    fn line_height_px(font: &fontdue::Font, px: f32) -> Option<u32> {
        let metrics = font.horizontal_line_metrics(px)?;
        Some((metrics.new_line_size.ceil() as u32).max(1))
    }
}

impl GlyphRasterizer for FontdueRasterizer {
    fn footprint(
        &mut self,
        family: &str,
        size: u32,
        code: char,
    ) -> Option<Size2D<u32, UnknownUnit>> {
        let font = self.store.family_font(family)?;
        let line_height = Self::line_height_px(&font, size as f32)?;
        let metrics = font.metrics(code, size as f32);
        Some(Size2D::new(metrics.width as u32, line_height))
    }

    fn line_height(&mut self, family: &str, size: u32) -> Option<u32> {
        let font = self.store.family_font(family)?;
        Self::line_height_px(&font, size as f32)
    }

    fn advance(&mut self, family: &str, size: u32, code: char) -> Option<f32> {
        let font = self.store.family_font(family)?;
        Some(font.metrics(code, size as f32).advance_width)
    }

    fn rasterize(&mut self, family: &str, size: u32, code: char) -> Option<RasterGlyph> {
        let font = self.store.family_font(family)?;
        let px = size as f32;
        let line_metrics = font.horizontal_line_metrics(px)?;
        let line_height = Self::line_height_px(&font, px)?;

        let (metrics, bitmap) = font.rasterize(code, px);

        let coverage = place_on_baseline(
            &bitmap,
            metrics.width,
            metrics.height,
            metrics.ymin,
            line_metrics.ascent.round() as i32,
            line_height,
        );

        Some(RasterGlyph {
            size: Size2D::new(metrics.width as u32, line_height),
            advance: metrics.advance_width,
            coverage,
        })
    }
}

/// Copies a glyph bitmap into a line-height-tall box, offset so the glyph
/// sits on the baseline. Rows that would fall outside the box are clipped.
fn place_on_baseline(
    bitmap: &[u8],
    width: usize,
    height: usize,
    ymin: i32,
    ascent: i32,
    line_height: u32,
) -> Vec<u8> {
    let mut coverage = vec![0u8; width * line_height as usize];

    // distance from the top of the line box to the top edge of the bitmap
    let top = (ascent - (ymin + height as i32)).max(0) as u32;
    let rows = (height as u32).min(line_height.saturating_sub(top)) as usize;

    for row in 0..rows {
        let src = row * width;
        let dst = (top as usize + row) * width;
        coverage[dst..dst + width].copy_from_slice(&bitmap[src..src + width]);
    }
    coverage
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_placement_offsets_bitmap() {
        // 2x2 glyph, baseline at y=3 in a 4-row line box, ymin = 0
        let coverage = place_on_baseline(&[1, 2, 3, 4], 2, 2, 0, 3, 4);
        assert_eq!(coverage.len(), 8);
        // top = 3 - (0 + 2) = 1: bitmap occupies rows 1 and 2
        assert_eq!(&coverage[0..2], &[0, 0]);
        assert_eq!(&coverage[2..4], &[1, 2]);
        assert_eq!(&coverage[4..6], &[3, 4]);
        assert_eq!(&coverage[6..8], &[0, 0]);
    }

    #[test]
    fn descender_reaches_below_baseline() {
        // ymin = -1 pushes the bitmap one row further down
        let coverage = place_on_baseline(&[5, 6], 1, 2, -1, 2, 4);
        assert_eq!(coverage, vec![0, 5, 6, 0]);
    }

    #[test]
    fn oversized_bitmap_is_clipped() {
        let coverage = place_on_baseline(&[1, 2, 3, 4, 5], 1, 5, 0, 5, 3);
        assert_eq!(coverage.len(), 3);
        // top = 0, only the first three rows fit
        assert_eq!(coverage, vec![1, 2, 3]);
    }

    #[test]
    fn empty_bitmap_yields_empty_column() {
        let coverage = place_on_baseline(&[], 0, 0, 0, 8, 10);
        assert!(coverage.is_empty());
    }
}
