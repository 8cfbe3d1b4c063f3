use std::collections::HashMap;

use euclid::{Box2D, Point2D, Size2D, UnknownUnit};

/// One glyph placed in a [`Block`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlyphEntry {
    /// Character code this entry renders.
    pub code: char,
    /// `(face, block)` arena indices of the owning block.
    pub owner: (usize, usize),
    /// Placement in texture pixel space.
    pub rect: Box2D<u32, UnknownUnit>,
    /// Live references held by consumers. Eviction never touches an entry
    /// with a non-zero count.
    pub external_use: u32,
}

/// A fixed-size cell of a face texture, packing glyph rects left-to-right,
/// top-to-bottom within its own bounds.
///
/// Packing is append-only: removing a glyph deletes its map entry but never
/// moves the cursor. Space is only reclaimed through slot reuse or by
/// tearing the whole block down.
pub struct Block {
    size_class: u32,
    area: Box2D<u32, UnknownUnit>,
    cursor: Point2D<u32, UnknownUnit>,
    row_advance: u32,
    pub(crate) glyphs: HashMap<char, GlyphEntry, fxhash::FxBuildHasher>,
}

impl Block {
    pub(crate) fn new(area: Box2D<u32, UnknownUnit>) -> Self {
        Self {
            size_class: 0,
            area,
            cursor: area.min,
            row_advance: 0,
            glyphs: HashMap::with_hasher(fxhash::FxBuildHasher::default()),
        }
    }

    /// Hands the block to a size class: resets the packing cursor to the
    /// area's top-left and records the row advance for that class.
    pub(crate) fn assign(&mut self, size_class: u32, row_advance: u32) {
        self.size_class = size_class;
        self.cursor = self.area.min;
        self.row_advance = row_advance;
        self.glyphs.clear();
    }

    /// Reserves a glyph-sized rect at the cursor, wrapping to the next row
    /// when the current one runs out of width. `None` when the block is
    /// full or the glyph can never fit its area.
    pub(crate) fn reserve(&mut self, size: Size2D<u32, UnknownUnit>) -> Option<Box2D<u32, UnknownUnit>> {
        if self.row_advance == 0 || size.width > self.area.width() {
            return None;
        }

        if self.cursor.x + size.width > self.area.max.x {
            self.cursor.x = self.area.min.x;
            self.cursor.y += self.row_advance;
        }
        if self.cursor.y + size.height > self.area.max.y {
            return None;
        }

        let rect = Box2D::new(
            self.cursor,
            Point2D::new(self.cursor.x + size.width, self.cursor.y + size.height),
        );
        self.cursor.x += size.width;
        Some(rect)
    }

    /// Deletes a glyph's map entry. The cursor is untouched.
    pub(crate) fn remove(&mut self, code: char) -> Option<GlyphEntry> {
        self.glyphs.remove(&code)
    }

    pub fn size_class(&self) -> u32 {
        self.size_class
    }

    pub fn area(&self) -> Box2D<u32, UnknownUnit> {
        self.area
    }

    pub fn glyph(&self, code: char) -> Option<&GlyphEntry> {
        self.glyphs.get(&code)
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }
}
