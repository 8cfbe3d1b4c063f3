use euclid::{Size2D, UnknownUnit};

use crate::texture::{TextureBackend, TextureError};

use super::block::GlyphEntry;
use super::face::Face;

/// How the cache finds room when the newest block of a size class is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvictionStrategy {
    /// Try [`EvictionStrategy::Lru`] first, fall back to
    /// [`EvictionStrategy::Append`].
    #[default]
    Auto,
    /// Reuse the slot of an unreferenced glyph already packed for the size
    /// class. Never allocates new cells or grows the texture.
    Lru,
    /// Assign a fresh block, growing the backing texture when no free cell
    /// remains.
    Append,
}

/// Space found by a strategy.
pub(crate) enum Reclaimed {
    /// A victim's slot, vacated and ready for reuse at its exact origin.
    /// The evicted entry is handed back so the caller can drop its index
    /// record.
    Slot { block: usize, evicted: GlyphEntry },
    /// A freshly assigned block for the size class.
    Block { block: usize },
}

impl EvictionStrategy {
    pub(crate) fn try_reclaim(
        self,
        face: &mut Face,
        size_class: u32,
        needed: Size2D<u32, UnknownUnit>,
        row_advance: u32,
        textures: &mut dyn TextureBackend,
    ) -> Result<Option<Reclaimed>, TextureError> {
        match self {
            Self::Lru => Ok(reclaim_lru(face, size_class, needed)),
            Self::Append => reclaim_append(face, size_class, row_advance, textures),
            Self::Auto => match reclaim_lru(face, size_class, needed) {
                Some(found) => Ok(Some(found)),
                None => reclaim_append(face, size_class, row_advance, textures),
            },
        }
    }
}

/// Scans the size class's blocks for the first entry that is not externally
/// referenced and whose slot is large enough, and vacates it.
fn reclaim_lru(
    face: &mut Face,
    size_class: u32,
    needed: Size2D<u32, UnknownUnit>,
) -> Option<Reclaimed> {
    let candidates = face.class_blocks(size_class).to_vec();

    for block_id in candidates {
        let block = face.block_mut(block_id);
        let victim = block
            .glyphs
            .iter()
            .find(|(_, entry)| {
                entry.external_use == 0
                    && entry.rect.width() >= needed.width
                    && entry.rect.height() >= needed.height
            })
            .map(|(&code, _)| code);

        if let Some(code) = victim {
            if let Some(evicted) = block.remove(code) {
                log::debug!(
                    "face {:?}: evicted {:?} from block {block_id} for size class {size_class}",
                    face.name(),
                    evicted.code,
                );
                return Some(Reclaimed::Slot {
                    block: block_id,
                    evicted,
                });
            }
        }
    }
    None
}

/// Pulls a free cell for the size class, growing the texture as often as
/// needed to expose one. Fails only when the texture is at its maximum size
/// and no cell remains.
fn reclaim_append(
    face: &mut Face,
    size_class: u32,
    row_advance: u32,
    textures: &mut dyn TextureBackend,
) -> Result<Option<Reclaimed>, TextureError> {
    while !face.is_block_available() {
        if !face.is_texture_available() || !face.extend_texture(textures)? {
            return Ok(None);
        }
    }

    Ok(face
        .create_block(size_class, row_advance)
        .map(|block| Reclaimed::Block { block }))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::CpuTextureBackend;
    use euclid::Point2D;

    fn size(w: u32, h: u32) -> Size2D<u32, UnknownUnit> {
        Size2D::new(w, h)
    }

    /// Face with a single 128x128 cell and one block assigned to size 40.
    fn one_block_face(backend: &mut CpuTextureBackend) -> (Face, usize) {
        let mut face = Face::new(0, "test", size(128, 128), size(128, 128), size(128, 128), backend)
            .unwrap();
        let block = face.create_block(40, 40).unwrap();
        (face, block)
    }

    fn put_glyph(face: &mut Face, block: usize, code: char, width: u32, external_use: u32) {
        let rect = face.block_mut(block).reserve(size(width, 40)).unwrap();
        face.block_mut(block).glyphs.insert(
            code,
            GlyphEntry {
                code,
                owner: (0, block),
                rect,
                external_use,
            },
        );
    }

    #[test]
    fn lru_reclaims_an_unreferenced_slot() {
        let mut backend = CpuTextureBackend::new();
        let (mut face, block) = one_block_face(&mut backend);
        put_glyph(&mut face, block, 'a', 24, 0);

        let reclaimed = reclaim_lru(&mut face, 40, size(20, 40));
        let Some(Reclaimed::Slot { block: b, evicted }) = reclaimed else {
            panic!("expected a reclaimed slot");
        };
        assert_eq!(b, block);
        assert_eq!(evicted.code, 'a');
        assert_eq!(evicted.rect.min, Point2D::new(0, 0));
        assert_eq!(face.block(block).glyph_count(), 0);
    }

    #[test]
    fn lru_never_touches_referenced_entries() {
        let mut backend = CpuTextureBackend::new();
        let (mut face, block) = one_block_face(&mut backend);
        put_glyph(&mut face, block, 'a', 24, 1);
        put_glyph(&mut face, block, 'b', 24, 2);

        assert!(reclaim_lru(&mut face, 40, size(20, 40)).is_none());
        assert_eq!(face.block(block).glyph_count(), 2);
    }

    #[test]
    fn lru_skips_slots_that_are_too_narrow() {
        let mut backend = CpuTextureBackend::new();
        let (mut face, block) = one_block_face(&mut backend);
        put_glyph(&mut face, block, 'i', 6, 0);
        put_glyph(&mut face, block, 'w', 30, 0);

        let reclaimed = reclaim_lru(&mut face, 40, size(24, 40));
        let Some(Reclaimed::Slot { evicted, .. }) = reclaimed else {
            panic!("expected a reclaimed slot");
        };
        assert_eq!(evicted.code, 'w');
    }

    #[test]
    fn lru_fails_on_an_unknown_size_class() {
        let mut backend = CpuTextureBackend::new();
        let (mut face, _) = one_block_face(&mut backend);
        assert!(reclaim_lru(&mut face, 12, size(8, 12)).is_none());
    }

    #[test]
    fn append_uses_free_cells_before_growing() {
        let mut backend = CpuTextureBackend::new();
        let mut face = Face::new(0, "test", size(256, 128), size(256, 128), size(128, 128), &mut backend)
            .unwrap();
        face.create_block(40, 40).unwrap();

        let reclaimed = reclaim_append(&mut face, 40, 40, &mut backend).unwrap();
        assert!(matches!(reclaimed, Some(Reclaimed::Block { .. })));
        assert_eq!(face.texture_size(), size(256, 128));
    }

    #[test]
    fn append_grows_when_no_cell_is_free() {
        let mut backend = CpuTextureBackend::new();
        let mut face = Face::new(0, "test", size(128, 128), size(256, 128), size(128, 128), &mut backend)
            .unwrap();
        face.create_block(40, 40).unwrap();

        let reclaimed = reclaim_append(&mut face, 40, 40, &mut backend).unwrap();
        assert!(matches!(reclaimed, Some(Reclaimed::Block { .. })));
        assert_eq!(face.texture_size(), size(256, 128));
        assert_eq!(face.assigned_cells(), 2);
    }

    #[test]
    fn append_fails_at_maximum_size() {
        let mut backend = CpuTextureBackend::new();
        let (mut face, _) = one_block_face(&mut backend);

        let reclaimed = reclaim_append(&mut face, 40, 40, &mut backend).unwrap();
        assert!(reclaimed.is_none());
    }

    #[test]
    fn auto_falls_back_to_append() {
        let mut backend = CpuTextureBackend::new();
        let mut face = Face::new(0, "test", size(128, 128), size(256, 128), size(128, 128), &mut backend)
            .unwrap();
        let block = face.create_block(40, 40).unwrap();
        // the only entry is protected, so LRU has nothing to take
        put_glyph(&mut face, block, 'a', 24, 1);

        let reclaimed = EvictionStrategy::Auto
            .try_reclaim(&mut face, 40, size(24, 40), 40, &mut backend)
            .unwrap();
        assert!(matches!(reclaimed, Some(Reclaimed::Block { .. })));
    }
}
