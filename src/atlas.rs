//! Glyph atlas cache: packs rasterized character bitmaps into a small set
//! of growable textures and reuses packed space under memory pressure.

use std::collections::HashMap;

use euclid::{Box2D, Point2D, Size2D, UnknownUnit};

use crate::raster::GlyphRasterizer;
use crate::texture::{TextureBackend, TextureError, TextureId};

mod block;
mod eviction;
mod face;

pub use block::{Block, GlyphEntry};
pub use eviction::EvictionStrategy;
pub use face::Face;

use eviction::Reclaimed;

/// Which fields identify a glyph in the global index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GlyphKeying {
    /// Look glyphs up by character code alone. Distinct families and sizes
    /// requesting the same code point share one cached bitmap; the first
    /// one rendered wins. Kept as the default for compatibility with
    /// renderers built on that behavior.
    #[default]
    CharOnly,
    /// Key by family, size class, and character code, so every
    /// (family, size) pair gets its own bitmap.
    PerFontSize,
}

/// Immutable configuration of an [`AtlasCache`].
#[derive(Clone, Debug)]
pub struct AtlasConfig {
    /// Texture size every new face starts with.
    pub initial_texture_size: Size2D<u32, UnknownUnit>,
    /// Upper bound texture growth never exceeds.
    pub max_texture_size: Size2D<u32, UnknownUnit>,
    /// Size of the cells a face texture is partitioned into.
    pub block_size: Size2D<u32, UnknownUnit>,
    pub strategy: EvictionStrategy,
    pub keying: GlyphKeying,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            initial_texture_size: Size2D::new(512, 512),
            max_texture_size: Size2D::new(2048, 2048),
            block_size: Size2D::new(128, 128),
            strategy: EvictionStrategy::default(),
            keying: GlyphKeying::default(),
        }
    }
}

/// Failures of [`AtlasCache::resolve`] and friends.
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    /// The rasterizer could not produce a bitmap. The caller should render
    /// the character as empty or with a placeholder.
    #[error("no glyph bitmap for {code:?} in family {family:?} at size {size}")]
    RasterizationFailed {
        family: String,
        code: char,
        size: u32,
    },
    /// No block, no growable texture, and eviction found nothing reusable.
    /// The caller should skip the glyph.
    #[error("atlas space exhausted for family {family:?} at size {size}")]
    AllocationExhausted { family: String, size: u32 },
    /// Texture backend failure, propagated unmodified.
    #[error(transparent)]
    Texture(#[from] TextureError),
}

/// A resolved glyph: which texture it lives in and where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlyphPlacement {
    pub texture: TextureId,
    /// Current pixel size of the texture, for UV normalization.
    pub texture_size: Size2D<u32, UnknownUnit>,
    /// Placement in texture pixel space.
    pub rect: Box2D<u32, UnknownUnit>,
}

impl GlyphPlacement {
    /// Normalized UV rectangle of the glyph within its texture.
    pub fn uv_rect(&self) -> Box2D<f32, UnknownUnit> {
        let w = self.texture_size.width as f32;
        let h = self.texture_size.height as f32;
        Box2D::new(
            Point2D::new(self.rect.min.x as f32 / w, self.rect.min.y as f32 / h),
            Point2D::new(self.rect.max.x as f32 / w, self.rect.max.y as f32 / h),
        )
    }
}

/// Result of a batched [`AtlasCache::resolve_string`] call.
#[derive(Clone, Debug)]
pub struct ResolvedString {
    pub texture: TextureId,
    pub texture_size: Size2D<u32, UnknownUnit>,
    /// One entry per input codepoint, in order. `None` marks a codepoint
    /// the rasterizer could not produce a bitmap for.
    pub rects: Vec<Option<Box2D<u32, UnknownUnit>>>,
    /// Total advance width by line height of the string.
    pub size: Size2D<u32, UnknownUnit>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct GlyphKey {
    family: u32,
    size: u32,
    code: char,
}

/// Locator of a [`GlyphEntry`] inside the face/block arenas.
#[derive(Clone, Copy, Debug)]
struct GlyphAddress {
    face: usize,
    block: usize,
    code: char,
}

struct Family {
    id: u32,
    faces: Vec<usize>,
}

/// Top-level glyph atlas registry.
///
/// Maps font family names to [`Face`]s and character codes to placed
/// glyphs. One value of this type is the whole cache state; it is owned by
/// the text subsystem's initialization root and rebuilt each session.
///
/// The rasterizer and texture backend collaborators are passed into each
/// call rather than owned, so the same cache can be driven by whatever the
/// surrounding renderer provides. All operations are synchronous and
/// expect a single logical caller thread.
pub struct AtlasCache {
    config: AtlasConfig,
    faces: Vec<Face>,
    families: HashMap<String, Family, fxhash::FxBuildHasher>,
    index: HashMap<GlyphKey, GlyphAddress, fxhash::FxBuildHasher>,
}

impl AtlasCache {
    /// # Panics
    /// When the block size is zero, the initial texture cannot hold one
    /// block, or the maximum texture size is smaller than the initial one.
    pub fn new(config: AtlasConfig) -> Self {
        assert!(
            config.block_size.width > 0 && config.block_size.height > 0,
            "block size must be non-zero"
        );
        assert!(
            config.initial_texture_size.width >= config.block_size.width
                && config.initial_texture_size.height >= config.block_size.height,
            "initial texture must hold at least one block"
        );
        assert!(
            config.max_texture_size.width >= config.initial_texture_size.width
                && config.max_texture_size.height >= config.initial_texture_size.height,
            "maximum texture size must not be smaller than the initial size"
        );

        Self {
            config,
            faces: Vec::new(),
            families: HashMap::with_hasher(fxhash::FxBuildHasher::default()),
            index: HashMap::with_hasher(fxhash::FxBuildHasher::default()),
        }
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// First face of a family, if the family has been used.
    pub fn family_face(&self, family: &str) -> Option<&Face> {
        let fam = self.families.get(family)?;
        fam.faces.first().map(|&idx| &self.faces[idx])
    }

    /// Number of glyphs currently placed.
    pub fn glyph_count(&self) -> usize {
        self.index.len()
    }

    /// Returns the cached placement for a character, resolving it through
    /// the rasterizer on a miss.
    pub fn resolve(
        &mut self,
        family: &str,
        size: u32,
        code: char,
        rasterizer: &mut dyn GlyphRasterizer,
        textures: &mut dyn TextureBackend,
    ) -> Result<GlyphPlacement, AtlasError> {
        if let Some(key) = self.lookup_key(family, size, code) {
            if let Some(addr) = self.index.get(&key).copied() {
                if let Some(rect) = self
                    .faces
                    .get(addr.face)
                    .and_then(|face| face.block(addr.block).glyph(addr.code))
                    .map(|entry| entry.rect)
                {
                    let face = &self.faces[addr.face];
                    return Ok(GlyphPlacement {
                        texture: face.texture(),
                        texture_size: face.texture_size(),
                        rect,
                    });
                }
            }
        }
        self.insert(family, size, code, rasterizer, textures)
    }

    /// Resolves every codepoint of `text` against one font family and
    /// size. Codepoints the rasterizer cannot handle are skipped and
    /// reported as `None`; any other failure aborts the batch.
    pub fn resolve_string(
        &mut self,
        family: &str,
        size: u32,
        text: &str,
        rasterizer: &mut dyn GlyphRasterizer,
        textures: &mut dyn TextureBackend,
    ) -> Result<ResolvedString, AtlasError> {
        let face_idx = self.face_for(family, textures)?;

        let mut rects = Vec::new();
        let mut width = 0f32;
        for code in text.chars() {
            match self.resolve(family, size, code, rasterizer, textures) {
                Ok(placement) => {
                    rects.push(Some(placement.rect));
                    width += rasterizer.advance(family, size, code).unwrap_or(0.0);
                }
                Err(AtlasError::RasterizationFailed { .. }) => {
                    log::warn!("skipping unrasterizable codepoint {code:?}");
                    rects.push(None);
                }
                Err(e) => return Err(e),
            }
        }

        let line_height = rasterizer.line_height(family, size).unwrap_or(0);
        let face = &self.faces[face_idx];
        Ok(ResolvedString {
            texture: face.texture(),
            texture_size: face.texture_size(),
            rects,
            size: Size2D::new(width.ceil() as u32, line_height),
        })
    }

    /// Marks a placed glyph as externally referenced. Referenced glyphs
    /// are never evicted. Returns `false` when the glyph is not cached.
    pub fn retain(&mut self, family: &str, size: u32, code: char) -> bool {
        let Some(entry) = self.entry_mut(family, size, code) else {
            return false;
        };
        entry.external_use += 1;
        true
    }

    /// Drops one external reference taken with [`AtlasCache::retain`].
    /// Returns `false` when the glyph is not cached or has no reference
    /// left.
    pub fn release(&mut self, family: &str, size: u32, code: char) -> bool {
        let Some(entry) = self.entry_mut(family, size, code) else {
            return false;
        };
        if entry.external_use == 0 {
            log::warn!("release without matching retain for {code:?}");
            return false;
        }
        entry.external_use -= 1;
        true
    }

    /// Drops every face and placement, releasing their textures.
    pub fn clear(&mut self, textures: &mut dyn TextureBackend) {
        for face in &self.faces {
            textures.release(face.texture());
        }
        self.faces.clear();
        self.families.clear();
        self.index.clear();
    }
}

/// Internal plumbing.
impl AtlasCache {
    fn lookup_key(&self, family: &str, size: u32, code: char) -> Option<GlyphKey> {
        match self.config.keying {
            GlyphKeying::CharOnly => Some(GlyphKey {
                family: 0,
                size: 0,
                code,
            }),
            GlyphKeying::PerFontSize => self.families.get(family).map(|fam| GlyphKey {
                family: fam.id,
                size,
                code,
            }),
        }
    }

    fn key_for(&self, family_id: u32, size: u32, code: char) -> GlyphKey {
        match self.config.keying {
            GlyphKeying::CharOnly => GlyphKey {
                family: 0,
                size: 0,
                code,
            },
            GlyphKeying::PerFontSize => GlyphKey {
                family: family_id,
                size,
                code,
            },
        }
    }

    fn entry_mut(&mut self, family: &str, size: u32, code: char) -> Option<&mut GlyphEntry> {
        let key = self.lookup_key(family, size, code)?;
        let addr = self.index.get(&key).copied()?;
        self.faces
            .get_mut(addr.face)?
            .block_mut(addr.block)
            .glyphs
            .get_mut(&addr.code)
    }

    /// Index of the family's face, creating the face and its texture on
    /// first use.
    fn face_for(
        &mut self,
        family: &str,
        textures: &mut dyn TextureBackend,
    ) -> Result<usize, AtlasError> {
        if let Some(fam) = self.families.get(family) {
            if let Some(&idx) = fam.faces.first() {
                return Ok(idx);
            }
        }

        let family_id = self.families.len() as u32;
        let face_idx = self.faces.len();
        let face = Face::new(
            family_id,
            family,
            self.config.initial_texture_size,
            self.config.max_texture_size,
            self.config.block_size,
            textures,
        )?;
        self.faces.push(face);
        self.families.insert(
            family.to_string(),
            Family {
                id: family_id,
                faces: vec![face_idx],
            },
        );
        Ok(face_idx)
    }

    fn insert(
        &mut self,
        family: &str,
        size: u32,
        code: char,
        rasterizer: &mut dyn GlyphRasterizer,
        textures: &mut dyn TextureBackend,
    ) -> Result<GlyphPlacement, AtlasError> {
        let face_idx = self.face_for(family, textures)?;

        let Some(raster) = rasterizer.rasterize(family, size, code) else {
            log::error!("rasterization failed: family={family:?} size={size} code={code:?}");
            return Err(AtlasError::RasterizationFailed {
                family: family.to_string(),
                code,
                size,
            });
        };

        let (block_idx, rect) = self.reserve_space(face_idx, size, raster.size, textures)?;

        let face = &self.faces[face_idx];
        textures.write(face.texture(), rect, &raster.coverage)?;
        let placement = GlyphPlacement {
            texture: face.texture(),
            texture_size: face.texture_size(),
            rect,
        };
        let family_id = face.family_id();

        let entry = GlyphEntry {
            code,
            owner: (face_idx, block_idx),
            rect,
            external_use: 0,
        };
        self.faces[face_idx]
            .block_mut(block_idx)
            .glyphs
            .insert(code, entry);
        let key = self.key_for(family_id, size, code);
        self.index.insert(
            key,
            GlyphAddress {
                face: face_idx,
                block: block_idx,
                code,
            },
        );

        Ok(placement)
    }

    /// Finds packing space for a glyph footprint: the newest block of the
    /// size class, the first block of a class that has none yet, or
    /// whatever the eviction strategy can reclaim.
    fn reserve_space(
        &mut self,
        face_idx: usize,
        size_class: u32,
        footprint: Size2D<u32, UnknownUnit>,
        textures: &mut dyn TextureBackend,
    ) -> Result<(usize, Box2D<u32, UnknownUnit>), AtlasError> {
        let strategy = self.config.strategy;
        let row_advance = footprint.height;

        let face = &mut self.faces[face_idx];
        let family_id = face.family_id();

        if let Some(block_idx) = face.newest_class_block(size_class) {
            if let Some(rect) = face.block_mut(block_idx).reserve(footprint) {
                return Ok((block_idx, rect));
            }
        } else {
            // first block of this size class
            if let Some(block_idx) = face.create_block(size_class, row_advance) {
                if let Some(rect) = face.block_mut(block_idx).reserve(footprint) {
                    return Ok((block_idx, rect));
                }
                log::warn!(
                    "glyph footprint {}x{} does not fit a {}x{} block",
                    footprint.width,
                    footprint.height,
                    face.block(block_idx).area().width(),
                    face.block(block_idx).area().height(),
                );
                return Err(AtlasError::AllocationExhausted {
                    family: face.name().to_string(),
                    size: size_class,
                });
            }
        }

        match strategy.try_reclaim(face, size_class, footprint, row_advance, textures)? {
            Some(Reclaimed::Slot { block, evicted }) => {
                let key = self.key_for(family_id, size_class, evicted.code);
                if let Some(addr) = self.index.get(&key) {
                    if addr.face == face_idx && addr.block == block && addr.code == evicted.code {
                        self.index.remove(&key);
                    }
                }
                let origin = evicted.rect.min;
                Ok((
                    block,
                    Box2D::new(
                        origin,
                        Point2D::new(origin.x + footprint.width, origin.y + footprint.height),
                    ),
                ))
            }
            Some(Reclaimed::Block { block }) => {
                match face.block_mut(block).reserve(footprint) {
                    Some(rect) => Ok((block, rect)),
                    None => {
                        log::warn!(
                            "glyph footprint {}x{} does not fit a fresh block",
                            footprint.width,
                            footprint.height,
                        );
                        Err(AtlasError::AllocationExhausted {
                            family: face.name().to_string(),
                            size: size_class,
                        })
                    }
                }
            }
            None => {
                log::warn!(
                    "atlas exhausted: family={:?} size={size_class}",
                    face.name(),
                );
                Err(AtlasError::AllocationExhausted {
                    family: face.name().to_string(),
                    size: size_class,
                })
            }
        }
    }
}
