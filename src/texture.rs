use std::collections::HashMap;

use euclid::{Box2D, Size2D, UnknownUnit};

/// Identifies one texture owned by a [`TextureBackend`].
///
/// Ids are only meaningful to the backend that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(u32);

/// Failures reported by a texture backend.
///
/// These originate in the windowing/GPU layer and are propagated through the
/// atlas unmodified.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    /// The backend could not allocate a texture of the requested size.
    #[error("texture allocation of {width}x{height} failed: {reason}")]
    Allocation {
        width: u32,
        height: u32,
        reason: String,
    },
    /// The id does not name a live texture of this backend.
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    /// A write or copy touched pixels outside the texture extent.
    #[error("region out of texture bounds")]
    OutOfBounds,
}

/// Storage for atlas textures.
///
/// The atlas drives all of its pixel traffic through this trait: blank
/// texture creation, glyph uploads, the old-into-new copy performed when a
/// texture grows, and release of replaced textures. Implementations wrap
/// whatever the surrounding renderer uses for texture memory; the crate
/// ships [`CpuTextureBackend`] as the main-memory reference implementation.
///
/// Pixels are single-channel coverage (A8), row-major.
pub trait TextureBackend {
    /// Creates a zero-filled texture of the given pixel size.
    fn create(&mut self, size: Size2D<u32, UnknownUnit>) -> Result<TextureId, TextureError>;

    /// Writes `coverage` into `rect`. `coverage` holds exactly
    /// `rect.width() * rect.height()` bytes.
    fn write(
        &mut self,
        texture: TextureId,
        rect: Box2D<u32, UnknownUnit>,
        coverage: &[u8],
    ) -> Result<(), TextureError>;

    /// Copies the top-left `size` region of `src` into the top-left of
    /// `dst`, leaving the rest of `dst` untouched.
    fn copy(
        &mut self,
        src: TextureId,
        dst: TextureId,
        size: Size2D<u32, UnknownUnit>,
    ) -> Result<(), TextureError>;

    /// Releases a texture. Unknown ids are ignored.
    fn release(&mut self, texture: TextureId);
}

struct CpuTexture {
    size: Size2D<u32, UnknownUnit>,
    pixels: Vec<u8>,
}

/// Main-memory [`TextureBackend`] holding A8 pixel buffers.
pub struct CpuTextureBackend {
    textures: HashMap<TextureId, CpuTexture, fxhash::FxBuildHasher>,
    next_id: u32,
}

impl Default for CpuTextureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuTextureBackend {
    pub fn new() -> Self {
        Self {
            textures: HashMap::with_hasher(fxhash::FxBuildHasher::default()),
            next_id: 0,
        }
    }

    /// Number of live textures.
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether no texture is live.
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Borrows the raw pixels of a texture, row-major.
    pub fn data(&self, texture: TextureId) -> Option<&[u8]> {
        self.textures.get(&texture).map(|t| t.pixels.as_slice())
    }

    /// Pixel size of a texture.
    pub fn size(&self, texture: TextureId) -> Option<Size2D<u32, UnknownUnit>> {
        self.textures.get(&texture).map(|t| t.size)
    }
}

impl TextureBackend for CpuTextureBackend {
    fn create(&mut self, size: Size2D<u32, UnknownUnit>) -> Result<TextureId, TextureError> {
        let len = (size.width as usize)
            .checked_mul(size.height as usize)
            .ok_or_else(|| TextureError::Allocation {
                width: size.width,
                height: size.height,
                reason: "size overflows usize".to_string(),
            })?;

        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(
            id,
            CpuTexture {
                size,
                pixels: vec![0; len],
            },
        );
        Ok(id)
    }

    fn write(
        &mut self,
        texture: TextureId,
        rect: Box2D<u32, UnknownUnit>,
        coverage: &[u8],
    ) -> Result<(), TextureError> {
        let tex = self
            .textures
            .get_mut(&texture)
            .ok_or(TextureError::UnknownTexture(texture))?;

        if rect.max.x > tex.size.width || rect.max.y > tex.size.height {
            return Err(TextureError::OutOfBounds);
        }

        let width = rect.width() as usize;
        let height = rect.height() as usize;
        debug_assert_eq!(coverage.len(), width * height);

        let stride = tex.size.width as usize;
        for row in 0..height {
            let src = row * width;
            let dst = (rect.min.y as usize + row) * stride + rect.min.x as usize;
            tex.pixels[dst..dst + width].copy_from_slice(&coverage[src..src + width]);
        }
        Ok(())
    }

    fn copy(
        &mut self,
        src: TextureId,
        dst: TextureId,
        size: Size2D<u32, UnknownUnit>,
    ) -> Result<(), TextureError> {
        let src_tex = self
            .textures
            .get(&src)
            .ok_or(TextureError::UnknownTexture(src))?;
        if size.width > src_tex.size.width || size.height > src_tex.size.height {
            return Err(TextureError::OutOfBounds);
        }

        // snapshot the source region so the destination can be borrowed mutably
        let src_stride = src_tex.size.width as usize;
        let width = size.width as usize;
        let mut region = Vec::with_capacity(width * size.height as usize);
        for row in 0..size.height as usize {
            let from = row * src_stride;
            region.extend_from_slice(&src_tex.pixels[from..from + width]);
        }

        let dst_tex = self
            .textures
            .get_mut(&dst)
            .ok_or(TextureError::UnknownTexture(dst))?;
        if size.width > dst_tex.size.width || size.height > dst_tex.size.height {
            return Err(TextureError::OutOfBounds);
        }

        let dst_stride = dst_tex.size.width as usize;
        for row in 0..size.height as usize {
            let from = row * width;
            let to = row * dst_stride;
            dst_tex.pixels[to..to + width].copy_from_slice(&region[from..from + width]);
        }
        Ok(())
    }

    fn release(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use euclid::{Point2D, Size2D};

    fn rect(x: u32, y: u32, w: u32, h: u32) -> Box2D<u32, UnknownUnit> {
        Box2D::new(Point2D::new(x, y), Point2D::new(x + w, y + h))
    }

    #[test]
    fn write_then_read_back() {
        let mut backend = CpuTextureBackend::new();
        let id = backend.create(Size2D::new(4, 4)).unwrap();

        backend.write(id, rect(1, 1, 2, 2), &[1, 2, 3, 4]).unwrap();

        let data = backend.data(id).unwrap();
        assert_eq!(data[4 + 1], 1);
        assert_eq!(data[4 + 2], 2);
        assert_eq!(data[8 + 1], 3);
        assert_eq!(data[8 + 2], 4);
        assert_eq!(data[0], 0);
    }

    #[test]
    fn write_out_of_bounds_is_rejected() {
        let mut backend = CpuTextureBackend::new();
        let id = backend.create(Size2D::new(4, 4)).unwrap();

        let result = backend.write(id, rect(2, 2, 4, 4), &[0; 16]);
        assert!(matches!(result, Err(TextureError::OutOfBounds)));
    }

    #[test]
    fn copy_preserves_top_left_region() {
        let mut backend = CpuTextureBackend::new();
        let small = backend.create(Size2D::new(2, 2)).unwrap();
        let large = backend.create(Size2D::new(4, 4)).unwrap();

        backend
            .write(small, rect(0, 0, 2, 2), &[9, 8, 7, 6])
            .unwrap();
        backend.copy(small, large, Size2D::new(2, 2)).unwrap();

        let data = backend.data(large).unwrap();
        assert_eq!(&data[0..2], &[9, 8]);
        assert_eq!(&data[4..6], &[7, 6]);
        assert_eq!(data[2], 0);
    }

    #[test]
    fn released_texture_is_unknown() {
        let mut backend = CpuTextureBackend::new();
        let id = backend.create(Size2D::new(2, 2)).unwrap();
        backend.release(id);

        let result = backend.write(id, rect(0, 0, 1, 1), &[0]);
        assert!(matches!(result, Err(TextureError::UnknownTexture(_))));
        assert!(backend.is_empty());
    }
}
