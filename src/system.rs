use std::path::PathBuf;

use parking_lot::Mutex;

use crate::{
    atlas::{AtlasCache, AtlasConfig, AtlasError, GlyphPlacement, ResolvedString},
    raster::FontdueRasterizer,
    texture::{CpuTextureBackend, TextureId},
};

/// High-level entry point for the glyph atlas.
///
/// Bundles a [`FontdueRasterizer`], a [`CpuTextureBackend`], and an
/// [`AtlasCache`] behind one value. Use `Mutex` to allow shared mutable
/// access, which is common in UI frameworks.
///
/// The fields are public to allow direct access to the underlying
/// components when necessary (e.g. to drive the cache with a custom
/// texture backend).
pub struct AtlasSystem {
    /// The rasterizer and its font store.
    pub rasterizer: Mutex<FontdueRasterizer>,
    /// The texture storage all faces allocate from.
    pub textures: Mutex<CpuTextureBackend>,
    /// The cache itself.
    pub cache: Mutex<AtlasCache>,
}

impl Default for AtlasSystem {
    fn default() -> Self {
        Self::new(AtlasConfig::default())
    }
}

impl AtlasSystem {
    pub fn new(config: AtlasConfig) -> Self {
        Self {
            rasterizer: Mutex::new(FontdueRasterizer::new()),
            textures: Mutex::new(CpuTextureBackend::new()),
            cache: Mutex::new(AtlasCache::new(config)),
        }
    }
}

/// font loading
impl AtlasSystem {
    /// Loads the system fonts.
    pub fn load_system_fonts(&self) {
        self.rasterizer.lock().store_mut().load_system_fonts();
    }

    /// Loads a font from binary data.
    pub fn load_font_binary(&self, data: impl Into<Vec<u8>>) {
        self.rasterizer.lock().store_mut().load_font_binary(data);
    }

    /// Loads a font from a file path.
    pub fn load_font_file(&self, path: PathBuf) -> Result<(), std::io::Error> {
        self.rasterizer.lock().store_mut().load_font_file(path)
    }

    /// Loads all fonts from a directory.
    pub fn load_fonts_dir(&self, dir: PathBuf) {
        self.rasterizer.lock().store_mut().load_fonts_dir(dir)
    }
}

/// cache operations
impl AtlasSystem {
    /// Resolves one character to its atlas placement.
    pub fn resolve(
        &self,
        family: &str,
        size: u32,
        code: char,
    ) -> Result<GlyphPlacement, AtlasError> {
        let mut rasterizer = self.rasterizer.lock();
        let mut textures = self.textures.lock();
        self.cache
            .lock()
            .resolve(family, size, code, &mut *rasterizer, &mut *textures)
    }

    /// Resolves every codepoint of a string.
    pub fn resolve_string(
        &self,
        family: &str,
        size: u32,
        text: &str,
    ) -> Result<ResolvedString, AtlasError> {
        let mut rasterizer = self.rasterizer.lock();
        let mut textures = self.textures.lock();
        self.cache
            .lock()
            .resolve_string(family, size, text, &mut *rasterizer, &mut *textures)
    }

    /// Marks a placed glyph as externally referenced.
    pub fn retain(&self, family: &str, size: u32, code: char) -> bool {
        self.cache.lock().retain(family, size, code)
    }

    /// Drops one external reference taken with [`AtlasSystem::retain`].
    pub fn release(&self, family: &str, size: u32, code: char) -> bool {
        self.cache.lock().release(family, size, code)
    }

    /// Drops every cached glyph and face texture.
    pub fn clear(&self) {
        let mut textures = self.textures.lock();
        self.cache.lock().clear(&mut *textures);
    }

    /// Copies out the raw A8 pixels of an atlas texture.
    ///
    /// # Performance
    /// This method allocates a new `Vec` to avoid holding a lock on the
    /// backend. If you need borrowed access, lock `textures` directly.
    pub fn texture_data(&self, texture: TextureId) -> Option<Vec<u8>> {
        self.textures.lock().data(texture).map(<[u8]>::to_vec)
    }
}
