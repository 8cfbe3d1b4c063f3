//! # Katsuji
//!
//! A glyph atlas cache for text rendering in Rust.
//!
//! ## Overview
//!
//! `Katsuji` packs rasterized character bitmaps from one or more font
//! families into a small set of growable textures and reuses packed space
//! under memory pressure. The core of the library is the [`AtlasCache`],
//! which partitions one texture per font family into fixed-size blocks,
//! grows textures on demand without disturbing placed glyphs, and reclaims
//! space through one of three eviction strategies (LRU, append, or
//! automatic).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use katsuji::{AtlasSystem, AtlasConfig};
//!
//! // 1. Create an AtlasSystem and load fonts
//! let system = AtlasSystem::new(AtlasConfig::default());
//! system.load_system_fonts();
//!
//! // 2. Resolve characters to texture placements
//! let placement = system.resolve("sans-serif", 16, 'A');
//!
//! // 3. Feed the texture id and UV rect to your renderer
//! if let Ok(placement) = placement {
//!     let _uv = placement.uv_rect();
//! }
//! ```
//!
//! Renderers that manage their own texture memory implement
//! [`TextureBackend`] and drive [`AtlasCache`] directly; custom font
//! stacks implement [`GlyphRasterizer`].
//!
//! ## Features
//!
//! *   **Growable atlases**: textures double in size up to a configured
//!     maximum, preserving every placed glyph.
//! *   **Eviction strategies**: LRU slot reuse, append-only growth, or an
//!     automatic combination.
//! *   **Pluggable collaborators**: rasterization and texture storage sit
//!     behind traits; a fontdue rasterizer and a CPU backend are included.

pub mod atlas;
pub mod font_store;
pub mod raster;
pub mod system;
pub mod texture;

// common re-exports
pub use atlas::{
    AtlasCache, AtlasConfig, AtlasError, EvictionStrategy, GlyphKeying, GlyphPlacement,
    ResolvedString,
};
pub use font_store::FontStore;
pub use raster::{FontdueRasterizer, GlyphRasterizer, RasterGlyph};
pub use system::AtlasSystem;
pub use texture::{CpuTextureBackend, TextureBackend, TextureError, TextureId};

// re-export dependencies
pub use fontdb;
pub use fontdue;
pub use parking_lot;
