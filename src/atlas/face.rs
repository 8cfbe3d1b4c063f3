use std::collections::{HashMap, HashSet, VecDeque};

use euclid::{Box2D, Point2D, Size2D, UnknownUnit};

use crate::texture::{TextureBackend, TextureError, TextureId};

use super::block::Block;

/// One font family's set of atlas storage: a single texture partitioned
/// into a grid of fixed-size cells.
///
/// Every cell the face will ever own is created up front, over the
/// configured *maximum* texture extent. Cells inside the current extent
/// start in the free queue; cells beyond it are reserved until
/// [`Face::extend_texture`] exposes them. A cell is always in exactly one
/// of: the free queue, the reserved set, or one size class's block list.
pub struct Face {
    family_id: u32,
    name: String,
    texture: TextureId,
    texture_size: Size2D<u32, UnknownUnit>,
    max_texture_size: Size2D<u32, UnknownUnit>,
    blocks: Vec<Block>,
    free: VecDeque<usize>,
    reserved: HashSet<usize, fxhash::FxBuildHasher>,
    size_classes: HashMap<u32, Vec<usize>, fxhash::FxBuildHasher>,
}

impl Face {
    /// Creates the face and its initial texture.
    pub(crate) fn new(
        family_id: u32,
        name: &str,
        initial_size: Size2D<u32, UnknownUnit>,
        max_size: Size2D<u32, UnknownUnit>,
        cell_size: Size2D<u32, UnknownUnit>,
        textures: &mut dyn TextureBackend,
    ) -> Result<Self, TextureError> {
        debug_assert!(cell_size.width > 0 && cell_size.height > 0);

        let texture = textures.create(initial_size)?;

        let cols = max_size.width / cell_size.width;
        let rows = max_size.height / cell_size.height;

        let mut blocks = Vec::with_capacity((cols * rows) as usize);
        let mut free = VecDeque::new();
        let mut reserved = HashSet::with_hasher(fxhash::FxBuildHasher::default());

        for row in 0..rows {
            for col in 0..cols {
                let id = blocks.len();
                let origin = Point2D::new(col * cell_size.width, row * cell_size.height);
                let area = Box2D::new(
                    origin,
                    Point2D::new(origin.x + cell_size.width, origin.y + cell_size.height),
                );
                blocks.push(Block::new(area));

                if cell_within(area, initial_size) {
                    free.push_back(id);
                } else {
                    reserved.insert(id);
                }
            }
        }

        Ok(Self {
            family_id,
            name: name.to_string(),
            texture,
            texture_size: initial_size,
            max_texture_size: max_size,
            blocks,
            free,
            reserved,
            size_classes: HashMap::with_hasher(fxhash::FxBuildHasher::default()),
        })
    }

    /// Pops a free cell and assigns it to a size class. `None` when no free
    /// cell remains; the caller decides whether to grow the texture.
    pub(crate) fn create_block(&mut self, size_class: u32, row_advance: u32) -> Option<usize> {
        let id = self.free.pop_front()?;
        self.blocks[id].assign(size_class, row_advance);
        self.size_classes.entry(size_class).or_default().push(id);
        Some(id)
    }

    /// Grows the backing texture, doubling the width until it reaches the
    /// maximum, then the height. Existing cells keep their pixel
    /// coordinates and contents; cells the larger extent now covers move
    /// from the reserved set to the free queue.
    ///
    /// Returns `Ok(false)` when the texture is already at its maximum size.
    ///
    /// # Panics
    /// When a newly exposed cell is missing from the reserved set. That
    /// means the partition bookkeeping is corrupt.
    pub(crate) fn extend_texture(
        &mut self,
        textures: &mut dyn TextureBackend,
    ) -> Result<bool, TextureError> {
        let current = self.texture_size;
        let max = self.max_texture_size;

        let next = if current.width * 2 <= max.width {
            Size2D::new(current.width * 2, current.height)
        } else if current.height * 2 <= max.height {
            Size2D::new(max.width, current.height * 2)
        } else {
            Size2D::new(max.width, max.height)
        };

        if next == current {
            return Ok(false);
        }

        let new_texture = textures.create(next)?;
        if let Err(e) = textures.copy(self.texture, new_texture, current) {
            textures.release(new_texture);
            return Err(e);
        }
        textures.release(self.texture);

        for id in 0..self.blocks.len() {
            let area = self.blocks[id].area();
            if !cell_within(area, current) && cell_within(area, next) {
                assert!(
                    self.reserved.remove(&id),
                    "atlas cell {id} of face {:?} not in the reserved set during growth",
                    self.name,
                );
                self.free.push_back(id);
            }
        }

        log::debug!(
            "face {:?}: texture grown {}x{} -> {}x{}",
            self.name,
            current.width,
            current.height,
            next.width,
            next.height,
        );

        self.texture = new_texture;
        self.texture_size = next;
        Ok(true)
    }

    /// Whether a free cell is ready for [`Face::create_block`].
    pub(crate) fn is_block_available(&self) -> bool {
        !self.free.is_empty()
    }

    /// Whether reserved cells remain, i.e. the texture can still grow.
    pub(crate) fn is_texture_available(&self) -> bool {
        !self.reserved.is_empty()
    }

    pub(crate) fn newest_class_block(&self, size_class: u32) -> Option<usize> {
        self.size_classes
            .get(&size_class)
            .and_then(|list| list.last().copied())
    }

    /// Block ids assigned to a size class, oldest first.
    pub(crate) fn class_blocks(&self, size_class: u32) -> &[usize] {
        match self.size_classes.get(&size_class) {
            Some(list) => list.as_slice(),
            None => &[],
        }
    }

    pub(crate) fn block(&self, id: usize) -> &Block {
        &self.blocks[id]
    }

    pub(crate) fn block_mut(&mut self, id: usize) -> &mut Block {
        &mut self.blocks[id]
    }

    pub fn family_id(&self) -> u32 {
        self.family_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn texture_size(&self) -> Size2D<u32, UnknownUnit> {
        self.texture_size
    }

    pub fn free_cells(&self) -> usize {
        self.free.len()
    }

    pub fn reserved_cells(&self) -> usize {
        self.reserved.len()
    }

    pub fn assigned_cells(&self) -> usize {
        self.size_classes.values().map(Vec::len).sum()
    }

    pub fn total_cells(&self) -> usize {
        self.blocks.len()
    }
}

fn cell_within(area: Box2D<u32, UnknownUnit>, extent: Size2D<u32, UnknownUnit>) -> bool {
    area.max.x <= extent.width && area.max.y <= extent.height
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::CpuTextureBackend;

    fn size(w: u32, h: u32) -> Size2D<u32, UnknownUnit> {
        Size2D::new(w, h)
    }

    fn face(
        initial: Size2D<u32, UnknownUnit>,
        max: Size2D<u32, UnknownUnit>,
        backend: &mut CpuTextureBackend,
    ) -> Face {
        Face::new(0, "test", initial, max, size(128, 128), backend).unwrap()
    }

    fn partition_holds(face: &Face) -> bool {
        face.free_cells() + face.reserved_cells() + face.assigned_cells() == face.total_cells()
    }

    #[test]
    fn cells_partition_into_free_and_reserved() {
        let mut backend = CpuTextureBackend::new();
        let face = face(size(256, 128), size(512, 256), &mut backend);

        // grid over the max extent: 4x2 cells, 2 inside the initial extent
        assert_eq!(face.total_cells(), 8);
        assert_eq!(face.free_cells(), 2);
        assert_eq!(face.reserved_cells(), 6);
        assert!(partition_holds(&face));
    }

    #[test]
    fn create_block_moves_cell_to_size_class() {
        let mut backend = CpuTextureBackend::new();
        let mut face = face(size(256, 128), size(512, 256), &mut backend);

        let id = face.create_block(12, 14).unwrap();
        assert_eq!(face.class_blocks(12), &[id]);
        assert_eq!(face.newest_class_block(12), Some(id));
        assert_eq!(face.free_cells(), 1);
        assert!(partition_holds(&face));
    }

    #[test]
    fn growth_doubles_width_first_then_height() {
        let mut backend = CpuTextureBackend::new();
        let mut face = face(size(256, 128), size(512, 256), &mut backend);

        assert!(face.extend_texture(&mut backend).unwrap());
        assert_eq!(face.texture_size(), size(512, 128));

        assert!(face.extend_texture(&mut backend).unwrap());
        assert_eq!(face.texture_size(), size(512, 256));

        assert!(!face.extend_texture(&mut backend).unwrap());
        assert_eq!(face.texture_size(), size(512, 256));
    }

    #[test]
    fn growth_exposes_reserved_cells() {
        let mut backend = CpuTextureBackend::new();
        let mut face = face(size(256, 128), size(512, 256), &mut backend);

        assert!(face.extend_texture(&mut backend).unwrap());
        // row 0 is fully covered now: 4 free, row 1 still reserved
        assert_eq!(face.free_cells(), 4);
        assert_eq!(face.reserved_cells(), 4);
        assert!(partition_holds(&face));

        assert!(face.extend_texture(&mut backend).unwrap());
        assert_eq!(face.free_cells(), 8);
        assert_eq!(face.reserved_cells(), 0);
        assert!(partition_holds(&face));
    }

    #[test]
    fn growth_keeps_cell_coordinates() {
        let mut backend = CpuTextureBackend::new();
        let mut face = face(size(256, 128), size(512, 256), &mut backend);

        let id = face.create_block(10, 12).unwrap();
        let area_before = face.block(id).area();

        face.extend_texture(&mut backend).unwrap();
        face.extend_texture(&mut backend).unwrap();

        assert_eq!(face.block(id).area(), area_before);
    }

    #[test]
    fn growth_preserves_pixels() {
        let mut backend = CpuTextureBackend::new();
        let mut face = face(size(256, 128), size(512, 256), &mut backend);

        let rect = Box2D::new(Point2D::new(10, 20), Point2D::new(12, 22));
        backend
            .write(face.texture(), rect, &[1, 2, 3, 4])
            .unwrap();

        face.extend_texture(&mut backend).unwrap();

        let data = backend.data(face.texture()).unwrap();
        let stride = face.texture_size().width as usize;
        assert_eq!(data[20 * stride + 10], 1);
        assert_eq!(data[20 * stride + 11], 2);
        assert_eq!(data[21 * stride + 10], 3);
        assert_eq!(data[21 * stride + 11], 4);
    }

    #[test]
    fn growth_releases_the_old_texture() {
        let mut backend = CpuTextureBackend::new();
        let mut face = face(size(256, 128), size(512, 256), &mut backend);

        let old = face.texture();
        face.extend_texture(&mut backend).unwrap();

        assert_ne!(face.texture(), old);
        assert_eq!(backend.len(), 1);
    }
}
