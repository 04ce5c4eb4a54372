//! Baked per-tile symbol geometry and per-instance bookkeeping.
//!
//! Buckets arrive from the geometry baking stage with their static vertex
//! and index buffers already uploaded; the pipeline only rewrites the
//! dynamic per-glyph attributes and the per-instance visibility state.

use anyhow::{bail, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::gfx::{BufferHandle, GraphicsContext, QueryHandle, TextureHandle};

/// Tile-local coordinate extent. Anchors and baked geometry live in
/// [0, EXTENT) on both axes.
pub const EXTENT: f32 = 8192.0;

/// Each glyph quad owns four consecutive dynamic vertex slots.
pub const VERTICES_PER_GLYPH: usize = 4;

/// Per-glyph attributes rewritten every frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DynamicVertex {
    pub pos: [f32; 3],
    pub angle: f32,
}

impl DynamicVertex {
    /// Degenerate position the vertex shader discards.
    pub const HIDDEN: Self = Self {
        pos: [f32::NEG_INFINITY, f32::NEG_INFINITY, 0.0],
        angle: 0.0,
    };

    pub fn new(pos: Vec3, angle: f32) -> Self {
        Self {
            pos: [pos.x, pos.y, pos.z],
            angle,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.pos[0] == f32::NEG_INFINITY
    }
}

/// Contiguous range of the static buffers drawable in one call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub vertex_offset: u32,
    pub index_start: u32,
    pub index_count: u32,
    /// Cross-layer draw priority for this range of features.
    pub sort_key: f32,
}

/// Orientation a symbol was placed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WritingMode {
    #[default]
    Horizontal,
    Vertical,
}

/// One rendered glyph or icon run.
#[derive(Clone, Debug)]
pub struct PlacedSymbol {
    /// Anchor in tile units, z carries the baked elevation offset.
    pub anchor: Vec3,
    /// First glyph quad in the dynamic buffer.
    pub glyph_start: u32,
    pub glyph_count: u32,
    /// Flipped by downstream visibility decisions; everything else is
    /// immutable once baked.
    pub hidden: bool,
    pub orientation: WritingMode,
    pub cross_tile_id: u64,
    /// Index of the paired icon in the icon buffers, when the layer ties
    /// icon position to text position.
    pub associated_icon: Option<u32>,
}

/// Last known answer of the occlusion test for an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OcclusionState {
    #[default]
    Visible,
    Occluded,
}

/// Stable per-feature record shared by the text and icon runs of a symbol.
#[derive(Clone, Debug)]
pub struct SymbolInstance {
    pub cross_tile_id: u64,
    /// Anchor in tile units.
    pub anchor: Vec2,
    /// Baked elevation offset in meters.
    pub elevation: f32,
    /// Whether the placement pass chose the vertical orientation.
    pub placed_vertical: bool,
    pub icon_index: Option<u32>,
    /// Stale-but-valid: holds the previous answer until the next query
    /// result is consumed.
    pub occlusion: OcclusionState,
}

/// Lifecycle of one visibility query slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryState {
    Free,
    Pending,
}

/// A GPU query bound to one symbol instance for its whole lifetime.
#[derive(Clone, Copy, Debug)]
pub struct OcclusionQuery {
    pub handle: QueryHandle,
    pub state: QueryState,
}

/// Query slots indexed by symbol-instance position. Owned by the bucket and
/// released with it, so there is exactly one owner for every query object.
#[derive(Default)]
pub struct QueryArena {
    slots: Vec<Option<OcclusionQuery>>,
}

impl QueryArena {
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&OcclusionQuery> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut Option<OcclusionQuery> {
        &mut self.slots[index]
    }

    pub fn release_all(&mut self, ctx: &mut dyn GraphicsContext) {
        for slot in self.slots.iter_mut() {
            if let Some(query) = slot.take() {
                ctx.release_query(query.handle);
            }
        }
    }
}

/// GPU-ready geometry for one kind (text or icon) within a bucket.
pub struct SymbolBuffers {
    pub segments: Vec<Segment>,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub dynamic_buffer: Option<BufferHandle>,
    /// CPU mirror of the dynamic buffer; cleared and refilled in placed
    /// symbol order every frame it is touched, never partially updated.
    pub dynamic_vertices: Vec<DynamicVertex>,
    pub placed: Vec<PlacedSymbol>,
    pub atlas: Option<TextureHandle>,
    pub atlas_size: [f32; 2],
    /// Whether the atlas holds signed distance fields.
    pub sdf: bool,
}

impl SymbolBuffers {
    pub fn new(vertex_buffer: BufferHandle, index_buffer: BufferHandle) -> Self {
        Self {
            segments: Vec::new(),
            vertex_buffer,
            index_buffer,
            dynamic_buffer: None,
            dynamic_vertices: Vec::new(),
            placed: Vec::new(),
            atlas: None,
            atlas_size: [0.0; 2],
            sdf: false,
        }
    }

    /// Sizes the dynamic mirror for `glyph_count` quads, all hidden.
    pub fn allocate_glyphs(&mut self, glyph_count: usize) {
        self.dynamic_vertices = vec![DynamicVertex::HIDDEN; glyph_count * VERTICES_PER_GLYPH];
    }

    pub fn glyph_capacity(&self) -> usize {
        self.dynamic_vertices.len() / VERTICES_PER_GLYPH
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() || self.placed.is_empty()
    }

    /// Writes one value to every dynamic slot of a placed symbol.
    pub fn write_glyphs(&mut self, placed_index: usize, vertex: DynamicVertex) {
        let placed = &self.placed[placed_index];
        let start = placed.glyph_start as usize * VERTICES_PER_GLYPH;
        let end = start + placed.glyph_count as usize * VERTICES_PER_GLYPH;
        for slot in &mut self.dynamic_vertices[start..end] {
            *slot = vertex;
        }
    }

    /// Pushes the rewritten dynamic mirror to the GPU in one upload.
    pub fn upload_dynamic(&self, ctx: &mut dyn GraphicsContext) {
        if let Some(buffer) = self.dynamic_buffer {
            ctx.upload_buffer(buffer, bytemuck::cast_slice(&self.dynamic_vertices));
        }
    }

    fn validate(&self, kind: &str) -> Result<()> {
        let capacity = self.glyph_capacity() as u64;
        for (i, placed) in self.placed.iter().enumerate() {
            let end = placed.glyph_start as u64 + placed.glyph_count as u64;
            if end > capacity {
                bail!(
                    "{kind} symbol {i} glyph range {}..{end} exceeds dynamic capacity {capacity}",
                    placed.glyph_start
                );
            }
        }
        Ok(())
    }
}

/// All symbol geometry of one layer within one tile.
pub struct SymbolBucket {
    pub text: SymbolBuffers,
    pub icon: SymbolBuffers,
    pub instances: Vec<SymbolInstance>,
    pub queries: QueryArena,
}

impl SymbolBucket {
    pub fn new(text: SymbolBuffers, icon: SymbolBuffers, instances: Vec<SymbolInstance>) -> Self {
        let queries = QueryArena::with_len(instances.len());
        Self {
            text,
            icon,
            instances,
            queries,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn has_icon(&self) -> bool {
        !self.icon.is_empty()
    }

    /// Checks the cross-references the pipeline relies on. Run once when a
    /// bucket is registered, not per frame.
    pub fn validate(&self) -> Result<()> {
        self.text.validate("text")?;
        self.icon.validate("icon")?;
        let icon_count = self.icon.placed.len() as u32;
        for (i, placed) in self.text.placed.iter().enumerate() {
            if let Some(icon) = placed.associated_icon {
                if icon >= icon_count {
                    bail!("text symbol {i} references icon {icon} of {icon_count}");
                }
            }
        }
        for (i, instance) in self.instances.iter().enumerate() {
            if let Some(icon) = instance.icon_index {
                if icon >= icon_count {
                    bail!("instance {i} references icon {icon} of {icon_count}");
                }
            }
        }
        Ok(())
    }

    /// Hands every live query back to the driver. Called on tile eviction;
    /// pending results are simply abandoned.
    pub fn release_queries(mut self, ctx: &mut dyn GraphicsContext) {
        self.queries.release_all(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffers_with_one_symbol(glyphs: u32) -> SymbolBuffers {
        let mut buffers = SymbolBuffers::new(BufferHandle(1), BufferHandle(2));
        buffers.allocate_glyphs(glyphs as usize);
        buffers.placed.push(PlacedSymbol {
            anchor: Vec3::new(100.0, 200.0, 0.0),
            glyph_start: 0,
            glyph_count: glyphs,
            hidden: false,
            orientation: WritingMode::Horizontal,
            cross_tile_id: 7,
            associated_icon: None,
        });
        buffers.segments.push(Segment {
            vertex_offset: 0,
            index_start: 0,
            index_count: glyphs * 6,
            sort_key: 0.0,
        });
        buffers
    }

    #[test]
    fn write_glyphs_touches_every_slot() {
        let mut buffers = buffers_with_one_symbol(3);
        let vertex = DynamicVertex::new(Vec3::new(1.0, 2.0, 3.0), 0.5);
        buffers.write_glyphs(0, vertex);
        assert_eq!(buffers.dynamic_vertices.len(), 12);
        assert!(buffers.dynamic_vertices.iter().all(|v| *v == vertex));
    }

    #[test]
    fn hidden_vertex_roundtrip() {
        assert!(DynamicVertex::HIDDEN.is_hidden());
        assert!(!DynamicVertex::new(Vec3::ZERO, 0.0).is_hidden());
    }

    #[test]
    fn validate_rejects_out_of_range_glyphs() {
        let mut buffers = buffers_with_one_symbol(2);
        buffers.placed[0].glyph_count = 5;
        let bucket = SymbolBucket::new(buffers, SymbolBuffers::new(BufferHandle(3), BufferHandle(4)), Vec::new());
        assert!(bucket.validate().is_err());
    }

    #[test]
    fn validate_rejects_dangling_icon_reference() {
        let mut text = buffers_with_one_symbol(1);
        text.placed[0].associated_icon = Some(3);
        let bucket = SymbolBucket::new(text, SymbolBuffers::new(BufferHandle(3), BufferHandle(4)), Vec::new());
        assert!(bucket.validate().is_err());
    }

    #[test]
    fn arena_len_tracks_instances() {
        let bucket = SymbolBucket::new(
            buffers_with_one_symbol(1),
            SymbolBuffers::new(BufferHandle(3), BufferHandle(4)),
            vec![SymbolInstance {
                cross_tile_id: 7,
                anchor: Vec2::new(100.0, 200.0),
                elevation: 0.0,
                placed_vertical: false,
                icon_index: None,
                occlusion: OcclusionState::default(),
            }],
        );
        assert_eq!(bucket.queries.len(), 1);
        assert!(bucket.queries.slot(0).is_none());
    }
}
