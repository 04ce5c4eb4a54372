//! Sigil - the symbol rendering pipeline of a tiled map renderer.
//!
//! Given visible tiles holding pre-baked glyph and icon geometry, sigil
//! computes screen-correct placement under flat and globe projection,
//! resolves occlusion against the depth buffer with GPU visibility queries,
//! applies variable-anchor text repositioning, and emits a sorted, batched
//! draw list through a driver-provided graphics context.

pub mod bucket;
pub mod gfx;
pub mod math;
pub mod placement;
pub mod render;
pub mod style;
pub mod tile;
pub mod transform;

pub use crate::bucket::{
    DynamicVertex, OcclusionState, PlacedSymbol, Segment, SymbolBucket, SymbolBuffers,
    SymbolInstance, WritingMode, EXTENT,
};
pub use crate::gfx::{GraphicsContext, LightingUniforms, RecordingContext};
pub use crate::placement::{AnchorCorner, PlacementView, VariableOffset};
pub use crate::render::{draw_collision_debug, draw_symbols, FrameParams, ProgramCache};
pub use crate::style::{Alignment, SizeCurve, SymbolLayerStyle};
pub use crate::tile::{Tile, TileCache, TileCoord};
pub use crate::transform::{ElevationSampler, MapTransform, ProjectionMode};
