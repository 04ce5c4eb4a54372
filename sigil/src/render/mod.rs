//! The per-frame symbol draw pipeline.
//!
//! One call to [`draw_symbols`] renders a symbol layer for one frame:
//! variable anchors are resolved for every visible tile, occlusion queries
//! are serviced, render states are built per (tile, kind) and the resulting
//! draw list is issued in sorted order.

mod batch;
mod occlusion;
pub(crate) mod program;
mod projection;
mod variable_anchor;

pub use batch::{
    build_render_state, issue_draws, push_entries, sort_entries, DrawEntry, IconRenderState,
    RenderState, StateCommon, SymbolKind, TextRenderState, ATLAS_TEXTURE_UNIT,
    ICON_ATLAS_TEXTURE_UNIT,
};
pub use occlusion::{update_occlusion, OCCLUSION_QUERY_WINDOW};
pub use program::{ProgramCache, ProgramCapabilities, ProgramKind};
pub use projection::{
    gl_coord_matrix, label_plane_matrix_for_placement, label_plane_matrix_for_rendering,
    meters_to_tile_units, tile_matrices, TileMatrices,
};
pub use variable_anchor::{update_variable_anchors, ResolvedShift};

use crate::gfx::{DebugBox, GraphicsContext, LightingUniforms};
use crate::placement::PlacementView;
use crate::style::SymbolLayerStyle;
use crate::tile::{TileCache, TileCoord};
use crate::transform::{ElevationSampler, MapTransform};
use glam::Vec3;

/// Per-frame inputs that are not layer or camera state.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameParams {
    pub frame_counter: u64,
    /// Draws occlusion test quads in state colors instead of querying.
    pub occlusion_visualize: bool,
}

/// Renders one symbol layer for the current frame.
///
/// Everything happens as a side effect on `ctx`; tiles with missing buckets
/// or atlases contribute nothing. Anchor resolution runs for all tiles
/// before the first render state is built because icon-text-fit shifts are
/// looked up across the full placed set.
#[allow(clippy::too_many_arguments)]
pub fn draw_symbols(
    ctx: &mut dyn GraphicsContext,
    programs: &mut ProgramCache,
    tiles: &mut TileCache,
    style: &SymbolLayerStyle,
    coords: &[TileCoord],
    transform: &MapTransform,
    placement: &PlacementView<'_>,
    elevation: Option<&dyn ElevationSampler>,
    lighting: &LightingUniforms,
    frame: &FrameParams,
) {
    if style.variable_anchors {
        for &coord in coords {
            if let Some(bucket) = tiles
                .tile_mut(coord)
                .and_then(|tile| tile.symbol_bucket_mut(&style.id))
            {
                variable_anchor::update_variable_anchors(
                    ctx, bucket, coord, transform, style, placement, elevation,
                );
            }
        }
    }

    if style.occlusion_active() {
        for &coord in coords {
            if let Some(bucket) = tiles
                .tile_mut(coord)
                .and_then(|tile| tile.symbol_bucket_mut(&style.id))
            {
                occlusion::update_occlusion(
                    ctx,
                    bucket,
                    coord,
                    transform,
                    style,
                    placement,
                    frame.frame_counter,
                    frame.occlusion_visualize,
                );
            }
        }
    }

    let mut states: Vec<RenderState<'_>> = Vec::new();
    let mut entries: Vec<DrawEntry> = Vec::new();

    // Icons for all tiles first, then all text. With a sort key active the
    // per-segment entries are re-ordered below instead.
    for kind in [SymbolKind::Icon, SymbolKind::Text] {
        for &coord in coords {
            let Some(bucket) = tiles
                .tile(coord)
                .and_then(|tile| tile.symbol_bucket(&style.id))
            else {
                continue;
            };
            if let Some(state) =
                batch::build_render_state(ctx, programs, bucket, kind, coord, transform, style)
            {
                let index = states.len();
                batch::push_entries(&mut entries, index, &state.common().buffers.segments);
                states.push(state);
            }
        }
    }

    if style.sorts_by_key() {
        batch::sort_entries(&mut entries);
    }

    batch::issue_draws(ctx, &states, &entries, lighting);
}

/// Debug overlay: one box per symbol instance showing the collision
/// candidate the placement pass worked with.
pub fn draw_collision_debug(
    ctx: &mut dyn GraphicsContext,
    tiles: &TileCache,
    style: &SymbolLayerStyle,
    coords: &[TileCoord],
    transform: &MapTransform,
    placement: &PlacementView<'_>,
) {
    const SHOWN: [f32; 4] = [0.2, 0.6, 1.0, 1.0];
    const HIDDEN: [f32; 4] = [1.0, 0.2, 0.2, 0.5];
    // Fallback box for instances the placement pass measured no label for.
    const DEFAULT_BOX: (f32, f32) = (16.0, 16.0);

    for &coord in coords {
        let Some(bucket) = tiles
            .tile(coord)
            .and_then(|tile| tile.symbol_bucket(&style.id))
        else {
            continue;
        };
        let clip = transform.clip_matrix(coord);
        for instance in &bucket.instances {
            let hidden = placement.is_hidden(instance.cross_tile_id);
            let (width, height) = placement
                .offset(instance.cross_tile_id)
                .map(|offset| (offset.width, offset.height))
                .unwrap_or(DEFAULT_BOX);
            ctx.draw_debug_box(&DebugBox {
                clip_matrix: clip,
                anchor: Vec3::new(instance.anchor.x, instance.anchor.y, 0.0),
                width,
                height,
                color: if hidden { HIDDEN } else { SHOWN },
            });
        }
    }
}
