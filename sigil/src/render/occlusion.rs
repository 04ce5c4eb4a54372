//! GPU visibility queries deciding whether symbols sit behind terrain.
//!
//! Each tested instance owns one query object for its whole lifetime. The
//! result arrives frames later, so the instance keeps its previous answer
//! until the new one is consumed; a pending query is never reissued.

use std::sync::Once;

use glam::Vec3;
use log::warn;

use crate::bucket::{OcclusionQuery, OcclusionState, QueryState, SymbolBucket};
use crate::gfx::{GraphicsContext, OccluderQuad};
use crate::placement::PlacementView;
use crate::render::projection;
use crate::style::SymbolLayerStyle;
use crate::tile::TileCoord;
use crate::transform::MapTransform;

/// Frames between tests of the same instance. Spreads query traffic so a
/// bucket with hundreds of symbols does not test all of them every frame.
pub const OCCLUSION_QUERY_WINDOW: u64 = 4;

/// Half extent of the occluder quad in screen pixels.
const OCCLUDER_EXTENT: f32 = 2.0;

/// Visualize-mode colors: green for instances last seen visible, red for
/// occluded ones.
const VISUALIZE_VISIBLE: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const VISUALIZE_OCCLUDED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

static GLOBE_OCCLUSION_WARNING: Once = Once::new();

/// Runs the per-instance query state machine for one bucket.
///
/// `frame_counter` drives the sampling window: instance `i` is eligible to
/// start a new query only when `(frame_counter + i) % window == 0`.
pub fn update_occlusion(
    ctx: &mut dyn GraphicsContext,
    bucket: &mut SymbolBucket,
    coord: TileCoord,
    transform: &MapTransform,
    style: &SymbolLayerStyle,
    placement: &PlacementView,
    frame_counter: u64,
    visualize: bool,
) {
    if !style.occlusion_active() {
        return;
    }
    if transform.globe_active() {
        GLOBE_OCCLUSION_WARNING.call_once(|| {
            warn!("occlusion queries are not supported under the globe projection, skipping");
        });
        return;
    }

    let clip = transform.clip_matrix(coord);
    let meters_to_tile = projection::meters_to_tile_units(transform, coord);

    let instances = &mut bucket.instances;
    let queries = &mut bucket.queries;

    for (index, instance) in instances.iter_mut().enumerate() {
        // No query churn for symbols the placement pass already hid.
        if placement.is_hidden(instance.cross_tile_id) {
            continue;
        }

        let anchor = Vec3::new(
            instance.anchor.x,
            instance.anchor.y,
            instance.elevation * meters_to_tile,
        );

        if visualize {
            // Window of one: every instance draws its state color each
            // frame, and no results are read back.
            let color = match instance.occlusion {
                OcclusionState::Visible => VISUALIZE_VISIBLE,
                OcclusionState::Occluded => VISUALIZE_OCCLUDED,
            };
            ctx.draw_occluder(&OccluderQuad {
                clip_matrix: clip,
                anchor,
                extent: OCCLUDER_EXTENT,
                color: Some(color),
            });
            continue;
        }

        let slot = queries.slot_mut(index);

        // Consume a finished result first; this is the only place the
        // persisted state changes.
        if let Some(query) = slot.as_mut() {
            if query.state == QueryState::Pending && ctx.poll_query(query.handle) {
                let samples = ctx.read_query(query.handle);
                instance.occlusion = if samples > 0 {
                    OcclusionState::Visible
                } else {
                    OcclusionState::Occluded
                };
                query.state = QueryState::Free;
            }
        }

        if (frame_counter + index as u64) % OCCLUSION_QUERY_WINDOW != 0 {
            continue;
        }

        if slot.is_none() {
            *slot = Some(OcclusionQuery {
                handle: ctx.create_query(),
                state: QueryState::Free,
            });
        }
        let query = slot.as_mut().expect("slot populated above");
        if query.state == QueryState::Pending {
            continue;
        }

        ctx.begin_query(query.handle);
        ctx.draw_occluder(&OccluderQuad {
            clip_matrix: clip,
            anchor,
            extent: OCCLUDER_EXTENT,
            color: None,
        });
        ctx.end_query(query.handle);
        query.state = QueryState::Pending;
    }
}
