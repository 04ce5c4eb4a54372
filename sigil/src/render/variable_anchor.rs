//! Per-frame variable-anchor repositioning of text, with icon follow-up.
//!
//! The placement pass hands us one candidate offset per label; this module
//! rewrites the dynamic vertex attributes of the tile's text bucket to that
//! offset and, when the layer ties icons to text, replays the exact same
//! shift onto the icon bucket. Two strict passes: the text pass fills a
//! shift table keyed by icon index, the icon pass consumes it.

use std::collections::HashMap;

use glam::{Vec2, Vec3};

use crate::bucket::{DynamicVertex, SymbolBucket, WritingMode};
use crate::gfx::GraphicsContext;
use crate::math::{perspective_ratio, project, rotate};
use crate::placement::{PlacementView, VariableOffset};
use crate::render::projection;
use crate::style::SymbolLayerStyle;
use crate::tile::TileCoord;
use crate::transform::{ElevationSampler, MapTransform};

/// Final placement a text symbol resolved to, replayed onto its icon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedShift {
    pub position: Vec3,
    pub angle: f32,
}

/// Rewrites the dynamic vertex data of `bucket` for this frame.
///
/// Both the text and (when icon-text-fit is active) icon buffers are fully
/// cleared and refilled in placed-symbol order before upload; symbols with
/// no applicable candidate come out hidden.
pub fn update_variable_anchors(
    ctx: &mut dyn GraphicsContext,
    bucket: &mut SymbolBucket,
    coord: TileCoord,
    transform: &MapTransform,
    style: &SymbolLayerStyle,
    placement: &PlacementView,
    elevation: Option<&dyn ElevationSampler>,
) {
    let pitch_with_map = style.text_pitch_with_map();
    let rotate_with_map = style.text_rotate_with_map();
    let matrices = projection::tile_matrices(transform, coord, pitch_with_map, rotate_with_map);
    let pixels_to_tile_units = transform.pixels_to_tile_units(coord);
    let meters_to_tile = projection::meters_to_tile_units(transform, coord);

    // Which labels the placement pass put into vertical orientation.
    let vertical: HashMap<u64, bool> = bucket
        .instances
        .iter()
        .map(|i| (i.cross_tile_id, i.placed_vertical))
        .collect();

    let mut shifts: HashMap<u32, ResolvedShift> = HashMap::new();

    for slot in bucket.text.dynamic_vertices.iter_mut() {
        *slot = DynamicVertex::HIDDEN;
    }

    for index in 0..bucket.text.placed.len() {
        let placed = bucket.text.placed[index].clone();
        let offset = placement.offset(placed.cross_tile_id);
        let placed_vertical = vertical
            .get(&placed.cross_tile_id)
            .copied()
            .unwrap_or(false);
        let skip_orientation = match placed.orientation {
            WritingMode::Vertical => !placed_vertical,
            WritingMode::Horizontal => placed_vertical,
        };

        let Some(offset) = offset else {
            continue;
        };
        if placed.hidden || skip_orientation || placement.is_hidden(placed.cross_tile_id) {
            continue;
        }

        let mut anchor = placed.anchor;
        if let Some(sampler) = elevation {
            // Displace along the local surface up vector; on the flat map
            // this is a plain z offset.
            let up = sampler.up_vector(coord, anchor.x, anchor.y);
            anchor += up * (sampler.elevation(coord, anchor.x, anchor.y) * meters_to_tile);
        }

        let (projected, _) = project(&matrices.label_plane_placement, anchor);
        // Camera distance comes from the clip projection; the label plane
        // loses it for pitch-aligned symbols.
        let (_, camera_distance) = project(&matrices.clip, anchor);
        let ratio = perspective_ratio(transform.camera_to_center_distance, camera_distance);
        let render_size = style.text_size.evaluate(transform.zoom as f32) * ratio;
        let shift = render_shift(offset, render_size);

        let (position, base_angle) = if pitch_with_map {
            // Shifts on pitched map-aligned text follow the tile plane, so
            // the shifted anchor is re-projected instead of nudged on
            // screen.
            let tile_shift = shift * pixels_to_tile_units;
            let shifted = Vec3::new(anchor.x + tile_shift.x, anchor.y + tile_shift.y, anchor.z);
            let (p, _) = project(&matrices.label_plane_placement, shifted);
            let angle = if rotate_with_map { 0.0 } else { transform.bearing };
            (p, angle)
        } else {
            let screen_shift = if rotate_with_map {
                rotate(shift, -transform.bearing)
            } else {
                shift
            };
            (
                Vec3::new(
                    projected.x + screen_shift.x,
                    projected.y + screen_shift.y,
                    projected.z,
                ),
                0.0,
            )
        };

        // Vertical glyph runs take their quarter turn after projection.
        let angle = if placed.orientation == WritingMode::Vertical {
            base_angle + std::f32::consts::FRAC_PI_2
        } else {
            base_angle
        };

        bucket
            .text
            .write_glyphs(index, DynamicVertex::new(position, angle));

        if style.icon_text_fit {
            if let Some(icon) = placed.associated_icon {
                shifts.insert(icon, ResolvedShift { position, angle });
            }
        }
    }

    bucket.text.upload_dynamic(ctx);

    if style.icon_text_fit && !bucket.icon.is_empty() {
        apply_icon_shifts(ctx, bucket, &shifts);
    }
}

/// Second pass: icons inherit their text's resolved placement verbatim;
/// icons whose text went hidden go hidden too.
fn apply_icon_shifts(
    ctx: &mut dyn GraphicsContext,
    bucket: &mut SymbolBucket,
    shifts: &HashMap<u32, ResolvedShift>,
) {
    for slot in bucket.icon.dynamic_vertices.iter_mut() {
        *slot = DynamicVertex::HIDDEN;
    }
    for index in 0..bucket.icon.placed.len() {
        if let Some(shift) = shifts.get(&(index as u32)) {
            bucket
                .icon
                .write_glyphs(index, DynamicVertex::new(shift.position, shift.angle));
        }
    }
    bucket.icon.upload_dynamic(ctx);
}

/// Pixel shift moving the measured label box onto its anchor corner, plus
/// the user offset, scaled to the currently rendered text size.
fn render_shift(offset: &VariableOffset, render_size: f32) -> Vec2 {
    let (h_align, v_align) = offset.anchor.alignment();
    let scale = offset.text_scale.max(f32::MIN_POSITIVE);
    Vec2::new(
        (-(h_align - 0.5) * offset.width / scale + offset.text_offset[0]) * render_size,
        (-(v_align - 0.5) * offset.height / scale + offset.text_offset[1]) * render_size,
    )
}
