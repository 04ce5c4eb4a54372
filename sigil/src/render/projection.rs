//! Matrix plumbing between tile-local geometry, the label plane, and clip
//! space.
//!
//! The label plane is where text layout and anchor shifting happen: either
//! screen pixels (viewport-aligned symbols) or tile units (map-pitch-aligned
//! symbols, projected per vertex in the shader). Everything here is a pure
//! function of the tile, the camera snapshot, and the alignment flags.

use glam::{Mat4, Vec3};

use crate::tile::TileCoord;
use crate::transform::{MapTransform, ProjectionMode};

/// The three matrices one symbol draw needs, derived together so they share
/// a single globe transition sample.
#[derive(Clone, Copy, Debug)]
pub struct TileMatrices {
    /// Tile units to clip space.
    pub clip: Mat4,
    /// Label plane used by the vertex shader each frame.
    pub label_plane_rendering: Mat4,
    /// Label plane used once per frame for placement decisions.
    pub label_plane_placement: Mat4,
    /// Label plane back to clip space.
    pub gl_coord: Mat4,
    /// Shared transition sample for this draw call.
    pub globe_transition: f32,
}

pub fn tile_matrices(
    transform: &MapTransform,
    coord: TileCoord,
    pitch_with_map: bool,
    rotate_with_map: bool,
) -> TileMatrices {
    let clip = transform.clip_matrix(coord);
    let pixels_to_tile_units = transform.pixels_to_tile_units(coord);
    TileMatrices {
        clip,
        label_plane_rendering: label_plane_matrix_for_rendering(
            &clip,
            pitch_with_map,
            rotate_with_map,
            transform,
            pixels_to_tile_units,
        ),
        label_plane_placement: label_plane_matrix_for_placement(
            &clip,
            pitch_with_map,
            rotate_with_map,
            transform,
            pixels_to_tile_units,
        ),
        gl_coord: gl_coord_matrix(&clip, pitch_with_map, rotate_with_map, transform, pixels_to_tile_units),
        globe_transition: transform.globe_transition(),
    }
}

/// Label plane matrix for the once-per-frame placement path.
///
/// Pitch-aligned symbols keep their label plane in (scaled) tile units;
/// viewport-aligned symbols project all the way to screen pixels.
pub fn label_plane_matrix_for_placement(
    clip: &Mat4,
    pitch_with_map: bool,
    rotate_with_map: bool,
    transform: &MapTransform,
    pixels_to_tile_units: f32,
) -> Mat4 {
    if pitch_with_map {
        let mut m = Mat4::from_scale(Vec3::new(
            1.0 / pixels_to_tile_units,
            1.0 / pixels_to_tile_units,
            1.0,
        ));
        if !rotate_with_map {
            m *= Mat4::from_rotation_z(transform.bearing);
        }
        m
    } else {
        screen_from_clip(transform) * *clip
    }
}

/// Label plane matrix handed to the vertex shader.
///
/// For pitch-aligned symbols the shader projects each vertex itself, so the
/// plane stays identity; otherwise it matches the placement matrix.
pub fn label_plane_matrix_for_rendering(
    clip: &Mat4,
    pitch_with_map: bool,
    rotate_with_map: bool,
    transform: &MapTransform,
    pixels_to_tile_units: f32,
) -> Mat4 {
    if pitch_with_map {
        Mat4::IDENTITY
    } else {
        label_plane_matrix_for_placement(clip, pitch_with_map, rotate_with_map, transform, pixels_to_tile_units)
    }
}

/// Matrix taking label-plane positions back to clip space.
pub fn gl_coord_matrix(
    clip: &Mat4,
    pitch_with_map: bool,
    rotate_with_map: bool,
    transform: &MapTransform,
    pixels_to_tile_units: f32,
) -> Mat4 {
    if pitch_with_map {
        let mut m = *clip
            * Mat4::from_scale(Vec3::new(pixels_to_tile_units, pixels_to_tile_units, 1.0));
        if !rotate_with_map {
            m *= Mat4::from_rotation_z(-transform.bearing);
        }
        m
    } else {
        clip_from_screen(transform)
    }
}

/// Tile units per meter, corrected for the active projection.
///
/// Mercator stretches ground distance away from the equator, so elevation
/// offsets have to grow with it; the sphere does not.
pub fn meters_to_tile_units(transform: &MapTransform, coord: TileCoord) -> f32 {
    let base = transform.meters_to_tile_units(coord);
    match transform.projection {
        ProjectionMode::Mercator => base / tile_center_latitude(coord).cos().max(0.01),
        ProjectionMode::Globe => base,
    }
}

/// Latitude of the tile's center row, in radians.
fn tile_center_latitude(coord: TileCoord) -> f32 {
    let tiles = (1u64 << coord.z) as f64;
    let n = std::f64::consts::PI * (1.0 - 2.0 * (coord.y as f64 + 0.5) / tiles);
    n.sinh().atan() as f32
}

/// Clip space (post divide) into screen pixels, y down.
fn screen_from_clip(transform: &MapTransform) -> Mat4 {
    Mat4::from_scale(Vec3::new(transform.width * 0.5, -transform.height * 0.5, 1.0))
        * Mat4::from_translation(Vec3::new(1.0, -1.0, 0.0))
}

/// Screen pixels back into clip space.
fn clip_from_screen(transform: &MapTransform) -> Mat4 {
    Mat4::from_translation(Vec3::new(-1.0, 1.0, 0.0))
        * Mat4::from_scale(Vec3::new(2.0 / transform.width, -2.0 / transform.height, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::project;
    use glam::Vec2;

    fn transform(pitch: f32, bearing: f32) -> MapTransform {
        MapTransform::new(
            800.0,
            600.0,
            4.0,
            pitch,
            bearing,
            Vec2::new(1024.0, 1024.0),
            ProjectionMode::Mercator,
        )
    }

    #[test]
    fn screen_and_clip_conversions_invert() {
        let t = transform(0.0, 0.0);
        let roundtrip = screen_from_clip(&t) * clip_from_screen(&t);
        let p = roundtrip * glam::Vec4::new(123.0, 456.0, 0.0, 1.0);
        assert!((p.x - 123.0).abs() < 1e-3);
        assert!((p.y - 456.0).abs() < 1e-3);
    }

    #[test]
    fn pitch_aligned_label_plane_stays_in_tile_units() {
        let t = transform(0.5, 0.0);
        let coord = TileCoord::new(4, 8, 8);
        let clip = t.clip_matrix(coord);
        let p2t = t.pixels_to_tile_units(coord);
        let m = label_plane_matrix_for_placement(&clip, true, true, &t, p2t);
        // A step of one pixel-equivalent in tile units maps to one pixel.
        let (a, _) = project(&m, Vec3::new(0.0, 0.0, 0.0));
        let (b, _) = project(&m, Vec3::new(p2t, 0.0, 0.0));
        assert!(((b.x - a.x) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn rendering_label_plane_is_identity_when_pitch_aligned() {
        let t = transform(0.3, 0.2);
        let coord = TileCoord::new(4, 8, 8);
        let clip = t.clip_matrix(coord);
        let p2t = t.pixels_to_tile_units(coord);
        let m = label_plane_matrix_for_rendering(&clip, true, false, &t, p2t);
        assert_eq!(m, Mat4::IDENTITY);
        let viewport = label_plane_matrix_for_rendering(&clip, false, false, &t, p2t);
        assert_ne!(viewport, Mat4::IDENTITY);
    }

    #[test]
    fn shared_transition_sample_in_tile_matrices() {
        let mut t = transform(0.0, 0.0);
        t.projection = ProjectionMode::Globe;
        let matrices = tile_matrices(&t, TileCoord::new(4, 1, 2), false, false);
        assert_eq!(matrices.globe_transition, t.globe_transition());
    }

    #[test]
    fn equator_tile_needs_no_mercator_correction() {
        let t = transform(0.0, 0.0);
        // Row straddling the equator at z1.
        let coord = TileCoord::new(1, 0, 0);
        let corrected = meters_to_tile_units(&t, coord);
        let base = t.meters_to_tile_units(coord);
        // Northern half tile center sits above the equator, so the factor
        // only grows.
        assert!(corrected >= base);
    }
}
