use glam::{Mat4, Vec2, Vec3, Vec4};

/// Projects a point through a matrix and performs the perspective divide.
///
/// Returns the divided position together with the original `w` component,
/// which callers need for distance-based size scaling.
pub fn project(matrix: &Mat4, point: Vec3) -> (Vec3, f32) {
    let clip = *matrix * Vec4::new(point.x, point.y, point.z, 1.0);
    let w = clip.w.max(f32::MIN_POSITIVE);
    (Vec3::new(clip.x / w, clip.y / w, clip.z / w), clip.w)
}

/// Converts a clip-space position (post perspective divide) to screen pixels.
pub fn clip_to_screen(ndc: Vec3, width: f32, height: f32) -> Vec2 {
    Vec2::new(
        (ndc.x + 1.0) * 0.5 * width,
        (1.0 - ndc.y) * 0.5 * height,
    )
}

/// Rotates a 2D vector by `angle` radians (counter-clockwise).
pub fn rotate(v: Vec2, angle: f32) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Hermite smoothstep of `x` between `edge0` and `edge1`.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Distance-based scale factor for symbols away from the screen center.
///
/// Symbols further from the camera than the map center shrink, nearer ones
/// grow. The factor is clamped so labels never collapse or explode at
/// extreme pitch.
pub fn perspective_ratio(camera_to_center_distance: f32, anchor_w: f32) -> f32 {
    let ratio = 0.5 + 0.5 * (camera_to_center_distance / anchor_w.max(f32::MIN_POSITIVE));
    ratio.clamp(0.5, 4.0)
}

/// Wraps an angle to the (-PI, PI] range.
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % std::f32::consts::TAU;
    if a > std::f32::consts::PI {
        a -= std::f32::consts::TAU;
    } else if a <= -std::f32::consts::PI {
        a += std::f32::consts::TAU;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_divides_by_w() {
        let m = Mat4::from_cols_array(&[
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 2.0,
        ]);
        let (p, w) = project(&m, Vec3::new(4.0, 6.0, 0.0));
        assert_eq!(w, 2.0);
        assert!((p.x - 2.0).abs() < 1e-6);
        assert!((p.y - 3.0).abs() < 1e-6);
    }

    #[test]
    fn clip_to_screen_maps_corners() {
        let top_left = clip_to_screen(Vec3::new(-1.0, 1.0, 0.0), 800.0, 600.0);
        assert_eq!(top_left, Vec2::new(0.0, 0.0));
        let bottom_right = clip_to_screen(Vec3::new(1.0, -1.0, 0.0), 800.0, 600.0);
        assert_eq!(bottom_right, Vec2::new(800.0, 600.0));
    }

    #[test]
    fn rotate_quarter_turn() {
        let v = rotate(Vec2::new(1.0, 0.0), std::f32::consts::FRAC_PI_2);
        assert!(v.x.abs() < 1e-6);
        assert!((v.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn perspective_ratio_is_clamped() {
        assert!((perspective_ratio(100.0, 1.0e9) - 0.5).abs() < 1e-6);
        assert_eq!(perspective_ratio(1.0e9, 1.0), 4.0);
        assert!((perspective_ratio(50.0, 50.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn smoothstep_edges() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
    }
}
