//! Camera state consumed by the symbol pipeline.
//!
//! [`MapTransform`] is an immutable snapshot of the map camera for one
//! frame: zoom, pitch, bearing, the world-to-clip matrix and, in globe
//! mode, the matrices needed to wrap tiles onto the sphere.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::math::smoothstep;
use crate::tile::TileCoord;

/// Logical size of one tile in screen pixels at its own zoom level.
pub const TILE_SIZE: f64 = 512.0;

/// Vertical field of view shared with the rest of the renderer.
pub const FIELD_OF_VIEW: f32 = 0.6435011087932844;

/// Earth circumference in meters, used to scale elevation into tile units.
const EARTH_CIRCUMFERENCE_METERS: f64 = 40_075_016.686;

/// Zoom window over which the globe flattens into the mercator plane.
/// Tunable; both ends inclusive.
pub const GLOBE_TRANSITION_START: f32 = 6.5;
pub const GLOBE_TRANSITION_END: f32 = 5.5;

/// Active projection model for the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    #[default]
    Mercator,
    Globe,
}

/// Terrain elevation lookup at a tile-local offset.
pub trait ElevationSampler {
    /// Terrain height in meters at a tile-local position.
    fn elevation(&self, coord: TileCoord, x: f32, y: f32) -> f32;

    /// Local surface up vector at a tile-local position.
    fn up_vector(&self, coord: TileCoord, x: f32, y: f32) -> Vec3;
}

/// Per-frame camera snapshot.
#[derive(Clone, Debug)]
pub struct MapTransform {
    pub width: f32,
    pub height: f32,
    pub zoom: f64,
    /// Pitch in radians, 0 looking straight down.
    pub pitch: f32,
    /// Bearing in radians, clockwise from north.
    pub bearing: f32,
    /// Map center in world pixels at the current zoom.
    pub center: Vec2,
    pub projection: ProjectionMode,
    /// Distance from the camera to the map center, in pixels.
    pub camera_to_center_distance: f32,
    /// World pixels to clip space, flat projection.
    pub proj_matrix: Mat4,
    /// Camera view matrix (no projection), used by the globe chain.
    pub view_matrix: Mat4,
    /// World pixels onto the sphere, globe projection.
    pub globe_matrix: Mat4,
}

impl MapTransform {
    pub fn new(
        width: f32,
        height: f32,
        zoom: f64,
        pitch: f32,
        bearing: f32,
        center: Vec2,
        projection: ProjectionMode,
    ) -> Self {
        let camera_to_center_distance = 0.5 * height / (FIELD_OF_VIEW * 0.5).tan();

        // Far plane: just past the line where the pitched ground plane
        // leaves the top of the frustum.
        let half_fov = FIELD_OF_VIEW * 0.5;
        let ground_angle = std::f32::consts::FRAC_PI_2 + pitch;
        let top_half_surface = half_fov.sin() * camera_to_center_distance
            / (std::f32::consts::PI - ground_angle - half_fov).sin().max(0.01);
        let far_z = (pitch.sin() * top_half_surface + camera_to_center_distance) * 1.01;

        let view_matrix = Mat4::from_translation(Vec3::new(0.0, 0.0, -camera_to_center_distance))
            * Mat4::from_rotation_x(pitch)
            * Mat4::from_rotation_z(-bearing);

        let proj_matrix = Mat4::perspective_rh(FIELD_OF_VIEW, width / height, 1.0, far_z)
            * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
            * view_matrix
            * Mat4::from_translation(Vec3::new(-center.x, -center.y, 0.0));

        let globe_matrix = Self::build_globe_matrix(zoom, center);

        Self {
            width,
            height,
            zoom,
            pitch,
            bearing,
            center,
            projection,
            camera_to_center_distance,
            proj_matrix,
            view_matrix,
            globe_matrix,
        }
    }

    /// World size in pixels at the current zoom.
    pub fn world_size(&self) -> f64 {
        TILE_SIZE * 2f64.powf(self.zoom)
    }

    /// Model matrix bending the world-pixel plane onto the sphere. The
    /// sphere radius matches the mercator world so the two projections meet
    /// at the transition.
    fn build_globe_matrix(zoom: f64, center: Vec2) -> Mat4 {
        let world_size = TILE_SIZE * 2f64.powf(zoom);
        let radius = (world_size / std::f64::consts::TAU) as f32;
        let lng = (center.x as f64 / world_size - 0.5) as f32 * std::f32::consts::TAU;
        let lat_norm = (0.5 - center.y as f64 / world_size) as f32 * std::f32::consts::PI;
        Mat4::from_translation(Vec3::new(center.x, center.y, -radius))
            * Mat4::from_rotation_x(-lat_norm)
            * Mat4::from_rotation_y(lng)
            * Mat4::from_scale(Vec3::splat(radius))
    }

    /// Blend factor between the sphere and the flat plane, 1 fully globe.
    ///
    /// Sampled once per draw call so every matrix derived for that call sees
    /// the same value.
    pub fn globe_transition(&self) -> f32 {
        match self.projection {
            ProjectionMode::Mercator => 0.0,
            ProjectionMode::Globe => 1.0
                - smoothstep(GLOBE_TRANSITION_END, GLOBE_TRANSITION_START, self.zoom as f32),
        }
    }

    /// Whether any spherical behaviour is active this frame.
    pub fn globe_active(&self) -> bool {
        self.projection == ProjectionMode::Globe && self.globe_transition() > 0.0
    }

    /// Tile-local units per screen pixel for a tile at `coord`.
    pub fn pixels_to_tile_units(&self, coord: TileCoord) -> f32 {
        let tile_world_size = self.world_size() / (1u64 << coord.z) as f64;
        (crate::bucket::EXTENT as f64 / tile_world_size) as f32
    }

    /// Tile-local units per meter for a tile at `coord`.
    pub fn meters_to_tile_units(&self, coord: TileCoord) -> f32 {
        let pixels_per_meter = self.world_size() / EARTH_CIRCUMFERENCE_METERS;
        (pixels_per_meter as f32) * self.pixels_to_tile_units(coord)
    }

    /// Tile-local units into world pixels.
    pub fn tile_matrix(&self, coord: TileCoord) -> Mat4 {
        let tile_world_size = (self.world_size() / (1u64 << coord.z) as f64) as f32;
        let scale = tile_world_size / crate::bucket::EXTENT;
        Mat4::from_translation(Vec3::new(
            coord.x as f32 * tile_world_size,
            coord.y as f32 * tile_world_size,
            0.0,
        )) * Mat4::from_scale(Vec3::new(scale, scale, 1.0))
    }

    /// Tile-local units into clip space under the active projection.
    pub fn clip_matrix(&self, coord: TileCoord) -> Mat4 {
        match self.projection {
            ProjectionMode::Mercator => self.proj_matrix * self.tile_matrix(coord),
            ProjectionMode::Globe => self.proj_matrix * self.globe_matrix * self.tile_matrix(coord),
        }
    }

    /// World up expressed in the camera frame of the globe chain.
    ///
    /// In globe mode every symbol sits on its own tangent plane, so a single
    /// shared screen rotation is wrong; the shader rotates each instance
    /// around this vector instead.
    pub fn camera_up_vector(&self) -> Vec3 {
        let inverse = (self.view_matrix * self.globe_matrix).inverse();
        let up = inverse * Vec4::new(0.0, 1.0, 0.0, 0.0);
        Vec3::new(up.x, up.y, up.z).normalize_or_zero()
    }
}
