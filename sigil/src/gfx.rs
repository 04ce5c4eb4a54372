//! Abstraction over the GPU command stream.
//!
//! The pipeline never owns GPU resources. Programs, buffers, textures and
//! queries are opaque handles minted by the driver; this module defines the
//! handle types, the fixed-function mode values a draw carries, and the
//! [`GraphicsContext`] trait the driver implements.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::render::program::ProgramCapabilities;
use crate::tile::TileCoord;

/// Opaque handle to a compiled shader program owned by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Opaque handle to a texture owned by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Opaque handle to a vertex or index buffer owned by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Opaque handle to a GPU visibility query object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u32);

/// Sampling filter used when binding an atlas texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

/// Depth test/write behaviour for a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthMode {
    Disabled,
    ReadOnly,
    ReadWrite,
}

/// Stencil behaviour for a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StencilMode {
    Disabled,
    Ref(u8),
}

/// Color blend behaviour for a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    Opaque,
    AlphaBlended,
    Additive,
}

/// Pixel format of a registered atlas texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtlasFormat {
    /// 8-bit integer RGBA, the only format symbol atlases come in.
    Rgba8,
    /// Float texture, valid for elevation data but never for an atlas.
    RgbaF32,
}

/// Uniform block shared by every symbol draw variant.
///
/// Field order matters: the struct is uploaded as raw bytes and must match
/// the shader-side layout, so vec4 alignment is kept by explicit padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SymbolUniforms {
    pub label_plane_matrix: [[f32; 4]; 4],
    pub clip_matrix: [[f32; 4]; 4],
    pub fill_color: [f32; 4],
    pub halo_color: [f32; 4],
    pub camera_up: [f32; 3],
    pub globe_transition: f32,
    pub texsize: [f32; 2],
    pub texsize_icon: [f32; 2],
    pub size: f32,
    pub fade_change: f32,
    pub is_halo: f32,
    pub halo_width: f32,
    pub gamma_scale: f32,
    pub pitch_with_map: f32,
    pub rotate_in_shader: f32,
    pub camera_to_center_distance: f32,
    pub aspect_ratio: f32,
    pub _pad: [f32; 3],
}

impl Default for SymbolUniforms {
    fn default() -> Self {
        Self {
            label_plane_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            clip_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            fill_color: [0.0, 0.0, 0.0, 1.0],
            halo_color: [0.0; 4],
            camera_up: [0.0, 1.0, 0.0],
            globe_transition: 0.0,
            texsize: [0.0; 2],
            texsize_icon: [0.0; 2],
            size: 16.0,
            fade_change: 1.0,
            is_halo: 0.0,
            halo_width: 0.0,
            gamma_scale: 1.0,
            pitch_with_map: 0.0,
            rotate_in_shader: 0.0,
            camera_to_center_distance: 1.0,
            aspect_ratio: 1.0,
            _pad: [0.0; 3],
        }
    }
}

/// Scene lighting shared by all symbol draws in a frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightingUniforms {
    pub direction: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 4],
}

impl Default for LightingUniforms {
    fn default() -> Self {
        Self {
            direction: [0.0, 0.0, 1.0],
            intensity: 1.0,
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// A fully resolved indexed draw.
#[derive(Clone, Debug)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub vertex_buffer: BufferHandle,
    /// Per-glyph dynamic attribute buffer, when the variant consumes one.
    pub dynamic_buffer: Option<BufferHandle>,
    pub index_buffer: BufferHandle,
    pub index_start: u32,
    pub index_count: u32,
    pub uniforms: SymbolUniforms,
    /// Tile whose elevation data should be bound, when terrain is active.
    pub terrain_tile: Option<TileCoord>,
    pub depth: DepthMode,
    pub stencil: StencilMode,
    pub color: ColorMode,
}

/// Axis-aligned quad drawn between a query begin/end pair.
#[derive(Clone, Copy, Debug)]
pub struct OccluderQuad {
    pub clip_matrix: Mat4,
    /// Anchor position in tile units.
    pub anchor: Vec3,
    /// Half extent of the quad in screen pixels.
    pub extent: f32,
    /// Set in visualize mode; `None` leaves the color channel masked off.
    pub color: Option<[f32; 4]>,
}

/// Screen-space rectangle drawn by the collision debug overlay.
#[derive(Clone, Copy, Debug)]
pub struct DebugBox {
    pub clip_matrix: Mat4,
    pub anchor: Vec3,
    pub width: f32,
    pub height: f32,
    pub color: [f32; 4],
}

/// Driver-implemented command sink for the symbol pipeline.
///
/// All methods are non-blocking. Query results are polled, never waited on.
pub trait GraphicsContext {
    /// Resolves a compiled program for a shader name and capability set.
    fn acquire_program(&mut self, name: &'static str, caps: &ProgramCapabilities) -> ProgramHandle;

    /// Binds `texture` to a fixed texture unit with the given filter.
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle, filter: TextureFilter);

    /// Pixel format the driver registered for `texture`.
    fn texture_format(&self, texture: TextureHandle) -> AtlasFormat;

    /// Replaces the full contents of a dynamic vertex buffer.
    fn upload_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]);

    /// Uploads the shared lighting uniforms for subsequent draws.
    fn upload_lighting(&mut self, lighting: &LightingUniforms);

    /// Issues one indexed draw.
    fn draw(&mut self, call: &DrawCall);

    /// Draws a single occluder quad, typically between query begin/end.
    fn draw_occluder(&mut self, quad: &OccluderQuad);

    /// Draws one collision debug rectangle.
    fn draw_debug_box(&mut self, debug_box: &DebugBox);

    fn create_query(&mut self) -> QueryHandle;
    fn begin_query(&mut self, query: QueryHandle);
    fn end_query(&mut self, query: QueryHandle);
    /// Whether the result for `query` is ready to read.
    fn poll_query(&self, query: QueryHandle) -> bool;
    /// Reads the passed-sample count. Only valid after `poll_query` returned
    /// true; reading consumes the result and the query may be reissued.
    fn read_query(&mut self, query: QueryHandle) -> u32;
    fn release_query(&mut self, query: QueryHandle);
}

/// Headless driver that records every command instead of touching a GPU.
///
/// Useful for driving the pipeline in tests and for dumping a frame's
/// command stream when debugging batching decisions.
#[derive(Default)]
pub struct RecordingContext {
    pub acquired_programs: Vec<(String, ProgramCapabilities)>,
    pub draws: Vec<DrawCall>,
    pub occluder_draws: Vec<OccluderQuad>,
    pub debug_boxes: Vec<DebugBox>,
    pub bound_textures: Vec<(u32, TextureHandle, TextureFilter)>,
    pub uploads: std::collections::HashMap<BufferHandle, Vec<u8>>,
    pub lighting: Option<LightingUniforms>,
    pub begun_queries: Vec<QueryHandle>,
    pub released_queries: Vec<QueryHandle>,
    texture_formats: std::collections::HashMap<TextureHandle, AtlasFormat>,
    query_status: std::collections::HashMap<QueryHandle, RecordedQueryStatus>,
    active_query: Option<QueryHandle>,
    next_program: u32,
    next_query: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecordedQueryStatus {
    Idle,
    Issued,
    Ready(u32),
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the reported format of a texture (defaults to `Rgba8`).
    pub fn set_texture_format(&mut self, texture: TextureHandle, format: AtlasFormat) {
        self.texture_formats.insert(texture, format);
    }

    /// Marks an issued query's result as ready with the given sample count,
    /// as the GPU would some frames after the draw.
    pub fn finish_query(&mut self, query: QueryHandle, samples: u32) {
        let status = self
            .query_status
            .get_mut(&query)
            .expect("finish_query on unknown query");
        assert_eq!(*status, RecordedQueryStatus::Issued, "query was not issued");
        *status = RecordedQueryStatus::Ready(samples);
    }
}

impl GraphicsContext for RecordingContext {
    fn acquire_program(&mut self, name: &'static str, caps: &ProgramCapabilities) -> ProgramHandle {
        self.acquired_programs.push((name.to_string(), *caps));
        self.next_program += 1;
        ProgramHandle(self.next_program)
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle, filter: TextureFilter) {
        self.bound_textures.push((unit, texture, filter));
    }

    fn texture_format(&self, texture: TextureHandle) -> AtlasFormat {
        self.texture_formats
            .get(&texture)
            .copied()
            .unwrap_or(AtlasFormat::Rgba8)
    }

    fn upload_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]) {
        self.uploads.insert(buffer, bytes.to_vec());
    }

    fn upload_lighting(&mut self, lighting: &LightingUniforms) {
        self.lighting = Some(*lighting);
    }

    fn draw(&mut self, call: &DrawCall) {
        self.draws.push(call.clone());
    }

    fn draw_occluder(&mut self, quad: &OccluderQuad) {
        self.occluder_draws.push(*quad);
    }

    fn draw_debug_box(&mut self, debug_box: &DebugBox) {
        self.debug_boxes.push(*debug_box);
    }

    fn create_query(&mut self) -> QueryHandle {
        self.next_query += 1;
        let handle = QueryHandle(self.next_query);
        self.query_status.insert(handle, RecordedQueryStatus::Idle);
        handle
    }

    fn begin_query(&mut self, query: QueryHandle) {
        assert!(self.active_query.is_none(), "nested query scope");
        let status = self
            .query_status
            .get_mut(&query)
            .expect("begin on unknown query");
        assert_eq!(*status, RecordedQueryStatus::Idle, "query reissued while in flight");
        self.active_query = Some(query);
        self.begun_queries.push(query);
    }

    fn end_query(&mut self, query: QueryHandle) {
        assert_eq!(self.active_query.take(), Some(query), "unbalanced query scope");
        self.query_status.insert(query, RecordedQueryStatus::Issued);
    }

    fn poll_query(&self, query: QueryHandle) -> bool {
        matches!(
            self.query_status.get(&query),
            Some(RecordedQueryStatus::Ready(_))
        )
    }

    fn read_query(&mut self, query: QueryHandle) -> u32 {
        match self.query_status.insert(query, RecordedQueryStatus::Idle) {
            Some(RecordedQueryStatus::Ready(samples)) => samples,
            other => panic!("read_query before result was ready: {other:?}"),
        }
    }

    fn release_query(&mut self, query: QueryHandle) {
        self.query_status.remove(&query);
        self.released_queries.push(query);
    }
}
