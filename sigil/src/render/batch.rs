//! Render-state construction and ordered draw emission.
//!
//! Per tile and kind (icon or text) one render state is built, carrying the
//! resolved program, uniforms, atlas bindings and halo eligibility. States
//! fan out into one draw entry per geometry segment; when the layer sorts
//! by key the entries of all tiles are merged and stably ordered before
//! anything is issued.

use glam::Mat4;

use crate::bucket::{Segment, SymbolBucket, SymbolBuffers};
use crate::gfx::{
    AtlasFormat, ColorMode, DepthMode, DrawCall, GraphicsContext, LightingUniforms, ProgramHandle,
    StencilMode, SymbolUniforms, TextureFilter, TextureHandle,
};
use crate::render::program::{ProgramCache, ProgramCapabilities, ProgramKind};
use crate::render::projection;
use crate::style::SymbolLayerStyle;
use crate::tile::TileCoord;
use crate::transform::MapTransform;

/// Texture unit assignments shared with the shader side.
pub const ATLAS_TEXTURE_UNIT: u32 = 0;
pub const ICON_ATLAS_TEXTURE_UNIT: u32 = 1;

/// Which half of a bucket a render state draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Icon,
    Text,
}

/// Fields the draw loop consumes uniformly for both kinds.
pub struct StateCommon<'a> {
    pub program: ProgramHandle,
    pub buffers: &'a SymbolBuffers,
    pub atlas: TextureHandle,
    pub filter: TextureFilter,
    pub uniforms: SymbolUniforms,
    pub halo: bool,
    /// Label plane back to tile units, for terrain elevation lookups.
    pub inverse_label_plane: Mat4,
    pub coord: TileCoord,
    pub terrain: bool,
}

pub struct IconRenderState<'a> {
    pub common: StateCommon<'a>,
}

pub struct TextRenderState<'a> {
    pub common: StateCommon<'a>,
    /// Second atlas for the combined text-and-icon program.
    pub icon_atlas: Option<(TextureHandle, TextureFilter)>,
}

/// Transient per-frame draw state for one (tile, kind) pair.
pub enum RenderState<'a> {
    Icon(IconRenderState<'a>),
    Text(TextRenderState<'a>),
}

impl<'a> RenderState<'a> {
    pub fn common(&self) -> &StateCommon<'a> {
        match self {
            RenderState::Icon(state) => &state.common,
            RenderState::Text(state) => &state.common,
        }
    }
}

/// One future draw call: a single segment of a render state.
#[derive(Clone, Copy, Debug)]
pub struct DrawEntry {
    pub state: usize,
    pub index_start: u32,
    pub index_count: u32,
    pub sort_key: f32,
}

/// Builds the render state for one kind of one tile's bucket.
///
/// Returns `None` when there is nothing to draw: zero opacity, empty
/// buffers, or an atlas that has not arrived yet.
pub fn build_render_state<'a>(
    ctx: &mut dyn GraphicsContext,
    programs: &mut ProgramCache,
    bucket: &'a SymbolBucket,
    kind: SymbolKind,
    coord: TileCoord,
    transform: &MapTransform,
    style: &SymbolLayerStyle,
) -> Option<RenderState<'a>> {
    let (buffers, opacity, pitch_with_map, rotate_with_map) = match kind {
        SymbolKind::Icon => (
            &bucket.icon,
            style.icon_opacity,
            style.icon_pitch_with_map(),
            style.icon_rotate_with_map(),
        ),
        SymbolKind::Text => (
            &bucket.text,
            style.text_opacity,
            style.text_pitch_with_map(),
            style.text_rotate_with_map(),
        ),
    };
    if opacity <= 0.0 || buffers.is_empty() {
        return None;
    }
    let atlas = buffers.atlas?;
    assert!(
        ctx.texture_format(atlas) == AtlasFormat::Rgba8,
        "symbol atlas must be an integer texture"
    );

    let matrices = projection::tile_matrices(transform, coord, pitch_with_map, rotate_with_map);
    let rotate_in_shader = transform.globe_active() && !rotate_with_map;

    let (program_kind, size, halo_width, halo_eligible, fill_color, halo_color) = match kind {
        SymbolKind::Icon => (
            if style.icon_sdf { ProgramKind::IconSdf } else { ProgramKind::Icon },
            style.icon_size.evaluate(transform.zoom as f32),
            style.icon_halo_width,
            style.icon_sdf && style.icon_halo_width > 0.0,
            [1.0, 1.0, 1.0, style.icon_opacity],
            style.icon_halo_color,
        ),
        SymbolKind::Text => (
            if bucket.has_icon() && bucket.icon.atlas.is_some() {
                ProgramKind::TextAndIcon
            } else {
                ProgramKind::Text
            },
            style.text_size.evaluate(transform.zoom as f32),
            style.text_halo_width,
            style.text_halo_width > 0.0,
            style.text_color,
            style.text_halo_color,
        ),
    };

    let caps = ProgramCapabilities::for_layer(style, transform, pitch_with_map);
    let program = programs.get(ctx, program_kind, caps);

    let mut uniforms = SymbolUniforms {
        label_plane_matrix: matrices.label_plane_rendering.to_cols_array_2d(),
        clip_matrix: matrices.gl_coord.to_cols_array_2d(),
        fill_color,
        halo_color,
        globe_transition: matrices.globe_transition,
        texsize: buffers.atlas_size,
        size,
        halo_width,
        pitch_with_map: pitch_with_map as u32 as f32,
        rotate_in_shader: rotate_in_shader as u32 as f32,
        camera_to_center_distance: transform.camera_to_center_distance,
        aspect_ratio: transform.width / transform.height,
        ..Default::default()
    };
    if rotate_in_shader {
        uniforms.camera_up = transform.camera_up_vector().to_array();
    }

    let filter = match kind {
        // Glyphs are always scaled by distance field rendering.
        SymbolKind::Text => TextureFilter::Linear,
        SymbolKind::Icon => icon_atlas_filter(transform, style),
    };

    let common = StateCommon {
        program,
        buffers,
        atlas,
        filter,
        uniforms,
        halo: halo_eligible,
        inverse_label_plane: matrices.label_plane_placement.inverse(),
        coord,
        terrain: style.elevated,
    };

    Some(match kind {
        SymbolKind::Icon => RenderState::Icon(IconRenderState { common }),
        SymbolKind::Text => {
            let mut common = common;
            let icon_atlas = if program_kind == ProgramKind::TextAndIcon {
                common.uniforms.texsize_icon = bucket.icon.atlas_size;
                let atlas = bucket.icon.atlas.expect("checked when selecting program");
                Some((atlas, icon_atlas_filter(transform, style)))
            } else {
                None
            };
            RenderState::Text(TextRenderState { common, icon_atlas })
        }
    })
}

/// Icons sample nearest only when drawn static and unscaled; any zoom
/// scaling, rotation or pitch needs linear filtering.
fn icon_atlas_filter(transform: &MapTransform, style: &SymbolLayerStyle) -> TextureFilter {
    let scaled = !style.icon_size.is_constant() || style.icon_size.evaluate(transform.zoom as f32) != 1.0;
    let moving = transform.zoom.fract() != 0.0 || transform.bearing != 0.0 || transform.pitch != 0.0;
    if scaled || moving {
        TextureFilter::Linear
    } else {
        TextureFilter::Nearest
    }
}

/// Appends one entry per segment of `state`.
pub fn push_entries(entries: &mut Vec<DrawEntry>, state: usize, segments: &[Segment]) {
    for segment in segments {
        entries.push(DrawEntry {
            state,
            index_start: segment.index_start,
            index_count: segment.index_count,
            sort_key: segment.sort_key,
        });
    }
}

/// Stable ascending order by sort key; insertion order breaks ties.
pub fn sort_entries(entries: &mut [DrawEntry]) {
    entries.sort_by(|a, b| {
        a.sort_key
            .partial_cmp(&b.sort_key)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Issues the final draw sequence. Entry order is already total here and is
/// never changed again.
pub fn issue_draws(
    ctx: &mut dyn GraphicsContext,
    states: &[RenderState<'_>],
    entries: &[DrawEntry],
    lighting: &LightingUniforms,
) {
    for entry in entries {
        let state = &states[entry.state];
        let common = state.common();

        ctx.upload_lighting(lighting);
        ctx.bind_texture(ATLAS_TEXTURE_UNIT, common.atlas, common.filter);
        if let RenderState::Text(text) = state {
            if let Some((icon_atlas, filter)) = text.icon_atlas {
                ctx.bind_texture(ICON_ATLAS_TEXTURE_UNIT, icon_atlas, filter);
            }
        }

        let call = DrawCall {
            program: common.program,
            vertex_buffer: common.buffers.vertex_buffer,
            dynamic_buffer: common.buffers.dynamic_buffer,
            index_buffer: common.buffers.index_buffer,
            index_start: entry.index_start,
            index_count: entry.index_count,
            uniforms: common.uniforms,
            terrain_tile: common.terrain.then_some(common.coord),
            depth: DepthMode::ReadOnly,
            stencil: StencilMode::Disabled,
            color: ColorMode::AlphaBlended,
        };

        if common.halo {
            // Halo outline first so the fill renders on top of it.
            let mut halo = call.clone();
            halo.uniforms.is_halo = 1.0;
            ctx.draw(&halo);
        }
        ctx.draw(&call);
    }
}
