//! Shader variant selection for symbol draws.

use std::collections::HashMap;

use crate::gfx::{GraphicsContext, ProgramHandle};
use crate::style::SymbolLayerStyle;
use crate::transform::MapTransform;

/// Base shader family a draw starts from. Occluder quads and debug boxes
/// use fixed driver-side pipelines and are not selected here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Icon,
    IconSdf,
    Text,
    /// Text with glyphs and icons sampled in one pass.
    TextAndIcon,
}

impl ProgramKind {
    /// Driver-facing shader name.
    pub fn name(&self) -> &'static str {
        match self {
            ProgramKind::Icon => "symbol_icon",
            ProgramKind::IconSdf => "symbol_icon_sdf",
            ProgramKind::Text => "symbol_text",
            ProgramKind::TextAndIcon => "symbol_text_icon",
        }
    }
}

/// Named capability toggles compiled into a program variant.
///
/// Kept as explicit booleans so the set stays readable at call sites; the
/// whole struct is the cache key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProgramCapabilities {
    pub color_adjust: bool,
    pub cross_fade: bool,
    pub z_offset: bool,
    pub occlusion_query: bool,
    pub terrain_pitch_alignment: bool,
    pub globe: bool,
}

impl ProgramCapabilities {
    /// Capability set a layer needs under the current camera.
    pub fn for_layer(style: &SymbolLayerStyle, transform: &MapTransform, pitch_with_map: bool) -> Self {
        Self {
            color_adjust: style.icon_color_adjust,
            cross_fade: style.cross_fade,
            z_offset: style.elevated,
            occlusion_query: style.occlusion_active() && !transform.globe_active(),
            terrain_pitch_alignment: style.elevated && pitch_with_map,
            globe: transform.globe_active(),
        }
    }
}

/// Memoized program acquisition.
///
/// Selection is a pure function of (kind, capabilities), so each pair is
/// resolved against the driver once and the handle reused afterwards.
#[derive(Default)]
pub struct ProgramCache {
    programs: HashMap<(ProgramKind, ProgramCapabilities), ProgramHandle>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        kind: ProgramKind,
        caps: ProgramCapabilities,
    ) -> ProgramHandle {
        *self
            .programs
            .entry((kind, caps))
            .or_insert_with(|| ctx.acquire_program(kind.name(), &caps))
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
