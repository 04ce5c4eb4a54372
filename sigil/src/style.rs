//! Style properties of a symbol layer, as resolved from the style sheet.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StyleError {
    #[error("failed to parse symbol layer style: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("symbol layer style has an empty id")]
    EmptyId,
}

/// Reference frame for symbol pitch and rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    Map,
    #[default]
    Viewport,
}

/// Piecewise-linear symbol size over zoom, clamped outside the stops.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeCurve {
    pub min_zoom: f32,
    pub min_size: f32,
    pub max_zoom: f32,
    pub max_size: f32,
}

impl SizeCurve {
    pub fn constant(size: f32) -> Self {
        Self {
            min_zoom: 0.0,
            min_size: size,
            max_zoom: 0.0,
            max_size: size,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.min_size == self.max_size
    }

    pub fn evaluate(&self, zoom: f32) -> f32 {
        if self.max_zoom <= self.min_zoom {
            return self.min_size;
        }
        let t = ((zoom - self.min_zoom) / (self.max_zoom - self.min_zoom)).clamp(0.0, 1.0);
        self.min_size + (self.max_size - self.min_size) * t
    }
}

impl Default for SizeCurve {
    fn default() -> Self {
        Self::constant(16.0)
    }
}

/// Resolved style of one symbol layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolLayerStyle {
    pub id: String,
    pub text_pitch_alignment: Alignment,
    pub text_rotation_alignment: Alignment,
    pub icon_pitch_alignment: Alignment,
    pub icon_rotation_alignment: Alignment,
    pub text_size: SizeCurve,
    pub icon_size: SizeCurve,
    pub text_opacity: f32,
    pub icon_opacity: f32,
    pub text_color: [f32; 4],
    pub text_halo_color: [f32; 4],
    /// Halo width in pixels; zero disables the halo pre-pass.
    pub text_halo_width: f32,
    pub icon_halo_color: [f32; 4],
    pub icon_halo_width: f32,
    /// Whether the icon atlas holds signed distance fields.
    pub icon_sdf: bool,
    /// Per-feature draw priority is honored only when overlap is allowed.
    pub has_sort_key: bool,
    pub allow_overlap: bool,
    /// Ties icon position to the text's variable anchor shift.
    pub icon_text_fit: bool,
    /// Repositions text between candidate anchors from the placement pass.
    pub variable_anchors: bool,
    /// Opacity applied to symbols the depth test found hidden. A value of
    /// 1.0 disables occlusion testing for the layer.
    pub occluded_opacity: f32,
    /// Lifts symbols by their per-instance elevation offset.
    pub elevated: bool,
    /// Desaturation/brightness adjustment on icon colors.
    pub icon_color_adjust: bool,
    /// Cross-fades icons between zoom-dependent atlas images.
    pub cross_fade: bool,
}

impl Default for SymbolLayerStyle {
    fn default() -> Self {
        Self {
            id: String::new(),
            text_pitch_alignment: Alignment::Viewport,
            text_rotation_alignment: Alignment::Viewport,
            icon_pitch_alignment: Alignment::Viewport,
            icon_rotation_alignment: Alignment::Viewport,
            text_size: SizeCurve::default(),
            icon_size: SizeCurve::constant(1.0),
            text_opacity: 1.0,
            icon_opacity: 1.0,
            text_color: [0.0, 0.0, 0.0, 1.0],
            text_halo_color: [1.0, 1.0, 1.0, 1.0],
            text_halo_width: 0.0,
            icon_halo_color: [1.0, 1.0, 1.0, 1.0],
            icon_halo_width: 0.0,
            icon_sdf: false,
            has_sort_key: false,
            allow_overlap: false,
            icon_text_fit: false,
            variable_anchors: false,
            occluded_opacity: 1.0,
            elevated: false,
            icon_color_adjust: false,
            cross_fade: false,
        }
    }
}

impl SymbolLayerStyle {
    /// Parses a layer style from its style-sheet JSON representation.
    pub fn from_json(json: &str) -> Result<Self, StyleError> {
        let style: Self = serde_json::from_str(json)?;
        if style.id.is_empty() {
            return Err(StyleError::EmptyId);
        }
        Ok(style)
    }

    pub fn text_pitch_with_map(&self) -> bool {
        self.text_pitch_alignment == Alignment::Map
    }

    pub fn text_rotate_with_map(&self) -> bool {
        self.text_rotation_alignment == Alignment::Map
    }

    pub fn icon_pitch_with_map(&self) -> bool {
        self.icon_pitch_alignment == Alignment::Map
    }

    pub fn icon_rotate_with_map(&self) -> bool {
        self.icon_rotation_alignment == Alignment::Map
    }

    /// Layers fade symbols instead of hiding them when occluded opacity is
    /// anything other than fully opaque; only those run the query pass.
    pub fn occlusion_active(&self) -> bool {
        self.occluded_opacity < 1.0
    }

    /// Segment sort keys only matter when symbols may visually overlap.
    pub fn sorts_by_key(&self) -> bool {
        self.has_sort_key && self.allow_overlap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_curve_interpolates_and_clamps() {
        let curve = SizeCurve {
            min_zoom: 4.0,
            min_size: 10.0,
            max_zoom: 8.0,
            max_size: 20.0,
        };
        assert_eq!(curve.evaluate(2.0), 10.0);
        assert_eq!(curve.evaluate(6.0), 15.0);
        assert_eq!(curve.evaluate(12.0), 20.0);
        assert!(SizeCurve::constant(14.0).is_constant());
    }

    #[test]
    fn from_json_roundtrip() {
        let style = SymbolLayerStyle::from_json(
            r#"{"id": "poi-labels", "text_halo_width": 1.5, "has_sort_key": true}"#,
        )
        .unwrap();
        assert_eq!(style.id, "poi-labels");
        assert_eq!(style.text_halo_width, 1.5);
        // Sort key without overlap permission keeps the two-pass order.
        assert!(!style.sorts_by_key());
    }

    #[test]
    fn from_json_rejects_missing_id() {
        assert!(matches!(
            SymbolLayerStyle::from_json("{}"),
            Err(StyleError::EmptyId)
        ));
    }

    #[test]
    fn occlusion_active_only_below_full_opacity() {
        let mut style = SymbolLayerStyle::default();
        assert!(!style.occlusion_active());
        style.occluded_opacity = 0.3;
        assert!(style.occlusion_active());
    }
}
