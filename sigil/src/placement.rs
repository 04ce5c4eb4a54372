//! Read-only inputs from the collision/placement pass.
//!
//! The placement subsystem decides which symbols are visible and which
//! variable anchor each label should use; this pipeline only applies those
//! decisions. All data here is supplied fresh every frame and never owned.

use std::collections::HashMap;

/// Corner or edge of the measured label box that sits on the anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AnchorCorner {
    #[default]
    Center,
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl AnchorCorner {
    /// Horizontal and vertical alignment factors in [0, 1]; 0.5 centers.
    pub fn alignment(&self) -> (f32, f32) {
        match self {
            AnchorCorner::Center => (0.5, 0.5),
            AnchorCorner::Left => (0.0, 0.5),
            AnchorCorner::Right => (1.0, 0.5),
            AnchorCorner::Top => (0.5, 0.0),
            AnchorCorner::Bottom => (0.5, 1.0),
            AnchorCorner::TopLeft => (0.0, 0.0),
            AnchorCorner::TopRight => (1.0, 0.0),
            AnchorCorner::BottomLeft => (0.0, 1.0),
            AnchorCorner::BottomRight => (1.0, 1.0),
        }
    }
}

/// Candidate anchor offset chosen by the placement pass for one label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VariableOffset {
    /// Measured label box in ems at layout time.
    pub width: f32,
    pub height: f32,
    pub anchor: AnchorCorner,
    /// User offset from the style, in ems.
    pub text_offset: [f32; 2],
    /// Layout size the box was measured at, pixels per em.
    pub text_scale: f32,
}

/// Frame inputs from the placement subsystem, keyed by cross-tile id.
#[derive(Clone, Copy, Debug)]
pub struct PlacementView<'a> {
    offsets: &'a HashMap<u64, VariableOffset>,
    opacities: &'a HashMap<u64, f32>,
}

impl<'a> PlacementView<'a> {
    pub fn new(
        offsets: &'a HashMap<u64, VariableOffset>,
        opacities: &'a HashMap<u64, f32>,
    ) -> Self {
        Self { offsets, opacities }
    }

    pub fn offset(&self, cross_tile_id: u64) -> Option<&VariableOffset> {
        self.offsets.get(&cross_tile_id)
    }

    pub fn opacity(&self, cross_tile_id: u64) -> f32 {
        self.opacities.get(&cross_tile_id).copied().unwrap_or(0.0)
    }

    /// A symbol the placement pass never produced an opacity for is hidden.
    pub fn is_hidden(&self, cross_tile_id: u64) -> bool {
        self.opacity(cross_tile_id) <= 0.0
    }
}
