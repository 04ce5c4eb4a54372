//! End-to-end tests driving the frame entry point against the recording
//! driver.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use sigil::bucket::{PlacedSymbol, Segment, SymbolInstance, WritingMode};
use sigil::gfx::{BufferHandle, RecordingContext, TextureHandle};
use sigil::placement::AnchorCorner;
use sigil::{
    draw_collision_debug, draw_symbols, FrameParams, LightingUniforms, MapTransform,
    OcclusionState, PlacementView, ProgramCache, ProjectionMode, SymbolBucket, SymbolBuffers,
    SymbolLayerStyle, Tile, TileCache, TileCoord, VariableOffset,
};

const LAYER: &str = "poi-labels";

fn buffers(
    base_handle: u32,
    atlas: TextureHandle,
    sort_keys: &[f32],
    cross_tile_ids: &[u64],
) -> SymbolBuffers {
    let mut buffers = SymbolBuffers::new(BufferHandle(base_handle), BufferHandle(base_handle + 1));
    buffers.dynamic_buffer = Some(BufferHandle(base_handle + 2));
    for (i, key) in sort_keys.iter().enumerate() {
        buffers.segments.push(Segment {
            vertex_offset: 0,
            index_start: i as u32 * 6,
            index_count: 6,
            sort_key: *key,
        });
    }
    buffers.allocate_glyphs(cross_tile_ids.len());
    for (i, id) in cross_tile_ids.iter().enumerate() {
        buffers.placed.push(PlacedSymbol {
            anchor: Vec3::new(2048.0, 2048.0, 0.0),
            glyph_start: i as u32,
            glyph_count: 1,
            hidden: false,
            orientation: WritingMode::Horizontal,
            cross_tile_id: *id,
            associated_icon: None,
        });
    }
    buffers.atlas = Some(atlas);
    buffers.atlas_size = [1024.0, 1024.0];
    buffers
}

fn instances(cross_tile_ids: &[u64]) -> Vec<SymbolInstance> {
    cross_tile_ids
        .iter()
        .map(|id| SymbolInstance {
            cross_tile_id: *id,
            anchor: Vec2::new(2048.0, 2048.0),
            elevation: 0.0,
            placed_vertical: false,
            icon_index: None,
            occlusion: OcclusionState::Visible,
        })
        .collect()
}

fn tile_with_bucket(coord: TileCoord, text_keys: &[f32], icon_keys: &[f32], ids: &[u64]) -> Tile {
    let mut tile = Tile::new(coord);
    let bucket = SymbolBucket::new(
        buffers(100, TextureHandle(1), text_keys, ids),
        buffers(200, TextureHandle(2), icon_keys, ids),
        instances(ids),
    );
    tile.add_symbol_bucket(LAYER, bucket).unwrap();
    tile
}

fn transform() -> MapTransform {
    MapTransform::new(
        1024.0,
        768.0,
        4.0,
        0.0,
        0.0,
        Vec2::new(1024.0, 1024.0),
        ProjectionMode::Mercator,
    )
}

fn style() -> SymbolLayerStyle {
    let mut style = SymbolLayerStyle::default();
    style.id = LAYER.into();
    style
}

fn shown(ids: &[u64]) -> HashMap<u64, f32> {
    ids.iter().map(|id| (*id, 1.0)).collect()
}

#[test]
fn two_render_states_per_tile_without_sort_key() {
    let mut ctx = RecordingContext::new();
    let mut programs = ProgramCache::new();
    let mut tiles = TileCache::new();
    let coords = [TileCoord::new(4, 8, 8), TileCoord::new(4, 9, 8)];
    for coord in coords {
        tiles.insert(tile_with_bucket(coord, &[0.0], &[0.0], &[coord.x as u64]));
    }

    let offsets = HashMap::new();
    let opacities = shown(&[8, 9]);
    let placement = PlacementView::new(&offsets, &opacities);
    draw_symbols(
        &mut ctx,
        &mut programs,
        &mut tiles,
        &style(),
        &coords,
        &transform(),
        &placement,
        None,
        &LightingUniforms::default(),
        &FrameParams::default(),
    );

    // One icon and one text draw per tile, icons first.
    assert_eq!(ctx.draws.len(), 4);
    let vertex_buffers: Vec<u32> = ctx.draws.iter().map(|d| d.vertex_buffer.0).collect();
    assert_eq!(vertex_buffers, vec![200, 200, 100, 100]);
}

#[test]
fn zero_icon_opacity_issues_no_icon_entries() {
    let mut ctx = RecordingContext::new();
    let mut programs = ProgramCache::new();
    let mut tiles = TileCache::new();
    let coord = TileCoord::new(4, 8, 8);
    tiles.insert(tile_with_bucket(coord, &[0.0], &[0.0], &[1]));

    let mut style = style();
    style.icon_opacity = 0.0;
    let offsets = HashMap::new();
    let opacities = shown(&[1]);
    let placement = PlacementView::new(&offsets, &opacities);
    draw_symbols(
        &mut ctx,
        &mut programs,
        &mut tiles,
        &style,
        &[coord],
        &transform(),
        &placement,
        None,
        &LightingUniforms::default(),
        &FrameParams::default(),
    );

    assert_eq!(ctx.draws.len(), 1);
    assert_eq!(ctx.draws[0].vertex_buffer.0, 100);
}

#[test]
fn sort_key_mode_merges_and_orders_entries_across_tiles() {
    let mut ctx = RecordingContext::new();
    let mut programs = ProgramCache::new();
    let mut tiles = TileCache::new();

    // Text-only layer spread over two tiles; segment keys 5, 1 and 3.
    let a = TileCoord::new(4, 8, 8);
    let b = TileCoord::new(4, 9, 8);
    let mut tile_a = Tile::new(a);
    tile_a
        .add_symbol_bucket(
            LAYER,
            SymbolBucket::new(
                buffers(100, TextureHandle(1), &[5.0, 1.0], &[1, 2]),
                SymbolBuffers::new(BufferHandle(300), BufferHandle(301)),
                instances(&[1, 2]),
            ),
        )
        .unwrap();
    tiles.insert(tile_a);
    let mut tile_b = Tile::new(b);
    tile_b
        .add_symbol_bucket(
            LAYER,
            SymbolBucket::new(
                buffers(400, TextureHandle(1), &[3.0], &[3]),
                SymbolBuffers::new(BufferHandle(500), BufferHandle(501)),
                instances(&[3]),
            ),
        )
        .unwrap();
    tiles.insert(tile_b);

    let mut style = style();
    style.has_sort_key = true;
    style.allow_overlap = true;

    let offsets = HashMap::new();
    let opacities = shown(&[1, 2, 3]);
    let placement = PlacementView::new(&offsets, &opacities);
    draw_symbols(
        &mut ctx,
        &mut programs,
        &mut tiles,
        &style,
        &[a, b],
        &transform(),
        &placement,
        None,
        &LightingUniforms::default(),
        &FrameParams::default(),
    );

    // Key order 1, 3, 5 regardless of tile of origin. Key 1 was the second
    // segment of tile a (index_start 6), key 3 tile b's first, key 5 tile
    // a's first.
    assert_eq!(ctx.draws.len(), 3);
    let order: Vec<(u32, u32)> = ctx
        .draws
        .iter()
        .map(|d| (d.vertex_buffer.0, d.index_start))
        .collect();
    assert_eq!(order, vec![(100, 6), (400, 0), (100, 0)]);
}

#[test]
fn variable_anchor_resolution_precedes_drawing() {
    let mut ctx = RecordingContext::new();
    let mut programs = ProgramCache::new();
    let mut tiles = TileCache::new();
    let coord = TileCoord::new(4, 8, 8);
    tiles.insert(tile_with_bucket(coord, &[0.0], &[0.0], &[1, 2]));

    let mut style = style();
    style.variable_anchors = true;

    let mut offsets = HashMap::new();
    offsets.insert(
        1,
        VariableOffset {
            width: 80.0,
            height: 20.0,
            anchor: AnchorCorner::Top,
            text_offset: [0.0, 1.0],
            text_scale: 16.0,
        },
    );
    let opacities = shown(&[1, 2]);
    let placement = PlacementView::new(&offsets, &opacities);
    draw_symbols(
        &mut ctx,
        &mut programs,
        &mut tiles,
        &style,
        &[coord],
        &transform(),
        &placement,
        None,
        &LightingUniforms::default(),
        &FrameParams::default(),
    );

    // The text dynamic buffer was rewritten and uploaded this frame.
    let upload = ctx
        .uploads
        .get(&BufferHandle(102))
        .expect("dynamic text buffer uploaded");
    let vertices: Vec<sigil::DynamicVertex> = upload
        .chunks_exact(std::mem::size_of::<sigil::DynamicVertex>())
        .map(bytemuck::pod_read_unaligned)
        .collect();
    // Label 1 resolved to a live position, label 2 had no candidate.
    assert!(vertices[..4].iter().all(|v| !v.is_hidden()));
    assert!(vertices[4..].iter().all(|v| v.is_hidden()));
    assert!(!ctx.draws.is_empty());
}

#[test]
fn occlusion_layer_issues_queries_and_draws() {
    let mut ctx = RecordingContext::new();
    let mut programs = ProgramCache::new();
    let mut tiles = TileCache::new();
    let coord = TileCoord::new(4, 8, 8);
    tiles.insert(tile_with_bucket(coord, &[0.0], &[0.0], &[0, 1, 2, 3]));

    let mut style = style();
    style.occluded_opacity = 0.2;

    let offsets = HashMap::new();
    let opacities = shown(&[0, 1, 2, 3]);
    let placement = PlacementView::new(&offsets, &opacities);
    draw_symbols(
        &mut ctx,
        &mut programs,
        &mut tiles,
        &style,
        &[coord],
        &transform(),
        &placement,
        None,
        &LightingUniforms::default(),
        &FrameParams {
            frame_counter: 0,
            occlusion_visualize: false,
        },
    );

    // Window of four: exactly one instance starts a query on frame zero,
    // and the regular icon/text draws still happen.
    assert_eq!(ctx.begun_queries.len(), 1);
    assert_eq!(ctx.occluder_draws.len(), 1);
    assert_eq!(ctx.draws.len(), 2);
}

#[test]
fn eviction_releases_bucket_queries() {
    let mut ctx = RecordingContext::new();
    let mut programs = ProgramCache::new();
    let mut tiles = TileCache::new();
    let coord = TileCoord::new(4, 8, 8);
    tiles.insert(tile_with_bucket(coord, &[0.0], &[0.0], &[0]));

    let mut style = style();
    style.occluded_opacity = 0.0;
    let offsets = HashMap::new();
    let opacities = shown(&[0]);
    let placement = PlacementView::new(&offsets, &opacities);
    draw_symbols(
        &mut ctx,
        &mut programs,
        &mut tiles,
        &style,
        &[coord],
        &transform(),
        &placement,
        None,
        &LightingUniforms::default(),
        &FrameParams::default(),
    );
    assert_eq!(ctx.begun_queries.len(), 1);

    // The pending query is abandoned and its object handed back.
    tiles.evict(coord, &mut ctx);
    assert_eq!(ctx.released_queries.len(), 1);
}

#[test]
fn collision_debug_draws_one_box_per_instance() {
    let mut ctx = RecordingContext::new();
    let mut tiles = TileCache::new();
    let coord = TileCoord::new(4, 8, 8);
    tiles.insert(tile_with_bucket(coord, &[0.0], &[0.0], &[1, 2, 3]));

    let offsets = HashMap::new();
    let mut opacities = shown(&[1, 2]);
    opacities.insert(3, 0.0);
    let placement = PlacementView::new(&offsets, &opacities);
    draw_collision_debug(
        &mut ctx,
        &tiles,
        &style(),
        &[coord],
        &transform(),
        &placement,
    );

    assert_eq!(ctx.debug_boxes.len(), 3);
    // The hidden instance renders translucent red.
    assert!(ctx.debug_boxes[2].color[3] < 1.0);
}
