use std::collections::HashMap;

use anyhow::Result;

use crate::bucket::SymbolBucket;

/// Slippy-map tile coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom.
    pub fn tiles_across(&self) -> u32 {
        1 << self.z
    }
}

/// One loaded tile holding the baked symbol buckets per layer.
#[derive(Default)]
pub struct Tile {
    pub coord: TileCoord,
    buckets: HashMap<String, SymbolBucket>,
}

impl Tile {
    pub fn new(coord: TileCoord) -> Self {
        Self {
            coord,
            buckets: HashMap::new(),
        }
    }

    /// Registers a baked bucket for a layer, validating its internal ranges.
    pub fn add_symbol_bucket(&mut self, layer_id: impl Into<String>, bucket: SymbolBucket) -> Result<()> {
        bucket.validate()?;
        self.buckets.insert(layer_id.into(), bucket);
        Ok(())
    }

    /// Bucket for `layer_id`, or `None` when the tile has no symbols there.
    pub fn symbol_bucket(&self, layer_id: &str) -> Option<&SymbolBucket> {
        self.buckets.get(layer_id)
    }

    pub fn symbol_bucket_mut(&mut self, layer_id: &str) -> Option<&mut SymbolBucket> {
        self.buckets.get_mut(layer_id)
    }
}

/// In-memory store of loaded tiles, filled by the tile loader.
#[derive(Default)]
pub struct TileCache {
    tiles: HashMap<TileCoord, Tile>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tile: Tile) {
        self.tiles.insert(tile.coord, tile);
    }

    pub fn tile(&self, coord: TileCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }

    pub fn tile_mut(&mut self, coord: TileCoord) -> Option<&mut Tile> {
        self.tiles.get_mut(&coord)
    }

    /// Drops a tile, releasing its buckets and their GPU queries.
    pub fn evict(&mut self, coord: TileCoord, ctx: &mut dyn crate::gfx::GraphicsContext) {
        if let Some(tile) = self.tiles.remove(&coord) {
            for bucket in tile.buckets.into_values() {
                bucket.release_queries(ctx);
            }
        }
    }
}
