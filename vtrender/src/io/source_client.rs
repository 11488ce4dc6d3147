//! Tile sources.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::{coords::WorldTileCoords, tile::RawTile};

#[derive(Error, Debug)]
#[error("failed to fetch from source")]
pub struct SourceFetchError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

#[derive(Error, Debug)]
#[error("no tile at {0}")]
pub struct TileNotFound(pub WorldTileCoords);

/// Delivers the raw data of a tile. Fetching and caching strategies are up to the implementor.
#[async_trait]
pub trait TileSource: Send + Sync + 'static {
    async fn fetch(&self, coords: &WorldTileCoords) -> Result<RawTile, SourceFetchError>;
}

/// Serves tiles from memory.
#[derive(Default, Clone)]
pub struct StaticTileSource {
    tiles: HashMap<WorldTileCoords, RawTile>,
}

impl StaticTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coords: WorldTileCoords, tile: RawTile) {
        self.tiles.insert(coords, tile);
    }

    pub fn with_tile(mut self, coords: WorldTileCoords, tile: RawTile) -> Self {
        self.insert(coords, tile);
        self
    }

    pub fn sync_fetch(&self, coords: &WorldTileCoords) -> Result<RawTile, SourceFetchError> {
        self.tiles
            .get(coords)
            .cloned()
            .ok_or_else(|| SourceFetchError(Box::new(TileNotFound(*coords))))
    }
}

#[async_trait]
impl TileSource for StaticTileSource {
    async fn fetch(&self, coords: &WorldTileCoords) -> Result<RawTile, SourceFetchError> {
        self.sync_fetch(coords)
    }
}
