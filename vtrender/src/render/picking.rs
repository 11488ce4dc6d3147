//! Identifies the feature under a pixel.
//!
//! The picking pass draws every feature with a unique id encoded into the color of its pixels.
//! Ids are handed out in ranges, one range per plugin and tile, so that a decoded id leads back
//! to the plugin, the tile and the picking id of the feature within the tile.

use crate::{coords::WorldTileCoords, io::TileFeature, style::PluginId};

/// Id 0 is written by the clear color and means nothing was hit.
pub const NO_HIT: u32 = 0;

/// Little endian RGBA bytes of a picking id.
pub fn encode_id(id: u32) -> [u8; 4] {
    id.to_le_bytes()
}

pub fn decode_id(pixel: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = pixel.get(0..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// A feature found by picking.
#[derive(Clone, Debug, PartialEq)]
pub struct PickResult {
    /// Position of the plugin in the style.
    pub style_layer: usize,
    pub plugin: PluginId,
    pub coords: WorldTileCoords,
    /// Index of the feature among the features the plugin drew of the tile.
    pub picking_id: u32,
    pub feature: Option<TileFeature>,
}

#[derive(Clone, Debug, PartialEq)]
struct PickingRange {
    base_id: u32,
    len: u32,
    style_layer: usize,
    plugin: PluginId,
    coords: WorldTileCoords,
}

/// Ranges of picking ids handed out for one picking pass.
#[derive(Clone, Debug, Default)]
pub struct PickingTable {
    ranges: Vec<PickingRange>,
    next: u32,
}

impl PickingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `len` ids and returns the base id to draw with.
    pub fn reserve(
        &mut self,
        style_layer: usize,
        plugin: PluginId,
        coords: WorldTileCoords,
        len: u32,
    ) -> u32 {
        let base_id = self.next;
        self.next = self.next.saturating_add(len);
        self.ranges.push(PickingRange {
            base_id,
            len,
            style_layer,
            plugin,
            coords,
        });
        base_id
    }

    /// Resolves an id read from the picking target.
    pub fn lookup(&self, id: u32) -> Option<(usize, PluginId, WorldTileCoords, u32)> {
        let offset = id.checked_sub(1)?;
        let range = self
            .ranges
            .iter()
            .find(|range| offset >= range.base_id && offset < range.base_id + range.len)?;
        Some((
            range.style_layer,
            range.plugin,
            range.coords,
            offset - range.base_id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        coords::WorldTileCoords,
        render::picking::{decode_id, encode_id, PickingTable, NO_HIT},
        style::PluginId,
    };

    #[test]
    fn test_id_encoding() {
        assert_eq!(encode_id(0x0102_0304), [4, 3, 2, 1]);
        assert_eq!(decode_id(&[4, 3, 2, 1, 9]), Some(0x0102_0304));
        assert_eq!(decode_id(&[1, 2]), None);
    }

    #[test]
    fn test_lookup() {
        let fill = PluginId::next();
        let line = PluginId::next();
        let tile = WorldTileCoords::new(1, 1, 2);

        let mut table = PickingTable::new();
        assert_eq!(table.reserve(0, fill, tile, 3), 0);
        assert_eq!(table.reserve(1, line, tile, 2), 3);

        assert_eq!(table.lookup(NO_HIT), None);
        assert_eq!(table.lookup(1), Some((0, fill, tile, 0)));
        assert_eq!(table.lookup(3), Some((0, fill, tile, 2)));
        assert_eq!(table.lookup(4), Some((1, line, tile, 0)));
        assert_eq!(table.lookup(6), None);
    }
}
