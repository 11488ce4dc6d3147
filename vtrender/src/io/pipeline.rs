//! Turns a raw tile into the packed buffers of every plugin of a style.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    error::WorkerError,
    io::{PackRequest, PackResponse, PluginBuffer, SymbolGeometry, TileFeature},
    pack::{
        create_styled_vector, line::LinePack, polygon::PolygonPack, PackOptions, StyledVector,
        VectorPack,
    },
    style::{symbol::Symbol, ResolvedPlugin, Style},
    tile::{tile_parser::TileParser, Feature, RawTile, SourceLayer},
};

/// A feature of any layer, in tile order.
struct FlatFeature<'a> {
    layer: &'a SourceLayer,
    feature: &'a Feature,
}

/// Collects the features referenced by plugins, each at most once.
#[derive(Default)]
struct FeatureTable {
    positions: HashMap<usize, u32>,
    features: Vec<TileFeature>,
}

impl FeatureTable {
    fn index_of(&mut self, flat_index: usize, flat: &FlatFeature<'_>) -> u32 {
        if let Some(index) = self.positions.get(&flat_index) {
            return *index;
        }
        let index = self.features.len() as u32;
        self.features.push(TileFeature {
            layer: flat.layer.name.clone(),
            feature: flat.feature.clone(),
        });
        self.positions.insert(flat_index, index);
        index
    }
}

/// Decodes `raw` and packs it for every plugin of `style`.
#[tracing::instrument(skip_all)]
pub fn process_tile(
    request: &PackRequest,
    raw: RawTile,
    style: &Style,
    options: &PackOptions,
) -> Result<PackResponse, WorkerError> {
    let coords = request.tile_info.coords();
    let layers = TileParser::parse_raw(raw)?;
    let flat: Vec<FlatFeature> = layers
        .iter()
        .flat_map(|layer| {
            layer
                .features
                .iter()
                .map(move |feature| FlatFeature { layer, feature })
        })
        .collect();

    let mut table = FeatureTable::default();
    let per_plugin_buffers = style
        .plugins
        .iter()
        .map(|plugin| pack_plugin(request, plugin, &flat, &mut table, options))
        .collect::<Vec<_>>();

    let features = serde_json::to_string(&table.features)
        .map_err(|e| WorkerError::Task(format!("serializing features failed: {e}")))?;

    log::info!(
        "tile {coords} packed: {} features in {} plugins",
        table.features.len(),
        per_plugin_buffers.iter().flatten().count()
    );

    Ok(PackResponse {
        per_plugin_buffers,
        features,
    })
}

fn pack_plugin(
    request: &PackRequest,
    plugin: &ResolvedPlugin,
    flat: &[FlatFeature<'_>],
    table: &mut FeatureTable,
    options: &PackOptions,
) -> Option<PluginBuffer> {
    let zoom = request.zoom();
    let mut styled_features = Vec::new();
    // Vectors grouped by rule and by the extent of their layer.
    let mut groups: BTreeMap<(usize, Option<u32>), Vec<StyledVector>> = BTreeMap::new();
    let mut icon_requests = BTreeSet::new();

    for (flat_index, entry) in flat.iter().enumerate() {
        let Some(rule_index) = plugin.match_rule(&entry.layer.name, entry.feature) else {
            continue;
        };
        let symbol = &plugin.rules[rule_index].symbol;

        let picking_id = styled_features.len() as u32;
        let vector = match create_styled_vector(entry.feature, picking_id, symbol, zoom) {
            Ok(vector) => vector,
            Err(e) => {
                log::warn!(
                    "dropping feature {:?} of layer {} for {}: {e}",
                    entry.feature.id,
                    entry.layer.name,
                    plugin.id
                );
                continue;
            }
        };

        if let Some(pattern) = &vector.style.pattern {
            let in_atlas = options
                .atlas
                .as_ref()
                .map_or(false, |atlas| atlas.positions.contains_key(pattern));
            if !in_atlas {
                icon_requests.insert(pattern.clone());
            }
        }

        styled_features.push(table.index_of(flat_index, entry));
        let extent = entry.feature.extent.or(entry.layer.extent);
        groups.entry((rule_index, extent)).or_default().push(vector);
    }

    let geometries: Vec<SymbolGeometry> = groups
        .into_iter()
        .filter_map(|((symbol_index, extent), vectors)| {
            let scale = match extent {
                Some(extent) if extent > 0 => request.extent as f64 / extent as f64,
                _ => 1.0,
            };
            let buffer = match &plugin.rules[symbol_index].symbol {
                Symbol::Fill(symbol) => PolygonPack::new(symbol, options).pack(&vectors, scale),
                Symbol::Line(symbol) => LinePack::new(symbol, options).pack(&vectors, scale),
            }?;
            Some(SymbolGeometry {
                symbol_index,
                buffer,
            })
        })
        .collect();

    if geometries.is_empty() {
        return None;
    }

    Some(PluginBuffer {
        plugin_id: plugin.id,
        geometries,
        styled_features,
        icon_requests,
    })
}
