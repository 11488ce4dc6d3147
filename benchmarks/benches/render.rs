use criterion::{criterion_group, criterion_main, Criterion};
use vtrender::{
    coords::{TileInfo, WorldTileCoords},
    io::{scheduler::ImmediatePackScheduler, source_client::StaticTileSource},
    render::{
        frame::{FrameView, VisibleTiles},
        headless::HeadlessBackend,
        settings::RendererSettings,
        VectorTileRenderer,
    },
    style::Style,
    tile::{Feature, GeometryType, RawTile, SourceLayer},
};

const STYLE: &str = r##"[
    {"type": "fill", "style": [{"symbol": {
        "polygonFill": {"property": "color", "type": "identity"},
        "polygonOpacity": 0.8
    }}]},
    {"type": "line", "style": [{"symbol": {"lineColor": "#222", "lineWidth": 2}}]}
]"##;

const TILE_SIZE: f64 = 64.0;
const CANVAS: u32 = 256;

fn tile(coords: WorldTileCoords) -> RawTile {
    let color = if (coords.x + coords.y) % 2 == 0 {
        "#f4e4c1"
    } else {
        "#c1e4f4"
    };
    let block = Feature::new(
        GeometryType::Polygon,
        vec![vec![
            [256.0, 256.0, 0.0],
            [3840.0, 256.0, 0.0],
            [3840.0, 3840.0, 0.0],
            [256.0, 3840.0, 0.0],
        ]],
    )
    .with_property("color", color);
    let road = Feature::new(
        GeometryType::LineString,
        vec![vec![[0.0, 2048.0, 0.0], [4096.0, 2048.0, 0.0]]],
    );
    RawTile::Layers(vec![SourceLayer {
        name: "city".to_owned(),
        extent: Some(4096),
        features: vec![block, road],
    }])
}

/// The 4x4 tiles of zoom level 2 and their parent at level 1 covering the top left quarter.
fn setup() -> (VectorTileRenderer<ImmediatePackScheduler>, FrameView) {
    let mut source = StaticTileSource::new();
    let mut tiles = Vec::new();
    for y in 0..4 {
        for x in 0..4 {
            let coords = WorldTileCoords::new(x, y, 2);
            source.insert(coords, tile(coords));
            tiles.push(TileInfo::from_grid(coords, TILE_SIZE, 1.0));
        }
    }
    let parent = WorldTileCoords::new(0, 0, 1);
    source.insert(parent, tile(parent));

    let visible = VisibleTiles {
        parents: vec![TileInfo::from_grid(parent, TILE_SIZE, 1.0)],
        children: Vec::new(),
        tiles,
    };
    let settings = RendererSettings {
        tile_size: TILE_SIZE,
        ..RendererSettings::default()
    };
    let renderer = VectorTileRenderer::new(
        Style::from_json(STYLE).unwrap(),
        settings,
        ImmediatePackScheduler::new(source),
    );
    (
        renderer,
        FrameView::top_down(visible, 2.0, CANVAS, CANVAS),
    )
}

fn bench_render_frame(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut renderer, view) = setup();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    // Pack everything before measuring.
    renderer.render_frame(&mut backend, &view).unwrap();
    renderer.render_frame(&mut backend, &view).unwrap();

    c.bench_function("render_frame", |b| {
        b.iter(|| renderer.render_frame(&mut backend, &view).unwrap())
    });

    c.bench_function("pick", |b| {
        b.iter(|| renderer.pick(&mut backend, CANVAS / 3, CANVAS / 3).unwrap())
    });
}

criterion_group!(benches, bench_render_frame);
criterion_main!(benches);
