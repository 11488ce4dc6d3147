use vtrender::{
    coords::{TileInfo, WorldTileCoords},
    io::{scheduler::ImmediatePackScheduler, source_client::StaticTileSource},
    render::{
        backend::{GpuBackend, RenderTarget},
        frame::{FrameView, VisibleTiles},
        headless::HeadlessBackend,
        settings::RendererSettings,
        VectorTileRenderer,
    },
    style::{SceneConfig, Style},
    tile::{Feature, GeometryType, PropertyValue, RawTile, SourceLayer},
};

const TILE_SIZE: f64 = 4.0;
const CANVAS: u32 = 8;

const STYLE: &str = r##"[{
    "type": "fill",
    "style": [{ "symbol": {
        "polygonFill": { "property": "color", "type": "identity" },
        "polygonOpacity": 0.5
    } }]
}]"##;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn covering_square(color: &str) -> RawTile {
    let square = Feature::new(
        GeometryType::Polygon,
        vec![vec![
            [0.0, 0.0, 0.0],
            [4096.0, 0.0, 0.0],
            [4096.0, 4096.0, 0.0],
            [0.0, 4096.0, 0.0],
        ]],
    )
    .with_property("color", color);
    RawTile::Layers(vec![SourceLayer {
        name: "land".to_owned(),
        extent: Some(4096),
        features: vec![square],
    }])
}

fn parent() -> WorldTileCoords {
    WorldTileCoords::new(0, 0, 0)
}

fn child() -> WorldTileCoords {
    WorldTileCoords::new(0, 0, 1)
}

fn renderer(stencil: bool) -> VectorTileRenderer<ImmediatePackScheduler> {
    let source = StaticTileSource::new()
        .with_tile(parent(), covering_square("#ff0000"))
        .with_tile(child(), covering_square("#0000ff"));
    let settings = RendererSettings {
        stencil,
        tile_size: TILE_SIZE,
        ..RendererSettings::default()
    };
    VectorTileRenderer::new(
        Style::from_json(STYLE).unwrap(),
        settings,
        ImmediatePackScheduler::new(source),
    )
}

/// The parent tile covers the whole canvas at zoom 1, the child its top left quarter.
fn view(tiles: &[WorldTileCoords]) -> FrameView {
    let infos = tiles
        .iter()
        .map(|coords| TileInfo::from_grid(*coords, TILE_SIZE, 1.0))
        .collect();
    FrameView::top_down(VisibleTiles::new(infos), 1.0, CANVAS, CANVAS)
}

fn pixel(backend: &HeadlessBackend, x: u32, y: u32) -> Vec<u8> {
    backend.read_pixels(RenderTarget::Screen, x, y, 1, 1).unwrap()
}

#[test]
fn test_tiles_appear_once_packed() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);
    let view = view(&[parent(), child()]);

    let first = renderer.render_frame(&mut backend, &view).unwrap();
    assert_eq!(first.drawn_tiles, 0);
    assert!(first.redraw);

    let second = renderer.render_frame(&mut backend, &view).unwrap();
    assert_eq!(second.drawn_tiles, 2);
    assert_eq!(second.pending_tiles, 0);
    assert!(!second.redraw);
    assert!(!renderer.need_to_redraw(&view));
}

#[test]
fn test_child_hides_parent() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);
    let view = view(&[parent(), child()]);
    renderer.render_frame(&mut backend, &view).unwrap();
    renderer.render_frame(&mut backend, &view).unwrap();

    for (x, y) in [(0, 0), (1, 2), (3, 3)] {
        assert_eq!(pixel(&backend, x, y), vec![0, 0, 128, 128], "pixel {x},{y}");
    }
    for (x, y) in [(4, 0), (7, 7), (0, 5)] {
        assert_eq!(pixel(&backend, x, y), vec![128, 0, 0, 128], "pixel {x},{y}");
    }
}

#[test]
fn test_overlapping_tiles_blend_without_stencil() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(false);
    let view = view(&[parent(), child()]);
    renderer.render_frame(&mut backend, &view).unwrap();
    renderer.render_frame(&mut backend, &view).unwrap();

    assert_eq!(pixel(&backend, 1, 1), vec![64, 0, 128, 191]);
    assert_eq!(pixel(&backend, 6, 6), vec![128, 0, 0, 128]);
}

#[test]
fn test_pick_feature() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);
    let view = view(&[parent(), child()]);
    renderer.render_frame(&mut backend, &view).unwrap();
    renderer.render_frame(&mut backend, &view).unwrap();

    let hit = renderer.pick(&mut backend, 1, 1).unwrap().unwrap();
    assert_eq!(hit.style_layer, 0);
    assert_eq!(hit.plugin, renderer.style().plugins[0].id);
    assert_eq!(hit.coords, child());
    assert_eq!(hit.picking_id, 0);
    let feature = hit.feature.unwrap();
    assert_eq!(feature.layer, "land");
    assert_eq!(
        feature.feature.properties.get("color"),
        Some(&PropertyValue::String("#0000ff".to_owned()))
    );

    let hit = renderer.pick(&mut backend, 6, 6).unwrap().unwrap();
    assert_eq!(hit.coords, parent());

    assert!(renderer.pick(&mut backend, 100, 100).unwrap().is_none());
}

#[test]
fn test_hit_detect() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);
    let view = view(&[child()]);
    renderer.render_frame(&mut backend, &view).unwrap();
    renderer.render_frame(&mut backend, &view).unwrap();

    assert!(renderer.hit_detect(&mut backend, 2, 2).unwrap());
    assert!(!renderer.hit_detect(&mut backend, 6, 6).unwrap());
}

#[test]
fn test_failed_tiles_are_requested_again() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);
    let missing = WorldTileCoords::new(1, 1, 1);
    let view = view(&[missing]);

    let first = renderer.render_frame(&mut backend, &view).unwrap();
    assert_eq!(first.pending_tiles, 1);

    // The failure arrives and the tile stays empty for this frame.
    let second = renderer.render_frame(&mut backend, &view).unwrap();
    assert_eq!(second.drawn_tiles, 0);
    assert_eq!(second.pending_tiles, 0);

    let third = renderer.render_frame(&mut backend, &view).unwrap();
    assert_eq!(third.pending_tiles, 1);
}

#[test]
fn test_removed_tile_result_is_discarded() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);
    let view = view(&[parent()]);

    renderer.render_frame(&mut backend, &view).unwrap();
    renderer.remove_tile(&parent());

    let nothing = FrameView::top_down(VisibleTiles::default(), 1.0, CANVAS, CANVAS);
    let status = renderer.render_frame(&mut backend, &nothing).unwrap();
    assert_eq!(status.drawn_tiles, 0);
    assert_eq!(pixel(&backend, 4, 4), vec![0, 0, 0, 0]);
}

#[test]
fn test_tiles_fade_in() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);
    let plugin = renderer.style().plugins[0].id;
    assert!(renderer.update_scene_config(plugin, &SceneConfig { fade_duration_ms: 100.0 }));

    let mut view = view(&[parent()]);
    renderer.render_frame(&mut backend, &view).unwrap();

    view.timestamp_ms = 10.0;
    let loaded = renderer.render_frame(&mut backend, &view).unwrap();
    assert!(loaded.redraw);
    assert_eq!(pixel(&backend, 4, 4), vec![0, 0, 0, 0]);

    view.timestamp_ms = 60.0;
    assert!(renderer.render_frame(&mut backend, &view).unwrap().redraw);
    assert!(renderer.need_to_redraw(&view));

    view.timestamp_ms = 500.0;
    let settled = renderer.render_frame(&mut backend, &view).unwrap();
    assert!(!settled.redraw);
    assert_eq!(pixel(&backend, 4, 4), vec![128, 0, 0, 128]);
}

#[test]
fn test_set_style_repacks() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);
    let view = view(&[parent()]);
    renderer.render_frame(&mut backend, &view).unwrap();
    renderer.render_frame(&mut backend, &view).unwrap();

    renderer.set_style(
        Style::from_json(r##"[{"type": "fill", "style": [{"symbol": {"polygonFill": "#00ff00"}}]}]"##)
            .unwrap(),
    );
    let first = renderer.render_frame(&mut backend, &view).unwrap();
    assert_eq!(first.drawn_tiles, 0);

    renderer.render_frame(&mut backend, &view).unwrap();
    assert_eq!(pixel(&backend, 4, 4), vec![0, 255, 0, 255]);
}

#[test]
fn test_interaction_forces_redraw() {
    let mut renderer = renderer(true);
    let mut view = view(&[]);
    assert!(!renderer.need_to_redraw(&view));
    view.interacting = true;
    assert!(renderer.need_to_redraw(&view));
}

#[test]
fn test_resize_and_remove() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);
    let view = view(&[parent()]);
    renderer.render_frame(&mut backend, &view).unwrap();
    renderer.render_frame(&mut backend, &view).unwrap();
    assert!(renderer.pick(&mut backend, 1, 1).unwrap().is_some());

    renderer.resize(&mut backend, 16, 16).unwrap();
    renderer.remove(&mut backend);

    let status = renderer.render_frame(&mut backend, &view).unwrap();
    assert_eq!(status.drawn_tiles, 0);
    assert!(!renderer.need_to_redraw(&view));
    assert!(renderer.pick(&mut backend, 1, 1).unwrap().is_none());
}

#[test]
fn test_tiles_packed_after_leaving_the_view_are_evicted() {
    init();
    let mut backend = HeadlessBackend::new(CANVAS, CANVAS);
    let mut renderer = renderer(true);

    renderer.render_frame(&mut backend, &view(&[parent()])).unwrap();
    // The parent arrives after the camera moved on to the child.
    let moved = view(&[child()]);
    renderer.render_frame(&mut backend, &moved).unwrap();
    let settled = renderer.render_frame(&mut backend, &moved).unwrap();
    assert_eq!(settled.drawn_tiles, 1);
    assert_eq!(settled.pending_tiles, 0);
    assert!(!settled.redraw);
    assert!(!renderer.need_to_redraw(&moved));

    let back = renderer.render_frame(&mut backend, &view(&[parent()])).unwrap();
    assert_eq!(back.drawn_tiles, 0);
    assert_eq!(back.pending_tiles, 1);
}
