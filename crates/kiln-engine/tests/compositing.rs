use kiln_engine::atlas::{ImageData, ImageLibrary, TextureAtlas};
use kiln_engine::coords::{Color, Rect, Vec2};
use kiln_engine::gfx::{BackendCommand, DrawMode, HeadlessBackend, Topology};
use kiln_engine::render::{Compositor, CompositorSettings, GpuCompositor, TextureSource, screen_projection};

fn sheet_atlas() -> TextureAtlas {
    let mut images = ImageLibrary::new();
    images.insert(ImageData::filled("sheet", 64, 16, [200, 100, 50, 255]));
    TextureAtlas::from_json(r#"{"framewidth": 16, "frameheight": 16, "image": "sheet"}"#, &images).unwrap()
}

#[test]
fn sprite_frames_batch_into_one_draw() {
    let settings = CompositorSettings::from_json(r#"{"maxQuads": 64, "antialias": true}"#).unwrap();
    let mut c = GpuCompositor::new(HeadlessBackend::new(), &settings).unwrap();
    c.set_projection(screen_projection(640.0, 480.0)).unwrap();
    let atlas = sheet_atlas();

    for (i, name) in ["0", "1", "2", "3"].into_iter().enumerate() {
        let region = atlas.get_region(name, None).unwrap().unwrap();
        let source = TextureSource::from_atlas(&atlas, Some(region)).unwrap();
        let dest = Rect::new(i as f32 * 16.0, 0.0, 16.0, 16.0);
        c.add_quad(source, dest, region.uvs, Color::white()).unwrap();
    }
    c.flush().unwrap();

    let draws: Vec<_> = c.backend().draws().collect();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].topology, Topology::Quads);
    assert_eq!(draws[0].vertex_count, 16);
    // third frame, top-right corner
    assert_eq!((draws[0].float(9, 2), draws[0].float(9, 3)), (0.75, 0.0));

    let uploads = c
        .backend()
        .commands()
        .iter()
        .filter(|cmd| matches!(cmd, BackendCommand::CreateTexture { .. }))
        .count();
    assert_eq!(uploads, 1);
}

#[test]
fn alternating_images_flush_at_each_switch() {
    let mut c = GpuCompositor::with_defaults(HeadlessBackend::new()).unwrap();
    let a = ImageData::filled("a", 2, 2, [255; 4]);
    let b = ImageData::filled("b", 2, 2, [0, 0, 0, 255]);
    let dest = Rect::new(0.0, 0.0, 2.0, 2.0);
    let uvs = [0.0, 0.0, 1.0, 1.0];

    for image in [&a, &b, &a] {
        c.add_quad(image.into(), dest, uvs, Color::white()).unwrap();
    }
    c.flush().unwrap();

    let sampled: Vec<_> = c.backend().draws().map(|d| d.textures.clone()).collect();
    let (ta, tb) = (c.image_texture(&a), c.image_texture(&b));
    assert_eq!(sampled, vec![vec![ta], vec![tb], vec![ta]]);
    assert_ne!(ta, tb);
}

#[test]
fn primitives_interleave_with_quads() {
    let mut c = GpuCompositor::with_defaults(HeadlessBackend::new()).unwrap();
    let atlas = sheet_atlas();
    let region = atlas.get_region("0", None).unwrap().unwrap();
    let source = TextureSource::from_atlas(&atlas, Some(region)).unwrap();
    let dest = Rect::new(0.0, 0.0, 16.0, 16.0);

    c.add_quad(source, dest, region.uvs, Color::white()).unwrap();
    let outline = [Vec2::new(0.0, 0.0), Vec2::new(16.0, 0.0), Vec2::new(16.0, 16.0), Vec2::new(0.0, 16.0)];
    c.draw_vertices(DrawMode::LineLoop, &outline, Color::black()).unwrap();
    c.add_quad(source, dest, region.uvs, Color::white()).unwrap();
    c.flush().unwrap();

    let modes: Vec<_> = c.backend().draws().map(|d| (d.mode, d.topology, d.vertex_count)).collect();
    assert_eq!(
        modes,
        vec![
            (DrawMode::Triangles, Topology::Quads, 4),
            (DrawMode::LineLoop, Topology::Raw, 4),
            (DrawMode::Triangles, Topology::Quads, 4),
        ]
    );
}

#[test]
fn device_loss_recovers_on_a_fresh_backend() {
    let mut c = GpuCompositor::with_defaults(HeadlessBackend::new()).unwrap();
    let img = ImageData::filled("a", 1, 1, [255; 4]);
    let dest = Rect::new(0.0, 0.0, 1.0, 1.0);
    c.add_quad((&img).into(), dest, [0.0, 0.0, 1.0, 1.0], Color::white()).unwrap();

    c.backend_mut().lose_context();
    assert!(c.poll_context());

    let old = c.replace_backend(HeadlessBackend::new()).unwrap();
    assert_eq!(old.live_programs(), 0);

    c.add_quad((&img).into(), dest, [0.0, 0.0, 1.0, 1.0], Color::white()).unwrap();
    c.flush().unwrap();
    assert_eq!(c.backend().draw_count(), 1);
    assert_eq!(c.backend().live_programs(), 2);
}
