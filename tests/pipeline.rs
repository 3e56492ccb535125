// End-to-end runs of the reconstruction pipeline and exporter.

use approx::assert_relative_eq;
use image::{Rgb, RgbImage};
use memory_reconstructor::export::read_json_scene;
use memory_reconstructor::lighting::LightingModel;
use memory_reconstructor::surface::extend_background;
use memory_reconstructor::{
    ArExporter, DepthEstimator, ImageAnalyzer, Mesh, PipelineConfig, PointCloud, ProcessingOptions, Reconstructor,
    SceneResult, SurfaceReconstructor, scoring,
};
use nalgebra::Point3;
use std::collections::HashSet;

fn gray(w: u32, h: u32) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb([128, 128, 128]))
}

fn triangle_scene() -> SceneResult {
    let mesh = Mesh::from_parts(
        vec![Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 1.5), Point3::new(0.0, 1.0, 2.0)],
        vec![[0, 1, 2]],
        Some(vec![[10, 20, 30], [40, 50, 60], [70, 80, 90]]),
    )
    .unwrap();
    SceneResult { mesh, lighting: LightingModel::default(), complexity: 0.2, quality: 0.6 }
}

#[test]
fn constant_gray_image() {
    let img = gray(100, 100);
    let depth = DepthEstimator::default().estimate(&img, true).into_value();
    assert!(depth.values().iter().all(|&d| d == 0.0));

    let (scene, summary) = Reconstructor::default().run(&img, &ProcessingOptions::default());
    assert!(summary.depth_points <= 10_000);

    let analysis = ImageAnalyzer::default().analyze(&img);
    let expected = (0.6 * analysis.quality_score() + 0.4 * scene.complexity).min(1.0);
    assert_relative_eq!(scene.quality, expected, epsilon = 1e-12);
    assert_relative_eq!(summary.quality_score, scene.quality);
    assert_relative_eq!(scene.complexity, scoring::complexity(&scene.mesh));
}

#[test]
fn background_extension_adds_ground() {
    let img = RgbImage::from_fn(40, 40, |x, y| Rgb([((x * 37 + y * 11) % 256) as u8, ((x * y) % 256) as u8, 90]));
    let mut cfg = PipelineConfig::default();
    cfg.surface.grid_resolution = 12;
    let r = Reconstructor::from_config(&cfg);

    let plain = ProcessingOptions { background_extension: false, ..ProcessingOptions::default() };
    let (without, _) = r.run(&img, &plain);
    let (with, _) = r.run(&img, &ProcessingOptions { background_extension: true, ..plain });
    assert_eq!(with.mesh.vertex_count(), without.mesh.vertex_count() + 4);
    assert_eq!(with.mesh.face_count(), without.mesh.face_count() + 2);
}

#[test]
fn background_faces_index_new_vertices() {
    let mut mesh = triangle_scene().mesh;
    let old = mesh.vertex_count();
    extend_background(&mut mesh).unwrap();
    let new_faces = &mesh.faces()[1..];
    assert_eq!(new_faces.len(), 2);
    assert!(new_faces.iter().flatten().all(|&i| i as usize >= old));
}

#[test]
fn four_point_grid_fallback() {
    let mut cloud = PointCloud::default();
    for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
        cloud.push(Point3::new(x, y, 2.0), [50, 50, 50]);
    }
    let mesh = SurfaceReconstructor::grid_fallback(&cloud);
    assert_eq!(mesh.face_count(), 2);
    let used: HashSet<u32> = mesh.faces().iter().flatten().copied().collect();
    assert_eq!(used, HashSet::from([0, 1, 2, 3]));
}

#[test]
fn unknown_extension_exports_glb() {
    let dir = tempfile::tempdir().unwrap();
    let path = ArExporter::default().export(&triangle_scene(), &dir.path().join("scene.usdz")).unwrap();
    assert_eq!(path, dir.path().join("scene.glb"));
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], b"glTF");
}

#[test]
fn each_format_lands_where_asked() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = ArExporter::default();
    for ext in ["glb", "gltf", "obj"] {
        let target = dir.path().join(format!("scene.{ext}"));
        assert_eq!(exporter.export(&triangle_scene(), &target).unwrap(), target);
        assert!(std::fs::metadata(&target).unwrap().len() > 0);
    }
}

#[test]
fn empty_mesh_falls_back_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let scene = SceneResult { mesh: Mesh::empty(), ..triangle_scene() };
    let path = ArExporter::default().export(&scene, &dir.path().join("scene.glb")).unwrap();
    assert_eq!(path, dir.path().join("scene.json"));

    let doc = read_json_scene(&path).unwrap();
    assert_eq!(doc.metadata.vertex_count, 0);
    assert!(doc.geometry.faces.is_empty());
}

#[test]
fn json_fallback_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let scene = triangle_scene();
    let path = dir.path().join("scene.json");
    memory_reconstructor::export::write_json_scene(&scene, &path).unwrap();
    let mesh = read_json_scene(&path).unwrap().to_mesh().unwrap();
    assert_eq!(mesh.vertices(), scene.mesh.vertices());
    assert_eq!(mesh.faces(), scene.mesh.faces());
    assert_eq!(mesh.colors(), scene.mesh.colors());
}

#[test]
fn preview_is_a_jpeg_of_configured_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = ArExporter::default().generate_preview(&triangle_scene(), &dir.path().join("preview.jpg")).unwrap();
    let img = image::open(&path).unwrap();
    assert_eq!((img.width(), img.height()), (512, 512));
}
