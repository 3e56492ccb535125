// preview.rs - Top-down preview raster
//
// Orthographic view onto the X-Z plane from above (smallest Y wins),
// z-buffered and Lambert shaded with the scene light. A mesh that cannot be
// shaded (no faces, or no X-Z extent) is drawn as a blue wireframe on white,
// and a mesh without vertices as a gray placeholder.

use image::{Rgb, RgbImage};
use nalgebra::{Point2, Point3};
use tracing::debug;

use crate::mesh::Mesh;
use crate::pipeline::SceneResult;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const WIRE: Rgb<u8> = Rgb([0, 0, 255]);
const PLACEHOLDER_FILL: Rgb<u8> = Rgb([211, 211, 211]);
const PLACEHOLDER_EDGE: Rgb<u8> = Rgb([128, 128, 128]);
/// Share of the frame the scene's largest extent fills.
const FILL: f64 = 0.8;

pub fn render_preview(scene: &SceneResult, size: u32) -> RgbImage {
    let mesh = &scene.mesh;
    if mesh.is_empty() {
        debug!("Preview placeholder");
        return placeholder(size);
    }
    if let Some(img) = shaded(scene, size) {
        return img;
    }
    debug!(faces = mesh.face_count(), "Preview wireframe");
    wireframe(mesh, size)
}

/// Maps mesh X-Z onto pixel coordinates, centred on the bounds.
struct Projection {
    center: Point3<f64>,
    scale: f64,
    half: f64,
}

impl Projection {
    fn new(mesh: &Mesh, size: u32, extent: f64) -> Option<Self> {
        let bounds = mesh.bounds()?;
        let scale = if extent > 0.0 { f64::from(size) * FILL / extent } else { 1.0 };
        Some(Self { center: bounds.center(), scale, half: f64::from(size) / 2.0 })
    }

    fn apply(&self, p: &Point3<f64>) -> Point2<f64> {
        Point2::new((p.x - self.center.x) * self.scale + self.half, (p.z - self.center.z) * self.scale + self.half)
    }
}

fn shaded(scene: &SceneResult, size: u32) -> Option<RgbImage> {
    let mesh = &scene.mesh;
    let extent = mesh.bounds()?.extent();
    let xz = extent.x.max(extent.z);
    if mesh.face_count() == 0 || !(xz > 0.0) {
        return None;
    }
    let proj = Projection::new(mesh, size, xz)?;

    let light = -scene.lighting.direction;
    let ambient = scene.lighting.ambient;
    let intensity = scene.lighting.intensity;
    let mut img = RgbImage::from_pixel(size, size, BACKGROUND);
    let mut zbuf = vec![f64::INFINITY; (size * size) as usize];

    for f in mesh.faces() {
        let Some(normal) = mesh.face_normal(f).try_normalize(1e-12) else { continue };
        let lambert = normal.dot(&light).abs();
        let shade = (ambient + intensity * lambert).min(1.0);
        let base = face_color(mesh, f);
        let color = Rgb(base.map(|c| (c * shade).round().clamp(0.0, 255.0) as u8));

        let pts = f.map(|i| mesh.vertices()[i as usize]);
        let [a, b, c] = pts.map(|p| proj.apply(&p));
        let area = edge(&a, &b, &c);
        if area.abs() < 1e-12 {
            continue;
        }
        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
        let max_x = (a.x.max(b.x).max(c.x).ceil() as i64).clamp(0, i64::from(size) - 1) as u32;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
        let max_y = (a.y.max(b.y).max(c.y).ceil() as i64).clamp(0, i64::from(size) - 1) as u32;

        for py in min_y..=max_y {
            for px in min_x..=max_x {
                let p = Point2::new(f64::from(px) + 0.5, f64::from(py) + 0.5);
                let (w0, w1, w2) = (edge(&b, &c, &p) / area, edge(&c, &a, &p) / area, edge(&a, &b, &p) / area);
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let height = w0 * pts[0].y + w1 * pts[1].y + w2 * pts[2].y;
                let slot = (py * size + px) as usize;
                if height < zbuf[slot] {
                    zbuf[slot] = height;
                    img.put_pixel(px, py, color);
                }
            }
        }
    }
    Some(img)
}

fn edge(a: &Point2<f64>, b: &Point2<f64>, p: &Point2<f64>) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn face_color(mesh: &Mesh, f: &[u32; 3]) -> [f64; 3] {
    let Some(colors) = mesh.colors() else { return [200.0; 3] };
    let mut acc = [0.0; 3];
    for &i in f {
        for (k, c) in colors[i as usize].iter().enumerate() {
            acc[k] += f64::from(*c) / 3.0;
        }
    }
    acc
}

fn wireframe(mesh: &Mesh, size: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(size, size, BACKGROUND);
    let extent = mesh.bounds().map_or(0.0, |b| b.extent().amax());
    let Some(proj) = Projection::new(mesh, size, extent) else { return img };
    for f in mesh.faces() {
        let [a, b, c] = f.map(|i| proj.apply(&mesh.vertices()[i as usize]));
        for (p, q) in [(a, b), (b, c), (c, a)] {
            draw_line(&mut img, p, q, WIRE);
        }
    }
    img
}

// Bresenham, clipped per pixel
fn draw_line(img: &mut RgbImage, a: Point2<f64>, b: Point2<f64>, color: Rgb<u8>) {
    let (mut x0, mut y0) = (a.x.round() as i64, a.y.round() as i64);
    let (x1, y1) = (b.x.round() as i64, b.y.round() as i64);
    let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
    let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
    let mut err = dx + dy;
    let (w, h) = (i64::from(img.width()), i64::from(img.height()));
    loop {
        if (0..w).contains(&x0) && (0..h).contains(&y0) {
            img.put_pixel(x0 as u32, y0 as u32, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn placeholder(size: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(size, size, BACKGROUND);
    let (lo, hi) = (size / 4, 3 * size / 4);
    for y in lo..=hi.min(size.saturating_sub(1)) {
        for x in lo..=hi.min(size.saturating_sub(1)) {
            let border = x == lo || y == lo || x == hi || y == hi;
            img.put_pixel(x, y, if border { PLACEHOLDER_EDGE } else { PLACEHOLDER_FILL });
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::LightingModel;

    fn scene(mesh: Mesh) -> SceneResult {
        SceneResult { mesh, lighting: LightingModel::default(), complexity: 0.0, quality: 0.5 }
    }

    #[test]
    fn empty_mesh_gets_placeholder() {
        let img = render_preview(&scene(Mesh::empty()), 64);
        assert_eq!(img.dimensions(), (64, 64));
        assert_eq!(*img.get_pixel(32, 32), PLACEHOLDER_FILL);
        assert_eq!(*img.get_pixel(16, 16), PLACEHOLDER_EDGE);
        assert_eq!(*img.get_pixel(2, 2), BACKGROUND);
    }

    #[test]
    fn ground_quad_is_shaded_in_center() {
        // horizontal quad in X-Z, lit straight from above
        let mesh = Mesh::from_parts(
            vec![
                Point3::new(-1.0, 0.0, -1.0),
                Point3::new(1.0, 0.0, -1.0),
                Point3::new(1.0, 0.0, 1.0),
                Point3::new(-1.0, 0.0, 1.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
            Some(vec![[255, 255, 255]; 4]),
        )
        .unwrap();
        let img = render_preview(&scene(mesh), 64);
        let center = img.get_pixel(32, 32);
        assert_ne!(*center, BACKGROUND);
        assert_eq!(*img.get_pixel(1, 1), BACKGROUND);
    }

    #[test]
    fn vertical_sheet_falls_back_to_wireframe() {
        // no extent in X or Z, so nothing to shade from above
        let mesh = Mesh::from_parts(
            vec![Point3::new(0.0, 0.0, 1.0), Point3::new(0.0, 1.0, 1.0), Point3::new(0.0, 0.5, 1.0)],
            vec![[0, 1, 2]],
            None,
        )
        .unwrap();
        let img = render_preview(&scene(mesh), 32);
        assert!(img.pixels().any(|p| *p == WIRE));
    }
}
