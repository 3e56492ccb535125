// obj.rs - Wavefront OBJ with the common `v x y z r g b` color extension

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{ExportError, ExportResult};
use crate::pipeline::SceneResult;

pub fn write_obj(scene: &SceneResult, path: &Path) -> ExportResult<()> {
    let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
    let mut w = BufWriter::new(file);
    write_body(scene, &mut w)
        .and_then(|()| w.flush())
        .map_err(|e| ExportError::io(path, e))
}

fn write_body(scene: &SceneResult, w: &mut impl Write) -> std::io::Result<()> {
    let mesh = &scene.mesh;
    let l = &scene.lighting;
    writeln!(w, "# memory reconstruction")?;
    writeln!(w, "# vertices {} faces {}", mesh.vertex_count(), mesh.face_count())?;
    writeln!(
        w,
        "# lighting direction {} {} {} intensity {} ambient {} shadow {}",
        l.direction.x, l.direction.y, l.direction.z, l.intensity, l.ambient, l.shadow_strength
    )?;
    writeln!(w, "# complexity {} quality {}", scene.complexity, scene.quality)?;

    match mesh.colors() {
        Some(colors) => {
            for (v, c) in mesh.vertices().iter().zip(colors) {
                let [r, g, b] = c.map(|x| f64::from(x) / 255.0);
                writeln!(w, "v {} {} {} {:.6} {:.6} {:.6}", v.x, v.y, v.z, r, g, b)?;
            }
        }
        None => {
            for v in mesh.vertices() {
                writeln!(w, "v {} {} {}", v.x, v.y, v.z)?;
            }
        }
    }
    for f in mesh.faces() {
        writeln!(w, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::LightingModel;
    use crate::mesh::Mesh;
    use nalgebra::Point3;

    #[test]
    fn colored_vertices_and_one_based_faces() {
        let mesh = Mesh::from_parts(
            vec![Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 1.0), Point3::new(0.0, 1.0, 1.0)],
            vec![[0, 1, 2]],
            Some(vec![[255, 0, 0]; 3]),
        )
        .unwrap();
        let scene = SceneResult { mesh, lighting: LightingModel::default(), complexity: 0.0, quality: 0.3 };
        let mut out = Vec::new();
        write_body(&scene, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("v 1 0 1 1.000000 0.000000 0.000000"));
        assert!(text.lines().any(|l| l == "f 1 2 3"));
        assert!(text.contains("# complexity 0 quality 0.3"));
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 3);
    }
}
