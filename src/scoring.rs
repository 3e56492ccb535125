// scoring.rs - Scene complexity and quality scalars

use crate::analysis::{ImageAnalysis, NEUTRAL_QUALITY};
use crate::mesh::Mesh;

const VERTEX_SATURATION: f64 = 50_000.0;
const FACE_SATURATION: f64 = 100_000.0;

/// Mean of the saturated vertex and face counts, in [0, 1].
pub fn complexity(mesh: &Mesh) -> f64 {
    let v = (mesh.vertex_count() as f64 / VERTEX_SATURATION).min(1.0);
    let f = (mesh.face_count() as f64 / FACE_SATURATION).min(1.0);
    (v + f) / 2.0
}

/// `min(1, 0.6 q + 0.4 complexity)`, in [0, 1].
pub fn quality(complexity: f64, analysis: &ImageAnalysis) -> f64 {
    let q = analysis.quality_score();
    let q = if q.is_finite() { q.clamp(0.0, 1.0) } else { NEUTRAL_QUALITY };
    let c = if complexity.is_finite() { complexity.clamp(0.0, 1.0) } else { 0.0 };
    (0.6 * q + 0.4 * c).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::QualityMetrics;
    use crate::mesh::MeshBuilder;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use proptest::prelude::*;

    fn with_quality(q: f64) -> ImageAnalysis {
        ImageAnalysis {
            quality: Some(QualityMetrics {
                sharpness: 0.0,
                brightness: 0.0,
                contrast: 0.0,
                noise_level: 0.0,
                quality_score: q,
            }),
            ..ImageAnalysis::default()
        }
    }

    #[test]
    fn empty_mesh_has_zero_complexity() {
        assert_relative_eq!(complexity(&Mesh::empty()), 0.0);
    }

    #[test]
    fn complexity_saturates() {
        let mut b = MeshBuilder::new(false);
        for i in 0..60_000 {
            b.vertex(Point3::new(f64::from(i), 0.0, 0.0), None);
        }
        let m = b.build();
        assert_relative_eq!(complexity(&m), 0.5);
    }

    #[test]
    fn quality_uses_neutral_default() {
        assert_relative_eq!(quality(0.5, &ImageAnalysis::default()), 0.5);
        assert_relative_eq!(quality(0.0, &with_quality(f64::NAN)), 0.3);
    }

    proptest! {
        #[test]
        fn scores_stay_in_unit_range(q in -10.0f64..10.0, c in -10.0f64..10.0) {
            let s = quality(c, &with_quality(q));
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
