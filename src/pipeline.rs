//! Per-frame planning: cull, level-of-detail, frame budget.
//!
//! Each stage is a pure function over an object list; `plan_frame` runs
//! them in order against one settings snapshot and returns the draw list
//! in z order.

pub mod budget;
pub mod cull;
pub mod lod;

use crate::{
    scene::{Camera, Canvas, RenderObject},
    settings::OptimizationSettings,
};

/// Object counts at each stage boundary of one planned frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineStats {
    pub total: usize,
    pub after_cull: usize,
    pub after_lod: usize,
    pub after_budget: usize,
}

/// Run the full planning pipeline for one frame.
///
/// Invisible objects never survive planning even with culling disabled.
/// The returned list is sorted by `z_index` (stable, so input order breaks
/// ties) and is what the backend draws, back to front.
#[tracing::instrument(skip_all, fields(total = objects.len(), zoom = camera.zoom))]
pub fn plan_frame(
    objects: &[RenderObject],
    camera: &Camera,
    canvas: Canvas,
    settings: &OptimizationSettings,
) -> (Vec<RenderObject>, PipelineStats) {
    let total = objects.len();

    let culled = if settings.culling_enabled {
        cull::cull_objects(objects, camera, canvas, settings.cull_padding)
    } else {
        objects.iter().filter(|o| o.is_drawable()).cloned().collect()
    };
    let after_cull = culled.len();

    let detailed = if settings.lod_enabled {
        lod::apply_lod(
            culled,
            camera.zoom,
            settings.lod_threshold,
            settings.lod_simplify_tolerance,
        )
    } else {
        culled
    };
    let after_lod = detailed.len();

    let mut planned = budget::limit_objects(detailed, settings.max_objects, &settings.importance);
    let after_budget = planned.len();

    planned.sort_by_key(|o| o.z_index);

    let stats = PipelineStats {
        total,
        after_cull,
        after_lod,
        after_budget,
    };
    tracing::debug!(?stats, "frame planned");
    (planned, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ObjectKind, ObjectStyle, ObjectTransform};

    fn rect_at(id: &str, x: f64, y: f64, z: i32) -> RenderObject {
        RenderObject {
            id: id.to_string(),
            z_index: z,
            transform: ObjectTransform {
                position: kurbo::Point::new(x, y),
                width: 50.0,
                height: 50.0,
                ..ObjectTransform::default()
            },
            style: ObjectStyle::default(),
            kind: ObjectKind::Rect,
        }
    }

    #[test]
    fn planned_frame_is_sorted_by_z() {
        let objects = vec![
            rect_at("a", 0.0, 0.0, 5),
            rect_at("b", 10.0, 0.0, -1),
            rect_at("c", 20.0, 0.0, 2),
        ];
        let settings = OptimizationSettings::default();
        let canvas = Canvas {
            width: 800,
            height: 600,
        };
        let (planned, stats) = plan_frame(&objects, &Camera::default(), canvas, &settings);
        let ids: Vec<&str> = planned.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.after_budget, 3);
    }

    #[test]
    fn culling_disabled_still_drops_invisible() {
        let mut hidden = rect_at("h", 0.0, 0.0, 0);
        hidden.style.visible = false;
        let objects = vec![rect_at("a", 0.0, 0.0, 0), hidden];
        let settings = OptimizationSettings {
            culling_enabled: false,
            ..OptimizationSettings::default()
        };
        let canvas = Canvas {
            width: 800,
            height: 600,
        };
        let (planned, _) = plan_frame(&objects, &Camera::default(), canvas, &settings);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].id, "a");
    }

    #[test]
    fn budget_applies_after_culling() {
        let mut objects = Vec::new();
        for i in 0..20 {
            objects.push(rect_at(&format!("o{i}"), (i as f64) * 10.0, 0.0, i));
        }
        let settings = OptimizationSettings {
            max_objects: 5,
            ..OptimizationSettings::default()
        };
        let canvas = Canvas {
            width: 800,
            height: 600,
        };
        let (planned, stats) = plan_frame(&objects, &Camera::default(), canvas, &settings);
        assert_eq!(planned.len(), 5);
        assert_eq!(stats.after_cull, 20);
        assert_eq!(stats.after_budget, 5);
        // Highest z scores win under equal geometry.
        assert!(planned.iter().all(|o| o.z_index >= 15));
    }
}
