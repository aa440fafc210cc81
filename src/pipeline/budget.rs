use crate::{scene::RenderObject, settings::ImportanceWeights};

/// Cap the object list at `max` by importance.
///
/// A no-op when the list already fits. Otherwise every object is scored,
/// the list is sorted descending and truncated; the least visually
/// significant objects are dropped silently — an explicit degradation
/// bounding per-frame work instead of letting the frame rate collapse.
/// The sort is stable, so equal scores keep input order.
pub fn limit_objects(
    mut objects: Vec<RenderObject>,
    max: usize,
    weights: &ImportanceWeights,
) -> Vec<RenderObject> {
    if objects.len() <= max {
        return objects;
    }
    objects.sort_by(|a, b| {
        importance_score(b, weights).total_cmp(&importance_score(a, weights))
    });
    objects.truncate(max);
    objects
}

/// Importance of one object: larger is kept longer under budget pressure.
pub fn importance_score(obj: &RenderObject, weights: &ImportanceWeights) -> f64 {
    f64::from(obj.z_index) * weights.z_index
        + (obj.world_area() + 1.0).ln() * weights.area
        + if obj.style.visible {
            weights.visibility
        } else {
            0.0
        }
        + obj.style.opacity * weights.opacity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ObjectKind, ObjectStyle, ObjectTransform};

    fn obj(id: &str, z: i32, size: f64, opacity: f64) -> RenderObject {
        RenderObject {
            id: id.to_string(),
            z_index: z,
            transform: ObjectTransform {
                width: size,
                height: size,
                ..ObjectTransform::default()
            },
            style: ObjectStyle {
                opacity,
                ..ObjectStyle::default()
            },
            kind: ObjectKind::Rect,
        }
    }

    #[test]
    fn length_is_min_of_input_and_max() {
        let weights = ImportanceWeights::default();
        let objects: Vec<_> = (0..10).map(|i| obj(&format!("o{i}"), i, 10.0, 1.0)).collect();
        for n in [0usize, 3, 10, 50] {
            let out = limit_objects(objects.clone(), n, &weights);
            assert_eq!(out.len(), objects.len().min(n));
        }
    }

    #[test]
    fn noop_preserves_order_when_under_budget() {
        let weights = ImportanceWeights::default();
        let objects = vec![obj("a", 3, 10.0, 1.0), obj("b", 1, 10.0, 1.0)];
        let out = limit_objects(objects.clone(), 5, &weights);
        assert_eq!(out, objects);
    }

    #[test]
    fn retained_scores_dominate_dropped_scores() {
        let weights = ImportanceWeights::default();
        let mut objects = Vec::new();
        for i in 0..30 {
            objects.push(obj(
                &format!("o{i}"),
                (i * 7 % 13) as i32,
                10.0 + (i as f64) * 3.0,
                ((i % 4) as f64) / 4.0,
            ));
        }
        let kept = limit_objects(objects.clone(), 10, &weights);
        let kept_min = kept
            .iter()
            .map(|o| importance_score(o, &weights))
            .fold(f64::INFINITY, f64::min);
        let kept_ids: Vec<&str> = kept.iter().map(|o| o.id.as_str()).collect();
        let dropped_max = objects
            .iter()
            .filter(|o| !kept_ids.contains(&o.id.as_str()))
            .map(|o| importance_score(o, &weights))
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(kept_min >= dropped_max);
    }

    #[test]
    fn score_components_pull_their_weight() {
        let weights = ImportanceWeights::default();
        let base = obj("base", 0, 10.0, 1.0);

        let higher_z = obj("z", 1, 10.0, 1.0);
        assert!(importance_score(&higher_z, &weights) > importance_score(&base, &weights));

        let bigger = obj("big", 0, 100.0, 1.0);
        assert!(importance_score(&bigger, &weights) > importance_score(&base, &weights));

        let faded = obj("faded", 0, 10.0, 0.2);
        assert!(importance_score(&faded, &weights) < importance_score(&base, &weights));
    }
}
