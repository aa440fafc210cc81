use crate::scene::{Camera, Canvas, RenderObject};

/// Drop objects that cannot intersect the padded viewport.
///
/// The viewport rectangle is computed in world space: the camera origin is
/// the world coordinate at the canvas top-left, the canvas extent scales by
/// `1/zoom`, and `padding` (world units) widens it on every side so small
/// camera moves do not pop objects in at the edges. Invisible objects are
/// rejected before any geometry test. Pure filter; relative order of
/// survivors is unchanged (z ordering happens after planning).
pub fn cull_objects(
    objects: &[RenderObject],
    camera: &Camera,
    canvas: Canvas,
    padding: f64,
) -> Vec<RenderObject> {
    let viewport = padded_viewport(camera, canvas, padding);
    objects
        .iter()
        .filter(|o| o.is_drawable() && aabb_overlaps(o.world_aabb(), viewport))
        .cloned()
        .collect()
}

/// World-space viewport rectangle expanded by `padding` on every side.
pub fn padded_viewport(camera: &Camera, canvas: Canvas, padding: f64) -> kurbo::Rect {
    kurbo::Rect::new(
        camera.x - padding,
        camera.y - padding,
        camera.x + f64::from(canvas.width) / camera.zoom + padding,
        camera.y + f64::from(canvas.height) / camera.zoom + padding,
    )
}

fn aabb_overlaps(a: kurbo::Rect, b: kurbo::Rect) -> bool {
    a.x0 <= b.x1 && a.x1 >= b.x0 && a.y0 <= b.y1 && a.y1 >= b.y0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ObjectKind, ObjectStyle, ObjectTransform};

    const CANVAS: Canvas = Canvas {
        width: 800,
        height: 600,
    };

    fn rect_at(id: &str, x: f64, y: f64) -> RenderObject {
        RenderObject {
            id: id.to_string(),
            z_index: 0,
            transform: ObjectTransform {
                position: kurbo::Point::new(x, y),
                width: 40.0,
                height: 40.0,
                ..ObjectTransform::default()
            },
            style: ObjectStyle::default(),
            kind: ObjectKind::Rect,
        }
    }

    #[test]
    fn inside_objects_survive_outside_are_dropped() {
        let objects = vec![
            rect_at("inside", 100.0, 100.0),
            rect_at("far_right", 5000.0, 100.0),
            rect_at("far_up", 100.0, -5000.0),
        ];
        let out = cull_objects(&objects, &Camera::default(), CANVAS, 100.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "inside");
    }

    #[test]
    fn padding_keeps_objects_just_off_screen() {
        // Object ends at x = -10, viewport left edge is -100 with padding.
        let objects = vec![rect_at("edge", -50.0, 100.0)];
        assert_eq!(
            cull_objects(&objects, &Camera::default(), CANVAS, 100.0).len(),
            1
        );
        assert_eq!(
            cull_objects(&objects, &Camera::default(), CANVAS, 0.0).len(),
            0
        );
    }

    #[test]
    fn zoom_widens_the_world_viewport() {
        // At zoom 0.5 the 800px canvas spans 1600 world units.
        let objects = vec![rect_at("wide", 1200.0, 100.0)];
        let zoomed_out = Camera {
            zoom: 0.5,
            ..Camera::default()
        };
        assert_eq!(cull_objects(&objects, &zoomed_out, CANVAS, 0.0).len(), 1);
        assert_eq!(
            cull_objects(&objects, &Camera::default(), CANVAS, 0.0).len(),
            0
        );
    }

    #[test]
    fn invisible_objects_are_rejected_before_geometry() {
        let mut hidden = rect_at("hidden", 100.0, 100.0);
        hidden.style.visible = false;
        let mut transparent = rect_at("transparent", 100.0, 100.0);
        transparent.style.opacity = 0.0;
        let objects = vec![hidden, transparent];
        assert!(cull_objects(&objects, &Camera::default(), CANVAS, 100.0).is_empty());
    }

    #[test]
    fn scale_extends_the_bounding_box() {
        let mut scaled = rect_at("scaled", 900.0, 100.0);
        scaled.transform.position = kurbo::Point::new(-500.0, 100.0);
        scaled.transform.scale_x = 20.0; // reaches x = 300
        let objects = vec![scaled];
        assert_eq!(
            cull_objects(&objects, &Camera::default(), CANVAS, 0.0).len(),
            1
        );
    }

    #[test]
    fn relative_order_is_preserved() {
        let objects = vec![
            rect_at("a", 0.0, 0.0),
            rect_at("b", 50.0, 0.0),
            rect_at("c", 100.0, 0.0),
        ];
        let out = cull_objects(&objects, &Camera::default(), CANVAS, 100.0);
        let ids: Vec<&str> = out.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
