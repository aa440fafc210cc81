use crate::scene::{ObjectKind, PathSpec, RenderObject};

/// Substitute cheaper representations for objects at low zoom.
///
/// At or above `threshold` the input is returned unchanged. Below
/// `threshold / 2` paths and ellipses collapse to rectangles with identical
/// geometry and style; individual objects cover so few screen pixels that
/// shape fidelity is imperceptible while draw cost is not. Between the two
/// bands path curves are flattened to line segments with a tolerance that
/// coarsens as the user zooms out.
pub fn apply_lod(
    objects: Vec<RenderObject>,
    zoom: f64,
    threshold: f64,
    simplify_tolerance: f64,
) -> Vec<RenderObject> {
    if zoom >= threshold {
        return objects;
    }

    let very_low = zoom < threshold / 2.0;
    objects
        .into_iter()
        .map(|mut obj| {
            match (&obj.kind, very_low) {
                (ObjectKind::Path(_) | ObjectKind::Ellipse, true) => {
                    obj.kind = ObjectKind::Rect;
                }
                (ObjectKind::Path(spec), false) => {
                    obj.kind = ObjectKind::Path(PathSpec {
                        path: flatten_path(&spec.path, simplify_tolerance / zoom),
                    });
                }
                _ => {}
            }
            obj
        })
        .collect()
}

/// Flatten curves to line segments. Tolerance is the maximum world-space
/// deviation from the true curve.
fn flatten_path(path: &kurbo::BezPath, tolerance: f64) -> kurbo::BezPath {
    let mut out = kurbo::BezPath::new();
    kurbo::flatten(path.elements().iter().copied(), tolerance, |el| {
        out.push(el);
    });
    out
}
