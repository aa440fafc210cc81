use crate::error::{EaselError, EaselResult};

/// Pixel dimensions of the render surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn validate(&self) -> EaselResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EaselError::validation("canvas width/height must be > 0"));
        }
        Ok(())
    }
}

/// World-space view: `(x, y)` is the world coordinate at the canvas
/// top-left corner, `zoom` is the world-to-pixel scale factor.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Camera {
    pub fn validate(&self) -> EaselResult<()> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(EaselError::validation("camera position must be finite"));
        }
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err(EaselError::validation("camera zoom must be finite and > 0"));
        }
        Ok(())
    }

    /// World-to-screen transform for this view.
    pub fn view_transform(&self) -> kurbo::Affine {
        kurbo::Affine::scale(self.zoom) * kurbo::Affine::translate((-self.x, -self.y))
    }
}

/// Straight-alpha 8-bit color. Premultiplication happens at the pixel
/// buffer boundary, never in the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl Default for Rgba8 {
    fn default() -> Self {
        Self::rgb(0, 0, 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StrokeStyle {
    pub color: Rgba8,
    pub width: f64, // world units, > 0
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ObjectStyle {
    pub fill: Rgba8,
    pub stroke: Option<StrokeStyle>,
    pub opacity: f64, // 0..1
    pub visible: bool,
}

impl Default for ObjectStyle {
    fn default() -> Self {
        Self {
            fill: Rgba8::default(),
            stroke: None,
            opacity: 1.0,
            visible: true,
        }
    }
}

/// Placement of an object on the infinite canvas. `position` is the world
/// coordinate of the object's top-left corner; local geometry spans
/// `(0..width, 0..height)` before `scale_x`/`scale_y` and `rotation`
/// (radians, about the scaled center) are applied.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ObjectTransform {
    pub position: kurbo::Point,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Default for ObjectTransform {
    fn default() -> Self {
        Self {
            position: kurbo::Point::ZERO,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextSpec {
    pub content: String,
    pub font: String, // key into the resource store
    pub size_px: f32,
    pub max_width_px: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImageSpec {
    pub source: String, // key into the resource store
}

/// Vector geometry in object-local coordinates with nominal bounds
/// `(0..width, 0..height)`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PathSpec {
    pub path: kurbo::BezPath,
}

impl PathSpec {
    pub fn from_svg(d: &str) -> EaselResult<Self> {
        let d = d.trim();
        if d.is_empty() {
            return Err(EaselError::validation("path data must be non-empty"));
        }
        let path = kurbo::BezPath::from_svg(d)
            .map_err(|e| EaselError::validation(format!("invalid path data: {e}")))?;
        Ok(Self { path })
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ObjectKind {
    Rect,
    Ellipse,
    Text(TextSpec),
    Image(ImageSpec),
    Path(PathSpec),
}

/// One drawable unit on the canvas.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderObject {
    pub id: String,
    pub z_index: i32,
    pub transform: ObjectTransform,
    pub style: ObjectStyle,
    pub kind: ObjectKind,
}

impl RenderObject {
    pub fn validate(&self) -> EaselResult<()> {
        if self.id.trim().is_empty() {
            return Err(EaselError::validation("object id must be non-empty"));
        }

        let t = &self.transform;
        for (name, v) in [
            ("width", t.width),
            ("height", t.height),
            ("scale_x", t.scale_x),
            ("scale_y", t.scale_y),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(EaselError::validation(format!(
                    "object '{}' {name} must be finite and >= 0",
                    self.id
                )));
            }
        }
        if !t.position.x.is_finite() || !t.position.y.is_finite() || !t.rotation.is_finite() {
            return Err(EaselError::validation(format!(
                "object '{}' position/rotation must be finite",
                self.id
            )));
        }

        if !self.style.opacity.is_finite()
            || self.style.opacity < 0.0
            || self.style.opacity > 1.0
        {
            return Err(EaselError::validation(format!(
                "object '{}' opacity must be within 0..=1",
                self.id
            )));
        }
        if let Some(stroke) = &self.style.stroke
            && (!stroke.width.is_finite() || stroke.width <= 0.0)
        {
            return Err(EaselError::validation(format!(
                "object '{}' stroke width must be finite and > 0",
                self.id
            )));
        }

        match &self.kind {
            ObjectKind::Rect | ObjectKind::Ellipse => {}
            ObjectKind::Text(spec) => {
                if spec.font.trim().is_empty() {
                    return Err(EaselError::validation(format!(
                        "object '{}' references an empty font key",
                        self.id
                    )));
                }
                if !spec.size_px.is_finite() || spec.size_px <= 0.0 {
                    return Err(EaselError::validation(format!(
                        "object '{}' text size_px must be finite and > 0",
                        self.id
                    )));
                }
            }
            ObjectKind::Image(spec) => {
                if spec.source.trim().is_empty() {
                    return Err(EaselError::validation(format!(
                        "object '{}' references an empty image key",
                        self.id
                    )));
                }
            }
            ObjectKind::Path(spec) => {
                if spec.path.elements().is_empty() {
                    return Err(EaselError::validation(format!(
                        "object '{}' has an empty path",
                        self.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether the object can contribute pixels at all. Objects failing
    /// this never reach a backend.
    pub fn is_drawable(&self) -> bool {
        self.style.visible && self.style.opacity > 0.0
    }

    /// Axis-aligned world bounds: position to position + size * scale.
    /// Rotation is deliberately ignored; culling trades exactness for a
    /// four-comparison test and the padding absorbs the error.
    pub fn world_aabb(&self) -> kurbo::Rect {
        let t = &self.transform;
        kurbo::Rect::new(
            t.position.x,
            t.position.y,
            t.position.x + t.width * t.scale_x,
            t.position.y + t.height * t.scale_y,
        )
    }

    /// Scaled world-space area, used for importance scoring.
    pub fn world_area(&self) -> f64 {
        let t = &self.transform;
        (t.width * t.scale_x) * (t.height * t.scale_y)
    }

    /// Local-to-world transform: translate to the scaled center, rotate,
    /// scale, then offset so local geometry spans `(0..width, 0..height)`.
    pub fn local_to_world(&self) -> kurbo::Affine {
        let t = &self.transform;
        let cx = t.position.x + t.width * t.scale_x / 2.0;
        let cy = t.position.y + t.height * t.scale_y / 2.0;
        kurbo::Affine::translate((cx, cy))
            * kurbo::Affine::rotate(t.rotation)
            * kurbo::Affine::scale_non_uniform(t.scale_x, t.scale_y)
            * kurbo::Affine::translate((-t.width / 2.0, -t.height / 2.0))
    }
}
