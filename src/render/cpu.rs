use std::{collections::HashMap, sync::Arc, time::Instant};

use kurbo::Shape as _;

use crate::{
    error::{EaselError, EaselResult},
    fingerprint::fingerprint_object,
    render::{
        BackendKind, BackendOpts, BackendStats, FrameRGBA, RenderBackend,
        cache::{CachedRaster, RasterCache, RasterKey},
    },
    resources::{PreparedImage, ResourceStore},
    scene::{Camera, Canvas, ObjectKind, ObjectStyle, PathSpec, RenderObject},
};

/// Sprites larger than this per side are drawn directly instead of cached;
/// vello_cpu pixmaps are u16-sized and huge sprites defeat the cache anyway.
const MAX_SPRITE_SIDE: u32 = 2048;

/// Software backend rasterizing into a `vello_cpu` pixmap. Always
/// available; the permanent fallback when hardware is absent.
pub struct CpuBackend {
    canvas: Canvas,
    camera: Camera,
    opts: BackendOpts,
    font_cache: HashMap<String, vello_cpu::peniko::FontData>,
    image_cache: HashMap<String, vello_cpu::Image>,
    stats: BackendStats,
    disposed: bool,
}

impl CpuBackend {
    pub fn new(canvas: Canvas, opts: BackendOpts) -> EaselResult<Self> {
        canvas_to_u16(canvas)?;
        Ok(Self {
            canvas,
            camera: Camera::default(),
            opts,
            font_cache: HashMap::new(),
            image_cache: HashMap::new(),
            stats: BackendStats::default(),
            disposed: false,
        })
    }
}

impl RenderBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    fn render(
        &mut self,
        objects: &[RenderObject],
        resources: &mut ResourceStore,
        mut cache: Option<&mut RasterCache>,
    ) -> EaselResult<FrameRGBA> {
        if self.disposed {
            return Err(EaselError::backend("cpu backend was disposed"));
        }
        let started = Instant::now();
        let (w16, h16) = canvas_to_u16(self.canvas)?;

        let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
        let clear = self
            .opts
            .clear_rgba
            .map(|[r, g, b, a]| premul_rgba8(r, g, b, a))
            .unwrap_or([0, 0, 0, 0]);
        clear_pixmap(&mut pixmap, clear);

        let mut ctx = vello_cpu::RenderContext::new(w16, h16);
        let mut frame = FrameCounters::default();
        for obj in objects {
            match draw_object(self, &mut ctx, obj, resources, cache.as_deref_mut(), &mut frame) {
                Ok(true) => frame.drawn += 1,
                Ok(false) => {
                    frame.skipped += 1;
                    tracing::debug!(id = %obj.id, "object skipped: missing or degenerate payload");
                }
                Err(e) => return Err(e),
            }
        }
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);

        self.stats.frames_rendered += 1;
        self.stats.objects_drawn_last_frame = frame.drawn;
        self.stats.objects_skipped_last_frame = frame.skipped;
        self.stats.draw_calls_last_frame = frame.draw_calls;
        self.stats.last_frame_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }

    fn resize(&mut self, canvas: Canvas) -> EaselResult<()> {
        canvas.validate()?;
        canvas_to_u16(canvas)?;
        self.canvas = canvas;
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }

    fn dispose(&mut self) {
        self.font_cache.clear();
        self.image_cache.clear();
        self.disposed = true;
    }
}

#[derive(Default)]
struct FrameCounters {
    drawn: usize,
    skipped: usize,
    draw_calls: usize,
}

/// Draw one object. `Ok(false)` means the object was malformed for this
/// frame (missing resource, degenerate geometry) and was skipped.
fn draw_object(
    backend: &mut CpuBackend,
    ctx: &mut vello_cpu::RenderContext,
    obj: &RenderObject,
    resources: &mut ResourceStore,
    cache: Option<&mut RasterCache>,
    frame: &mut FrameCounters,
) -> EaselResult<bool> {
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    let full = backend.camera.view_transform() * obj.local_to_world();
    let t = &obj.transform;
    let opacity = obj.style.opacity;

    match &obj.kind {
        ObjectKind::Rect => {
            ctx.set_transform(affine_to_cpu(full));
            let rect = kurbo::Rect::new(0.0, 0.0, t.width, t.height);
            with_opacity(ctx, opacity, |ctx| {
                ctx.set_paint(color_to_cpu(obj.style.fill));
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, t.width, t.height));
                frame.draw_calls += 1;
                if let Some(stroke) = &obj.style.stroke {
                    ctx.set_paint(color_to_cpu(stroke.color));
                    ctx.fill_path(&bezpath_to_cpu(&stroke_outline(
                        &rect.to_path(0.1),
                        stroke.width,
                    )));
                    frame.draw_calls += 1;
                }
            });
            Ok(true)
        }
        ObjectKind::Ellipse => {
            ctx.set_transform(affine_to_cpu(full));
            let ellipse = kurbo::Ellipse::new(
                (t.width / 2.0, t.height / 2.0),
                (t.width / 2.0, t.height / 2.0),
                0.0,
            );
            let path = ellipse.to_path(0.1);
            with_opacity(ctx, opacity, |ctx| {
                ctx.set_paint(color_to_cpu(obj.style.fill));
                ctx.fill_path(&bezpath_to_cpu(&path));
                frame.draw_calls += 1;
                if let Some(stroke) = &obj.style.stroke {
                    ctx.set_paint(color_to_cpu(stroke.color));
                    ctx.fill_path(&bezpath_to_cpu(&stroke_outline(&path, stroke.width)));
                    frame.draw_calls += 1;
                }
            });
            Ok(true)
        }
        ObjectKind::Path(spec) => {
            if spec.path.elements().is_empty() {
                return Ok(false);
            }
            if let Some(cache) = cache
                && let Some(sprite) = path_sprite(backend, obj, spec, cache)?
            {
                blit_sprite(backend, ctx, obj, &sprite, frame)?;
                return Ok(true);
            }
            ctx.set_transform(affine_to_cpu(full));
            with_opacity(ctx, opacity, |ctx| {
                fill_path_with_style(ctx, &spec.path, &obj.style, frame);
            });
            Ok(true)
        }
        ObjectKind::Text(spec) => {
            let layout = match resources.layout_text(spec, obj.style.fill) {
                Ok(layout) => layout,
                Err(EaselError::Resource(_)) => return Ok(false),
                Err(e) => return Err(e),
            };
            let font = match backend.font_for(&spec.font, resources) {
                Some(font) => font,
                None => return Ok(false),
            };
            ctx.set_transform(affine_to_cpu(full));
            with_opacity(ctx, opacity, |ctx| {
                for line in layout.lines() {
                    for item in line.items() {
                        let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                            continue;
                        };
                        let brush = run.style().brush;
                        ctx.set_paint(color_to_cpu(brush));
                        let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                            id: g.id,
                            x: g.x,
                            y: g.y,
                        });
                        ctx.glyph_run(&font)
                            .font_size(run.run().font_size())
                            .fill_glyphs(glyphs);
                        frame.draw_calls += 1;
                    }
                }
            });
            Ok(true)
        }
        ObjectKind::Image(spec) => {
            let Some(paint) = backend.image_paint_for(&spec.source, resources)? else {
                return Ok(false);
            };
            let (img_w, img_h) = image_paint_size(&paint)?;
            if img_w <= 0.0 || img_h <= 0.0 {
                return Ok(false);
            }
            // Map the image's natural size onto the object's local rect.
            let fit = full * kurbo::Affine::scale_non_uniform(t.width / img_w, t.height / img_h);
            ctx.set_transform(affine_to_cpu(fit));
            with_opacity(ctx, opacity, |ctx| {
                ctx.set_paint(paint);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, img_w, img_h));
                frame.draw_calls += 1;
            });
            Ok(true)
        }
    }
}

fn with_opacity(
    ctx: &mut vello_cpu::RenderContext,
    opacity: f64,
    f: impl FnOnce(&mut vello_cpu::RenderContext),
) {
    let layered = opacity < 1.0;
    if layered {
        ctx.push_opacity_layer(opacity as f32);
    }
    f(ctx);
    if layered {
        ctx.pop_layer();
    }
}

fn fill_path_with_style(
    ctx: &mut vello_cpu::RenderContext,
    path: &kurbo::BezPath,
    style: &ObjectStyle,
    frame: &mut FrameCounters,
) {
    ctx.set_paint(color_to_cpu(style.fill));
    ctx.fill_path(&bezpath_to_cpu(path));
    frame.draw_calls += 1;
    if let Some(stroke) = &style.stroke {
        ctx.set_paint(color_to_cpu(stroke.color));
        ctx.fill_path(&bezpath_to_cpu(&stroke_outline(path, stroke.width)));
        frame.draw_calls += 1;
    }
}

/// Expand a stroke to its fill outline; the raster context is fill-only.
fn stroke_outline(path: &kurbo::BezPath, width: f64) -> kurbo::BezPath {
    kurbo::stroke(
        path.elements().iter().copied(),
        &kurbo::Stroke::new(width),
        &kurbo::StrokeOpts::default(),
        0.25,
    )
}

/// Rasterize-once path sprites: at the current zoom the path is rendered
/// to an offscreen pixmap keyed by content fingerprint and pixel size,
/// then blitted as an image on this and subsequent frames.
fn path_sprite(
    backend: &CpuBackend,
    obj: &RenderObject,
    spec: &PathSpec,
    cache: &mut RasterCache,
) -> EaselResult<Option<CachedRaster>> {
    let t = &obj.transform;
    let sx = t.scale_x * backend.camera.zoom;
    let sy = t.scale_y * backend.camera.zoom;
    let sprite_w = (t.width * sx).ceil() as u32;
    let sprite_h = (t.height * sy).ceil() as u32;
    if sprite_w == 0
        || sprite_h == 0
        || sprite_w > MAX_SPRITE_SIDE
        || sprite_h > MAX_SPRITE_SIDE
    {
        return Ok(None);
    }

    let key = RasterKey {
        fingerprint: fingerprint_object(obj),
        width: sprite_w,
        height: sprite_h,
    };
    if let Some(raster) = cache.get(&key) {
        return Ok(Some(raster));
    }

    let w16 = sprite_w as u16;
    let h16 = sprite_h as u16;
    let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
    let mut ctx = vello_cpu::RenderContext::new(w16, h16);
    ctx.set_transform(affine_to_cpu(kurbo::Affine::scale_non_uniform(sx, sy)));
    let mut counters = FrameCounters::default();
    // Opacity is applied at blit time so the sprite stays reusable-shaped.
    fill_path_with_style(&mut ctx, &spec.path, &obj.style, &mut counters);
    ctx.flush();
    ctx.render_to_pixmap(&mut pixmap);

    let raster = CachedRaster {
        width: sprite_w,
        height: sprite_h,
        rgba8_premul: Arc::new(pixmap.data_as_u8_slice().to_vec()),
    };
    cache.put(key, raster.clone());
    Ok(Some(raster))
}

fn blit_sprite(
    backend: &CpuBackend,
    ctx: &mut vello_cpu::RenderContext,
    obj: &RenderObject,
    sprite: &CachedRaster,
    frame: &mut FrameCounters,
) -> EaselResult<()> {
    let t = &obj.transform;
    let world_center = kurbo::Point::new(
        t.position.x + t.width * t.scale_x / 2.0,
        t.position.y + t.height * t.scale_y / 2.0,
    );
    let screen_center = backend.camera.view_transform() * world_center;
    // The sprite is already zoom-scaled; position it in screen space.
    let place = kurbo::Affine::translate(screen_center.to_vec2())
        * kurbo::Affine::rotate(t.rotation)
        * kurbo::Affine::translate((
            -f64::from(sprite.width) / 2.0,
            -f64::from(sprite.height) / 2.0,
        ));

    let pixmap = premul_bytes_to_pixmap(&sprite.rgba8_premul, sprite.width, sprite.height)?;
    let paint = vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    };

    ctx.set_transform(affine_to_cpu(place));
    with_opacity(ctx, obj.style.opacity, |ctx| {
        ctx.set_paint(paint);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(sprite.width),
            f64::from(sprite.height),
        ));
        frame.draw_calls += 1;
    });
    Ok(())
}

impl CpuBackend {
    fn font_for(
        &mut self,
        key: &str,
        resources: &ResourceStore,
    ) -> Option<vello_cpu::peniko::FontData> {
        if let Some(font) = self.font_cache.get(key) {
            return Some(font.clone());
        }
        let bytes = resources.font_bytes(key)?;
        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(bytes.as_ref().clone()),
            0,
        );
        self.font_cache.insert(key.to_string(), font.clone());
        Some(font)
    }

    fn image_paint_for(
        &mut self,
        key: &str,
        resources: &ResourceStore,
    ) -> EaselResult<Option<vello_cpu::Image>> {
        if let Some(paint) = self.image_cache.get(key) {
            return Ok(Some(paint.clone()));
        }
        let Some(img) = resources.image(key) else {
            return Ok(None);
        };
        let paint = image_to_paint(img)?;
        self.image_cache.insert(key.to_string(), paint.clone());
        Ok(Some(paint))
    }
}

fn image_to_paint(img: &PreparedImage) -> EaselResult<vello_cpu::Image> {
    let pixmap = premul_bytes_to_pixmap(&img.rgba8_premul, img.width, img.height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

fn premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> EaselResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| EaselError::render("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| EaselError::render("image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(EaselError::render("image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

fn image_paint_size(image: &vello_cpu::Image) -> EaselResult<(f64, f64)> {
    match &image.image {
        vello_cpu::ImageSource::Pixmap(p) => Ok((f64::from(p.width()), f64::from(p.height()))),
        vello_cpu::ImageSource::OpaqueId(_) => Err(EaselError::render(
            "cpu backend does not support opaque image ids",
        )),
    }
}

fn canvas_to_u16(canvas: Canvas) -> EaselResult<(u16, u16)> {
    let w: u16 = canvas
        .width
        .try_into()
        .map_err(|_| EaselError::backend("canvas width exceeds u16"))?;
    let h: u16 = canvas
        .height
        .try_into()
        .map_err(|_| EaselError::backend("canvas height exceeds u16"))?;
    Ok((w, h))
}

fn premul_rgba8(r: u8, g: u8, b: u8, a: u8) -> [u8; 4] {
    let af = (a as u16) + 1;
    let premul = |c: u8| -> u8 { (((c as u16) * af) >> 8) as u8 };
    [premul(r), premul(g), premul(b), a]
}

fn clear_pixmap(pixmap: &mut vello_cpu::Pixmap, rgba: [u8; 4]) {
    let data = pixmap.data_as_u8_slice_mut();
    for px in data.chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}

fn affine_to_cpu(a: kurbo::Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: kurbo::Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn color_to_cpu(c: crate::scene::Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ObjectTransform, Rgba8};

    fn canvas() -> Canvas {
        Canvas {
            width: 64,
            height: 64,
        }
    }

    fn red_rect(id: &str) -> RenderObject {
        RenderObject {
            id: id.to_string(),
            z_index: 0,
            transform: ObjectTransform {
                position: kurbo::Point::new(8.0, 8.0),
                width: 48.0,
                height: 48.0,
                ..ObjectTransform::default()
            },
            style: ObjectStyle {
                fill: Rgba8::rgb(255, 0, 0),
                ..ObjectStyle::default()
            },
            kind: ObjectKind::Rect,
        }
    }

    fn render_one(obj: RenderObject) -> FrameRGBA {
        let mut backend = CpuBackend::new(canvas(), BackendOpts::default()).unwrap();
        let mut resources = ResourceStore::new();
        let mut cache = RasterCache::default();
        backend.set_camera(Camera::default());
        backend
            .render(&[obj], &mut resources, Some(&mut cache))
            .unwrap()
    }

    fn pixel(frame: &FrameRGBA, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * frame.width + x) * 4) as usize;
        [
            frame.data[i],
            frame.data[i + 1],
            frame.data[i + 2],
            frame.data[i + 3],
        ]
    }

    #[test]
    fn rect_fills_its_pixels() {
        let frame = render_one(red_rect("r0"));
        assert_eq!(frame.width, 64);
        let center = pixel(&frame, 32, 32);
        assert_eq!(center, [255, 0, 0, 255]);
        let corner = pixel(&frame, 1, 1);
        assert_eq!(corner, [0, 0, 0, 0]);
    }

    #[test]
    fn missing_image_resource_skips_not_fails() {
        let mut obj = red_rect("i0");
        obj.kind = ObjectKind::Image(crate::scene::ImageSpec {
            source: "missing".to_string(),
        });
        let mut backend = CpuBackend::new(canvas(), BackendOpts::default()).unwrap();
        let mut resources = ResourceStore::new();
        let mut cache = RasterCache::default();
        backend.render(&[obj], &mut resources, Some(&mut cache)).unwrap();
        let stats = backend.stats();
        assert_eq!(stats.objects_skipped_last_frame, 1);
        assert_eq!(stats.objects_drawn_last_frame, 0);
    }

    #[test]
    fn path_sprite_round_trips_through_cache() {
        let mut obj = red_rect("p0");
        obj.kind = ObjectKind::Path(PathSpec::from_svg("M0,0 L48,0 L48,48 L0,48 Z").unwrap());
        let mut backend = CpuBackend::new(canvas(), BackendOpts::default()).unwrap();
        let mut resources = ResourceStore::new();
        let mut cache = RasterCache::default();
        backend.set_camera(Camera::default());

        backend
            .render(std::slice::from_ref(&obj), &mut resources, Some(&mut cache))
            .unwrap();
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.stats().hits, 0);

        let frame = backend
            .render(std::slice::from_ref(&obj), &mut resources, Some(&mut cache))
            .unwrap();
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(pixel(&frame, 32, 32), [255, 0, 0, 255]);
    }

    #[test]
    fn dispose_is_idempotent_and_fails_later_renders() {
        let mut backend = CpuBackend::new(canvas(), BackendOpts::default()).unwrap();
        backend.dispose();
        backend.dispose();
        let mut resources = ResourceStore::new();
        let mut cache = RasterCache::default();
        assert!(backend.render(&[], &mut resources, Some(&mut cache)).is_err());
    }

    #[test]
    fn clear_color_fills_background() {
        let mut backend = CpuBackend::new(
            canvas(),
            BackendOpts {
                clear_rgba: Some([10, 20, 30, 255]),
            },
        )
        .unwrap();
        let mut resources = ResourceStore::new();
        let mut cache = RasterCache::default();
        let frame = backend.render(&[], &mut resources, Some(&mut cache)).unwrap();
        assert_eq!(pixel(&frame, 0, 0), [10, 20, 30, 255]);
    }
}
