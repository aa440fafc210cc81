use std::{collections::HashMap, time::Instant};

use crate::{
    error::{EaselError, EaselResult},
    render::{BackendKind, BackendOpts, BackendStats, FrameRGBA, RenderBackend, cache::RasterCache},
    resources::ResourceStore,
    scene::{Camera, Canvas, ObjectKind, RenderObject, Rgba8},
};

/// Hardware backend rendering through vello into a wgpu texture with a
/// buffer readback. Construction performs adapter/device negotiation and
/// fails with a typed error on machines without a usable GPU; the engine
/// catches that and falls back to the CPU backend.
pub struct GpuBackend {
    canvas: Canvas,
    camera: Camera,
    opts: BackendOpts,

    device: vello::wgpu::Device,
    queue: vello::wgpu::Queue,
    renderer: vello::Renderer,
    scene: vello::Scene,

    target: vello::wgpu::Texture,
    target_view: vello::wgpu::TextureView,
    readback: vello::wgpu::Buffer,
    readback_bytes_per_row: u32,

    font_cache: HashMap<String, vello::peniko::FontData>,
    image_cache: HashMap<String, vello::peniko::ImageData>,
    stats: BackendStats,
    disposed: bool,
}

impl GpuBackend {
    pub fn new(canvas: Canvas, opts: BackendOpts) -> EaselResult<Self> {
        canvas.validate()?;

        let instance = vello::wgpu::Instance::new(&vello::wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(
            &vello::wgpu::RequestAdapterOptions {
                power_preference: vello::wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .map_err(|e| match e {
            vello::wgpu::RequestAdapterError::NotFound { .. } => {
                EaselError::backend("no gpu adapter available")
            }
            other => EaselError::backend(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) =
            pollster::block_on(adapter.request_device(&vello::wgpu::DeviceDescriptor {
                label: None,
                required_features: vello::wgpu::Features::empty(),
                required_limits: vello::wgpu::Limits::default(),
                experimental_features: vello::wgpu::ExperimentalFeatures::default(),
                memory_hints: vello::wgpu::MemoryHints::Performance,
                trace: vello::wgpu::Trace::Off,
            }))
            .map_err(|e| EaselError::backend(format!("wgpu request_device failed: {e:?}")))?;

        let renderer = vello::Renderer::new(&device, vello::RendererOptions::default())
            .map_err(|e| EaselError::backend(format!("vello renderer init failed: {e:?}")))?;

        let (target, target_view, readback, readback_bytes_per_row) =
            create_surface(&device, canvas)?;

        Ok(Self {
            canvas,
            camera: Camera::default(),
            opts,
            device,
            queue,
            renderer,
            scene: vello::Scene::new(),
            target,
            target_view,
            readback,
            readback_bytes_per_row,
            font_cache: HashMap::new(),
            image_cache: HashMap::new(),
            stats: BackendStats::default(),
            disposed: false,
        })
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

fn create_surface(
    device: &vello::wgpu::Device,
    canvas: Canvas,
) -> EaselResult<(
    vello::wgpu::Texture,
    vello::wgpu::TextureView,
    vello::wgpu::Buffer,
    u32,
)> {
    let target = device.create_texture(&vello::wgpu::TextureDescriptor {
        label: Some("easel_target"),
        size: vello::wgpu::Extent3d {
            width: canvas.width,
            height: canvas.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: vello::wgpu::TextureDimension::D2,
        format: vello::wgpu::TextureFormat::Rgba8Unorm,
        usage: vello::wgpu::TextureUsages::STORAGE_BINDING
            | vello::wgpu::TextureUsages::TEXTURE_BINDING
            | vello::wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let target_view = target.create_view(&vello::wgpu::TextureViewDescriptor::default());

    let bytes_per_row_unpadded = canvas
        .width
        .checked_mul(4)
        .ok_or_else(|| EaselError::backend("render target width overflow"))?;
    let bytes_per_row = align_to(
        bytes_per_row_unpadded,
        vello::wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
    );
    let buffer_size = (bytes_per_row as u64)
        .checked_mul(canvas.height as u64)
        .ok_or_else(|| EaselError::backend("readback buffer size overflow"))?;

    let readback = device.create_buffer(&vello::wgpu::BufferDescriptor {
        label: Some("easel_readback"),
        size: buffer_size,
        usage: vello::wgpu::BufferUsages::MAP_READ | vello::wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    Ok((target, target_view, readback, bytes_per_row))
}

impl RenderBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    fn render(
        &mut self,
        objects: &[RenderObject],
        resources: &mut ResourceStore,
        _cache: Option<&mut RasterCache>,
    ) -> EaselResult<FrameRGBA> {
        if self.disposed {
            return Err(EaselError::backend("gpu backend was disposed"));
        }
        let started = Instant::now();

        self.scene.reset();
        let mut drawn = 0usize;
        let mut skipped = 0usize;
        let mut draw_calls = 0usize;
        for obj in objects {
            if encode_object(self, obj, resources, &mut draw_calls)? {
                drawn += 1;
            } else {
                skipped += 1;
                tracing::debug!(id = %obj.id, "object skipped: missing or degenerate payload");
            }
        }

        let base_color = match self.opts.clear_rgba {
            Some([r, g, b, a]) => vello::peniko::Color::from_rgba8(r, g, b, a),
            None => vello::peniko::Color::from_rgba8(0, 0, 0, 0),
        };
        self.renderer
            .render_to_texture(
                &self.device,
                &self.queue,
                &self.scene,
                &self.target_view,
                &vello::RenderParams {
                    base_color,
                    width: self.canvas.width,
                    height: self.canvas.height,
                    antialiasing_method: vello::AaConfig::Area,
                },
            )
            .map_err(|e| EaselError::render(format!("vello render failed: {e:?}")))?;

        let data = self.readback_pixels()?;

        self.stats.frames_rendered += 1;
        self.stats.objects_drawn_last_frame = drawn;
        self.stats.objects_skipped_last_frame = skipped;
        self.stats.draw_calls_last_frame = draw_calls;
        self.stats.last_frame_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data,
            premultiplied: true,
        })
    }

    fn resize(&mut self, canvas: Canvas) -> EaselResult<()> {
        canvas.validate()?;
        if canvas == self.canvas {
            return Ok(());
        }
        let (target, target_view, readback, bytes_per_row) =
            create_surface(&self.device, canvas)?;
        self.target = target;
        self.target_view = target_view;
        self.readback = readback;
        self.readback_bytes_per_row = bytes_per_row;
        self.canvas = canvas;
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }

    fn dispose(&mut self) {
        self.font_cache.clear();
        self.image_cache.clear();
        self.scene.reset();
        self.disposed = true;
    }
}

impl GpuBackend {
    fn readback_pixels(&self) -> EaselResult<Vec<u8>> {
        let mut encoder =
            self.device
                .create_command_encoder(&vello::wgpu::CommandEncoderDescriptor {
                    label: Some("easel_readback_encoder"),
                });
        encoder.copy_texture_to_buffer(
            vello::wgpu::TexelCopyTextureInfo {
                texture: &self.target,
                mip_level: 0,
                origin: vello::wgpu::Origin3d::ZERO,
                aspect: vello::wgpu::TextureAspect::All,
            },
            vello::wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: vello::wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.readback_bytes_per_row),
                    rows_per_image: Some(self.canvas.height),
                },
            },
            vello::wgpu::Extent3d {
                width: self.canvas.width,
                height: self.canvas.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = self.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(vello::wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(vello::wgpu::PollType::wait_indefinitely())
            .map_err(|e| EaselError::render(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| EaselError::render("readback channel closed"))?
            .map_err(|e| EaselError::render(format!("readback map failed: {e:?}")))?;

        let mapped = buffer_slice.get_mapped_range();
        let row_bytes = (self.canvas.width as usize) * 4;
        let padded_row_bytes = self.readback_bytes_per_row as usize;
        let mut out = Vec::with_capacity(row_bytes * self.canvas.height as usize);
        for row in 0..self.canvas.height as usize {
            let start = row * padded_row_bytes;
            out.extend_from_slice(&mapped[start..start + row_bytes]);
        }
        drop(mapped);
        self.readback.unmap();
        Ok(out)
    }

    fn font_for(&mut self, key: &str, resources: &ResourceStore) -> Option<vello::peniko::FontData> {
        if let Some(font) = self.font_cache.get(key) {
            return Some(font.clone());
        }
        let bytes = resources.font_bytes(key)?;
        let font =
            vello::peniko::FontData::new(vello::peniko::Blob::from(bytes.as_ref().clone()), 0);
        self.font_cache.insert(key.to_string(), font.clone());
        Some(font)
    }

    fn image_for(&mut self, key: &str, resources: &ResourceStore) -> Option<vello::peniko::ImageData> {
        if let Some(img) = self.image_cache.get(key) {
            return Some(img.clone());
        }
        let prepared = resources.image(key)?;
        let image = vello::peniko::ImageData {
            data: vello::peniko::Blob::from(prepared.rgba8_premul.as_ref().clone()),
            format: vello::peniko::ImageFormat::Rgba8,
            alpha_type: vello::peniko::ImageAlphaType::AlphaPremultiplied,
            width: prepared.width,
            height: prepared.height,
        };
        self.image_cache.insert(key.to_string(), image.clone());
        Some(image)
    }
}

fn clip_rect(canvas: Canvas) -> kurbo::Rect {
    kurbo::Rect::new(0.0, 0.0, f64::from(canvas.width), f64::from(canvas.height))
}

fn color_to_peniko(c: Rgba8) -> vello::peniko::Color {
    vello::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

/// Encode one object into the frame scene. Returns false when the object
/// was skipped as malformed.
fn encode_object(
    backend: &mut GpuBackend,
    obj: &RenderObject,
    resources: &mut ResourceStore,
    draw_calls: &mut usize,
) -> EaselResult<bool> {
    use vello::peniko::{BlendMode, Fill};

    let full = backend.camera.view_transform() * obj.local_to_world();
    let t = &obj.transform;
    let opacity = obj.style.opacity;
    let layered = opacity < 1.0;
    if layered {
        backend.scene.push_layer(
            Fill::NonZero,
            BlendMode::default(),
            opacity as f32,
            kurbo::Affine::IDENTITY,
            &clip_rect(backend.canvas),
        );
    }

    let drawn = match &obj.kind {
        ObjectKind::Rect => {
            let rect = kurbo::Rect::new(0.0, 0.0, t.width, t.height);
            backend
                .scene
                .fill(Fill::NonZero, full, color_to_peniko(obj.style.fill), None, &rect);
            *draw_calls += 1;
            if let Some(stroke) = &obj.style.stroke {
                backend.scene.stroke(
                    &kurbo::Stroke::new(stroke.width),
                    full,
                    color_to_peniko(stroke.color),
                    None,
                    &rect,
                );
                *draw_calls += 1;
            }
            true
        }
        ObjectKind::Ellipse => {
            let ellipse = kurbo::Ellipse::new(
                (t.width / 2.0, t.height / 2.0),
                (t.width / 2.0, t.height / 2.0),
                0.0,
            );
            backend.scene.fill(
                Fill::NonZero,
                full,
                color_to_peniko(obj.style.fill),
                None,
                &ellipse,
            );
            *draw_calls += 1;
            if let Some(stroke) = &obj.style.stroke {
                backend.scene.stroke(
                    &kurbo::Stroke::new(stroke.width),
                    full,
                    color_to_peniko(stroke.color),
                    None,
                    &ellipse,
                );
                *draw_calls += 1;
            }
            true
        }
        ObjectKind::Path(spec) => {
            if spec.path.elements().is_empty() {
                false
            } else {
                backend.scene.fill(
                    Fill::NonZero,
                    full,
                    color_to_peniko(obj.style.fill),
                    None,
                    &spec.path,
                );
                *draw_calls += 1;
                if let Some(stroke) = &obj.style.stroke {
                    backend.scene.stroke(
                        &kurbo::Stroke::new(stroke.width),
                        full,
                        color_to_peniko(stroke.color),
                        None,
                        &spec.path,
                    );
                    *draw_calls += 1;
                }
                true
            }
        }
        ObjectKind::Text(spec) => {
            match (
                resources.layout_text(spec, obj.style.fill),
                backend.font_for(&spec.font, resources),
            ) {
                (Ok(layout), Some(font)) => {
                    for line in layout.lines() {
                        for item in line.items() {
                            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item
                            else {
                                continue;
                            };
                            let brush = run.style().brush;
                            backend
                                .scene
                                .draw_glyphs(&font)
                                .transform(full)
                                .font_size(run.run().font_size())
                                .brush(color_to_peniko(brush))
                                .draw(
                                    Fill::NonZero,
                                    run.glyphs().map(|g| vello::Glyph {
                                        id: g.id,
                                        x: g.x,
                                        y: g.y,
                                    }),
                                );
                            *draw_calls += 1;
                        }
                    }
                    true
                }
                (Err(EaselError::Resource(_)), _) | (_, None) => false,
                (Err(e), _) => {
                    if layered {
                        backend.scene.pop_layer();
                    }
                    return Err(e);
                }
            }
        }
        ObjectKind::Image(spec) => match backend.image_for(&spec.source, resources) {
            Some(img) if img.width > 0 && img.height > 0 => {
                let fit = full
                    * kurbo::Affine::scale_non_uniform(
                        t.width / f64::from(img.width),
                        t.height / f64::from(img.height),
                    );
                backend.scene.draw_image(&img, fit);
                *draw_calls += 1;
                true
            }
            _ => false,
        },
    };

    if layered {
        backend.scene.pop_layer();
    }
    Ok(drawn)
}
