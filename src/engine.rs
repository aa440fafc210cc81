//! The engine: one object owning the backend, the planning pipeline, the
//! sprite cache, the performance monitor, and the adaptive controller.
//!
//! `render` is the only hot path. Everything else (settings updates,
//! resizes, backend switches) happens between frames on the same thread.

use std::time::{Duration, Instant};

use crate::{
    error::{EaselError, EaselResult},
    perf::{
        adaptive::AdaptiveController,
        monitor::{PerfMonitor, PerfSummary, PerfThresholds, PerformanceIssue},
    },
    pipeline::{self, PipelineStats},
    render::{
        self, BackendKind, BackendOpts, BackendStats, FrameRGBA, RenderBackend,
        cache::{CacheStats, RasterCache},
    },
    resources::ResourceStore,
    scene::{Camera, Canvas, RenderObject},
    settings::{OptimizationSettings, SettingsPatch},
};

/// Construction-time knobs that are not part of the adaptive settings.
#[derive(Clone, Debug)]
pub struct EngineOpts {
    pub settings: OptimizationSettings,
    /// Background fill. `None` clears to transparent.
    pub clear_rgba: Option<[u8; 4]>,
    /// Sprite cache capacity in entries.
    pub cache_capacity: usize,
    /// Performance sample window length in frames.
    pub perf_window: usize,
    pub perf_thresholds: PerfThresholds,
    /// Cadence of issue detection.
    pub tick_interval: Duration,
    /// Cadence of the slower upgrade/downgrade review.
    pub review_interval: Duration,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            settings: OptimizationSettings::default(),
            clear_rgba: None,
            cache_capacity: 256,
            perf_window: 120,
            perf_thresholds: PerfThresholds::default(),
            tick_interval: Duration::from_secs(1),
            review_interval: Duration::from_secs(5),
        }
    }
}

/// Point-in-time diagnostic snapshot for hosts and the CLI.
#[derive(Clone, Debug, serde::Serialize)]
pub struct PerformanceStats {
    pub render_mode: BackendKind,
    pub backend: BackendStats,
    pub perf: PerfSummary,
    pub last_plan: PipelineStats,
    pub cache: CacheStats,
    pub settings_version: u64,
}

type IssueListener = Box<dyn FnMut(&PerformanceIssue)>;

pub struct CanvasEngine {
    canvas: Canvas,
    backend: Box<dyn RenderBackend>,
    opts: BackendOpts,
    /// Set after a GPU construction failure; further GPU requests are
    /// rejected instead of retried.
    gpu_failed: bool,
    controller: AdaptiveController,
    monitor: PerfMonitor,
    cache: RasterCache,
    resources: ResourceStore,
    listeners: Vec<IssueListener>,
    last_plan: PipelineStats,
    disposed: bool,
}

impl CanvasEngine {
    /// Build an engine for `canvas`. When settings prefer the GPU the
    /// hardware backend is attempted once; on failure the engine logs a
    /// warning and falls back to the CPU backend permanently.
    pub fn new(canvas: Canvas, opts: EngineOpts) -> EaselResult<Self> {
        canvas.validate()?;
        let backend_opts = BackendOpts {
            clear_rgba: opts.clear_rgba,
        };
        let mut gpu_failed = false;
        let backend = if opts.settings.prefer_gpu {
            match render::create_backend(BackendKind::Gpu, canvas, &backend_opts) {
                Ok(backend) => backend,
                Err(err) => {
                    tracing::warn!(error = %err, "gpu backend unavailable, falling back to cpu");
                    gpu_failed = true;
                    render::create_backend(BackendKind::Cpu, canvas, &backend_opts)?
                }
            }
        } else {
            render::create_backend(BackendKind::Cpu, canvas, &backend_opts)?
        };
        tracing::info!(backend = ?backend.kind(), width = canvas.width, height = canvas.height, "engine ready");

        let controller = AdaptiveController::new(
            opts.settings,
            opts.perf_thresholds.excellent_fps,
            opts.review_interval,
        );
        let monitor = PerfMonitor::new(
            canvas,
            opts.perf_window,
            opts.perf_thresholds,
            opts.tick_interval,
        );
        Ok(Self {
            canvas,
            backend,
            opts: backend_opts,
            gpu_failed,
            controller,
            monitor,
            cache: RasterCache::new(opts.cache_capacity),
            resources: ResourceStore::default(),
            listeners: Vec::new(),
            last_plan: PipelineStats::default(),
            disposed: false,
        })
    }

    /// Plan and draw one frame.
    #[tracing::instrument(skip_all, fields(objects = objects.len()))]
    pub fn render(&mut self, objects: &[RenderObject], camera: &Camera) -> EaselResult<FrameRGBA> {
        if self.disposed {
            return Err(EaselError::validation("engine has been disposed"));
        }
        camera.validate()?;
        let settings = self.controller.snapshot();

        self.monitor.frame_start();
        let (planned, plan_stats) = pipeline::plan_frame(objects, camera, self.canvas, &settings);
        self.last_plan = plan_stats;
        // Counts are measured before limiting so a sustained overrun still
        // shows up while the limiter holds the line.
        self.monitor.update_object_count(objects.len(), planned.len());

        self.monitor.render_start();
        self.backend.set_camera(*camera);
        let cache = settings.caching_enabled.then_some(&mut self.cache);
        let frame = self.backend.render(&planned, &mut self.resources, cache)?;
        self.monitor.render_end();
        self.monitor.frame_end();

        let now = Instant::now();
        if self.monitor.tick_due(now) {
            for issue in self.monitor.tick(settings.max_objects) {
                self.controller.on_issue(&issue);
                for listener in &mut self.listeners {
                    listener(&issue);
                }
            }
        }
        if self.controller.review_due(now) {
            self.controller.review(&self.monitor.summary());
        }
        Ok(frame)
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn render_mode(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Resize the target surface. In-flight caches survive; sprite
    /// resolution keys on zoom, not canvas size.
    pub fn update_canvas_size(&mut self, canvas: Canvas) -> EaselResult<()> {
        canvas.validate()?;
        self.backend.resize(canvas)?;
        self.canvas = canvas;
        self.monitor.update_canvas_size(canvas);
        Ok(())
    }

    /// Switch backends with a hard cut: the old backend is disposed and the
    /// next frame comes from the new one. A GPU request after a recorded
    /// GPU failure is rejected and the current mode is retained.
    pub fn set_render_mode(&mut self, kind: BackendKind) -> EaselResult<()> {
        if self.disposed {
            return Err(EaselError::validation("engine has been disposed"));
        }
        if kind == self.backend.kind() {
            return Ok(());
        }
        if kind == BackendKind::Gpu && self.gpu_failed {
            tracing::warn!("gpu backend previously failed; staying on cpu");
            return Err(EaselError::backend(
                "gpu backend unavailable (previous initialization failed)",
            ));
        }
        let next = render::create_backend(kind, self.canvas, &self.opts)?;
        self.backend.dispose();
        self.backend = next;
        tracing::info!(backend = ?kind, "render mode switched");
        Ok(())
    }

    /// Apply a host settings override; takes effect from the next frame.
    pub fn update_settings(&mut self, patch: &SettingsPatch) {
        self.controller.update(patch);
    }

    pub fn settings(&self) -> &OptimizationSettings {
        self.controller.settings()
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        PerformanceStats {
            render_mode: self.backend.kind(),
            backend: self.backend.stats(),
            perf: self.monitor.summary(),
            last_plan: self.last_plan,
            cache: self.cache.stats(),
            settings_version: self.controller.settings().version,
        }
    }

    /// Register a callback invoked once per detected issue, after the
    /// adaptive controller has reacted to it.
    pub fn on_performance_issue(&mut self, listener: impl FnMut(&PerformanceIssue) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn resources_mut(&mut self) -> &mut ResourceStore {
        &mut self.resources
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Release the backend and caches. Idempotent; `render` afterwards
    /// returns a validation error.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.backend.dispose();
        self.cache.clear();
        self.listeners.clear();
        self.disposed = true;
        tracing::debug!("engine disposed");
    }
}

impl Drop for CanvasEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ObjectKind, ObjectStyle, ObjectTransform};

    fn canvas() -> Canvas {
        Canvas {
            width: 64,
            height: 64,
        }
    }

    fn cpu_opts() -> EngineOpts {
        EngineOpts {
            settings: OptimizationSettings {
                prefer_gpu: false,
                ..OptimizationSettings::default()
            },
            ..EngineOpts::default()
        }
    }

    fn rect(id: &str) -> RenderObject {
        RenderObject {
            id: id.to_string(),
            z_index: 0,
            transform: ObjectTransform {
                position: kurbo::Point::new(8.0, 8.0),
                width: 16.0,
                height: 16.0,
                ..ObjectTransform::default()
            },
            style: ObjectStyle::default(),
            kind: ObjectKind::Rect,
        }
    }

    #[test]
    fn renders_a_frame_on_cpu() {
        let mut engine = CanvasEngine::new(canvas(), cpu_opts()).unwrap();
        let frame = engine.render(&[rect("a")], &Camera::default()).unwrap();
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 64);
        assert_eq!(engine.render_mode(), BackendKind::Cpu);
    }

    #[test]
    fn dispose_is_idempotent_and_blocks_render() {
        let mut engine = CanvasEngine::new(canvas(), cpu_opts()).unwrap();
        engine.dispose();
        engine.dispose();
        let err = engine.render(&[], &Camera::default()).unwrap_err();
        assert!(matches!(err, EaselError::Validation(_)));
    }

    #[test]
    fn invalid_camera_is_rejected() {
        let mut engine = CanvasEngine::new(canvas(), cpu_opts()).unwrap();
        let camera = Camera {
            zoom: 0.0,
            ..Camera::default()
        };
        assert!(engine.render(&[], &camera).is_err());
    }

    #[test]
    fn resize_changes_frame_dimensions() {
        let mut engine = CanvasEngine::new(canvas(), cpu_opts()).unwrap();
        engine
            .update_canvas_size(Canvas {
                width: 32,
                height: 48,
            })
            .unwrap();
        let frame = engine.render(&[], &Camera::default()).unwrap();
        assert_eq!((frame.width, frame.height), (32, 48));
    }

    #[test]
    fn settings_patch_takes_effect_next_frame() {
        let mut engine = CanvasEngine::new(canvas(), cpu_opts()).unwrap();
        let v0 = engine.settings().version;
        engine.update_settings(&SettingsPatch {
            max_objects: Some(3),
            ..SettingsPatch::default()
        });
        assert!(engine.settings().version > v0);

        let objects: Vec<RenderObject> = (0..10).map(|i| rect(&format!("o{i}"))).collect();
        engine.render(&objects, &Camera::default()).unwrap();
        assert_eq!(engine.performance_stats().last_plan.after_budget, 3);
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_mode_without_feature_keeps_cpu() {
        let mut engine = CanvasEngine::new(canvas(), cpu_opts()).unwrap();
        assert!(engine.set_render_mode(BackendKind::Gpu).is_err());
        assert_eq!(engine.render_mode(), BackendKind::Cpu);
        engine.render(&[rect("a")], &Camera::default()).unwrap();
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn prefer_gpu_without_feature_falls_back() {
        let opts = EngineOpts {
            settings: OptimizationSettings {
                prefer_gpu: true,
                ..OptimizationSettings::default()
            },
            ..EngineOpts::default()
        };
        let engine = CanvasEngine::new(canvas(), opts).unwrap();
        assert_eq!(engine.render_mode(), BackendKind::Cpu);
    }

    #[test]
    fn performance_stats_reflect_rendered_frames() {
        let mut engine = CanvasEngine::new(canvas(), cpu_opts()).unwrap();
        engine.render(&[rect("a")], &Camera::default()).unwrap();
        engine.render(&[rect("a")], &Camera::default()).unwrap();
        let stats = engine.performance_stats();
        assert_eq!(stats.backend.frames_rendered, 2);
        assert_eq!(stats.render_mode, BackendKind::Cpu);
        assert_eq!(stats.perf.sample_count, 2);
    }
}
