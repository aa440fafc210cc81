//! Backend abstraction: one rendering interface, two implementations.
//!
//! The CPU backend (`vello_cpu`) is always available. The GPU backend
//! (`vello` over wgpu) is behind the `gpu` feature and its construction
//! can fail; the factory surfaces that as a typed error so the engine can
//! fall back instead of crashing.

pub mod cache;
pub mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;

use crate::{
    error::{EaselError, EaselResult},
    render::cache::RasterCache,
    resources::ResourceStore,
    scene::{Camera, Canvas, RenderObject},
};

/// One rendered frame: row-major RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cpu,
    Gpu,
}

#[derive(Clone, Debug, Default)]
pub struct BackendOpts {
    /// Background fill. `None` clears to transparent.
    pub clear_rgba: Option<[u8; 4]>,
}

/// Counters a backend maintains across its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize)]
pub struct BackendStats {
    pub frames_rendered: u64,
    pub objects_drawn_last_frame: usize,
    /// Malformed objects (missing resources, degenerate geometry) skipped
    /// without aborting the frame.
    pub objects_skipped_last_frame: usize,
    pub draw_calls_last_frame: usize,
    pub last_frame_ms: f64,
}

pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    fn set_camera(&mut self, camera: Camera);

    /// Draw the planned object list, back to front. A malformed object is
    /// skipped and counted; only surface-level failures abort the frame.
    /// `cache` is `None` when sprite caching is disabled in settings.
    fn render(
        &mut self,
        objects: &[RenderObject],
        resources: &mut ResourceStore,
        cache: Option<&mut RasterCache>,
    ) -> EaselResult<FrameRGBA>;

    fn resize(&mut self, canvas: Canvas) -> EaselResult<()>;

    fn stats(&self) -> BackendStats;

    /// Tear down the backend. Idempotent; rendering afterwards is an error.
    fn dispose(&mut self);
}

/// Construct a backend for `canvas`. GPU construction performs adapter and
/// device negotiation and is the single point where hardware absence
/// surfaces as an `Err`.
pub fn create_backend(
    kind: BackendKind,
    canvas: Canvas,
    opts: &BackendOpts,
) -> EaselResult<Box<dyn RenderBackend>> {
    canvas.validate()?;
    match kind {
        BackendKind::Cpu => Ok(Box::new(cpu::CpuBackend::new(canvas, opts.clone())?)),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Box::new(gpu::GpuBackend::new(canvas, opts.clone())?)),
        #[cfg(not(feature = "gpu"))]
        BackendKind::Gpu => Err(EaselError::backend(
            "gpu backend is not available in this build (enable the `gpu` feature)",
        )),
    }
}
