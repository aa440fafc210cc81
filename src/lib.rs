#![forbid(unsafe_code)]

pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod perf;
pub mod pipeline;
pub mod render;
pub mod resources;
pub mod scene;
pub mod settings;

pub use engine::{CanvasEngine, EngineOpts, PerformanceStats};
pub use error::{EaselError, EaselResult};
pub use perf::{PerfSummary, PerfThresholds, PerformanceIssue};
pub use render::{BackendKind, FrameRGBA};
pub use scene::{
    Camera, Canvas, ImageSpec, ObjectKind, ObjectStyle, ObjectTransform, PathSpec, RenderObject,
    Rgba8, StrokeStyle, TextSpec,
};
pub use settings::{ImportanceWeights, OptimizationSettings, QualityTier, SettingsPatch};
