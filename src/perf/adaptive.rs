use std::time::{Duration, Instant};

use crate::{
    perf::monitor::{PerfRating, PerfSummary, PerformanceIssue},
    settings::{OptimizationSettings, SettingsPatch},
};

const CEILING_SHRINK: f64 = 0.8;
const CEILING_FLOOR: usize = 100;
const LOD_THRESHOLD_GROWTH: f64 = 1.25;
const LOD_THRESHOLD_CAP: f64 = 2.0;

/// Feedback controller and sole owner of [`OptimizationSettings`].
///
/// Single-writer invariant: nothing else holds a mutable path to the
/// settings; pipeline stages consume the clone returned by `snapshot()`
/// at the start of each frame. Degradation is deliberately asymmetric:
/// one issue is enough to step down, while stepping back up requires a
/// sustained excellent window at the slower review cadence.
pub struct AdaptiveController {
    settings: OptimizationSettings,
    /// Host-configured values that `relax` walks back toward.
    baseline: OptimizationSettings,
    high_water_fps: f64,
    review_interval: Duration,
    last_review: Instant,
}

impl AdaptiveController {
    pub fn new(
        settings: OptimizationSettings,
        high_water_fps: f64,
        review_interval: Duration,
    ) -> Self {
        Self {
            baseline: settings.clone(),
            settings,
            high_water_fps,
            review_interval,
            last_review: Instant::now(),
        }
    }

    /// Clone handed to the frame pipeline; a frame never observes a
    /// half-updated settings object.
    pub fn snapshot(&self) -> OptimizationSettings {
        self.settings.clone()
    }

    pub fn settings(&self) -> &OptimizationSettings {
        &self.settings
    }

    /// Apply a host override to the effective settings and the baseline.
    pub fn update(&mut self, patch: &SettingsPatch) {
        let changed = self.settings.apply_patch(patch);
        self.baseline.apply_patch(patch);
        if changed {
            self.settings.version += 1;
            tracing::debug!(version = self.settings.version, "settings updated by host");
        }
    }

    /// Reactive path: degrade one step on the first sign of trouble.
    pub fn on_issue(&mut self, issue: &PerformanceIssue) {
        tracing::debug!(?issue, "degrading quality in response to issue");
        self.degrade();
    }

    /// Whether the slower review cadence has elapsed. Advances the clock
    /// when it returns true.
    pub fn review_due(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last_review) >= self.review_interval {
            self.last_review = now;
            true
        } else {
            false
        }
    }

    /// Periodic path: upgrade one step after a sustained excellent window,
    /// or apply the same degradation as the reactive path when the rolling
    /// rating is poor (idempotent at the floor).
    pub fn review(&mut self, summary: &PerfSummary) {
        if summary.sample_count == 0 {
            return;
        }
        match summary.rating {
            PerfRating::Excellent if summary.avg_fps >= self.high_water_fps => self.relax(),
            PerfRating::Poor | PerfRating::Critical => self.degrade(),
            _ => {}
        }
    }

    fn degrade(&mut self) {
        let before = self.settings.clone();
        let s = &mut self.settings;
        s.quality = s.quality.degraded();
        s.max_objects = (((s.max_objects as f64) * CEILING_SHRINK) as usize).max(CEILING_FLOOR);
        s.lod_threshold = (s.lod_threshold * LOD_THRESHOLD_GROWTH).min(LOD_THRESHOLD_CAP);
        if *s != before {
            s.version += 1;
            tracing::debug!(
                quality = ?s.quality,
                max_objects = s.max_objects,
                lod_threshold = s.lod_threshold,
                "quality degraded"
            );
        }
    }

    /// One step back toward the baseline, clamped so relaxation never
    /// overshoots what the host configured.
    fn relax(&mut self) {
        let before = self.settings.clone();
        let s = &mut self.settings;
        s.quality = s.quality.upgraded().min(self.baseline.quality);
        s.max_objects = (((s.max_objects as f64) / CEILING_SHRINK).round() as usize)
            .min(self.baseline.max_objects);
        s.lod_threshold =
            (s.lod_threshold / LOD_THRESHOLD_GROWTH).max(self.baseline.lod_threshold);
        if *s != before {
            s.version += 1;
            tracing::debug!(
                quality = ?s.quality,
                max_objects = s.max_objects,
                lod_threshold = s.lod_threshold,
                "quality relaxed toward baseline"
            );
        }
    }
}
