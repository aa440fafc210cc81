use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use crate::scene::Canvas;

/// One frame's measurement. Retained only inside the monitor's bounded
/// window, long enough to compute rolling aggregates.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct PerformanceSample {
    pub frame_ms: f64,
    pub render_ms: f64,
    pub total_objects: usize,
    pub visible_objects: usize,
    pub canvas: Canvas,
}

/// A discrete performance problem, produced by a monitor tick and consumed
/// once by the adaptive controller and any host listeners.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerformanceIssue {
    LowFps { avg_fps: f64 },
    HighRenderTime { avg_render_ms: f64, budget_ms: f64 },
    HighObjectCount { avg_total: f64, ceiling: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerfRating {
    Excellent,
    Good,
    Poor,
    Critical,
}

/// Rolling aggregate over the sample window.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct PerfSummary {
    pub avg_fps: f64,
    pub avg_frame_ms: f64,
    pub avg_render_ms: f64,
    pub avg_total_objects: f64,
    pub avg_visible_objects: f64,
    pub sample_count: usize,
    pub rating: PerfRating,
}

/// Threshold policy for issue detection and the qualitative rating.
/// Defaults are tunable, not load-bearing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerfThresholds {
    /// Below this average fps a `LowFps` issue fires (~30 fps).
    pub min_fps: f64,
    /// Above this average backend time a `HighRenderTime` issue fires.
    pub render_budget_ms: f64,
    /// At or above this average fps (with render under budget) the rating
    /// is `Excellent`; also the controller's upgrade high-water mark.
    pub excellent_fps: f64,
    /// Below this average fps the rating drops from `Poor` to `Critical`.
    pub poor_fps: f64,
    /// Minimum samples before a tick may emit issues.
    pub min_samples: usize,
}

impl Default for PerfThresholds {
    fn default() -> Self {
        Self {
            min_fps: 30.0,
            render_budget_ms: 16.0,
            excellent_fps: 55.0,
            poor_fps: 20.0,
            min_samples: 10,
        }
    }
}

#[derive(Default)]
struct PendingSample {
    frame_started: Option<Instant>,
    render_started: Option<Instant>,
    render_ms: f64,
    total_objects: usize,
    visible_objects: usize,
}

/// Frame timing monitor. Bracket calls are expected in strict start/end
/// pairs per frame; a mismatched pair spoils only that sample.
pub struct PerfMonitor {
    window: VecDeque<PerformanceSample>,
    window_cap: usize,
    thresholds: PerfThresholds,
    pending: PendingSample,
    canvas: Canvas,
    tick_interval: Duration,
    last_tick: Instant,
}

impl PerfMonitor {
    pub fn new(
        canvas: Canvas,
        window_cap: usize,
        thresholds: PerfThresholds,
        tick_interval: Duration,
    ) -> Self {
        Self {
            window: VecDeque::with_capacity(window_cap),
            window_cap: window_cap.max(1),
            thresholds,
            pending: PendingSample::default(),
            canvas,
            tick_interval,
            last_tick: Instant::now(),
        }
    }

    pub fn thresholds(&self) -> PerfThresholds {
        self.thresholds
    }

    pub fn frame_start(&mut self) {
        if self.pending.frame_started.is_some() {
            tracing::debug!("frame_start without frame_end; previous sample dropped");
        }
        self.pending = PendingSample {
            frame_started: Some(Instant::now()),
            ..PendingSample::default()
        };
    }

    pub fn frame_end(&mut self) {
        let Some(started) = self.pending.frame_started.take() else {
            tracing::debug!("frame_end without frame_start; sample dropped");
            self.pending = PendingSample::default();
            return;
        };
        let sample = PerformanceSample {
            frame_ms: started.elapsed().as_secs_f64() * 1000.0,
            render_ms: self.pending.render_ms,
            total_objects: self.pending.total_objects,
            visible_objects: self.pending.visible_objects,
            canvas: self.canvas,
        };
        self.pending = PendingSample::default();
        self.record_sample(sample);
    }

    pub fn render_start(&mut self) {
        self.pending.render_started = Some(Instant::now());
    }

    pub fn render_end(&mut self) {
        match self.pending.render_started.take() {
            Some(started) => {
                self.pending.render_ms = started.elapsed().as_secs_f64() * 1000.0;
            }
            None => tracing::debug!("render_end without render_start; render time undefined"),
        }
    }

    pub fn update_object_count(&mut self, total: usize, visible: usize) {
        self.pending.total_objects = total;
        self.pending.visible_objects = visible;
    }

    pub fn update_canvas_size(&mut self, canvas: Canvas) {
        self.canvas = canvas;
    }

    /// Record an externally measured sample. The per-frame brackets funnel
    /// into this; hosts measuring on their own can call it directly.
    pub fn record_sample(&mut self, sample: PerformanceSample) {
        self.window.push_back(sample);
        while self.window.len() > self.window_cap {
            self.window.pop_front();
        }
    }

    /// Whether the periodic evaluation cadence has elapsed. Advances the
    /// cadence clock when it returns true.
    pub fn tick_due(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last_tick) >= self.tick_interval {
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    /// Evaluate rolling averages against thresholds. `object_ceiling` is
    /// the configured budget; counts are measured before limiting, so a
    /// sustained overrun fires even while the limiter holds the line.
    pub fn tick(&mut self, object_ceiling: usize) -> Vec<PerformanceIssue> {
        if self.window.len() < self.thresholds.min_samples {
            return Vec::new();
        }
        let summary = self.summary();
        let mut issues = Vec::new();
        if summary.avg_fps < self.thresholds.min_fps {
            issues.push(PerformanceIssue::LowFps {
                avg_fps: summary.avg_fps,
            });
        }
        if summary.avg_render_ms > self.thresholds.render_budget_ms {
            issues.push(PerformanceIssue::HighRenderTime {
                avg_render_ms: summary.avg_render_ms,
                budget_ms: self.thresholds.render_budget_ms,
            });
        }
        if summary.avg_total_objects > object_ceiling as f64 {
            issues.push(PerformanceIssue::HighObjectCount {
                avg_total: summary.avg_total_objects,
                ceiling: object_ceiling,
            });
        }
        if !issues.is_empty() {
            tracing::debug!(?issues, "performance issues detected");
        }
        issues
    }

    pub fn summary(&self) -> PerfSummary {
        let n = self.window.len();
        if n == 0 {
            return PerfSummary {
                avg_fps: 0.0,
                avg_frame_ms: 0.0,
                avg_render_ms: 0.0,
                avg_total_objects: 0.0,
                avg_visible_objects: 0.0,
                sample_count: 0,
                rating: PerfRating::Good,
            };
        }
        let nf = n as f64;
        let avg_frame_ms = self.window.iter().map(|s| s.frame_ms).sum::<f64>() / nf;
        let avg_render_ms = self.window.iter().map(|s| s.render_ms).sum::<f64>() / nf;
        let avg_total = self.window.iter().map(|s| s.total_objects as f64).sum::<f64>() / nf;
        let avg_visible = self
            .window
            .iter()
            .map(|s| s.visible_objects as f64)
            .sum::<f64>()
            / nf;
        let avg_fps = if avg_frame_ms > 0.0 {
            1000.0 / avg_frame_ms
        } else {
            f64::INFINITY
        };

        let t = &self.thresholds;
        let rating = if avg_fps >= t.excellent_fps && avg_render_ms <= t.render_budget_ms {
            PerfRating::Excellent
        } else if avg_fps >= t.min_fps {
            PerfRating::Good
        } else if avg_fps >= t.poor_fps {
            PerfRating::Poor
        } else {
            PerfRating::Critical
        };

        PerfSummary {
            avg_fps,
            avg_frame_ms,
            avg_render_ms,
            avg_total_objects: avg_total,
            avg_visible_objects: avg_visible,
            sample_count: n,
            rating,
        }
    }
}
