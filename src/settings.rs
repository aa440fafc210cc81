//! Shared optimization configuration.
//!
//! `OptimizationSettings` is owned by exactly one writer (the adaptive
//! controller); every pipeline stage reads a cloned snapshot taken at the
//! start of the frame, so a stage never observes a half-updated value.
//! The `version` counter increments on every mutation.

/// Named bundle of optimization aggressiveness, from cheapest to richest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityTier {
    /// One step down. Saturates at `Low`.
    pub fn degraded(self) -> Self {
        match self {
            Self::Ultra => Self::High,
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    /// One step up. Saturates at `Ultra`.
    pub fn upgraded(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Ultra => Self::Ultra,
        }
    }
}

/// Weights of the frame-budget importance score. Empirically chosen
/// defaults; tunable, not load-bearing semantics.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImportanceWeights {
    pub z_index: f64,
    pub area: f64,
    pub visibility: f64,
    pub opacity: f64,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            z_index: 10.0,
            area: 1.0,
            visibility: 100.0,
            opacity: 50.0,
        }
    }
}

/// The single mutable shared configuration consumed by every pipeline
/// stage. Single-writer: only [`crate::perf::AdaptiveController`] mutates
/// it after construction.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OptimizationSettings {
    /// Attempt the hardware backend first when it is compiled in.
    pub prefer_gpu: bool,
    pub culling_enabled: bool,
    pub lod_enabled: bool,
    pub caching_enabled: bool,
    /// Upper bound on objects handed to the backend per frame.
    pub max_objects: usize,
    /// Zoom below which level-of-detail substitution kicks in.
    pub lod_threshold: f64,
    /// Curve-flattening tolerance at zoom 1.0 for the medium-low LOD band.
    pub lod_simplify_tolerance: f64,
    /// World-space padding around the viewport rectangle during culling.
    pub cull_padding: f64,
    pub quality: QualityTier,
    pub importance: ImportanceWeights,
    /// Bumped on every mutation; lets hosts detect settings drift.
    pub version: u64,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            prefer_gpu: cfg!(feature = "gpu"),
            culling_enabled: true,
            lod_enabled: true,
            caching_enabled: true,
            max_objects: 1000,
            lod_threshold: 0.5,
            lod_simplify_tolerance: 0.5,
            cull_padding: 100.0,
            quality: QualityTier::High,
            importance: ImportanceWeights::default(),
            version: 0,
        }
    }
}

/// Host-level override of the optimization policy. All fields optional;
/// `None` leaves the current value untouched.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub prefer_gpu: Option<bool>,
    pub culling_enabled: Option<bool>,
    pub lod_enabled: Option<bool>,
    pub caching_enabled: Option<bool>,
    pub max_objects: Option<usize>,
    pub lod_threshold: Option<f64>,
    pub lod_simplify_tolerance: Option<f64>,
    pub cull_padding: Option<f64>,
    pub quality: Option<QualityTier>,
    pub importance: Option<ImportanceWeights>,
}

impl OptimizationSettings {
    /// Apply a host patch in place. Returns whether anything changed; the
    /// caller is responsible for bumping `version`.
    pub(crate) fn apply_patch(&mut self, patch: &SettingsPatch) -> bool {
        let before = self.clone();
        if let Some(v) = patch.prefer_gpu {
            self.prefer_gpu = v;
        }
        if let Some(v) = patch.culling_enabled {
            self.culling_enabled = v;
        }
        if let Some(v) = patch.lod_enabled {
            self.lod_enabled = v;
        }
        if let Some(v) = patch.caching_enabled {
            self.caching_enabled = v;
        }
        if let Some(v) = patch.max_objects {
            self.max_objects = v;
        }
        if let Some(v) = patch.lod_threshold {
            self.lod_threshold = v;
        }
        if let Some(v) = patch.lod_simplify_tolerance {
            self.lod_simplify_tolerance = v;
        }
        if let Some(v) = patch.cull_padding {
            self.cull_padding = v;
        }
        if let Some(v) = patch.quality {
            self.quality = v;
        }
        if let Some(v) = patch.importance {
            self.importance = v;
        }
        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_steps_saturate() {
        assert_eq!(QualityTier::Low.degraded(), QualityTier::Low);
        assert_eq!(QualityTier::Ultra.upgraded(), QualityTier::Ultra);
        assert_eq!(QualityTier::Ultra.degraded(), QualityTier::High);
        assert_eq!(QualityTier::Medium.upgraded(), QualityTier::High);
    }

    #[test]
    fn ultra_reaches_low_in_three_steps() {
        let mut tier = QualityTier::Ultra;
        for _ in 0..3 {
            tier = tier.degraded();
        }
        assert_eq!(tier, QualityTier::Low);
        assert_eq!(tier.degraded(), QualityTier::Low);
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut settings = OptimizationSettings::default();
        let changed = settings.apply_patch(&SettingsPatch {
            max_objects: Some(500),
            quality: Some(QualityTier::Low),
            ..SettingsPatch::default()
        });
        assert!(changed);
        assert_eq!(settings.max_objects, 500);
        assert_eq!(settings.quality, QualityTier::Low);
        assert!(settings.culling_enabled);
    }

    #[test]
    fn empty_patch_reports_no_change() {
        let mut settings = OptimizationSettings::default();
        assert!(!settings.apply_patch(&SettingsPatch::default()));
    }

    #[test]
    fn patch_roundtrips_through_json() {
        let patch: SettingsPatch =
            serde_json::from_str(r#"{"quality":"ultra","lod_enabled":false}"#).unwrap();
        assert_eq!(patch.quality, Some(QualityTier::Ultra));
        assert_eq!(patch.lod_enabled, Some(false));
        assert_eq!(patch.max_objects, None);
    }
}
