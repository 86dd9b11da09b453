//! Lighting quality gate.
//!
//! Samples a reduced-resolution RGBA frame on its own slow cadence and
//! classifies ambient conditions from mean luma and luma standard deviation.
//! Anything other than `Good` is a hard gate: classification is forced to
//! the neutral label until conditions recover.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ── LightingStatus ─────────────────────────────────────────

/// Classified lighting condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingStatus {
    Good,
    LowLight,
    Overexposed,
    LowContrast,
}

impl LightingStatus {
    /// String representation for IPC and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::LowLight => "low_light",
            Self::Overexposed => "overexposed",
            Self::LowContrast => "low_contrast",
        }
    }
}

// ── Config ─────────────────────────────────────────────────

/// Thresholds and cadence for the lighting gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Mean luma below this is `low_light`.
    pub min_mean: f32,
    /// Mean luma above this is `overexposed`.
    pub max_mean: f32,
    /// Luma standard deviation below this is `low_contrast`.
    pub min_contrast: f32,
    /// Minimum time between samples (ms).
    pub sample_interval_ms: f64,
    /// Pixel stride in both axes when sampling.
    pub pixel_stride: usize,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            min_mean: 45.0,
            max_mean: 210.0,
            min_contrast: 22.0,
            sample_interval_ms: 250.0,
            pixel_stride: 2,
        }
    }
}

// ── Frame samples ──────────────────────────────────────────

/// Borrowed RGBA8 frame sample, row-major.
#[derive(Debug, Clone, Copy)]
pub struct FrameSample<'a> {
    pub width: usize,
    pub height: usize,
    pub rgba: &'a [u8],
}

/// Owned RGBA8 frame, as carried in recorded sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnedFrame {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

impl OwnedFrame {
    /// Uniform frame filled with a single RGB colour.
    pub fn solid(width: usize, height: usize, rgb: [u8; 3]) -> Self {
        let mut rgba = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn as_sample(&self) -> FrameSample<'_> {
        FrameSample {
            width: self.width,
            height: self.height,
            rgba: &self.rgba,
        }
    }
}

/// Luma statistics from one sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightingMetrics {
    /// Mean luma (0-255).
    pub mean: f32,
    /// Standard deviation of luma.
    pub contrast: f32,
    /// Number of pixels that contributed.
    pub pixels: usize,
}

/// Rec.601 luma of an RGB triple.
fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Measure mean and standard deviation of luma over a strided grid.
pub fn measure(frame: &FrameSample<'_>, stride: usize) -> LightingMetrics {
    let stride = stride.max(1);
    let mut sum = 0.0_f64;
    let mut sum_sq = 0.0_f64;
    let mut pixels = 0usize;

    // Claimed dimensions may exceed the buffer; only walk pixels it holds.
    let available = frame.rgba.len() / 4;
    if frame.width == 0 {
        return LightingMetrics::default();
    }
    for y in (0..frame.height).step_by(stride) {
        let Some(row_start) = y.checked_mul(frame.width).filter(|&r| r < available) else {
            break;
        };
        let row_len = frame.width.min(available - row_start);
        for x in (0..row_len).step_by(stride) {
            let idx = (row_start + x) * 4;
            let Some(px) = frame.rgba.get(idx..idx + 3) else {
                continue;
            };
            let l = luma(px[0], px[1], px[2]) as f64;
            sum += l;
            sum_sq += l * l;
            pixels += 1;
        }
    }

    if pixels == 0 {
        return LightingMetrics::default();
    }
    let n = pixels as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    LightingMetrics {
        mean: mean as f32,
        contrast: variance.sqrt() as f32,
        pixels,
    }
}

// ── LightingGate ───────────────────────────────────────────

/// Cadenced lighting gate state.
pub struct LightingGate {
    pub config: LightingConfig,
    status: LightingStatus,
    metrics: LightingMetrics,
    last_sample_ms: Option<f64>,
}

impl LightingGate {
    pub fn new(config: LightingConfig) -> Self {
        Self {
            config,
            status: LightingStatus::Good,
            metrics: LightingMetrics::default(),
            last_sample_ms: None,
        }
    }

    /// Classify metrics; the first failing rule wins.
    pub fn classify(&self, metrics: &LightingMetrics) -> LightingStatus {
        if metrics.mean < self.config.min_mean {
            LightingStatus::LowLight
        } else if metrics.mean > self.config.max_mean {
            LightingStatus::Overexposed
        } else if metrics.contrast < self.config.min_contrast {
            LightingStatus::LowContrast
        } else {
            LightingStatus::Good
        }
    }

    /// Whether a new sample is due at `now_ms`.
    pub fn is_due(&self, now_ms: f64) -> bool {
        match self.last_sample_ms {
            None => true,
            Some(last) => now_ms - last >= self.config.sample_interval_ms,
        }
    }

    /// Sample the frame if due and return the (possibly unchanged) status.
    pub fn maybe_sample(&mut self, now_ms: f64, frame: &FrameSample<'_>) -> LightingStatus {
        if self.is_due(now_ms) {
            self.sample(now_ms, frame);
        }
        self.status
    }

    /// Sample the frame unconditionally.
    pub fn sample(&mut self, now_ms: f64, frame: &FrameSample<'_>) -> LightingStatus {
        self.last_sample_ms = Some(now_ms);
        self.metrics = measure(frame, self.config.pixel_stride);
        let next = self.classify(&self.metrics);
        if next != self.status {
            match next {
                LightingStatus::Good => info!(
                    "Lighting recovered (mean {:.1}, contrast {:.1})",
                    self.metrics.mean, self.metrics.contrast,
                ),
                other => warn!(
                    "Lighting degraded: {} (mean {:.1}, contrast {:.1})",
                    other.as_str(),
                    self.metrics.mean,
                    self.metrics.contrast,
                ),
            }
        } else {
            debug!(
                "Lighting sample: {} over {} px",
                next.as_str(),
                self.metrics.pixels
            );
        }
        self.status = next;
        next
    }

    pub fn status(&self) -> LightingStatus {
        self.status
    }

    /// Whether classification may be trusted right now.
    pub fn passes(&self) -> bool {
        self.status == LightingStatus::Good
    }

    /// Reset to the initial (ungated) state.
    pub fn reset(&mut self) {
        self.status = LightingStatus::Good;
        self.metrics = LightingMetrics::default();
        self.last_sample_ms = None;
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:status :{} :mean {:.1} :contrast {:.1} :pixels {} :min-mean {:.0} :max-mean {:.0} :min-contrast {:.0})",
            self.status.as_str(),
            self.metrics.mean,
            self.metrics.contrast,
            self.metrics.pixels,
            self.config.min_mean,
            self.config.max_mean,
            self.config.min_contrast,
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
