//! Frame rate instrumentation for the sign session.
//!
//! Tracks animation-callback intervals in a rolling window and reports
//! percentile statistics for IPC status output.

/// Rolling frame interval statistics.
#[derive(Debug)]
pub struct FrameRate {
    /// Intervals between consecutive frames (ms).
    pub intervals: Vec<f64>,
    /// Maximum number of intervals kept.
    pub window_size: usize,
    /// Total frames seen.
    pub total_frames: u64,
    /// Frames on which detection actually ran.
    pub detect_frames: u64,
    last_frame_ms: Option<f64>,
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(120)
    }
}

impl FrameRate {
    pub fn new(window_size: usize) -> Self {
        Self {
            intervals: Vec::with_capacity(window_size),
            window_size: window_size.max(1),
            total_frames: 0,
            detect_frames: 0,
            last_frame_ms: None,
        }
    }

    /// Record an animation frame at `now_ms`.
    pub fn record_frame(&mut self, now_ms: f64) {
        if let Some(last) = self.last_frame_ms {
            let interval = now_ms - last;
            if interval.is_finite() && interval >= 0.0 {
                self.intervals.push(interval);
                if self.intervals.len() > self.window_size {
                    self.intervals.remove(0);
                }
            }
        }
        self.last_frame_ms = Some(now_ms);
        self.total_frames += 1;
    }

    /// Note that detection ran on the current frame.
    pub fn record_detection(&mut self) {
        self.detect_frames += 1;
    }

    /// Compute percentile from a sorted slice.
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() as f64 - 1.0) * p / 100.0).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn stats(&self) -> FrameRateStats {
        let mut sorted = self.intervals.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let p50 = Self::percentile(&sorted, 50.0);
        FrameRateStats {
            interval_p50: p50,
            interval_p99: Self::percentile(&sorted, 99.0),
            fps: if p50 > 0.0 { 1000.0 / p50 } else { 0.0 },
            total_frames: self.total_frames,
            detect_frames: self.detect_frames,
        }
    }

    /// Clear all samples and counters.
    pub fn reset(&mut self) {
        self.intervals.clear();
        self.total_frames = 0;
        self.detect_frames = 0;
        self.last_frame_ms = None;
    }

    /// Format stats as an s-expression for IPC.
    pub fn stats_sexp(&self) -> String {
        let s = self.stats();
        format!(
            "(:fps {:.0} :interval-p50 {:.1} :interval-p99 {:.1} :total-frames {} :detect-frames {})",
            s.fps, s.interval_p50, s.interval_p99, s.total_frames, s.detect_frames,
        )
    }
}

/// Computed frame rate statistics.
#[derive(Debug, Clone)]
pub struct FrameRateStats {
    pub interval_p50: f64,
    pub interval_p99: f64,
    pub fps: f64,
    pub total_frames: u64,
    pub detect_frames: u64,
}
