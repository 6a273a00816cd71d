// src/stats.rs

use std::time::{Duration, Instant};

/// Timing and throughput counters for one video run.
#[derive(Debug)]
pub struct RunStats {
    pub frames_read: u64,
    pub frames_processed: u64,
    inference_times: Vec<Duration>,
    started_at: Instant,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            frames_read: 0,
            frames_processed: 0,
            inference_times: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn record_inference(&mut self, elapsed: Duration) {
        self.frames_processed += 1;
        self.inference_times.push(elapsed);
    }

    pub fn mean_inference_ms(&self) -> f64 {
        if self.inference_times.is_empty() {
            return 0.0;
        }
        let total: Duration = self.inference_times.iter().sum();
        total.as_secs_f64() * 1000.0 / self.inference_times.len() as f64
    }

    /// Detector-only throughput, from mean inference latency.
    pub fn detector_fps(&self) -> f64 {
        let mean_ms = self.mean_inference_ms();
        if mean_ms > 0.0 {
            1000.0 / mean_ms
        } else {
            0.0
        }
    }

    /// End-to-end throughput including reads, writes, and skipped frames.
    pub fn pipeline_fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.frames_read as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            frames_read: self.frames_read,
            frames_processed: self.frames_processed,
            mean_inference_ms: self.mean_inference_ms(),
            detector_fps: self.detector_fps(),
            pipeline_fps: self.pipeline_fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSummary {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub mean_inference_ms: f64,
    pub detector_fps: f64,
    pub pipeline_fps: f64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_latency_averages_samples() {
        let mut stats = RunStats::new();
        stats.record_inference(Duration::from_millis(10));
        stats.record_inference(Duration::from_millis(30));

        assert!((stats.mean_inference_ms() - 20.0).abs() < 1e-6);
        assert_eq!(stats.frames_processed, 2);
        assert!((stats.detector_fps() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn no_samples_means_zero() {
        let stats = RunStats::new();
        assert_eq!(stats.mean_inference_ms(), 0.0);
        assert_eq!(stats.detector_fps(), 0.0);
    }

    #[test]
    fn summary_reflects_counters() {
        let mut stats = RunStats::new();
        stats.frames_read = 100;
        stats.record_inference(Duration::from_millis(5));

        let summary = stats.summary();
        assert_eq!(summary.frames_read, 100);
        assert_eq!(summary.frames_processed, 1);
        assert!(summary.mean_inference_ms > 0.0);
    }
}
