// src/pipeline/metrics.rs
//
// Observability counters for every stage of the per-frame dataflow.
// Exported via logs or the serialized summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct ParkingMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub detections_in: Arc<AtomicU64>,
    pub below_confidence_floor: Arc<AtomicU64>,
    pub duplicates_suppressed: Arc<AtomicU64>,
    pub unstable_filtered: Arc<AtomicU64>,
    pub tracks_created: Arc<AtomicU64>,
    pub tracks_restored: Arc<AtomicU64>,
    pub tracks_evicted: Arc<AtomicU64>,
    pub park_events: Arc<AtomicU64>,
    pub unpark_events: Arc<AtomicU64>,
    pub slot_occupied_events: Arc<AtomicU64>,
    pub slot_vacated_events: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ParkingMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            detections_in: Arc::new(AtomicU64::new(0)),
            below_confidence_floor: Arc::new(AtomicU64::new(0)),
            duplicates_suppressed: Arc::new(AtomicU64::new(0)),
            unstable_filtered: Arc::new(AtomicU64::new(0)),
            tracks_created: Arc::new(AtomicU64::new(0)),
            tracks_restored: Arc::new(AtomicU64::new(0)),
            tracks_evicted: Arc::new(AtomicU64::new(0)),
            park_events: Arc::new(AtomicU64::new(0)),
            unpark_events: Arc::new(AtomicU64::new(0)),
            slot_occupied_events: Arc::new(AtomicU64::new(0)),
            slot_vacated_events: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            detections_in: self.detections_in.load(Ordering::Relaxed),
            below_confidence_floor: self.below_confidence_floor.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            unstable_filtered: self.unstable_filtered.load(Ordering::Relaxed),
            tracks_created: self.tracks_created.load(Ordering::Relaxed),
            tracks_restored: self.tracks_restored.load(Ordering::Relaxed),
            tracks_evicted: self.tracks_evicted.load(Ordering::Relaxed),
            park_events: self.park_events.load(Ordering::Relaxed),
            unpark_events: self.unpark_events.load(Ordering::Relaxed),
            slot_occupied_events: self.slot_occupied_events.load(Ordering::Relaxed),
            slot_vacated_events: self.slot_vacated_events.load(Ordering::Relaxed),
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for ParkingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub detections_in: u64,
    pub below_confidence_floor: u64,
    pub duplicates_suppressed: u64,
    pub unstable_filtered: u64,
    pub tracks_created: u64,
    pub tracks_restored: u64,
    pub tracks_evicted: u64,
    pub park_events: u64,
    pub unpark_events: u64,
    pub slot_occupied_events: u64,
    pub slot_vacated_events: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}
