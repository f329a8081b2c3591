// src/track.rs
//
// Per-vehicle state: bounded position history, a displacement-window
// speed estimate, and the asymmetric parked/moving hysteresis machine.
// All time arithmetic uses timestamps injected by the caller; the track
// never reads a clock.

use crate::types::{ParkingConfig, TrackStatus, VehicleClass};
use std::collections::VecDeque;

/// Emitted by `update` when the parked/moving decision flips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionTransition {
    Parked { at: f64 },
    Unparked { at: f64, parked_secs: f64 },
}

pub struct TrackedVehicle {
    pub track_id: i64,
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub first_seen: f64,
    pub last_seen: f64,
    pub frames_seen: u64,
    pub lost_frames: u64,
    pub occluded: bool,

    status: TrackStatus,
    /// Set while the track is stationary-but-accumulating or parked
    stationary_since: Option<f64>,
    /// Moment the parked state was confirmed
    parked_stable_since: Option<f64>,
    /// Exit-side timer: set while exit-level speed is being sustained
    exit_motion_since: Option<f64>,

    /// (center, timestamp) samples, oldest evicted at capacity
    positions: VecDeque<((f32, f32), f64)>,
    /// Raw labels for majority-vote smoothing
    class_votes: VecDeque<VehicleClass>,
    total_distance: f64,

    params: ParkingConfig,
}

impl TrackedVehicle {
    pub fn new(
        track_id: i64,
        class: VehicleClass,
        bbox: [f32; 4],
        confidence: f32,
        ts_sec: f64,
        params: ParkingConfig,
    ) -> Self {
        let center = bbox_center(&bbox);
        let mut positions = VecDeque::with_capacity(params.history_capacity);
        positions.push_back((center, ts_sec));

        let mut class_votes = VecDeque::with_capacity(params.class_vote_window);
        class_votes.push_back(class);

        Self {
            track_id,
            bbox,
            confidence,
            first_seen: ts_sec,
            last_seen: ts_sec,
            frames_seen: 1,
            lost_frames: 0,
            occluded: false,
            status: TrackStatus::Moving,
            stationary_since: None,
            parked_stable_since: None,
            exit_motion_since: None,
            positions,
            class_votes,
            total_distance: 0.0,
            params,
        }
    }

    /// Feed one frame's detection into the track. Returns a transition if
    /// the parked/moving decision flipped on this update.
    pub fn update(
        &mut self,
        bbox: [f32; 4],
        confidence: f32,
        class: VehicleClass,
        ts_sec: f64,
    ) -> Option<MotionTransition> {
        let center = bbox_center(&bbox);

        if let Some(((px, py), _)) = self.positions.back() {
            let dx = (center.0 - px) as f64;
            let dy = (center.1 - py) as f64;
            self.total_distance += (dx * dx + dy * dy).sqrt();
        }

        if self.positions.len() == self.params.history_capacity {
            self.positions.pop_front();
        }
        self.positions.push_back((center, ts_sec));

        if self.class_votes.len() == self.params.class_vote_window {
            self.class_votes.pop_front();
        }
        self.class_votes.push_back(class);

        self.bbox = bbox;
        self.confidence = confidence;
        self.last_seen = ts_sec;
        self.frames_seen += 1;
        self.lost_frames = 0;
        self.occluded = false;

        self.classify(ts_sec)
    }

    /// No detection for this track on the current frame.
    pub fn mark_lost(&mut self) {
        self.lost_frames += 1;
        self.occluded = true;
    }

    /// Displacement-based speed over the trailing window, px/s.
    ///
    /// `None` means too few samples fall inside the window; the caller
    /// must hold the previous decision (occlusion tolerance). Endpoint
    /// distance is used instead of frame-to-frame deltas so camera shake
    /// and bbox instability do not read as motion, and the variance guard
    /// forces zero for an idling vehicle whose jitter happens to produce
    /// a nonzero endpoint delta.
    pub fn speed_px_per_sec(&self, now: f64) -> Option<f64> {
        let window_start = now - self.params.speed_window_secs;
        let recent: Vec<((f32, f32), f64)> = self
            .positions
            .iter()
            .filter(|(_, ts)| *ts >= window_start)
            .copied()
            .collect();

        if recent.len() < self.params.min_window_samples {
            return None;
        }

        let n = recent.len() as f64;
        let (mut mx, mut my) = (0.0f64, 0.0f64);
        for ((x, y), _) in &recent {
            mx += *x as f64;
            my += *y as f64;
        }
        mx /= n;
        my /= n;

        let mut variance = 0.0f64;
        for ((x, y), _) in &recent {
            let dx = *x as f64 - mx;
            let dy = *y as f64 - my;
            variance += dx * dx + dy * dy;
        }
        variance /= n;

        if variance < self.params.variance_floor_px2 {
            return Some(0.0);
        }

        let ((x0, y0), t0) = recent[0];
        let ((x1, y1), t1) = recent[recent.len() - 1];
        let elapsed = t1 - t0;
        if elapsed <= f64::EPSILON {
            return Some(0.0);
        }

        let dx = (x1 - x0) as f64;
        let dy = (y1 - y0) as f64;
        Some((dx * dx + dy * dy).sqrt() / elapsed)
    }

    fn classify(&mut self, now: f64) -> Option<MotionTransition> {
        // Insufficient data: hold the previous decision, never default
        // to moving or parked.
        let speed = self.speed_px_per_sec(now)?;

        if self.status == TrackStatus::Parked {
            // Leaving PARKED takes sustained exit-level speed; jitter that
            // merely clears the entry threshold must not oscillate us out.
            if speed > self.params.exit_speed_px_s {
                let since = *self.exit_motion_since.get_or_insert(now);
                if now - since >= self.params.exit_duration_secs {
                    let parked_secs = self
                        .parked_stable_since
                        .or(self.stationary_since)
                        .map(|t| now - t)
                        .unwrap_or(0.0);
                    self.status = TrackStatus::Moving;
                    self.stationary_since = None;
                    self.parked_stable_since = None;
                    self.exit_motion_since = None;
                    return Some(MotionTransition::Unparked {
                        at: now,
                        parked_secs,
                    });
                }
            } else {
                self.exit_motion_since = None;
            }
            return None;
        }

        if speed < self.params.entry_speed_px_s {
            let since = *self.stationary_since.get_or_insert(now);
            if now - since >= self.params.entry_duration_secs {
                self.status = TrackStatus::Parked;
                self.parked_stable_since = Some(now);
                return Some(MotionTransition::Parked { at: now });
            }
            self.status = TrackStatus::Stopped;
        } else {
            self.stationary_since = None;
            self.status = TrackStatus::Moving;
        }
        None
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn is_parked(&self) -> bool {
        self.status == TrackStatus::Parked
    }

    /// Majority vote over the recent label window; a single-frame
    /// misread (a truck flashing as a bus) does not change the report.
    pub fn smoothed_class(&self) -> VehicleClass {
        let mut counts: Vec<(VehicleClass, usize)> = Vec::new();
        for vote in &self.class_votes {
            match counts.iter_mut().find(|(c, _)| c == vote) {
                Some((_, n)) => *n += 1,
                None => counts.push((*vote, 1)),
            }
        }
        counts
            .into_iter()
            .max_by_key(|(_, n)| *n)
            .map(|(c, _)| c)
            .unwrap_or(VehicleClass::Unknown)
    }

    pub fn stationary_duration(&self, now: f64) -> f64 {
        self.stationary_since.map(|t| now - t).unwrap_or(0.0)
    }

    /// Seconds the vehicle has been stationary, counted from the start of
    /// the stationary period, not from the parked confirmation.
    pub fn park_duration(&self, now: f64) -> f64 {
        if self.is_parked() {
            self.stationary_duration(now)
        } else {
            0.0
        }
    }

    /// Average per-frame displacement, px. Reporting only.
    pub fn avg_speed_px_per_frame(&self) -> f64 {
        if self.frames_seen > 1 {
            self.total_distance / self.frames_seen as f64
        } else {
            0.0
        }
    }

    #[allow(dead_code)]
    pub fn history_len(&self) -> usize {
        self.positions.len()
    }
}

fn bbox_center(bbox: &[f32; 4]) -> (f32, f32) {
    (
        (bbox[0] + bbox[2]) / 2.0,
        (bbox[1] + bbox[3]) / 2.0,
    )
}
