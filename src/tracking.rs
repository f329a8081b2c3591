// src/tracking.rs
//
// Owns the authoritative track set. Tracks absent from a frame are not
// deleted; they move to a lost holding area for a grace window so a
// brief detector miss (occlusion by another vehicle, motion blur) does
// not reset identity, parking timers or first-seen times.

use crate::track::{MotionTransition, TrackedVehicle};
use crate::types::{Detection, ParkingConfig, TrackStatus, TrackingConfig};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Lost tracks stay visible to the export layer for this many frames.
const DISPLAY_LOST_FRAMES: u64 = 10;

/// What happened to the track set during one frame update.
#[derive(Debug, Default)]
pub struct FrameOutcome {
    pub transitions: Vec<(i64, MotionTransition)>,
    pub created: Vec<i64>,
    pub restored: Vec<i64>,
    pub evicted: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrackingStats {
    pub active: usize,
    pub lost: usize,
    pub moving: usize,
    pub stationary: usize,
    pub parked: usize,
    pub total_tracked: u64,
    pub total_evicted: u64,
}

pub struct TrackingManager {
    active: HashMap<i64, TrackedVehicle>,
    /// track id -> (frame the track went missing, track)
    lost: HashMap<i64, (u64, TrackedVehicle)>,
    current_frame: u64,
    total_tracked: u64,
    total_evicted: u64,
    params: TrackingConfig,
    parking: ParkingConfig,
}

impl TrackingManager {
    pub fn new(params: TrackingConfig, parking: ParkingConfig) -> Self {
        Self {
            active: HashMap::new(),
            lost: HashMap::new(),
            current_frame: 0,
            total_tracked: 0,
            total_evicted: 0,
            params,
            parking,
        }
    }

    /// Reconcile one frame's (post-suppression, post-stability) detections
    /// against the track set.
    pub fn update(
        &mut self,
        detections: &[Detection],
        frame_id: u64,
        ts_sec: f64,
    ) -> FrameOutcome {
        self.current_frame = frame_id;
        let mut outcome = FrameOutcome::default();
        let mut seen_ids = HashSet::new();

        for det in detections {
            let track_id = match det.track_id {
                Some(id) => id,
                None => continue,
            };
            seen_ids.insert(track_id);

            // A lost identifier reappearing is the expected, desired case:
            // restore it with every timer intact.
            if let Some((_, mut track)) = self.lost.remove(&track_id) {
                track.occluded = false;
                self.active.insert(track_id, track);
                outcome.restored.push(track_id);
            }

            if let Some(track) = self.active.get_mut(&track_id) {
                if let Some(transition) =
                    track.update(det.bbox, det.confidence, det.class, ts_sec)
                {
                    outcome.transitions.push((track_id, transition));
                }
            } else if self.active.len() < self.params.max_tracks {
                self.active.insert(
                    track_id,
                    TrackedVehicle::new(
                        track_id,
                        det.class,
                        det.bbox,
                        det.confidence,
                        ts_sec,
                        self.parking.clone(),
                    ),
                );
                self.total_tracked += 1;
                outcome.created.push(track_id);
            } else {
                // Capacity policy, not a fault: the identifier is ignored
                // until a slot frees up.
                debug!(
                    "track cap {} reached, ignoring new id {}",
                    self.params.max_tracks, track_id
                );
            }
        }

        // Anything not detected this frame goes to the lost set.
        let missing: Vec<i64> = self
            .active
            .keys()
            .copied()
            .filter(|id| !seen_ids.contains(id))
            .collect();
        for id in missing {
            if let Some(mut track) = self.active.remove(&id) {
                track.mark_lost();
                self.lost.insert(id, (frame_id, track));
            }
        }

        // Grace window expiry: lost for too long means gone for good.
        let expired: Vec<i64> = self
            .lost
            .iter()
            .filter(|(_, (lost_frame, _))| frame_id - lost_frame > self.params.grace_frames)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.lost.remove(&id);
            self.total_evicted += 1;
            outcome.evicted.push(id);
        }

        outcome
    }

    pub fn get(&self, track_id: i64) -> Option<&TrackedVehicle> {
        self.active
            .get(&track_id)
            .or_else(|| self.lost.get(&track_id).map(|(_, t)| t))
    }

    pub fn active_tracks(&self) -> impl Iterator<Item = &TrackedVehicle> {
        self.active.values()
    }

    /// Active tracks plus lost tracks still fresh enough to display.
    pub fn visible_tracks(&self) -> Vec<&TrackedVehicle> {
        let mut tracks: Vec<&TrackedVehicle> = self.active.values().collect();
        for (lost_frame, track) in self.lost.values() {
            if self.current_frame - lost_frame <= DISPLAY_LOST_FRAMES {
                tracks.push(track);
            }
        }
        tracks.sort_by_key(|t| t.track_id);
        tracks
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    #[allow(dead_code)]
    pub fn lost_count(&self) -> usize {
        self.lost.len()
    }

    pub fn stats(&self) -> TrackingStats {
        let mut moving = 0;
        let mut stationary = 0;
        let mut parked = 0;
        for track in self.active.values() {
            match track.status() {
                TrackStatus::Moving => moving += 1,
                TrackStatus::Stopped => stationary += 1,
                TrackStatus::Parked => {
                    stationary += 1;
                    parked += 1;
                }
            }
        }
        TrackingStats {
            active: self.active.len(),
            lost: self.lost.len(),
            moving,
            stationary,
            parked,
            total_tracked: self.total_tracked,
            total_evicted: self.total_evicted,
        }
    }
}
