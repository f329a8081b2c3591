// src/pipeline/frame_context.rs
//
// Single source of truth for one processed frame. The export layer
// (rendering, persistence, dashboards) reads from this snapshot instead
// of reaching into component state.

use crate::track::TrackedVehicle;
use crate::occupancy::ParkingSlot;
use crate::tracking::TrackingStats;
use crate::types::{TrackStatus, VehicleClass};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TrackView {
    pub track_id: i64,
    pub class: VehicleClass,
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub status: TrackStatus,
    pub occluded: bool,
    pub in_zone: bool,
    pub frames_seen: u64,
    pub lost_frames: u64,
    /// Seconds between first and most recent sighting
    pub tracked_secs: f64,
    pub stationary_secs: f64,
    pub parked_secs: f64,
    pub avg_speed_px_frame: f64,
}

impl TrackView {
    pub fn from_track(track: &TrackedVehicle, in_zone: bool, now: f64) -> Self {
        Self {
            track_id: track.track_id,
            class: track.smoothed_class(),
            bbox: track.bbox,
            confidence: track.confidence,
            status: track.status(),
            occluded: track.occluded,
            in_zone,
            frames_seen: track.frames_seen,
            lost_frames: track.lost_frames,
            tracked_secs: track.last_seen - track.first_seen,
            stationary_secs: track.stationary_duration(now),
            parked_secs: track.park_duration(now),
            avg_speed_px_frame: track.avg_speed_px_per_frame(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub slot_id: i64,
    pub occupied: bool,
    pub occupying_track: Option<i64>,
    pub occupied_secs: f64,
    pub total_occupancies: u64,
    pub total_duration_secs: f64,
}

impl SlotView {
    pub fn from_slot(slot: &ParkingSlot, now: f64) -> Self {
        Self {
            slot_id: slot.id,
            occupied: slot.is_occupied,
            occupying_track: slot.occupying_track,
            occupied_secs: slot.occupied_duration(now),
            total_occupancies: slot.total_occupancies,
            total_duration_secs: slot.total_duration,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameContext {
    pub frame_id: u64,
    pub timestamp: f64,

    /// Detections that survived the confidence floor, duplicate
    /// suppression and the stability gate
    pub stable_detections: usize,

    pub tracks: Vec<TrackView>,
    pub slots: Vec<SlotView>,
    pub tracking: TrackingStats,

    pub occupied_slots: usize,
    pub occupancy_rate: f64,
    pub estimated_capacity: usize,
}
