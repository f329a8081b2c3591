// src/occupancy.rs
//
// Slot occupancy with the same "harder to leave than to enter" shape as
// the track state machine: filling a slot takes a high overlap sustained
// for multiple frames, vacating takes a low overlap — confirmed fast,
// because a real departure collapses overlap abruptly, unlike the
// gradual rise of a vehicle easing in.

use crate::geometry::{polygon_area, polygon_overlap_ratio};
use crate::types::OccupancyConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDef {
    pub id: i64,
    /// Polygon vertices in pixel coordinates of the reference frame
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotFile {
    slots: Vec<SlotDef>,
}

/// Loads and validates a slot definition file. An empty or degenerate
/// file is a configuration error and aborts initialization; nothing at
/// the per-frame level ever fails.
pub fn load_slot_defs(path: &Path) -> Result<Vec<SlotDef>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading slot definitions {}", path.display()))?;
    let file: SlotFile = serde_json::from_str(&contents)
        .with_context(|| format!("parsing slot definitions {}", path.display()))?;

    if file.slots.is_empty() {
        bail!("slot file {} defines no slots", path.display());
    }
    for slot in &file.slots {
        if slot.points.len() < 3 {
            bail!(
                "slot {} has {} vertices, need at least 3",
                slot.id,
                slot.points.len()
            );
        }
        if polygon_area(&slot.points) <= 0.0 {
            bail!("slot {} polygon has zero area", slot.id);
        }
    }

    info!("Loaded {} parking slot(s) from {}", file.slots.len(), path.display());
    Ok(file.slots)
}

#[derive(Debug, Clone)]
pub struct ParkingSlot {
    pub id: i64,
    pub points: Vec<[f32; 2]>,

    pub is_occupied: bool,
    pub occupied_since: Option<f64>,
    pub occupying_track: Option<i64>,

    // Debounce counters for the pending flip in each direction
    vacant_frames: u32,
    occupied_frames: u32,

    // Cumulative statistics
    pub total_occupancies: u64,
    pub total_duration: f64,
}

impl ParkingSlot {
    pub fn new(def: SlotDef) -> Self {
        Self {
            id: def.id,
            points: def.points,
            is_occupied: false,
            occupied_since: None,
            occupying_track: None,
            vacant_frames: 0,
            occupied_frames: 0,
            total_occupancies: 0,
            total_duration: 0.0,
        }
    }

    pub fn overlap(&self, bbox: &[f32; 4]) -> f32 {
        polygon_overlap_ratio(&self.points, bbox)
    }

    pub fn occupied_duration(&self, now: f64) -> f64 {
        match (self.is_occupied, self.occupied_since) {
            (true, Some(since)) => now - since,
            _ => 0.0,
        }
    }

    fn mark_occupied(&mut self, track_id: i64, now: f64) -> Option<SlotTransition> {
        let transition = if !self.is_occupied {
            self.is_occupied = true;
            self.occupied_since = Some(now);
            self.occupying_track = Some(track_id);
            self.total_occupancies += 1;
            Some(SlotTransition::Occupied {
                slot_id: self.id,
                track_id,
                at: now,
            })
        } else if self.occupying_track != Some(track_id) {
            // Occupant substitution: a different vehicle took the slot
            // without an intermediate vacant frame. Close out the previous
            // stay and restart the timer.
            if let Some(since) = self.occupied_since {
                self.total_duration += now - since;
            }
            self.occupied_since = Some(now);
            self.occupying_track = Some(track_id);
            self.total_occupancies += 1;
            Some(SlotTransition::OccupantChanged {
                slot_id: self.id,
                track_id,
                at: now,
            })
        } else {
            None
        };

        self.vacant_frames = 0;
        transition
    }

    fn mark_vacant(&mut self, now: f64) -> Option<SlotTransition> {
        let transition = if self.is_occupied {
            let duration = self
                .occupied_since
                .map(|since| now - since)
                .unwrap_or(0.0);
            self.total_duration += duration;
            self.is_occupied = false;
            self.occupied_since = None;
            self.occupying_track = None;
            Some(SlotTransition::Vacated {
                slot_id: self.id,
                duration_secs: duration,
                at: now,
            })
        } else {
            None
        };

        self.occupied_frames = 0;
        transition
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotTransition {
    Occupied {
        slot_id: i64,
        track_id: i64,
        at: f64,
    },
    OccupantChanged {
        slot_id: i64,
        track_id: i64,
        at: f64,
    },
    Vacated {
        slot_id: i64,
        duration_secs: f64,
        at: f64,
    },
}

pub struct SlotOccupancyEngine {
    slots: Vec<ParkingSlot>,
    params: OccupancyConfig,
}

impl SlotOccupancyEngine {
    pub fn new(defs: Vec<SlotDef>, params: OccupancyConfig) -> Self {
        Self {
            slots: defs.into_iter().map(ParkingSlot::new).collect(),
            params,
        }
    }

    /// One frame: match every slot against the vehicle with the greatest
    /// overlap ratio and run the debounced transition logic.
    ///
    /// `vehicles` are (track id, bbox) of the currently eligible tracks.
    pub fn update(&mut self, vehicles: &[(i64, [f32; 4])], ts_sec: f64) -> Vec<SlotTransition> {
        let mut transitions = Vec::new();

        for slot in &mut self.slots {
            let mut best_overlap = 0.0f32;
            let mut best_track: Option<i64> = None;

            for (track_id, bbox) in vehicles {
                let overlap = slot.overlap(bbox);
                if overlap > best_overlap {
                    best_overlap = overlap;
                    best_track = Some(*track_id);
                }
            }

            if slot.is_occupied {
                if best_overlap < self.params.vacate_threshold {
                    slot.vacant_frames += 1;
                    // Near-zero overlap means the vehicle is plainly gone;
                    // one frame of confirmation is enough.
                    let frames_needed = if best_overlap < self.params.fast_vacate_overlap {
                        1
                    } else {
                        self.params.vacate_confirm_frames
                    };
                    if slot.vacant_frames >= frames_needed {
                        transitions.extend(slot.mark_vacant(ts_sec));
                    }
                } else {
                    slot.vacant_frames = 0;
                    if let Some(track_id) = best_track {
                        if slot.occupying_track != Some(track_id)
                            && best_overlap > self.params.occupy_threshold
                        {
                            transitions.extend(slot.mark_occupied(track_id, ts_sec));
                        }
                    }
                }
            } else if best_overlap > self.params.occupy_threshold {
                slot.occupied_frames += 1;
                if slot.occupied_frames >= self.params.occupy_confirm_frames {
                    if let Some(track_id) = best_track {
                        transitions.extend(slot.mark_occupied(track_id, ts_sec));
                    }
                }
            } else {
                slot.occupied_frames = 0;
            }
        }

        transitions
    }

    pub fn slots(&self) -> &[ParkingSlot] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied).count()
    }

    pub fn occupancy_rate(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.occupied_count() as f64 / self.slots.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_slot(id: i64) -> SlotDef {
        SlotDef {
            id,
            points: vec![[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]],
        }
    }

    fn engine() -> SlotOccupancyEngine {
        SlotOccupancyEngine::new(vec![square_slot(1)], OccupancyConfig::default())
    }

    const INSIDE: [f32; 4] = [10.0, 10.0, 90.0, 90.0];

    #[test]
    fn test_occupy_requires_two_confirm_frames() {
        let mut e = engine();

        let t = e.update(&[(7, INSIDE)], 0.0);
        assert!(t.is_empty());
        assert!(!e.slots()[0].is_occupied);

        let t = e.update(&[(7, INSIDE)], 0.033);
        assert_eq!(t.len(), 1);
        assert!(matches!(
            t[0],
            SlotTransition::Occupied {
                slot_id: 1,
                track_id: 7,
                ..
            }
        ));
        assert!(e.slots()[0].is_occupied);
        assert_eq!(e.slots()[0].occupying_track, Some(7));
        assert_eq!(e.slots()[0].total_occupancies, 1);
    }

    #[test]
    fn test_single_frame_overlap_dip_does_not_vacate() {
        let mut e = engine();
        e.update(&[(7, INSIDE)], 0.0);
        e.update(&[(7, INSIDE)], 0.033);
        assert!(e.slots()[0].is_occupied);

        // One frame at ~0.15 overlap (between fast-vacate and vacate
        // thresholds), then full overlap again.
        let dipped = [10.0, 80.0, 90.0, 213.0]; // tall box, ~15% inside
        let ratio = e.slots()[0].overlap(&dipped);
        assert!(ratio > 0.05 && ratio < 0.2, "ratio={}", ratio);

        let t = e.update(&[(7, dipped)], 0.066);
        assert!(t.is_empty());
        assert!(e.slots()[0].is_occupied);

        let t = e.update(&[(7, INSIDE)], 0.1);
        assert!(t.is_empty());
        assert!(e.slots()[0].is_occupied);
    }

    #[test]
    fn test_sustained_low_overlap_vacates() {
        let mut e = engine();
        e.update(&[(7, INSIDE)], 0.0);
        e.update(&[(7, INSIDE)], 0.033);

        let dipped = [10.0, 80.0, 90.0, 213.0];
        e.update(&[(7, dipped)], 0.066);
        let t = e.update(&[(7, dipped)], 0.1);

        assert_eq!(t.len(), 1);
        assert!(matches!(t[0], SlotTransition::Vacated { slot_id: 1, .. }));
        assert!(!e.slots()[0].is_occupied);
        assert_eq!(e.slots()[0].occupying_track, None);
    }

    #[test]
    fn test_near_zero_overlap_vacates_in_one_frame() {
        let mut e = engine();
        e.update(&[(7, INSIDE)], 0.0);
        e.update(&[(7, INSIDE)], 1.0);
        assert!(e.slots()[0].is_occupied);

        // Vehicle fully gone: single-frame exit confirmation
        let t = e.update(&[], 5.0);
        assert_eq!(t.len(), 1);
        match t[0] {
            SlotTransition::Vacated { duration_secs, .. } => {
                assert!((duration_secs - 4.0).abs() < 1e-9);
            }
            _ => panic!("expected Vacated"),
        }
        assert!((e.slots()[0].total_duration - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_occupant_substitution_without_vacant_frame() {
        let mut e = engine();
        e.update(&[(7, INSIDE)], 0.0);
        e.update(&[(7, INSIDE)], 1.0);
        assert_eq!(e.slots()[0].occupying_track, Some(7));

        // A different vehicle now dominates the slot
        let t = e.update(&[(9, INSIDE)], 10.0);
        assert_eq!(t.len(), 1);
        assert!(matches!(
            t[0],
            SlotTransition::OccupantChanged {
                slot_id: 1,
                track_id: 9,
                ..
            }
        ));
        assert_eq!(e.slots()[0].occupying_track, Some(9));
        assert_eq!(e.slots()[0].total_occupancies, 2);
        // Previous stay was closed out into the cumulative total
        assert!((e.slots()[0].total_duration - 9.0).abs() < 1e-9);
        assert!((e.slots()[0].occupied_duration(12.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_fully_inside_box_has_unit_overlap() {
        let e = engine();
        assert!((e.slots()[0].overlap(&INSIDE) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_occupancy_rate() {
        let mut e = SlotOccupancyEngine::new(
            vec![square_slot(1), square_slot(2)],
            OccupancyConfig::default(),
        );
        // Only slot geometry differs by id here; both overlap the same box,
        // so both fill.
        e.update(&[(7, INSIDE)], 0.0);
        e.update(&[(7, INSIDE)], 0.033);
        assert_eq!(e.occupied_count(), 2);
        assert!((e.occupancy_rate() - 1.0).abs() < 1e-9);
    }
}
