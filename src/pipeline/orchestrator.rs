// src/pipeline/orchestrator.rs
//
// Wires the per-frame dataflow together:
//   intake floor -> duplicate suppression -> identity -> stability gate
//   -> tracking -> slot occupancy -> frame context + events.
// One call per frame, one call in flight; the pipeline holds all state.

use crate::association::ProximityTracker;
use crate::duplicate_filter::suppress_duplicates;
use crate::occupancy::{SlotDef, SlotOccupancyEngine, SlotTransition};
use crate::pipeline::event_bus::{EventBus, ParkingEvent};
use crate::pipeline::frame_context::{FrameContext, SlotView, TrackView};
use crate::pipeline::metrics::ParkingMetrics;
use crate::stability::StabilityFilter;
use crate::track::MotionTransition;
use crate::tracking::TrackingManager;
use crate::types::{Config, Detection, IdentityMode};
use crate::zone::ParkingZone;
use tracing::info;

const EVENT_BUS_CAPACITY: usize = 256;
/// Headroom added on top of the peak parked count when estimating lot capacity
const CAPACITY_BUFFER: usize = 2;

pub struct ParkingPipeline {
    config: Config,
    stability: StabilityFilter,
    tracking: TrackingManager,
    occupancy: SlotOccupancyEngine,
    zone: ParkingZone,
    fallback: Option<ProximityTracker>,
    pub bus: EventBus,
    pub metrics: ParkingMetrics,
    max_parked_observed: usize,
}

impl ParkingPipeline {
    pub fn new(config: Config, slot_defs: Vec<SlotDef>) -> Self {
        let fallback = match config.tracking.identity {
            IdentityMode::External => None,
            IdentityMode::Fallback => {
                info!("Identity mode: fallback (greedy IoU association, weaker guarantees)");
                Some(ProximityTracker::new(
                    config.tracking.fallback_iou_threshold,
                    config.tracking.fallback_retention_frames,
                ))
            }
        };

        Self {
            stability: StabilityFilter::new(config.stability.clone()),
            tracking: TrackingManager::new(config.tracking.clone(), config.parking.clone()),
            occupancy: SlotOccupancyEngine::new(slot_defs, config.occupancy.clone()),
            zone: ParkingZone::new(config.zone.points.clone()),
            fallback,
            bus: EventBus::new(EVENT_BUS_CAPACITY),
            metrics: ParkingMetrics::new(),
            max_parked_observed: 0,
            config,
        }
    }

    /// Process one frame worth of raw detections. Never fails: a bad
    /// frame degrades (detections dropped, state held), it does not
    /// abort the session.
    pub fn process_frame(
        &mut self,
        detections: Vec<Detection>,
        frame_id: u64,
        ts_sec: f64,
    ) -> FrameContext {
        self.metrics.inc(&self.metrics.total_frames);
        self.metrics
            .add(&self.metrics.detections_in, detections.len() as u64);

        // Intake confidence floor
        let floor = self.config.suppression.min_confidence;
        let before = detections.len();
        let detections: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= floor)
            .collect();
        self.metrics.add(
            &self.metrics.below_confidence_floor,
            (before - detections.len()) as u64,
        );

        // One physical vehicle, one box
        let before = detections.len();
        let mut detections =
            suppress_duplicates(&detections, self.config.suppression.iou_threshold);
        self.metrics.add(
            &self.metrics.duplicates_suppressed,
            (before - detections.len()) as u64,
        );

        if let Some(fallback) = &mut self.fallback {
            fallback.assign(&mut detections, frame_id);
        }

        // Stability gate
        let before = detections.len();
        let stable = self.stability.filter(&detections);
        self.metrics.add(
            &self.metrics.unstable_filtered,
            (before - stable.len()) as u64,
        );

        // Tracking
        let outcome = self.tracking.update(&stable, frame_id, ts_sec);

        for track_id in &outcome.created {
            self.metrics.inc(&self.metrics.tracks_created);
            let class = self
                .tracking
                .get(*track_id)
                .map(|t| t.smoothed_class())
                .unwrap_or_default();
            self.bus.publish(ParkingEvent::TrackCreated {
                track_id: *track_id,
                class,
                frame_id,
                timestamp: ts_sec,
            });
        }
        for track_id in &outcome.restored {
            self.metrics.inc(&self.metrics.tracks_restored);
            self.bus.publish(ParkingEvent::TrackRestored {
                track_id: *track_id,
                frame_id,
                timestamp: ts_sec,
            });
        }
        for track_id in &outcome.evicted {
            self.metrics.inc(&self.metrics.tracks_evicted);
            self.bus.publish(ParkingEvent::TrackEvicted {
                track_id: *track_id,
                frame_id,
                timestamp: ts_sec,
            });
        }
        for (track_id, transition) in &outcome.transitions {
            let class = self
                .tracking
                .get(*track_id)
                .map(|t| t.smoothed_class())
                .unwrap_or_default();
            match transition {
                MotionTransition::Parked { at } => {
                    self.metrics.inc(&self.metrics.park_events);
                    let stationary_secs = self
                        .tracking
                        .get(*track_id)
                        .map(|t| t.stationary_duration(*at))
                        .unwrap_or(0.0);
                    self.bus.publish(ParkingEvent::VehicleParked {
                        track_id: *track_id,
                        class,
                        timestamp: *at,
                        stationary_secs,
                    });
                }
                MotionTransition::Unparked { at, parked_secs } => {
                    self.metrics.inc(&self.metrics.unpark_events);
                    self.bus.publish(ParkingEvent::VehicleUnparked {
                        track_id: *track_id,
                        class,
                        timestamp: *at,
                        parked_secs: *parked_secs,
                    });
                }
            }
        }

        // Slot occupancy over zone-eligible tracks
        let eligible: Vec<(i64, [f32; 4])> = self
            .tracking
            .active_tracks()
            .filter(|t| self.zone.contains_bbox(&t.bbox))
            .map(|t| (t.track_id, t.bbox))
            .collect();

        for transition in self.occupancy.update(&eligible, ts_sec) {
            match transition {
                SlotTransition::Occupied {
                    slot_id,
                    track_id,
                    at,
                } => {
                    self.metrics.inc(&self.metrics.slot_occupied_events);
                    self.bus.publish(ParkingEvent::SlotOccupied {
                        slot_id,
                        track_id,
                        timestamp: at,
                    });
                }
                SlotTransition::OccupantChanged {
                    slot_id,
                    track_id,
                    at,
                } => {
                    self.metrics.inc(&self.metrics.slot_occupied_events);
                    self.bus.publish(ParkingEvent::SlotOccupantChanged {
                        slot_id,
                        track_id,
                        timestamp: at,
                    });
                }
                SlotTransition::Vacated {
                    slot_id,
                    duration_secs,
                    at,
                } => {
                    self.metrics.inc(&self.metrics.slot_vacated_events);
                    self.bus.publish(ParkingEvent::SlotVacated {
                        slot_id,
                        duration_secs,
                        timestamp: at,
                    });
                }
            }
        }

        // Capacity estimation from the peak zone-eligible parked count
        let parked_in_zone = self
            .tracking
            .active_tracks()
            .filter(|t| t.is_parked() && self.zone.contains_bbox(&t.bbox))
            .count();
        if parked_in_zone > self.max_parked_observed {
            self.max_parked_observed = parked_in_zone;
        }

        self.build_context(frame_id, ts_sec, stable.len())
    }

    fn build_context(&self, frame_id: u64, ts_sec: f64, stable_detections: usize) -> FrameContext {
        let tracks = self
            .tracking
            .visible_tracks()
            .into_iter()
            .map(|t| TrackView::from_track(t, self.zone.contains_bbox(&t.bbox), ts_sec))
            .collect();

        let slots = self
            .occupancy
            .slots()
            .iter()
            .map(|s| SlotView::from_slot(s, ts_sec))
            .collect();

        FrameContext {
            frame_id,
            timestamp: ts_sec,
            stable_detections,
            tracks,
            slots,
            tracking: self.tracking.stats(),
            occupied_slots: self.occupancy.occupied_count(),
            occupancy_rate: self.occupancy.occupancy_rate(),
            estimated_capacity: self.estimated_capacity(),
        }
    }

    pub fn estimated_capacity(&self) -> usize {
        if self.max_parked_observed == 0 {
            0
        } else {
            self.max_parked_observed + CAPACITY_BUFFER
        }
    }

    pub fn tracking(&self) -> &TrackingManager {
        &self.tracking
    }

    pub fn occupancy(&self) -> &SlotOccupancyEngine {
        &self.occupancy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Config, VehicleClass};

    const FPS: f64 = 30.0;

    fn slot_defs() -> Vec<SlotDef> {
        vec![SlotDef {
            id: 1,
            points: vec![[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]],
        }]
    }

    fn det(id: i64, bbox: [f32; 4]) -> Detection {
        Detection {
            bbox,
            confidence: 0.9,
            class: VehicleClass::Car,
            track_id: Some(id),
        }
    }

    #[test]
    fn test_vehicle_inside_slot_occupies_on_second_frame() {
        let mut pipeline = ParkingPipeline::new(Config::default(), slot_defs());
        let bbox = [10.0, 10.0, 90.0, 90.0];

        let ctx = pipeline.process_frame(vec![det(5, bbox)], 1, 1.0 / FPS);
        assert_eq!(ctx.occupied_slots, 0);

        let ctx = pipeline.process_frame(vec![det(5, bbox)], 2, 2.0 / FPS);
        assert_eq!(ctx.occupied_slots, 1);
        assert_eq!(ctx.slots[0].occupying_track, Some(5));
        assert_eq!(ctx.slots[0].total_occupancies, 1);

        let events = pipeline.bus.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, ParkingEvent::SlotOccupied { slot_id: 1, track_id: 5, .. })));
    }

    #[test]
    fn test_stationary_vehicle_emits_parked_event_near_five_seconds() {
        let mut pipeline = ParkingPipeline::new(Config::default(), slot_defs());
        let bbox = [100.0, 100.0, 200.0, 200.0];

        for frame in 1..=180u64 {
            pipeline.process_frame(vec![det(9, bbox)], frame, frame as f64 / FPS);
        }

        let events = pipeline.bus.drain();
        let parked_at = events.iter().find_map(|e| match e {
            ParkingEvent::VehicleParked {
                track_id: 9,
                timestamp,
                ..
            } => Some(*timestamp),
            _ => None,
        });

        let at = parked_at.expect("expected a VehicleParked event");
        assert!(at >= 5.0 && at < 5.5, "parked at {}", at);
    }

    #[test]
    fn test_duplicate_boxes_spawn_single_track() {
        let mut pipeline = ParkingPipeline::new(Config::default(), slot_defs());

        let strong = det(1, [0.0, 0.0, 100.0, 100.0]);
        let weak = Detection {
            confidence: 0.6,
            track_id: Some(2),
            ..det(2, [5.0, 5.0, 105.0, 105.0])
        };

        let ctx = pipeline.process_frame(vec![strong, weak], 1, 1.0 / FPS);
        assert_eq!(ctx.tracking.active, 1);
        assert_eq!(ctx.stable_detections, 1);
    }

    #[test]
    fn test_fallback_mode_tracks_without_external_ids() {
        let mut config = Config::default();
        config.tracking.identity = IdentityMode::Fallback;
        let mut pipeline = ParkingPipeline::new(config, slot_defs());

        let anonymous = Detection {
            bbox: [10.0, 10.0, 90.0, 90.0],
            confidence: 0.9,
            class: VehicleClass::Car,
            track_id: None,
        };

        for frame in 1..=5u64 {
            pipeline.process_frame(vec![anonymous], frame, frame as f64 / FPS);
        }

        assert_eq!(pipeline.tracking().active_count(), 1);
    }

    #[test]
    fn test_external_mode_drops_anonymous_detections() {
        let mut pipeline = ParkingPipeline::new(Config::default(), slot_defs());

        let anonymous = Detection {
            bbox: [10.0, 10.0, 90.0, 90.0],
            confidence: 0.9,
            class: VehicleClass::Car,
            track_id: None,
        };

        for frame in 1..=5u64 {
            pipeline.process_frame(vec![anonymous], frame, frame as f64 / FPS);
        }

        assert_eq!(pipeline.tracking().active_count(), 0);
    }

    #[test]
    fn test_zone_excludes_tracks_from_slot_matching() {
        let mut config = Config::default();
        // Zone far away from the slot polygon
        config.zone.points = Some(vec![
            [1000.0, 1000.0],
            [1200.0, 1000.0],
            [1200.0, 1200.0],
            [1000.0, 1200.0],
        ]);
        let mut pipeline = ParkingPipeline::new(config, slot_defs());

        let bbox = [10.0, 10.0, 90.0, 90.0];
        for frame in 1..=10u64 {
            let ctx = pipeline.process_frame(vec![det(3, bbox)], frame, frame as f64 / FPS);
            assert_eq!(ctx.occupied_slots, 0);
        }
    }

    #[test]
    fn test_capacity_estimation_tracks_peak_parked() {
        let mut pipeline = ParkingPipeline::new(Config::default(), slot_defs());
        let bbox = [100.0, 100.0, 200.0, 200.0];

        for frame in 1..=200u64 {
            pipeline.process_frame(vec![det(9, bbox)], frame, frame as f64 / FPS);
        }

        // One vehicle parked at peak, plus headroom
        assert_eq!(pipeline.estimated_capacity(), 3);
    }
}
