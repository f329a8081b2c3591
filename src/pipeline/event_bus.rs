// src/pipeline/event_bus.rs
//
// Decoupled event delivery: the pipeline publishes transitions, the
// caller drains them once per frame and decides what to log or persist.

use crate::types::VehicleClass;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParkingEvent {
    TrackCreated {
        track_id: i64,
        class: VehicleClass,
        frame_id: u64,
        timestamp: f64,
    },
    TrackRestored {
        track_id: i64,
        frame_id: u64,
        timestamp: f64,
    },
    TrackEvicted {
        track_id: i64,
        frame_id: u64,
        timestamp: f64,
    },
    VehicleParked {
        track_id: i64,
        class: VehicleClass,
        timestamp: f64,
        stationary_secs: f64,
    },
    VehicleUnparked {
        track_id: i64,
        class: VehicleClass,
        timestamp: f64,
        parked_secs: f64,
    },
    SlotOccupied {
        slot_id: i64,
        track_id: i64,
        timestamp: f64,
    },
    SlotOccupantChanged {
        slot_id: i64,
        track_id: i64,
        timestamp: f64,
    },
    SlotVacated {
        slot_id: i64,
        duration_secs: f64,
        timestamp: f64,
    },
}

pub struct EventBus {
    events: VecDeque<ParkingEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: ParkingEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<ParkingEvent> {
        self.events.drain(..).collect()
    }

    #[allow(dead_code)]
    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}
