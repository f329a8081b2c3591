// src/stability.rs
//
// Frame-level gate in front of the tracking manager. One-frame false
// positives (shadows, reflections, partial occlusions misread as a new
// vehicle) never get to spawn a track; the cost is a few frames of
// latency before a genuinely new vehicle is admitted.

use crate::types::{Detection, StabilityConfig};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

pub struct StabilityFilter {
    history: HashMap<i64, VecDeque<f32>>,
    params: StabilityConfig,
}

impl StabilityFilter {
    pub fn new(params: StabilityConfig) -> Self {
        Self {
            history: HashMap::new(),
            params,
        }
    }

    /// Returns the subset of detections considered stable enough to reach
    /// the tracking manager. Detections without an identifier are dropped;
    /// identity must be resolved (externally or by the fallback associator)
    /// before this gate.
    pub fn filter(&mut self, detections: &[Detection]) -> Vec<Detection> {
        let mut stable = Vec::with_capacity(detections.len());
        let mut current_ids = HashSet::new();

        for det in detections {
            let track_id = match det.track_id {
                Some(id) => id,
                None => continue,
            };
            current_ids.insert(track_id);

            let history = self.history.entry(track_id).or_default();
            history.push_back(det.confidence);
            if history.len() > self.params.history_length {
                history.pop_front();
            }

            if history.len() >= self.params.min_consistent_frames {
                let avg = history.iter().sum::<f32>() / history.len() as f32;
                if avg > self.params.min_average_confidence {
                    stable.push(*det);
                } else {
                    debug!(
                        "id {} held back: avg confidence {:.2} below floor",
                        track_id, avg
                    );
                }
            } else if det.confidence > self.params.instant_accept_confidence {
                // Confident sightings pass while the identifier is still
                // warming up; only weak ones wait out the full window.
                stable.push(*det);
            }
        }

        // Absent identifiers with a full (stale) history are forgotten;
        // partial histories survive a short gap in case the id returns.
        self.history.retain(|id, history| {
            current_ids.contains(id) || history.len() < self.params.history_length
        });

        stable
    }

    #[allow(dead_code)]
    pub fn tracked_identifier_count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VehicleClass;

    fn det(id: i64, confidence: f32) -> Detection {
        Detection {
            bbox: [0.0, 0.0, 50.0, 50.0],
            confidence,
            class: VehicleClass::Car,
            track_id: Some(id),
        }
    }

    fn filter() -> StabilityFilter {
        StabilityFilter::new(StabilityConfig::default())
    }

    #[test]
    fn test_confident_new_id_accepted_immediately() {
        let mut f = filter();
        // Accepted on every frame of the warm-up window, not just the first
        assert_eq!(f.filter(&[det(1, 0.85)]).len(), 1);
        assert_eq!(f.filter(&[det(1, 0.85)]).len(), 1);
        assert_eq!(f.filter(&[det(1, 0.85)]).len(), 1);
    }

    #[test]
    fn test_weak_new_id_needs_consistent_frames() {
        let mut f = filter();

        assert!(f.filter(&[det(2, 0.5)]).is_empty());
        assert!(f.filter(&[det(2, 0.5)]).is_empty());
        // Third consecutive appearance with healthy average passes
        assert_eq!(f.filter(&[det(2, 0.5)]).len(), 1);
    }

    #[test]
    fn test_low_average_confidence_stays_blocked() {
        let mut f = filter();
        for _ in 0..5 {
            assert!(f.filter(&[det(3, 0.2)]).is_empty());
        }
    }

    #[test]
    fn test_missing_identifier_dropped() {
        let mut f = filter();
        let anonymous = Detection {
            track_id: None,
            ..det(0, 0.9)
        };
        assert!(f.filter(&[anonymous]).is_empty());
    }

    #[test]
    fn test_stale_full_history_forgotten() {
        let mut f = filter();
        for _ in 0..5 {
            f.filter(&[det(4, 0.5)]);
        }
        assert_eq!(f.tracked_identifier_count(), 1);

        // Frame without the id: full history gets evicted
        f.filter(&[]);
        assert_eq!(f.tracked_identifier_count(), 0);
    }
}
