// src/association.rs
//
// Headless fallback identity. Without an upstream association tracker
// there is no stable identifier per physical object, so detections are
// matched to the previous frame's boxes by greedy IoU. This is a
// materially weaker approximation: ID switches under occlusion or
// crossing paths are possible, which the external-identity path rules
// out. The mode is selected by configuration, never inferred per frame.

use crate::geometry::iou;
use crate::types::{Detection, VehicleClass};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Remembered {
    bbox: [f32; 4],
    class: VehicleClass,
    last_seen_frame: u64,
}

pub struct ProximityTracker {
    next_id: i64,
    remembered: HashMap<i64, Remembered>,
    iou_threshold: f32,
    retention_frames: u64,
}

impl ProximityTracker {
    pub fn new(iou_threshold: f32, retention_frames: u64) -> Self {
        Self {
            next_id: 1,
            remembered: HashMap::new(),
            iou_threshold,
            retention_frames,
        }
    }

    /// Assigns an internal identifier to every detection in place.
    ///
    /// Strongest detections claim first so a weak box cannot steal a
    /// well-established identity. Each remembered identity is claimed at
    /// most once per frame; leftovers open new identifiers.
    pub fn assign(&mut self, detections: &mut [Detection], frame_id: u64) {
        let mut order: Vec<usize> = (0..detections.len()).collect();
        order.sort_by(|&a, &b| {
            detections[b]
                .confidence
                .partial_cmp(&detections[a].confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut claimed: Vec<i64> = Vec::new();

        for idx in order {
            let det = detections[idx];
            let mut best: Option<(i64, f32)> = None;

            for (id, mem) in &self.remembered {
                if claimed.contains(id) || mem.class != det.class {
                    continue;
                }
                let score = iou(&mem.bbox, &det.bbox);
                if score > self.iou_threshold && best.map_or(true, |(_, s)| score > s) {
                    best = Some((*id, score));
                }
            }

            let id = match best {
                Some((id, _)) => id,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    debug!("fallback id {} opened for {:?}", id, det.class);
                    id
                }
            };

            claimed.push(id);
            detections[idx].track_id = Some(id);
            self.remembered.insert(
                id,
                Remembered {
                    bbox: det.bbox,
                    class: det.class,
                    last_seen_frame: frame_id,
                },
            );
        }

        self.remembered
            .retain(|_, mem| frame_id - mem.last_seen_frame < self.retention_frames);
    }

    #[allow(dead_code)]
    pub fn known_identities(&self) -> usize {
        self.remembered.len()
    }

    #[allow(dead_code)]
    pub fn total_identities_opened(&self) -> i64 {
        self.next_id - 1
    }
}
