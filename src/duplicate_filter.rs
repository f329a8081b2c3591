// src/duplicate_filter.rs
//
// A single physical vehicle can produce two overlapping boxes from the
// detector (one strong, one weaker secondary). Keeping the strongest box
// and dropping near-duplicates prevents double-counting and duplicate
// track creation downstream.

use crate::geometry::iou;
use crate::types::Detection;

/// Removes overlapping same-frame duplicates.
///
/// Detections are considered strongest-first; a detection survives unless
/// its IoU against an already-kept detection exceeds the threshold.
/// Discards are dropped, never merged. Ties in confidence keep the
/// original input order, so the pass is deterministic.
pub fn suppress_duplicates(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    if detections.len() < 2 {
        return detections.to_vec();
    }

    let mut ordered: Vec<Detection> = detections.to_vec();
    // sort_by is stable: equal confidences stay in input order
    ordered.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(ordered.len());

    for det in ordered {
        let duplicate = kept
            .iter()
            .any(|k| iou(&det.bbox, &k.bbox) > iou_threshold);
        if !duplicate {
            kept.push(det);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detection, VehicleClass};

    fn det(bbox: [f32; 4], confidence: f32) -> Detection {
        Detection {
            bbox,
            confidence,
            class: VehicleClass::Car,
            track_id: None,
        }
    }

    #[test]
    fn test_high_overlap_keeps_strongest_only() {
        // IoU of these two boxes is ~0.81, well above 0.65
        let dets = vec![
            det([0.0, 0.0, 100.0, 100.0], 0.9),
            det([5.0, 5.0, 105.0, 105.0], 0.6),
        ];

        let kept = suppress_duplicates(&dets, 0.65);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_disjoint_boxes_both_survive() {
        let dets = vec![
            det([0.0, 0.0, 100.0, 100.0], 0.9),
            det([300.0, 0.0, 400.0, 100.0], 0.6),
        ];
        assert_eq!(suppress_duplicates(&dets, 0.65).len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let dets = vec![
            det([0.0, 0.0, 100.0, 100.0], 0.9),
            det([5.0, 5.0, 105.0, 105.0], 0.6),
            det([300.0, 0.0, 400.0, 100.0], 0.7),
            det([305.0, 2.0, 402.0, 101.0], 0.5),
        ];

        let once = suppress_duplicates(&dets, 0.65);
        let twice = suppress_duplicates(&once, 0.65);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.bbox, b.bbox);
        }
    }

    #[test]
    fn test_confidence_tie_breaks_by_input_order() {
        let dets = vec![
            det([0.0, 0.0, 100.0, 100.0], 0.8),
            det([5.0, 5.0, 105.0, 105.0], 0.8),
        ];

        let kept = suppress_duplicates(&dets, 0.65);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bbox, [0.0, 0.0, 100.0, 100.0]);
    }

    #[test]
    fn test_empty_and_single_pass_through() {
        assert!(suppress_duplicates(&[], 0.65).is_empty());
        let one = vec![det([0.0, 0.0, 10.0, 10.0], 0.3)];
        assert_eq!(suppress_duplicates(&one, 0.65).len(), 1);
    }
}
