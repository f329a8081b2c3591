// src/zone.rs

use crate::geometry::point_in_polygon;

/// Optional polygon restricting which tracks count for parked/moving
/// reporting and slot matching. No polygon means no restriction.
#[derive(Debug, Clone, Default)]
pub struct ParkingZone {
    points: Option<Vec<[f32; 2]>>,
}

impl ParkingZone {
    pub fn new(points: Option<Vec<[f32; 2]>>) -> Self {
        Self { points }
    }

    pub fn contains_point(&self, point: (f32, f32)) -> bool {
        match &self.points {
            Some(points) => point_in_polygon(point, points),
            None => true,
        }
    }

    /// Eligibility is judged by the bbox center, matching how the zone is
    /// drawn: a vehicle straddling the boundary belongs to wherever its
    /// center sits.
    pub fn contains_bbox(&self, bbox: &[f32; 4]) -> bool {
        self.contains_point(((bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_zone_accepts_everything() {
        let zone = ParkingZone::new(None);
        assert!(zone.contains_point((1e6, -1e6)));
        assert!(zone.contains_bbox(&[0.0, 0.0, 10.0, 10.0]));
    }

    #[test]
    fn test_restricted_zone_filters_by_center() {
        let zone = ParkingZone::new(Some(vec![
            [0.0, 0.0],
            [100.0, 0.0],
            [100.0, 100.0],
            [0.0, 100.0],
        ]));

        assert!(zone.contains_bbox(&[40.0, 40.0, 60.0, 60.0]));
        // Center at (150, 50) is outside even though the box clips the zone
        assert!(!zone.contains_bbox(&[90.0, 0.0, 210.0, 100.0]));
    }
}
