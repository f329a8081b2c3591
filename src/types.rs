use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub suppression: SuppressionConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub parking: ParkingConfig,
    #[serde(default)]
    pub occupancy: OccupancyConfig,
    #[serde(default)]
    pub zone: ZoneConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionConfig {
    /// Detections below this confidence are dropped at intake
    pub min_confidence: f32,
    /// IoU above which two same-frame boxes count as one physical vehicle
    pub iou_threshold: f32,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.15,
            iou_threshold: 0.65,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Frames of raw detections kept per identifier
    pub history_length: usize,
    /// Consecutive appearances required before an identifier passes the gate
    pub min_consistent_frames: usize,
    /// Detections above this confidence pass while the identifier is
    /// still short of min_consistent_frames
    pub instant_accept_confidence: f32,
    /// Average confidence floor over the history window
    pub min_average_confidence: f32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            history_length: 5,
            min_consistent_frames: 3,
            instant_accept_confidence: 0.6,
            min_average_confidence: 0.35,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Identifiers come from the upstream tracker on every detection
    External,
    /// No upstream identity; greedy IoU association assigns internal ids.
    /// Weaker guarantees under occlusion and crossing paths.
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub identity: IdentityMode,
    /// Maximum simultaneously tracked vehicles; new ids beyond this are dropped
    pub max_tracks: usize,
    /// Frames a lost track is retained before permanent eviction (~1s at 30fps)
    pub grace_frames: u64,
    /// Fallback mode: minimum IoU to re-associate a detection with a known box
    pub fallback_iou_threshold: f32,
    /// Fallback mode: frames an unseen internal id is remembered
    pub fallback_retention_frames: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            identity: IdentityMode::External,
            max_tracks: 30,
            grace_frames: 30,
            fallback_iou_threshold: 0.3,
            fallback_retention_frames: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkingConfig {
    /// Position samples retained per track (150 ≈ 5s at 30fps)
    pub history_capacity: usize,
    /// Trailing window for the displacement speed estimate, seconds
    pub speed_window_secs: f64,
    /// Below this many samples in the window, speed is unknown and the
    /// previous parked/moving decision is held
    pub min_window_samples: usize,
    /// Positional variance (px^2, x + y) under which speed is forced to zero
    pub variance_floor_px2: f64,
    /// Speed below this starts/continues the stationary timer, px/s
    pub entry_speed_px_s: f64,
    /// Stationary time required before a track counts as parked, seconds
    pub entry_duration_secs: f64,
    /// Speed that must be sustained to leave the parked state, px/s
    pub exit_speed_px_s: f64,
    /// How long exit-level speed must be sustained, seconds
    pub exit_duration_secs: f64,
    /// Raw class labels kept for majority-vote smoothing
    pub class_vote_window: usize,
}

impl Default for ParkingConfig {
    fn default() -> Self {
        Self {
            history_capacity: 150,
            speed_window_secs: 5.0,
            min_window_samples: 5,
            variance_floor_px2: 100.0,
            entry_speed_px_s: 8.0,
            entry_duration_secs: 5.0,
            exit_speed_px_s: 15.0,
            exit_duration_secs: 3.0,
            class_vote_window: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyConfig {
    /// Slot definition file, JSON: {"slots": [{"id": .., "points": [[x,y], ..]}]}
    pub slots_path: String,
    /// Overlap ratio a vehicle must exceed for a vacant slot to fill
    pub occupy_threshold: f32,
    /// Overlap ratio below which an occupied slot starts vacating
    pub vacate_threshold: f32,
    /// Consecutive qualifying frames before a vacant slot flips occupied
    pub occupy_confirm_frames: u32,
    /// Consecutive low-overlap frames before an occupied slot flips vacant
    pub vacate_confirm_frames: u32,
    /// Overlap under this vacates after a single frame (abrupt departure)
    pub fast_vacate_overlap: f32,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            slots_path: "configs/parking_slots.json".to_string(),
            occupy_threshold: 0.4,
            vacate_threshold: 0.2,
            occupy_confirm_frames: 2,
            vacate_confirm_frames: 2,
            fast_vacate_overlap: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ZoneConfig {
    /// Optional polygon restricting which tracks are eligible for
    /// parked/moving reporting. Unset = no restriction.
    pub points: Option<Vec<[f32; 2]>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Directory searched (recursively) for .jsonl detection feeds
    pub input_dir: String,
    pub output_dir: String,
    /// Log a progress line every this many frames
    pub progress_interval: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            input_dir: "feeds".to_string(),
            output_dir: "output".to_string(),
            progress_interval: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Bus,
    Truck,
    #[default]
    Unknown,
}

impl VehicleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Motorcycle => "motorcycle",
            Self::Bus => "bus",
            Self::Truck => "truck",
            Self::Unknown => "unknown",
        }
    }
}

/// One raw detector output for one frame. Passed by value; nothing owns it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Detection {
    /// x1, y1, x2, y2 in pixels, x2 > x1, y2 > y1
    pub bbox: [f32; 4],
    pub confidence: f32,
    #[serde(default)]
    pub class: VehicleClass,
    /// Identifier assigned by the upstream tracker; absent in fallback mode
    #[serde(default)]
    pub track_id: Option<i64>,
}

/// One line of a detection feed: everything the detector saw on one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_id: u64,
    /// Seconds on the feed's clock
    pub timestamp: f64,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackStatus {
    Moving,
    /// Stationary, but not yet long enough to count as parked
    Stopped,
    Parked,
}
