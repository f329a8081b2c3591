use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration errors are the only fatal errors in the system; they
    /// must surface before any frame is processed.
    pub fn validate(&self) -> Result<()> {
        if self.parking.exit_speed_px_s < self.parking.entry_speed_px_s {
            bail!(
                "parking.exit_speed_px_s ({}) must not be below entry_speed_px_s ({})",
                self.parking.exit_speed_px_s,
                self.parking.entry_speed_px_s
            );
        }
        if self.parking.speed_window_secs <= 0.0 {
            bail!("parking.speed_window_secs must be positive");
        }
        if self.parking.history_capacity == 0 || self.parking.class_vote_window == 0 {
            bail!("parking history and class vote windows must be non-zero");
        }
        if self.occupancy.vacate_threshold >= self.occupancy.occupy_threshold {
            bail!(
                "occupancy.vacate_threshold ({}) must be below occupy_threshold ({})",
                self.occupancy.vacate_threshold,
                self.occupancy.occupy_threshold
            );
        }
        if self.occupancy.occupy_confirm_frames == 0 || self.occupancy.vacate_confirm_frames == 0 {
            bail!("occupancy confirm frame counts must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.suppression.iou_threshold) {
            bail!("suppression.iou_threshold must be within [0, 1]");
        }
        if self.tracking.max_tracks == 0 {
            bail!("tracking.max_tracks must be at least 1");
        }
        if let Some(points) = &self.zone.points {
            if points.len() < 3 {
                bail!("zone.points needs at least 3 vertices, got {}", points.len());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::types::Config;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_inverted_hysteresis_rejected() {
        let mut config = Config::default();
        config.parking.exit_speed_px_s = 4.0; // below entry threshold of 8
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_occupancy_thresholds_rejected() {
        let mut config = Config::default();
        config.occupancy.vacate_threshold = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_degenerate_zone_rejected() {
        let mut config = Config::default();
        config.zone.points = Some(vec![[0.0, 0.0], [10.0, 0.0]]);
        assert!(config.validate().is_err());
    }
}
