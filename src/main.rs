// src/main.rs

mod association;
mod config;
mod detection_feed;
mod duplicate_filter;
mod geometry;
mod occupancy;
mod pipeline;
mod stability;
mod track;
mod tracking;
mod types;
mod zone;

use anyhow::Result;
use detection_feed::FeedProcessor;
use occupancy::load_slot_defs;
use pipeline::{ParkingEvent, ParkingPipeline};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use types::Config;

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());

    let config = Config::load(Path::new(&config_path))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parking_occupancy={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🅿️  Parking Occupancy Engine Starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Parking thresholds: entry={} px/s over {}s, exit={} px/s over {}s",
        config.parking.entry_speed_px_s,
        config.parking.entry_duration_secs,
        config.parking.exit_speed_px_s,
        config.parking.exit_duration_secs
    );
    info!(
        "Occupancy thresholds: occupy>{:.2} x{} frames, vacate<{:.2}",
        config.occupancy.occupy_threshold,
        config.occupancy.occupy_confirm_frames,
        config.occupancy.vacate_threshold
    );

    let slot_defs = load_slot_defs(Path::new(&config.occupancy.slots_path))?;

    let feed_processor = FeedProcessor::new(config.feed.clone());
    let feed_files = feed_processor.find_feed_files()?;

    if feed_files.is_empty() {
        error!("No detection feeds found in {}", config.feed.input_dir);
        anyhow::bail!("no .jsonl feeds under {}", config.feed.input_dir);
    }

    info!("Found {} feed(s) to process", feed_files.len());

    for (idx, feed_path) in feed_files.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing feed {}/{}: {}",
            idx + 1,
            feed_files.len(),
            feed_path.display()
        );
        info!("========================================");

        match process_feed(feed_path, &config, slot_defs.clone(), &feed_processor) {
            Ok(stats) => {
                info!("✓ Feed processed");
                info!("  Frames: {}", stats.frames);
                info!("  Events written: {}", stats.events_written);
                if stats.skipped_lines > 0 {
                    warn!("  Malformed lines skipped: {}", stats.skipped_lines);
                }
            }
            Err(e) => {
                error!("Failed to process feed: {}", e);
            }
        }
    }

    Ok(())
}

struct FeedStats {
    frames: u64,
    events_written: u64,
    skipped_lines: u64,
}

fn process_feed(
    feed_path: &Path,
    config: &Config,
    slot_defs: Vec<occupancy::SlotDef>,
    feed_processor: &FeedProcessor,
) -> Result<FeedStats> {
    let mut reader = feed_processor.open_feed(feed_path)?;
    let mut writer = feed_processor.create_event_writer(feed_path)?;

    // Fresh state per feed: tracks and slot timers never leak across feeds
    let mut pipeline = ParkingPipeline::new(config.clone(), slot_defs);

    let mut frames: u64 = 0;
    let mut last_timestamp = 0.0f64;

    while let Some(record) = reader.read_frame()? {
        frames += 1;
        last_timestamp = record.timestamp;

        let ctx = pipeline.process_frame(record.detections, record.frame_id, record.timestamp);

        for event in pipeline.bus.drain() {
            log_event(&event);
            writer.write_event(&event)?;
        }

        if frames % config.feed.progress_interval == 0 {
            info!(
                "Frame {} | t={:.1}s | active: {} | parked: {} | slots occupied: {}/{} | {:.1} fps",
                ctx.frame_id,
                ctx.timestamp,
                ctx.tracking.active,
                ctx.tracking.parked,
                ctx.occupied_slots,
                ctx.slots.len(),
                pipeline.metrics.fps()
            );
        }
    }

    writer.flush()?;
    info!(
        "💾 {} event(s) written to {}",
        writer.events_written,
        writer.path.display()
    );
    let summary_path = feed_processor.write_summary(feed_path, &pipeline.metrics.summary())?;
    info!("💾 Summary written to {}", summary_path.display());
    print_report(&pipeline, last_timestamp);

    Ok(FeedStats {
        frames,
        events_written: writer.events_written,
        skipped_lines: reader.skipped_lines,
    })
}

fn log_event(event: &ParkingEvent) {
    match event {
        ParkingEvent::VehicleParked {
            track_id,
            class,
            timestamp,
            ..
        } => info!(
            "🚗 Vehicle {} ({}) PARKED at {:.1}s",
            track_id,
            class.as_str(),
            timestamp
        ),
        ParkingEvent::VehicleUnparked {
            track_id,
            parked_secs,
            ..
        } => info!(
            "🚗 Vehicle {} left after {} parked",
            track_id,
            format_duration(*parked_secs)
        ),
        ParkingEvent::SlotOccupied {
            slot_id,
            track_id,
            timestamp,
        } => info!(
            "🔴 Slot {} occupied by vehicle {} at {:.1}s",
            slot_id, track_id, timestamp
        ),
        ParkingEvent::SlotOccupantChanged {
            slot_id, track_id, ..
        } => info!("🔁 Slot {} occupant replaced by vehicle {}", slot_id, track_id),
        ParkingEvent::SlotVacated {
            slot_id,
            duration_secs,
            ..
        } => info!(
            "🟢 Slot {} vacated after {}",
            slot_id,
            format_duration(*duration_secs)
        ),
        _ => {}
    }
}

fn print_report(pipeline: &ParkingPipeline, last_timestamp: f64) {
    let tracking = pipeline.tracking().stats();
    let summary = pipeline.metrics.summary();

    info!("📊 Final Report:");
    info!("  Frames processed: {}", summary.total_frames);
    info!(
        "  Detections: {} in, {} below floor, {} duplicates, {} unstable",
        summary.detections_in,
        summary.below_confidence_floor,
        summary.duplicates_suppressed,
        summary.unstable_filtered
    );
    info!(
        "  Tracks: {} created, {} restored after occlusion, {} evicted",
        summary.tracks_created, summary.tracks_restored, summary.tracks_evicted
    );
    info!(
        "  Currently: {} active ({} parked), {} lost",
        tracking.active, tracking.parked, tracking.lost
    );
    info!(
        "  Parking events: {} parked, {} unparked",
        summary.park_events, summary.unpark_events
    );

    for slot in pipeline.occupancy().slots() {
        let current = if slot.is_occupied {
            format!(
                "occupied by {} for {}",
                slot.occupying_track
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                format_duration(slot.occupied_duration(last_timestamp))
            )
        } else {
            "vacant".to_string()
        };
        info!(
            "  Slot {}: {} | {} occupancies, {} total",
            slot.id,
            current,
            slot.total_occupancies,
            format_duration(slot.total_duration)
        );
    }

    info!(
        "  Occupancy: {}/{} slots ({:.0}%)",
        pipeline.occupancy().occupied_count(),
        pipeline.occupancy().slot_count(),
        pipeline.occupancy().occupancy_rate() * 100.0
    );
    if pipeline.estimated_capacity() > 0 {
        info!("  Estimated lot capacity: {}", pipeline.estimated_capacity());
    }
    info!("  Processing speed: {:.1} FPS", summary.fps);
}

fn format_duration(seconds: f64) -> String {
    let secs = seconds.max(0.0) as u64;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::format_duration;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45.9), "45s");
        assert_eq!(format_duration(125.0), "2m5s");
        assert_eq!(format_duration(3725.0), "1h2m");
        assert_eq!(format_duration(-3.0), "0s");
    }
}
