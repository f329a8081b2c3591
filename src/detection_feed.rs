// src/detection_feed.rs
//
// Boundary I/O around the core: detection feeds are JSON Lines files,
// one frame record per line, produced by the external detector/tracker.
// A malformed line is logged and skipped; it never aborts the feed.

use crate::pipeline::event_bus::ParkingEvent;
use crate::pipeline::metrics::MetricsSummary;
use crate::types::{FeedConfig, FrameRecord};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub struct FeedProcessor {
    config: FeedConfig,
}

impl FeedProcessor {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    pub fn find_feed_files(&self) -> Result<Vec<PathBuf>> {
        let mut feeds = Vec::new();

        for entry in WalkDir::new(&self.config.input_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("jsonl"))
            {
                feeds.push(path.to_path_buf());
            }
        }

        feeds.sort();
        info!("Found {} detection feed(s)", feeds.len());
        Ok(feeds)
    }

    pub fn open_feed(&self, path: &Path) -> Result<FeedReader> {
        info!("Opening feed: {}", path.display());
        let file =
            File::open(path).with_context(|| format!("opening feed {}", path.display()))?;

        Ok(FeedReader {
            lines: BufReader::new(file).lines(),
            path: path.to_path_buf(),
            current_line: 0,
            skipped_lines: 0,
        })
    }

    pub fn create_event_writer(&self, input_path: &Path) -> Result<EventWriter> {
        std::fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("creating output dir {}", self.config.output_dir))?;

        let stem = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("feed");
        let output_path =
            PathBuf::from(&self.config.output_dir).join(format!("{}_events.jsonl", stem));

        info!("Events will be written to: {}", output_path.display());

        let file = File::create(&output_path)
            .with_context(|| format!("creating {}", output_path.display()))?;

        Ok(EventWriter {
            file,
            path: output_path,
            events_written: 0,
        })
    }

    pub fn write_summary(&self, input_path: &Path, summary: &MetricsSummary) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("creating output dir {}", self.config.output_dir))?;

        let stem = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("feed");
        let path = PathBuf::from(&self.config.output_dir).join(format!("{}_summary.json", stem));

        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

pub struct FeedReader {
    lines: Lines<BufReader<File>>,
    pub path: PathBuf,
    pub current_line: u64,
    pub skipped_lines: u64,
}

impl FeedReader {
    /// Next frame record, skipping blank and malformed lines.
    pub fn read_frame(&mut self) -> Result<Option<FrameRecord>> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line.with_context(|| format!("reading {}", self.path.display()))?,
                None => return Ok(None),
            };
            self.current_line += 1;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<FrameRecord>(&line) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    self.skipped_lines += 1;
                    warn!(
                        "{}:{}: skipping malformed frame record: {}",
                        self.path.display(),
                        self.current_line,
                        e
                    );
                }
            }
        }
    }
}

pub struct EventWriter {
    file: File,
    pub path: PathBuf,
    pub events_written: u64,
}

impl EventWriter {
    pub fn write_event(&mut self, event: &ParkingEvent) -> Result<()> {
        let json_line = serde_json::to_string(event)?;
        writeln!(self.file, "{}", json_line)?;
        self.events_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("parking_feed_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_reader_skips_malformed_lines() {
        let dir = temp_dir("malformed");
        let feed_path = dir.join("cam1.jsonl");
        let mut f = File::create(&feed_path).unwrap();
        writeln!(
            f,
            r#"{{"frame_id": 1, "timestamp": 0.033, "detections": []}}"#
        )
        .unwrap();
        writeln!(f, "not json at all").unwrap();
        writeln!(
            f,
            r#"{{"frame_id": 2, "timestamp": 0.066, "detections": [{{"bbox": [0, 0, 50, 50], "confidence": 0.9, "class": "car", "track_id": 4}}]}}"#
        )
        .unwrap();

        let processor = FeedProcessor::new(FeedConfig {
            input_dir: dir.to_str().unwrap().to_string(),
            output_dir: dir.to_str().unwrap().to_string(),
            progress_interval: 100,
        });

        let mut reader = processor.open_feed(&feed_path).unwrap();
        let first = reader.read_frame().unwrap().unwrap();
        assert_eq!(first.frame_id, 1);

        let second = reader.read_frame().unwrap().unwrap();
        assert_eq!(second.frame_id, 2);
        assert_eq!(second.detections.len(), 1);
        assert_eq!(second.detections[0].track_id, Some(4));

        assert!(reader.read_frame().unwrap().is_none());
        assert_eq!(reader.skipped_lines, 1);
    }

    #[test]
    fn test_find_feed_files_filters_extension() {
        let dir = temp_dir("discovery");
        File::create(dir.join("a.jsonl")).unwrap();
        File::create(dir.join("b.JSONL")).unwrap();
        File::create(dir.join("notes.txt")).unwrap();

        let processor = FeedProcessor::new(FeedConfig {
            input_dir: dir.to_str().unwrap().to_string(),
            output_dir: dir.to_str().unwrap().to_string(),
            progress_interval: 100,
        });

        assert_eq!(processor.find_feed_files().unwrap().len(), 2);
    }

    #[test]
    fn test_summary_file_is_written() {
        let dir = temp_dir("summary");
        let processor = FeedProcessor::new(FeedConfig {
            input_dir: dir.to_str().unwrap().to_string(),
            output_dir: dir.join("out").to_str().unwrap().to_string(),
            progress_interval: 100,
        });

        let summary = crate::pipeline::metrics::ParkingMetrics::new().summary();
        let path = processor
            .write_summary(Path::new("cam1.jsonl"), &summary)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"total_frames\": 0"));
    }

    #[test]
    fn test_event_writer_appends_lines() {
        let dir = temp_dir("writer");
        let processor = FeedProcessor::new(FeedConfig {
            input_dir: dir.to_str().unwrap().to_string(),
            output_dir: dir.join("out").to_str().unwrap().to_string(),
            progress_interval: 100,
        });

        let mut writer = processor.create_event_writer(Path::new("cam1.jsonl")).unwrap();
        writer
            .write_event(&ParkingEvent::SlotVacated {
                slot_id: 3,
                duration_secs: 42.0,
                timestamp: 100.0,
            })
            .unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&writer.path).unwrap();
        assert!(contents.contains("\"slot_vacated\""));
        assert!(contents.contains("\"slot_id\":3"));
    }
}
