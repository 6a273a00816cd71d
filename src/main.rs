// src/main.rs

mod annotation;
mod config;
mod counts;
mod detector;
mod scheduler;
mod stats;
mod types;
mod video_processor;

use anyhow::Result;
use clap::Parser;
use config::Args;
use counts::VehicleCounts;
use detector::VehicleDetector;
use indicatif::{ProgressBar, ProgressStyle};
use opencv::highgui;
use opencv::prelude::*;
use scheduler::FrameScheduler;
use stats::RunStats;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use types::Config;
use video_processor::{InputSource, VideoReader};

fn main() -> Result<()> {
    let args = Args::parse();

    let config_found = args.config.exists();
    let mut config = Config::load_or_default(&args.config)?;
    config.apply_cli(&args);

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("vehicle_detection={},ort=warn", config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    info!("🚗 Vehicle Detection System Starting");
    if config_found {
        info!("✓ Configuration loaded from {}", args.config.display());
    } else {
        warn!(
            "Config file {} not found, using built-in defaults",
            args.config.display()
        );
    }
    info!(
        "Detection thresholds: conf={:.2}, iou={:.2}, every_n={}",
        config.model.confidence_threshold,
        config.model.iou_threshold,
        config.inference.process_every_n_frames
    );

    let mut detector = VehicleDetector::new(&config.model, config.inference.num_threads)?;

    match video_processor::resolve_input(&config.video.input)? {
        InputSource::Device(index) => {
            let stem = format!("camera{}", index);
            let reader = VideoReader::open_device(index)?;
            let output = output_path(&config, &stem, true);
            process_video(reader, &output, &stem, &mut detector, &config)?;
        }
        InputSource::Files(files) => {
            let single = files.len() == 1;
            if !single && config.video.output.is_some() {
                warn!(
                    "Explicit output path ignored for multi-file input, writing to {}",
                    config.video.output_dir
                );
            }

            for (idx, video_path) in files.iter().enumerate() {
                info!(
                    "Processing video {}/{}: {}",
                    idx + 1,
                    files.len(),
                    video_path.display()
                );

                let stem = video_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("video")
                    .to_string();
                let reader = VideoReader::open_file(video_path)?;
                let output = output_path(&config, &stem, single);
                process_video(reader, &output, &stem, &mut detector, &config)?;
            }
        }
    }

    Ok(())
}

fn output_path(config: &Config, stem: &str, allow_explicit: bool) -> PathBuf {
    if allow_explicit {
        if let Some(output) = &config.video.output {
            return PathBuf::from(output);
        }
    }
    Path::new(&config.video.output_dir).join(format!("{}_annotated.mp4", stem))
}

fn process_video(
    mut reader: VideoReader,
    output_path: &Path,
    stem: &str,
    detector: &mut VehicleDetector,
    config: &Config,
) -> Result<()> {
    let mut writer =
        video_processor::create_writer(output_path, reader.width, reader.height, reader.fps)?;

    let mut frame_scheduler = FrameScheduler::new(config.inference.process_every_n_frames);
    let mut run_stats = RunStats::new();
    let mut vehicle_counts = VehicleCounts::new();

    let mut detections_log = if config.video.save_detections {
        std::fs::create_dir_all(&config.video.output_dir)?;
        let path = Path::new(&config.video.output_dir).join(format!("{}_detections.jsonl", stem));
        let file = std::fs::File::create(&path)?;
        info!("💾 Detections will be written to: {}", path.display());
        Some(file)
    } else {
        None
    };

    let progress = if reader.total_frames > 0 {
        let bar = ProgressBar::new(reader.total_frames as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} frames ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    } else {
        // Device streams do not report a frame count
        ProgressBar::new_spinner()
    };

    let mut stopped_early = false;

    while let Some(mut frame) = reader.read_frame()? {
        if frame_scheduler.should_run() {
            let rgb = video_processor::mat_to_rgb(&frame)?;

            let started = Instant::now();
            let detections =
                detector.detect(&rgb, reader.width as usize, reader.height as usize)?;
            run_stats.record_inference(started.elapsed());

            annotation::draw_detections(&mut frame, &detections, &config.display)?;
            annotation::draw_count_overlay(&mut frame, &counts::per_frame_counts(&detections))?;

            vehicle_counts.record(&detections);

            if let Some(log) = detections_log.as_mut() {
                if !detections.is_empty() {
                    let record = serde_json::json!({
                        "frame": reader.current_frame,
                        "timestamp_ms": reader.timestamp_ms(),
                        "detections": detections,
                    });
                    writeln!(log, "{}", record)?;
                }
            }

            if config.video.save_frames {
                video_processor::save_frame_jpeg(
                    Path::new(&config.video.frame_output_dir),
                    reader.current_frame,
                    &frame,
                )?;
            }

            writer.write(&frame)?;

            if config.display.enabled {
                highgui::imshow(&config.display.window_name, &frame)?;
                if highgui::wait_key(1)? == 'q' as i32 {
                    info!("Stopped by user");
                    stopped_early = true;
                }
            }
        } else {
            // Skipped frames pass through unmodified
            writer.write(&frame)?;
        }

        progress.inc(1);

        if stopped_early {
            break;
        }
    }

    progress.finish_and_clear();
    writer.release()?;
    if config.display.enabled {
        highgui::destroy_all_windows()?;
    }

    run_stats.frames_read = frame_scheduler.total_frames();
    debug!(
        "Detector ran on {} of {} frames",
        frame_scheduler.invocations(),
        frame_scheduler.total_frames()
    );

    report(stem, &run_stats, &vehicle_counts);
    Ok(())
}

fn report(stem: &str, stats: &RunStats, counts: &VehicleCounts) {
    let summary = stats.summary();

    info!("✓ Finished {}", stem);
    info!("  Frames read: {}", summary.frames_read);
    info!(
        "  Frames processed: {} ({} skipped)",
        summary.frames_processed,
        summary.frames_read - summary.frames_processed
    );
    info!(
        "  Mean inference latency: {:.1} ms",
        summary.mean_inference_ms
    );
    info!("  Detector FPS: {:.1}", summary.detector_fps);
    info!("  Pipeline FPS: {:.1}", summary.pipeline_fps);
    info!("  Vehicle totals ({} total):", counts.total());
    for (name, count) in counts.iter() {
        info!("    {}: {}", name, count);
    }
}
