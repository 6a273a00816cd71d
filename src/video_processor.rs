// src/video_processor.rs

use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat, Vector},
    imgcodecs, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// What the input string resolved to.
pub enum InputSource {
    /// Capture device index, e.g. "0" for the default camera.
    Device(i32),
    /// One or more video files.
    Files(Vec<PathBuf>),
}

/// Resolve the configured input: an existing file, a directory of videos,
/// or a bare integer naming a capture device.
pub fn resolve_input(input: &str) -> Result<InputSource> {
    let path = Path::new(input);

    if path.is_dir() {
        let files = find_video_files(path)?;
        if files.is_empty() {
            anyhow::bail!("No video files found in {}", input);
        }
        return Ok(InputSource::Files(files));
    }

    if path.is_file() {
        return Ok(InputSource::Files(vec![path.to_path_buf()]));
    }

    if let Ok(index) = input.parse::<i32>() {
        return Ok(InputSource::Device(index));
    }

    anyhow::bail!("Input video not found: {}", input)
}

pub fn find_video_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let video_extensions = ["mp4", "avi", "mov", "mkv", "MP4", "AVI", "MOV", "MKV"];

    let mut videos = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if video_extensions.contains(&ext.to_str().unwrap_or("")) {
                videos.push(path.to_path_buf());
            }
        }
    }
    videos.sort();

    info!("Found {} video file(s)", videos.len());
    Ok(videos)
}

pub struct VideoReader {
    cap: VideoCapture,
    pub fps: f64,
    pub total_frames: i64,
    pub current_frame: u64,
    pub width: i32,
    pub height: i32,
}

impl VideoReader {
    pub fn open_file(path: &Path) -> Result<Self> {
        info!("Opening video: {}", path.display());

        let cap = VideoCapture::from_file(
            path.to_str().context("Non-UTF-8 video path")?,
            videoio::CAP_ANY,
        )?;

        Self::from_capture(cap, &path.display().to_string())
    }

    pub fn open_device(index: i32) -> Result<Self> {
        info!("Opening capture device {}", index);

        let cap = VideoCapture::new(index, videoio::CAP_ANY)?;

        Self::from_capture(cap, &format!("device {}", index))
    }

    fn from_capture(cap: VideoCapture, source: &str) -> Result<Self> {
        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video source {}", source);
        }

        let mut fps = cap.get(videoio::CAP_PROP_FPS)?;
        let total_frames = cap.get(videoio::CAP_PROP_FRAME_COUNT)? as i64;
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        if fps <= 0.0 {
            warn!("Source reports no frame rate, assuming 30 FPS");
            fps = 30.0;
        }

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width,
            height,
            fps,
            if total_frames > 0 {
                total_frames.to_string()
            } else {
                "unknown".to_string()
            }
        );

        Ok(Self {
            cap,
            fps,
            total_frames,
            current_frame: 0,
            width,
            height,
        })
    }

    /// Read the next frame as a BGR `Mat`. `None` at end of stream.
    pub fn read_frame(&mut self) -> Result<Option<Mat>> {
        let mut mat = Mat::default();

        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;
        Ok(Some(mat))
    }

    pub fn timestamp_ms(&self) -> f64 {
        (self.current_frame as f64 / self.fps) * 1000.0
    }
}

pub fn create_writer(output_path: &Path, width: i32, height: i32, fps: f64) -> Result<VideoWriter> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!("Output video: {}", output_path.display());

    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let writer = VideoWriter::new(
        output_path.to_str().context("Non-UTF-8 output path")?,
        fourcc,
        fps,
        core::Size::new(width, height),
        true,
    )?;

    if !writer.is_opened()? {
        anyhow::bail!("Failed to open output video {}", output_path.display());
    }

    Ok(writer)
}

/// Convert a BGR frame to the packed RGB bytes the detector expects.
pub fn mat_to_rgb(mat: &Mat) -> Result<Vec<u8>> {
    let mut rgb_mat = Mat::default();
    imgproc::cvt_color(mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;
    Ok(rgb_mat.data_bytes()?.to_vec())
}

/// Save one annotated frame as `frame_{index:06}.jpg` under `dir`.
pub fn save_frame_jpeg(dir: &Path, frame_index: u64, frame: &Mat) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("frame_{:06}.jpg", frame_index));
    imgcodecs::imwrite(
        path.to_str().context("Non-UTF-8 frame path")?,
        frame,
        &Vector::<i32>::new(),
    )?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_missing_file() {
        let err = resolve_input("no/such/video.mp4").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn resolve_accepts_device_index() {
        match resolve_input("0").unwrap() {
            InputSource::Device(index) => assert_eq!(index, 0),
            InputSource::Files(_) => panic!("expected device source"),
        }
    }

    #[test]
    fn directory_scan_picks_up_video_extensions() {
        let dir = std::env::temp_dir().join("vehicle_detection_scan_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.join("b.MOV"), b"x").unwrap();
        std::fs::write(dir.join("notes.txt"), b"x").unwrap();

        let files = find_video_files(&dir).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a.mp4", "b.MOV"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
