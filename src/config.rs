// src/config.rs

use crate::types::{Config, Device};
use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

/// Vehicle recognition over video files and capture devices.
#[derive(Parser, Debug, Default)]
#[command(name = "vehicle-detection", version)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Input video file, directory of videos, or capture device index
    #[arg(short, long)]
    pub input: Option<String>,

    /// Output video path (single-file input only)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Confidence threshold for detections
    #[arg(long)]
    pub conf: Option<f32>,

    /// IoU threshold for non-maximum suppression
    #[arg(long)]
    pub iou: Option<f32>,

    /// Show a live window while processing
    #[arg(short, long)]
    pub display: bool,

    /// Path to the ONNX model
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Device to run inference on
    #[arg(long, value_enum)]
    pub device: Option<Device>,

    /// Run the detector on every Nth frame
    #[arg(long)]
    pub every_n: Option<u64>,

    /// Save each annotated frame as a JPEG
    #[arg(long)]
    pub save_frames: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load the config file if it exists, otherwise fall back to built-in
    /// defaults so the binary is usable with CLI flags alone.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// CLI flags win over file values.
    pub fn apply_cli(&mut self, args: &Args) {
        if let Some(input) = &args.input {
            self.video.input = input.clone();
        }
        if let Some(output) = &args.output {
            self.video.output = Some(output.to_string_lossy().into_owned());
        }
        if let Some(conf) = args.conf {
            self.model.confidence_threshold = conf;
        }
        if let Some(iou) = args.iou {
            self.model.iou_threshold = iou;
        }
        if args.display {
            self.display.enabled = true;
        }
        if let Some(model) = &args.model {
            self.model.path = model.to_string_lossy().into_owned();
        }
        if let Some(device) = args.device {
            self.model.device = device;
        }
        if let Some(every_n) = args.every_n {
            self.inference.process_every_n_frames = every_n.max(1);
        }
        if args.save_frames {
            self.video.save_frames = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.model.input_size, 640);
        assert!(config.model.confidence_threshold > 0.0);
        assert!(config.model.iou_threshold > 0.0);
        assert_eq!(config.inference.process_every_n_frames, 1);
        assert_eq!(config.model.device, Device::Cpu);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = r#"
model:
  confidence_threshold: 0.5
  device: cuda
video:
  input: clips/
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.model.confidence_threshold, 0.5);
        assert_eq!(config.model.device, Device::Cuda);
        assert_eq!(config.video.input, "clips/");
        // untouched sections keep their defaults
        assert_eq!(config.model.input_size, 640);
        assert_eq!(config.inference.num_threads, 4);
    }

    #[test]
    fn cli_overrides_file_values() {
        let mut config = Config::default();
        let args = Args {
            input: Some("dashcam.mp4".to_string()),
            conf: Some(0.6),
            device: Some(Device::Cuda),
            every_n: Some(3),
            display: true,
            save_frames: true,
            ..Default::default()
        };

        config.apply_cli(&args);

        assert_eq!(config.video.input, "dashcam.mp4");
        assert_eq!(config.model.confidence_threshold, 0.6);
        assert_eq!(config.model.device, Device::Cuda);
        assert_eq!(config.inference.process_every_n_frames, 3);
        assert!(config.display.enabled);
        assert!(config.video.save_frames);
    }

    #[test]
    fn every_n_is_clamped_to_one() {
        let mut config = Config::default();
        let args = Args {
            every_n: Some(0),
            ..Default::default()
        };
        config.apply_cli(&args);
        assert_eq!(config.inference.process_every_n_frames, 1);
    }
}
