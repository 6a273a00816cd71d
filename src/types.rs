use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub inference: InferenceConfig,
    pub video: VideoConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    pub input_size: usize,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub device: Device,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/yolov8n.onnx".to_string(),
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            device: Device::Cpu,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub num_threads: usize,
    pub process_every_n_frames: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            process_every_n_frames: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub input: String,
    /// Explicit output file. Only honored for a single-file input;
    /// directory inputs always write into `output_dir`.
    pub output: Option<String>,
    pub output_dir: String,
    pub save_frames: bool,
    pub frame_output_dir: String,
    pub save_detections: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            input: "data/sample_video.mp4".to_string(),
            output: None,
            output_dir: "data/output".to_string(),
            save_frames: false,
            frame_output_dir: "data/frames".to_string(),
            save_detections: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub window_name: String,
    pub font_scale: f64,
    pub font_thickness: i32,
    pub box_thickness: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_name: "Vehicle Detection".to_string(),
            font_scale: 0.5,
            font_thickness: 2,
            box_thickness: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
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

/// Inference device for the ONNX Runtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}
