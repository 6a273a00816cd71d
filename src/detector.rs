// src/detector.rs

use crate::types::{Device, ModelConfig};
use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use serde::Serialize;
use tracing::{debug, info};

const YOLO_CLASSES: usize = 80;

// COCO class IDs for vehicles
pub const VEHICLE_CLASSES: [usize; 4] = [2, 3, 5, 7]; // car, motorcycle, bus, truck

pub const VEHICLE_CLASS_NAMES: [(usize, &str); 4] =
    [(2, "car"), (3, "motorcycle"), (5, "bus"), (7, "truck")];

#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

pub struct VehicleDetector {
    session: Session,
    input_size: usize,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl VehicleDetector {
    pub fn new(model: &ModelConfig, num_threads: usize) -> Result<Self> {
        info!("Loading YOLO model: {}", model.path);

        if !std::path::Path::new(&model.path).exists() {
            anyhow::bail!("Model file not found: {}", model.path);
        }

        let mut session_builder = Session::builder()?;

        if model.device == Device::Cuda {
            info!("Enabling CUDA execution provider");
            session_builder = session_builder.with_execution_providers([
                CUDAExecutionProvider::default().with_device_id(0).build(),
            ])?;
        }

        let session = session_builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(&model.path)
            .context("Failed to load model")?;

        info!("✓ Vehicle detector initialized (device: {})", model.device);

        Ok(Self {
            session,
            input_size: model.input_size,
            confidence_threshold: model.confidence_threshold,
            iou_threshold: model.iou_threshold,
        })
    }

    /// Detect vehicles in a single RGB frame.
    pub fn detect(&mut self, frame: &[u8], width: usize, height: usize) -> Result<Vec<Detection>> {
        // 1. Preprocess (letterbox + normalize)
        let (input, scale, pad_x, pad_y) = self.preprocess(frame, width, height);

        // 2. Run inference
        let output = self.infer(&input)?;

        // 3. Parse predictions, keeping only vehicle classes above threshold
        let mut detections = parse_predictions(&output, self.confidence_threshold);

        // 4. Map boxes back to original image coordinates
        for det in &mut detections {
            det.bbox =
                letterbox_to_source(det.bbox, scale, pad_x, pad_y, width as f32, height as f32);
        }

        // 5. Suppress duplicate boxes
        let detections = nms(detections, self.iou_threshold);

        debug!("Detected {} vehicles", detections.len());
        Ok(detections)
    }

    fn preprocess(&self, src: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, f32, f32, f32) {
        let target_size = self.input_size;
        let (scale, pad_x, pad_y) = letterbox_params(src_w, src_h, target_size);
        let scaled_w = (src_w as f32 * scale) as usize;
        let scaled_h = (src_h as f32 * scale) as usize;

        let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

        // Padded canvas, gray background
        let mut canvas = vec![114u8; target_size * target_size * 3];

        for y in 0..scaled_h {
            for x in 0..scaled_w {
                let src_idx = (y * scaled_w + x) * 3;
                let dst_x = x + pad_x as usize;
                let dst_y = y + pad_y as usize;
                let dst_idx = (dst_y * target_size + dst_x) * 3;
                canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
            }
        }

        // Normalize [0, 255] -> [0, 1] and convert HWC -> CHW
        let mut input = vec![0.0f32; 3 * target_size * target_size];
        for c in 0..3 {
            for h in 0..target_size {
                for w in 0..target_size {
                    let hwc_idx = (h * target_size + w) * 3 + c;
                    let chw_idx = c * target_size * target_size + h * target_size + w;
                    input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
                }
            }
        }

        (input, scale, pad_x, pad_y)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

/// Scale factor and padding that fit a source image inside a square
/// letterbox canvas while preserving aspect ratio.
pub fn letterbox_params(src_w: usize, src_h: usize, target_size: usize) -> (f32, f32, f32) {
    let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
    let scaled_w = (src_w as f32 * scale) as usize;
    let scaled_h = (src_h as f32 * scale) as usize;
    let pad_x = (target_size - scaled_w) as f32 / 2.0;
    let pad_y = (target_size - scaled_h) as f32 / 2.0;
    (scale, pad_x, pad_y)
}

/// Undo the letterbox transform, clamping to the source frame bounds.
pub fn letterbox_to_source(
    bbox: [f32; 4],
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    src_w: f32,
    src_h: f32,
) -> [f32; 4] {
    [
        ((bbox[0] - pad_x) / scale).clamp(0.0, src_w),
        ((bbox[1] - pad_y) / scale).clamp(0.0, src_h),
        ((bbox[2] - pad_x) / scale).clamp(0.0, src_w),
        ((bbox[3] - pad_y) / scale).clamp(0.0, src_h),
    ]
}

/// Parse the raw YOLOv8 output tensor.
///
/// Layout is [1, 4 + classes, predictions] flattened attribute-major:
/// `output[attr * stride + i]` for prediction `i`. Boxes come out in
/// letterbox coordinates, center format, and are converted to corners here.
/// Predictions below the confidence threshold or outside the vehicle
/// allow-list are dropped.
pub fn parse_predictions(output: &[f32], conf_thresh: f32) -> Vec<Detection> {
    let stride = output.len() / (4 + YOLO_CLASSES);
    let mut detections = Vec::new();

    for i in 0..stride {
        let cx = output[i];
        let cy = output[stride + i];
        let w = output[stride * 2 + i];
        let h = output[stride * 3 + i];

        // Find best class
        let mut max_conf = 0.0f32;
        let mut best_class = 0;

        for c in 0..YOLO_CLASSES {
            let conf = output[stride * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c;
            }
        }

        if max_conf < conf_thresh || !VEHICLE_CLASSES.contains(&best_class) {
            continue;
        }

        detections.push(Detection {
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            confidence: max_conf,
            class_id: best_class,
            class_name: class_id_to_name(best_class),
        });
    }

    detections
}

pub fn class_id_to_name(class_id: usize) -> String {
    match class_id {
        2 => "car",
        3 => "motorcycle",
        5 => "bus",
        7 => "truck",
        _ => "unknown",
    }
    .to_string()
}

/// Non-maximum suppression. Keeps the highest-confidence box of any
/// overlapping cluster.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let mut keep = Vec::new();

    while !detections.is_empty() {
        let current = detections.remove(0);
        keep.push(current.clone());

        detections.retain(|det| calculate_iou(&current.bbox, &det.bbox) < iou_threshold);
    }

    keep
}

pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    // Build a synthetic output tensor with `stride` predictions. Each entry:
    // (cx, cy, w, h, class_id, confidence).
    fn synthetic_output(preds: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<f32> {
        let stride = preds.len();
        let mut output = vec![0.0f32; stride * (4 + YOLO_CLASSES)];
        for (i, &(cx, cy, w, h, class_id, conf)) in preds.iter().enumerate() {
            output[i] = cx;
            output[stride + i] = cy;
            output[stride * 2 + i] = w;
            output[stride * 3 + i] = h;
            output[stride * (4 + class_id) + i] = conf;
        }
        output
    }

    #[test]
    fn parse_keeps_vehicle_above_threshold() {
        let output = synthetic_output(&[(100.0, 100.0, 40.0, 20.0, 2, 0.9)]);
        let detections = parse_predictions(&output, 0.25);

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_name, "car");
        assert_eq!(detections[0].bbox, [80.0, 90.0, 120.0, 110.0]);
        assert!((detections[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn parse_drops_non_vehicle_classes() {
        // person (0) and traffic light (9) at high confidence
        let output = synthetic_output(&[
            (100.0, 100.0, 40.0, 20.0, 0, 0.99),
            (200.0, 200.0, 40.0, 20.0, 9, 0.99),
            (300.0, 300.0, 40.0, 20.0, 7, 0.8),
        ]);
        let detections = parse_predictions(&output, 0.25);

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_name, "truck");
    }

    #[test]
    fn parse_drops_low_confidence() {
        let output = synthetic_output(&[(100.0, 100.0, 40.0, 20.0, 5, 0.1)]);
        assert!(parse_predictions(&output, 0.25).is_empty());
    }

    #[test]
    fn iou_of_half_overlapping_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [5.0, 0.0, 15.0, 10.0];
        // intersection 50, union 150
        assert!((calculate_iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [20.0, 20.0, 30.0, 30.0];
        assert_eq!(calculate_iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_suppresses_overlapping_lower_confidence() {
        let detections = vec![
            Detection {
                bbox: [0.0, 0.0, 10.0, 10.0],
                confidence: 0.6,
                class_id: 2,
                class_name: "car".to_string(),
            },
            Detection {
                bbox: [1.0, 1.0, 11.0, 11.0],
                confidence: 0.9,
                class_id: 2,
                class_name: "car".to_string(),
            },
            Detection {
                bbox: [100.0, 100.0, 120.0, 120.0],
                confidence: 0.5,
                class_id: 7,
                class_name: "truck".to_string(),
            },
        ];

        let kept = nms(detections, 0.45);

        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(kept[1].class_name, "truck");
    }

    #[test]
    fn letterbox_round_trip() {
        // 1280x720 into 640x640: scale 0.5, pad_y 140
        let (scale, pad_x, pad_y) = letterbox_params(1280, 720, 640);
        assert!((scale - 0.5).abs() < 1e-6);
        assert_eq!(pad_x, 0.0);
        assert_eq!(pad_y, 140.0);

        let source = [100.0, 200.0, 400.0, 600.0];
        let boxed = [
            source[0] * scale + pad_x,
            source[1] * scale + pad_y,
            source[2] * scale + pad_x,
            source[3] * scale + pad_y,
        ];
        let back = letterbox_to_source(boxed, scale, pad_x, pad_y, 1280.0, 720.0);
        for (a, b) in back.iter().zip(source.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn letterbox_to_source_clamps_to_frame() {
        let back = letterbox_to_source([-50.0, -50.0, 700.0, 700.0], 0.5, 0.0, 140.0, 1280.0, 720.0);
        assert_eq!(back[0], 0.0);
        assert_eq!(back[1], 0.0);
        assert_eq!(back[2], 1280.0);
        assert_eq!(back[3], 720.0);
    }

    #[test]
    fn unknown_class_id_maps_to_unknown() {
        assert_eq!(class_id_to_name(2), "car");
        assert_eq!(class_id_to_name(42), "unknown");
    }
}
