// src/annotation.rs

use crate::detector::Detection;
use crate::types::DisplayConfig;
use anyhow::Result;
use opencv::{core, imgproc, prelude::*};

/// BGR color per vehicle class.
fn class_color(class_id: usize) -> core::Scalar {
    match class_id {
        2 => core::Scalar::new(0.0, 255.0, 0.0, 0.0),   // car: green
        3 => core::Scalar::new(255.0, 0.0, 0.0, 0.0),   // motorcycle: blue
        5 => core::Scalar::new(0.0, 0.0, 255.0, 0.0),   // bus: red
        7 => core::Scalar::new(255.0, 255.0, 0.0, 0.0), // truck: cyan
        _ => core::Scalar::new(0.0, 255.0, 0.0, 0.0),
    }
}

/// Draw one bounding box and label per detection onto a BGR frame.
pub fn draw_detections(
    frame: &mut Mat,
    detections: &[Detection],
    display: &DisplayConfig,
) -> Result<()> {
    let width = frame.cols();
    let height = frame.rows();

    for detection in detections {
        let [x1, y1, x2, y2] = clamp_bbox(detection.bbox, width, height);
        let color = class_color(detection.class_id);

        imgproc::rectangle(
            frame,
            core::Rect::new(x1, y1, (x2 - x1).max(1), (y2 - y1).max(1)),
            color,
            display.box_thickness,
            imgproc::LINE_8,
            0,
        )?;

        let label = format!("{} {:.2}", detection.class_name, detection.confidence);
        let mut baseline = 0;
        let text_size = imgproc::get_text_size(
            &label,
            imgproc::FONT_HERSHEY_SIMPLEX,
            display.font_scale,
            display.font_thickness,
            &mut baseline,
        )?;

        // Filled label background above the box
        imgproc::rectangle(
            frame,
            core::Rect::new(
                x1,
                (y1 - text_size.height - 5).max(0),
                text_size.width,
                text_size.height + 5,
            ),
            color,
            -1,
            imgproc::LINE_8,
            0,
        )?;

        imgproc::put_text(
            frame,
            &label,
            core::Point::new(x1, (y1 - 5).max(text_size.height)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            display.font_scale,
            core::Scalar::new(0.0, 0.0, 0.0, 0.0),
            display.font_thickness,
            imgproc::LINE_8,
            false,
        )?;
    }

    Ok(())
}

/// Draw the per-frame vehicle tally down the left edge. Classes with a
/// zero count are skipped.
pub fn draw_count_overlay(frame: &mut Mat, counts: &[(&str, usize)]) -> Result<()> {
    let mut y_pos = 30;

    for (class_name, count) in counts {
        if *count == 0 {
            continue;
        }

        imgproc::put_text(
            frame,
            &format!("{}: {}", class_name, count),
            core::Point::new(10, y_pos),
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            core::Scalar::new(0.0, 255.0, 0.0, 0.0),
            2,
            imgproc::LINE_8,
            false,
        )?;
        y_pos += 40;
    }

    Ok(())
}

fn clamp_bbox(bbox: [f32; 4], width: i32, height: i32) -> [i32; 4] {
    [
        (bbox[0].round() as i32).clamp(0, width - 1),
        (bbox[1].round() as i32).clamp(0, height - 1),
        (bbox[2].round() as i32).clamp(0, width - 1),
        (bbox[3].round() as i32).clamp(0, height - 1),
    ]
}
