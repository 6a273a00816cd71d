// src/counts.rs

use crate::detector::{Detection, VEHICLE_CLASS_NAMES};

/// Tally of one frame's detections, in canonical class order. Classes with
/// no detections are present with a zero count.
pub fn per_frame_counts(detections: &[Detection]) -> Vec<(&'static str, usize)> {
    VEHICLE_CLASS_NAMES
        .iter()
        .map(|&(class_id, name)| {
            let count = detections.iter().filter(|d| d.class_id == class_id).count();
            (name, count)
        })
        .collect()
}

/// Running per-class totals for the whole run. Reset only at process start.
#[derive(Debug, Default)]
pub struct VehicleCounts {
    totals: [u64; VEHICLE_CLASS_NAMES.len()],
}

impl VehicleCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, detections: &[Detection]) {
        for detection in detections {
            if let Some(slot) = VEHICLE_CLASS_NAMES
                .iter()
                .position(|&(class_id, _)| class_id == detection.class_id)
            {
                self.totals[slot] += 1;
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.totals.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        VEHICLE_CLASS_NAMES
            .iter()
            .zip(self.totals.iter())
            .map(|(&(_, name), &count)| (name, count))
    }
}
