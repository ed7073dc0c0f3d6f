//! 越线计数 (Line-crossing counter)
//!
//! 每帧: 画计数线 → 画检测框 → 质心距离计数线小于阈值且 track_id 未计数过的目标 +1 → 画计数文字.
//! 同一 track_id 在一个 CountState 生命周期内最多计数一次.

pub mod annotator;

use std::collections::HashSet;

use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use annotator::{FrameAnnotator, OverlayStyle};

use crate::detection::{ClassNames, Detection};

/// 单个类别的计数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassTally {
    pub class_id: u32,
    pub name: String,
    pub count: u64,
}

/// 计数状态: 每个已知类别的数量 + 已计数的 track_id 集合
#[derive(Clone, Debug, Default)]
pub struct CountState {
    tallies: Vec<ClassTally>,
    counted: HashSet<u32>,
}

impl CountState {
    /// 所有已知类别初始化为 0, 顺序与类别表一致
    pub fn new(classes: &ClassNames) -> Self {
        let tallies = classes
            .iter()
            .map(|(class_id, name)| ClassTally {
                class_id,
                name: name.to_string(),
                count: 0,
            })
            .collect();
        Self {
            tallies,
            counted: HashSet::new(),
        }
    }

    /// 记录一次越线. 未知类别或已计数的 track_id 返回 false 且不改变状态
    pub fn record(&mut self, track_id: u32, class_id: u32) -> bool {
        if self.counted.contains(&track_id) {
            return false;
        }
        let Some(tally) = self.tallies.iter_mut().find(|t| t.class_id == class_id) else {
            return false;
        };
        tally.count += 1;
        self.counted.insert(track_id);
        true
    }

    pub fn get(&self, class_id: u32) -> Option<u64> {
        self.tallies
            .iter()
            .find(|t| t.class_id == class_id)
            .map(|t| t.count)
    }

    pub fn total(&self) -> u64 {
        self.tallies.iter().map(|t| t.count).sum()
    }

    pub fn is_counted(&self, track_id: u32) -> bool {
        self.counted.contains(&track_id)
    }

    pub fn counted_len(&self) -> usize {
        self.counted.len()
    }

    pub fn tallies(&self) -> &[ClassTally] {
        &self.tallies
    }
}

/// 计数线判定 + 绘制
#[derive(Clone, Debug)]
pub struct LineCounter {
    line_ratio: f32,
    threshold: f32,
    classes: ClassNames,
}

impl LineCounter {
    /// `line_ratio`: 计数线位于帧高的比例; `threshold`: 质心到线的最大距离 (像素, 严格小于)
    pub fn new(line_ratio: f32, threshold: f32, classes: ClassNames) -> Self {
        Self {
            line_ratio,
            threshold,
            classes,
        }
    }

    /// 计数线 y 坐标 (向下取整)
    pub fn line_y(&self, frame_height: u32) -> u32 {
        (frame_height as f32 * self.line_ratio) as u32
    }

    pub fn new_state(&self) -> CountState {
        CountState::new(&self.classes)
    }

    /// 纯计数 (不绘制), 返回本帧新增计数
    pub fn count(&self, detections: &[Detection], line_y: f32, state: &mut CountState) -> usize {
        detections
            .iter()
            .filter(|det| self.classes.contains(det.class_id))
            .filter(|det| self.near_line(det, line_y))
            .filter_map(|det| det.track_id.map(|id| (id, det.class_id)))
            .filter(|&(id, class_id)| state.record(id, class_id))
            .count()
    }

    fn near_line(&self, det: &Detection, line_y: f32) -> bool {
        let (_, cy) = det.centroid();
        (cy - line_y).abs() < self.threshold
    }

    /// 绘制并计数一帧, 返回本帧新增计数
    pub fn apply(
        &self,
        frame: &mut RgbImage,
        detections: &[Detection],
        state: &mut CountState,
        annotator: &FrameAnnotator,
    ) -> usize {
        let line_y = self.line_y(frame.height());
        annotator.draw_line(frame, line_y);

        for det in detections.iter().filter(|d| self.classes.contains(d.class_id)) {
            annotator.draw_box(frame, det);
        }
        let added = self.count(detections, line_y as f32, state);

        annotator.draw_counts(frame, state);
        added
    }
}
