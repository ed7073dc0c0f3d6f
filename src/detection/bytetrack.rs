//! ByteTrack 算法实现
//! ByteTrack: Simple and effective multi-object tracking
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU)
//! 3. 低分框救援丢失的轨迹
//! 4. 纯运动模型,无需外观特征

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tracker::{compute_iou, detection_box, KalmanBoxFilter, KalmanParams, Tracker};
use super::types::Detection;

/// ByteTrack 参数
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteTrackConfig {
    /// 最大允许丢失帧数
    pub max_lost_frames: u32,
    /// 高分检测阈值
    pub high_score_threshold: f32,
    /// 低分检测阈值 (用于救援)
    pub low_score_threshold: f32,
    /// 高分匹配 IOU 阈值
    pub high_iou_threshold: f32,
    /// 低分匹配 IOU 阈值
    pub low_iou_threshold: f32,
    pub kalman: KalmanParams,
}

impl Default for ByteTrackConfig {
    fn default() -> Self {
        Self {
            max_lost_frames: 30,
            high_score_threshold: 0.4,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.4,
            low_iou_threshold: 0.3,
            kalman: KalmanParams::default(),
        }
    }
}

/// 单条轨迹
#[derive(Clone, Debug)]
struct Track {
    id: u32,
    kalman: KalmanBoxFilter,
    class_id: u32,
    score: f32,
    frames_lost: u32,
    hits: u32,
}

impl Track {
    fn new(id: u32, det: &Detection, params: KalmanParams) -> Self {
        Self {
            id,
            kalman: KalmanBoxFilter::new(det, params),
            class_id: det.class_id,
            score: det.confidence,
            frames_lost: 0,
            hits: 1,
        }
    }

    fn update(&mut self, det: &Detection) {
        self.kalman.update(det);
        self.class_id = det.class_id;
        self.score = det.confidence;
        self.frames_lost = 0;
        self.hits += 1;
    }

    /// 本帧输出: 平滑后的框 + 匹配检测的类别与置信度
    fn output(&self) -> Detection {
        let (x1, y1, x2, y2) = self.kalman.state_box();
        Detection::new(x1, y1, x2, y2, self.class_id, self.score).with_track_id(self.id)
    }
}

/// ByteTrack 追踪器
pub struct ByteTracker {
    tracks: Vec<Track>,
    next_id: u32,
    config: ByteTrackConfig,
}

impl ByteTracker {
    pub fn new(config: ByteTrackConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            config,
        }
    }

    /// 已分配过的ID总数
    pub fn total_ids(&self) -> u32 {
        self.next_id - 1
    }

    /// 贪心 IOU 匹配, 返回 (检测下标, 轨迹下标). 轨迹已在本帧 predict, 直接用状态框匹配
    fn associate(
        &self,
        detections: &[Detection],
        det_indices: &[usize],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        if det_indices.is_empty() || track_indices.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for &d in det_indices {
            let det_box = detection_box(&detections[d]);
            for &t in track_indices {
                let iou = compute_iou(det_box, self.tracks[t].kalman.state_box());
                if iou >= iou_threshold {
                    candidates.push((1.0 - iou, d, t));
                }
            }
        }

        // 按代价排序
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut used_det = vec![false; detections.len()];
        let mut used_track = vec![false; self.tracks.len()];
        let mut pairs = Vec::new();
        for (_, d, t) in candidates {
            if !used_det[d] && !used_track[t] {
                used_det[d] = true;
                used_track[t] = true;
                pairs.push((d, t));
            }
        }
        pairs
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(ByteTrackConfig::default())
    }
}

impl Tracker for ByteTracker {
    fn update(&mut self, detections: &[Detection]) -> Vec<Detection> {
        // 1. 所有轨迹先预测
        for track in &mut self.tracks {
            track.kalman.predict();
        }

        // 2. 分离高低分检测框
        let mut high = Vec::new();
        let mut low = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.confidence >= self.config.high_score_threshold {
                high.push(idx);
            } else if det.confidence >= self.config.low_score_threshold {
                low.push(idx);
            }
        }

        let mut det_matched = vec![false; detections.len()];
        let mut track_matched = vec![false; self.tracks.len()];

        // 3. 第一轮: 高分检测 + 所有轨迹
        let all_tracks: Vec<usize> = (0..self.tracks.len()).collect();
        for (d, t) in self.associate(detections, &high, &all_tracks, self.config.high_iou_threshold) {
            det_matched[d] = true;
            track_matched[t] = true;
            self.tracks[t].update(&detections[d]);
        }

        // 4. 第二轮: 低分检测 + 未匹配轨迹 (救援)
        let unmatched: Vec<usize> = (0..self.tracks.len())
            .filter(|&t| !track_matched[t])
            .collect();
        for (d, t) in self.associate(detections, &low, &unmatched, self.config.low_iou_threshold) {
            det_matched[d] = true;
            track_matched[t] = true;
            self.tracks[t].update(&detections[d]);
        }

        // 5. 未匹配轨迹 → 标记丢失
        for (t, matched) in track_matched.iter().enumerate() {
            if !matched {
                self.tracks[t].frames_lost += 1;
            }
        }

        // 6. 未匹配高分检测 → 新建轨迹
        for &d in &high {
            if !det_matched[d] {
                let track = Track::new(self.next_id, &detections[d], self.config.kalman);
                debug!(track_id = self.next_id, class_id = detections[d].class_id, "新轨迹");
                self.tracks.push(track);
                self.next_id += 1;
            }
        }

        // 7. 删除丢失太久的轨迹
        let max_lost = self.config.max_lost_frames;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        self.tracks
            .iter()
            .filter(|t| t.frames_lost == 0)
            .map(Track::output)
            .collect()
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(x: f32, y: f32, conf: f32) -> Detection {
        Detection::new(x, y, x + 40.0, y + 30.0, 2, conf)
    }

    #[test]
    fn test_id_stable_across_frames() {
        let mut tracker = ByteTracker::default();
        let mut ids = Vec::new();
        for step in 0..8 {
            let y = 10.0 + step as f32 * 4.0;
            let out = tracker.update(&[car(50.0, y, 0.9)]);
            assert_eq!(out.len(), 1);
            ids.push(out[0].track_id.unwrap());
        }
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(tracker.total_ids(), 1);
    }

    #[test]
    fn test_separate_objects_get_distinct_ids() {
        let mut tracker = ByteTracker::default();
        let out = tracker.update(&[car(0.0, 0.0, 0.9), car(300.0, 0.0, 0.8)]);
        assert_eq!(out.len(), 2);
        assert_ne!(out[0].track_id, out[1].track_id);
        assert_eq!(tracker.track_count(), 2);
    }

    #[test]
    fn test_low_score_rescues_existing_track() {
        let mut tracker = ByteTracker::default();
        let first = tracker.update(&[car(100.0, 100.0, 0.9)]);
        let id = first[0].track_id;

        // 低分框不会新建轨迹, 但能续上已有轨迹
        let rescued = tracker.update(&[car(101.0, 101.0, 0.2)]);
        assert_eq!(rescued.len(), 1);
        assert_eq!(rescued[0].track_id, id);

        let mut fresh = ByteTracker::default();
        assert!(fresh.update(&[car(0.0, 0.0, 0.2)]).is_empty());
    }

    #[test]
    fn test_matches_against_one_step_prediction() {
        // 低分匹配阈值很高: 只有与本帧预测位置几乎重合的框才能续上轨迹
        let config = ByteTrackConfig {
            low_iou_threshold: 0.95,
            ..Default::default()
        };
        let mut tracker = ByteTracker::new(config);
        let id = tracker.update(&[car(0.0, 0.0, 0.9)])[0].track_id;
        // 下移 10px, 建立 vy ≈ 4
        assert_eq!(tracker.update(&[car(0.0, 10.0, 0.9)])[0].track_id, id);

        // 预测中心 cy ≈ 27.51, 对应 y1 ≈ 12.51
        let out = tracker.update(&[car(0.0, 12.5, 0.2)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].track_id, id);
        assert!((out[0].y1 - 12.5).abs() < 0.5, "y1 = {}", out[0].y1);
    }

    #[test]
    fn test_lost_tracks_expire() {
        let config = ByteTrackConfig {
            max_lost_frames: 2,
            ..Default::default()
        };
        let mut tracker = ByteTracker::new(config);
        tracker.update(&[car(0.0, 0.0, 0.9)]);
        for _ in 0..2 {
            assert!(tracker.update(&[]).is_empty());
            assert_eq!(tracker.track_count(), 1);
        }
        tracker.update(&[]);
        assert_eq!(tracker.track_count(), 0);

        tracker.reset();
        assert_eq!(tracker.total_ids(), 0);
    }
}
