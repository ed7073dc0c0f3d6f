//! 多目标跟踪公共组件
//! Common components for multi-object tracking

use serde::{Deserialize, Serialize};

use super::types::Detection;

// ========== 卡尔曼滤波器 ==========

/// 卡尔曼滤波参数
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanParams {
    /// 过程噪声 q (0.1-1.0, 越小越平滑)
    pub process_noise: f32,
    /// 观测噪声 r (越大越信任预测)
    pub observation_noise: f32,
    /// 每帧速度保留比例
    pub velocity_decay: f32,
    /// 静止判定阈值 (像素/帧)
    pub stationary_threshold: f32,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            process_noise: 0.1,
            observation_noise: 0.5,
            velocity_decay: 0.95,
            stationary_threshold: 2.0,
        }
    }
}

/// 简化卡尔曼滤波器 (对角协方差), 状态: [cx, cy, w, h, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    p: [f32; 8],
    params: KalmanParams,
    stationary_frames: u32,
}

impl KalmanBoxFilter {
    pub fn new(det: &Detection, params: KalmanParams) -> Self {
        let (cx, cy) = det.centroid();
        Self {
            state: [cx, cy, det.width(), det.height(), 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            params,
            stationary_frames: 0,
        }
    }

    fn speed(&self) -> f32 {
        (self.state[4] * self.state[4] + self.state[5] * self.state[5]).sqrt()
    }

    /// 匀速模型预测一帧, 带速度衰减
    pub fn predict(&mut self) {
        let stationary = self.speed() < self.params.stationary_threshold;

        let (pos_decay, size_decay) = if stationary {
            self.stationary_frames += 1;
            // 连续静止3帧后大幅衰减
            let d = if self.stationary_frames > 3 {
                0.7
            } else {
                self.params.velocity_decay
            };
            (d, d)
        } else {
            self.stationary_frames = 0;
            (self.params.velocity_decay, 0.98)
        };

        self.state[4] *= pos_decay;
        self.state[5] *= pos_decay;
        self.state[6] *= size_decay;
        self.state[7] *= size_decay;

        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }

        let q = if stationary {
            self.params.process_noise * 0.5
        } else {
            self.params.process_noise
        };
        self.p.iter_mut().for_each(|p| *p += q);
    }

    /// 融合观测, 残差越大越信任预测
    pub fn update(&mut self, det: &Detection) {
        let (cx, cy) = det.centroid();
        let residual = [
            cx - self.state[0],
            cy - self.state[1],
            det.width() - self.state[2],
            det.height() - self.state[3],
        ];

        let jump = (residual[0] * residual[0] + residual[1] * residual[1]).sqrt();
        let r = if jump < self.params.stationary_threshold {
            self.params.observation_noise * 0.3
        } else if jump < 10.0 {
            self.params.observation_noise
        } else {
            self.params.observation_noise * 3.0
        };

        let mut gain = [0.0f32; 8];
        for i in 0..8 {
            let noise = if i < 4 { r } else { r * 10.0 };
            gain[i] = self.p[i] / (self.p[i] + noise);
        }

        let velocity_gain = if jump < self.params.stationary_threshold {
            0.3
        } else {
            1.0
        };
        for i in 0..4 {
            self.state[i] += gain[i] * residual[i];
            self.state[i + 4] += gain[i + 4] * residual[i] * velocity_gain;
        }

        for i in 0..8 {
            self.p[i] *= 1.0 - gain[i];
        }

        if jump >= self.params.stationary_threshold {
            self.stationary_frames = 0;
        }
    }

    fn to_box(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
        let w = w.max(1.0);
        let h = h.max(1.0);
        (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    /// 当前状态框 (x1, y1, x2, y2)
    pub fn state_box(&self) -> (f32, f32, f32, f32) {
        Self::to_box(self.state[0], self.state[1], self.state[2], self.state[3])
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker: Send {
    /// 输入当前帧检测框, 返回本帧匹配成功的检测 (已写入 track_id)
    fn update(&mut self, detections: &[Detection]) -> Vec<Detection>;

    /// 清除所有轨迹
    fn reset(&mut self);

    /// 当前轨迹数量 (含暂时丢失的)
    fn track_count(&self) -> usize;
}

// ========== 工具函数 ==========

/// 计算两个框 (x1, y1, x2, y2) 的 IOU
pub fn compute_iou(a: (f32, f32, f32, f32), b: (f32, f32, f32, f32)) -> f32 {
    let x1 = a.0.max(b.0);
    let y1 = a.1.max(b.1);
    let x2 = a.2.min(b.2);
    let y2 = a.3.min(b.3);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    let union = (a.2 - a.0) * (a.3 - a.1) + (b.2 - b.0) * (b.3 - b.1) - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

pub fn detection_box(det: &Detection) -> (f32, f32, f32, f32) {
    (det.x1, det.y1, det.x2, det.y2)
}
