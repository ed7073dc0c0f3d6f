//! 帧处理器 (Frame processor)
//! 职责: 单帧 → 检测 → 绘制 (检测模式) 或 绘制 + 计数 (计数模式)

use std::time::Instant;

use image::RgbImage;
use tracing::{info, warn};

use super::{FrameBudget, Mode, ProcessSummary, PROGRESS_INTERVAL};
use crate::counter::{CountState, FrameAnnotator, LineCounter};
use crate::detection::Detect;
use crate::error::Result;

/// 处理一帧后的流程控制
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// 已处理, 写出该帧
    Continue,
    /// 达到帧数上限, 该帧未处理且不应写出
    Stop,
}

enum Stage {
    Detect,
    Count {
        counter: LineCounter,
        state: CountState,
    },
}

pub struct FrameProcessor {
    detector: Box<dyn Detect>,
    annotator: FrameAnnotator,
    stage: Stage,
    budget: FrameBudget,

    // 统计
    detections: u64,
    started: Instant,
    last: Instant,
}

impl FrameProcessor {
    /// 检测模式
    pub fn detect_only(detector: Box<dyn Detect>, annotator: FrameAnnotator, budget: FrameBudget) -> Self {
        Self::with_stage(detector, annotator, budget, Stage::Detect)
    }

    /// 计数模式. detector 应输出带 track_id 的检测, 否则不会计数
    pub fn counting(
        detector: Box<dyn Detect>,
        counter: LineCounter,
        annotator: FrameAnnotator,
        budget: FrameBudget,
    ) -> Self {
        let state = counter.new_state();
        Self::with_stage(detector, annotator, budget, Stage::Count { counter, state })
    }

    fn with_stage(
        detector: Box<dyn Detect>,
        annotator: FrameAnnotator,
        budget: FrameBudget,
        stage: Stage,
    ) -> Self {
        let now = Instant::now();
        Self {
            detector,
            annotator,
            stage,
            budget,
            detections: 0,
            started: now,
            last: now,
        }
    }

    pub fn mode(&self) -> Mode {
        match self.stage {
            Stage::Detect => Mode::Detect,
            Stage::Count { .. } => Mode::Count,
        }
    }

    /// 计数模式下的当前计数
    pub fn count_state(&self) -> Option<&CountState> {
        match &self.stage {
            Stage::Detect => None,
            Stage::Count { state, .. } => Some(state),
        }
    }

    /// 最多处理的帧数, 供视频后端提前结束解码
    pub fn max_frames(&self) -> Option<u64> {
        self.budget.max_frames()
    }

    /// 正常结束: 刷新检测器 (检测日志等) 的缓冲
    pub fn finish(&mut self) -> Result<()> {
        self.detector.finish()
    }

    /// 处理一帧 (原地绘制)
    pub fn process(&mut self, frame: &mut RgbImage) -> Result<Flow> {
        if !self.budget.admit() {
            if let Some(limit) = self.budget.limit() {
                warn!("⚠️ 已达到帧数上限 {}, 后续帧被丢弃", limit);
            }
            return Ok(Flow::Stop);
        }

        let detections = self.detector.detect(frame)?;
        self.detections += detections.len() as u64;

        match &mut self.stage {
            Stage::Detect => {
                let names = self.detector.class_names();
                for det in &detections {
                    self.annotator.draw_labelled(frame, det, names);
                }
            }
            Stage::Count { counter, state } => {
                counter.apply(frame, &detections, state, &self.annotator);
            }
        }

        self.log_progress();
        Ok(Flow::Continue)
    }

    fn log_progress(&mut self) {
        let processed = self.budget.admitted();
        if processed % PROGRESS_INTERVAL != 0 {
            return;
        }
        let fps = PROGRESS_INTERVAL as f64 / self.last.elapsed().as_secs_f64().max(1e-6);
        self.last = Instant::now();
        match self.count_state() {
            Some(state) => info!("📊 已处理 {} 帧 | {:.1}fps | 计数 {}", processed, fps, state.total()),
            None => info!("📊 已处理 {} 帧 | {:.1}fps", processed, fps),
        }
    }

    pub fn summary(&self) -> ProcessSummary {
        let (counts, total) = match self.count_state() {
            Some(state) => (state.tallies().to_vec(), state.total()),
            None => (Vec::new(), 0),
        };
        ProcessSummary {
            mode: self.mode(),
            frames_processed: self.budget.admitted(),
            frame_limit: self.budget.limit(),
            truncated: self.budget.truncated(),
            detections: self.detections,
            counts,
            total,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            inference_ms: self.detector.average_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::OverlayStyle;
    use crate::detection::{ClassNames, Detection, DetectionLog, FrameDetections, ReplayDetector};

    fn replay(frames: Vec<Vec<Detection>>) -> Box<dyn Detect> {
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, detections)| FrameDetections {
                frame: i as u64,
                detections,
            })
            .collect();
        Box::new(ReplayDetector::new(frames, ClassNames::coco()))
    }

    fn annotator() -> FrameAnnotator {
        FrameAnnotator::new(OverlayStyle::default(), None)
    }

    #[test]
    fn test_counting_processor() {
        let car = Detection::new(10.0, 45.0, 30.0, 55.0, 2, 0.9).with_track_id(4);
        let detector = replay(vec![vec![car.clone()], vec![car.clone()], vec![car]]);
        let counter = LineCounter::new(0.5, 4.0, ClassNames::coco().select(&["car", "truck"]).unwrap());
        let mut processor = FrameProcessor::counting(detector, counter, annotator(), FrameBudget::default());

        for _ in 0..3 {
            let mut frame = RgbImage::new(100, 100);
            assert_eq!(processor.process(&mut frame).unwrap(), Flow::Continue);
        }
        let summary = processor.summary();
        assert_eq!(summary.mode, Mode::Count);
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.count_of("car"), Some(1));
        assert_eq!(summary.count_of("truck"), Some(0));
        assert_eq!(summary.detections, 3);
    }

    #[test]
    fn test_stop_at_limit() {
        let mut processor = FrameProcessor::detect_only(replay(vec![]), annotator(), FrameBudget::new(Some(1)));
        let mut frame = RgbImage::new(8, 8);
        assert_eq!(processor.process(&mut frame).unwrap(), Flow::Continue);
        assert_eq!(processor.process(&mut frame).unwrap(), Flow::Continue);
        assert_eq!(processor.process(&mut frame).unwrap(), Flow::Stop);
        let summary = processor.summary();
        assert_eq!(summary.frames_processed, 2);
        assert!(summary.truncated);
        assert!(summary.counts.is_empty());
    }

    #[test]
    fn test_finish_propagates_detector_error() {
        struct Unflushable;

        impl std::io::Write for Unflushable {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Err(std::io::Error::other("closed"))
            }
        }

        let log = DetectionLog::new(replay(vec![]), Unflushable);
        let mut processor = FrameProcessor::detect_only(Box::new(log), annotator(), FrameBudget::default());
        processor.process(&mut RgbImage::new(4, 4)).unwrap();
        assert!(matches!(processor.finish(), Err(crate::Error::Io(_))));
        assert_eq!(processor.summary().inference_ms, None);
    }

    #[test]
    fn test_detect_mode_draws_every_class() {
        let person = Detection::new(2.0, 2.0, 12.0, 12.0, 0, 0.8);
        let mut processor =
            FrameProcessor::detect_only(replay(vec![vec![person]]), annotator(), FrameBudget::unlimited());
        let mut frame = RgbImage::new(20, 20);
        processor.process(&mut frame).unwrap();
        // class 0 → 调色板第一个颜色
        assert_eq!(*frame.get_pixel(2, 2), image::Rgb([255, 0, 0]));
    }
}
