//! 检测器 (Detector)
//! 职责: 单帧图像 → 检测框列表; 可选叠加跟踪器分配 track_id

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::tracker::Tracker;
use super::types::{ClassNames, Detection};
use crate::error::{Error, Result};

/// 目标检测统一接口 (外部模型的接缝)
pub trait Detect: Send {
    /// 对单帧执行检测, 坐标为原始帧像素坐标
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;

    /// 模型提供的类别表
    fn class_names(&self) -> &ClassNames;

    /// 平均单帧推理耗时 (毫秒), 不统计时为 None
    fn average_ms(&self) -> Option<f64> {
        None
    }

    /// 处理正常结束时调用, 刷新缓冲并报告写入错误
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: Detect + ?Sized> Detect for Box<D> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn class_names(&self) -> &ClassNames {
        (**self).class_names()
    }

    fn average_ms(&self) -> Option<f64> {
        (**self).average_ms()
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// 检测 + 跟踪: 先检测, 再由跟踪器写入 track_id
pub struct TrackingDetector<D, T> {
    detector: D,
    tracker: T,
}

impl<D: Detect, T: Tracker> TrackingDetector<D, T> {
    pub fn new(detector: D, tracker: T) -> Self {
        Self { detector, tracker }
    }
}

impl<D: Detect, T: Tracker> Detect for TrackingDetector<D, T> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let detections = self.detector.detect(frame)?;
        Ok(self.tracker.update(&detections))
    }

    fn class_names(&self) -> &ClassNames {
        self.detector.class_names()
    }

    fn average_ms(&self) -> Option<f64> {
        self.detector.average_ms()
    }

    fn finish(&mut self) -> Result<()> {
        self.detector.finish()
    }
}

/// 检测日志中的一行 (JSON Lines)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame: u64,
    pub detections: Vec<Detection>,
}

/// 回放检测日志, 不需要加载模型
///
/// 第 n 次调用返回日志中 `frame == n` 的检测, 日志中缺失的帧返回空列表.
pub struct ReplayDetector {
    frames: HashMap<u64, Vec<Detection>>,
    names: ClassNames,
    cursor: u64,
}

impl ReplayDetector {
    pub fn new(frames: Vec<FrameDetections>, names: ClassNames) -> Self {
        let frames = frames
            .into_iter()
            .map(|f| (f.frame, f.detections))
            .collect();
        Self {
            frames,
            names,
            cursor: 0,
        }
    }

    pub fn from_reader<R: BufRead>(reader: R, names: ClassNames) -> Result<Self> {
        let mut frames = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: FrameDetections = serde_json::from_str(line).map_err(|e| {
                Error::Config(format!("detection log line {}: {}", lineno + 1, e))
            })?;
            frames.push(entry);
        }
        Ok(Self::new(frames, names))
    }

    pub fn open<P: AsRef<Path>>(path: P, names: ClassNames) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let replay = Self::from_reader(BufReader::new(file), names)?;
        info!("📼 检测日志已加载: {} ({} 帧)", path.display(), replay.frames.len());
        Ok(replay)
    }
}

impl Detect for ReplayDetector {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        let dets = self.frames.remove(&self.cursor).unwrap_or_default();
        self.cursor += 1;
        Ok(dets)
    }

    fn class_names(&self) -> &ClassNames {
        &self.names
    }
}

/// 记录检测结果到 JSON Lines 文件, 供 ReplayDetector 回放
pub struct DetectionLog<D, W: Write> {
    inner: D,
    writer: W,
    frame: u64,
}

impl<D: Detect> DetectionLog<D, BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(inner: D, path: P) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        info!("📝 检测结果写入: {}", path.as_ref().display());
        Ok(Self::new(inner, BufWriter::new(file)))
    }
}

impl<D: Detect, W: Write> DetectionLog<D, W> {
    pub fn new(inner: D, writer: W) -> Self {
        Self {
            inner,
            writer,
            frame: 0,
        }
    }

    /// 取回底层 writer, 缓冲内容需先经 `finish` 刷新
    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<D: Detect, W: Write + Send> Detect for DetectionLog<D, W> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let detections = self.inner.detect(frame)?;
        let entry = FrameDetections {
            frame: self.frame,
            detections,
        };
        serde_json::to_writer(&mut self.writer, &entry)?;
        self.writer.write_all(b"\n")?;
        self.frame += 1;
        Ok(entry.detections)
    }

    fn class_names(&self) -> &ClassNames {
        self.inner.class_names()
    }

    fn average_ms(&self) -> Option<f64> {
        self.inner.average_ms()
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.finish()?;
        self.writer.flush()?;
        info!("📝 检测结果已写入 {} 帧", self.frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ByteTracker;

    fn blank() -> RgbImage {
        RgbImage::new(8, 8)
    }

    #[test]
    fn test_replay_missing_frames_are_empty() {
        let log = r#"{"frame":0,"detections":[{"x1":0,"y1":0,"x2":4,"y2":4,"class_id":2,"confidence":0.9}]}

{"frame":2,"detections":[{"x1":1,"y1":1,"x2":5,"y2":5,"class_id":7,"confidence":0.8,"track_id":3}]}
"#;
        let mut replay = ReplayDetector::from_reader(log.as_bytes(), ClassNames::coco()).unwrap();
        assert_eq!(replay.detect(&blank()).unwrap().len(), 1);
        assert!(replay.detect(&blank()).unwrap().is_empty());
        let third = replay.detect(&blank()).unwrap();
        assert_eq!(third[0].track_id, Some(3));
        assert!(replay.detect(&blank()).unwrap().is_empty());
    }

    #[test]
    fn test_replay_reports_bad_line() {
        let err = ReplayDetector::from_reader("{not json}".as_bytes(), ClassNames::coco());
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_log_then_replay() {
        let source = ReplayDetector::new(
            vec![FrameDetections {
                frame: 1,
                detections: vec![Detection::new(0.0, 0.0, 2.0, 2.0, 5, 0.7)],
            }],
            ClassNames::coco(),
        );
        let mut log = DetectionLog::new(source, Vec::new());
        log.detect(&blank()).unwrap();
        log.detect(&blank()).unwrap();
        let bytes = log.into_writer();

        let mut replay = ReplayDetector::from_reader(bytes.as_slice(), ClassNames::coco()).unwrap();
        assert!(replay.detect(&blank()).unwrap().is_empty());
        assert_eq!(replay.detect(&blank()).unwrap()[0].class_id, 5);
    }

    /// 写入成功但刷新失败的 writer
    struct FlushFails;

    impl Write for FlushFails {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[test]
    fn test_log_finish_reports_flush_error() {
        let source = ReplayDetector::new(Vec::new(), ClassNames::coco());
        let mut log = DetectionLog::new(source, FlushFails);
        log.detect(&blank()).unwrap();
        assert!(matches!(log.finish(), Err(Error::Io(_))));
    }

    #[test]
    fn test_log_finish_flushes_buffer() {
        let source = ReplayDetector::new(Vec::new(), ClassNames::coco());
        let mut log = DetectionLog::new(source, BufWriter::with_capacity(1024, Vec::new()));
        log.detect(&blank()).unwrap();
        log.finish().unwrap();
        let writer = log.into_writer();
        assert_eq!(writer.buffer().len(), 0);
        assert!(writer.get_ref().starts_with(b"{\"frame\":0"));
    }

    #[test]
    fn test_tracking_detector_assigns_ids() {
        let frames = (0..3)
            .map(|i| FrameDetections {
                frame: i,
                detections: vec![Detection::new(10.0, 10.0 + i as f32, 50.0, 40.0 + i as f32, 2, 0.9)],
            })
            .collect();
        let replay = ReplayDetector::new(frames, ClassNames::coco());
        let mut detector = TrackingDetector::new(replay, ByteTracker::default());
        let ids: Vec<_> = (0..3)
            .map(|_| detector.detect(&blank()).unwrap()[0].track_id)
            .collect();
        assert_eq!(ids, vec![Some(1), Some(1), Some(1)]);
    }
}
