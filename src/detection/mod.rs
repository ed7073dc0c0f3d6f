/// 检测系统 (Detection System)
///
/// - Detector: 目标检测接口与回放/记录
/// - Tracker:  目标追踪 (ByteTrack)
/// - Types:    检测框与类别表
pub mod bytetrack;
pub mod detector;
pub mod tracker;
pub mod types;

pub use bytetrack::{ByteTrackConfig, ByteTracker};
pub use detector::{Detect, DetectionLog, FrameDetections, ReplayDetector, TrackingDetector};
pub use tracker::{KalmanParams, Tracker};
pub use types::{ClassNames, Detection};
