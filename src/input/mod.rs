/// 视频输入/输出系统 (Video I/O)
///
/// - FrameSource / FrameSink: 逐帧读写接口
/// - ImageSequence: 图片序列目录 (PNG/JPEG)
/// - Ffmpeg: 视频文件解码 → 处理 → 编码 (ez-ffmpeg)
/// - Convert: YUV420P ↔ RGB
pub mod convert;
pub mod ffmpeg;
pub mod image_seq;

use image::RgbImage;

use crate::error::Result;

pub use ffmpeg::transcode;
pub use image_seq::{ImageSequenceReader, ImageSequenceWriter};

/// 视频基本信息
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// 总帧数 (未知时为 None)
    pub frame_count: Option<u64>,
}

/// 帧来源
pub trait FrameSource {
    fn info(&self) -> VideoInfo;

    /// 读取下一帧, 读完返回 None
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// 帧输出
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// 正常结束时调用一次
    fn finish(&mut self) -> Result<()>;
}
