//! FFmpeg 视频处理 (ez-ffmpeg)
//! 解码 → 格式转换 yuv420p → AnnotateFilter (YUV→RGB, 检测/计数, RGB→YUV) → mpeg4 编码

use std::path::Path;

use crossbeam_channel::{bounded, Sender};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame, Input, Output};
use image::RgbImage;
use tracing::{error, info};

use super::convert::{rgb_to_yuv420p, yuv420p_to_rgb, PlaneLayout};
use crate::error::{Error, Result};
use crate::pipeline::{Flow, FrameProcessor, ProcessSummary};

/// 输出编码器 (对应 OpenCV 的 mp4v)
pub const VIDEO_CODEC: &str = "mpeg4";

/// 经两次格式转换, 送入滤镜的帧独占缓冲区, 可以原地改写
const FILTER_DESC: &str = "format=rgb24,format=yuv420p";

/// 帧滤镜: 在 ffmpeg 调度线程中运行 FrameProcessor
pub struct AnnotateFilter {
    processor: FrameProcessor,
    summary_tx: Sender<Result<ProcessSummary>>,
    rgb: Vec<u8>,
    stopped: bool,
}

impl AnnotateFilter {
    pub fn new(processor: FrameProcessor, summary_tx: Sender<Result<ProcessSummary>>) -> Self {
        Self {
            processor,
            summary_tx,
            rgb: Vec::new(),
            stopped: false,
        }
    }

    fn annotate(&mut self, frame: &mut Frame) -> std::result::Result<Flow, String> {
        unsafe {
            let ptr = frame.as_mut_ptr();
            if ptr.is_null() {
                return Err("null frame".to_string());
            }
            let (w, h) = ((*ptr).width, (*ptr).height);
            let strides = (*ptr).linesize;
            if w <= 0 || h <= 0 || strides[0] <= 0 || strides[1] <= 0 || strides[1] != strides[2] {
                return Err(format!(
                    "unsupported frame layout {}x{} linesize {:?}",
                    w,
                    h,
                    &strides[..3]
                ));
            }
            let layout = PlaneLayout {
                width: w as usize,
                height: h as usize,
                y_stride: strides[0] as usize,
                uv_stride: strides[1] as usize,
            };
            if !layout.is_valid() {
                return Err(format!("invalid plane layout {:?}", layout));
            }

            let planes = (*ptr).data;
            if planes[0].is_null() || planes[1].is_null() || planes[2].is_null() {
                return Err("frame is not yuv420p".to_string());
            }
            let (y_len, uv_len) = layout.plane_sizes();
            let y = std::slice::from_raw_parts_mut(planes[0], y_len);
            let u = std::slice::from_raw_parts_mut(planes[1], uv_len);
            let v = std::slice::from_raw_parts_mut(planes[2], uv_len);

            let rgb_len = layout.width * layout.height * 3;
            let mut rgb = std::mem::take(&mut self.rgb);
            rgb.resize(rgb_len, 0);
            yuv420p_to_rgb(&layout, y, u, v, &mut rgb);

            let mut image = RgbImage::from_raw(w as u32, h as u32, rgb)
                .ok_or_else(|| "rgb buffer size mismatch".to_string())?;
            let flow = self.processor.process(&mut image).map_err(|e| e.to_string())?;
            if flow == Flow::Continue {
                rgb_to_yuv420p(&layout, image.as_raw(), y, u, v);
            }
            self.rgb = image.into_raw();
            Ok(flow)
        }
    }
}

impl FrameFilter for AnnotateFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> std::result::Result<(), String> {
        info!("✅ 标注滤镜启动 ({:?})", self.processor.mode());
        Ok(())
    }

    fn filter_frame(
        &mut self,
        mut frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> std::result::Result<Option<Frame>, String> {
        if self.stopped {
            return Ok(None);
        }
        if frame.is_empty() {
            return Ok(Some(frame));
        }

        match self.annotate(&mut frame) {
            Ok(Flow::Continue) => Ok(Some(frame)),
            Ok(Flow::Stop) => {
                self.stopped = true;
                Ok(None)
            }
            Err(e) => {
                error!("❌ 帧处理失败: {}", e);
                Err(e)
            }
        }
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        let result = self.processor.finish().map(|_| self.processor.summary());
        if let Err(e) = &result {
            error!("❌ 结束处理失败: {}", e);
        }
        let _ = self.summary_tx.try_send(result);
        info!("✅ 标注滤镜退出");
    }
}

/// 处理视频文件: 解码 → 处理 → 编码到 `output`
///
/// 输入不存在或无法打开时, 在处理任何帧之前返回 `VideoOpen`.
/// 设有帧数上限时输出按 `-frames:v` 截止, 达到上限后 ffmpeg 停止解码.
pub fn transcode(input: &Path, output: &Path, processor: FrameProcessor) -> Result<ProcessSummary> {
    let open_err = |reason: String| Error::VideoOpen {
        path: input.to_path_buf(),
        reason,
    };
    if !input.is_file() {
        return Err(open_err("file not found".to_string()));
    }
    let stream_frames = match find_video_stream_info(input.to_string_lossy().to_string()) {
        Ok(Some(StreamInfo::Video { nb_frames, .. })) => u64::try_from(nb_frames).ok().filter(|n| *n > 0),
        Ok(_) => return Err(open_err("no video stream".to_string())),
        Err(e) => return Err(open_err(e.to_string())),
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let max_frames = processor.max_frames();
    let (summary_tx, summary_rx) = bounded(1);
    let filter = AnnotateFilter::new(processor, summary_tx);

    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("annotate", Box::new(filter));
    let out = Output::new(output.to_string_lossy().to_string())
        .set_video_codec(VIDEO_CODEC)
        .set_max_video_frames(max_frames.and_then(|n| i64::try_from(n).ok()))
        .add_frame_pipeline(pipe);

    let ctx = FfmpegContext::builder()
        .input(Input::new(input.to_string_lossy().to_string()))
        .filter_descs([FILTER_DESC].into())
        .output(out)
        .build()
        .map_err(|e| open_err(e.to_string()))?;

    info!(
        "🎬 开始转码: {} → {}{}",
        input.display(),
        output.display(),
        stream_frames.map(|n| format!(", 共 {} 帧", n)).unwrap_or_default()
    );
    let sch = ctx.start().map_err(|e| open_err(e.to_string()))?;
    sch.wait()
        .map_err(|e| Error::Pipeline(format!("ffmpeg: {}", e)))?;

    let mut summary = summary_rx
        .try_recv()
        .map_err(|_| Error::Pipeline("annotate filter did not report a summary".to_string()))??;
    summary.truncated = cap_truncated(&summary, stream_frames);
    Ok(summary)
}

/// 编码在上限处截止时, 滤镜未必能看到下一帧, 需结合输入帧数判断是否截断.
/// 输入帧数未知且恰好处理满上限时按截断处理.
fn cap_truncated(summary: &ProcessSummary, stream_frames: Option<u64>) -> bool {
    if summary.truncated {
        return true;
    }
    let cap_reached = summary
        .frame_limit
        .is_some_and(|limit| summary.frames_processed > limit);
    cap_reached && stream_frames.map_or(true, |n| n > summary.frames_processed)
}
