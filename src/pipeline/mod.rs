/// 视频处理流水线 (Video Processing Pipeline)
///
/// 单线程逐帧处理:
/// - FrameSource: 读取帧
/// - FrameProcessor: 检测 → (跟踪) → 绘制/计数
/// - FrameSink: 写出帧
///
/// 帧数上限沿用 `count > frame_limit` 的判定: 上限 500 时最多处理 501 帧.
pub mod processor;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use processor::{Flow, FrameProcessor};

use crate::counter::ClassTally;
use crate::error::Result;
use crate::input::{FrameSink, FrameSource};

/// 默认帧数上限
pub const DEFAULT_FRAME_LIMIT: u64 = 500;

/// 每隔多少帧输出一次进度
pub const PROGRESS_INTERVAL: u64 = 30;

/// 处理模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// 仅检测: 所有目标画框并标注 "类别 置信度"
    Detect,
    /// 越线计数: 跟踪 + 计数线 + 分类计数
    Count,
}

/// 帧数预算
#[derive(Clone, Debug)]
pub struct FrameBudget {
    limit: Option<u64>,
    next_index: u64,
    truncated: bool,
}

impl FrameBudget {
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            next_index: 0,
            truncated: false,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// 是否处理下一帧. 帧序号大于上限时拒绝并标记截断
    pub fn admit(&mut self) -> bool {
        if let Some(limit) = self.limit {
            if self.next_index > limit {
                self.truncated = true;
                return false;
            }
        }
        self.next_index += 1;
        true
    }

    /// 已放行的帧数
    pub fn admitted(&self) -> u64 {
        self.next_index
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// 最多处理的帧数 (上限 + 1), 无上限时为 None
    pub fn max_frames(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_add(1))
    }
}

impl Default for FrameBudget {
    fn default() -> Self {
        Self::new(Some(DEFAULT_FRAME_LIMIT))
    }
}

/// 处理结果汇总
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub mode: Mode,
    pub frames_processed: u64,
    pub frame_limit: Option<u64>,
    /// 是否因帧数上限丢弃了后续帧
    pub truncated: bool,
    pub detections: u64,
    /// 计数模式下按类别表顺序的计数, 检测模式为空
    pub counts: Vec<ClassTally>,
    pub total: u64,
    pub elapsed_secs: f64,
    /// 模型平均单帧推理耗时 (毫秒)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_ms: Option<f64>,
}

impl ProcessSummary {
    pub fn count_of(&self, name: &str) -> Option<u64> {
        self.counts.iter().find(|t| t.name == name).map(|t| t.count)
    }

    /// 打印汇总
    pub fn log(&self) {
        info!(
            "🏁 处理完成: {} 帧, {:.1}s{}",
            self.frames_processed,
            self.elapsed_secs,
            if self.truncated { " (已截断)" } else { "" }
        );
        if let Some(ms) = self.inference_ms {
            info!("  平均推理耗时: {:.1}ms", ms);
        }
        for tally in &self.counts {
            info!("  {}: {}", tally.name, tally.count);
        }
        if self.mode == Mode::Count {
            info!("  合计: {}", self.total);
        }
    }
}

/// 逐帧处理: source → processor → sink
///
/// source 与 sink 按值传入, 任何退出路径 (读完、达到上限、出错) 都会释放.
/// 只有正常结束时才调用 `processor.finish()` 与 `sink.finish()`.
pub fn process_video<S, K>(
    mut source: S,
    mut sink: K,
    processor: &mut FrameProcessor,
) -> Result<ProcessSummary>
where
    S: FrameSource,
    K: FrameSink,
{
    let video = source.info();
    info!(
        "🎬 开始处理: {}x{} @ {:.1}fps{}",
        video.width,
        video.height,
        video.fps,
        video
            .frame_count
            .map(|n| format!(", 共 {} 帧", n))
            .unwrap_or_default()
    );

    while let Some(mut frame) = source.next_frame()? {
        match processor.process(&mut frame)? {
            Flow::Continue => sink.write_frame(&frame)?,
            Flow::Stop => break,
        }
    }

    processor.finish()?;
    sink.finish()?;
    Ok(processor.summary())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(frames: u64, limit: Option<u64>) -> (u64, bool) {
        let mut budget = FrameBudget::new(limit);
        let mut processed = 0;
        for _ in 0..frames {
            if !budget.admit() {
                break;
            }
            processed += 1;
        }
        (processed, budget.truncated())
    }

    #[test]
    fn test_budget_short_video() {
        assert_eq!(run(10, Some(500)), (10, false));
    }

    #[test]
    fn test_budget_off_by_one() {
        assert_eq!(run(600, Some(500)), (501, true));
        assert_eq!(run(501, Some(500)), (501, false));
    }

    #[test]
    fn test_budget_max_frames() {
        assert_eq!(FrameBudget::default().max_frames(), Some(501));
        assert_eq!(FrameBudget::new(Some(u64::MAX)).max_frames(), Some(u64::MAX));
        assert_eq!(FrameBudget::unlimited().max_frames(), None);
        // max_frames 与 admit 放行的帧数一致
        assert_eq!(run(600, Some(9)).0, FrameBudget::new(Some(9)).max_frames().unwrap());
    }

    #[test]
    fn test_budget_unlimited() {
        assert_eq!(run(2000, None), (2000, false));
    }

    #[test]
    fn test_mode_serde() {
        assert_eq!(serde_json::to_string(&Mode::Count).unwrap(), "\"count\"");
    }
}
