//! 命令行参数

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::gen_time_string;
use crate::pipeline::Mode;
use crate::ui_config::CounterConfig;

/// 车流检测与越线计数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "YOLOv8 车流检测与越线计数", long_about = None)]
pub struct Args {
    /// 输入视频文件, 或图片序列目录
    #[arg(short, long)]
    pub input: PathBuf,

    /// 输出视频文件 (图片序列输入时为输出目录)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 处理模式
    #[arg(long, value_enum, default_value_t = Mode::Count)]
    pub mode: Mode,

    /// ONNX 检测模型
    #[arg(short, long, default_value = "models/yolov8n.onnx")]
    pub model: PathBuf,

    /// 回放检测日志 (JSON Lines), 不加载模型
    #[arg(long)]
    pub detections: Option<PathBuf>,

    /// 记录每帧检测结果到 JSON Lines 文件
    #[arg(long)]
    pub dump_detections: Option<PathBuf>,

    /// 计数模式下不启用 ByteTrack (检测须自带 track_id)
    #[arg(long)]
    pub no_track: bool,

    /// JSON 配置文件, 不存在时创建默认配置
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 最多处理的帧序号 (覆盖配置文件)
    #[arg(long, conflicts_with = "no_frame_limit")]
    pub frame_limit: Option<u64>,

    /// 不限制帧数
    #[arg(long)]
    pub no_frame_limit: bool,

    /// 置信度阈值 (覆盖配置文件)
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS IOU阈值 (覆盖配置文件)
    #[arg(long)]
    pub iou: Option<f32>,

    /// 使用 CUDA 推理
    #[arg(long)]
    pub cuda: bool,

    /// 文字字体 (TTF/OTF)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 处理结果写入 JSON 文件
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl Args {
    /// 命令行参数覆盖配置文件
    pub fn apply_to(&self, config: &mut CounterConfig) {
        if self.no_frame_limit {
            config.frame_limit = None;
        } else if let Some(limit) = self.frame_limit {
            config.frame_limit = Some(limit);
        }
        if let Some(conf) = self.conf {
            config.conf = conf;
        }
        if let Some(iou) = self.iou {
            config.iou = iou;
        }
        if let Some(font) = &self.font {
            config.font_path = Some(font.clone());
        }
    }

    /// 输出路径: 未指定时为 `outputs/output_<输入名>_<时间>.mp4`, 图片序列输入则为同名目录
    pub fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        default_output(&self.input, self.input.is_dir())
    }
}

fn default_output(input: &Path, is_dir: bool) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    let name = format!("output_{}_{}", stem, gen_time_string(""));
    let dir = PathBuf::from("outputs");
    if is_dir {
        dir.join(name)
    } else {
        dir.join(format!("{}.mp4", name))
    }
}
