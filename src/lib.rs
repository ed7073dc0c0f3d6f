// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行参数
pub mod counter; // 越线计数与绘制
pub mod detection; // 检测与跟踪
pub mod error; // 错误类型
pub mod input; // 视频输入/输出
pub mod models; // 模型实现
pub mod pipeline; // 逐帧处理流水线
pub mod ui_config; // JSON配置文件

use crate::detection::tracker::{compute_iou, detection_box};

pub use crate::config::Args;
pub use crate::counter::{ClassTally, CountState, FrameAnnotator, LineCounter, OverlayStyle};
pub use crate::detection::{ClassNames, Detect, Detection};
pub use crate::error::{Error, Result};
pub use crate::models::YOLOv8;
pub use crate::pipeline::{process_video, FrameBudget, FrameProcessor, Mode, ProcessSummary};
pub use crate::ui_config::CounterConfig;

/// 按类别的 NMS: 置信度降序, 与已保留的同类框 IOU 超过阈值则丢弃
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id != xs[index].class_id {
                continue;
            }
            let iou = compute_iou(detection_box(&xs[prev_index]), detection_box(&xs[index]));
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 本地时间字符串, 用于输出文件名
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_keeps_highest_per_class() {
        let mut xs = vec![
            Detection::new(0.0, 0.0, 10.0, 10.0, 2, 0.6),
            Detection::new(1.0, 1.0, 11.0, 11.0, 2, 0.9),
            Detection::new(1.0, 1.0, 11.0, 11.0, 7, 0.5),
            Detection::new(50.0, 50.0, 60.0, 60.0, 2, 0.4),
        ];
        non_max_suppression(&mut xs, 0.45);
        let kept: Vec<_> = xs.iter().map(|d| (d.class_id, d.confidence)).collect();
        assert_eq!(kept, vec![(2, 0.9), (7, 0.5), (2, 0.4)]);
    }

    #[test]
    fn test_time_string_format() {
        let s = gen_time_string("-");
        assert_eq!(s.split('-').count(), 6);
    }
}
