/// 模型实现
///
/// 当前仅包含 YOLOv8 (Ultralytics 导出的 ONNX 检测模型):
/// - 模型加载 (new)
/// - 预处理 (preprocess): 左上角对齐缩放, 填充 144/255
/// - 推理 (run)
/// - 后处理 (decode_output + NMS)
///
/// 所有模型都通过 `detection::Detect` 接入流水线.
pub mod yolov8;

pub use yolov8::{decode_output, YOLOv8, YOLOv8Config};
