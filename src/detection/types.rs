/// 检测系统数据结构定义
/// Data structures shared by detector, tracker and counter
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ========== 公共常量 ==========

/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

/// COCO 80类 (YOLOv8 默认类别表)
pub const COCO_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// 默认参与计数的车辆类别
pub const VEHICLE_CLASSES: [&str; 4] = ["car", "motorcycle", "bus", "truck"];

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box), 像素坐标 x1,y1 左上 / x2,y2 右下
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: u32,
    pub confidence: f32,
    /// 跟踪ID, 未启用跟踪时为 None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u32>,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, class_id: u32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            class_id,
            confidence,
            track_id: None,
        }
    }

    pub fn with_track_id(mut self, track_id: u32) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// 中心点 (cx, cy)
    pub fn centroid(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// 类别表: class_id → 名称
///
/// 由模型在加载时提供, 之后只读. 顺序即插入顺序, 决定计数文字的渲染顺序.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassNames {
    entries: Vec<(u32, String)>,
}

impl ClassNames {
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let mut entries: Vec<(u32, String)> = Vec::new();
        for (id, name) in pairs {
            // 重复ID保留第一次出现的位置, 名称以最后一次为准
            match entries.iter_mut().find(|(eid, _)| *eid == id) {
                Some(entry) => entry.1 = name.into(),
                None => entries.push((id, name.into())),
            }
        }
        Self { entries }
    }

    /// COCO 80类
    pub fn coco() -> Self {
        Self::new(COCO_NAMES.iter().enumerate().map(|(i, n)| (i as u32, *n)))
    }

    /// 解析 Ultralytics 导出 ONNX 的 metadata `names` 字段
    ///
    /// 形如 `{0: 'person', 1: 'bicycle', 2: 'car'}`
    pub fn parse_ultralytics(raw: &str) -> Option<Self> {
        let re = Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#).ok()?;
        let pairs: Vec<(u32, String)> = re
            .captures_iter(raw)
            .filter_map(|cap| {
                let id = cap.get(1)?.as_str().parse::<u32>().ok()?;
                let name = cap.get(2)?.as_str().to_string();
                Some((id, name))
            })
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(Self::new(pairs))
        }
    }

    /// 按名称挑选子集 (保持 `names` 给出的顺序)
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut picked = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            match self.entries.iter().find(|(_, n)| n == name) {
                Some((id, n)) => picked.push((*id, n.clone())),
                None => {
                    return Err(Error::Config(format!(
                        "class '{}' is not provided by the model",
                        name
                    )))
                }
            }
        }
        Ok(Self::new(picked))
    }

    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(id, _)| *id == class_id)
            .map(|(_, n)| n.as_str())
    }

    pub fn contains(&self, class_id: u32) -> bool {
        self.get(class_id).is_some()
    }

    /// 显示名称, 未知类别显示为 `#id`
    pub fn label(&self, class_id: u32) -> String {
        self.get(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", class_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries.iter().map(|(id, n)| (*id, n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid() {
        let det = Detection::new(10.0, 20.0, 30.0, 60.0, 2, 0.9);
        assert_eq!(det.centroid(), (20.0, 40.0));
        assert_eq!(det.area(), 800.0);
    }

    #[test]
    fn test_parse_ultralytics_names() {
        let names = ClassNames::parse_ultralytics("{0: 'person', 1: 'bicycle', 2: 'car'}").unwrap();
        assert_eq!(names.len(), 3);
        assert_eq!(names.get(2), Some("car"));
        assert_eq!(names.label(9), "#9");
        assert!(ClassNames::parse_ultralytics("garbage").is_none());
    }

    #[test]
    fn test_select_keeps_requested_order() {
        let coco = ClassNames::coco();
        let vehicles = coco.select(&["truck", "car"]).unwrap();
        let order: Vec<_> = vehicles.iter().collect();
        assert_eq!(order, vec![(7, "truck"), (2, "car")]);
        assert!(coco.select(&["spaceship"]).is_err());
    }

    #[test]
    fn test_duplicate_id_keeps_first_position() {
        let names = ClassNames::new(vec![(3, "a"), (1, "b"), (3, "c")]);
        let order: Vec<_> = names.iter().collect();
        assert_eq!(order, vec![(3, "c"), (1, "b")]);
    }

    #[test]
    fn test_track_id_serde() {
        let det = Detection::new(0.0, 0.0, 1.0, 1.0, 0, 0.5);
        let json = serde_json::to_string(&det).unwrap();
        assert!(!json.contains("track_id"));

        let tracked: Detection = serde_json::from_str(
            r#"{"x1":0,"y1":0,"x2":1,"y2":1,"class_id":2,"confidence":0.5,"track_id":7}"#,
        )
        .unwrap();
        assert_eq!(tracked.track_id, Some(7));
    }
}
