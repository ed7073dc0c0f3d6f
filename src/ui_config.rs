//! 计数配置 - 通过JSON文件调整参数

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::counter::OverlayStyle;
use crate::detection::types::{INF_SIZE, VEHICLE_CLASSES};
use crate::detection::ByteTrackConfig;
use crate::error::{Error, Result};
use crate::pipeline::DEFAULT_FRAME_LIMIT;

/// 计数与绘制参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    // === 计数参数 ===
    pub line_ratio: f32,            // 计数线位于帧高的比例
    pub threshold: f32,             // 质心到计数线的距离阈值(像素)
    pub count_classes: Vec<String>, // 参与计数的类别, 空表示模型全部类别

    // === 检测参数 ===
    pub conf: f32,       // 检测置信度阈值
    pub iou: f32,        // NMS IOU阈值
    pub input_size: u32, // 模型输入尺寸

    // === 处理参数 ===
    pub frame_limit: Option<u64>, // 帧数上限, null 表示不限制

    // === 绘制参数 ===
    pub overlay: OverlayStyle,
    pub font_path: Option<PathBuf>,

    // === ByteTrack参数 ===
    pub tracker: ByteTrackConfig,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            line_ratio: 0.55,
            threshold: 4.0,
            count_classes: VEHICLE_CLASSES.iter().map(|s| s.to_string()).collect(),
            conf: 0.25,
            iou: 0.45,
            input_size: INF_SIZE,
            frame_limit: Some(DEFAULT_FRAME_LIMIT),
            overlay: OverlayStyle::default(),
            font_path: None,
            tracker: ByteTrackConfig::default(),
        }
    }
}

impl CounterConfig {
    /// 从JSON文件加载配置, 文件不存在时创建默认配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("📝 配置文件不存在,创建默认配置...");
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.line_ratio) {
            return Err(Error::Config(format!(
                "line_ratio must be within [0, 1], got {}",
                self.line_ratio
            )));
        }
        if self.threshold <= 0.0 {
            return Err(Error::Config(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.conf) || !(0.0..=1.0).contains(&self.iou) {
            return Err(Error::Config(format!(
                "conf/iou must be within [0, 1], got {}/{}",
                self.conf, self.iou
            )));
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(Error::Config(format!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            )));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前计数配置:");
        info!("  计数线位置: {:.2} × 帧高", self.line_ratio);
        info!("  距离阈值: {:.1}px", self.threshold);
        info!("  计数类别: {:?}", self.count_classes);
        info!("  检测置信度: {:.2} | NMS IOU: {:.2}", self.conf, self.iou);
        match self.frame_limit {
            Some(limit) => info!("  帧数上限: {}", limit),
            None => info!("  帧数上限: 无"),
        }
        info!("  ByteTrack最大丢失帧: {}", self.tracker.max_lost_frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        let config = CounterConfig::load(&path).unwrap();
        assert_eq!(config, CounterConfig::default());
        assert!(path.is_file());
        assert_eq!(CounterConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        fs::write(&path, r#"{"threshold": 6.5, "frame_limit": null, "tracker": {"max_lost_frames": 5}}"#).unwrap();
        let config = CounterConfig::load(&path).unwrap();
        assert_eq!(config.threshold, 6.5);
        assert_eq!(config.frame_limit, None);
        assert_eq!(config.tracker.max_lost_frames, 5);
        assert_eq!(config.tracker.high_score_threshold, 0.4);
        assert_eq!(config.line_ratio, 0.55);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(CounterConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let config = CounterConfig {
            line_ratio: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
