//! 帧叠加绘制 (Frame overlay)
//! 计数线、检测框、标签与计数文字, 直接写入 RgbImage

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::CountState;
use crate::detection::{ClassNames, Detection};
use crate::error::{Error, Result};

/// 未指定字体时依次尝试的系统字体
const FONT_CANDIDATES: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// 检测模式下按类别轮换的颜色
const PALETTE: [[u8; 3]; 12] = [
    [255, 0, 0],     // 红色
    [0, 255, 0],     // 绿色
    [0, 0, 255],     // 蓝色
    [255, 255, 0],   // 黄色
    [255, 0, 255],   // 品红
    [0, 255, 255],   // 青色
    [255, 128, 0],   // 橙色
    [255, 0, 128],   // 粉红
    [128, 255, 0],   // 黄绿
    [0, 128, 255],   // 天蓝
    [255, 255, 255], // 白色
    [128, 0, 255],   // 紫色
];

/// 叠加样式 (颜色均为 RGB)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub line_color: [u8; 3],
    pub line_thickness: u32,
    pub box_color: [u8; 3],
    pub box_thickness: u32,
    pub text_color: [u8; 3],
    /// 计数文字起点 (左上角)
    pub text_origin: (i32, i32),
    /// 每个类别的行距
    pub text_step: i32,
    pub text_scale: f32,
    pub label_scale: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            line_color: [255, 0, 0],
            line_thickness: 2,
            box_color: [0, 255, 0],
            box_thickness: 2,
            text_color: [255, 255, 0],
            text_origin: (20, 20),
            text_step: 25,
            text_scale: 22.0,
            label_scale: 16.0,
        }
    }
}

/// 帧绘制器
pub struct FrameAnnotator {
    style: OverlayStyle,
    font: Option<FontVec>,
}

impl FrameAnnotator {
    pub fn new(style: OverlayStyle, font: Option<FontVec>) -> Self {
        if font.is_none() {
            warn!("⚠️ 未找到可用字体, 仅绘制线与检测框, 不绘制文字");
        }
        Self { style, font }
    }

    /// 加载字体: 指定路径读取失败即报错; 未指定时搜索系统字体, 都没有则返回 None
    pub fn load_font(path: Option<&Path>) -> Result<Option<FontVec>> {
        if let Some(path) = path {
            let bytes = fs::read(path)?;
            let font = FontVec::try_from_vec(bytes)
                .map_err(|e| Error::Config(format!("font {}: {}", path.display(), e)))?;
            info!("🔤 字体已加载: {}", path.display());
            return Ok(Some(font));
        }

        for candidate in FONT_CANDIDATES {
            let Ok(bytes) = fs::read(candidate) else {
                continue;
            };
            if let Ok(font) = FontVec::try_from_vec(bytes) {
                info!("🔤 使用系统字体: {}", candidate);
                return Ok(Some(font));
            }
        }
        Ok(None)
    }

    /// 横跨整帧的计数线
    pub fn draw_line(&self, frame: &mut RgbImage, line_y: u32) {
        let (width, height) = frame.dimensions();
        let thickness = self.style.line_thickness.max(1);
        if width == 0 || line_y >= height {
            return;
        }
        let top = line_y.saturating_sub(thickness / 2);
        let rect = Rect::at(0, top as i32).of_size(width, thickness.min(height - top));
        draw_filled_rect_mut(frame, rect, Rgb(self.style.line_color));
    }

    pub fn draw_box(&self, frame: &mut RgbImage, det: &Detection) {
        self.draw_box_colored(frame, det, self.style.box_color);
    }

    /// 框角点限制在帧外扩 `pad` 像素的范围内, 超大或非法坐标不会溢出
    fn clamp_corners(frame: &RgbImage, det: &Detection, pad: u32) -> (i32, i32, i32, i32) {
        let (width, height) = frame.dimensions();
        let pad = pad as f32;
        let clamp = |v: f32, max: u32| {
            if v.is_nan() {
                return 0;
            }
            v.clamp(-pad, max as f32 + pad).round() as i32
        };
        (
            clamp(det.x1, width),
            clamp(det.y1, height),
            clamp(det.x2, width),
            clamp(det.y2, height),
        )
    }

    fn draw_box_colored(&self, frame: &mut RgbImage, det: &Detection, color: [u8; 3]) {
        let (width, height) = frame.dimensions();
        // 超过帧尺寸的线宽没有意义
        let thickness = self.style.box_thickness.clamp(1, width.max(height).max(1));
        let (x1, y1, x2, y2) = Self::clamp_corners(frame, det, thickness);
        let w = (x2 - x1).max(1) as u32;
        let h = (y2 - y1).max(1) as u32;
        for t in 0..thickness {
            let rect = Rect::at(x1.saturating_sub(t as i32), y1.saturating_sub(t as i32))
                .of_size(w.saturating_add(2 * t), h.saturating_add(2 * t));
            draw_hollow_rect_mut(frame, rect, Rgb(color));
        }
    }

    /// 检测模式: 框 + "类别 置信度" 标签, 颜色按类别轮换
    pub fn draw_labelled(&self, frame: &mut RgbImage, det: &Detection, names: &ClassNames) {
        let color = PALETTE[det.class_id as usize % PALETTE.len()];
        self.draw_box_colored(frame, det, color);

        let Some(font) = &self.font else {
            return;
        };
        let text = format!("{} {:.2}", names.label(det.class_id), det.confidence);
        let scale = PxScale::from(self.style.label_scale);
        let (tw, th) = text_size(scale, font, &text);
        let (x, y1, _, _) = Self::clamp_corners(frame, det, 0);
        let y = y1.saturating_sub(th as i32 + 2).max(0);
        let rect = Rect::at(x, y).of_size(tw.max(1) + 4, th.max(1) + 2);
        draw_filled_rect_mut(frame, rect, Rgb(color));
        draw_text_mut(frame, Rgb([0, 0, 0]), x + 2, y, scale, font, &text);
    }

    /// 计数文字排版: 每类一行 `(x, y, "名称: 数量")`, 按类别表顺序自 `text_origin` 起每行下移 `text_step`
    pub fn count_lines(&self, state: &CountState) -> Vec<(i32, i32, String)> {
        let (x, y) = self.style.text_origin;
        state
            .tallies()
            .iter()
            .enumerate()
            .map(|(i, tally)| {
                let row_y = y.saturating_add(self.style.text_step.saturating_mul(i as i32));
                (x, row_y, format!("{}: {}", tally.name, tally.count))
            })
            .collect()
    }

    pub fn draw_counts(&self, frame: &mut RgbImage, state: &CountState) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(self.style.text_scale);
        for (x, y, text) in self.count_lines(state) {
            draw_text_mut(frame, Rgb(self.style.text_color), x, y, scale, font, &text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_spans_frame_width() {
        let annotator = FrameAnnotator::new(OverlayStyle::default(), None);
        let mut frame = RgbImage::new(40, 20);
        annotator.draw_line(&mut frame, 11);
        assert_eq!(*frame.get_pixel(0, 11), Rgb([255, 0, 0]));
        assert_eq!(*frame.get_pixel(39, 10), Rgb([255, 0, 0]));
        assert_eq!(*frame.get_pixel(20, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_line_outside_frame_is_ignored() {
        let annotator = FrameAnnotator::new(OverlayStyle::default(), None);
        let mut frame = RgbImage::new(10, 10);
        annotator.draw_line(&mut frame, 10);
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_box_outline() {
        let style = OverlayStyle {
            box_thickness: 1,
            ..Default::default()
        };
        let annotator = FrameAnnotator::new(style, None);
        let mut frame = RgbImage::new(30, 30);
        annotator.draw_box(&mut frame, &Detection::new(5.0, 5.0, 15.0, 15.0, 2, 0.9));
        assert_eq!(*frame.get_pixel(5, 5), Rgb([0, 255, 0]));
        assert_eq!(*frame.get_pixel(14, 10), Rgb([0, 255, 0]));
        assert_eq!(*frame.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_boxes_partly_outside_do_not_panic() {
        let annotator = FrameAnnotator::new(OverlayStyle::default(), None);
        let mut frame = RgbImage::new(16, 16);
        annotator.draw_box(&mut frame, &Detection::new(-10.0, -10.0, 40.0, 8.0, 2, 0.9));
        annotator.draw_labelled(&mut frame, &Detection::new(10.0, 10.0, 10.0, 10.0, 99, 0.5), &ClassNames::coco());
    }

    #[test]
    fn test_huge_boxes_are_clamped() {
        let annotator = FrameAnnotator::new(OverlayStyle::default(), None);
        let mut frame = RgbImage::new(16, 16);
        annotator.draw_box(&mut frame, &Detection::new(0.0, 0.0, 1e10, 1e10, 2, 0.9));
        annotator.draw_box(&mut frame, &Detection::new(-1e10, -1e10, 4.0, 4.0, 2, 0.9));
        annotator.draw_box(&mut frame, &Detection::new(f32::NAN, 2.0, f32::INFINITY, 8.0, 2, 0.9));
        annotator.draw_labelled(&mut frame, &Detection::new(-1e10, -1e10, 1e10, 1e10, 7, 0.5), &ClassNames::coco());
        // 第一个框的左上角仍然绘制在帧内
        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_huge_thickness_does_not_overflow() {
        let style = OverlayStyle {
            box_thickness: u32::MAX,
            ..Default::default()
        };
        let annotator = FrameAnnotator::new(style, None);
        let mut frame = RgbImage::new(8, 8);
        annotator.draw_box(&mut frame, &Detection::new(2.0, 2.0, 6.0, 6.0, 2, 0.9));
        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_count_lines_layout() {
        let classes = ClassNames::coco().select(&["truck", "car", "bus"]).unwrap();
        let mut state = CountState::new(&classes);
        state.record(1, 2);
        state.record(2, 2);
        state.record(3, 7);
        let annotator = FrameAnnotator::new(OverlayStyle::default(), None);

        let lines = annotator.count_lines(&state);
        assert_eq!(
            lines,
            vec![
                (20, 20, "truck: 1".to_string()),
                (20, 45, "car: 2".to_string()),
                (20, 70, "bus: 0".to_string()),
            ]
        );
    }

    #[test]
    fn test_count_lines_custom_origin() {
        let style = OverlayStyle {
            text_origin: (5, 100),
            text_step: 10,
            ..Default::default()
        };
        let annotator = FrameAnnotator::new(style, None);
        let state = CountState::new(&ClassNames::coco().select(&["car", "motorcycle"]).unwrap());
        let ys: Vec<i32> = annotator.count_lines(&state).iter().map(|(_, y, _)| *y).collect();
        assert_eq!(ys, vec![100, 110]);
    }

    #[test]
    fn test_missing_font_path_is_an_error() {
        let err = FrameAnnotator::load_font(Some(Path::new("/nonexistent/font.ttf")));
        assert!(err.is_err());
    }
}
