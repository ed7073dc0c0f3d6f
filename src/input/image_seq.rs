//! 图片序列读写 (Image sequence)
//! 目录中的 PNG/JPEG 按文件名排序视为连续帧

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, info};

use super::{FrameSink, FrameSource, VideoInfo};
use crate::error::{Error, Result};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 图片序列没有帧率信息时使用的默认值
pub const DEFAULT_FPS: f64 = 25.0;

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 图片序列读取
pub struct ImageSequenceReader {
    frames: Vec<PathBuf>,
    cursor: usize,
    info: VideoInfo,
}

impl ImageSequenceReader {
    /// 打开帧目录. 目录不存在、不可读或没有帧时返回 `VideoOpen`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let open_err = |reason: String| Error::VideoOpen {
            path: dir.to_path_buf(),
            reason,
        };

        let entries = fs::read_dir(dir).map_err(|e| open_err(e.to_string()))?;
        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_frame_file(path))
            .collect();
        frames.sort();

        let first = frames
            .first()
            .ok_or_else(|| open_err("no image frames found".to_string()))?;
        let (width, height) = image::image_dimensions(first).map_err(|e| open_err(e.to_string()))?;

        info!("📂 图片序列: {} ({} 帧, {}x{})", dir.display(), frames.len(), width, height);
        let info = VideoInfo {
            width,
            height,
            fps: DEFAULT_FPS,
            frame_count: Some(frames.len() as u64),
        };
        Ok(Self {
            frames,
            cursor: 0,
            info,
        })
    }
}

impl FrameSource for ImageSequenceReader {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let frame = image::open(path)?.into_rgb8();
        if frame.dimensions() != (self.info.width, self.info.height) {
            return Err(Error::Pipeline(format!(
                "frame {} is {}x{}, expected {}x{}",
                path.display(),
                frame.width(),
                frame.height(),
                self.info.width,
                self.info.height
            )));
        }
        Ok(Some(frame))
    }
}

/// 图片序列写出: `frame_000000.png`, `frame_000001.png`, ...
pub struct ImageSequenceWriter {
    dir: PathBuf,
    written: u64,
}

impl ImageSequenceWriter {
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        frame.save(&path)?;
        debug!("写出 {}", path.display());
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        info!("💾 已写出 {} 帧到 {}", self.written, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dir_is_open_error() {
        let err = ImageSequenceReader::open("/nonexistent/frames").err();
        assert!(matches!(err, Some(Error::VideoOpen { .. })));
    }

    #[test]
    fn test_frames_read_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("b.png", 20u8), ("a.png", 10), ("notes.txt", 0)] {
            let path = dir.path().join(name);
            if name.ends_with(".txt") {
                fs::write(&path, "ignored").unwrap();
            } else {
                RgbImage::from_pixel(4, 3, image::Rgb([shade, 0, 0])).save(&path).unwrap();
            }
        }

        let mut reader = ImageSequenceReader::open(dir.path()).unwrap();
        assert_eq!(reader.info().frame_count, Some(2));
        assert_eq!((reader.info().width, reader.info().height), (4, 3));
        assert_eq!(reader.next_frame().unwrap().unwrap().get_pixel(0, 0)[0], 10);
        assert_eq!(reader.next_frame().unwrap().unwrap().get_pixel(0, 0)[0], 20);
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_empty_dir_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceReader::open(dir.path()),
            Err(Error::VideoOpen { .. })
        ));
    }

    #[test]
    fn test_writer_numbers_frames() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut writer = ImageSequenceWriter::create(&out).unwrap();
        writer.write_frame(&RgbImage::new(2, 2)).unwrap();
        writer.write_frame(&RgbImage::new(2, 2)).unwrap();
        writer.finish().unwrap();
        assert!(out.join("frame_000001.png").is_file());
        assert_eq!(writer.written(), 2);
    }
}
