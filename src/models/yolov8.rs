// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型 (onnxruntime)
// 包含: 模型加载、预处理、推理、后处理

use std::path::{Path, PathBuf};
use std::time::Instant;

use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{ArrayView2, Axis};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info, warn};

use crate::detection::types::INF_SIZE;
use crate::detection::{ClassNames, Detect, Detection};
use crate::error::{Error, Result};
use crate::non_max_suppression;

const CXYWH_OFFSET: usize = 4;

/// 填充色 (与 Ultralytics 预处理一致)
const PAD_VALUE: f32 = 144.0 / 255.0;

/// YOLOv8 加载参数
#[derive(Clone, Debug)]
pub struct YOLOv8Config {
    pub model: PathBuf,
    /// 置信度阈值
    pub conf: f32,
    /// NMS IOU阈值
    pub iou: f32,
    /// 输入尺寸 (正方形)
    pub input_size: u32,
    pub cuda: bool,
}

impl YOLOv8Config {
    pub fn new<P: AsRef<Path>>(model: P) -> Self {
        Self {
            model: model.as_ref().to_path_buf(),
            conf: 0.25,
            iou: 0.45,
            input_size: INF_SIZE,
            cuda: false,
        }
    }
}

/// YOLOv8 检测模型
pub struct YOLOv8 {
    session: Session,
    names: ClassNames,
    conf: f32,
    iou: f32,
    input_size: u32,
    resizer: fr::Resizer,
    // 统计
    count: u64,
    total_ms: f64,
}

impl YOLOv8 {
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        if !config.model.is_file() {
            return Err(Error::Model(format!(
                "model file not found: {}",
                config.model.display()
            )));
        }

        let mut builder = Session::builder()
            .map_err(|e| Error::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| Error::Model(e.to_string()))?;
        if config.cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| Error::Model(e.to_string()))?;
        }
        let session = builder
            .commit_from_file(&config.model)
            .map_err(|e| Error::Model(e.to_string()))?;

        let names = match read_names(&session) {
            Some(names) => names,
            None => {
                warn!("⚠️ 模型未携带类别表, 使用 COCO 80类");
                ClassNames::coco()
            }
        };

        info!(
            "✅ YOLOv8 模型已加载: {} ({}类, 输入 {}x{}, EP: {})",
            config.model.display(),
            names.len(),
            config.input_size,
            config.input_size,
            if config.cuda { "CUDA" } else { "CPU" }
        );

        Ok(Self {
            session,
            names,
            conf: config.conf,
            iou: config.iou,
            input_size: config.input_size,
            resizer: fr::Resizer::new(),
            count: 0,
            total_ms: 0.0,
        })
    }

    /// 预处理: 保持比例缩放后贴到左上角, 输出 CHW f32 与缩放比例
    pub fn preprocess(&mut self, frame: &RgbImage) -> Result<(Vec<f32>, f32)> {
        let size = self.input_size;
        let (w0, h0) = frame.dimensions();
        let (ratio, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, size as f32, size as f32);
        let w_new = (w_new as u32).clamp(1, size);
        let h_new = (h_new as u32).clamp(1, size);

        let src_image = fr::images::Image::from_vec_u8(w0, h0, frame.as_raw().clone(), fr::PixelType::U8x3)
            .map_err(|e| Error::Model(format!("resize source: {}", e)))?;
        let mut dst_image = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
        self.resizer
            .resize(
                &src_image,
                &mut dst_image,
                &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Nearest),
            )
            .map_err(|e| Error::Model(format!("resize: {}", e)))?;

        let plane = (size * size) as usize;
        let mut input = vec![PAD_VALUE; 3 * plane];
        for (i, rgb) in dst_image.buffer().chunks_exact(3).enumerate() {
            let x = i % w_new as usize;
            let y = i / w_new as usize;
            let offset = y * size as usize + x;
            input[offset] = rgb[0] as f32 / 255.0;
            input[plane + offset] = rgb[1] as f32 / 255.0;
            input[2 * plane + offset] = rgb[2] as f32 / 255.0;
        }

        Ok((input, ratio))
    }
}

impl Detect for YOLOv8 {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let start = Instant::now();
        let (input, ratio) = self.preprocess(frame)?;

        let size = self.input_size as usize;
        let shape = [1usize, 3, size, size];
        let input_value = Value::from_array((shape.as_slice(), input.into_boxed_slice()))
            .map_err(|e| Error::Model(e.to_string()))?;

        let (conf, iou) = (self.conf, self.iou);
        let (w0, h0) = (frame.width() as f32, frame.height() as f32);
        let detections = {
            let outputs = self
                .session
                .run(ort::inputs![input_value])
                .map_err(|e| Error::Model(e.to_string()))?;
            let (out_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Model(e.to_string()))?;
            let dims: Vec<usize> = out_shape.iter().map(|&d| d.max(0) as usize).collect();
            decode_output(data, &dims, ratio, (w0, h0), conf, iou)?
        };

        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        self.count += 1;
        self.total_ms += elapsed;
        debug!(detections = detections.len(), ms = elapsed, "YOLOv8 推理");

        Ok(detections)
    }

    fn class_names(&self) -> &ClassNames {
        &self.names
    }

    fn average_ms(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total_ms / self.count as f64)
    }
}

fn read_names(session: &Session) -> Option<ClassNames> {
    let metadata = session.metadata().ok()?;
    let raw = metadata.custom("names").ok()??;
    ClassNames::parse_ultralytics(&raw)
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 解码 YOLOv8 输出 `[1, 4+nc, anchors]`
///
/// 每个 anchor 取最高类别分数, 低于 `conf` 丢弃; 坐标除以 `ratio` 还原到原图并裁剪到
/// `frame_size` 范围内; 最后执行按类别的 NMS.
pub fn decode_output(
    data: &[f32],
    shape: &[usize],
    ratio: f32,
    frame_size: (f32, f32),
    conf: f32,
    iou: f32,
) -> Result<Vec<Detection>> {
    let (features, anchors) = match shape {
        [1, f, a] if *f > CXYWH_OFFSET => (*f, *a),
        _ => {
            return Err(Error::Model(format!(
                "unexpected output shape {:?}, expected [1, 4+nc, anchors]",
                shape
            )))
        }
    };
    let preds = ArrayView2::from_shape((features, anchors), data)
        .map_err(|e| Error::Model(e.to_string()))?;

    let (width_original, height_original) = frame_size;
    let mut detections = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let best = pred
            .iter()
            .skip(CXYWH_OFFSET)
            .enumerate()
            .fold(None, |max: Option<(usize, f32)>, (id, &score)| match max {
                Some((_, m)) if m >= score => max,
                _ => Some((id, score)),
            });
        let (id, confidence) = match best {
            Some(best) => best,
            None => continue,
        };
        if confidence < conf {
            continue;
        }

        let cx = pred[0] / ratio;
        let cy = pred[1] / ratio;
        let w = pred[2] / ratio;
        let h = pred[3] / ratio;
        let x1 = (cx - w / 2.).clamp(0.0, width_original);
        let y1 = (cy - h / 2.).clamp(0.0, height_original);
        let x2 = (cx + w / 2.).clamp(0.0, width_original);
        let y2 = (cy + h / 2.).clamp(0.0, height_original);
        detections.push(Detection::new(x1, y1, x2, y2, id as u32, confidence));
    }

    non_max_suppression(&mut detections, iou);
    Ok(detections)
}
