//! 车流检测与越线计数
//!
//! 主程序入口 - 直接运行: cargo run --bin traffic-counter --release -- --input traffic.mp4
use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yolo_traffic::detection::{ByteTracker, DetectionLog, ReplayDetector, TrackingDetector};
use yolo_traffic::input::{transcode, ImageSequenceReader, ImageSequenceWriter};
use yolo_traffic::models::YOLOv8Config;
use yolo_traffic::{
    process_video, Args, ClassNames, CounterConfig, Detect, FrameAnnotator, FrameBudget,
    FrameProcessor, LineCounter, Mode, YOLOv8,
};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("yolo_traffic=info,traffic_counter=info,ort=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CounterConfig::load(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => CounterConfig::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;
    config.print_summary();

    let detector = build_detector(&args, &config)?;
    let font = FrameAnnotator::load_font(config.font_path.as_deref())?;
    let annotator = FrameAnnotator::new(config.overlay.clone(), font);
    let budget = FrameBudget::new(config.frame_limit);

    let mut processor = match args.mode {
        Mode::Detect => FrameProcessor::detect_only(detector, annotator, budget),
        Mode::Count => {
            let classes = if config.count_classes.is_empty() {
                detector.class_names().clone()
            } else {
                detector.class_names().select(&config.count_classes)?
            };
            let counter = LineCounter::new(config.line_ratio, config.threshold, classes);
            FrameProcessor::counting(detector, counter, annotator, budget)
        }
    };

    let output = args.output_path();
    let summary = if args.input.is_dir() {
        let source = ImageSequenceReader::open(&args.input)?;
        let sink = ImageSequenceWriter::create(&output)?;
        process_video(source, sink, &mut processor)?
    } else {
        transcode(&args.input, &output, processor)
            .with_context(|| format!("处理视频失败: {}", args.input.display()))?
    };

    summary.log();
    if summary.truncated {
        warn!("⚠️ 视频超过帧数上限, 输出只包含前 {} 帧", summary.frames_processed);
    }
    info!("📦 输出: {}", output.display());

    if let Some(report) = &args.report {
        fs::write(report, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("写入报告失败: {}", report.display()))?;
        info!("📝 报告: {}", report.display());
    }

    // 计数结果输出到 stdout, 便于脚本读取
    for tally in &summary.counts {
        println!("{}\t{}", tally.name, tally.count);
    }
    Ok(())
}

/// 检测器组合: 模型 / 回放 → (记录) → (跟踪)
fn build_detector(args: &Args, config: &CounterConfig) -> Result<Box<dyn Detect>> {
    let mut detector: Box<dyn Detect> = match &args.detections {
        Some(log) => Box::new(
            ReplayDetector::open(log, ClassNames::coco())
                .with_context(|| format!("读取检测日志失败: {}", log.display()))?,
        ),
        None => {
            let model = YOLOv8Config {
                conf: config.conf,
                iou: config.iou,
                input_size: config.input_size,
                cuda: args.cuda,
                ..YOLOv8Config::new(&args.model)
            };
            Box::new(YOLOv8::new(model)?)
        }
    };

    if let Some(dump) = &args.dump_detections {
        detector = Box::new(DetectionLog::create(detector, dump)?);
    }

    if args.mode == Mode::Count && !args.no_track {
        detector = Box::new(TrackingDetector::new(detector, ByteTracker::new(config.tracker)));
    }
    Ok(detector)
}
