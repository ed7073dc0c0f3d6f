use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// 视频无法打开 (在处理循环开始之前报告)
    #[error("cannot read video {}: {reason}", .path.display())]
    VideoOpen { path: PathBuf, reason: String },

    #[error("video processing failed: {0}")]
    Pipeline(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
