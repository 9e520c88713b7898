#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // 画面标注
pub mod config; // 配置参数
pub mod detection; // 检测接口
pub mod error; // 错误类型
pub mod imaging; // 缩放 / 滤镜小工具
pub mod logging; // 日志初始化
pub mod models; // 模型接口与具体实现
pub mod ort_backend;
pub mod pipeline; // 检测 + 跟踪流水线
pub mod tracking; // 多目标跟踪
pub mod types; // 公共数据结构
pub mod video; // 视频输入输出

pub use crate::annotate::Annotator;
pub use crate::config::AppConfig;
pub use crate::detection::{non_max_suppression, Detector};
pub use crate::error::{Error, Result};
pub use crate::models::YOLOv8;
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::pipeline::{run_streaming, FrameTracks, ObjectTracker, ObjectTracks, PipelineStats};
pub use crate::tracking::{ByteTracker, Tracker};
pub use crate::types::{BBox, Frame};

/// 当前时间字符串 (北京时间), 用于生成默认输出文件名
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = match chrono::FixedOffset::east_opt(8 * 60 * 60) {
        Some(offset) => chrono::Utc::now().with_timezone(&offset).naive_local(),
        None => chrono::Utc::now().naive_utc(),
    };
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
