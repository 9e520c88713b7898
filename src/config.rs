//! 系统配置 - 通过JSON文件调整参数
//!
//! 所有字段都有默认值, 配置文件里只写需要覆盖的部分即可。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Error, Result};

/// 检测器参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: String,     // ONNX 权重路径
    pub conf: f32,         // 置信度阈值
    pub iou: f32,          // NMS IOU阈值
    pub input_size: u32,   // 网络输入尺寸 (模型为动态尺寸时使用)
    pub cuda: bool,        // 使用 CUDA 执行器
    pub device_id: i32,    // GPU 编号
    pub classes: Vec<String>, // 只保留这些类别 (空 = 全部)
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: "models/best.onnx".to_string(),
            conf: 0.1,
            iou: 0.45,
            input_size: 640,
            cuda: false,
            device_id: 0,
            classes: Vec::new(),
        }
    }
}

/// ByteTrack 参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub high_thresh: f32,            // 高分阈值
    pub low_thresh: f32,             // 低分阈值 (救援用)
    pub new_track_thresh: f32,       // 新建轨迹阈值
    pub match_thresh: f32,           // 第一轮匹配代价上限 (1 - IOU)
    pub low_match_thresh: f32,       // 第二轮匹配代价上限
    pub tentative_match_thresh: f32, // 待确认轨迹匹配代价上限
    pub min_hits: u32,               // 确认所需连续命中次数
    pub max_time_lost: u32,          // 最大丢失帧数
    pub trajectory_len: usize,       // 轨迹点保留数量

    // 卡尔曼滤波
    pub kalman_process_noise: f32,
    pub kalman_obs_noise: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            high_thresh: 0.5,
            low_thresh: 0.1,
            new_track_thresh: 0.6,
            match_thresh: 0.8,
            low_match_thresh: 0.5,
            tentative_match_thresh: 0.7,
            min_hits: 2,
            max_time_lost: 30,
            trajectory_len: 50,
            kalman_process_noise: 0.1,
            kalman_obs_noise: 1.0,
        }
    }
}

/// 流水线参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,                       // 每批检测帧数
    pub channel_capacity: usize,                 // 线程间队列长度
    pub untracked_classes: Vec<String>,          // 不跟踪, 每帧取最高分 (如 ball)
    pub class_aliases: BTreeMap<String, String>, // 类别重命名 (如 goalkeeper → player)
    pub log_every: u64,                          // 每N帧打印一次统计
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut class_aliases = BTreeMap::new();
        class_aliases.insert("goalkeeper".to_string(), "player".to_string());
        Self {
            batch_size: 20,
            channel_capacity: 40,
            untracked_classes: vec!["ball".to_string()],
            class_aliases,
            log_every: 60,
        }
    }
}

/// 画面标注参数
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    pub font: Option<String>, // TTF/OTF 字体路径, 为空则不绘制文字
    pub draw_trajectory: bool,
}

/// 全部配置
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub pipeline: PipelineConfig,
    pub annotate: AnnotateConfig,
}

impl AppConfig {
    /// 从JSON文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("读取 {} 失败: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(Error::Config(format!("{} 必须在 [0, 1] 范围内, 当前 {}", name, v)))
            }
        };
        unit("detector.conf", self.detector.conf)?;
        unit("detector.iou", self.detector.iou)?;
        unit("tracker.high_thresh", self.tracker.high_thresh)?;
        unit("tracker.low_thresh", self.tracker.low_thresh)?;
        unit("tracker.new_track_thresh", self.tracker.new_track_thresh)?;
        unit("tracker.match_thresh", self.tracker.match_thresh)?;
        unit("tracker.low_match_thresh", self.tracker.low_match_thresh)?;
        unit("tracker.tentative_match_thresh", self.tracker.tentative_match_thresh)?;

        if self.tracker.low_thresh > self.tracker.high_thresh {
            return Err(Error::Config(
                "tracker.low_thresh 不能大于 tracker.high_thresh".to_string(),
            ));
        }
        if self.tracker.min_hits == 0 {
            return Err(Error::Config("tracker.min_hits 至少为 1".to_string()));
        }
        if self.pipeline.batch_size == 0 {
            return Err(Error::Config("pipeline.batch_size 至少为 1".to_string()));
        }
        if self.pipeline.channel_capacity == 0 {
            return Err(Error::Config("pipeline.channel_capacity 至少为 1".to_string()));
        }
        if self.detector.input_size == 0 || self.detector.input_size % 32 != 0 {
            return Err(Error::Config(format!(
                "detector.input_size 必须是32的正整数倍, 当前 {}",
                self.detector.input_size
            )));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!(
            "🎛️  检测: conf={:.2} iou={:.2} batch={} | 跟踪: high={:.2} low={:.2} max_lost={}",
            self.detector.conf,
            self.detector.iou,
            self.pipeline.batch_size,
            self.tracker.high_thresh,
            self.tracker.low_thresh,
            self.tracker.max_time_lost
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = AppConfig::default();
        assert_eq!(config.detector.conf, 0.1);
        assert_eq!(config.pipeline.batch_size, 20);
        assert_eq!(
            config.pipeline.class_aliases.get("goalkeeper").map(String::as_str),
            Some("player")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "tracker": { "max_time_lost": 90 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tracker.max_time_lost, 90);
        assert_eq!(config.tracker.min_hits, 2);
        assert_eq!(config.detector.input_size, 640);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.pipeline.batch_size = 8;
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.pipeline.batch_size, 8);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = AppConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.detector.conf = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.detector.input_size = 650;
        assert!(config.validate().is_err());
    }
}
