// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 模型接口与具体实现
///
/// # 架构说明
/// - **YOLOv8 / YOLOv11**: 输出 `[batch, 4 + nc, anchors]`, 需要 NMS
/// - **YOLOv10**: 端到端输出 `[batch, N, 6]` (x1, y1, x2, y2, conf, cls), 无需 NMS
///
/// 三者共用同一套预处理, 由 `YOLOv8` 结构体统一实现 `Detector` trait。
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::{Error, Result};

pub mod yolov8;

pub use yolov8::{
    decode_end2end, decode_predictions, letterbox, run_in_fixed_batches, LetterboxInfo, YOLOv8,
};

/// 模型类型枚举（用于自动识别模型）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// YOLOv8 标准模型
    YOLOv8,
    /// YOLOv10 端到端模型 (NMS-Free)
    YOLOv10,
    /// YOLOv11 改进模型 (输出格式与v8相同)
    YOLOv11,
}

impl ModelType {
    /// 从模型文件名推断模型类型
    ///
    /// 只看文件名 (不含目录和扩展名), 形如 `yolov10n` / `yolo11s` / `yolov8x`;
    /// 无法识别的一律按 YOLOv8 处理。
    pub fn from_path(path: &str) -> Self {
        static VERSION: OnceLock<Option<Regex>> = OnceLock::new();
        let stem = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let version = VERSION
            .get_or_init(|| Regex::new(r"(?:^|[^a-z0-9])yolo[-_]?v?(\d+)").ok())
            .as_ref()
            .and_then(|re| re.captures(&stem))
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());
        match version {
            Some(10) => ModelType::YOLOv10,
            Some(11) => ModelType::YOLOv11,
            _ => ModelType::YOLOv8,
        }
    }

    /// 是否需要 NMS 后处理
    pub fn needs_nms(&self) -> bool {
        !matches!(self, ModelType::YOLOv10)
    }
}

/// COCO 80 类 (模型缺少 names 元数据时的回退)
pub const COCO_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

pub fn coco_names() -> Vec<String> {
    COCO_NAMES.iter().map(|s| s.to_string()).collect()
}

/// names 元数据允许的最大类别数
pub const MAX_CLASSES: usize = 10_000;

/// 解析 Ultralytics 导出的 names 元数据
///
/// 格式形如 `{0: 'ball', 1: 'goalkeeper', 2: 'player', 3: 'referee'}`,
/// 缺失的下标以 `class{i}` 填充。下标超出 `MAX_CLASSES` 视为损坏的元数据。
pub fn parse_names(raw: &str) -> Result<Vec<String>> {
    static ENTRY: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(entry) = ENTRY
        .get_or_init(|| Regex::new(r#"(\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#).ok())
        .as_ref()
    else {
        return Ok(Vec::new());
    };

    let mut pairs: Vec<(usize, String)> = entry
        .captures_iter(raw)
        .filter_map(|cap| {
            let id = cap.get(1)?.as_str();
            let name = cap.get(2).or_else(|| cap.get(3))?.as_str().to_string();
            Some((id, name))
        })
        .map(|(id, name)| match id.parse::<usize>() {
            Ok(id) if id < MAX_CLASSES => Ok((id, name)),
            _ => Err(Error::Model(format!(
                "names 元数据中的类别下标 {} 超出上限 {}",
                id, MAX_CLASSES
            ))),
        })
        .collect::<Result<_>>()?;
    pairs.sort_by_key(|(id, _)| *id);

    let len = pairs.last().map(|(id, _)| id + 1).unwrap_or(0);
    let mut names: Vec<String> = (0..len).map(|i| format!("class{}", i)).collect();
    for (id, name) in pairs {
        names[id] = name;
    }
    Ok(names)
}

/// 类别名 → 类别ID (用于 `--classes` 过滤)
pub fn resolve_class_ids(names: &[String], wanted: &[String]) -> Result<Vec<u32>> {
    wanted
        .iter()
        .map(|w| {
            names
                .iter()
                .position(|n| n == w)
                .map(|i| i as u32)
                .ok_or_else(|| {
                    Error::Config(format!("模型中没有类别 '{}', 可选: {}", w, names.join(", ")))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ultralytics_names() {
        let names =
            parse_names("{0: 'ball', 1: 'goalkeeper', 2: 'player', 3: 'referee'}").unwrap();
        assert_eq!(names, vec!["ball", "goalkeeper", "player", "referee"]);
    }

    #[test]
    fn test_parse_names_with_gaps_and_quotes() {
        let names = parse_names(r#"{2: "o'neil", 0: 'a b'}"#).unwrap();
        assert_eq!(names, vec!["a b", "class1", "o'neil"]);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_names("not a dict").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_huge_index() {
        for raw in [
            "{18446744073709551615: 'x'}",
            "{99999999999999999999999: 'x'}",
            "{0: 'ball', 4000000000: 'x'}",
        ] {
            assert!(matches!(parse_names(raw), Err(Error::Model(_))), "{}", raw);
        }
        let last = format!("{{{}: 'x'}}", MAX_CLASSES - 1);
        assert_eq!(parse_names(&last).unwrap().len(), MAX_CLASSES);
    }

    #[test]
    fn test_model_type_from_path() {
        assert_eq!(ModelType::from_path("models/yolov10n.onnx"), ModelType::YOLOv10);
        assert_eq!(ModelType::from_path("models/yolo11s.onnx"), ModelType::YOLOv11);
        assert_eq!(ModelType::from_path("models/best.onnx"), ModelType::YOLOv8);
        assert_eq!(ModelType::from_path("YOLOv10x.onnx"), ModelType::YOLOv10);
        assert_eq!(ModelType::from_path("models/yolov8x.onnx"), ModelType::YOLOv8);
    }

    #[test]
    fn test_model_type_ignores_directories() {
        assert_eq!(ModelType::from_path("runs/dev10/best.onnx"), ModelType::YOLOv8);
        assert_eq!(ModelType::from_path("yolov10/train/weights/best.onnx"), ModelType::YOLOv8);
        assert_eq!(ModelType::from_path("models/dev11.onnx"), ModelType::YOLOv8);
        assert!(!ModelType::YOLOv10.needs_nms());
    }

    #[test]
    fn test_resolve_class_ids() {
        let names = coco_names();
        assert_eq!(
            resolve_class_ids(&names, &["person".to_string(), "sports ball".to_string()]).unwrap(),
            vec![0, 32]
        );
        assert!(resolve_class_ids(&names, &["goalpost".to_string()]).is_err());
    }
}
