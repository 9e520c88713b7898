/// 检测/跟踪系统公共数据结构
/// Shared data structures for detection and tracking
use image::RgbImage;
use serde::{Deserialize, Serialize};

// ========== 数据结构 ==========

/// 检测框 (xyxy, 像素坐标)
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    /// 由左上角 + 宽高构造
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32, confidence: f32, class_id: u32) -> Self {
        Self::new(x, y, x + w, y + h, confidence, class_id)
    }

    /// 由 (cx, cy, aspect=w/h, h) 构造
    pub fn from_xyah(cx: f32, cy: f32, aspect: f32, h: f32) -> Self {
        let w = aspect * h;
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0, 1.0, 0)
    }

    pub fn to_xyah(&self) -> [f32; 4] {
        let (cx, cy) = self.center();
        let h = self.height();
        let aspect = if h > 0.0 { self.width() / h } else { 0.0 };
        [cx, cy, aspect, h]
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 底边中点 (球员脚下位置)
    pub fn bottom_center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, self.y2)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        compute_iou(self, other)
    }

    /// 限制在图像范围内
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
            ..self.clone()
        }
    }

    pub fn xyxy(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// 已解码帧 (解码线程 → 检测线程)
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

// ========== 工具函数 ==========

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = bbox1.area() + bbox2.area() - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}
