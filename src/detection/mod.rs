/// 检测系统 (Detection System)
///
/// - Detector: 目标检测统一接口
/// - non_max_suppression: 同类别重叠框抑制
use image::DynamicImage;

use crate::types::BBox;
use crate::Result;

/// 目标检测器 Trait
///
/// 任何模型 (ONNX / 测试桩) 实现此接口即可接入跟踪流水线
pub trait Detector {
    /// 类别名, 下标即类别ID
    fn class_names(&self) -> &[String];

    /// 批量检测, 每张输入图片返回一组检测框 (顺序与输入一致)
    fn detect(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<BBox>>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn class_names(&self) -> &[String] {
        (**self).class_names()
    }

    fn detect(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<BBox>>> {
        (**self).detect(images)
    }
}

/// 非极大值抑制 (按置信度降序, 只抑制同类别的重叠框)
pub fn non_max_suppression(xs: &mut Vec<BBox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id != xs[index].class_id {
                continue;
            }
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}
