//! 多目标跟踪 (Multi-object tracking)
//!
//! - KalmanBoxFilter: 边界框运动模型
//! - linear_assignment: 匈牙利算法最优匹配
//! - ByteTracker: 高低分两阶段关联 + 轨迹状态机
pub mod bytetrack;
pub mod hungarian;
pub mod kalman;
pub mod track;

pub use bytetrack::ByteTracker;
pub use hungarian::{linear_assignment, Assignment};
pub use kalman::KalmanBoxFilter;
pub use track::{Track, TrackPoint, TrackState, TrackedObject};

use crate::types::BBox;

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker {
    /// 输入当前帧的检测框, 返回本帧确认的跟踪对象
    fn update(&mut self, detections: &[BBox]) -> Vec<TrackedObject>;

    /// 重置跟踪器 (清除所有跟踪, ID 从1重新开始)
    fn reset(&mut self);

    /// 获取当前确认的跟踪数量
    fn track_count(&self) -> usize;
}

// ========== 工具函数 ==========

/// 根据ID生成不同颜色
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_colors_differ_and_are_stable() {
        assert_eq!(id_to_color(3), id_to_color(3));
        assert_ne!(id_to_color(1), id_to_color(2));
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), (0, 0, 255));
    }
}
