//! 简化卡尔曼滤波器 (用于单个边界框的位置和尺寸平滑)

use crate::types::BBox;

/// 状态向量: [x_center, y_center, width, height, vx, vy, vw, vh]
/// 协方差简化为对角阵, 各分量独立更新。
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    /// 状态估计: [cx, cy, w, h, vx, vy, vw, vh]
    state: [f32; 8],

    /// 估计误差协方差 (对角)
    p: [f32; 8],

    /// 过程噪声 (运动不确定性)
    q: f32,

    /// 观测噪声 (测量不确定性)
    r: f32,
}

impl KalmanBoxFilter {
    /// 创建新的卡尔曼滤波器
    ///
    /// # 参数
    /// - `bbox`: 初始边界框
    /// - `q`: 过程噪声 (0.1-1.0, 越小越平滑)
    /// - `r`: 观测噪声 (1.0-50.0, 越大越平滑)
    pub fn new(bbox: &BBox, q: f32, r: f32) -> Self {
        let (cx, cy) = bbox.center();
        Self {
            state: [cx, cy, bbox.width(), bbox.height(), 0.0, 0.0, 0.0, 0.0], // 初始速度为0
            p: [10.0; 8],
            q,
            r,
        }
    }

    /// 预测下一帧状态 (匀速运动模型)
    pub fn predict(&mut self) {
        self.state[0] += self.state[4];
        self.state[1] += self.state[5];
        self.state[2] += self.state[6];
        self.state[3] += self.state[7];

        // 协方差预测: P = P + Q
        for p in self.p.iter_mut() {
            *p += self.q;
        }
    }

    /// 更新 (融合观测值)
    pub fn update(&mut self, bbox: &BBox) {
        let (cx, cy) = bbox.center();

        // 观测残差
        let y = [
            cx - self.state[0],
            cy - self.state[1],
            bbox.width() - self.state[2],
            bbox.height() - self.state[3],
        ];

        // 卡尔曼增益: K = P / (P + R), 速度分量增益降低
        let mut k = [0.0f32; 8];
        for i in 0..4 {
            k[i] = self.p[i] / (self.p[i] + self.r);
            k[i + 4] = self.p[i + 4] / (self.p[i + 4] + self.r * 5.0);
        }

        for i in 0..4 {
            self.state[i] += k[i] * y[i];
            self.state[i + 4] += k[i + 4] * y[i];
        }

        // 协方差更新: P = (I - K) * P
        for (p, k) in self.p.iter_mut().zip(k.iter()) {
            *p *= 1.0 - k;
        }
    }

    /// 获取当前状态的边界框
    pub fn state_bbox(&self) -> BBox {
        let w = self.state[2].max(1.0);
        let h = self.state[3].max(1.0);
        BBox::new(
            self.state[0] - w / 2.0,
            self.state[1] - h / 2.0,
            self.state[0] + w / 2.0,
            self.state[1] + h / 2.0,
            1.0,
            0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_matches_bbox() {
        let bbox = BBox::new(10.0, 20.0, 50.0, 100.0, 0.9, 0);
        let kf = KalmanBoxFilter::new(&bbox, 0.1, 1.0);
        assert_eq!(kf.state_bbox().xyxy(), bbox.xyxy());
        assert_eq!((kf.state[4], kf.state[5]), (0.0, 0.0));
    }

    #[test]
    fn test_learns_constant_velocity() {
        let mut kf = KalmanBoxFilter::new(&BBox::new(0.0, 0.0, 20.0, 40.0, 1.0, 0), 0.1, 1.0);
        for step in 1..=30 {
            kf.predict();
            let x = step as f32 * 4.0;
            kf.update(&BBox::new(x, 0.0, x + 20.0, 40.0, 1.0, 0));
        }
        let (vx, vy) = (kf.state[4], kf.state[5]);
        assert!((vx - 4.0).abs() < 1.0, "vx = {}", vx);
        assert!(vy.abs() < 0.5);

        // 预测一步应该继续向右移动
        let before = kf.state_bbox().center().0;
        kf.predict();
        assert!(kf.state_bbox().center().0 > before);
    }

    #[test]
    fn test_uncertainty_grows_without_updates() {
        let mut kf = KalmanBoxFilter::new(&BBox::new(0.0, 0.0, 10.0, 10.0, 1.0, 0), 0.5, 1.0);
        let u0 = kf.p[0] + kf.p[1];
        kf.predict();
        kf.predict();
        assert!(kf.p[0] + kf.p[1] > u0);
    }

    #[test]
    fn test_size_never_collapses() {
        let mut kf = KalmanBoxFilter::new(&BBox::new(0.0, 0.0, 2.0, 2.0, 1.0, 0), 0.1, 1.0);
        kf.predict();
        kf.update(&BBox::new(0.0, 0.0, 0.0, 0.0, 1.0, 0));
        let b = kf.state_bbox();
        assert!(b.width() >= 1.0 && b.height() >= 1.0);
    }
}
