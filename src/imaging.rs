//! 图像小工具: 缩放、边缘滤镜、帧率统计

use std::collections::VecDeque;
use std::time::Instant;

use fast_image_resize as fr;
use image::{imageops, DynamicImage, RgbImage};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;

use crate::{Error, Result};

/// 默认缩放比例
pub const DEFAULT_SCALE: f32 = 0.75;

/// 13x13 高斯核对应的 sigma (0.3 * ((k - 1) * 0.5 - 1) + 0.8)
pub const BLUR_SIGMA: f32 = 0.3 * ((13.0 - 1.0) * 0.5 - 1.0) + 0.8;

pub const CANNY_LOW: f32 = 50.0;
pub const CANNY_HIGH: f32 = 70.0;

/// 按比例缩放 (区域平均, 适合缩小)
///
/// 输出尺寸为 `floor(w * scale) x floor(h * scale)`
pub fn rescale_frame(image: &RgbImage, scale: f32) -> Result<RgbImage> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::Resize(format!("缩放比例必须大于0: {}", scale)));
    }
    let width = (image.width() as f32 * scale).floor() as u32;
    let height = (image.height() as f32 * scale).floor() as u32;
    if width == 0 || height == 0 {
        return Err(Error::Resize(format!(
            "缩放后尺寸为空: {}x{} * {}",
            image.width(),
            image.height(),
            scale
        )));
    }

    let src = fr::images::Image::from_vec_u8(
        image.width(),
        image.height(),
        image.as_raw().clone(),
        fr::PixelType::U8x3,
    )
    .map_err(|e| Error::Resize(e.to_string()))?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Box)),
        )
        .map_err(|e| Error::Resize(e.to_string()))?;

    RgbImage::from_raw(width, height, dst.into_vec())
        .ok_or_else(|| Error::Resize("缩放结果尺寸不匹配".to_string()))
}

/// 滤镜模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// 翻转 + 模糊
    #[default]
    Preview,
    /// 翻转 + 模糊 + Canny 边缘
    Canny,
}

impl std::str::FromStr for FilterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "preview" | "p" => Ok(Self::Preview),
            "canny" | "c" => Ok(Self::Canny),
            other => Err(Error::Config(format!("未知滤镜模式: {}", other))),
        }
    }
}

/// 摄像头边缘检测演示的滤镜
#[derive(Debug, Clone, Copy)]
pub struct EdgeFilter {
    pub mode: FilterMode,
    pub sigma: f32,
    pub low: f32,
    pub high: f32,
}

impl Default for EdgeFilter {
    fn default() -> Self {
        Self::new(FilterMode::Preview)
    }
}

impl EdgeFilter {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            mode,
            sigma: BLUR_SIGMA,
            low: CANNY_LOW,
            high: CANNY_HIGH,
        }
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let flipped = imageops::flip_horizontal(image);
        let blurred = gaussian_blur_f32(&flipped, self.sigma);
        match self.mode {
            FilterMode::Preview => blurred,
            FilterMode::Canny => {
                let gray = imageops::grayscale(&blurred);
                let edges = canny(&gray, self.low, self.high);
                DynamicImage::ImageLuma8(edges).into_rgb8()
            }
        }
    }
}

/// 帧率统计
///
/// `tick()` 返回与上一帧的瞬时帧率, `average()` 为最近窗口内的平均值
pub struct FpsCounter {
    last: Option<Instant>,
    window: VecDeque<f64>,
    capacity: usize,
    pub count: u64,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(30)
    }
}

impl FpsCounter {
    pub fn new(capacity: usize) -> Self {
        Self {
            last: None,
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            count: 0,
        }
    }

    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f64 {
        self.count += 1;
        let fps = match self.last.replace(now) {
            Some(prev) => {
                let dt = now.saturating_duration_since(prev).as_secs_f64();
                if dt > 0.0 {
                    1.0 / dt
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        if fps > 0.0 {
            if self.window.len() == self.capacity {
                self.window.pop_front();
            }
            self.window.push_back(fps);
        }
        fps
    }

    pub fn average(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rescale_floor_size() {
        let img = RgbImage::from_pixel(101, 50, image::Rgb([40, 80, 120]));
        let out = rescale_frame(&img, 0.75).unwrap();
        assert_eq!(out.dimensions(), (75, 37));
        // 纯色图缩放后颜色不变
        let px = out.get_pixel(10, 10).0;
        for (got, want) in px.iter().zip([40u8, 80, 120]) {
            assert!(got.abs_diff(want) <= 1);
        }
    }

    #[test]
    fn test_rescale_rejects_bad_scale() {
        let img = RgbImage::new(10, 10);
        assert!(rescale_frame(&img, 0.0).is_err());
        assert!(rescale_frame(&img, -1.0).is_err());
        assert!(rescale_frame(&img, 0.01).is_err());
    }

    #[test]
    fn test_blur_sigma_matches_kernel_13() {
        assert!((BLUR_SIGMA - 2.3).abs() < 1e-5);
    }

    #[test]
    fn test_preview_flips() {
        let mut img = RgbImage::new(40, 10);
        for y in 0..10 {
            for x in 0..10 {
                img.put_pixel(x, y, image::Rgb([255, 255, 255]));
            }
        }
        let out = EdgeFilter::new(FilterMode::Preview).apply(&img);
        assert_eq!(out.dimensions(), (40, 10));
        // 白块翻转到右侧
        assert!(out.get_pixel(38, 5).0[0] > 200);
        assert!(out.get_pixel(1, 5).0[0] < 50);
    }

    #[test]
    fn test_canny_finds_edge() {
        let mut img = RgbImage::new(64, 64);
        for y in 0..64 {
            for x in 32..64 {
                img.put_pixel(x, y, image::Rgb([255, 255, 255]));
            }
        }
        let out = EdgeFilter::new(FilterMode::Canny).apply(&img);
        let edge_pixels = out.pixels().filter(|p| p.0[0] == 255).count();
        assert!(edge_pixels > 0);
        // 平坦区域没有边缘
        assert_eq!(out.get_pixel(5, 32).0, [0, 0, 0]);
    }

    #[test]
    fn test_filter_mode_parse() {
        assert_eq!("canny".parse::<FilterMode>().unwrap(), FilterMode::Canny);
        assert_eq!("P".parse::<FilterMode>().unwrap(), FilterMode::Preview);
        assert!("sobel".parse::<FilterMode>().is_err());
    }

    #[test]
    fn test_fps_counter() {
        let mut fps = FpsCounter::new(2);
        let t0 = Instant::now();
        assert_eq!(fps.tick_at(t0), 0.0);
        let f = fps.tick_at(t0 + Duration::from_millis(100));
        assert!((f - 10.0).abs() < 1e-6);
        fps.tick_at(t0 + Duration::from_millis(150));
        assert!((fps.average() - 15.0).abs() < 1e-6);
        assert_eq!(fps.count, 3);
    }
}
