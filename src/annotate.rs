/// 画面标注 (Annotation)
///
/// - 球员/裁判: 脚下椭圆弧 + ID 标签
/// - 球等不跟踪类别: 头顶倒三角
/// - 基础绘图: 粗线、空心/实心矩形、实心圆、文字
use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_polygon_mut,
    draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::config::AnnotateConfig;
use crate::pipeline::FrameTracks;
use crate::tracking::id_to_color;
use crate::{Error, Result};

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

/// 加载 TTF/OTF 字体
pub fn load_font(path: impl AsRef<Path>) -> Result<FontVec> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    FontVec::try_from_vec(bytes)
        .map_err(|e| Error::Config(format!("字体无效 {}: {}", path.display(), e)))
}

pub struct Annotator {
    font: Option<FontVec>,
    untracked: Vec<String>,
    draw_trajectory: bool,
    warned_no_font: bool,
}

impl Annotator {
    pub fn new(font: Option<FontVec>, untracked: Vec<String>) -> Self {
        Self {
            font,
            untracked,
            draw_trajectory: false,
            warned_no_font: false,
        }
    }

    pub fn from_config(config: &AnnotateConfig, untracked: Vec<String>) -> Result<Self> {
        let font = match &config.font {
            Some(path) => {
                let font = load_font(path)?;
                info!("🔤 字体已加载: {}", path);
                Some(font)
            }
            None => None,
        };
        Ok(Self::new(font, untracked).with_trajectory(config.draw_trajectory))
    }

    pub fn with_trajectory(mut self, enabled: bool) -> Self {
        self.draw_trajectory = enabled;
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 绘制一帧的全部跟踪对象
    pub fn draw_tracks(&mut self, image: &mut RgbImage, tracks: &FrameTracks) {
        for (class, objects) in &tracks.objects {
            let untracked = self.untracked.iter().any(|c| c == class);
            for (&id, record) in objects {
                let [x1, y1, x2, y2] = record.bbox;
                if untracked {
                    draw_marker(image, ((x1 + x2) / 2.0, y1), GREEN);
                    continue;
                }

                let color = if class == "referee" {
                    YELLOW
                } else {
                    let (r, g, b) = id_to_color(id);
                    Rgb([r, g, b])
                };
                if self.draw_trajectory {
                    for pair in record.trajectory.windows(2) {
                        let (p, q) = (pair[0], pair[1]);
                        draw_thick_line(image, (p.x, p.y), (q.x, q.y), color, 2);
                    }
                }
                draw_foot_ellipse(image, (x1, y1, x2, y2), color);
                if class != "referee" {
                    self.draw_id_label(image, ((x1 + x2) / 2.0, y2), id, color);
                }
            }
        }
    }

    /// 椭圆下方的 ID 标签
    fn draw_id_label(&mut self, image: &mut RgbImage, foot: (f32, f32), id: u32, color: Rgb<u8>) {
        let (w, h) = (40.0, 20.0);
        let x = foot.0 - w / 2.0;
        let y = foot.1 + 15.0 - h / 2.0;
        fill_rect(image, (x, y), (x + w, y + h), color);
        let text = id.to_string();
        let scale = 16.0;
        let (tw, _) = self.text_extent(&text, scale);
        let tx = x + (w - tw as f32) / 2.0;
        self.draw_text(image, &text, (tx, y + 2.0), scale, BLACK);
    }

    fn text_extent(&self, text: &str, scale: f32) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(scale), font, text),
            None => (0, 0),
        }
    }

    /// 绘制文字 (左上角为起点); 没有字体时跳过并警告一次
    pub fn draw_text(
        &mut self,
        image: &mut RgbImage,
        text: &str,
        at: (f32, f32),
        scale: f32,
        color: Rgb<u8>,
    ) {
        match &self.font {
            Some(font) => draw_text_mut(
                image,
                color,
                at.0.round() as i32,
                at.1.round() as i32,
                PxScale::from(scale),
                font,
                text,
            ),
            None => {
                if !self.warned_no_font {
                    warn!("⚠️ 未指定字体 (--font), 跳过文字绘制");
                    self.warned_no_font = true;
                }
            }
        }
    }

    /// 帧率叠加
    pub fn draw_fps(&mut self, image: &mut RgbImage, fps: f64) {
        self.draw_text(image, &format!("{}FPS", fps as i64), (200.0, 75.0), 32.0, WHITE);
    }

    /// 绘图演示画布: 500x500 黑底, 色块、矩形、圆、线、文字
    pub fn demo_canvas(&mut self) -> RgbImage {
        let mut blank = RgbImage::new(500, 500);

        // 1. 色块
        fill_rect(&mut blank, (300.0, 200.0), (400.0, 300.0), BLUE);

        // 2. 空心矩形 + 左上四分之一实心矩形
        draw_thick_rect(&mut blank, (0.0, 0.0), (250.0, 500.0), GREEN, 2);
        fill_rect(&mut blank, (0.0, 0.0), (250.0, 250.0), GREEN);

        // 3. 圆
        draw_filled_circle_mut(&mut blank, (250, 250), 40, RED);

        // 4. 线
        draw_thick_line(&mut blank, (0.0, 0.0), (250.0, 250.0), WHITE, 5);

        // 5. 文字 (基线位于 y=255)
        let scale = 30.0;
        let (_, th) = self.text_extent("Hello there", scale);
        self.draw_text(&mut blank, "Hello there", (225.0, 255.0 - th as f32), scale, GREEN);
        blank
    }
}

// ========== 基础绘图 ==========

/// 实心矩形 (两角坐标, 自动裁剪)
pub fn fill_rect(image: &mut RgbImage, p1: (f32, f32), p2: (f32, f32), color: Rgb<u8>) {
    let x = p1.0.min(p2.0).round() as i32;
    let y = p1.1.min(p2.1).round() as i32;
    let w = (p1.0 - p2.0).abs().round() as u32;
    let h = (p1.1 - p2.1).abs().round() as u32;
    if w == 0 || h == 0 {
        return;
    }
    draw_filled_rect_mut(image, Rect::at(x, y).of_size(w, h), color);
}

/// 粗线 (两端为圆头)
pub fn draw_thick_line(
    image: &mut RgbImage,
    start: (f32, f32),
    end: (f32, f32),
    color: Rgb<u8>,
    thickness: u32,
) {
    if thickness <= 1 {
        draw_line_segment_mut(image, start, end, color);
        return;
    }
    let half = thickness as f32 / 2.0;
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len >= 1.0 {
        let (nx, ny) = (-dy / len * half, dx / len * half);
        let corners = [
            Point::new((start.0 + nx).round() as i32, (start.1 + ny).round() as i32),
            Point::new((end.0 + nx).round() as i32, (end.1 + ny).round() as i32),
            Point::new((end.0 - nx).round() as i32, (end.1 - ny).round() as i32),
            Point::new((start.0 - nx).round() as i32, (start.1 - ny).round() as i32),
        ];
        if corners[0] != corners[3] {
            draw_polygon_mut(image, &corners, color);
        }
    }
    let r = half.round() as i32;
    for p in [start, end] {
        draw_filled_circle_mut(image, (p.0.round() as i32, p.1.round() as i32), r, color);
    }
}

/// 空心矩形 (线宽以边为中心)
pub fn draw_thick_rect(
    image: &mut RgbImage,
    p1: (f32, f32),
    p2: (f32, f32),
    color: Rgb<u8>,
    thickness: u32,
) {
    let t = thickness.max(1) as f32;
    let half = t / 2.0;
    let (x1, x2) = (p1.0.min(p2.0), p1.0.max(p2.0));
    let (y1, y2) = (p1.1.min(p2.1), p1.1.max(p2.1));
    fill_rect(image, (x1 - half, y1 - half), (x2 + half, y1 + half), color);
    fill_rect(image, (x1 - half, y2 - half), (x2 + half, y2 + half), color);
    fill_rect(image, (x1 - half, y1 - half), (x1 + half, y2 + half), color);
    fill_rect(image, (x2 - half, y1 - half), (x2 + half, y2 + half), color);
}

/// 球员脚下的椭圆弧 (-45° 到 235°, 开口朝上)
pub fn draw_foot_ellipse(image: &mut RgbImage, bbox: (f32, f32, f32, f32), color: Rgb<u8>) {
    let (x1, _, x2, y2) = bbox;
    let cx = (x1 + x2) / 2.0;
    let a = (x2 - x1).abs().max(1.0);
    let b = 0.35 * a;

    let mut prev: Option<(f32, f32)> = None;
    for deg in (-45..=235).step_by(5) {
        let t = (deg as f32).to_radians();
        let p = (cx + a * t.cos(), y2 + b * t.sin());
        if let Some(q) = prev {
            draw_thick_line(image, q, p, color, 2);
        }
        prev = Some(p);
    }
}

/// 目标上方的倒三角 (黑边)
pub fn draw_marker(image: &mut RgbImage, tip: (f32, f32), color: Rgb<u8>) {
    let (x, y) = (tip.0.round() as i32, tip.1.round() as i32);
    let points = [
        Point::new(x, y),
        Point::new(x - 10, y - 20),
        Point::new(x + 10, y - 20),
    ];
    draw_polygon_mut(image, &points, color);
    for i in 0..3 {
        let (p, q) = (points[i], points[(i + 1) % 3]);
        draw_line_segment_mut(image, (p.x as f32, p.y as f32), (q.x as f32, q.y as f32), BLACK);
    }
}
