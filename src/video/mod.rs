/// 视频输入/输出系统 (Video I/O)
///
/// - FrameSource: 逐帧读取 (图片序列 / FFmpeg 解码)
/// - FrameSink:   逐帧写出 (图片序列 / FFmpeg 编码)
/// - read_video / save_video: 整段读入内存、整段写出
pub mod images;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use std::path::Path;

use tracing::info;

pub use images::{ImageFileSink, ImageSequenceSink, ImageSequenceSource};

use crate::types::Frame;
use crate::{Error, Result};

/// 无法从输入获得帧率时使用
pub const DEFAULT_FPS: f64 = 24.0;

/// 支持的图片扩展名
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// 帧输入源
pub trait FrameSource: Send {
    /// 读取下一帧, 结束时返回 None
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// 输入帧率
    fn fps(&self) -> f64;
}

/// 帧输出
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// 写出剩余数据并关闭 (必须调用)
    fn finish(&mut self) -> Result<()>;
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_stream_url(path: &Path) -> bool {
    path.to_str()
        .map(|s| s.contains("://"))
        .unwrap_or(false)
}

/// 根据路径选择输入源: 目录/图片 → 图片序列, 其他 → FFmpeg
pub fn open_source(path: impl AsRef<Path>, fps: Option<f64>) -> Result<Box<dyn FrameSource>> {
    let path = path.as_ref();
    let fps = fps.unwrap_or(DEFAULT_FPS);

    if path.is_dir() || is_image_path(path) {
        return Ok(Box::new(ImageSequenceSource::open(path)?.with_fps(fps)));
    }
    if !path.exists() && !is_stream_url(path) {
        return Err(Error::Source(format!("输入不存在: {}", path.display())));
    }
    open_video(path, fps)
}

#[cfg(feature = "ffmpeg")]
fn open_video(path: &Path, fps: f64) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(ffmpeg::FfmpegSource::open(path, fps)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(path: &Path, _fps: f64) -> Result<Box<dyn FrameSource>> {
    Err(Error::Unsupported(format!(
        "读取视频文件需要启用 `ffmpeg` 特性: {} (或先把视频拆成图片目录)",
        path.display()
    )))
}

/// 根据路径选择输出: 图片扩展名 → 单张图片, 无扩展名 → 图片序列目录, 其他 → FFmpeg
pub fn create_sink(path: impl AsRef<Path>, fps: f64) -> Result<Box<dyn FrameSink>> {
    let path = path.as_ref();
    if is_image_path(path) {
        return Ok(Box::new(ImageFileSink::new(path)));
    }
    if path.is_dir() || path.extension().is_none() {
        return Ok(Box::new(ImageSequenceSink::create(path)?));
    }
    create_video_sink(path, fps)
}

#[cfg(feature = "ffmpeg")]
fn create_video_sink(path: &Path, fps: f64) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(ffmpeg::FfmpegSink::create(path, fps)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn create_video_sink(path: &Path, _fps: f64) -> Result<Box<dyn FrameSink>> {
    Err(Error::Unsupported(format!(
        "写出视频文件需要启用 `ffmpeg` 特性: {} (或输出到图片目录)",
        path.display()
    )))
}

/// 读取全部帧
pub fn read_video(path: impl AsRef<Path>) -> Result<Vec<Frame>> {
    let path = path.as_ref();
    let mut source = open_source(path, None)?;
    let mut frames = Vec::new();
    while let Some(frame) = source.next_frame()? {
        frames.push(frame);
    }
    if frames.is_empty() {
        return Err(Error::Source(format!("输入没有任何帧: {}", path.display())));
    }
    info!("📹 已读取 {} 帧: {}", frames.len(), path.display());
    Ok(frames)
}

/// 写出全部帧
pub fn save_video(frames: &[Frame], path: impl AsRef<Path>, fps: f64) -> Result<()> {
    let path = path.as_ref();
    if frames.is_empty() {
        return Err(Error::Sink("没有可写出的帧".to_string()));
    }
    let mut sink = create_sink(path, fps)?;
    for frame in frames {
        sink.write_frame(frame)?;
    }
    sink.finish()?;
    info!("💾 已写出 {} 帧: {}", frames.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame(index: u64, shade: u8) -> Frame {
        Frame::new(index, RgbImage::from_pixel(8, 6, image::Rgb([shade, 0, 0])))
    }

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("a/b.PNG")));
        assert!(is_image_path(Path::new("x.jpeg")));
        assert!(!is_image_path(Path::new("match.mp4")));
        assert!(!is_image_path(Path::new("frames")));
    }

    #[test]
    fn test_save_then_read_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        save_video(&[frame(0, 10), frame(1, 20), frame(2, 30)], &out, 24.0).unwrap();

        let frames = read_video(&out).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].index, 2);
        assert_eq!(frames[1].image.get_pixel(0, 0).0, [20, 0, 0]);
    }

    #[test]
    fn test_missing_input_is_error() {
        let err = open_source("/no/such/match.mp4", None).err().unwrap();
        assert!(matches!(err, Error::Source(_)));
    }

    #[test]
    fn test_empty_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_video(dir.path()).is_err());
    }

    #[test]
    fn test_save_nothing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_video(&[], dir.path().join("out"), 24.0).is_err());
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_video_container_needs_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        let err = open_source(&video, None).err().unwrap();
        assert!(matches!(err, Error::Unsupported(_)));
        let err = create_sink(dir.path().join("out.avi"), 24.0).err().unwrap();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
