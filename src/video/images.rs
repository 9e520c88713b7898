//! 图片序列输入/输出

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{is_image_path, FrameSink, FrameSource, DEFAULT_FPS};
use crate::types::Frame;
use crate::{Error, Result};

/// 图片序列输入: 目录内图片按文件名排序; 单个图片文件视为一帧
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    position: usize,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_path(p))
                .collect();
            files.sort();
            files
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(Error::Source(format!("输入不存在: {}", path.display())));
        };

        if files.is_empty() {
            return Err(Error::Source(format!(
                "目录中没有图片: {}",
                path.display()
            )));
        }
        info!("📂 图片序列: {} 帧 ({})", files.len(), path.display());

        Ok(Self {
            files,
            position: 0,
            fps: DEFAULT_FPS,
        })
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        let image = image::open(path)
            .map_err(|e| Error::Source(format!("读取 {} 失败: {}", path.display(), e)))?
            .into_rgb8();
        let frame = Frame::new(self.position as u64, image);
        self.position += 1;
        Ok(Some(frame))
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

/// 图片序列输出: `frame_000000.png` ...
pub struct ImageSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl ImageSequenceSink {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", index))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let path = self.frame_path(frame.index);
        frame
            .image
            .save(&path)
            .map_err(|e| Error::Sink(format!("写入 {} 失败: {}", path.display(), e)))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        debug!("图片序列写出完成: {} 帧 → {}", self.written, self.dir.display());
        Ok(())
    }
}

/// 单张图片输出 (只接受一帧)
pub struct ImageFileSink {
    path: PathBuf,
    written: bool,
}

impl ImageFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            written: false,
        }
    }
}

impl FrameSink for ImageFileSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.written {
            return Err(Error::Sink(format!(
                "单张图片输出只能写入一帧: {}",
                self.path.display()
            )));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        frame.image.save(&self.path)?;
        self.written = true;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
