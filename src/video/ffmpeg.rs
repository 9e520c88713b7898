//! FFmpeg 视频解码/编码 (需要 `ffmpeg` 特性)
//!
//! 解码: 独立线程运行 FfmpegContext, 过滤器把每帧 RGB24 数据经 channel 送出。
//! 编码: 帧先写入临时 PNG 序列, finish 时由 FFmpeg 合成视频文件。

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame as AvFrame, Input, Output};
use image::RgbImage;
use tracing::{debug, info, warn};

use super::{FrameSink, FrameSource, ImageSequenceSink};
use crate::types::Frame;
use crate::{Error, Result};

/// 解码队列长度
const DECODE_QUEUE: usize = 16;

/// 解码过滤器: 视频帧 → RgbImage
struct DecodeFilter {
    tx: Sender<RgbImage>,
    decoded: u64,
    dropped: u64,
    last: Instant,
}

impl DecodeFilter {
    fn new(tx: Sender<RgbImage>) -> Self {
        Self {
            tx,
            decoded: 0,
            dropped: 0,
            last: Instant::now(),
        }
    }

    /// 拷贝 RGB24 平面 (去掉行对齐填充)
    fn copy_rgb(frame: &AvFrame) -> Option<RgbImage> {
        unsafe {
            let raw = frame.as_ptr();
            if raw.is_null() {
                return None;
            }
            let w = (*raw).width as usize;
            let h = (*raw).height as usize;
            let stride = (*raw).linesize[0] as usize;
            let plane = (*raw).data[0];
            if w == 0 || h == 0 || plane.is_null() || stride < w * 3 {
                return None;
            }

            let mut pixels = Vec::with_capacity(w * h * 3);
            for row in 0..h {
                let line = std::slice::from_raw_parts(plane.add(row * stride), w * 3);
                pixels.extend_from_slice(line);
            }
            RgbImage::from_raw(w as u32, h as u32, pixels)
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> std::result::Result<(), String> {
        debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: AvFrame,
        _ctx: &FrameFilterContext,
    ) -> std::result::Result<Option<AvFrame>, String> {
        if frame.is_empty() || frame.is_corrupt() {
            self.dropped += 1;
            return Ok(None);
        }
        let Some(image) = Self::copy_rgb(&frame) else {
            self.dropped += 1;
            return Ok(None);
        };

        // 接收端已关闭 → 停止解码
        self.tx
            .send(image)
            .map_err(|_| "frame receiver closed".to_string())?;
        self.decoded += 1;

        if self.last.elapsed().as_secs_f64() >= 5.0 {
            debug!("📺 解码统计: 已解码 {} 帧, 丢弃 {}", self.decoded, self.dropped);
            self.last = Instant::now();
        }
        Ok(Some(frame))
    }
}

/// FFmpeg 视频输入
pub struct FfmpegSource {
    rx: Receiver<RgbImage>,
    worker: Option<JoinHandle<std::result::Result<(), String>>>,
    position: u64,
    fps: f64,
}

impl FfmpegSource {
    pub fn open(path: &Path, fps: f64) -> Result<Self> {
        let url = path.to_string_lossy().to_string();
        let (tx, rx) = bounded(DECODE_QUEUE);

        let worker = std::thread::Builder::new()
            .name("ffmpeg-decode".to_string())
            .spawn(move || decode(&url, tx))?;

        info!("🎬 FFmpeg 解码: {} ({:.1} fps)", path.display(), fps);
        Ok(Self {
            rx,
            worker: Some(worker),
            position: 0,
            fps,
        })
    }

    fn join_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Source(e)),
            Err(_) => Err(Error::Source("解码线程 panic".to_string())),
        }
    }
}

fn decode(url: &str, tx: Sender<RgbImage>) -> std::result::Result<(), String> {
    let input = Input::new(url);
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(DecodeFilter::new(tx)));
    let out = create_null_output().add_frame_pipeline(pipe);

    let ctx = FfmpegContext::builder()
        .input(input)
        .filter_descs(["format=rgb24"].into())
        .output(out)
        .build()
        .map_err(|e| format!("创建解码上下文失败: {}", e))?;

    let sch = ctx.start().map_err(|e| format!("启动解码失败: {}", e))?;
    sch.wait().map_err(|e| format!("解码失败: {}", e))
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.rx.recv() {
            Ok(image) => {
                let frame = Frame::new(self.position, image);
                self.position += 1;
                Ok(Some(frame))
            }
            Err(_) => {
                self.join_worker()?;
                Ok(None)
            }
        }
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

/// FFmpeg 视频输出: 临时 PNG 序列 → 视频文件
pub struct FfmpegSink {
    path: PathBuf,
    fps: f64,
    staging: tempfile::TempDir,
    frames: ImageSequenceSink,
    next_index: u64,
    finished: bool,
}

impl FfmpegSink {
    pub fn create(path: &Path, fps: f64) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = tempfile::tempdir()?;
        let frames = ImageSequenceSink::create(staging.path())?;
        Ok(Self {
            path: path.to_path_buf(),
            fps,
            staging,
            frames,
            next_index: 0,
            finished: false,
        })
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        // 视频要求连续编号, 与输入帧号无关
        let staged = Frame::new(self.next_index, frame.image.clone());
        self.frames.write_frame(&staged)?;
        self.next_index += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if self.next_index == 0 {
            warn!("没有帧可编码: {}", self.path.display());
            return Ok(());
        }

        let pattern = self.staging.path().join("frame_%06d.png");
        let framerate = format!("{}", self.fps);
        let input = Input::new(pattern.to_string_lossy().to_string())
            .set_input_opts([("framerate", framerate.as_str())].into());
        let output = Output::from(self.path.to_string_lossy().to_string());

        let ctx = FfmpegContext::builder()
            .input(input)
            .output(output)
            .build()
            .map_err(|e| Error::Sink(format!("创建编码上下文失败: {}", e)))?;
        let sch = ctx
            .start()
            .map_err(|e| Error::Sink(format!("启动编码失败: {}", e)))?;
        sch.wait()
            .map_err(|e| Error::Sink(format!("编码失败: {}", e)))?;

        info!(
            "🎞️ 已编码 {} 帧 → {} ({:.1} fps)",
            self.next_index,
            self.path.display(),
            self.fps
        );
        Ok(())
    }
}
