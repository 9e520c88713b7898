//! 三线程流式处理
//!
//! 解码线程 ──bounded──► 检测/跟踪 (调用线程) ──bounded──► 标注/写出线程
//!
//! 任一阶段失败都会关闭它的通道, 其余阶段随之退出; 所有线程在返回前 join。

use std::collections::BTreeSet;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info};

use super::{FrameTracks, ObjectTracker};
use crate::annotate::Annotator;
use crate::detection::Detector;
use crate::imaging::FpsCounter;
use crate::tracking::Tracker;
use crate::types::Frame;
use crate::video::{FrameSink, FrameSource};
use crate::{Error, Result};

/// 流式处理统计
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineStats {
    pub frames: u64,
    pub detections: u64,
    /// 出现过的 (类别, ID) 数量
    pub unique_tracks: usize,
    pub elapsed: Duration,
}

impl PipelineStats {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// 流式运行: 边解码边检测跟踪边写出
pub fn run_streaming<D: Detector, T: Tracker>(
    tracker: &mut ObjectTracker<D, T>,
    mut source: Box<dyn FrameSource>,
    mut sink: Box<dyn FrameSink>,
    mut annotator: Annotator,
) -> Result<PipelineStats> {
    let capacity = tracker.config().channel_capacity.max(1);
    let (tx_frames, rx_frames) = bounded::<Frame>(capacity);
    let (tx_tracks, rx_tracks) = bounded::<(Frame, FrameTracks)>(capacity);
    let start = Instant::now();

    thread::scope(|s| {
        let decoder = s.spawn(move || decode_loop(source.as_mut(), tx_frames));
        let writer = s.spawn(move || write_loop(sink.as_mut(), &mut annotator, rx_tracks));

        let tracked = track_loop(tracker, rx_frames, tx_tracks);

        let decoded = join_stage(decoder, "解码");
        let written = join_stage(writer, "写出");

        // 优先返回真正的失败原因, 通道关闭只是连锁反应
        let mut stats = match (tracked, decoded, written) {
            (Err(e), _, _) if !matches!(e, Error::ChannelClosed(_)) => return Err(e),
            (_, Err(e), _) => return Err(e),
            (_, _, Err(e)) => return Err(e),
            (Err(e), _, _) => return Err(e),
            (Ok(stats), Ok(_), Ok(written)) => {
                debug!("写出 {} 帧", written);
                stats
            }
        };
        stats.elapsed = start.elapsed();
        info!(
            "✅ 处理完成: {} 帧, {} 个检测, {} 条轨迹, {:.1} fps",
            stats.frames,
            stats.detections,
            stats.unique_tracks,
            stats.fps()
        );
        Ok(stats)
    })
}

fn join_stage<R>(handle: thread::ScopedJoinHandle<'_, Result<R>>, stage: &'static str) -> Result<R> {
    handle
        .join()
        .map_err(|_| Error::Source(format!("{}线程 panic", stage)))?
}

/// 解码线程: 读取全部帧送入通道
fn decode_loop(source: &mut dyn FrameSource, tx: Sender<Frame>) -> Result<u64> {
    let mut count = 0;
    while let Some(frame) = source.next_frame()? {
        if tx.send(frame).is_err() {
            debug!("检测线程已退出, 停止解码");
            break;
        }
        count += 1;
    }
    if count == 0 {
        return Err(Error::Source("输入没有任何帧".to_string()));
    }
    Ok(count)
}

/// 检测/跟踪: 攒满一批再检测, 逐帧跟踪后送往写出线程
fn track_loop<D: Detector, T: Tracker>(
    tracker: &mut ObjectTracker<D, T>,
    rx: Receiver<Frame>,
    tx: Sender<(Frame, FrameTracks)>,
) -> Result<PipelineStats> {
    let batch_size = tracker.config().batch_size.max(1);
    let log_every = tracker.config().log_every.max(1);
    let mut stats = PipelineStats::default();
    let mut seen: BTreeSet<(String, u32)> = BTreeSet::new();
    let mut fps = FpsCounter::new(log_every as usize);
    let mut detect_ms = 0.0;

    let mut batch = Vec::with_capacity(batch_size);
    loop {
        batch.clear();
        while batch.len() < batch_size {
            match rx.recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let t = Instant::now();
        let detections = match tracker.detect_batch(&batch) {
            Ok(d) => d,
            Err(e) => {
                error!("❌ 检测失败: {}", e);
                return Err(e);
            }
        };
        detect_ms += t.elapsed().as_secs_f64() * 1000.0;

        for (frame, dets) in batch.drain(..).zip(detections) {
            let tracks = tracker.track_frame(frame.index, &dets);
            stats.frames += 1;
            stats.detections += dets.len() as u64;
            for (class, objects) in &tracks.objects {
                seen.extend(objects.keys().map(|id| (class.clone(), *id)));
            }
            fps.tick();

            if stats.frames % log_every == 0 {
                info!(
                    "📊 已处理 {} 帧 | {:.1} fps | 检测 {:.1}ms/帧 | 轨迹 {}",
                    stats.frames,
                    fps.average(),
                    detect_ms / stats.frames as f64,
                    seen.len()
                );
            }

            tx.send((frame, tracks))
                .map_err(|_| Error::ChannelClosed("写出线程已退出"))?;
        }
    }

    stats.unique_tracks = seen.len();
    Ok(stats)
}

/// 写出线程: 标注后写入输出
fn write_loop(
    sink: &mut dyn FrameSink,
    annotator: &mut Annotator,
    rx: Receiver<(Frame, FrameTracks)>,
) -> Result<u64> {
    let mut count = 0;
    for (mut frame, tracks) in rx {
        annotator.draw_tracks(&mut frame.image, &tracks);
        sink.write_frame(&frame)?;
        count += 1;
    }
    sink.finish()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    use image::DynamicImage;

    use super::*;
    use crate::config::AppConfig;
    use crate::pipeline::tests::{frames, ScriptedDetector};
    use crate::types::BBox;
    use crate::video::{ImageSequenceSink, ImageSequenceSource};

    /// 内存帧源, 读到第 `fail_at` 帧时报错
    struct FlakySource {
        frames: std::vec::IntoIter<Frame>,
        fail_at: Option<u64>,
    }

    impl FlakySource {
        fn new(n: u64, fail_at: Option<u64>) -> Self {
            Self {
                frames: frames(n).into_iter(),
                fail_at,
            }
        }
    }

    impl FrameSource for FlakySource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            match self.frames.next() {
                Some(frame) if Some(frame.index) == self.fail_at => {
                    Err(Error::Source(format!("第 {} 帧解码失败", frame.index)))
                }
                next => Ok(next),
            }
        }

        fn fps(&self) -> f64 {
            25.0
        }
    }

    /// 只计数的输出
    #[derive(Clone, Default)]
    struct CountingSink {
        written: Arc<AtomicU64>,
        finished: Arc<AtomicBool>,
    }

    impl FrameSink for CountingSink {
        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            self.written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 第二批起检测失败
    struct SecondBatchFails {
        inner: ScriptedDetector,
    }

    impl Detector for SecondBatchFails {
        fn class_names(&self) -> &[String] {
            self.inner.class_names()
        }

        fn detect(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<BBox>>> {
            if !self.inner.batches.is_empty() {
                return Err(Error::Model("推理失败".to_string()));
            }
            self.inner.detect(images)
        }
    }

    struct BrokenSink;

    impl FrameSink for BrokenSink {
        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            Err(Error::Sink("disk full".to_string()))
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn source_dir(n: u64) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageSequenceSink::create(dir.path()).unwrap();
        for frame in frames(n) {
            sink.write_frame(&frame).unwrap();
        }
        dir
    }

    #[test]
    fn test_streaming_writes_every_frame() {
        let input = source_dir(25);
        let output = tempfile::tempdir().unwrap();

        let mut tracker = ObjectTracker::new(ScriptedDetector::new(), &AppConfig::default());
        let source = Box::new(ImageSequenceSource::open(input.path()).unwrap());
        let sink = Box::new(ImageSequenceSink::create(output.path()).unwrap());
        let annotator = Annotator::new(None, vec!["ball".to_string()]);

        let stats = run_streaming(&mut tracker, source, sink, annotator).unwrap();
        assert_eq!(stats.frames, 25);
        assert_eq!(stats.detections, 25 * 4);
        // 两名球员 + 球
        assert_eq!(stats.unique_tracks, 3);
        assert_eq!(tracker.detector_mut().batches, vec![20, 5]);
        assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 25);
    }

    #[test]
    fn test_sink_failure_is_reported() {
        let input = source_dir(30);
        let mut tracker = ObjectTracker::new(ScriptedDetector::new(), &AppConfig::default());
        let source = Box::new(ImageSequenceSource::open(input.path()).unwrap());
        let annotator = Annotator::new(None, Vec::new());

        let err = run_streaming(&mut tracker, source, Box::new(BrokenSink), annotator).unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
    }

    #[test]
    fn test_source_failure_midway_is_reported() {
        let sink = CountingSink::default();
        let mut tracker = ObjectTracker::new(ScriptedDetector::new(), &AppConfig::default());
        let source = Box::new(FlakySource::new(30, Some(7)));
        let annotator = Annotator::new(None, Vec::new());

        let err = run_streaming(&mut tracker, source, Box::new(sink.clone()), annotator).unwrap_err();
        assert!(matches!(err, Error::Source(_)), "{:?}", err);
        // 失败前的帧照常处理完, 输出被正常关闭
        assert_eq!(tracker.detector_mut().batches, vec![7]);
        assert_eq!(sink.written.load(Ordering::SeqCst), 7);
        assert!(sink.finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_empty_source_is_error() {
        let mut tracker = ObjectTracker::new(ScriptedDetector::new(), &AppConfig::default());
        let source = Box::new(FlakySource::new(0, None));
        let annotator = Annotator::new(None, Vec::new());

        let err = run_streaming(&mut tracker, source, Box::new(CountingSink::default()), annotator)
            .unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[test]
    fn test_detector_failure_wins_over_closed_channels() {
        let sink = CountingSink::default();
        let detector = SecondBatchFails {
            inner: ScriptedDetector::new(),
        };
        let mut tracker = ObjectTracker::new(detector, &AppConfig::default());
        let source = Box::new(FlakySource::new(45, None));
        let annotator = Annotator::new(None, Vec::new());

        let err = run_streaming(&mut tracker, source, Box::new(sink.clone()), annotator).unwrap_err();
        assert!(matches!(err, Error::Model(_)), "{:?}", err);
        assert_eq!(tracker.detector_mut().inner.batches, vec![20]);
        assert_eq!(sink.written.load(Ordering::SeqCst), 20);
        assert!(sink.finished.load(Ordering::SeqCst));
    }
}
