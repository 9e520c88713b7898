/// 检测 + 跟踪流水线 (Object tracking pipeline)
///
/// - ObjectTracker: 批量检测全部帧, 逐帧关联为跟踪轨迹
/// - ObjectTracks:  每帧 `objects[类别][跟踪ID] = 记录`, 可缓存为 JSON (stub)
/// - run_streaming: 解码 / 检测跟踪 / 写出 三线程流式处理
pub mod streaming;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Instant;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use streaming::{run_streaming, PipelineStats};

use crate::config::{AppConfig, PipelineConfig};
use crate::detection::Detector;
use crate::tracking::{ByteTracker, TrackPoint, Tracker};
use crate::types::{BBox, Frame};
use crate::{Error, Result};

/// 不跟踪的类别 (如球) 使用的固定ID
pub const UNTRACKED_ID: u32 = 1;

// ========== 输出数据结构 ==========

/// 单个对象在某一帧的记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// [x1, y1, x2, y2]
    pub bbox: [f32; 4],
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trajectory: Vec<TrackPoint>,
}

impl TrackRecord {
    pub fn from_bbox(bbox: &BBox) -> Self {
        Self {
            bbox: bbox.xyxy(),
            confidence: bbox.confidence,
            trajectory: Vec::new(),
        }
    }

    pub fn to_bbox(&self, class_id: u32) -> BBox {
        let [x1, y1, x2, y2] = self.bbox;
        BBox::new(x1, y1, x2, y2, self.confidence, class_id)
    }
}

/// 一帧的全部对象: 类别名 → (跟踪ID → 记录)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTracks {
    pub frame: u64,
    pub objects: BTreeMap<String, BTreeMap<u32, TrackRecord>>,
}

impl FrameTracks {
    pub fn new(frame: u64) -> Self {
        Self {
            frame,
            objects: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, class: &str, id: u32, record: TrackRecord) {
        self.objects
            .entry(class.to_string())
            .or_default()
            .insert(id, record);
    }

    pub fn get(&self, class: &str, id: u32) -> Option<&TrackRecord> {
        self.objects.get(class).and_then(|m| m.get(&id))
    }

    /// 对象总数
    pub fn len(&self) -> usize {
        self.objects.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 整段视频的跟踪结果
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectTracks {
    pub class_names: Vec<String>,
    pub frames: Vec<FrameTracks>,
}

impl ObjectTracks {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("跟踪缓存解析失败 {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// 某类别出现过的所有ID
    pub fn ids(&self, class: &str) -> BTreeSet<u32> {
        self.frames
            .iter()
            .filter_map(|f| f.objects.get(class))
            .flat_map(|m| m.keys().copied())
            .collect()
    }
}

// ========== 对象跟踪器 ==========

/// 检测器 + 跟踪器
pub struct ObjectTracker<D: Detector, T: Tracker = ByteTracker> {
    detector: D,
    tracker: T,
    config: PipelineConfig,
    /// 检测器类别 + 别名目标中缺失的类别
    labels: Vec<String>,
    /// 检测器类别ID → labels 下标 (别名已展开)
    canonical: Vec<u32>,
    record_trajectory: bool,
}

impl<D: Detector> ObjectTracker<D, ByteTracker> {
    pub fn new(detector: D, config: &AppConfig) -> Self {
        let tracker = ByteTracker::new(config.tracker.clone());
        Self::with_tracker(detector, tracker, config.pipeline.clone())
            .record_trajectory(config.annotate.draw_trajectory)
    }
}

impl<D: Detector, T: Tracker> ObjectTracker<D, T> {
    pub fn with_tracker(detector: D, tracker: T, config: PipelineConfig) -> Self {
        let (labels, canonical) = build_labels(detector.class_names(), &config.class_aliases);
        Self {
            detector,
            tracker,
            config,
            labels,
            canonical,
            record_trajectory: false,
        }
    }

    /// 在记录中保存轨迹点 (用于绘制)
    pub fn record_trajectory(mut self, enabled: bool) -> Self {
        self.record_trajectory = enabled;
        self
    }

    /// 输出使用的类别名 (别名已合并)
    pub fn class_names(&self) -> &[String] {
        &self.labels
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// 分批检测全部帧 (每批 batch_size 帧)
    pub fn detect_frames(&mut self, frames: &[Frame]) -> Result<Vec<Vec<BBox>>> {
        let batch_size = self.config.batch_size.max(1);
        let mut detections = Vec::with_capacity(frames.len());
        let start = Instant::now();

        for (i, batch) in frames.chunks(batch_size).enumerate() {
            detections.extend(self.detect_batch(batch)?);
            debug!("批次 {} 完成: {}/{} 帧", i + 1, detections.len(), frames.len());
        }

        info!(
            "🔍 检测完成: {} 帧, 耗时 {:.2}s",
            frames.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(detections)
    }

    pub(crate) fn detect_batch(&mut self, batch: &[Frame]) -> Result<Vec<Vec<BBox>>> {
        let images: Vec<DynamicImage> = batch
            .iter()
            .map(|f| DynamicImage::ImageRgb8(f.image.clone()))
            .collect();
        let results = self.detector.detect(&images)?;
        if results.len() != batch.len() {
            return Err(Error::Model(format!(
                "检测结果数量 {} 与输入帧数 {} 不一致",
                results.len(),
                batch.len()
            )));
        }
        Ok(results)
    }

    /// 检测并跟踪全部帧; stub 存在时直接读取缓存, 否则计算后写入
    pub fn get_object_tracks(
        &mut self,
        frames: &[Frame],
        stub: Option<&Path>,
    ) -> Result<ObjectTracks> {
        if let Some(path) = stub.filter(|p| p.exists()) {
            let tracks = ObjectTracks::load(path)?;
            if tracks.frames.len() != frames.len() {
                warn!(
                    "⚠️ 缓存帧数 {} 与输入帧数 {} 不一致: {}",
                    tracks.frames.len(),
                    frames.len(),
                    path.display()
                );
            }
            info!("📦 使用跟踪缓存: {}", path.display());
            return Ok(tracks);
        }

        let detections = self.detect_frames(frames)?;
        self.tracker.reset();

        let tracks = ObjectTracks {
            class_names: self.labels.clone(),
            frames: frames
                .iter()
                .zip(&detections)
                .map(|(frame, dets)| self.track_frame(frame.index, dets))
                .collect(),
        };

        if let Some(path) = stub {
            tracks.save(path)?;
            info!("💾 跟踪缓存已写入: {}", path.display());
        }
        Ok(tracks)
    }

    /// 处理一帧检测: 合并别名, 不跟踪类别取最高分, 其余送入跟踪器
    pub fn track_frame(&mut self, frame_index: u64, detections: &[BBox]) -> FrameTracks {
        let mut out = FrameTracks::new(frame_index);
        let mut best_untracked: BTreeMap<u32, BBox> = BTreeMap::new();
        let mut tracked = Vec::with_capacity(detections.len());

        for det in detections {
            let mut det = det.clone();
            det.class_id = self.canonical_id(det.class_id);
            if self.is_untracked(det.class_id) {
                let best = best_untracked.entry(det.class_id).or_insert_with(|| det.clone());
                if det.confidence > best.confidence {
                    *best = det;
                }
            } else {
                tracked.push(det);
            }
        }

        for (class_id, det) in &best_untracked {
            let label = self.label(*class_id).to_string();
            out.insert(&label, UNTRACKED_ID, TrackRecord::from_bbox(det));
        }

        for obj in self.tracker.update(&tracked) {
            let label = self.label(obj.bbox.class_id).to_string();
            let mut record = TrackRecord::from_bbox(&obj.bbox);
            if self.record_trajectory {
                record.trajectory = obj.trajectory;
            }
            out.insert(&label, obj.id, record);
        }
        out
    }

    fn canonical_id(&self, class_id: u32) -> u32 {
        self.canonical
            .get(class_id as usize)
            .copied()
            .unwrap_or(class_id)
    }

    fn label(&self, class_id: u32) -> &str {
        self.labels
            .get(class_id as usize)
            .map(|s| s.as_str())
            .unwrap_or("unknown")
    }

    fn is_untracked(&self, class_id: u32) -> bool {
        let label = self.label(class_id);
        self.config.untracked_classes.iter().any(|c| c == label)
    }
}

/// 展开类别别名: 返回 (输出类别名, 检测类别ID → 输出类别ID)
fn build_labels(names: &[String], aliases: &BTreeMap<String, String>) -> (Vec<String>, Vec<u32>) {
    let mut labels: Vec<String> = names.to_vec();
    let mut canonical = Vec::with_capacity(names.len());

    for (i, name) in names.iter().enumerate() {
        let id = match aliases.get(name) {
            Some(target) => match labels.iter().position(|l| l == target) {
                Some(pos) => pos as u32,
                None => {
                    labels.push(target.clone());
                    (labels.len() - 1) as u32
                }
            },
            None => i as u32,
        };
        canonical.push(id);
    }
    (labels, canonical)
}
