//! ByteTrack 算法实现
//! ByteTrack: Simple and effective multi-object tracking
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU + 匈牙利算法)
//! 3. 低分框救援未匹配的轨迹
//! 4. 纯运动模型,无需外观特征

use ndarray::Array2;
use tracing::trace;

use super::hungarian::linear_assignment;
use super::track::{Track, TrackState, TrackedObject};
use super::Tracker;
use crate::config::TrackerConfig;
use crate::types::{compute_iou, BBox};

/// ByteTrack 追踪器
pub struct ByteTracker {
    tracks: Vec<Track>,

    /// 下一个分配的ID
    next_id: u32,

    /// 已处理帧数 (第一帧为1)
    frame_id: u64,

    config: TrackerConfig,
}

impl ByteTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            frame_id: 0,
            config,
        }
    }

    /// 已分配的ID总数
    pub fn total_ids(&self) -> u32 {
        self.next_id - 1
    }

    /// 所有存活轨迹 (含 Tentative / Lost)
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// 更新跟踪 (ByteTrack 三轮匹配)
    pub fn step(&mut self, detections: &[BBox]) -> Vec<TrackedObject> {
        self.frame_id += 1;
        let frame_id = self.frame_id;

        // 1. 所有轨迹先预测
        for track in &mut self.tracks {
            track.predict();
        }

        // 2. 分离高低分检测框
        let mut high_dets: Vec<usize> = Vec::new();
        let mut low_dets: Vec<usize> = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.confidence >= self.config.high_thresh {
                high_dets.push(idx);
            } else if det.confidence >= self.config.low_thresh {
                low_dets.push(idx);
            }
        }

        // 3. 第一轮匹配: 高分检测 + Confirmed/Lost 轨迹
        let pool: Vec<usize> = self
            .tracks_in(&[TrackState::Confirmed, TrackState::Lost])
            .collect();
        let (matched, unmatched_pool, remaining_high) =
            self.associate(&pool, &high_dets, detections, self.config.match_thresh);
        self.apply_matches(&matched, detections, frame_id);

        // 4. 第二轮匹配: 低分检测 + 未匹配的 Confirmed 轨迹 (救援)
        let rescue: Vec<usize> = unmatched_pool
            .into_iter()
            .filter(|&t| self.tracks[t].state() == TrackState::Confirmed)
            .collect();
        let (matched, unmatched_rescue, _) =
            self.associate(&rescue, &low_dets, detections, self.config.low_match_thresh);
        self.apply_matches(&matched, detections, frame_id);
        for t in unmatched_rescue {
            self.tracks[t].mark_lost();
        }

        // 5. 第三轮匹配: 剩余高分检测 + Tentative 轨迹
        let tentative: Vec<usize> = self.tracks_in(&[TrackState::Tentative]).collect();
        let (matched, unmatched_tentative, remaining_high) = self.associate(
            &tentative,
            &remaining_high,
            detections,
            self.config.tentative_match_thresh,
        );
        self.apply_matches(&matched, detections, frame_id);
        for t in unmatched_tentative {
            self.tracks[t].mark_removed();
        }

        // 6. 未匹配的高分检测 → 新建轨迹
        for d in remaining_high {
            let det = &detections[d];
            if det.confidence < self.config.new_track_thresh {
                continue;
            }
            let mut track = Track::new(
                det.clone(),
                frame_id,
                self.config.kalman_process_noise,
                self.config.kalman_obs_noise,
                self.config.trajectory_len,
            );
            // 第一帧直接确认
            if frame_id == 1 || self.config.min_hits <= 1 {
                track.confirm(self.allocate_id());
            }
            self.tracks.push(track);
        }

        // 7. 删除丢失太久的轨迹
        let max_time_lost = u64::from(self.config.max_time_lost);
        for track in &mut self.tracks {
            if track.state() == TrackState::Lost && track.frames_lost(frame_id) > max_time_lost {
                track.mark_removed();
            }
        }
        self.tracks.retain(|t| t.state() != TrackState::Removed);

        trace!(
            "帧 {}: 检测 {} (高分 {}, 低分 {}), 存活轨迹 {}",
            frame_id,
            detections.len(),
            high_dets.len(),
            low_dets.len(),
            self.tracks.len()
        );

        // 输出本帧更新过的 Confirmed 轨迹
        self.tracks
            .iter()
            .filter(|t| t.state() == TrackState::Confirmed && t.last_frame() == frame_id)
            .filter_map(Track::to_tracked_object)
            .collect()
    }

    fn tracks_in<'a>(&'a self, states: &'a [TrackState]) -> impl Iterator<Item = usize> + 'a {
        self.tracks
            .iter()
            .enumerate()
            .filter(move |(_, t)| states.contains(&t.state()))
            .map(|(i, _)| i)
    }

    /// IOU 代价 + 匈牙利匹配
    ///
    /// 返回 (匹配的(轨迹, 检测), 未匹配轨迹, 未匹配检测), 均为全局下标
    fn associate(
        &self,
        track_indices: &[usize],
        det_indices: &[usize],
        detections: &[BBox],
        thresh: f32,
    ) -> (Vec<(usize, usize)>, Vec<usize>, Vec<usize>) {
        let mut cost = Array2::<f32>::zeros((track_indices.len(), det_indices.len()));
        for (r, &t) in track_indices.iter().enumerate() {
            let predicted = self.tracks[t].bbox();
            for (c, &d) in det_indices.iter().enumerate() {
                cost[[r, c]] = 1.0 - compute_iou(&predicted, &detections[d]);
            }
        }

        let assignment = linear_assignment(&cost, thresh);
        let matched = assignment
            .matches
            .iter()
            .map(|&(r, c)| (track_indices[r], det_indices[c]))
            .collect();
        let unmatched_tracks = assignment
            .unmatched_rows
            .iter()
            .map(|&r| track_indices[r])
            .collect();
        let unmatched_dets = assignment
            .unmatched_cols
            .iter()
            .map(|&c| det_indices[c])
            .collect();
        (matched, unmatched_tracks, unmatched_dets)
    }

    fn apply_matches(&mut self, matched: &[(usize, usize)], detections: &[BBox], frame_id: u64) {
        for &(t, d) in matched {
            self.tracks[t].update(&detections[d], frame_id);
            let track = &self.tracks[t];
            if track.state() == TrackState::Tentative && track.hits() >= self.config.min_hits {
                let id = self.allocate_id();
                self.tracks[t].confirm(id);
            }
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker for ByteTracker {
    fn update(&mut self, detections: &[BBox]) -> Vec<TrackedObject> {
        self.step(detections)
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
        self.frame_id = 0;
    }

    fn track_count(&self) -> usize {
        self.tracks
            .iter()
            .filter(|t| t.state() == TrackState::Confirmed)
            .count()
    }
}
