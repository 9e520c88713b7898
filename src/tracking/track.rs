//! 单条轨迹及其生命周期
//!
//! Tentative ─(连续命中)→ Confirmed ─(未匹配)→ Lost ─(超时)→ Removed
//!     └──────────(未匹配)──────────────────────────────→ Removed

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::kalman::KalmanBoxFilter;
use crate::types::BBox;

/// 轨迹状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackState {
    /// 新建, 尚未确认 (不分配ID, 不输出)
    #[default]
    Tentative,
    /// 正常跟踪
    Confirmed,
    /// 暂时丢失, 仍参与匹配
    Lost,
    /// 已删除
    Removed,
}

/// 跟踪点 (用于绘制轨迹)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub x: f32,
    pub y: f32,
}

/// 跟踪对象 (对外输出的跟踪结果)
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    /// 唯一跟踪ID
    pub id: u32,

    /// 当前边界框 (滤波平滑后, confidence/class_id 取自最近一次检测)
    pub bbox: BBox,

    pub state: TrackState,

    /// 历史轨迹 (底边中点)
    pub trajectory: Vec<TrackPoint>,

    /// 总共被跟踪的帧数
    pub hits: u32,
}

#[derive(Clone, Debug)]
pub struct Track {
    id: Option<u32>,
    state: TrackState,
    kalman: KalmanBoxFilter,
    /// 最近一次匹配的检测
    detection: BBox,
    trajectory: VecDeque<TrackPoint>,
    trajectory_len: usize,
    /// 累计命中次数
    hits: u32,
    /// 最近一次匹配的帧号
    last_frame: u64,
}

impl Track {
    pub fn new(
        detection: BBox,
        frame_id: u64,
        q: f32,
        r: f32,
        trajectory_len: usize,
    ) -> Self {
        let kalman = KalmanBoxFilter::new(&detection, q, r);
        let mut track = Self {
            id: None,
            state: TrackState::Tentative,
            kalman,
            detection,
            trajectory: VecDeque::with_capacity(trajectory_len),
            trajectory_len,
            hits: 1,
            last_frame: frame_id,
        };
        track.push_trajectory();
        track
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn last_frame(&self) -> u64 {
        self.last_frame
    }

    /// 用于匹配的当前位置 (predict 之后即为预测框)
    pub fn bbox(&self) -> BBox {
        let mut bbox = self.kalman.state_bbox();
        bbox.confidence = self.detection.confidence;
        bbox.class_id = self.detection.class_id;
        bbox
    }

    pub fn predict(&mut self) {
        self.kalman.predict();
    }

    /// 匹配到检测: 更新滤波器, Lost 轨迹恢复为 Confirmed
    pub fn update(&mut self, detection: &BBox, frame_id: u64) {
        self.kalman.update(detection);
        self.detection = detection.clone();
        self.hits += 1;
        self.last_frame = frame_id;
        if self.state == TrackState::Lost {
            self.state = TrackState::Confirmed;
        }
        self.push_trajectory();
    }

    /// 确认轨迹并分配ID
    pub fn confirm(&mut self, id: u32) {
        self.id = Some(id);
        self.state = TrackState::Confirmed;
    }

    pub fn mark_lost(&mut self) {
        if self.state == TrackState::Confirmed {
            self.state = TrackState::Lost;
        }
    }

    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }

    /// 连续丢失帧数
    pub fn frames_lost(&self, frame_id: u64) -> u64 {
        frame_id.saturating_sub(self.last_frame)
    }

    pub fn to_tracked_object(&self) -> Option<TrackedObject> {
        let id = self.id?;
        Some(TrackedObject {
            id,
            bbox: self.bbox(),
            state: self.state,
            trajectory: self.trajectory.iter().copied().collect(),
            hits: self.hits,
        })
    }

    fn push_trajectory(&mut self) {
        let (x, y) = self.kalman.state_bbox().bottom_center();
        self.trajectory.push_back(TrackPoint { x, y });
        // 限制轨迹长度
        while self.trajectory.len() > self.trajectory_len {
            self.trajectory.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32) -> BBox {
        BBox::new(x, 0.0, x + 10.0, 20.0, 0.9, 3)
    }

    #[test]
    fn test_new_track_is_tentative_without_id() {
        let track = Track::new(det(0.0), 1, 0.1, 1.0, 5);
        assert_eq!(track.state(), TrackState::Tentative);
        assert_eq!(track.id(), None);
        assert!(track.to_tracked_object().is_none());
    }

    #[test]
    fn test_lifecycle() {
        let mut track = Track::new(det(0.0), 1, 0.1, 1.0, 5);
        track.confirm(7);
        assert_eq!(track.state(), TrackState::Confirmed);

        track.mark_lost();
        assert_eq!(track.state(), TrackState::Lost);
        assert_eq!(track.frames_lost(4), 3);

        track.predict();
        track.update(&det(1.0), 5);
        assert_eq!(track.state(), TrackState::Confirmed);
        assert_eq!(track.frames_lost(5), 0);

        track.mark_removed();
        assert_eq!(track.state(), TrackState::Removed);
    }

    #[test]
    fn test_mark_lost_only_affects_confirmed() {
        let mut track = Track::new(det(0.0), 1, 0.1, 1.0, 5);
        track.mark_lost();
        assert_eq!(track.state(), TrackState::Tentative);
    }

    #[test]
    fn test_trajectory_is_bounded() {
        let mut track = Track::new(det(0.0), 1, 0.1, 1.0, 3);
        for f in 2..10 {
            track.predict();
            track.update(&det(f as f32), f);
        }
        track.confirm(1);
        let obj = track.to_tracked_object().unwrap();
        assert_eq!(obj.trajectory.len(), 3);
        assert_eq!(obj.hits, 9);
        assert_eq!(obj.bbox.class_id, 3);
    }
}
