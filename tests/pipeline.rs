// 端到端: 图片序列 → 检测 → 跟踪 → 标注 → 图片序列

use std::collections::BTreeSet;

use image::{DynamicImage, Rgb, RgbImage};

use football_analysis::pipeline::UNTRACKED_ID;
use football_analysis::video::{self, ImageSequenceSink, ImageSequenceSource};
use football_analysis::{
    run_streaming, Annotator, AppConfig, BBox, Detector, Frame, ObjectTracker, ObjectTracks,
    Result,
};

/// 两名球员相向跑动并在中途交错, 球每帧都在, 第三名球员中途离场
struct MatchDetector {
    names: Vec<String>,
}

impl MatchDetector {
    fn new() -> Self {
        Self {
            names: ["ball", "goalkeeper", "player", "referee"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Detector for MatchDetector {
    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn detect(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<BBox>>> {
        Ok(images
            .iter()
            .map(|img| {
                let t = img.to_rgb8().get_pixel(0, 0).0[0] as f32;
                let mut dets = vec![
                    // 上方球员向右, 下方球员向左
                    BBox::new(20.0 + 4.0 * t, 40.0, 50.0 + 4.0 * t, 100.0, 0.92, 2),
                    BBox::new(260.0 - 4.0 * t, 120.0, 290.0 - 4.0 * t, 180.0, 0.88, 2),
                    BBox::new(150.0, 10.0, 158.0, 18.0, 0.55, 0),
                ];
                if t < 10.0 {
                    dets.push(BBox::new(300.0, 200.0, 330.0, 236.0, 0.8, 3));
                }
                dets
            })
            .collect())
    }
}

fn write_input(dir: &std::path::Path, n: u64) {
    let frames: Vec<Frame> = (0..n)
        .map(|i| Frame::new(i, RgbImage::from_pixel(360, 240, Rgb([i as u8, 90, 30]))))
        .collect();
    video::save_video(&frames, dir, 24.0).unwrap();
}

#[test]
fn batch_tracking_keeps_identities() {
    let input = tempfile::tempdir().unwrap();
    write_input(input.path(), 40);
    let frames = video::read_video(input.path()).unwrap();
    assert_eq!(frames.len(), 40);

    let stub = input.path().join("stubs").join("tracks.json");
    let mut tracker = ObjectTracker::new(MatchDetector::new(), &AppConfig::default());
    let tracks = tracker.get_object_tracks(&frames, Some(&stub)).unwrap();

    assert_eq!(tracks.frames.len(), 40);
    assert_eq!(tracks.ids("player").len(), 2);
    assert_eq!(tracks.ids("ball"), BTreeSet::from([UNTRACKED_ID]));

    // 裁判离场后不再输出
    assert_eq!(tracks.ids("referee").len(), 1);
    assert!(tracks.frames[9].objects.contains_key("referee"));
    assert!(!tracks.frames[20].objects.contains_key("referee"));

    // 上方球员的ID始终对应上方的框
    let first = &tracks.frames[0].objects["player"];
    let top_id = *first
        .iter()
        .find(|(_, r)| r.bbox[1] < 60.0)
        .map(|(id, _)| id)
        .unwrap();
    for frame in &tracks.frames {
        let record = frame.get("player", top_id).unwrap();
        assert!(record.bbox[1] < 60.0);
    }

    let cached = ObjectTracks::load(&stub).unwrap();
    assert_eq!(cached, tracks);
}

#[test]
fn streaming_matches_batch_output_count() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_input(input.path(), 33);

    let config = AppConfig::default();
    let mut tracker = ObjectTracker::new(MatchDetector::new(), &config);
    let source = Box::new(ImageSequenceSource::open(input.path()).unwrap());
    let sink = Box::new(ImageSequenceSink::create(output.path().join("annotated")).unwrap());
    let annotator = Annotator::new(None, config.pipeline.untracked_classes.clone());

    let stats = run_streaming(&mut tracker, source, sink, annotator).unwrap();
    assert_eq!(stats.frames, 33);
    // 两名球员 + 裁判 + 球
    assert_eq!(stats.unique_tracks, 4);

    let annotated = video::read_video(output.path().join("annotated")).unwrap();
    assert_eq!(annotated.len(), 33);
    // 球的标记是绿色三角 (尖端在框顶部中点上方)
    assert_eq!(annotated[0].image.get_pixel(154, 0).0, [0, 255, 0]);
}
