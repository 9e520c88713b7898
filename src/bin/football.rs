/// 足球视频分析 - 检测 + 跟踪 + 图像小工具
///
/// 主程序入口: cargo run --release --bin football -- track --input input_videos/08fd33_4.mp4
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use image::{DynamicImage, Rgb};
use serde::Serialize;
use tracing::{info, warn};

use football_analysis::annotate::{draw_thick_rect, Annotator};
use football_analysis::imaging::{rescale_frame, EdgeFilter, FilterMode, FpsCounter, DEFAULT_SCALE};
use football_analysis::tracking::id_to_color;
use football_analysis::video::{self, FrameSink, FrameSource};
use football_analysis::{
    gen_time_string, logging, run_streaming, AppConfig, BBox, Detector, Frame, ObjectTracker,
    YOLOv8,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "足球视频检测与跟踪", long_about = None)]
struct Cli {
    /// 日志详细程度 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON 配置文件
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 检测 + 跟踪, 输出标注后的视频
    Track(TrackArgs),
    /// 逐帧检测, 每帧输出一行 JSON
    Detect(DetectArgs),
    /// 翻转 + 模糊 (+ Canny 边缘) 滤镜演示
    Filter(FilterArgs),
    /// 按比例缩放
    Rescale(RescaleArgs),
    /// 绘图演示
    Draw(DrawArgs),
    /// 写出配置文件 (默认值 + 已加载的配置)
    Config(ConfigArgs),
}

/// 检测器相关参数 (覆盖配置文件)
#[derive(Args, Debug)]
struct ModelArgs {
    /// ONNX 模型路径
    #[arg(short, long)]
    model: Option<String>,

    /// 置信度阈值
    #[arg(long)]
    conf: Option<f32>,

    /// 使用 CUDA
    #[arg(long)]
    cuda: bool,

    /// 只保留这些类别 (逗号分隔)
    #[arg(long, value_delimiter = ',')]
    classes: Vec<String>,
}

#[derive(Args, Debug)]
struct TrackArgs {
    /// 输入: 视频文件 / 图片目录 / 单张图片
    #[arg(short, long)]
    input: PathBuf,

    /// 输出: 视频文件 / 图片目录 (默认 output_videos/<时间>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,

    /// 跟踪结果缓存 (存在则直接读取)
    #[arg(long)]
    stub: Option<PathBuf>,

    /// 字体文件 (绘制ID)
    #[arg(long)]
    font: Option<String>,

    /// 输出帧率 (图片序列输入时也作为输入帧率)
    #[arg(long)]
    fps: Option<f64>,

    /// 边解码边处理, 不把整段视频读入内存
    #[arg(long)]
    streaming: bool,

    /// 绘制运动轨迹
    #[arg(long)]
    trajectory: bool,
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[arg(short, long)]
    input: PathBuf,

    #[command(flatten)]
    model: ModelArgs,

    /// 保存带检测框的画面
    #[arg(long)]
    save: Option<PathBuf>,

    #[arg(long)]
    font: Option<String>,

    #[arg(long)]
    fps: Option<f64>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    #[arg(short, long)]
    input: PathBuf,

    #[arg(short, long)]
    output: PathBuf,

    /// preview / canny
    #[arg(long, default_value = "preview")]
    mode: String,

    #[arg(long)]
    font: Option<String>,

    #[arg(long)]
    fps: Option<f64>,
}

#[derive(Args, Debug)]
struct RescaleArgs {
    #[arg(short, long)]
    input: PathBuf,

    #[arg(short, long)]
    output: PathBuf,

    #[arg(short, long, default_value_t = DEFAULT_SCALE)]
    scale: f32,

    #[arg(long)]
    fps: Option<f64>,
}

#[derive(Args, Debug)]
struct DrawArgs {
    #[arg(short, long, default_value = "draw.png")]
    output: PathBuf,

    #[arg(long)]
    font: Option<String>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(short, long, default_value = "config.json")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Track(args) => track(&mut config, args),
        Command::Detect(args) => detect(&mut config, args),
        Command::Filter(args) => filter(&mut config, args),
        Command::Rescale(args) => rescale(args),
        Command::Draw(args) => draw(&mut config, args),
        Command::Config(args) => {
            config.save(&args.output)?;
            Ok(())
        }
    }
}

fn apply_model_args(config: &mut AppConfig, args: &ModelArgs) -> Result<()> {
    if let Some(model) = &args.model {
        config.detector.model = model.clone();
    }
    if let Some(conf) = args.conf {
        config.detector.conf = conf;
    }
    if args.cuda {
        config.detector.cuda = true;
    }
    if !args.classes.is_empty() {
        config.detector.classes = args.classes.clone();
    }
    config.validate()?;
    Ok(())
}

fn load_detector(config: &AppConfig) -> Result<YOLOv8> {
    let model = YOLOv8::new(&config.detector)
        .with_context(|| format!("加载模型失败: {}", config.detector.model))?;
    info!(
        "📐 {:?} 输入 {}x{}{}",
        model.model_type(),
        model.width(),
        model.height(),
        if model.model_type().needs_nms() { "" } else { " (NMS-Free)" }
    );
    Ok(model)
}

fn track(config: &mut AppConfig, args: TrackArgs) -> Result<()> {
    apply_model_args(config, &args.model)?;
    if args.font.is_some() {
        config.annotate.font = args.font.clone();
    }
    if args.trajectory {
        config.annotate.draw_trajectory = true;
    }
    config.log_summary();

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("output_videos/{}", gen_time_string("-"))));
    let annotator = Annotator::from_config(&config.annotate, config.pipeline.untracked_classes.clone())?;
    let mut tracker = ObjectTracker::new(load_detector(config)?, config);

    if args.streaming {
        if args.stub.is_some() {
            warn!("⚠️ 流式模式不读写跟踪缓存, 忽略 --stub");
        }
        let source = video::open_source(&args.input, args.fps)?;
        let sink = video::create_sink(&output, source.fps())?;
        let stats = run_streaming(&mut tracker, source, sink, annotator)?;
        info!("🏁 {} 帧, 平均 {:.1} fps → {}", stats.frames, stats.fps(), output.display());
        return Ok(());
    }

    let mut frames = video::read_video(&args.input)?;
    let tracks = tracker.get_object_tracks(&frames, args.stub.as_deref())?;

    let mut annotator = annotator;
    for (frame, frame_tracks) in frames.iter_mut().zip(&tracks.frames) {
        annotator.draw_tracks(&mut frame.image, frame_tracks);
    }
    let fps = args.fps.unwrap_or(video::DEFAULT_FPS);
    video::save_video(&frames, &output, fps)?;
    info!("🏁 输出: {}", output.display());
    Ok(())
}

/// 一帧检测结果 (JSON 行)
#[derive(Serialize)]
struct DetectionLine<'a> {
    frame: u64,
    detections: Vec<DetectionEntry<'a>>,
}

#[derive(Serialize)]
struct DetectionEntry<'a> {
    class: &'a str,
    class_id: u32,
    confidence: f32,
    bbox: [f32; 4],
}

fn detect(config: &mut AppConfig, args: DetectArgs) -> Result<()> {
    apply_model_args(config, &args.model)?;
    let mut detector = load_detector(config)?;
    let names = detector.class_names().to_vec();

    let mut source = video::open_source(&args.input, args.fps)?;
    let mut sink = match &args.save {
        Some(path) => Some(video::create_sink(path, source.fps())?),
        None => None,
    };
    let mut annotator = match &args.font {
        Some(font) => Annotator::new(Some(football_analysis::annotate::load_font(font)?), Vec::new()),
        None => Annotator::new(None, Vec::new()),
    };

    let batch_size = config.pipeline.batch_size;
    let mut batch: Vec<Frame> = Vec::with_capacity(batch_size);
    let mut total = 0u64;
    loop {
        batch.clear();
        while batch.len() < batch_size {
            match source.next_frame()? {
                Some(frame) => batch.push(frame),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let images: Vec<DynamicImage> = batch
            .iter()
            .map(|f| DynamicImage::ImageRgb8(f.image.clone()))
            .collect();
        let results = detector.detect(&images)?;

        for (frame, boxes) in batch.iter_mut().zip(&results) {
            let line = DetectionLine {
                frame: frame.index,
                detections: boxes
                    .iter()
                    .map(|b| DetectionEntry {
                        class: names.get(b.class_id as usize).map(|s| s.as_str()).unwrap_or("unknown"),
                        class_id: b.class_id,
                        confidence: b.confidence,
                        bbox: b.xyxy(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string(&line)?);
            total += boxes.len() as u64;

            if let Some(sink) = sink.as_mut() {
                draw_detections(&mut annotator, frame, boxes, &names);
                sink.write_frame(frame)?;
            }
        }
    }
    if let Some(mut sink) = sink {
        sink.finish()?;
    }
    info!("🔍 检测框总数: {}", total);
    Ok(())
}

fn draw_detections(annotator: &mut Annotator, frame: &mut Frame, boxes: &[BBox], names: &[String]) {
    for b in boxes {
        let (r, g, bl) = id_to_color(b.class_id + 1);
        let color = Rgb([r, g, bl]);
        draw_thick_rect(&mut frame.image, (b.x1, b.y1), (b.x2, b.y2), color, 2);
        let label = format!(
            "{} {:.2}",
            names.get(b.class_id as usize).map(|s| s.as_str()).unwrap_or("?"),
            b.confidence
        );
        annotator.draw_text(&mut frame.image, &label, (b.x1, (b.y1 - 18.0).max(0.0)), 16.0, color);
    }
}

fn filter(config: &mut AppConfig, args: FilterArgs) -> Result<()> {
    let mode: FilterMode = args.mode.parse()?;
    if args.font.is_some() {
        config.annotate.font = args.font.clone();
    }
    let mut annotator = Annotator::from_config(&config.annotate, Vec::new())?;
    let edge = EdgeFilter::new(mode);
    info!("🎛️ 滤镜模式: {:?}", mode);

    let mut source = video::open_source(&args.input, args.fps)?;
    let mut sink = video::create_sink(&args.output, source.fps())?;
    let mut fps = FpsCounter::default();
    let mut count = 0u64;

    while let Some(frame) = source.next_frame()? {
        let mut image = edge.apply(&frame.image);
        let current = fps.tick();
        annotator.draw_fps(&mut image, current);
        sink.write_frame(&Frame::new(frame.index, image))?;
        count += 1;
    }
    sink.finish()?;
    if count == 0 {
        bail!("输入没有任何帧: {}", args.input.display());
    }
    info!("✅ 滤镜处理 {} 帧, 平均 {:.1} fps", count, fps.average());
    Ok(())
}

fn rescale(args: RescaleArgs) -> Result<()> {
    let mut source = video::open_source(&args.input, args.fps)?;
    let mut sink = video::create_sink(&args.output, source.fps())?;
    let mut count = 0u64;

    while let Some(frame) = source.next_frame()? {
        let image = rescale_frame(&frame.image, args.scale)
            .with_context(|| format!("缩放第 {} 帧失败", frame.index))?;
        if count == 0 {
            info!(
                "📐 {}x{} → {}x{} (scale={})",
                frame.width(),
                frame.height(),
                image.width(),
                image.height(),
                args.scale
            );
        }
        sink.write_frame(&Frame::new(frame.index, image))?;
        count += 1;
    }
    sink.finish()?;
    if count == 0 {
        bail!("输入没有任何帧: {}", args.input.display());
    }
    info!("✅ 已缩放 {} 帧 → {}", count, args.output.display());
    Ok(())
}

fn draw(config: &mut AppConfig, args: DrawArgs) -> Result<()> {
    if args.font.is_some() {
        config.annotate.font = args.font.clone();
    }
    let mut annotator = Annotator::from_config(&config.annotate, Vec::new())?;
    let canvas = annotator.demo_canvas();
    save_image(&canvas, &args.output)?;
    info!("🎨 绘图结果: {}", args.output.display());
    Ok(())
}

fn save_image(image: &image::RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image
        .save(path)
        .with_context(|| format!("保存图片失败: {}", path.display()))
}
