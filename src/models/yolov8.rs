// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 完整模型实现
// 包含: 模型加载、预处理、推理、后处理

use std::path::PathBuf;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array, ArrayViewD, Axis, IxDyn};
use tracing::{debug, info};

use super::{coco_names, resolve_class_ids, ModelType};
use crate::config::DetectorConfig;
use crate::detection::{non_max_suppression, Detector};
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
use crate::types::BBox;
use crate::{Error, Result};

/// 预处理填充值
const PAD_VALUE: f32 = 144.0 / 255.0;

/// 单张图片的缩放信息 (用于坐标还原)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    pub ratio: f32,
    pub width: f32,
    pub height: f32,
}

impl LetterboxInfo {
    pub fn new(w0: f32, h0: f32, w1: f32, h1: f32) -> Self {
        Self {
            ratio: (w1 / w0).min(h1 / h0),
            width: w0,
            height: h0,
        }
    }
}

/// YOLOv8 完整模型结构
pub struct YOLOv8 {
    engine: OrtBackend,
    model_type: ModelType,
    height: u32,
    width: u32,
    conf: f32,
    iou: f32,
    names: Vec<String>,
    /// 只保留这些类别 (空 = 全部)
    keep_classes: Vec<u32>,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let ep = if config.cuda {
            OrtEP::Cuda(config.device_id)
        } else {
            OrtEP::Cpu
        };

        let engine = OrtBackend::build(OrtConfig {
            model: PathBuf::from(&config.model),
            ep,
            input_size: config.input_size,
        })?;

        let names = if engine.names().is_empty() {
            coco_names()
        } else {
            engine.names().to_vec()
        };
        let keep_classes = resolve_class_ids(&names, &config.classes)?;
        let model_type = ModelType::from_path(&config.model);

        info!(
            "🎯 {:?} | conf {:.2} | iou {:.2} | 类别: {}",
            model_type,
            config.conf,
            config.iou,
            names.join(", ")
        );

        Ok(Self {
            height: engine.height(),
            width: engine.width(),
            engine,
            model_type,
            conf: config.conf,
            iou: config.iou,
            names,
            keep_classes,
        })
    }

    /// 保持宽高比缩放到网络输入尺寸, 左上角对齐, 其余填充
    pub fn preprocess(&self, xs: &[DynamicImage]) -> Result<(Array<f32, IxDyn>, Vec<LetterboxInfo>)> {
        letterbox(xs, self.width, self.height)
    }

    pub fn postprocess(
        &self,
        xs: &[Array<f32, IxDyn>],
        infos: &[LetterboxInfo],
    ) -> Result<Vec<Vec<BBox>>> {
        let preds = xs
            .first()
            .ok_or_else(|| Error::Model("模型没有输出".to_string()))?;

        let mut ys = if self.model_type.needs_nms() {
            decode_predictions(preds.view(), infos, self.conf, self.iou)?
        } else {
            decode_end2end(preds.view(), infos, self.conf)?
        };

        if !self.keep_classes.is_empty() {
            for boxes in &mut ys {
                boxes.retain(|b| self.keep_classes.contains(&b.class_id));
            }
        }
        Ok(ys)
    }

    fn run_chunk(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<BBox>>> {
        let t_pre = Instant::now();
        let (xs, infos) = self.preprocess(images)?;
        debug!("[Model Preprocess]: {:?}", t_pre.elapsed());

        let ys = self.engine.run(xs)?;

        let t_post = Instant::now();
        let ys = self.postprocess(&ys, &infos)?;
        debug!("[Model Postprocess]: {:?}", t_post.elapsed());
        Ok(ys)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }
}

impl Detector for YOLOv8 {
    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn detect(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<BBox>>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.engine.batch().map(|b| b.max(1) as usize);
        run_in_fixed_batches(images, batch, |part| self.run_chunk(part))
    }
}

/// 保持宽高比缩放到 `width x height`, 左上角对齐, 其余填充 `PAD_VALUE`
///
/// 输出 NCHW 张量, RGB 归一化到 [0, 1]。
pub fn letterbox(
    xs: &[DynamicImage],
    width: u32,
    height: u32,
) -> Result<(Array<f32, IxDyn>, Vec<LetterboxInfo>)> {
    let mut ys =
        Array::from_elem((xs.len(), 3, height as usize, width as usize), PAD_VALUE).into_dyn();
    let mut infos = Vec::with_capacity(xs.len());

    for (idx, x) in xs.iter().enumerate() {
        let (w0, h0) = x.dimensions();
        if w0 == 0 || h0 == 0 {
            return Err(Error::Model(format!("第 {} 张图片尺寸为0", idx)));
        }
        let info = LetterboxInfo::new(w0 as f32, h0 as f32, width as f32, height as f32);
        let w_new = ((w0 as f32 * info.ratio).round() as u32).clamp(1, width);
        let h_new = ((h0 as f32 * info.ratio).round() as u32).clamp(1, height);
        let img = x
            .resize_exact(w_new, h_new, image::imageops::FilterType::Triangle)
            .into_rgb8();

        for (x, y, rgb) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            ys[[idx, 0, y, x]] = (r as f32) / 255.0;
            ys[[idx, 1, y, x]] = (g as f32) / 255.0;
            ys[[idx, 2, y, x]] = (b as f32) / 255.0;
        }
        infos.push(info);
    }

    Ok((ys, infos))
}

/// 按固定 batch 分块调用 `f`, 返回与 `images` 一一对应的结果
///
/// `batch` 为 None (动态 batch) 时整体调用一次。最后一块不足 batch 时
/// 用该块最后一张补齐, 多余结果丢弃。
pub fn run_in_fixed_batches<F>(
    images: &[DynamicImage],
    batch: Option<usize>,
    mut f: F,
) -> Result<Vec<Vec<BBox>>>
where
    F: FnMut(&[DynamicImage]) -> Result<Vec<Vec<BBox>>>,
{
    let Some(last) = images.last() else {
        return Ok(Vec::new());
    };
    let chunk = batch.map(|b| b.max(1)).unwrap_or(images.len());

    let mut ys = Vec::with_capacity(images.len());
    for part in images.chunks(chunk) {
        let mut out = if part.len() < chunk {
            let mut padded = part.to_vec();
            padded.resize(chunk, part.last().unwrap_or(last).clone());
            f(&padded)?
        } else {
            f(part)?
        };
        if out.len() < part.len() {
            return Err(Error::Model(format!(
                "推理返回 {} 个结果, 期望 {}",
                out.len(),
                part.len()
            )));
        }
        out.truncate(part.len());
        ys.extend(out);
    }
    Ok(ys)
}

/// 解码 `[batch, 4 + nc, anchors]` 输出: argmax 类别 → 置信度过滤 → 坐标还原 → NMS
pub fn decode_predictions(
    preds: ArrayViewD<'_, f32>,
    infos: &[LetterboxInfo],
    conf: f32,
    iou: f32,
) -> Result<Vec<Vec<BBox>>> {
    const CXYWH_OFFSET: usize = 4;

    let shape = preds.shape();
    if shape.len() != 3 || shape[1] <= CXYWH_OFFSET {
        return Err(Error::Model(format!(
            "期望输出形状 [batch, 4+nc, anchors], 实际 {:?}",
            shape
        )));
    }
    if shape[0] < infos.len() {
        return Err(Error::Model(format!(
            "输出 batch {} 小于输入图片数 {}",
            shape[0],
            infos.len()
        )));
    }

    let mut ys = Vec::with_capacity(infos.len());
    for (anchor, info) in preds.axis_iter(Axis(0)).zip(infos.iter()) {
        let mut data: Vec<BBox> = Vec::new();
        for pred in anchor.axis_iter(Axis(1)) {
            let clss = pred.slice(s![CXYWH_OFFSET..]);
            let Some((id, &confidence)) = clss
                .iter()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max })
            else {
                continue;
            };

            if confidence < conf {
                continue;
            }

            let cx = pred[0] / info.ratio;
            let cy = pred[1] / info.ratio;
            let w = pred[2] / info.ratio;
            let h = pred[3] / info.ratio;
            let bbox = BBox::from_xywh(cx - w / 2.0, cy - h / 2.0, w, h, confidence, id as u32)
                .clamp(info.width, info.height);
            if bbox.area() > 0.0 {
                data.push(bbox);
            }
        }

        non_max_suppression(&mut data, iou);
        ys.push(data);
    }
    Ok(ys)
}

/// 解码 YOLOv10 端到端输出 `[batch, N, 6]`: (x1, y1, x2, y2, conf, cls)
pub fn decode_end2end(
    preds: ArrayViewD<'_, f32>,
    infos: &[LetterboxInfo],
    conf: f32,
) -> Result<Vec<Vec<BBox>>> {
    let shape = preds.shape();
    if shape.len() != 3 || shape[2] < 6 || shape[0] < infos.len() {
        return Err(Error::Model(format!(
            "期望输出形状 [batch, N, 6], 实际 {:?}",
            shape
        )));
    }

    let mut ys = Vec::with_capacity(infos.len());
    for (batch, info) in preds.axis_iter(Axis(0)).zip(infos.iter()) {
        let mut boxes = Vec::new();
        for pred in batch.axis_iter(Axis(0)) {
            let confidence = pred[4];
            if confidence < conf {
                continue;
            }
            let bbox = BBox::new(
                pred[0] / info.ratio,
                pred[1] / info.ratio,
                pred[2] / info.ratio,
                pred[3] / info.ratio,
                confidence,
                pred[5].max(0.0) as u32,
            )
            .clamp(info.width, info.height);
            if bbox.area() > 0.0 {
                boxes.push(bbox);
            }
        }
        ys.push(boxes);
    }
    Ok(ys)
}
