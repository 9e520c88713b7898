// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ONNX Runtime 推理引擎封装
//!
//! 负责: 加载权重 → 读取输入尺寸与元数据 → 执行批量推理

use std::path::PathBuf;

use ndarray::{Array, IxDyn};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use tracing::{debug, info, warn};

use crate::models::parse_names;
use crate::{Error, Result};

/// 执行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    Cpu,
    Cuda(i32),
}

/// 推理引擎参数
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub model: PathBuf,
    pub ep: OrtEP,
    /// 模型输入为动态尺寸时使用的边长
    pub input_size: u32,
}

pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
    /// None = 动态 batch
    batch: Option<u32>,
    height: u32,
    width: u32,
    names: Vec<String>,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        if !config.model.is_file() {
            return Err(Error::Model(format!(
                "模型文件不存在: {}",
                config.model.display()
            )));
        }

        let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        let builder = match config.ep {
            OrtEP::Cuda(device_id) => builder.with_execution_providers([
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])?,
            OrtEP::Cpu => {
                builder.with_execution_providers([CPUExecutionProvider::default().build()])?
            }
        };
        let session = builder.commit_from_file(&config.model)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| Error::Model("模型没有输入".to_string()))?;
        let input_name = input.name.clone();
        let dims = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => dimensions.clone(),
            other => {
                return Err(Error::Model(format!("不支持的输入类型: {:?}", other)));
            }
        };
        if dims.len() != 4 {
            return Err(Error::Model(format!(
                "期望 NCHW 四维输入, 实际 {:?}",
                dims
            )));
        }

        let fixed = |d: i64| if d > 0 { Some(d as u32) } else { None };
        let batch = fixed(dims[0]);
        let height = fixed(dims[2]).unwrap_or(config.input_size);
        let width = fixed(dims[3]).unwrap_or(config.input_size);

        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();

        let names = match session.metadata()?.custom("names")? {
            Some(raw) => parse_names(&raw)?,
            None => {
                warn!("⚠️ 模型缺少 names 元数据, 使用 COCO 类别名");
                Vec::new()
            }
        };

        info!(
            "✅ 模型加载成功: {} | 输入 {}x{} | batch {} | 类别 {} | EP {:?}",
            config.model.display(),
            width,
            height,
            batch.map(|b| b.to_string()).unwrap_or_else(|| "dynamic".to_string()),
            names.len(),
            config.ep
        );

        Ok(Self {
            session,
            input_name,
            output_names,
            batch,
            height,
            width,
            names,
        })
    }

    /// 执行推理: NCHW f32 张量 → 全部输出
    pub fn run(&self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = std::time::Instant::now();
        let tensor = Tensor::from_array(xs)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor]?)?;

        let mut ys = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let y = outputs[name.as_str()].try_extract_tensor::<f32>()?;
            ys.push(y.into_owned());
        }
        debug!("[Model Inference]: {:?}", t.elapsed());
        Ok(ys)
    }

    pub fn batch(&self) -> Option<u32> {
        self.batch
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// 元数据中的类别名 (可能为空)
    pub fn names(&self) -> &[String] {
        &self.names
    }
}
