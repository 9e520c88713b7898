//! 错误处理模块
//!
//! 库内统一返回 `crate::Result<T>`, 二进制入口再用 anyhow 包一层上下文。

use thiserror::Error;

/// 库错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 图像编解码错误
    #[error("图像错误: {0}")]
    Image(#[from] image::ImageError),

    /// JSON 序列化错误
    #[error("序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    /// ONNX Runtime 错误
    #[error("推理引擎错误: {0}")]
    Ort(#[from] ort::Error),

    /// 张量形状错误
    #[error("张量形状错误: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// 缩放失败
    #[error("缩放失败: {0}")]
    Resize(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 模型输出/元数据不符合预期
    #[error("模型错误: {0}")]
    Model(String),

    /// 输入源错误
    #[error("输入源错误: {0}")]
    Source(String),

    /// 输出错误
    #[error("输出错误: {0}")]
    Sink(String),

    /// 未启用的功能或不支持的格式
    #[error("不支持: {0}")]
    Unsupported(String),

    /// 流水线通道提前关闭
    #[error("通道已关闭: {0}")]
    ChannelClosed(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
