//! 検出処理で発生するエラーを定義するモジュール

use thiserror::Error;

/// 検出処理のエラー
///
/// `Config` のみ起動時の致命的なエラーで、それ以外はフレーム単位のエラーです。
/// フレーム単位のエラーが起きてもパイプラインは次のフレームを処理できます。
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("crop region ({x}, {y}, {side}x{side}) exceeds source {width}x{height}")]
    InvalidCrop {
        x: u32,
        y: u32,
        side: u32,
        width: u32,
        height: u32,
    },

    #[error("tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    TensorShape {
        expected: [usize; 4],
        actual: [usize; 4],
    },

    #[error("tensor data has {actual} elements, shape {shape:?} needs {expected}")]
    TensorLength {
        shape: [usize; 4],
        expected: usize,
        actual: usize,
    },

    #[error("tensor index {index:?} out of bounds for shape {shape:?}")]
    TensorIndex {
        index: [usize; 4],
        shape: [usize; 4],
    },

    #[error("inference failed: {0}")]
    Inference(#[source] anyhow::Error),
}

impl DetectError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        DetectError::Config(msg.into())
    }

    /// 致命的なエラーか (パイプラインを開始してはいけない状態か)
    pub fn is_fatal(&self) -> bool {
        matches!(self, DetectError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, DetectError>;
