//! カメラ画像から検出結果までの処理をまとめるモジュール
//!
//! 同時に処理するフレームは1枚だけです。処理中に届いたフレームはキューに
//! 入れずに捨てます。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use image::{DynamicImage, RgbaImage};
use log::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::detection_result::BoundingBox;
use crate::error::{DetectError, Result};
use crate::tensor::{self, Tensor4};
use crate::{img_proc, nms, postprocess};

/// ニューラルネットワークの推論を行う外部ランタイム
///
/// 入力は [1, H, W, 3]、出力は [1, rows, cols, channels] のテンソルです。
pub trait Inference {
    fn infer(&self, input: &Tensor4) -> anyhow::Result<Tensor4>;
}

impl<F> Inference for F
where
    F: Fn(&Tensor4) -> anyhow::Result<Tensor4>,
{
    fn infer(&self, input: &Tensor4) -> anyhow::Result<Tensor4> {
        self(input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Processing,
}

/// `submit` の結果
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// NMS 後の検出結果 (コンフィデンスの降順)
    Detected(Vec<BoundingBox>),
    /// 別のフレームを処理中だったため捨てた
    Dropped,
}

/// 処理中フラグを立て、スコープを抜けると (エラーでもパニックでも) 戻す
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 物体検出のパイプライン
pub struct DetectionPipeline<M> {
    config: DetectorConfig,
    model: M,
    busy: AtomicBool,
    frame_index: AtomicU64,
}

impl<M: Inference> DetectionPipeline<M> {
    /// 新しい `DetectionPipeline` を作成します。
    ///
    /// # Args
    /// * `config` - 検出器の設定 (ここで検証します)
    /// * `model` - 推論ランタイム
    ///
    /// # Return
    /// * 設定が不正なら `DetectError::Config`
    pub fn new(config: DetectorConfig, model: M) -> Result<Self> {
        config.validate()?;
        info!(
            "grid: {}x{}x{}, classes: {}, input: {}x{}",
            config.grid_rows,
            config.grid_cols,
            config.channels_per_cell,
            config.class_count,
            config.input_width,
            config.input_height
        );
        info!(
            "thresholds: confidence {}, parse {}, overlap {}, limit {}",
            config.confidence_threshold,
            config.parse_threshold,
            config.suppression_overlap_threshold,
            config.result_limit
        );
        Ok(Self {
            config,
            model,
            busy: AtomicBool::new(false),
            frame_index: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        if self.busy.load(Ordering::Acquire) {
            State::Processing
        } else {
            State::Idle
        }
    }

    /// フレームを処理します。
    ///
    /// 別のフレームを処理中なら何もせずに `Outcome::Dropped` を返します。
    /// 処理に失敗してもパイプラインは Idle に戻り、次のフレームを受け付けます。
    ///
    /// # Args
    /// * `frame` - カメラ画像
    ///
    /// # Return
    /// * 検出結果、または捨てたことを表す `Outcome`
    pub fn submit(&self, frame: RgbaImage) -> Result<Outcome> {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            warn!("pipeline busy, frame dropped");
            return Ok(Outcome::Dropped);
        };

        let idx = self.frame_index.fetch_add(1, Ordering::Relaxed);
        debug!("frame {}: {}x{}", idx, frame.width(), frame.height());
        match self.detect(frame) {
            Ok(boxes) => {
                debug!("frame {}: {} objects", idx, boxes.len());
                Ok(Outcome::Detected(boxes))
            }
            Err(e) => {
                warn!("frame {} failed: {}", idx, e);
                Err(e)
            }
        }
    }

    /// RGB など RGBA 以外の画像を変換してから処理します。
    pub fn submit_image(&self, frame: &DynamicImage) -> Result<Outcome> {
        self.submit(frame.to_rgba8())
    }

    fn detect(&self, frame: RgbaImage) -> Result<Vec<BoundingBox>> {
        let c = &self.config;

        let prepared = img_proc::prepare_frame(&frame, c)?;
        let input = tensor::input_tensor(&prepared, c.mean, c.std_dev);

        let output = self.model.infer(&input).map_err(DetectError::Inference)?;

        let candidates: Vec<_> = postprocess::decode(&output, c)?
            .into_iter()
            .filter(|b| b.confidence >= c.parse_threshold)
            .collect();

        Ok(nms::filter(
            candidates,
            c.result_limit,
            c.suppression_overlap_threshold,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _g = BusyGuard::acquire(&flag).unwrap();
            assert!(BusyGuard::acquire(&flag).is_none());
        }
        assert!(BusyGuard::acquire(&flag).is_some());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn invalid_config_never_starts() {
        let config = DetectorConfig::default();
        let model = |_: &Tensor4| -> anyhow::Result<Tensor4> { anyhow::bail!("unreachable") };
        let err = DetectionPipeline::new(config, model).err().unwrap();
        assert!(err.is_fatal());
    }
}
