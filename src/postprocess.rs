//! YOLO (You Only Look Once) の出力テンソルをバウンディングボックスに変換するモジュール

use log::debug;

use crate::config::DetectorConfig;
use crate::detection_result::{BoundingBox, Rect};
use crate::error::{DetectError, Result};
use crate::tensor::Tensor4;

/// (x, y, w, h) の次にある objectness のチャネル
const OBJECTNESS_CH: usize = 4;

/// シグモイド関数 e^v / (1 + e^v)
///
/// 大きな |v| で e^v があふれないよう、符号で式を切り替えます。
pub fn sigmoid(v: f32) -> f32 {
    if v >= 0. {
        1. / (1. + (-v).exp())
    } else {
        let k = v.exp();
        k / (1. + k)
    }
}

/// ソフトマックス関数
///
/// # Args
/// * `values` - 生のスコア
///
/// # Return
/// * 合計が1になる確率分布 (入力が空なら空)
pub fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = values.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

/// 最大の要素とそのインデックスを返します。同じ値なら先に現れた方を選びます。
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// テンソルから読んだままの (x, y, w, h)
#[derive(Debug, Clone, Copy, PartialEq)]
struct CellOffset {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl CellOffset {
    fn read(output: &Tensor4, row: usize, col: usize, ch: usize) -> Result<Self> {
        match *output.channels(0, row, col, ch, OBJECTNESS_CH)? {
            [x, y, w, h] => Ok(Self { x, y, w, h }),
            _ => Err(DetectError::TensorIndex {
                index: [0, row, col, ch],
                shape: output.shape(),
            }),
        }
    }

    /// 入力画像のピクセル座標に変換します。
    ///
    /// # Args
    /// * `row`, `col` - セルの位置
    /// * `slot` - ボックススロット (アンカーのインデックス)
    /// * `config` - 検出器の設定
    ///
    /// # Return
    /// * 左上基準の矩形
    fn map_to_input(self, row: usize, col: usize, slot: usize, config: &DetectorConfig) -> Rect {
        let anchor = config.anchors[slot];
        let cx = (col as f32 + sigmoid(self.x)) * config.cell_width;
        let cy = (row as f32 + sigmoid(self.y)) * config.cell_height;
        let w = self.w.exp() * config.cell_width * anchor.width;
        let h = self.h.exp() * config.cell_height * anchor.height;
        Rect::from_center(cx, cy, w, h)
    }
}

fn is_finite(r: &Rect) -> bool {
    r.x.is_finite() && r.y.is_finite() && r.width.is_finite() && r.height.is_finite()
}

/// 1個のボックススロットを評価します。
///
/// objectness が閾値未満ならクラススコアは計算しません。
/// NaN や無限大を含むスロットは捨てます。
fn decode_slot(
    output: &Tensor4,
    row: usize,
    col: usize,
    slot: usize,
    config: &DetectorConfig,
) -> Result<Option<BoundingBox>> {
    let threshold = config.confidence_threshold;
    let ch = slot * config.box_stride();

    let confidence = sigmoid(output.get(0, row, col, ch + OBJECTNESS_CH)?);
    // NaN も弾く
    if !(confidence >= threshold) {
        return Ok(None);
    }

    let rect = CellOffset::read(output, row, col, ch)?.map_to_input(row, col, slot, config);
    if !is_finite(&rect) {
        return Ok(None);
    }

    let classes = output.channels(0, row, col, ch + config.features_per_box, config.class_count)?;
    let probs = softmax(classes);
    let Some((class_id, prob)) = argmax(&probs) else {
        return Ok(None);
    };
    let score = prob * confidence;
    if !(score >= threshold) {
        return Ok(None);
    }

    let label = config
        .labels
        .get(class_id)
        .ok_or_else(|| DetectError::config(format!("no label for class {class_id}")))?;
    let color = config
        .color(class_id)
        .ok_or_else(|| DetectError::config(format!("no color for class {class_id}")))?;

    Ok(Some(BoundingBox {
        rect,
        class_id,
        label: label.clone(),
        confidence: score,
        color,
    }))
}

/// YOLOの出力テンソルから候補のバウンディングボックスを抽出します。
///
/// # Args
/// * `output` - [1, rows, cols, channels] の出力テンソル
/// * `config` - 検出器の設定
///
/// # Return
/// * 閾値を通過した候補 (順序に意味はありません)
pub fn decode(output: &Tensor4, config: &DetectorConfig) -> Result<Vec<BoundingBox>> {
    let expected = config.output_shape();
    if output.shape() != expected {
        return Err(DetectError::TensorShape {
            expected,
            actual: output.shape(),
        });
    }

    let mut boxes = vec![];
    for row in 0..config.grid_rows {
        for col in 0..config.grid_cols {
            for slot in 0..config.boxes_per_cell {
                if let Some(b) = decode_slot(output, row, col, slot, config)? {
                    boxes.push(b);
                }
            }
        }
    }
    debug!("decoded {} candidates", boxes.len());
    Ok(boxes)
}
