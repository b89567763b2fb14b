//! 検出器の設定を扱うモジュール
//!
//! 設定は起動時に一度だけ作成し、以降は変更しません。
//! `DetectionPipeline` が保持し、全フレームから参照のみで共有されます。

use std::path::Path;

use anyhow::Context;
use image::Rgb;
use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};

/// 正方形に切り抜く位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CropAnchor {
    #[default]
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    /// 任意のオフセット (はみ出す軸は 0 に戻す)
    Custom { x: u32, y: u32 },
}

/// アンカーボックスの幅と高さの比率 (セルサイズに対する倍率)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub width: f32,
    pub height: f32,
}

impl Anchor {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Tiny YOLOv2 (VOC) のアンカー
pub const DEFAULT_ANCHORS: [Anchor; 5] = [
    Anchor::new(1.08, 1.19),
    Anchor::new(3.42, 4.41),
    Anchor::new(6.63, 11.38),
    Anchor::new(9.42, 5.11),
    Anchor::new(16.62, 10.52),
];

const DEFAULT_COLORS: [[u8; 3]; 10] = [
    [255, 0, 0],
    [255, 255, 0],
    [0, 0, 255],
    [14, 23, 50],
    [28, 105, 80],
    [190, 159, 53],
    [46, 194, 148],
    [242, 30, 131],
    [97, 101, 198],
    [115, 11, 87],
];

/// 検出器の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// グリッドの行数
    pub grid_rows: usize,
    /// グリッドの列数
    pub grid_cols: usize,
    /// セルあたりのチャネル数
    pub channels_per_cell: usize,
    /// セルあたりのボックス数
    pub boxes_per_cell: usize,
    /// ボックスあたりの特徴量数 (x, y, w, h, objectness)
    pub features_per_box: usize,
    /// セルの幅 (px)
    pub cell_width: f32,
    /// セルの高さ (px)
    pub cell_height: f32,
    /// ボックススロットごとのアンカー
    pub anchors: Vec<Anchor>,
    /// クラス数
    pub class_count: usize,
    /// クラスIDに対応するラベル
    pub labels: Vec<String>,
    /// クラスIDに対応する表示色
    pub colors: Vec<[u8; 3]>,
    /// デコード時の閾値 (objectness と最終スコア)
    pub confidence_threshold: f32,
    /// NMS に渡す前の候補に適用する閾値
    pub parse_threshold: f32,
    /// NMS の IOU 閾値
    pub suppression_overlap_threshold: f32,
    /// 出力するボックスの最大数
    pub result_limit: usize,
    /// ネットワーク入力の幅
    pub input_width: u32,
    /// ネットワーク入力の高さ
    pub input_height: u32,
    pub crop_anchor: CropAnchor,
    /// 入力画像の回転角度 (度)
    pub rotation_angle: f32,
    pub resample_filter: ResampleFilter,
    /// 入力正規化の平均
    pub mean: f32,
    /// 入力正規化の標準偏差
    pub std_dev: f32,
}

/// リサンプルのフィルタ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    Nearest,
    #[default]
    Bilinear,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            grid_rows: 13,
            grid_cols: 13,
            channels_per_cell: 125,
            boxes_per_cell: 5,
            features_per_box: 5,
            cell_width: 32.,
            cell_height: 32.,
            anchors: DEFAULT_ANCHORS.to_vec(),
            class_count: 0,
            labels: vec![],
            colors: vec![],
            confidence_threshold: 0.5,
            parse_threshold: 0.3,
            suppression_overlap_threshold: 0.5,
            result_limit: 5,
            input_width: 416,
            input_height: 416,
            crop_anchor: CropAnchor::Center,
            rotation_angle: -90.,
            resample_filter: ResampleFilter::Bilinear,
            mean: 0.,
            std_dev: 1.,
        }
    }
}

impl DetectorConfig {
    /// ラベルからクラス数を決め、既定の色を順に割り当てた設定を作成します。
    ///
    /// # Args
    /// * `labels` - クラスIDの順に並んだラベル
    ///
    /// # Return
    /// * 新たな `DetectorConfig` インスタンス
    pub fn with_labels<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let colors = (0..labels.len())
            .map(|i| DEFAULT_COLORS[i % DEFAULT_COLORS.len()])
            .collect();
        Self {
            class_count: labels.len(),
            labels,
            colors,
            ..Default::default()
        }
    }

    /// JSON文字列から設定を読み込みます。省略した項目は既定値になります。
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config = serde_json::from_str(json).context("failed to parse detector config")?;
        Ok(config)
    }

    /// JSONファイルから設定を読み込みます。
    ///
    /// # Args
    /// * `path` - 設定ファイルのパス
    ///
    /// # Return
    /// * 読み込んだ設定 (検証はしていません。`validate` を呼んでください)
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// ボックス1個が占めるチャネル数
    pub fn box_stride(&self) -> usize {
        self.class_count + self.features_per_box
    }

    /// 出力テンソルの期待する形状 [batch, rows, cols, channels]
    pub fn output_shape(&self) -> [usize; 4] {
        [1, self.grid_rows, self.grid_cols, self.channels_per_cell]
    }

    /// クラスIDの表示色
    pub fn color(&self, class_id: usize) -> Option<Rgb<u8>> {
        self.colors.get(class_id).map(|&c| Rgb(c))
    }

    /// 設定の整合性を検査します。ここで失敗した設定ではフレームを処理できません。
    pub fn validate(&self) -> Result<()> {
        if self.labels.len() != self.class_count {
            return Err(DetectError::config(format!(
                "label table has {} entries, class_count is {}",
                self.labels.len(),
                self.class_count
            )));
        }
        if self.colors.len() != self.class_count {
            return Err(DetectError::config(format!(
                "color table has {} entries, class_count is {}",
                self.colors.len(),
                self.class_count
            )));
        }
        if self.class_count == 0 {
            return Err(DetectError::config("class_count must be positive"));
        }
        if self.anchors.len() != self.boxes_per_cell {
            return Err(DetectError::config(format!(
                "{} anchors for {} boxes per cell",
                self.anchors.len(),
                self.boxes_per_cell
            )));
        }
        if self.features_per_box < 5 {
            return Err(DetectError::config("features_per_box must be at least 5"));
        }
        let needed = self.boxes_per_cell * self.box_stride();
        if needed > self.channels_per_cell {
            return Err(DetectError::config(format!(
                "{} boxes x {} channels do not fit in {} channels per cell",
                self.boxes_per_cell,
                self.box_stride(),
                self.channels_per_cell
            )));
        }
        if self.grid_rows == 0 || self.grid_cols == 0 {
            return Err(DetectError::config("grid must not be empty"));
        }
        if !(self.cell_width > 0. && self.cell_height > 0.) {
            return Err(DetectError::config("cell size must be positive"));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(DetectError::config("input resolution must not be empty"));
        }
        for (name, t) in [
            ("confidence_threshold", self.confidence_threshold),
            ("parse_threshold", self.parse_threshold),
            ("suppression_overlap_threshold", self.suppression_overlap_threshold),
        ] {
            if !(0.0..=1.0).contains(&t) {
                return Err(DetectError::config(format!("{name} must be in [0, 1], got {t}")));
            }
        }
        if self.std_dev == 0. || !self.std_dev.is_finite() {
            return Err(DetectError::config("std_dev must be finite and non-zero"));
        }
        Ok(())
    }
}
