//! 物体検出の結果を表すモジュール

use image::Rgb;

/// 左上座標を基準にした矩形 (入力解像度のピクセル座標)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// 中心座標とサイズから矩形を作成します。
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2., cy - height / 2., width, height)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn x_max(&self) -> f32 {
        self.x + self.width
    }

    pub fn y_max(&self) -> f32 {
        self.y + self.height
    }
}

/// 検出された物体
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    /// 矩形
    pub rect: Rect,
    /// クラスID
    pub class_id: usize,
    /// ラベル
    pub label: String,
    /// コンフィデンス (0..=1)
    pub confidence: f32,
    /// 表示色
    pub color: Rgb<u8>,
}

impl BoundingBox {
    /// 入力解像度の座標を、中央を切り抜いた画像を表示している画面の座標に変換します。
    ///
    /// # Args
    /// * `input_size` - ネットワークの入力サイズ (正方形の一辺)
    /// * `display_w` - 画面の幅
    /// * `display_h` - 画面の高さ
    ///
    /// # Return
    /// * 画面座標に変換した新たな `BoundingBox`
    pub fn to_display(&self, input_size: u32, display_w: u32, display_h: u32) -> Self {
        let smallest = u32::min(display_w, display_h);
        let scale = smallest as f32 / input_size as f32;
        let off_x = (display_w - smallest) as f32 / 2.;
        let off_y = (display_h - smallest) as f32 / 2.;

        let mut d = self.clone();
        d.rect = Rect::new(
            self.rect.x * scale + off_x,
            self.rect.y * scale + off_y,
            self.rect.width * scale,
            self.rect.height * scale,
        );
        d
    }
}
