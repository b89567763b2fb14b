//! NHWC 形式の4次元テンソルを扱うモジュール

use image::RgbaImage;

use crate::error::{DetectError, Result};

const RGB_CHANNELS: usize = 3;

/// 行優先で並んだ f32 の4次元テンソル [batch, row, col, channel]
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor4 {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl Tensor4 {
    /// 形状とデータから新しいテンソルを作成します。
    ///
    /// # Args
    /// * `shape` - [batch, height, width, channels]
    /// * `data` - 行優先のデータ (長さは形状の積と一致する必要があります)
    pub fn new(shape: [usize; 4], data: Vec<f32>) -> Result<Self> {
        let len: usize = shape.iter().product();
        if data.len() != len {
            return Err(DetectError::TensorLength {
                shape,
                expected: len,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: [usize; 4]) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.; len],
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// ((b * H + row) * W + col) * C + ch
    pub fn offset(&self, b: usize, row: usize, col: usize, ch: usize) -> Result<usize> {
        let [n, h, w, c] = self.shape;
        if b >= n || row >= h || col >= w || ch >= c {
            return Err(DetectError::TensorIndex {
                index: [b, row, col, ch],
                shape: self.shape,
            });
        }
        Ok(((b * h + row) * w + col) * c + ch)
    }

    pub fn get(&self, b: usize, row: usize, col: usize, ch: usize) -> Result<f32> {
        Ok(self.data[self.offset(b, row, col, ch)?])
    }

    pub fn set(&mut self, b: usize, row: usize, col: usize, ch: usize, value: f32) -> Result<()> {
        let idx = self.offset(b, row, col, ch)?;
        self.data[idx] = value;
        Ok(())
    }

    /// (b, row, col) のセルにある `ch` から `len` 個のチャネル
    pub fn channels(&self, b: usize, row: usize, col: usize, ch: usize, len: usize) -> Result<&[f32]> {
        if len == 0 {
            return Ok(&[]);
        }
        let beg = self.offset(b, row, col, ch)?;
        // 最後のチャネルも同じセル内にあるか確認
        self.offset(b, row, col, ch + len - 1)?;
        Ok(&self.data[beg..beg + len])
    }
}

/// ネットワークへの入力テンソルを作成します。
///
/// # Args
/// * `img` - 入力解像度にそろえた画像
/// * `mean` - 正規化の平均
/// * `std_dev` - 正規化の標準偏差
///
/// # Return
/// * [1, H, W, 3] のテンソル。各値は `(channel - mean) / std_dev` で、アルファは捨てます
pub fn input_tensor(img: &RgbaImage, mean: f32, std_dev: f32) -> Tensor4 {
    let (w, h) = img.dimensions();
    let mut data = Vec::with_capacity(w as usize * h as usize * RGB_CHANNELS);
    for pixel in img.pixels() {
        for &v in &pixel.0[..RGB_CHANNELS] {
            data.push((f32::from(v) - mean) / std_dev);
        }
    }
    Tensor4 {
        shape: [1, h as usize, w as usize, RGB_CHANNELS],
        data,
    }
}
