//! YOLOに入力する画像の前処理モジュール
//!
//! カメラ画像を正方形に切り抜き、入力解像度にリサイズしてから回転させます。

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_with, Interpolation};
use log::debug;

use crate::config::{CropAnchor, DetectorConfig, ResampleFilter};
use crate::error::{DetectError, Result};

/// 回転で元画像の外を参照した画素
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// 正方形の切り抜き領域を計算します。
///
/// # Args
/// * `width`, `height` - 元画像のサイズ
/// * `anchor` - 切り抜く位置
///
/// # Return
/// * 切り抜き領域 (x, y, 一辺の長さ)
pub fn square_region(width: u32, height: u32, anchor: CropAnchor) -> Result<(u32, u32, u32)> {
    let side = u32::min(width, height);
    let (x, y) = match anchor {
        CropAnchor::Center => ((width - side) / 2, (height - side) / 2),
        CropAnchor::TopLeft => (0, 0),
        CropAnchor::TopRight => (width - side, 0),
        CropAnchor::BottomLeft => (0, height - side),
        CropAnchor::BottomRight => (width - side, height - side),
        CropAnchor::Custom { x, y } => {
            let fits = |off: u32, len: u32| off.checked_add(side).map_or(false, |e| e <= len);
            (
                if fits(x, width) { x } else { 0 },
                if fits(y, height) { y } else { 0 },
            )
        }
    };

    let inside = |off: u32, len: u32| off.checked_add(side).map_or(false, |e| e <= len);
    if side == 0 || !inside(x, width) || !inside(y, height) {
        return Err(DetectError::InvalidCrop {
            x,
            y,
            side,
            width,
            height,
        });
    }
    Ok((x, y, side))
}

/// 画像から最大の正方形を切り抜きます。
///
/// # Args
/// * `img` - 元画像
/// * `anchor` - 切り抜く位置
///
/// # Return
/// * 一辺が min(幅, 高さ) の画像
pub fn square_crop(img: &RgbaImage, anchor: CropAnchor) -> Result<RgbaImage> {
    let (x, y, side) = square_region(img.width(), img.height(), anchor)?;
    Ok(imageops::crop_imm(img, x, y, side, side).to_image())
}

/// 画像を指定したサイズにリサイズします。
///
/// # Args
/// * `img` - リサイズする画像
/// * `width`, `height` - リサイズ後のサイズ
/// * `filter` - `Bilinear` は周囲4画素の線形補間、`Nearest` は最近傍
pub fn resample(img: &RgbaImage, width: u32, height: u32, filter: ResampleFilter) -> RgbaImage {
    let filter = match filter {
        ResampleFilter::Nearest => FilterType::Nearest,
        ResampleFilter::Bilinear => FilterType::Triangle,
    };
    imageops::resize(img, width, height, filter)
}

/// 画像を中心で任意の角度だけ回転させます。
///
/// 出力画素ごとに逆変換で元画像の座標を求め、小数部を切り捨てた画素をコピーします。
/// 元画像の外になる画素は透明になります。補間しないため、90度回転を4回繰り返しても
/// 元の画像に戻るとは限りません。
///
/// # Args
/// * `img` - 回転させる画像
/// * `angle` - 回転角度 (度)
pub fn rotate(img: &RgbaImage, angle: f32) -> RgbaImage {
    let (width, height) = img.dimensions();
    let phi = std::f64::consts::PI / 180. * f64::from(angle);
    let (sn, cs) = phi.sin_cos();
    let xc = f64::from(width / 2);
    let yc = f64::from(height / 2);

    let mapping = move |i: f32, j: f32| {
        let (i, j) = (f64::from(i) - xc, f64::from(j) - yc);
        let x = (cs * i + sn * j + xc) as i64;
        let y = (-sn * i + cs * j + yc) as i64;
        if (0..i64::from(width)).contains(&x) && (0..i64::from(height)).contains(&y) {
            (x as f32, y as f32)
        } else {
            (-1., -1.)
        }
    };
    warp_with(img, mapping, Interpolation::Nearest, TRANSPARENT)
}

/// カメラ画像をネットワークの入力解像度に整形します。
///
/// # Args
/// * `frame` - カメラ画像
/// * `config` - 検出器の設定 (切り抜き位置、入力解像度、フィルタ、回転角度)
///
/// # Return
/// * 切り抜き、リサイズ、回転を行った画像
pub fn prepare_frame(frame: &RgbaImage, config: &DetectorConfig) -> Result<RgbaImage> {
    let square = square_crop(frame, config.crop_anchor)?;
    debug!(
        "cropped {}x{} -> {}x{}",
        frame.width(),
        frame.height(),
        square.width(),
        square.height()
    );

    let resized = resample(
        &square,
        config.input_width,
        config.input_height,
        config.resample_filter,
    );
    debug!("resampled to {}x{}", resized.width(), resized.height());

    let rotated = rotate(&resized, config.rotation_angle);
    debug!("rotated by {} deg", config.rotation_angle);
    Ok(rotated)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 画素ごとに異なる値を持つ画像
    fn numbered(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, (x + y * w) as u8, 255]))
    }

    #[test]
    fn center_crop_of_landscape_frame() {
        assert_eq!(square_region(640, 480, CropAnchor::Center).unwrap(), (80, 0, 480));

        let img = numbered(64, 48);
        let sq = square_crop(&img, CropAnchor::Center).unwrap();
        assert_eq!(sq.dimensions(), (48, 48));
        assert_eq!(sq.get_pixel(0, 0), img.get_pixel(8, 0));
    }

    #[test]
    fn corner_anchors_are_flush() {
        assert_eq!(square_region(640, 480, CropAnchor::TopLeft).unwrap(), (0, 0, 480));
        assert_eq!(square_region(640, 480, CropAnchor::TopRight).unwrap(), (160, 0, 480));
        assert_eq!(square_region(480, 640, CropAnchor::BottomLeft).unwrap(), (0, 160, 480));
        assert_eq!(square_region(480, 640, CropAnchor::BottomRight).unwrap(), (0, 160, 480));
        assert_eq!(square_region(480, 640, CropAnchor::Center).unwrap(), (0, 80, 480));
    }

    #[test]
    fn custom_anchor_falls_back_to_zero() {
        let anchor = CropAnchor::Custom { x: 100, y: 5 };
        assert_eq!(square_region(640, 480, anchor).unwrap(), (100, 0, 480));

        let anchor = CropAnchor::Custom { x: 500, y: 0 };
        assert_eq!(square_region(640, 480, anchor).unwrap(), (0, 0, 480));

        let anchor = CropAnchor::Custom { x: u32::MAX, y: u32::MAX };
        assert_eq!(square_region(640, 480, anchor).unwrap(), (0, 0, 480));
    }

    #[test]
    fn empty_source_is_bounds_error() {
        let err = square_region(0, 480, CropAnchor::Custom { x: 0, y: 0 }).unwrap_err();
        assert!(matches!(err, DetectError::InvalidCrop { .. }));
        assert!(!err.is_fatal());
        assert!(square_crop(&RgbaImage::new(0, 0), CropAnchor::Center).is_err());
    }

    #[test]
    fn resample_hits_target_size() {
        let img = RgbaImage::from_pixel(480, 480, Rgba([200, 100, 50, 255]));
        for filter in [ResampleFilter::Bilinear, ResampleFilter::Nearest] {
            let out = resample(&img, 416, 416, filter);
            assert_eq!(out.dimensions(), (416, 416));
            for p in out.pixels() {
                assert!(p.0[0].abs_diff(200) <= 1);
                assert!(p.0[1].abs_diff(100) <= 1);
                assert!(p.0[2].abs_diff(50) <= 1);
            }
        }
    }

    #[test]
    fn rotate_zero_is_identity() {
        let img = numbered(5, 4);
        assert_eq!(rotate(&img, 0.), img);
    }

    #[test]
    fn rotate_quarter_turns_on_odd_square() {
        let img = numbered(3, 3);
        let cw = rotate(&img, 90.);
        let ccw = rotate(&img, -90.);
        // 切り捨ての影響を受けない行と列だけを確認する
        for k in 0..3 {
            assert_eq!(cw.get_pixel(2, k), img.get_pixel(k, 0));
            assert_eq!(cw.get_pixel(k, 2), img.get_pixel(2, 2 - k));
            assert_eq!(ccw.get_pixel(k, 2), img.get_pixel(0, k));
        }
        assert_eq!(cw.get_pixel(1, 1), img.get_pixel(1, 1));
    }

    #[test]
    fn rotate_diagonal_clears_corners() {
        let img = RgbaImage::from_pixel(9, 9, Rgba([7, 7, 7, 255]));
        let out = rotate(&img, 45.);
        for (x, y) in [(0, 0), (8, 0), (0, 8), (8, 8)] {
            assert_eq!(*out.get_pixel(x, y), TRANSPARENT);
        }
        assert_eq!(*out.get_pixel(4, 4), Rgba([7, 7, 7, 255]));
    }

    #[test]
    fn rotate_even_square_loses_an_edge() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let out = rotate(&img, 90.);
        for j in 0..4 {
            assert_eq!(*out.get_pixel(0, j), TRANSPARENT);
            assert_eq!(*out.get_pixel(1, j), Rgba([9, 9, 9, 255]));
        }
        let mut back = out;
        for _ in 0..3 {
            back = rotate(&back, 90.);
        }
        assert_ne!(back, img);
    }

    #[test]
    fn prepare_frame_produces_input_resolution() {
        let config = DetectorConfig::default();
        let frame = RgbaImage::from_pixel(64, 48, Rgba([1, 2, 3, 255]));
        let out = prepare_frame(&frame, &config).unwrap();
        assert_eq!(out.dimensions(), (416, 416));
    }
}
