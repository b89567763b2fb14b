//! Non-Maximum Suppression (NMS) のモジュール

use log::debug;

use crate::detection_result::{BoundingBox, Rect};

/// 2つの矩形の IOU (Intersection over Union) を計算します。
///
/// どちらかの面積が0以下なら0を返します。
pub fn iou(a: &Rect, b: &Rect) -> f32 {
    let area_a = a.area();
    if !(area_a > 0.) {
        return 0.;
    }
    let area_b = b.area();
    if !(area_b > 0.) {
        return 0.;
    }

    let min_x = f32::max(a.x, b.x);
    let min_y = f32::max(a.y, b.y);
    let max_x = f32::min(a.x_max(), b.x_max());
    let max_y = f32::min(a.y_max(), b.y_max());

    let intersection = f32::max(max_x - min_x, 0.) * f32::max(max_y - min_y, 0.);
    intersection / (area_a + area_b - intersection)
}

/// 重なっているバウンディングボックスのうち、コンフィデンスが最大のものを残します。
///
/// # Args
/// * `candidates` - 候補のバウンディングボックス
/// * `limit` - 出力する最大数
/// * `overlap_threshold` - この値より IOU が大きいボックスを抑制します
///
/// # Return
/// * コンフィデンスの降順に並んだ、最大 `limit` 個のバウンディングボックス
pub fn filter(mut candidates: Vec<BoundingBox>, limit: usize, overlap_threshold: f32) -> Vec<BoundingBox> {
    // 安定ソートなので同じコンフィデンスは入力順のまま
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut active = vec![true; candidates.len()];
    let mut active_count = candidates.len();
    let mut keep = vec![false; candidates.len()];
    let mut kept = 0;

    for i in 0..candidates.len() {
        if kept >= limit || active_count == 0 {
            break;
        }
        if !active[i] {
            continue;
        }
        active[i] = false;
        active_count -= 1;
        keep[i] = true;
        kept += 1;

        for j in (i + 1)..candidates.len() {
            if active[j] && iou(&candidates[i].rect, &candidates[j].rect) > overlap_threshold {
                active[j] = false;
                active_count -= 1;
            }
        }
    }

    debug!("nms kept {} of {}", kept, candidates.len());
    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(b, k)| k.then_some(b))
        .collect()
}
