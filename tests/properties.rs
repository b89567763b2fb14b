use image::Rgb;
use proptest::prelude::*;
use yolo_v2_tiny_cam::nms::{filter, iou};
use yolo_v2_tiny_cam::postprocess::{sigmoid, softmax};
use yolo_v2_tiny_cam::{BoundingBox, Rect};

fn rect() -> impl Strategy<Value = Rect> {
    (-500f32..500., -500f32..500., 0.5f32..300., 0.5f32..300.)
        .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

fn degenerate_rect() -> impl Strategy<Value = Rect> {
    (-500f32..500., -500f32..500., -300f32..=0., -300f32..300.)
        .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

fn candidates() -> impl Strategy<Value = Vec<BoundingBox>> {
    prop::collection::vec((rect(), 0f32..=1.), 0..40).prop_map(|v| {
        v.into_iter()
            .enumerate()
            .map(|(i, (rect, confidence))| BoundingBox {
                rect,
                class_id: i % 3,
                label: i.to_string(),
                confidence,
                color: Rgb([0, 0, 0]),
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn iou_of_self_is_one(a in rect()) {
        prop_assert!((iou(&a, &a) - 1.).abs() < 1e-5);
    }

    #[test]
    fn iou_is_symmetric_and_bounded(a in rect(), b in rect()) {
        let ab = iou(&a, &b);
        prop_assert_eq!(ab, iou(&b, &a));
        prop_assert!((0. ..=1.).contains(&ab));
    }

    #[test]
    fn iou_of_degenerate_is_zero(a in rect(), d in degenerate_rect()) {
        prop_assert_eq!(iou(&a, &d), 0.);
        prop_assert_eq!(iou(&d, &a), 0.);
        prop_assert_eq!(iou(&d, &d), 0.);
    }

    #[test]
    fn nms_output_is_bounded_and_separated(
        boxes in candidates(),
        limit in 0usize..8,
        threshold in 0f32..=1.,
    ) {
        let n = boxes.len();
        let out = filter(boxes, limit, threshold);
        prop_assert!(out.len() <= limit.min(n));
        for (i, a) in out.iter().enumerate() {
            for b in &out[i + 1..] {
                prop_assert!(iou(&a.rect, &b.rect) <= threshold);
                prop_assert!(a.confidence >= b.confidence);
            }
        }
    }

    #[test]
    fn nms_keeps_the_best_box(boxes in candidates(), threshold in 0f32..=1.) {
        prop_assume!(!boxes.is_empty());
        let best = boxes.iter().map(|b| b.confidence).fold(f32::MIN, f32::max);
        let out = filter(boxes, 5, threshold);
        prop_assert_eq!(out[0].confidence, best);
    }

    #[test]
    fn softmax_is_a_distribution(values in prop::collection::vec(-50f32..50., 1..100)) {
        let p = softmax(&values);
        prop_assert_eq!(p.len(), values.len());
        prop_assert!(p.iter().all(|&v| v >= 0.));
        prop_assert!((p.iter().sum::<f32>() - 1.).abs() < 1e-5);
    }

    #[test]
    fn sigmoid_is_monotonic(a in -80f32..80., b in -80f32..80.) {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        prop_assert!(sigmoid(lo) <= sigmoid(hi));
        prop_assert!((0. ..=1.).contains(&sigmoid(a)));
    }
}
