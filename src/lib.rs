//! # Tiny YOLOv2 カメラ物体検出ライブラリ
//!
//! このクレートは、カメラ画像をTiny YOLOv2の入力に整形し、ネットワークの出力を
//! ラベル付きのバウンディングボックスに変換するRustライブラリです。
//! 推論そのものは外部のランタイムに任せます ([`pipeline::Inference`])。
//!
//! ## 主な機能
//!
//! 1. **前処理**: カメラ画像を正方形に切り抜き、416x416にリサイズして回転させます。
//! 2. **デコード**: 13x13グリッドの出力テンソルにシグモイド、ソフトマックス、アンカーを適用します。
//! 3. **NMS**: 重なったボックスのうちコンフィデンスが最大のものを残します。
//! 4. **パイプライン**: 同時に1フレームだけ処理し、処理中に届いたフレームは捨てます。
//!
//! ## Example
//! ```no_run
//! use yolo_v2_tiny_cam::{DetectionPipeline, DetectorConfig, Outcome, Tensor4};
//!
//! let config = DetectorConfig::with_labels(["person", "car"]);
//! let shape = config.output_shape();
//! let model = move |_: &Tensor4| -> anyhow::Result<Tensor4> { Ok(Tensor4::zeros(shape)) };
//! let pipeline = DetectionPipeline::new(config, model)?;
//!
//! let frame = image::open("frame.jpg")?;
//! if let Outcome::Detected(boxes) = pipeline.submit_image(&frame)? {
//!     for b in boxes {
//!         println!("{}: {:.2} {:?}", b.label, b.confidence, b.rect);
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod detection_result;
pub mod error;
pub mod img_proc;
pub mod nms;
pub mod pipeline;
pub mod postprocess;
pub mod tensor;

pub use config::{Anchor, CropAnchor, DetectorConfig, ResampleFilter};
pub use detection_result::{BoundingBox, Rect};
pub use error::DetectError;
pub use pipeline::{DetectionPipeline, Inference, Outcome, State};
pub use tensor::Tensor4;
