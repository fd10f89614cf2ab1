/// Multi-class YOLO object detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, per-class argmax, class-aware
/// NMS, and mapping boxes back to source-frame pixel coordinates.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::cancellation::CancelToken;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::{load_session, model_input_size, runtime_error};
use crate::shared::BoxError;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Score below which raw candidates are dropped before NMS.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Box coordinates preceding the class scores in every output row.
const BOX_VALUES: usize = 4;

/// YOLO (v8-style head: `[cx, cy, w, h, class scores...]`) backed by an
/// ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: Mutex<ort::session::Session>,
    labels: Vec<String>,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model.
    ///
    /// `labels[i]` names class `i`; classes without a label are reported by
    /// their index. The input resolution is read from the model, falling
    /// back to 640 when dynamic.
    pub fn new(
        model_path: &Path,
        labels: Vec<String>,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = model_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        log::debug!(
            "Loaded YOLO model {} ({input_size}px, {} labels)",
            model_path.display(),
            labels.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            labels,
            confidence,
            input_size,
        })
    }

    fn label_for(&self, class: usize) -> String {
        self.labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| class.to_string())
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&self, frame: &Frame, cancel: &CancelToken) -> Result<Vec<Detection>, BoxError> {
        if frame.channels() != 3 {
            return Err(format!("YOLO expects RGB input, got {} channels", frame.channels()).into());
        }
        if frame.width() == 0 || frame.height() == 0 {
            let (w, h) = (frame.width(), frame.height());
            return Err(format!("cannot detect in an empty {w}x{h} image").into());
        }
        if cancel.is_cancelled() {
            return Err("cancelled".into());
        }

        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor).map_err(runtime_error)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(runtime_error)?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(runtime_error)?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }

        // [1, features, detections] when transposed, else [1, detections, features].
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if num_feats <= BOX_VALUES {
            return Err(format!("YOLO output has no class scores: {shape:?}").into());
        }
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let value = |det: usize, feat: usize| -> f64 {
            if transposed {
                data[feat * num_dets + det] as f64
            } else {
                data[det * num_feats + feat] as f64
            }
        };

        let mut raw_dets = Vec::new();
        for i in 0..num_dets {
            let (class, score) = (BOX_VALUES..num_feats)
                .map(|f| (f - BOX_VALUES, value(i, f)))
                .fold((0, f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if score < self.confidence {
                continue;
            }

            let (cx, cy, w, h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
            raw_dets.push(RawDetection {
                x1: ((cx - w / 2.0) - pad_x as f64) / scale,
                y1: ((cy - h / 2.0) - pad_y as f64) / scale,
                x2: ((cx + w / 2.0) - pad_x as f64) / scale,
                y2: ((cy + h / 2.0) - pad_y as f64) / scale,
                class,
                confidence: score,
            });
        }

        let kept = nms(&mut raw_dets, NMS_IOU_THRESH);
        let fw = frame.width() as f64;
        let fh = frame.height() as f64;

        Ok(kept
            .into_iter()
            .map(|d| {
                let bbox = BoundingBox::new(
                    d.x1.clamp(0.0, fw).floor() as i32,
                    d.y1.clamp(0.0, fh).floor() as i32,
                    d.x2.clamp(0.0, fw).ceil() as i32,
                    d.y2.clamp(0.0, fh).ceil() as i32,
                );
                Detection::new(bbox, self.label_for(d.class), d.confidence)
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, the YOLO convention.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize into the padded region.
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    class: usize,
    confidence: f64,
}

/// Greedy class-aware NMS: only boxes of the same class suppress each other.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if suppressed[j] || dets[j].class != dets[i].class {
                continue;
            }
            let iou = bbox_iou(
                &[dets[i].x1, dets[i].y1, dets[i].x2, dets[i].y2],
                &[dets[j].x1, dets[j].y1, dets[j].x2, dets[j].y2],
            );
            if iou > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}
