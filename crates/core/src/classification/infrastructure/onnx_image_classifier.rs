/// Single-label image classifier using ONNX Runtime.
///
/// Expects an NCHW float input and a `[1, num_classes]` output. Crops are
/// resized to the model's input size, normalized with per-channel mean/std,
/// and the output is turned into probabilities with softmax unless the model
/// already emits them.
use std::path::Path;
use std::sync::Mutex;

use crate::classification::domain::image_classifier::ImageClassifier;
use crate::shared::cancellation::CancelToken;
use crate::shared::classification::Classification;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::{load_session, model_input_size, runtime_error};
use crate::shared::BoxError;

const DEFAULT_INPUT_SIZE: u32 = 224;

/// ImageNet channel statistics, in 0..1 pixel units.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Clone, Debug, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

pub struct OnnxImageClassifier {
    session: Mutex<ort::session::Session>,
    labels: Vec<String>,
    input_size: u32,
    normalization: Normalization,
    apply_softmax: bool,
}

impl OnnxImageClassifier {
    pub fn new(
        model_path: &Path,
        labels: Vec<String>,
        normalization: Normalization,
        apply_softmax: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = model_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        log::debug!(
            "Loaded classifier {} ({input_size}px, {} labels)",
            model_path.display(),
            labels.len()
        );
        Ok(Self {
            session: Mutex::new(session),
            labels,
            input_size,
            normalization,
            apply_softmax,
        })
    }
}

impl ImageClassifier for OnnxImageClassifier {
    fn classify(
        &self,
        frame: &Frame,
        count: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<Classification>, BoxError> {
        if frame.channels() != 3 {
            return Err(format!(
                "classifier expects RGB input, got {} channels",
                frame.channels()
            )
            .into());
        }
        if cancel.is_cancelled() {
            return Err("cancelled".into());
        }

        let tensor = preprocess(frame, self.input_size as usize, &self.normalization)?;
        let input_value = ort::value::Tensor::from_array(tensor).map_err(runtime_error)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(runtime_error)?;
        if outputs.len() == 0 {
            return Err("classifier model produced no outputs".into());
        }
        let logits_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(runtime_error)?;
        let logits = logits_array.as_slice().ok_or("Cannot get logits slice")?;

        let scores = if self.apply_softmax {
            softmax(logits)
        } else {
            logits.to_vec()
        };
        Ok(top_n(&scores, &self.labels, count))
    }
}

/// Resize to `size`×`size` (nearest neighbor), normalize, NCHW layout.
fn preprocess(
    frame: &Frame,
    size: usize,
    norm: &Normalization,
) -> Result<ndarray::Array4<f32>, BoxError> {
    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;
    if src_w == 0 || src_h == 0 {
        return Err(format!("cannot classify an empty {src_w}x{src_h} image").into());
    }
    let src = frame.as_ndarray();

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / size as f64) as usize).min(src_h - 1);
        for x in 0..size {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / size as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                let v = src[[src_y, src_x, c]] as f32 / 255.0;
                tensor[[0, c, y, x]] = (v - norm.mean[c]) / norm.std[c];
            }
        }
    }
    Ok(tensor)
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return exps;
    }
    exps.into_iter().map(|v| v / sum).collect()
}

/// The `count` best classes, highest first. `count == 0` returns all classes.
fn top_n(scores: &[f32], labels: &[String], count: usize) -> Vec<Classification> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    if count != 0 {
        indexed.truncate(count);
    }
    indexed
        .into_iter()
        .map(|(i, score)| {
            let label = labels.get(i).cloned().unwrap_or_else(|| i.to_string());
            Classification::new(label, score as f64)
        })
        .collect()
}
