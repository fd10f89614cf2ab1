pub mod onnx_image_classifier;
