use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use crate::classification::domain::classification_merger::{classify_crop, merge_classifications};
use crate::cropping::domain::frame_cropper::{crop_frame, padded_crop_box};
use crate::detection::domain::detection_ranker::rank_and_filter;
use crate::pipeline::pipeline_config::{ConfigError, PipelineConfig};
use crate::pipeline::pipeline_error::{PipelineError, Stage};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::pipeline_settings::PipelineSettings;
use crate::pipeline::service_registry::ServiceRegistry;
use crate::shared::cancellation::CancelToken;
use crate::shared::classification::Classification;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;
use crate::source::domain::frame_source::acquire_lease;

/// Points of one segmented object, in the camera's coordinate frame.
pub type PointCloud = Vec<[f64; 3]>;

/// Two-stage inference service: detect → rank/filter → crop → (log) →
/// classify → merge.
///
/// Invocations take `&self` and may run concurrently. Each one clones the
/// current settings `Arc` at its start and uses only that snapshot;
/// [`DetectClassifyService::reconfigure`] swaps in a new snapshot without
/// touching in-flight calls.
pub struct DetectClassifyService {
    settings: RwLock<Arc<PipelineSettings>>,
    logger: Mutex<Box<dyn PipelineLogger>>,
}

impl DetectClassifyService {
    pub fn new(settings: PipelineSettings, logger: Box<dyn PipelineLogger>) -> Self {
        Self {
            settings: RwLock::new(Arc::new(settings)),
            logger: Mutex::new(logger),
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        registry: &ServiceRegistry,
        logger: Box<dyn PipelineLogger>,
    ) -> Result<Self, ConfigError> {
        let settings = PipelineSettings::resolve(config, registry)?;
        log::debug!("Starting detect-classify service: {settings:?}");
        Ok(Self::new(settings, logger))
    }

    /// Resolves `config` and swaps it in. On error the previous settings stay.
    pub fn reconfigure(
        &self,
        config: &PipelineConfig,
        registry: &ServiceRegistry,
    ) -> Result<(), PipelineError> {
        log::debug!("Reconfiguring detect-classify service");
        let settings = PipelineSettings::resolve(config, registry)?;
        self.replace_settings(settings)?;
        log::debug!("Reconfigured");
        Ok(())
    }

    pub fn replace_settings(&self, settings: PipelineSettings) -> Result<(), PipelineError> {
        let mut current = self.settings.write().map_err(|_| PipelineError::Poisoned)?;
        *current = Arc::new(settings);
        Ok(())
    }

    /// The settings an invocation starting now would use.
    pub fn snapshot(&self) -> Result<Arc<PipelineSettings>, PipelineError> {
        self.settings
            .read()
            .map(|s| Arc::clone(&s))
            .map_err(|_| PipelineError::Poisoned)
    }

    /// Names of every collaborator the current configuration refers to.
    pub fn required_dependencies(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self.snapshot()?.dependencies.clone())
    }

    /// Runs the full pipeline on a caller-supplied frame.
    pub fn classifications(
        &self,
        frame: &Frame,
        cancel: &CancelToken,
    ) -> Result<Vec<Classification>, PipelineError> {
        let settings = self.snapshot()?;
        self.detect_and_classify(&settings, frame, cancel)
    }

    /// Acquires one frame from the configured camera and runs the pipeline on
    /// it. The frame is released whether or not the pipeline succeeds.
    pub fn classifications_from_source(
        &self,
        cancel: &CancelToken,
    ) -> Result<Vec<Classification>, PipelineError> {
        let settings = self.snapshot()?;
        let camera = settings
            .frame_source
            .as_ref()
            .ok_or(ConfigError::NoFrameSource)?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage: Stage::Source });
        }
        let frame = acquire_lease(camera.source.as_ref(), cancel).map_err(|source| {
            if cancel.is_cancelled() {
                PipelineError::Cancelled { stage: Stage::Source }
            } else {
                PipelineError::FrameSource {
                    source_name: camera.name.clone(),
                    source,
                }
            }
        })?;
        self.detect_and_classify(&settings, &frame, cancel)
    }

    pub fn detections(
        &self,
        _frame: &Frame,
        _cancel: &CancelToken,
    ) -> Result<Vec<Detection>, PipelineError> {
        Err(PipelineError::Unsupported {
            operation: "detections",
        })
    }

    pub fn detections_from_source(
        &self,
        _cancel: &CancelToken,
    ) -> Result<Vec<Detection>, PipelineError> {
        Err(PipelineError::Unsupported {
            operation: "detections_from_source",
        })
    }

    /// 3D queries are outside what this service does; always an error.
    pub fn object_point_clouds(
        &self,
        _cancel: &CancelToken,
    ) -> Result<Vec<PointCloud>, PipelineError> {
        Err(PipelineError::Unsupported {
            operation: "object_point_clouds",
        })
    }

    pub fn do_command(
        &self,
        _command: &serde_json::Value,
    ) -> Result<serde_json::Value, PipelineError> {
        Err(PipelineError::Unsupported {
            operation: "do_command",
        })
    }

    /// Closes the configured camera, if any.
    pub fn close(&self) -> Result<(), PipelineError> {
        log::debug!("Shutting down detect-classify service");
        let settings = self.snapshot()?;
        if let Some(camera) = &settings.frame_source {
            camera.source.close();
        }
        let logger = self.logger.lock().unwrap_or_else(|e| e.into_inner());
        logger.summary();
        Ok(())
    }

    fn detect_and_classify(
        &self,
        settings: &PipelineSettings,
        frame: &Frame,
        cancel: &CancelToken,
    ) -> Result<Vec<Classification>, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage: Stage::Detect });
        }

        let start = Instant::now();
        let detections = settings.detector.detect(frame, cancel).map_err(|source| {
            if cancel.is_cancelled() {
                PipelineError::Cancelled { stage: Stage::Detect }
            } else {
                PipelineError::Detect {
                    detector: settings.detector_name.clone(),
                    source,
                }
            }
        })?;
        self.report(|l| l.timing("detect", elapsed_ms(start)));

        let kept = rank_and_filter(
            &detections,
            settings.max_detections,
            settings.min_confidence,
            &settings.allowed_labels,
        );
        log::info!("Detections #: {}/{}", kept.len(), settings.max_detections);
        log::debug!("Detections details: {kept:?}");
        self.report(|l| {
            l.metric("detections", detections.len() as f64);
            l.metric("kept_detections", kept.len() as f64);
        });

        let mut collected = Vec::new();
        for (index, detection) in kept.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled { stage: Stage::Crop });
            }

            let start = Instant::now();
            let rect = padded_crop_box(&detection.bounding_box, settings.padding);
            let crop = crop_frame(frame, &rect)
                .map_err(|source| PipelineError::Crop { index, source })?;
            self.report(|l| l.timing("crop", elapsed_ms(start)));

            if let Some(image_logger) = &settings.image_logger {
                let start = Instant::now();
                image_logger
                    .log_image(&crop)
                    .map_err(PipelineError::LogImage)?;
                self.report(|l| l.timing("log", elapsed_ms(start)));
            }

            let start = Instant::now();
            let results = classify_crop(
                &crop,
                &settings.classifiers,
                settings.max_classifications,
                cancel,
            )
            .map_err(|e| {
                if cancel.is_cancelled() {
                    PipelineError::Cancelled { stage: Stage::Classify }
                } else {
                    PipelineError::from(e)
                }
            })?;
            self.report(|l| {
                l.timing("classify", elapsed_ms(start));
                l.progress(index + 1, kept.len());
            });
            collected.extend(results);
        }

        let merged = merge_classifications(collected, settings.max_classifications);
        self.report(|l| {
            l.metric("classifications", merged.len() as f64);
            l.invocation_finished();
        });
        Ok(merged)
    }

    /// Logger events are best-effort; a poisoned logger keeps receiving them.
    fn report(&self, event: impl FnOnce(&mut dyn PipelineLogger)) {
        let mut logger = self.logger.lock().unwrap_or_else(|e| e.into_inner());
        event(logger.as_mut());
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::domain::image_logger::ImageLogger;
    use crate::classification::domain::image_classifier::ImageClassifier;
    use crate::cropping::domain::frame_cropper::CropError;
    use crate::detection::domain::object_detector::ObjectDetector;
    use crate::pipeline::pipeline_config::ClassifierConfig;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::BoxError;
    use crate::source::domain::frame_source::FrameSource;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};

    // --- Stubs ---

    struct StubDetector {
        detections: Vec<Detection>,
        calls: AtomicUsize,
    }

    impl StubDetector {
        fn new(detections: Vec<Detection>) -> Self {
            Self {
                detections,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ObjectDetector for StubDetector {
        fn detect(&self, _frame: &Frame, _cancel: &CancelToken) -> Result<Vec<Detection>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.detections.clone())
        }
    }

    struct FailingDetector;

    impl ObjectDetector for FailingDetector {
        fn detect(&self, _frame: &Frame, _cancel: &CancelToken) -> Result<Vec<Detection>, BoxError> {
            Err("detector offline".into())
        }
    }

    /// Returns fixed results and records the size of every crop it sees.
    struct StubClassifier {
        results: Vec<Classification>,
        crops: Mutex<Vec<(u32, u32)>>,
    }

    impl StubClassifier {
        fn new(results: Vec<Classification>) -> Self {
            Self {
                results,
                crops: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.crops.lock().unwrap().len()
        }
    }

    impl ImageClassifier for StubClassifier {
        fn classify(
            &self,
            frame: &Frame,
            count: usize,
            _cancel: &CancelToken,
        ) -> Result<Vec<Classification>, BoxError> {
            self.crops
                .lock()
                .unwrap()
                .push((frame.width(), frame.height()));
            Ok(self.results.iter().take(count).cloned().collect())
        }
    }

    struct FailingClassifier;

    impl ImageClassifier for FailingClassifier {
        fn classify(
            &self,
            _frame: &Frame,
            _count: usize,
            _cancel: &CancelToken,
        ) -> Result<Vec<Classification>, BoxError> {
            Err("classifier offline".into())
        }
    }

    /// Cancels the shared token the first time it is called, then fails.
    struct CancellingClassifier {
        token: CancelToken,
    }

    impl ImageClassifier for CancellingClassifier {
        fn classify(
            &self,
            _frame: &Frame,
            _count: usize,
            _cancel: &CancelToken,
        ) -> Result<Vec<Classification>, BoxError> {
            self.token.cancel();
            Err("interrupted".into())
        }
    }

    /// Reconfigures the owning service on its first call, then classifies
    /// like `inner`.
    struct ReconfiguringClassifier {
        inner: StubClassifier,
        service: OnceLock<Weak<DetectClassifyService>>,
        next_config: PipelineConfig,
        next_registry: ServiceRegistry,
    }

    impl ImageClassifier for ReconfiguringClassifier {
        fn classify(
            &self,
            frame: &Frame,
            count: usize,
            cancel: &CancelToken,
        ) -> Result<Vec<Classification>, BoxError> {
            if self.inner.calls() == 0 {
                if let Some(service) = self.service.get().and_then(Weak::upgrade) {
                    service
                        .reconfigure(&self.next_config, &self.next_registry)
                        .map_err(|e| e.to_string())?;
                }
            }
            self.inner.classify(frame, count, cancel)
        }
    }

    struct StubSource {
        fail: bool,
        released: AtomicUsize,
        closed: AtomicUsize,
    }

    impl StubSource {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                released: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }
        }
    }

    impl FrameSource for StubSource {
        fn acquire(&self, _cancel: &CancelToken) -> Result<Frame, BoxError> {
            if self.fail {
                return Err("camera unplugged".into());
            }
            Ok(Frame::blank(100, 100, 3))
        }

        fn release(&self, _frame: &Frame) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RecordingImageLogger {
        logged: Mutex<Vec<(u32, u32)>>,
    }

    impl ImageLogger for RecordingImageLogger {
        fn log_image(&self, frame: &Frame) -> Result<PathBuf, BoxError> {
            self.logged
                .lock()
                .unwrap()
                .push((frame.width(), frame.height()));
            Ok(PathBuf::from("crop.jpg"))
        }
    }

    struct FailingImageLogger;

    impl ImageLogger for FailingImageLogger {
        fn log_image(&self, _frame: &Frame) -> Result<PathBuf, BoxError> {
            Err("disk full".into())
        }
    }

    // --- Helpers ---

    fn detection(label: &str, score: f64) -> Detection {
        Detection::new(BoundingBox::new(10, 10, 30, 40), label, score)
    }

    fn five_detections() -> Vec<Detection> {
        vec![
            detection("face", 0.9),
            detection("face", 0.8),
            detection("dog", 0.7),
            detection("face", 0.6),
            detection("cat", 0.5),
        ]
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            camera: Some("cam".into()),
            detector: "det".into(),
            detector_confidence: 0.65,
            max_detections: 3,
            detector_labels: vec!["face".into()],
            padding: 0,
            classifiers: vec![ClassifierConfig {
                classifier: "age".into(),
                count: 1,
            }],
            ..Default::default()
        }
    }

    struct Fixture {
        detector: Arc<StubDetector>,
        age: Arc<StubClassifier>,
        gender: Arc<StubClassifier>,
        source: Arc<StubSource>,
        registry: ServiceRegistry,
    }

    fn fixture(detections: Vec<Detection>) -> Fixture {
        let detector = Arc::new(StubDetector::new(detections));
        let age = Arc::new(StubClassifier::new(vec![Classification::new("20-29", 0.95)]));
        let gender = Arc::new(StubClassifier::new(vec![Classification::new("female", 0.60)]));
        let source = Arc::new(StubSource::new(false));
        let mut registry = ServiceRegistry::new();
        registry.add_detector("det", detector.clone());
        registry.add_classifier("age", age.clone());
        registry.add_classifier("gender", gender.clone());
        registry.add_frame_source("cam", source.clone());
        Fixture {
            detector,
            age,
            gender,
            source,
            registry,
        }
    }

    fn service(config: &PipelineConfig, registry: &ServiceRegistry) -> DetectClassifyService {
        DetectClassifyService::from_config(config, registry, Box::new(NullPipelineLogger)).unwrap()
    }

    fn frame() -> Frame {
        Frame::blank(100, 100, 3)
    }

    // --- Tests ---

    #[test]
    fn test_classifies_only_surviving_detections() {
        let fx = fixture(five_detections());
        let svc = service(&config(), &fx.registry);

        let result = svc.classifications(&frame(), &CancelToken::new()).unwrap();

        assert_eq!(fx.age.calls(), 2);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|c| c.label == "20-29"));
    }

    #[test]
    fn test_two_classifiers_capped_globally() {
        let fx = fixture(vec![detection("face", 0.9)]);
        let config = PipelineConfig {
            classifiers: vec![],
            classifier1: Some("age".into()),
            classifier2: Some("gender".into()),
            max_classifications: 1,
            ..config()
        };
        let svc = service(&config, &fx.registry);

        let result = svc.classifications(&frame(), &CancelToken::new()).unwrap();

        assert_eq!(result, vec![Classification::new("20-29", 0.95)]);
        assert_eq!(fx.gender.calls(), 1);
    }

    #[test]
    fn test_global_cap_applies_across_crops() {
        let fx = fixture(five_detections());
        let config = PipelineConfig {
            max_classifications: 1,
            ..config()
        };
        let svc = service(&config, &fx.registry);

        let result = svc.classifications(&frame(), &CancelToken::new()).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_padding_grows_crop() {
        let fx = fixture(vec![detection("face", 0.9)]);
        let config = PipelineConfig {
            padding: 5,
            ..config()
        };
        let svc = service(&config, &fx.registry);

        svc.classifications(&frame(), &CancelToken::new()).unwrap();
        assert_eq!(*fx.age.crops.lock().unwrap(), vec![(30, 40)]);
    }

    #[test]
    fn test_no_detections_returns_empty() {
        let fx = fixture(vec![]);
        let svc = service(&config(), &fx.registry);
        let result = svc.classifications(&frame(), &CancelToken::new()).unwrap();
        assert!(result.is_empty());
        assert_eq!(fx.age.calls(), 0);
    }

    #[test]
    fn test_detector_failure_names_stage() {
        let mut fx = fixture(vec![]);
        fx.registry.add_detector("det", Arc::new(FailingDetector));
        let svc = service(&config(), &fx.registry);

        let err = svc.classifications(&frame(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Detect));
        assert!(err.to_string().contains("detector offline"));
    }

    #[test]
    fn test_classifier_failure_returns_no_partial_result() {
        let mut fx = fixture(five_detections());
        fx.registry.add_classifier("broken", Arc::new(FailingClassifier));
        let config = PipelineConfig {
            classifiers: vec![
                ClassifierConfig {
                    classifier: "age".into(),
                    count: 1,
                },
                ClassifierConfig {
                    classifier: "broken".into(),
                    count: 1,
                },
            ],
            ..config()
        };
        let svc = service(&config, &fx.registry);

        let err = svc.classifications(&frame(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Classify { ref classifier, .. } if classifier == "broken"));
        assert_eq!(fx.age.calls(), 1);
    }

    #[test]
    fn test_degenerate_crop_aborts_invocation() {
        let fx = fixture(vec![detection("face", 0.9)]);
        let config = PipelineConfig {
            padding: -20,
            ..config()
        };
        let svc = service(&config, &fx.registry);

        let err = svc.classifications(&frame(), &CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Crop {
                index: 0,
                source: CropError::Degenerate(_)
            }
        ));
        assert_eq!(fx.age.calls(), 0);
    }

    #[test]
    fn test_huge_padding_is_rejected_before_allocating() {
        let fx = fixture(vec![detection("face", 0.9)]);
        let config = PipelineConfig {
            padding: 30_000,
            ..config()
        };
        let svc = service(&config, &fx.registry);

        let err = svc.classifications(&frame(), &CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Crop {
                index: 0,
                source: CropError::TooLarge(_)
            }
        ));
        assert_eq!(fx.age.calls(), 0);
    }

    #[test]
    fn test_crop_beyond_frame_is_zero_filled() {
        let fx = fixture(vec![Detection::new(BoundingBox::new(90, 90, 110, 110), "face", 0.9)]);
        let svc = service(&config(), &fx.registry);

        svc.classifications(&frame(), &CancelToken::new()).unwrap();
        assert_eq!(*fx.age.crops.lock().unwrap(), vec![(20, 20)]);
    }

    #[test]
    fn test_image_logger_sees_every_crop() {
        let fx = fixture(five_detections());
        let logger = Arc::new(RecordingImageLogger {
            logged: Mutex::new(Vec::new()),
        });
        let settings = PipelineSettings::resolve(&config(), &fx.registry)
            .unwrap()
            .with_image_logger(logger.clone());
        let svc = DetectClassifyService::new(settings, Box::new(NullPipelineLogger));

        svc.classifications(&frame(), &CancelToken::new()).unwrap();
        assert_eq!(*logger.logged.lock().unwrap(), vec![(20, 30), (20, 30)]);
    }

    #[test]
    fn test_image_logger_failure_aborts() {
        let fx = fixture(five_detections());
        let settings = PipelineSettings::resolve(&config(), &fx.registry)
            .unwrap()
            .with_image_logger(Arc::new(FailingImageLogger));
        let svc = DetectClassifyService::new(settings, Box::new(NullPipelineLogger));

        let err = svc.classifications(&frame(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Log));
        assert_eq!(fx.age.calls(), 0);
    }

    #[test]
    fn test_logged_crops_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture(five_detections());
        let config = PipelineConfig {
            log_image: true,
            image_path: Some(dir.path().to_path_buf()),
            ..config()
        };
        let svc = service(&config, &fx.registry);

        svc.classifications(&frame(), &CancelToken::new()).unwrap();
        // Both kept crops are identical blank images, so they share one file.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_cancelled_before_start_skips_detector() {
        let fx = fixture(five_detections());
        let svc = service(&config(), &fx.registry);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = svc.classifications(&frame(), &cancel).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { stage: Stage::Detect }));
        assert_eq!(fx.detector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancellation_during_classification_stops_remaining_crops() {
        let mut fx = fixture(five_detections());
        let cancel = CancelToken::new();
        fx.registry.add_classifier(
            "age",
            Arc::new(CancellingClassifier {
                token: cancel.clone(),
            }),
        );
        let config = PipelineConfig {
            classifiers: vec![
                ClassifierConfig {
                    classifier: "age".into(),
                    count: 1,
                },
                ClassifierConfig {
                    classifier: "gender".into(),
                    count: 1,
                },
            ],
            ..config()
        };
        let svc = service(&config, &fx.registry);

        let err = svc.classifications(&frame(), &cancel).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { stage: Stage::Classify }));
        assert_eq!(fx.gender.calls(), 0);
    }

    #[test]
    fn test_from_source_releases_frame() {
        let fx = fixture(five_detections());
        let svc = service(&config(), &fx.registry);

        let result = svc.classifications_from_source(&CancelToken::new()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(fx.source.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_source_releases_frame_on_failure() {
        let mut fx = fixture(five_detections());
        fx.registry.add_classifier("age", Arc::new(FailingClassifier));
        let svc = service(&config(), &fx.registry);

        assert!(svc.classifications_from_source(&CancelToken::new()).is_err());
        assert_eq!(fx.source.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_source_acquire_failure() {
        let mut fx = fixture(five_detections());
        fx.registry.add_frame_source("cam", Arc::new(StubSource::new(true)));
        let svc = service(&config(), &fx.registry);

        let err = svc.classifications_from_source(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::FrameSource { ref source_name, .. } if source_name == "cam"));
        assert_eq!(fx.detector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_from_source_without_camera_is_config_error() {
        let fx = fixture(five_detections());
        let config = PipelineConfig {
            camera: None,
            ..config()
        };
        let svc = service(&config, &fx.registry);

        let err = svc.classifications_from_source(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::NoFrameSource)));
    }

    #[test]
    fn test_unsupported_operations() {
        let fx = fixture(vec![]);
        let svc = service(&config(), &fx.registry);
        let cancel = CancelToken::new();

        assert!(matches!(
            svc.detections(&frame(), &cancel),
            Err(PipelineError::Unsupported { operation: "detections" })
        ));
        assert!(matches!(
            svc.detections_from_source(&cancel),
            Err(PipelineError::Unsupported { .. })
        ));
        assert!(matches!(
            svc.object_point_clouds(&cancel),
            Err(PipelineError::Unsupported { .. })
        ));
        assert!(matches!(
            svc.do_command(&serde_json::json!({"cmd": "ping"})),
            Err(PipelineError::Unsupported { operation: "do_command" })
        ));
    }

    #[test]
    fn test_reconfigure_swaps_snapshot() {
        let fx = fixture(five_detections());
        let svc = service(&config(), &fx.registry);
        let before = svc.snapshot().unwrap();

        let wider = PipelineConfig {
            detector_labels: vec!["face".into(), "dog".into()],
            ..config()
        };
        svc.reconfigure(&wider, &fx.registry).unwrap();

        assert!(!before.allowed_labels.contains("dog"));
        let result = svc.classifications(&frame(), &CancelToken::new()).unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_reconfigure_mid_invocation_finishes_on_old_snapshot() {
        let next = fixture(five_detections());
        let next_config = PipelineConfig {
            detector_labels: vec!["face".into(), "dog".into()],
            classifiers: vec![ClassifierConfig {
                classifier: "gender".into(),
                count: 1,
            }],
            ..config()
        };
        let age = Arc::new(ReconfiguringClassifier {
            inner: StubClassifier::new(vec![Classification::new("20-29", 0.95)]),
            service: OnceLock::new(),
            next_config,
            next_registry: next.registry,
        });
        let fx = fixture(five_detections());
        let mut registry = fx.registry;
        registry.add_classifier("age", age.clone());
        let svc = Arc::new(service(&config(), &registry));
        assert!(age.service.set(Arc::downgrade(&svc)).is_ok());

        let first = svc.classifications(&frame(), &CancelToken::new()).unwrap();

        // Both kept faces still went through the old classifier.
        assert_eq!(age.inner.calls(), 2);
        assert_eq!(next.gender.calls(), 0);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|c| c.label == "20-29"));
        assert_eq!(svc.snapshot().unwrap().classifiers[0].name, "gender");

        let second = svc.classifications(&frame(), &CancelToken::new()).unwrap();

        assert_eq!(age.inner.calls(), 2);
        assert_eq!(next.detector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(next.gender.calls(), 3);
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|c| c.label == "female"));
    }

    #[test]
    fn test_failed_reconfigure_keeps_previous_settings() {
        let fx = fixture(five_detections());
        let svc = service(&config(), &fx.registry);

        let broken = PipelineConfig {
            detector: "missing".into(),
            ..config()
        };
        let err = svc.reconfigure(&broken, &fx.registry).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::UnknownDetector(_))));
        assert_eq!(svc.snapshot().unwrap().detector_name, "det");
        assert!(svc.classifications(&frame(), &CancelToken::new()).is_ok());
    }

    #[test]
    fn test_required_dependencies() {
        let fx = fixture(vec![]);
        let svc = service(&config(), &fx.registry);
        assert_eq!(svc.required_dependencies().unwrap(), vec!["cam", "det", "age"]);
    }

    #[test]
    fn test_close_closes_camera() {
        let fx = fixture(vec![]);
        let svc = service(&config(), &fx.registry);
        svc.close().unwrap();
        assert_eq!(fx.source.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_invocations_share_service() {
        let fx = fixture(five_detections());
        let svc = Arc::new(service(&config(), &fx.registry));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let svc = Arc::clone(&svc);
                std::thread::spawn(move || svc.classifications(&frame(), &CancelToken::new()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().len(), 2);
        }
        assert_eq!(fx.detector.calls.load(Ordering::SeqCst), 4);
    }
}
