//! Two-stage visual inference: detect regions of interest, crop to each
//! surviving region, then classify the crops and merge the results.

pub mod audit {
    pub mod domain {
        pub mod image_logger;
    }
    pub mod infrastructure;
}

pub mod classification {
    pub mod domain {
        pub mod classification_merger;
        pub mod image_classifier;
    }
    pub mod infrastructure;
}

pub mod cropping {
    pub mod domain {
        pub mod frame_cropper;
    }
}

pub mod detection {
    pub mod domain {
        pub mod detection_ranker;
        pub mod object_detector;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod detect_and_classify_use_case;
    pub mod pipeline_config;
    pub mod pipeline_error;
    pub mod pipeline_logger;
    pub mod pipeline_settings;
    pub mod service_registry;
}

pub mod shared {
    pub mod bounding_box;
    pub mod cancellation;
    pub mod classification;
    pub mod constants;
    pub mod detection;
    pub mod frame;
    pub mod model_resolver;
    pub mod onnx_session;
    pub mod ranking;

    /// Error type returned across collaborator trait boundaries.
    pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
}

pub mod source {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure;
}
