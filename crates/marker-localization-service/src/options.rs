//! JSON service configuration.

use crate::{CalibrationFetchOptions, DetectorConfig, DispatchOptions, DropPolicy};
use marker_localization_core::ConfidenceModel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::Path};

/// Default zipkin collector port when the uri omits one.
pub const DEFAULT_ZIPKIN_PORT: u16 = 9411;

#[derive(thiserror::Error, Debug)]
pub enum OptionsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid options: {0}")]
    Invalid(String),
}

fn default_service_name() -> String {
    "ArUco.Localization".to_string()
}

fn default_frame_entity() -> String {
    DispatchOptions::default().frame_entity
}

fn default_publish_prefix() -> String {
    DispatchOptions::default().publish_prefix
}

/// Detector and localization settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizationConfig {
    /// Marker dictionary id handed to the detector.
    #[serde(default)]
    pub dictionary: i32,
    /// Marker id -> physical side length in metres.
    #[serde(default)]
    pub lengths: HashMap<i64, f64>,
    /// Detector thread hint, 0 lets the detector decide.
    #[serde(default)]
    pub cpu_parallelism: u32,
    #[serde(default)]
    pub confidence: ConfidenceModel,
    #[serde(default)]
    pub drop_policy: DropPolicy,
}

impl LocalizationConfig {
    /// Settings handed to the detector with every frame.
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            dictionary: self.dictionary,
            cpu_parallelism: self.cpu_parallelism,
        }
    }
}

/// Process-level options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceOptions {
    pub broker_uri: String,
    #[serde(default)]
    pub zipkin_uri: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_frame_entity")]
    pub frame_entity: String,
    #[serde(default = "default_publish_prefix")]
    pub publish_prefix: String,
    #[serde(default)]
    pub config: LocalizationConfig,
    #[serde(default)]
    pub calibration: CalibrationFetchOptions,
}

impl ServiceOptions {
    /// Options with every default and the given broker.
    pub fn new(broker_uri: impl Into<String>) -> Self {
        Self {
            broker_uri: broker_uri.into(),
            zipkin_uri: None,
            service_name: default_service_name(),
            frame_entity: default_frame_entity(),
            publish_prefix: default_publish_prefix(),
            config: LocalizationConfig::default(),
            calibration: CalibrationFetchOptions::default(),
        }
    }

    /// Load and validate options from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let raw = fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&raw)?;
        options.validate()?;
        Ok(options)
    }

    /// Write these options to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), OptionsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        let invalid = |why: String| Err(OptionsError::Invalid(why));

        match self.broker_uri.strip_prefix("amqp://") {
            Some(rest) if !rest.is_empty() => {}
            _ => return invalid(format!("broker_uri {:?} is not amqp://", self.broker_uri)),
        }
        if let Some(uri) = &self.zipkin_uri {
            if parse_http_endpoint(uri).is_none() {
                return invalid(format!("zipkin_uri {uri:?} is not http://host[:port]"));
            }
        }
        if self.frame_entity.is_empty() || self.publish_prefix.is_empty() {
            return invalid("frame_entity and publish_prefix must be non-empty".to_string());
        }

        let mut lengths: Vec<_> = self.config.lengths.iter().collect();
        lengths.sort_unstable_by_key(|(id, _)| **id);
        if let Some((id, length)) = lengths
            .into_iter()
            .find(|(_, l)| !(l.is_finite() && **l > 0.0))
        {
            return invalid(format!("marker {id} has length {length}"));
        }

        let confidence = &self.config.confidence;
        if !confidence.is_valid() {
            return invalid(format!(
                "confidence near {} must be below far {}",
                confidence.near, confidence.far
            ));
        }
        if self.calibration.fetch_interval_ms == 0 {
            return invalid("calibration.fetch_interval_ms must be positive".to_string());
        }
        Ok(())
    }

    /// Host and port of the zipkin collector, if configured and well formed.
    pub fn zipkin_endpoint(&self) -> Option<(String, u16)> {
        self.zipkin_uri.as_deref().and_then(parse_http_endpoint)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            frame_entity: self.frame_entity.clone(),
            publish_prefix: self.publish_prefix.clone(),
            drop_policy: self.config.drop_policy,
            detector: self.config.detector_config(),
        }
    }
}

/// `http://host[:port][/]` -> (host, port).
fn parse_http_endpoint(uri: &str) -> Option<(String, u16)> {
    let rest = uri.strip_prefix("http://")?;
    let authority = rest.strip_suffix('/').unwrap_or(rest);
    if authority.contains('/') {
        return None;
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (authority, DEFAULT_ZIPKIN_PORT),
    };
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}
