//! JSON calibration files.

use log::{info, warn};
use marker_localization_core::{Calibration, CalibrationError};
use std::collections::HashMap;
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum CalibrationIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] CalibrationError),
}

/// Read and validate one calibration file.
pub fn read_calibration(path: impl AsRef<Path>) -> Result<Calibration, CalibrationIoError> {
    let raw = fs::read_to_string(path)?;
    let calibration: Calibration = serde_json::from_str(&raw)?;
    calibration.validate()?;
    Ok(calibration)
}

/// Write a calibration as pretty JSON.
pub fn write_calibration(
    path: impl AsRef<Path>,
    calibration: &Calibration,
) -> Result<(), CalibrationIoError> {
    let json = serde_json::to_string_pretty(calibration)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load every `*.json` calibration in `dir`, keyed by camera id.
///
/// Files that fail to parse or validate are skipped with a warning. A path
/// that is not a directory yields an empty map. Later files (by name) win
/// when two files describe the same camera.
pub fn load_calibrations(
    dir: impl AsRef<Path>,
) -> Result<HashMap<i64, Calibration>, CalibrationIoError> {
    let dir = dir.as_ref();
    let mut calibrations = HashMap::new();
    if !dir.is_dir() {
        warn!(
            "event=Calibrations.Load why=\"{} isn't a directory\"",
            dir.display()
        );
        return Ok(calibrations);
    }

    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    for path in paths {
        match read_calibration(&path) {
            Ok(calibration) => {
                info!(
                    "event=Calibrations.Read id={} file={}",
                    calibration.id,
                    path.display()
                );
                calibrations.insert(calibration.id, calibration);
            }
            Err(err) => warn!(
                "event=Calibrations.Skip file={} err=\"{err}\"",
                path.display()
            ),
        }
    }
    Ok(calibrations)
}
