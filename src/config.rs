use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::LungExtension;

/// Parameters of the prediction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// (width, height) of the lung crop fed to the feature detectors
    pub img_size: (u32, u32),
    pub lung_extension: LungExtension,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            img_size: (1536, 1536),
            lung_extension: LungExtension::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads a json config file; missing keys take their default values.
    pub fn from_json_file<T: AsRef<Path>>(path: T) -> Result<PipelineConfig> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// Parameters used when turning annotated images into training samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetOptions {
    /// (width, height) of the resized and padded samples
    pub target_size: (u32, u32),
    /// Line width in pixels for findings annotated with lines
    pub linelike_finding_width: u32,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        DatasetOptions {
            target_size: (1536, 1536),
            linelike_finding_width: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut file = File::create(&path).unwrap();
        write!(file, r#"{{"img_size": [1024, 768]}}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.img_size, (1024, 768));
        assert_eq!(config.lung_extension, LungExtension::new(50, 50, 50, 150));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(PipelineConfig::from_json_file("does/not/exist.json").is_err());
    }
}
