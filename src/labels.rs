use crate::config::{LabelsConfig, Validatable};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("Failed to read labels file: {0}")]
    Io(#[from] io::Error),
    #[error("Labels file {0} contains no labels")]
    Empty(String),
}

/// Class names indexed by the model's class id.
#[derive(Debug, Clone)]
pub struct ClassLabels {
    labels: Vec<String>,
}

impl ClassLabels {
    pub fn new(labels_cfg: &LabelsConfig) -> Result<Self, LabelsError> {
        load_labels(&labels_cfg.get_path()).map(|labels| Self { labels })
    }

    pub fn from_vec(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn name(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("Unknown class {}", class_id))
    }
}

/// One name per line. Trailing `,r,g,b` colour columns are ignored.
pub fn load_labels(filepath: &Path) -> Result<Vec<String>, LabelsError> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let name = line.split(',').next().unwrap_or_default().trim();
        if name.is_empty() {
            continue;
        }
        labels.push(name.to_string());
    }

    if labels.is_empty() {
        return Err(LabelsError::Empty(filepath.display().to_string()));
    }

    Ok(labels)
}
