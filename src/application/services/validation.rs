//! Document validation service

use std::path::Path;
use std::sync::Arc;

use tracing::instrument;

use crate::application::document::TreeDocument;
use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::validator::{ValidationReport, ValidationSummary};
use crate::infrastructure::traits::FileSystem;

/// Service for re-validating written tree documents.
pub struct ValidationService {
    fs: Arc<dyn FileSystem>,
}

impl ValidationService {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    pub fn load_document(&self, path: &Path) -> ApplicationResult<TreeDocument> {
        let content = self.fs.read_to_string(path).with_path_context("read document", path)?;
        serde_json::from_str(&content).with_path_context("parse document", path)
    }

    /// Reports per school plus the roll-up, without repairing anything.
    #[instrument(level = "debug", skip(self))]
    pub fn validate_file(
        &self,
        path: &Path,
        max_children: usize,
    ) -> ApplicationResult<(Vec<ValidationReport>, ValidationSummary)> {
        let document = self.load_document(path)?;
        Ok(document.revalidate(max_children))
    }
}
