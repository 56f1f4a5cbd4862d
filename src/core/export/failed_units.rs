//! Retry files
//!
//! When a run ends with failed units, their descriptors are saved as JSON so a
//! later `quarry retry` can re-export exactly those units in append mode.

use crate::domain::context::ResultExt;
use crate::domain::{
    DestinationName, ExportRequest, ExportScope, QuarryError, RecordKind, Result, SourceQuery,
    UnitDescriptor,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Failed units of one run, as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUnitsFile {
    /// Destination of the run that produced the failures
    pub destination: String,
    pub scope_kind: RecordKind,
    pub query: SourceQuery,
    pub units: Vec<UnitDescriptor>,
    pub created_at: DateTime<Utc>,
}

impl FailedUnitsFile {
    pub fn new(
        destination: &DestinationName,
        scope_kind: RecordKind,
        query: SourceQuery,
        units: Vec<UnitDescriptor>,
    ) -> Self {
        Self {
            destination: destination.as_str().to_string(),
            scope_kind,
            query,
            units,
            created_at: Utc::now(),
        }
    }

    /// Default location next to the working directory
    pub fn default_path(destination: &DestinationName) -> PathBuf {
        PathBuf::from(format!("{}.failed_units.json", destination.as_str()))
    }

    /// # Errors
    ///
    /// Returns an error if the file can't be serialized or written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize failed units")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write failed-units file {}", path.display()))?;
        tracing::info!(path = %path.display(), units = self.units.len(), "Failed units saved");
        Ok(())
    }

    /// Remove a retry file whose units have all been written
    ///
    /// Returns `false` when there was nothing to remove.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but can't be removed.
    pub fn clear(path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Failed-units file cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove failed-units file {}", path.display())),
        }
    }

    /// Load and check a retry file
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] if the file is missing, unreadable,
    /// empty, or lists units that don't match its record kind.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuarryError::Configuration(format!(
                "Failed to read failed-units file {}: {}",
                path.display(),
                e
            ))
        })?;
        let file: Self = serde_json::from_str(&content).map_err(|e| {
            QuarryError::Configuration(format!(
                "Invalid failed-units file {}: {}",
                path.display(),
                e
            ))
        })?;
        file.check()?;
        Ok(file)
    }

    /// Request that re-exports these units into `destination`
    pub fn to_request(&self, destination: DestinationName) -> ExportRequest {
        ExportRequest::units(destination, self.units.clone()).with_query(self.query.clone())
    }

    fn check(&self) -> Result<()> {
        if self.units.is_empty() {
            return Err(QuarryError::Configuration(
                "failed-units file lists no units".to_string(),
            ));
        }
        let scope = ExportScope::Units {
            units: self.units.clone(),
        };
        let mismatched = self.units.iter().any(|u| {
            let kind = match u {
                UnitDescriptor::Range(_) => RecordKind::Event,
                UnitDescriptor::Page(_) => RecordKind::Profile,
            };
            kind != self.scope_kind
        });
        if mismatched || scope.record_kind() != Some(self.scope_kind) {
            return Err(QuarryError::Configuration(format!(
                "failed-units file mixes unit types or doesn't match scope '{}'",
                self.scope_kind.as_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DateRange, PageIndex};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn week() -> UnitDescriptor {
        UnitDescriptor::Range(
            DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed.json");
        let destination = DestinationName::new("events_jan").unwrap();
        let query = SourceQuery {
            events: vec!["Signup".to_string()],
            where_clause: None,
        };

        let file = FailedUnitsFile::new(&destination, RecordKind::Event, query, vec![week()]);
        file.save(&path).unwrap();

        let loaded = FailedUnitsFile::load(&path).unwrap();
        assert_eq!(loaded, file);

        let request = loaded.to_request(destination);
        assert_eq!(request.scope, ExportScope::Units { units: vec![week()] });
        assert_eq!(request.query.events, vec!["Signup"]);
    }

    #[test]
    fn test_load_rejects_mismatched_units() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed.json");
        let destination = DestinationName::new("profiles").unwrap();

        let file = FailedUnitsFile::new(
            &destination,
            RecordKind::Profile,
            SourceQuery::default(),
            vec![week(), UnitDescriptor::Page(PageIndex { page: 3 })],
        );
        file.save(&path).unwrap();

        assert!(matches!(
            FailedUnitsFile::load(&path),
            Err(QuarryError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = FailedUnitsFile::load("/nonexistent/failed.json");
        assert!(matches!(result, Err(QuarryError::Configuration(_))));
    }

    #[test]
    fn test_clear_removes_file_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed.json");
        let destination = DestinationName::new("events_jan").unwrap();
        FailedUnitsFile::new(&destination, RecordKind::Event, SourceQuery::default(), vec![week()])
            .save(&path)
            .unwrap();

        assert!(FailedUnitsFile::clear(&path).unwrap());
        assert!(!path.exists());
        assert!(!FailedUnitsFile::clear(&path).unwrap());
    }

    #[test]
    fn test_default_path() {
        let destination = DestinationName::new("events_jan").unwrap();
        assert_eq!(
            FailedUnitsFile::default_path(&destination),
            PathBuf::from("events_jan.failed_units.json")
        );
    }
}
