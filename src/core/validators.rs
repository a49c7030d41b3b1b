//! Finalize validators for SSR recordings.
//!
//! A failing validator is a false positive: the recording is discarded
//! without raising.

use std::path::Path;

use crate::domain::RecordingMetadata;
use crate::error::ValidationError;

/// Recording to validate; metadata is only known after probing
pub struct ValidationSubject<'a> {
    pub path: &'a Path,
    pub metadata: Option<&'a RecordingMetadata>,
}

pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, subject: &ValidationSubject<'_>) -> Result<(), ValidationError>;
}

/// The encoder must have produced a file
#[derive(Debug, Default, Clone, Copy)]
pub struct FileExistValidator;

impl Validator for FileExistValidator {
    fn name(&self) -> &'static str {
        "FileExistValidator"
    }

    fn validate(&self, subject: &ValidationSubject<'_>) -> Result<(), ValidationError> {
        if subject.path.is_file() {
            Ok(())
        } else {
            Err(ValidationError::FileMissing(subject.path.to_path_buf()))
        }
    }
}

/// The recording must be at least `min_seconds` long
#[derive(Debug, Clone, Copy)]
pub struct MinDurationValidator {
    pub min_seconds: f64,
}

impl MinDurationValidator {
    pub fn new(min_seconds: f64) -> Self {
        Self { min_seconds }
    }
}

impl Validator for MinDurationValidator {
    fn name(&self) -> &'static str {
        "MinDurationValidator"
    }

    fn validate(&self, subject: &ValidationSubject<'_>) -> Result<(), ValidationError> {
        let actual_seconds = subject.metadata.map(|m| m.duration_seconds).unwrap_or(0.0);
        if actual_seconds < self.min_seconds {
            return Err(ValidationError::TooShort {
                actual_seconds,
                min_seconds: self.min_seconds,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metadata(duration_seconds: f64) -> RecordingMetadata {
        RecordingMetadata {
            duration_seconds,
            size_bytes: 1,
            birthtime_ms: 0,
        }
    }

    #[test]
    fn test_file_exist_validator() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rec.mp4");
        let subject = ValidationSubject {
            path: &path,
            metadata: None,
        };

        let err = FileExistValidator.validate(&subject).unwrap_err();
        assert_eq!(err.validator(), FileExistValidator.name());

        std::fs::write(&path, b"data").unwrap();
        assert!(FileExistValidator.validate(&subject).is_ok());
    }

    #[test]
    fn test_directory_is_not_a_recording() {
        let temp = TempDir::new().unwrap();
        let subject = ValidationSubject {
            path: temp.path(),
            metadata: None,
        };
        assert!(FileExistValidator.validate(&subject).is_err());
    }

    #[test]
    fn test_min_duration_validator() {
        let validator = MinDurationValidator::new(5.0);
        let path = Path::new("/tmp/x.mp4");

        let short = metadata(4.99);
        let subject = ValidationSubject {
            path,
            metadata: Some(&short),
        };
        assert!(matches!(
            validator.validate(&subject),
            Err(ValidationError::TooShort { .. })
        ));

        let long = metadata(5.0);
        let subject = ValidationSubject {
            path,
            metadata: Some(&long),
        };
        assert!(validator.validate(&subject).is_ok());
    }
}
