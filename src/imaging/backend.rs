//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam between deciding which files to
//! write and the pixel work of writing them. The production implementation
//! is [`RustBackend`](super::rust_backend::RustBackend), pure Rust and
//! statically linked.

use super::params::EncodeParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image processing backends.
pub trait ImageBackend: Send + Sync {
    /// Decode `params.source`, correct its EXIF orientation, drop all
    /// embedded metadata, and write every target. Returns the byte size
    /// of each target in order.
    fn encode(&self, params: &EncodeParams) -> Result<Vec<u64>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::params::{EncodeTarget, OutputFormat, Quality};
    use std::sync::Mutex;

    /// Mock backend that records operations without executing them.
    /// Uses Mutex (not RefCell) so it is Sync and works across pool workers.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        pub fail: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Encode {
            source: String,
            outputs: Vec<(String, OutputFormat)>,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageBackend for MockBackend {
        fn encode(&self, params: &EncodeParams) -> Result<Vec<u64>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                source: params.source.to_string_lossy().to_string(),
                outputs: params
                    .targets
                    .iter()
                    .map(|t| (t.output.to_string_lossy().to_string(), t.format))
                    .collect(),
            });
            if self.fail {
                return Err(BackendError::ProcessingFailed("mock decode failure".into()));
            }
            Ok(vec![0; params.targets.len()])
        }
    }

    #[test]
    fn mock_records_encode() {
        let backend = MockBackend::new();

        let sizes = backend
            .encode(&EncodeParams {
                source: "/source.jpg".into(),
                targets: vec![
                    EncodeTarget {
                        output: "/out/source.avif".into(),
                        format: OutputFormat::Avif {
                            quality: Quality::new(50),
                            speed: 4,
                        },
                    },
                    EncodeTarget {
                        output: "/out/source.jpg".into(),
                        format: OutputFormat::Jpeg {
                            quality: Quality::new(80),
                        },
                    },
                ],
            })
            .unwrap();

        assert_eq!(sizes, vec![0, 0]);
        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        let RecordedOp::Encode { source, outputs } = &ops[0];
        assert_eq!(source, "/source.jpg");
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].0, "/out/source.avif");
    }

    #[test]
    fn failing_mock_still_records() {
        let backend = MockBackend::failing();
        let result = backend.encode(&EncodeParams {
            source: "/broken.png".into(),
            targets: Vec::new(),
        });
        assert!(result.is_err());
        assert_eq!(backend.get_operations().len(), 1);
    }
}
