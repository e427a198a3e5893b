// Error types - everything a single render invocation can fail with

use ash::vk;
use std::path::PathBuf;

/// Everything that can abort a render. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// User-supplied configuration or source content was rejected before
    /// reaching the GPU.
    #[error("{0}")]
    Validation(String),

    /// The shading-language compiler rejected the source.
    #[error("shader compilation failed: {0}")]
    Compile(String),

    /// A native GPU call failed.
    #[error("failed to {operation}: {reason}")]
    Device {
        operation: &'static str,
        reason: String,
    },

    /// The output image could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl RenderError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn device(operation: &'static str, reason: impl ToString) -> Self {
        Self::Device {
            operation,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Attach the failing operation to a raw Vulkan result.
pub trait DeviceResultExt<T> {
    fn or_device(self, operation: &'static str) -> Result<T>;
}

impl<T> DeviceResultExt<T> for std::result::Result<T, vk::Result> {
    fn or_device(self, operation: &'static str) -> Result<T> {
        self.map_err(|e| RenderError::device(operation, format!("{e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_names_operation() {
        let err: Result<()> = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).or_device("create image");
        let err = err.unwrap_err();
        assert!(matches!(err, RenderError::Device { operation: "create image", .. }));
        assert_eq!(
            err.to_string(),
            "failed to create image: ERROR_OUT_OF_DEVICE_MEMORY"
        );
    }

    #[test]
    fn test_validation_display_is_bare_message() {
        let err = RenderError::validation("Can't have a resolution with an extent that is 0");
        assert_eq!(err.to_string(), "Can't have a resolution with an extent that is 0");
    }
}
