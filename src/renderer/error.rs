use std::fmt;
use ash::vk;

/// Unrecoverable GPU failure raised from the frame path.
///
/// Any checked Vulkan call in the draw protocol that returns a non-success
/// code maps into this type and unwinds to the event-loop driver, which logs
/// it and shuts the process down. There is no in-frame recovery; a timed-out
/// bounded wait is reported the same way (`TIMEOUT` as the code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalError {
    pub context: &'static str,
    pub code: vk::Result,
}

impl FatalError {
    pub fn new(context: &'static str, code: vk::Result) -> Self {
        Self { context, code }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal Vulkan error during {}: {}", self.context, self.code)
    }
}

impl std::error::Error for FatalError {}

/// Extension to attach frame-path context to raw Vulkan results.
pub trait VkResultExt<T> {
    fn fatal(self, context: &'static str) -> Result<T, FatalError>;
}

impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    fn fatal(self, context: &'static str) -> Result<T, FatalError> {
        self.map_err(|code| FatalError::new(context, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attaches_context_to_error_code() {
        let res: ash::prelude::VkResult<()> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = res.fatal("queue submit").unwrap_err();
        assert_eq!(err.context, "queue submit");
        assert_eq!(err.code, vk::Result::ERROR_DEVICE_LOST);
    }

    #[test]
    fn success_passes_through() {
        let res: ash::prelude::VkResult<u32> = Ok(7);
        assert_eq!(res.fatal("acquire").unwrap(), 7);
    }
}
