/// Window and internal render resolution. The swapchain extent is negotiated
/// against the surface and may differ; the blit at the end of the frame
/// rescales between the two.
pub const WINDOW_WIDTH: u32 = 1920;
pub const WINDOW_HEIGHT: u32 = 1080;

pub const WINDOW_TITLE: &str = "Ember Engine";

/// Number of frame slots allowed to have unretired GPU work at once.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound on the fence and image-acquire waits, in nanoseconds.
pub const GPU_WAIT_TIMEOUT_NS: u64 = 1_000_000_000;

pub const COMPUTE_SHADER_PATH: &str = "shaders-built/gradient.comp.spv";
