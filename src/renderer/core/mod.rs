pub mod device;
pub mod instance;
pub mod swapchain;
