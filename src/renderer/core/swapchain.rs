use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;

use crate::renderer::config::GPU_WAIT_TIMEOUT_NS;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;

/// Present-image chain plus the surface it presents to.
///
/// Negotiates format, present mode, extent, and image count against the
/// surface capabilities, then owns the chain and one view per image. A failed
/// creation call anywhere in the sequence is fatal to construction; there is
/// no partial chain. Rebuild-on-resize is the designed extension point and is
/// not implemented; an out-of-date chain surfaces as a fatal acquire/present
/// error instead.
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    device: Arc<ash::Device>,
}

impl Swapchain {
    pub fn new(
        instance: &RenderInstance,
        device: &RenderDevice,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        drawable_size: (u32, u32),
    ) -> Result<Self> {
        let surface_capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(device.physical, surface)?
        };
        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device.physical, surface)?
        };
        let surface_present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device.physical, surface)?
        };

        let surface_format = select_surface_format(&surface_formats);
        let present_mode = select_present_mode(&surface_present_modes);
        let extent = select_extent(&surface_capabilities, drawable_size);
        let min_image_count = select_image_count(&surface_capabilities);

        log::info!(
            "swapchain: {:?} {:?}, {:?}, {}x{}, {} images",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            extent.width,
            extent.height,
            min_image_count,
        );

        let loader = ash::khr::swapchain::Device::new(&instance.instance, &device.logical);
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_usage(
                vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::COLOR_ATTACHMENT
            )
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1);

        let handle = unsafe {
            loader.create_swapchain(&swapchain_info, None)?
        };

        let (images, image_views) = Self::create_image_views(
            handle,
            &loader,
            surface_format.format,
            &device.logical,
        )?;

        Ok(Self {
            handle,
            loader,
            images,
            image_views,
            extent,
            surface_format,
            present_mode,
            surface,
            surface_loader,
            device: device.logical.clone(),
        })
    }

    /// Requests the next presentable image, signaling `semaphore` when the
    /// image is actually ready to be written. Bounded wait; a timeout is
    /// reported as an error like any other failure.
    pub fn acquire(&self, semaphore: vk::Semaphore) -> VkResult<u32> {
        let (image_index, _suboptimal) = unsafe {
            self.loader.acquire_next_image(
                self.handle,
                GPU_WAIT_TIMEOUT_NS,
                semaphore,
                vk::Fence::null(),
            )?
        };
        Ok(image_index)
    }

    /// Queues presentation of `image_index`, ordered after `wait_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<()> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.loader.queue_present(queue, &present_info)?;
        }
        Ok(())
    }

    fn create_image_views(
        swapchain: vk::SwapchainKHR,
        loader: &ash::khr::swapchain::Device,
        format: vk::Format,
        device: &ash::Device,
    ) -> Result<(Vec<vk::Image>, Vec<vk::ImageView>)> {
        let images = unsafe { loader.get_swapchain_images(swapchain)? };
        let image_views = images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::R,
                        g: vk::ComponentSwizzle::G,
                        b: vk::ComponentSwizzle::B,
                        a: vk::ComponentSwizzle::A,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image(*image);
                unsafe { device.create_image_view(&view_info, None) }
            })
            .collect::<VkResult<Vec<vk::ImageView>>>()?;

        Ok((images, image_views))
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.handle, None);
            // The images belong to the chain; only the views are ours.
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Defaults to the first reported format, overridden by the first
/// BGRA8-SRGB / SRGB-nonlinear entry if one exists anywhere in the list.
fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let mut chosen = formats[0];
    for format in formats {
        if format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        {
            chosen = *format;
            break;
        }
    }
    chosen
}

/// Mailbox beats FIFO beats whatever the driver lists first. A FIFO match
/// keeps scanning so that a mailbox entry later in the list still wins.
fn select_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    let mut chosen = modes[0];
    for mode in modes {
        if *mode == vk::PresentModeKHR::MAILBOX {
            chosen = *mode;
            break;
        }
        if *mode == vk::PresentModeKHR::FIFO {
            chosen = *mode;
        }
    }
    chosen
}

/// Uses the surface's reported extent verbatim unless it carries the
/// "undefined" sentinel, in which case the drawable pixel size is clamped
/// into the supported range component-wise.
fn select_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: drawable_size.0.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: drawable_size.1.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum so the driver never stalls an acquire on its
/// own internal bookkeeping, clamped to the maximum when one is declared
/// (zero means unbounded).
fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = capabilities.max_image_count;
    if max > 0 && min + 1 > max {
        max
    } else {
        min + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(f: vk::Format, cs: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format: f, color_space: cs }
    }

    fn capabilities(
        min_count: u32,
        max_count: u32,
        current: vk::Extent2D,
        min_extent: vk::Extent2D,
        max_extent: vk::Extent2D,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: current,
            min_image_extent: min_extent,
            max_image_extent: max_extent,
            ..Default::default()
        }
    }

    const UNDEFINED_EXTENT: vk::Extent2D = vk::Extent2D { width: u32::MAX, height: u32::MAX };

    #[test]
    fn srgb_format_wins_regardless_of_position() {
        let srgb = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let unorm = format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let rgba = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);

        for list in [
            vec![srgb, unorm, rgba],
            vec![unorm, srgb, rgba],
            vec![rgba, unorm, srgb],
        ] {
            assert_eq!(select_surface_format(&list).format, vk::Format::B8G8R8A8_SRGB);
        }
    }

    #[test]
    fn falls_back_to_first_format_without_srgb() {
        let unorm = format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let rgba = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(select_surface_format(&[unorm, rgba]).format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn mailbox_beats_fifo_in_any_order() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn fifo_beats_unknown_first_mode() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn first_mode_is_the_last_resort() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn defined_current_extent_is_used_verbatim() {
        let caps = capabilities(
            2,
            0,
            vk::Extent2D { width: 800, height: 600 },
            vk::Extent2D { width: 1, height: 1 },
            vk::Extent2D { width: 4096, height: 4096 },
        );
        let extent = select_extent(&caps, (1920, 1080));
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn undefined_extent_clamps_drawable_size() {
        let caps = capabilities(
            2,
            0,
            UNDEFINED_EXTENT,
            vk::Extent2D { width: 640, height: 480 },
            vk::Extent2D { width: 1280, height: 720 },
        );
        // Below the minimum
        let extent = select_extent(&caps, (320, 200));
        assert_eq!((extent.width, extent.height), (640, 480));
        // Above the maximum
        let extent = select_extent(&caps, (1920, 1080));
        assert_eq!((extent.width, extent.height), (1280, 720));
        // Inside the range
        let extent = select_extent(&caps, (800, 600));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn image_count_is_min_plus_one_clamped_to_max() {
        let caps = capabilities(
            2,
            3,
            UNDEFINED_EXTENT,
            vk::Extent2D::default(),
            vk::Extent2D::default(),
        );
        assert_eq!(select_image_count(&caps), 3);

        let caps = capabilities(
            2,
            8,
            UNDEFINED_EXTENT,
            vk::Extent2D::default(),
            vk::Extent2D::default(),
        );
        assert_eq!(select_image_count(&caps), 3);
    }

    #[test]
    fn zero_max_image_count_means_unbounded() {
        let caps = capabilities(
            2,
            0,
            UNDEFINED_EXTENT,
            vk::Extent2D::default(),
            vk::Extent2D::default(),
        );
        assert_eq!(select_image_count(&caps), 3);
    }
}
