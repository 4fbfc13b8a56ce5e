//! Factories for the Vulkan creation/submission records the frame path uses.
//!
//! Each function is a pure transformation from a handful of parameters to a
//! fully-populated info struct; defaults that matter (sentinel mip/layer
//! counts, single-sample optimal tiling, binary-semaphore value) live here so
//! callers never re-state them.

use ash::vk;

/// Range addressing every mip level and array layer of an image.
pub fn image_subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

/// Pass `vk::FenceCreateFlags::SIGNALED` to start the fence signaled.
pub fn fence_create_info(flags: vk::FenceCreateFlags) -> vk::FenceCreateInfo<'static> {
    vk::FenceCreateInfo::default().flags(flags)
}

pub fn semaphore_create_info() -> vk::SemaphoreCreateInfo<'static> {
    vk::SemaphoreCreateInfo::default()
}

/// Wait/signal entry for a batched submission. Binary semaphore semantics
/// only: device index 0, timeline value fixed at 1.
pub fn semaphore_submit_info(
    stage_mask: vk::PipelineStageFlags2,
    semaphore: vk::Semaphore,
) -> vk::SemaphoreSubmitInfo<'static> {
    vk::SemaphoreSubmitInfo::default()
        .semaphore(semaphore)
        .stage_mask(stage_mask)
        .device_index(0)
        .value(1)
}

/// Secondary-buffer inheritance is always disabled.
pub fn command_buffer_begin_info(
    flags: vk::CommandBufferUsageFlags,
) -> vk::CommandBufferBeginInfo<'static> {
    vk::CommandBufferBeginInfo::default().flags(flags)
}

pub fn command_buffer_submit_info(
    command_buffer: vk::CommandBuffer,
) -> vk::CommandBufferSubmitInfo<'static> {
    vk::CommandBufferSubmitInfo::default()
        .command_buffer(command_buffer)
        .device_mask(0)
}

/// Batched submission over exactly one command buffer, with at most one wait
/// and one signal semaphore. Passing `None` leaves the respective count at 0.
pub fn submit_info<'a>(
    command_buffer_info: &'a [vk::CommandBufferSubmitInfo<'a>; 1],
    signal_semaphore_info: Option<&'a [vk::SemaphoreSubmitInfo<'a>; 1]>,
    wait_semaphore_info: Option<&'a [vk::SemaphoreSubmitInfo<'a>; 1]>,
) -> vk::SubmitInfo2<'a> {
    let mut info = vk::SubmitInfo2::default().command_buffer_infos(command_buffer_info);
    if let Some(signal) = signal_semaphore_info {
        info = info.signal_semaphore_infos(signal);
    }
    if let Some(wait) = wait_semaphore_info {
        info = info.wait_semaphore_infos(wait);
    }
    info
}

/// 2D image record: single mip, single layer, no multisampling, GPU-optimal
/// tiling.
pub fn image_create_info(
    format: vk::Format,
    usage_flags: vk::ImageUsageFlags,
    extent: vk::Extent3D,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(extent)
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage_flags)
}

/// Single-mip single-layer 2D view of `image`.
pub fn image_view_create_info(
    format: vk::Format,
    image: vk::Image,
    aspect_flags: vk::ImageAspectFlags,
) -> vk::ImageViewCreateInfo<'static> {
    vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .image(image)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect_flags,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subresource_range_covers_whole_image() {
        let range = image_subresource_range(vk::ImageAspectFlags::COLOR);
        assert_eq!(range.base_mip_level, 0);
        assert_eq!(range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(range.base_array_layer, 0);
        assert_eq!(range.layer_count, vk::REMAINING_ARRAY_LAYERS);
    }

    #[test]
    fn fence_flags_are_passed_through() {
        let info = fence_create_info(vk::FenceCreateFlags::SIGNALED);
        assert_eq!(info.flags, vk::FenceCreateFlags::SIGNALED);
        let info = fence_create_info(vk::FenceCreateFlags::empty());
        assert_eq!(info.flags, vk::FenceCreateFlags::empty());
    }

    #[test]
    fn semaphore_submit_uses_binary_semantics() {
        let info = semaphore_submit_info(
            vk::PipelineStageFlags2::ALL_GRAPHICS,
            vk::Semaphore::null(),
        );
        assert_eq!(info.device_index, 0);
        assert_eq!(info.value, 1);
        assert_eq!(info.stage_mask, vk::PipelineStageFlags2::ALL_GRAPHICS);
    }

    #[test]
    fn begin_info_disables_inheritance() {
        let info = command_buffer_begin_info(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        assert!(info.p_inheritance_info.is_null());
        assert_eq!(info.flags, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    }

    #[test]
    fn submit_info_counts_are_zero_or_one() {
        let cmd_info = [command_buffer_submit_info(vk::CommandBuffer::null())];
        let sem_info =
            [semaphore_submit_info(vk::PipelineStageFlags2::ALL_GRAPHICS, vk::Semaphore::null())];

        let bare = submit_info(&cmd_info, None, None);
        assert_eq!(bare.command_buffer_info_count, 1);
        assert_eq!(bare.wait_semaphore_info_count, 0);
        assert_eq!(bare.signal_semaphore_info_count, 0);

        let full = submit_info(&cmd_info, Some(&sem_info), Some(&sem_info));
        assert_eq!(full.wait_semaphore_info_count, 1);
        assert_eq!(full.signal_semaphore_info_count, 1);
    }

    #[test]
    fn image_record_is_single_mip_single_layer() {
        let info = image_create_info(
            vk::Format::R16G16B16A16_SFLOAT,
            vk::ImageUsageFlags::STORAGE,
            vk::Extent3D { width: 64, height: 64, depth: 1 },
        );
        assert_eq!(info.mip_levels, 1);
        assert_eq!(info.array_layers, 1);
        assert_eq!(info.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
    }

    #[test]
    fn view_record_addresses_one_mip_and_layer() {
        let info = image_view_create_info(
            vk::Format::B8G8R8A8_SRGB,
            vk::Image::null(),
            vk::ImageAspectFlags::COLOR,
        );
        assert_eq!(info.view_type, vk::ImageViewType::TYPE_2D);
        assert_eq!(info.subresource_range.level_count, 1);
        assert_eq!(info.subresource_range.layer_count, 1);
    }
}
