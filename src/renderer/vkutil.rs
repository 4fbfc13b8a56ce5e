use ash::vk;

use crate::renderer::vkinit;

/// Assembles the barrier for a layout change without recording it.
///
/// Deliberately coarse: all graphics stages on both sides, destination access
/// covering reads and writes. Correctness-first rather than optimal; a real
/// transition set would split this per stage pair. The aspect is derived from
/// the destination layout: depth for a depth-attachment target, color
/// otherwise.
pub fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> vk::ImageMemoryBarrier2<'static> {
    let aspect_mask = if new_layout == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    vk::ImageMemoryBarrier2 {
        src_stage_mask: vk::PipelineStageFlags2::ALL_GRAPHICS,
        src_access_mask: vk::AccessFlags2::MEMORY_WRITE,
        dst_stage_mask: vk::PipelineStageFlags2::ALL_GRAPHICS,
        dst_access_mask: vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ,
        old_layout,
        new_layout,
        subresource_range: vkinit::image_subresource_range(aspect_mask),
        image,
        ..Default::default()
    }
}

/// Records a pipeline barrier moving `image` from `old_layout` to
/// `new_layout`.
///
/// Caller contract: `old_layout` must be the image's true current layout. A
/// mismatch is undefined behavior on the GPU side; the validation layers
/// catch it, this function cannot.
pub fn transition_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let image_barrier = layout_barrier(image, old_layout, new_layout);

    let dep_info = vk::DependencyInfo {
        image_memory_barrier_count: 1,
        p_image_memory_barriers: &image_barrier,
        ..Default::default()
    };

    unsafe {
        device.cmd_pipeline_barrier2(cmd, &dep_info);
    }
}

/// Records a scaled copy of the full extent of `src` onto the full extent of
/// `dst`, linear filtering, single mip and layer.
///
/// `src` must already be in TRANSFER_SRC_OPTIMAL and `dst` in
/// TRANSFER_DST_OPTIMAL; establish both with [`transition_image`] first.
pub fn blit_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    dst: vk::Image,
    src_extent: vk::Extent2D,
    dst_extent: vk::Extent2D,
) {
    let blit_region = vk::ImageBlit2 {
        src_offsets: [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: src_extent.width as i32,
                y: src_extent.height as i32,
                z: 1,
            },
        ],
        dst_offsets: [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: dst_extent.width as i32,
                y: dst_extent.height as i32,
                z: 1,
            },
        ],
        src_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_array_layer: 0,
            layer_count: 1,
            mip_level: 0,
        },
        dst_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_array_layer: 0,
            layer_count: 1,
            mip_level: 0,
        },
        ..Default::default()
    };

    let blit_info = vk::BlitImageInfo2 {
        src_image: src,
        src_image_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        dst_image: dst,
        dst_image_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        filter: vk::Filter::LINEAR,
        region_count: 1,
        p_regions: &blit_region,
        ..Default::default()
    };

    unsafe {
        device.cmd_blit_image2(cmd, &blit_info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrier_is_all_graphics_both_sides() {
        let barrier = layout_barrier(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        );
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::ALL_GRAPHICS);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::ALL_GRAPHICS);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::MEMORY_WRITE);
        assert_eq!(
            barrier.dst_access_mask,
            vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ
        );
    }

    #[test]
    fn aspect_follows_destination_layout() {
        let depth = layout_barrier(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(depth.subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH);

        let color = layout_barrier(
            vk::Image::null(),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::GENERAL,
        );
        assert_eq!(color.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn barrier_range_covers_all_mips_and_layers() {
        let barrier = layout_barrier(
            vk::Image::null(),
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        assert_eq!(barrier.subresource_range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(barrier.subresource_range.layer_count, vk::REMAINING_ARRAY_LAYERS);
    }

    // Transitioning A -> B then B -> A must net out at layout A.
    #[test]
    fn round_trip_restores_original_layout() {
        let a = vk::ImageLayout::GENERAL;
        let b = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;

        let first = layout_barrier(vk::Image::null(), a, b);
        let second = layout_barrier(vk::Image::null(), first.new_layout, a);

        assert_eq!(second.old_layout, b);
        assert_eq!(second.new_layout, a);
    }
}
