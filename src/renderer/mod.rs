pub mod config;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod vkinit;
pub mod vkutil;

mod core;
mod resources;

use std::sync::atomic::{AtomicBool, Ordering};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use winit::window::Window;

use crate::renderer::config::{GPU_WAIT_TIMEOUT_NS, WINDOW_HEIGHT, WINDOW_WIDTH};
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::swapchain::Swapchain;
use crate::renderer::descriptors::{DescriptorAllocator, DescriptorLayoutBuilder, PoolSizeRatio};
use crate::renderer::error::{FatalError, VkResultExt};
use crate::renderer::frame::FrameRing;
use crate::renderer::pipeline::ComputePipeline;
use crate::renderer::resources::image::AllocatedImage;

static RENDERER_LIVE: AtomicBool = AtomicBool::new(false);

/// Constructible-once token: at most one live `Renderer` per process.
struct InstanceGuard;

impl InstanceGuard {
    fn acquire() -> Result<Self> {
        if RENDERER_LIVE.swap(true, Ordering::AcqRel) {
            return Err(eyre!("a Renderer already exists in this process"));
        }
        Ok(Self)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        RENDERER_LIVE.store(false, Ordering::Release);
    }
}

/// Owns the whole GPU context and runs one acquire/record/submit/present
/// cycle per `draw` call.
///
/// Fields are declared in teardown order: `drop` waits for device idle, then
/// each scoped owner releases its handles top to bottom, the device after
/// everything it created and the instance last.
pub struct Renderer {
    frames: FrameRing,
    compute_pipeline: Option<ComputePipeline>,
    draw_image: AllocatedImage,
    swapchain: Swapchain,
    device: RenderDevice,
    instance: RenderInstance,

    draw_image_descriptors: vk::DescriptorSet,
    draw_image_layout: vk::DescriptorSetLayout,
    descriptor_allocator: DescriptorAllocator,

    _guard: InstanceGuard,
}

impl Renderer {
    pub fn new(window: &Window) -> Result<Self> {
        let guard = InstanceGuard::acquire()?;

        let instance = RenderInstance::new(window)?;
        let (surface, surface_loader) = instance.create_surface(window)?;
        let device = RenderDevice::new(&instance, surface, &surface_loader)?;

        let drawable = window.inner_size();
        let swapchain = Swapchain::new(
            &instance,
            &device,
            surface,
            surface_loader,
            (drawable.width, drawable.height),
        )?;

        let frames = FrameRing::new(device.logical.clone(), device.graphics_queue_family)?;

        let draw_image = AllocatedImage::new_draw_target(
            WINDOW_WIDTH,
            WINDOW_HEIGHT,
            device.allocator(),
            device.logical.clone(),
        )?;

        let (descriptor_allocator, draw_image_layout, draw_image_descriptors) =
            Self::create_draw_image_descriptors(&device.logical, draw_image.view)?;

        // Shader loading is the one soft-failure path: a missing or invalid
        // blob leaves the pipeline empty and the frame falls back to an
        // animated clear.
        let compute_pipeline =
            match ComputePipeline::new(device.logical.clone(), draw_image_layout) {
                Ok(pipeline) => Some(pipeline),
                Err(err) => {
                    log::error!(
                        "compute pipeline unavailable, drawing the fallback clear: {:#}",
                        err
                    );
                    None
                }
            };

        log::info!(
            "renderer up: draw target {}x{}, swapchain {}x{}",
            WINDOW_WIDTH,
            WINDOW_HEIGHT,
            swapchain.extent.width,
            swapchain.extent.height,
        );

        Ok(Self {
            frames,
            compute_pipeline,
            draw_image,
            swapchain,
            device,
            instance,
            draw_image_descriptors,
            draw_image_layout,
            descriptor_allocator,
            _guard: guard,
        })
    }

    /// One full frame: throttle on the slot fence, acquire, record, submit,
    /// present, advance. Every checked GPU call maps into [`FatalError`]; the
    /// driver treats any of them as unrecoverable.
    pub fn draw(&mut self) -> std::result::Result<(), FatalError> {
        let device = &self.device.logical;
        let slot = self.frames.current();

        // Backpressure: this wait is what bounds frames in flight to the
        // ring size.
        unsafe {
            device
                .wait_for_fences(&[slot.render_fence], true, GPU_WAIT_TIMEOUT_NS)
                .fatal("render fence wait")?;
            device
                .reset_fences(&[slot.render_fence])
                .fatal("render fence reset")?;
        }

        let image_index = self
            .swapchain
            .acquire(slot.acquire_semaphore)
            .fatal("swapchain image acquire")?;
        let present_image = self.swapchain.images[image_index as usize];

        // The fence wait above proved the slot's previous submission retired,
        // so the buffer is safe to reset.
        let cmd = slot.command_buffer;
        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .fatal("command buffer reset")?;
            device
                .begin_command_buffer(
                    cmd,
                    &vkinit::command_buffer_begin_info(
                        vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                    ),
                )
                .fatal("command buffer begin")?;
        }

        // Contents are fully overwritten every frame, so the prior layout is
        // irrelevant.
        vkutil::transition_image(
            device,
            cmd,
            self.draw_image.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        );

        self.draw_background(cmd);

        vkutil::transition_image(
            device,
            cmd,
            self.draw_image.image,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        vkutil::transition_image(
            device,
            cmd,
            present_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );

        // Rescales if the internal render resolution differs from the
        // negotiated swapchain extent.
        vkutil::blit_image(
            device,
            cmd,
            self.draw_image.image,
            present_image,
            self.draw_image.extent_2d(),
            self.swapchain.extent,
        );

        vkutil::transition_image(
            device,
            cmd,
            present_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        unsafe {
            device.end_command_buffer(cmd).fatal("command buffer end")?;
        }

        // One batched submission: wait on the acquire semaphore, signal the
        // release semaphore, gate the slot fence on full retirement.
        let cmd_info = [vkinit::command_buffer_submit_info(cmd)];
        let wait_info = [vkinit::semaphore_submit_info(
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            slot.acquire_semaphore,
        )];
        let signal_info = [vkinit::semaphore_submit_info(
            vk::PipelineStageFlags2::ALL_GRAPHICS,
            slot.release_semaphore,
        )];
        let submit = vkinit::submit_info(&cmd_info, Some(&signal_info), Some(&wait_info));

        unsafe {
            device
                .queue_submit2(self.device.graphics_queue, &[submit], slot.render_fence)
                .fatal("queue submit")?;
        }

        // Present is ordered after the release semaphore; the GPU guarantees
        // it never observes a partially-written image.
        self.swapchain
            .present(
                self.device.graphics_queue,
                image_index,
                slot.release_semaphore,
            )
            .fatal("queue present")?;

        self.frames.advance();
        Ok(())
    }

    /// Fills the draw target: compute gradient when the pipeline exists,
    /// otherwise a clear color animated off the frame counter. The target is
    /// in GENERAL layout on entry either way.
    fn draw_background(&self, cmd: vk::CommandBuffer) {
        match &self.compute_pipeline {
            Some(pipeline) => {
                pipeline.dispatch(cmd, self.draw_image_descriptors, self.draw_image.extent_2d());
            }
            None => {
                let flash = (self.frames.frame_number() as f32 / 120.0).sin().abs();
                let clear_value = vk::ClearColorValue {
                    float32: [0.0, 0.0, flash, 1.0],
                };
                let clear_range = [vkinit::image_subresource_range(vk::ImageAspectFlags::COLOR)];
                unsafe {
                    self.device.logical.cmd_clear_color_image(
                        cmd,
                        self.draw_image.image,
                        vk::ImageLayout::GENERAL,
                        &clear_value,
                        &clear_range,
                    );
                }
            }
        }
    }

    fn create_draw_image_descriptors(
        device: &ash::Device,
        draw_image_view: vk::ImageView,
    ) -> Result<(DescriptorAllocator, vk::DescriptorSetLayout, vk::DescriptorSet)> {
        let layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(
                device,
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )?;

        let ratios = [PoolSizeRatio {
            ty: vk::DescriptorType::STORAGE_IMAGE,
            ratio: 1.0,
        }];
        let allocator = DescriptorAllocator::init_pool(device, 10, &ratios)?;
        let set = allocator.allocate(device, layout)?;

        // The binding never changes: point it at the draw target once.
        let image_info = [vk::DescriptorImageInfo::default()
            .image_layout(vk::ImageLayout::GENERAL)
            .image_view(draw_image_view)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .image_info(&image_info);
        unsafe {
            device.update_descriptor_sets(&[write], &[]);
        }

        Ok((allocator, layout, set))
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Nothing may be destroyed under in-flight GPU work.
        self.device.wait_idle();
        unsafe {
            self.device
                .logical
                .destroy_descriptor_set_layout(self.draw_image_layout, None);
        }
        self.descriptor_allocator.destroy_pool(&self.device.logical);
        // Remaining owners (frames, pipeline, draw image, swapchain, device,
        // instance) drop in field order.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_is_constructible_once() {
        let first = InstanceGuard::acquire().unwrap();
        assert!(InstanceGuard::acquire().is_err());
        drop(first);
        let again = InstanceGuard::acquire().unwrap();
        drop(again);
    }
}
