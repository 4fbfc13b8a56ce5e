use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

use crate::renderer::config::FRAMES_IN_FLIGHT;
use crate::renderer::vkinit;

/// Per-frame recording and synchronization state for one ring entry.
pub struct FrameSlot {
    /// Pool the main buffer is allocated from; reset indirectly by resetting
    /// the buffer.
    pub command_pool: vk::CommandPool,
    /// Primary buffer all of the frame's commands are recorded into.
    pub command_buffer: vk::CommandBuffer,

    /// GPU-signaled once the acquired swapchain image is ready to be written;
    /// the frame's submission waits on it.
    pub acquire_semaphore: vk::Semaphore,
    /// GPU-signaled when the frame's commands finish; presentation waits on
    /// it.
    pub release_semaphore: vk::Semaphore,
    /// CPU-waitable; signals when all GPU work submitted for this slot has
    /// retired. Created signaled so the first pass through the slot does not
    /// stall.
    pub render_fence: vk::Fence,
}

impl FrameSlot {
    fn new(device: &ash::Device, queue_family_index: u32) -> Result<Self> {
        let command_pool = {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family_index)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            unsafe { device.create_command_pool(&pool_info, None)? }
        };

        let command_buffer = {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .command_buffer_count(1)
                .level(vk::CommandBufferLevel::PRIMARY);
            unsafe { device.allocate_command_buffers(&alloc_info)?[0] }
        };

        let acquire_semaphore = unsafe {
            device.create_semaphore(&vkinit::semaphore_create_info(), None)?
        };
        let release_semaphore = unsafe {
            device.create_semaphore(&vkinit::semaphore_create_info(), None)?
        };
        let render_fence = unsafe {
            device.create_fence(
                &vkinit::fence_create_info(vk::FenceCreateFlags::SIGNALED),
                None,
            )?
        };

        Ok(Self {
            command_pool,
            command_buffer,
            acquire_semaphore,
            release_semaphore,
            render_fence,
        })
    }

    /// Caller must guarantee no GPU work referencing this slot is still in
    /// flight.
    unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_command_pool(self.command_pool, None);
            device.destroy_semaphore(self.acquire_semaphore, None);
            device.destroy_semaphore(self.release_semaphore, None);
            device.destroy_fence(self.render_fence, None);
        }
    }
}

/// Fixed ring of [`FRAMES_IN_FLIGHT`] slots plus the monotonic frame counter.
///
/// The slot for a given frame is `frame_number % FRAMES_IN_FLIGHT`; waiting
/// on that slot's fence before reuse is what bounds the number of unretired
/// submissions to the ring size.
pub struct FrameRing {
    slots: [FrameSlot; FRAMES_IN_FLIGHT],
    frame_number: u64,
    device: Arc<ash::Device>,
}

impl FrameRing {
    pub fn new(device: Arc<ash::Device>, queue_family_index: u32) -> Result<Self> {
        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            slots.push(FrameSlot::new(&device, queue_family_index)?);
        }
        let slots: [FrameSlot; FRAMES_IN_FLIGHT] = slots
            .try_into()
            .map_err(|_| eyre!("frame slot count mismatch"))?;

        Ok(Self {
            slots,
            frame_number: 0,
            device,
        })
    }

    fn slot_index(frame_number: u64) -> usize {
        (frame_number % FRAMES_IN_FLIGHT as u64) as usize
    }

    pub fn current(&self) -> &FrameSlot {
        &self.slots[Self::slot_index(self.frame_number)]
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn advance(&mut self) {
        self.frame_number += 1;
    }
}

impl Drop for FrameRing {
    fn drop(&mut self) {
        // Renderer teardown waits for device idle before any field drops.
        for slot in &self.slots {
            unsafe {
                slot.destroy(&self.device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_cycles_through_the_ring() {
        let indices: Vec<usize> = (0..5).map(FrameRing::slot_index).collect();
        assert_eq!(indices, vec![0, 1, 0, 1, 0]);
    }

    // Five consecutive draw calls on a 2-slot ring must visit slots
    // 0,1,0,1,0 and leave the counter at 5.
    #[test]
    fn five_draws_end_with_counter_at_five() {
        let mut frame_number: u64 = 0;
        let mut visited = Vec::new();
        for _ in 0..5 {
            visited.push(FrameRing::slot_index(frame_number));
            frame_number += 1;
        }
        assert_eq!(visited, vec![0, 1, 0, 1, 0]);
        assert_eq!(frame_number, 5);
    }

    // Each slot is reused every FRAMES_IN_FLIGHT-th frame, so at most
    // FRAMES_IN_FLIGHT submissions can be outstanding: reusing a slot always
    // passes through its fence wait first.
    #[test]
    fn at_most_ring_size_frames_between_slot_reuses() {
        for start in 0..4u64 {
            let slot = FrameRing::slot_index(start);
            let next_reuse = (start + 1..)
                .find(|n| FrameRing::slot_index(*n) == slot)
                .unwrap();
            assert_eq!(next_reuse - start, FRAMES_IN_FLIGHT as u64);
        }
    }
}
