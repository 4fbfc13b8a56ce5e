use std::ffi::{c_char, CStr};
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};

use crate::renderer::core::instance::RenderInstance;

/// Owns the logical device, the single graphics queue the frame path submits
/// to, and the GPU memory allocator.
///
/// The frame protocol only ever talks to one queue; it must support both
/// graphics and presentation to the target surface.
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    memory_allocator: Option<Arc<Mutex<Allocator>>>,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self> {
        let (physical_device, graphics_queue_family) = Self::select_physical_device(
            &instance.instance,
            surface,
            surface_loader,
        )?;

        let (logical_device, graphics_queue) = Self::create_logical_device(
            &instance.instance,
            physical_device,
            graphics_queue_family,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: false,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            logical: Arc::new(logical_device),
            physical: physical_device,
            graphics_queue,
            graphics_queue_family,
            memory_allocator: Some(Arc::new(Mutex::new(memory_allocator))),
        })
    }

    pub fn allocator(&self) -> Arc<Mutex<Allocator>> {
        // Always present until drop
        self.memory_allocator.as_ref().unwrap().clone()
    }

    /// Blocks until every queue on the device has drained. Called once before
    /// teardown so in-flight frame slots can be destroyed safely.
    pub fn wait_idle(&self) {
        unsafe {
            if let Err(err) = self.logical.device_wait_idle() {
                log::warn!("device_wait_idle failed during shutdown: {}", err);
            }
        }
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        Ok(unsafe {
            instance
                .enumerate_physical_devices()?
                .into_iter()
                // Filter out devices that do not support the required extensions
                .filter(|device| {
                    let supported_extensions = instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default();

                    Self::get_required_device_extensions().iter().all(|req_ext| {
                        let supported = supported_extensions.iter().any(|sup_ext| {
                            sup_ext
                                .extension_name_as_c_str()
                                .map_or(false, |name| name == *req_ext)
                        });
                        if !supported {
                            log::debug!("Device extension not supported: {:?}", req_ext);
                        }
                        supported
                    })
                })
                // Filter out devices without a graphics queue that can present
                .filter_map(|device| {
                    instance
                        .get_physical_device_queue_family_properties(device)
                        .iter()
                        .enumerate()
                        .position(|(i, props)| {
                            let supports_graphics =
                                props.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                            let supports_present = surface_loader
                                .get_physical_device_surface_support(device, i as u32, surface)
                                .unwrap_or(false);
                            supports_graphics && supports_present
                        })
                        .map(|family_index| (device, family_index as u32))
                })
                .min_by_key(|(device, _)| {
                    let props = instance.get_physical_device_properties(*device);
                    match props.device_type {
                        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                        vk::PhysicalDeviceType::CPU => 3,
                        vk::PhysicalDeviceType::OTHER => 4,
                        _ => 5,
                    }
                })
                .ok_or_eyre("No suitable physical device found")?
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .queue_priorities(&queue_priorities),
        ];

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        // The frame path records synchronization2 barriers and submits with
        // queue_submit2.
        let mut synchronization2_features =
            vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .push_next(&mut synchronization2_features);

        let device = unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        };
        let graphics_queue = unsafe {
            device.get_device_queue(graphics_queue_family, 0)
        };

        Ok((device, graphics_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,
            ash::khr::synchronization2::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        // The allocator borrows the device and must be released first.
        drop(self.memory_allocator.take());
        unsafe {
            self.logical.destroy_device(None);
        }
    }
}
