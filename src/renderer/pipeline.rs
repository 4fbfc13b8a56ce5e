use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

use crate::renderer::config::COMPUTE_SHADER_PATH;
use crate::renderer::resources::shader::load_shader_module;

/// Local work-group size declared by the compute shader. The dispatch math
/// must match it exactly; a mismatch silently covers the wrong pixels rather
/// than erroring.
const WORKGROUP_SIZE: u32 = 16;

/// Dispatch dimensions covering `extent` with 16x16 groups.
pub fn group_counts(extent: vk::Extent2D) -> (u32, u32, u32) {
    (
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
        1,
    )
}

/// Compute pipeline writing the background into the offscreen draw target.
pub struct ComputePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl ComputePipeline {
    pub fn new(
        device: Arc<ash::Device>,
        set_layout: vk::DescriptorSetLayout,
    ) -> Result<Self> {
        let shader_module = load_shader_module(Path::new(COMPUTE_SHADER_PATH), &device)?;

        let set_layouts = [set_layout];
        let layout = {
            let layout_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts);
            unsafe { device.create_pipeline_layout(&layout_info, None)? }
        };

        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(c"main");
        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .layout(layout)
            .stage(stage);

        let pipeline = unsafe {
            device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, err)| err)?[0]
        };

        // The module is baked into the pipeline and can go now.
        unsafe {
            device.destroy_shader_module(shader_module, None);
        }

        Ok(Self {
            pipeline,
            layout,
            device,
        })
    }

    /// Binds the pipeline and its descriptor set into `cmd` and issues one
    /// dispatch covering `extent`. The target image must already be in
    /// GENERAL layout.
    pub fn dispatch(
        &self,
        cmd: vk::CommandBuffer,
        descriptor_set: vk::DescriptorSet,
        extent: vk::Extent2D,
    ) {
        let (groups_x, groups_y, groups_z) = group_counts(extent);
        unsafe {
            self.device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline,
            );
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.layout,
                0,
                &[descriptor_set],
                &[],
            );
            self.device.cmd_dispatch(cmd, groups_x, groups_y, groups_z);
        }
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiples_divide_evenly() {
        let counts = group_counts(vk::Extent2D { width: 1920, height: 1088 });
        assert_eq!(counts, (120, 68, 1));
    }

    #[test]
    fn partial_tiles_round_up() {
        let counts = group_counts(vk::Extent2D { width: 1920, height: 1080 });
        assert_eq!(counts, (120, 68, 1));

        let counts = group_counts(vk::Extent2D { width: 1, height: 1 });
        assert_eq!(counts, (1, 1, 1));

        let counts = group_counts(vk::Extent2D { width: 17, height: 33 });
        assert_eq!(counts, (2, 3, 1));
    }
}
