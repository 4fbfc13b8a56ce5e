use ash::vk;
use color_eyre::Result;

/// Single binding record: count is always 1, stage visibility is stamped on
/// at build time.
fn binding_record(binding: u32, ty: vk::DescriptorType) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(ty)
        .descriptor_count(1)
}

/// Accumulates binding descriptors for one descriptor-set layout.
#[derive(Default)]
pub struct DescriptorLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorLayoutBuilder<'_> {
    pub fn new() -> Self {
        Self { bindings: Vec::new() }
    }

    pub fn add_binding(mut self, binding: u32, ty: vk::DescriptorType) -> Self {
        self.bindings.push(binding_record(binding, ty));
        self
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Stamps `shader_stages` onto every accumulated binding and creates the
    /// layout. Propagates the driver error if the binding combination is
    /// rejected.
    pub fn build(
        mut self,
        device: &ash::Device,
        shader_stages: vk::ShaderStageFlags,
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> Result<vk::DescriptorSetLayout> {
        for binding in &mut self.bindings {
            binding.stage_flags |= shader_stages;
        }

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&self.bindings)
            .flags(flags);

        Ok(unsafe { device.create_descriptor_set_layout(&layout_info, None)? })
    }
}

/// Maps a descriptor type to a fractional multiplier of the pool's max set
/// count.
#[derive(Clone, Copy)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f32,
}

fn pool_sizes(max_sets: u32, ratios: &[PoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|r| vk::DescriptorPoolSize {
            ty: r.ty,
            descriptor_count: (r.ratio * max_sets as f32) as u32,
        })
        .collect()
}

/// Ratio-sized descriptor pool. Allocation has no growth policy: when the
/// pool is exhausted the driver error propagates to the caller.
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
}

impl DescriptorAllocator {
    pub fn init_pool(
        device: &ash::Device,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> Result<Self> {
        let sizes = pool_sizes(max_sets, ratios);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None)? };
        Ok(Self { pool })
    }

    pub fn allocate(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { device.allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }

    /// Returns every allocated set to the pool; the pool itself stays alive.
    pub fn clear_descriptors(&self, device: &ash::Device) -> Result<()> {
        unsafe {
            device.reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    pub fn destroy_pool(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_descriptor_pool(self.pool, None);
        }
        self.pool = vk::DescriptorPool::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_records_have_count_one() {
        let record = binding_record(0, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(record.binding, 0);
        assert_eq!(record.descriptor_count, 1);
        assert_eq!(record.descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(record.stage_flags, vk::ShaderStageFlags::empty());
    }

    #[test]
    fn pool_sizes_scale_by_ratio() {
        let sizes = pool_sizes(
            10,
            &[
                PoolSizeRatio { ty: vk::DescriptorType::STORAGE_IMAGE, ratio: 1.0 },
                PoolSizeRatio { ty: vk::DescriptorType::UNIFORM_BUFFER, ratio: 0.5 },
            ],
        );
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].descriptor_count, 10);
        assert_eq!(sizes[1].descriptor_count, 5);
    }

    #[test]
    fn clear_empties_accumulated_bindings() {
        let mut builder = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .add_binding(1, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(builder.bindings.len(), 2);
        builder.clear();
        assert!(builder.bindings.is_empty());
    }
}
