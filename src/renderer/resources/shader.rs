use std::path::Path;
use ash::vk;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;

/// Loads a precompiled SPIR-V blob and wraps it in a shader module.
///
/// Failure here is soft at this layer: the caller decides whether a missing
/// module is fatal. Pipeline init logs it and runs degraded.
pub fn load_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(filepath)
        .wrap_err_with(|| format!("failed to open shader binary {:?}", filepath))?;
    let words = spirv_words(&bytes)
        .wrap_err_with(|| format!("invalid shader binary {:?}", filepath))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&words);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}

/// SPIR-V is a raw word stream: the blob must be a nonzero whole-number
/// multiple of 4 bytes.
fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() {
        return Err(eyre!("shader binary is empty"));
    }
    if bytes.len() % 4 != 0 {
        return Err(eyre!(
            "shader binary size {} is not a multiple of 4 bytes",
            bytes.len()
        ));
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_blob() {
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn rejects_non_word_multiple_sizes() {
        assert!(spirv_words(&[0u8; 5]).is_err());
        assert!(spirv_words(&[0u8; 7]).is_err());
    }

    #[test]
    fn packs_bytes_into_native_words() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0], u32::from_ne_bytes([0x03, 0x02, 0x23, 0x07]));
    }
}
