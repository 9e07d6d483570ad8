//! Shader modules.

use crate::context::GpuContext;
use crate::error::{classify, Result, RhiError};
use ash::vk;
use kiln_core::{spirv_words, GpuResource, ResourceKind, ShaderDesc, ShaderStage};
use std::sync::Arc;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode and sanity check the byte-code of one stage.
pub fn decode_stage(stage: ShaderStage, bytes: &[u8]) -> Result<Vec<u32>> {
    let words = spirv_words(bytes)?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => Err(RhiError::CompileFailed(format!(
            "{stage:?} byte-code is not SPIR-V"
        ))),
    }
}

/// One backend module per stage present in the descriptor.
pub struct Shader {
    ctx: Arc<GpuContext>,
    modules: Vec<(ShaderStage, vk::ShaderModule)>,
}

impl Shader {
    pub fn new(ctx: Arc<GpuContext>, desc: &ShaderDesc) -> Result<Self> {
        let decoded = desc
            .blobs()
            .map(|(stage, bytes)| decode_stage(stage, bytes).map(|words| (stage, words)))
            .collect::<Result<Vec<_>>>()?;
        if decoded.is_empty() {
            return Err(RhiError::invalid("shader descriptor has no byte-code"));
        }

        let mut shader = Self {
            ctx,
            modules: Vec::with_capacity(decoded.len()),
        };
        for (stage, words) in decoded {
            let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
            let module = unsafe { shader.ctx.device().create_shader_module(&create_info, None) }
                .map_err(|e| match classify("shader module", e) {
                    err @ (RhiError::OutOfMemory(_) | RhiError::DeviceLost) => err,
                    _ => RhiError::CompileFailed(format!("{stage:?} module rejected: {e}")),
                })?;
            shader.modules.push((stage, module));
        }

        tracing::debug!(stages = shader.modules.len(), "Created shader");
        Ok(shader)
    }

    /// Module of `stage`, if the descriptor had byte-code for it.
    pub fn module(&self, stage: ShaderStage) -> Option<vk::ShaderModule> {
        self.modules
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|&(_, module)| module)
    }

    /// Present stages with their modules, in pipeline order.
    pub fn modules(&self) -> &[(ShaderStage, vk::ShaderModule)] {
        &self.modules
    }
}

impl GpuResource for Shader {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Shader
    }

    fn is_live(&self) -> bool {
        !self.modules.is_empty()
    }

    fn destroy(&mut self) {
        for (_, module) in self.modules.drain(..) {
            unsafe { self.ctx.device().destroy_shader_module(module, None) };
        }
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn decode_accepts_spirv_header() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = decode_stage(ShaderStage::Vertex, &bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn misaligned_length_is_invalid_argument() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 1]);
        bytes.push(0);
        let err = decode_stage(ShaderStage::Fragment, &bytes).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn wrong_magic_fails_to_compile() {
        let bytes = words_to_bytes(&[0xdead_beef, 1, 2]);
        assert!(matches!(
            decode_stage(ShaderStage::Compute, &bytes),
            Err(RhiError::CompileFailed(_))
        ));
        assert!(matches!(
            decode_stage(ShaderStage::Compute, &[]),
            Err(RhiError::CompileFailed(_))
        ));
    }
}
