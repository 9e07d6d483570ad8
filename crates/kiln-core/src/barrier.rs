//! Resource states and the synchronization scopes they imply.

use bitflags::bitflags;

bitflags! {
    /// Pipeline stages taking part in a dependency or barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
        const TRANSFER = 1 << 9;
        const BOTTOM_OF_PIPE = 1 << 10;
        const HOST = 1 << 11;
        const ALL_GRAPHICS = 1 << 12;
        const ALL_COMMANDS = 1 << 13;
    }
}

bitflags! {
    /// Memory accesses taking part in a dependency or barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const INPUT_ATTACHMENT_READ = 1 << 4;
        const SHADER_READ = 1 << 5;
        const SHADER_WRITE = 1 << 6;
        const COLOR_ATTACHMENT_READ = 1 << 7;
        const COLOR_ATTACHMENT_WRITE = 1 << 8;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 9;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 10;
        const TRANSFER_READ = 1 << 11;
        const TRANSFER_WRITE = 1 << 12;
        const HOST_READ = 1 << 13;
        const HOST_WRITE = 1 << 14;
        const MEMORY_READ = 1 << 15;
        const MEMORY_WRITE = 1 << 16;
    }
}

/// Logical state of an image, naming the access it is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Contents are undefined; only valid as the "before" state.
    Undefined,
    /// Any access, with no layout optimization.
    Common,
    RenderTarget,
    DepthWrite,
    DepthRead,
    ShaderResource,
    UnorderedAccess,
    CopyDest,
    CopySource,
    Present,
}

impl ResourceState {
    /// Pipeline stages that access the resource in this state.
    pub const fn stages(self) -> PipelineStages {
        match self {
            Self::Undefined => PipelineStages::TOP_OF_PIPE,
            Self::Common => PipelineStages::ALL_COMMANDS,
            Self::RenderTarget => PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthWrite | Self::DepthRead => PipelineStages::EARLY_FRAGMENT_TESTS
                .union(PipelineStages::LATE_FRAGMENT_TESTS),
            Self::ShaderResource => PipelineStages::FRAGMENT_SHADER,
            Self::UnorderedAccess => {
                PipelineStages::FRAGMENT_SHADER.union(PipelineStages::COMPUTE_SHADER)
            }
            Self::CopyDest | Self::CopySource => PipelineStages::TRANSFER,
            Self::Present => PipelineStages::BOTTOM_OF_PIPE,
        }
    }

    /// Memory accesses performed on the resource in this state.
    pub const fn access(self) -> AccessFlags {
        match self {
            Self::Undefined | Self::Present => AccessFlags::empty(),
            Self::Common => AccessFlags::MEMORY_READ.union(AccessFlags::MEMORY_WRITE),
            Self::RenderTarget => {
                AccessFlags::COLOR_ATTACHMENT_READ.union(AccessFlags::COLOR_ATTACHMENT_WRITE)
            }
            Self::DepthWrite => AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                .union(AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
            Self::DepthRead => AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            Self::ShaderResource => AccessFlags::SHADER_READ,
            Self::UnorderedAccess => AccessFlags::SHADER_READ.union(AccessFlags::SHADER_WRITE),
            Self::CopyDest => AccessFlags::TRANSFER_WRITE,
            Self::CopySource => AccessFlags::TRANSFER_READ,
        }
    }
}

/// A requested transition of one resource between two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    pub before: ResourceState,
    pub after: ResourceState,
}

impl Transition {
    /// Transition from `before` to `after`.
    pub const fn new(before: ResourceState, after: ResourceState) -> Self {
        Self { before, after }
    }

    /// The transition a frame ends with: render target to present.
    pub const fn render_target_to_present() -> Self {
        Self::new(ResourceState::RenderTarget, ResourceState::Present)
    }

    /// The transition a frame starts with: present to render target.
    pub const fn present_to_render_target() -> Self {
        Self::new(ResourceState::Present, ResourceState::RenderTarget)
    }

    /// Whether the transition is a no-op.
    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_transition_scopes() {
        let t = Transition::render_target_to_present();
        assert_eq!(t.before.stages(), PipelineStages::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(t.after.stages(), PipelineStages::BOTTOM_OF_PIPE);
        assert!(t.after.access().is_empty());
    }

    #[test]
    fn copy_states_use_transfer_stage() {
        assert_eq!(ResourceState::CopyDest.stages(), PipelineStages::TRANSFER);
        assert_eq!(ResourceState::CopyDest.access(), AccessFlags::TRANSFER_WRITE);
        assert_eq!(ResourceState::CopySource.access(), AccessFlags::TRANSFER_READ);
    }
}
