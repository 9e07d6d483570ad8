//! Neutral texel and vertex attribute formats.

/// Data format of a texel, vertex attribute, or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    R8G8Unorm,
    R8G8Uint,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    R8G8B8A8Snorm,
    R8G8B8A8Uint,
    R8G8B8A8Sint,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R10G10B10A2Unorm,
    R11G11B10Float,
    R16Unorm,
    R16Uint,
    R16Sint,
    R16Float,
    R16G16Uint,
    R16G16Float,
    R16G16B16A16Unorm,
    R16G16B16A16Uint,
    R16G16B16A16Float,
    R32Uint,
    R32Sint,
    R32Float,
    R32G32Uint,
    R32G32Sint,
    R32G32Float,
    R32G32B32Uint,
    R32G32B32Sint,
    R32G32B32Float,
    R32G32B32A32Uint,
    R32G32B32A32Sint,
    R32G32B32A32Float,
    D16Unorm,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl Format {
    /// Every defined format, in declaration order.
    pub const ALL: [Self; 40] = [
        Self::R8Unorm,
        Self::R8Snorm,
        Self::R8Uint,
        Self::R8Sint,
        Self::R8G8Unorm,
        Self::R8G8Uint,
        Self::R8G8B8A8Unorm,
        Self::R8G8B8A8Srgb,
        Self::R8G8B8A8Snorm,
        Self::R8G8B8A8Uint,
        Self::R8G8B8A8Sint,
        Self::B8G8R8A8Unorm,
        Self::B8G8R8A8Srgb,
        Self::R10G10B10A2Unorm,
        Self::R11G11B10Float,
        Self::R16Unorm,
        Self::R16Uint,
        Self::R16Sint,
        Self::R16Float,
        Self::R16G16Uint,
        Self::R16G16Float,
        Self::R16G16B16A16Unorm,
        Self::R16G16B16A16Uint,
        Self::R16G16B16A16Float,
        Self::R32Uint,
        Self::R32Sint,
        Self::R32Float,
        Self::R32G32Uint,
        Self::R32G32Sint,
        Self::R32G32Float,
        Self::R32G32B32Uint,
        Self::R32G32B32Sint,
        Self::R32G32B32Float,
        Self::R32G32B32A32Uint,
        Self::R32G32B32A32Sint,
        Self::R32G32B32A32Float,
        Self::D16Unorm,
        Self::D32Float,
        Self::D24UnormS8Uint,
        Self::D32FloatS8Uint,
    ];

    /// Size of one element in bytes.
    ///
    /// Used as the vertex attribute size when computing binding strides, and
    /// as the texel size when sizing upload staging buffers.
    pub const fn size_in_bytes(self) -> u32 {
        match self {
            Self::R8Unorm | Self::R8Snorm | Self::R8Uint | Self::R8Sint => 1,
            Self::R8G8Unorm
            | Self::R8G8Uint
            | Self::R16Unorm
            | Self::R16Uint
            | Self::R16Sint
            | Self::R16Float
            | Self::D16Unorm => 2,
            Self::R8G8B8A8Unorm
            | Self::R8G8B8A8Srgb
            | Self::R8G8B8A8Snorm
            | Self::R8G8B8A8Uint
            | Self::R8G8B8A8Sint
            | Self::B8G8R8A8Unorm
            | Self::B8G8R8A8Srgb
            | Self::R10G10B10A2Unorm
            | Self::R11G11B10Float
            | Self::R16G16Uint
            | Self::R16G16Float
            | Self::R32Uint
            | Self::R32Sint
            | Self::R32Float
            | Self::D32Float
            | Self::D24UnormS8Uint => 4,
            Self::R16G16B16A16Unorm
            | Self::R16G16B16A16Uint
            | Self::R16G16B16A16Float
            | Self::R32G32Uint
            | Self::R32G32Sint
            | Self::R32G32Float
            | Self::D32FloatS8Uint => 8,
            Self::R32G32B32Uint | Self::R32G32B32Sint | Self::R32G32B32Float => 12,
            Self::R32G32B32A32Uint | Self::R32G32B32A32Sint | Self::R32G32B32A32Float => 16,
        }
    }

    /// Whether the format has a depth component.
    pub const fn has_depth(self) -> bool {
        matches!(
            self,
            Self::D16Unorm | Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8Uint
        )
    }

    /// Whether the format has a stencil component.
    pub const fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    /// Whether the format is a color format.
    pub const fn is_color(self) -> bool {
        !self.has_depth()
    }

    /// Whether the format can be used for an index buffer.
    pub const fn is_index(self) -> bool {
        matches!(self, Self::R16Uint | Self::R32Uint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_lists_each_format_once() {
        let unique: HashSet<_> = Format::ALL.iter().collect();
        assert_eq!(unique.len(), Format::ALL.len());
    }

    #[test]
    fn attribute_sizes() {
        assert_eq!(Format::R32G32B32Float.size_in_bytes(), 12);
        assert_eq!(Format::R32G32Float.size_in_bytes(), 8);
        assert_eq!(Format::R8G8B8A8Unorm.size_in_bytes(), 4);
        assert_eq!(Format::R16Uint.size_in_bytes(), 2);
    }

    #[test]
    fn depth_stencil_classification() {
        assert!(Format::D32Float.has_depth());
        assert!(!Format::D32Float.has_stencil());
        assert!(Format::D24UnormS8Uint.has_stencil());
        assert!(Format::B8G8R8A8Unorm.is_color());
        assert!(Format::R16Uint.is_index());
        assert!(!Format::R32Float.is_index());
    }
}
