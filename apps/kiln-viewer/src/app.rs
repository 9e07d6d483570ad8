//! Viewer state and the per-frame recording.

use std::sync::Arc;

use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use kiln_core::{
    CommandListType, CullMode, Format, RasterizerState, RecordingState, ShaderDesc, Transition,
    VertexAttribute, VertexBufferDesc, VertexBufferLayout,
};
use kiln_gpu::{
    AcquireStatus, CommandBuffer, PipelineState, PipelineStateDesc, PresentStatus, RenderDevice,
    VertexBuffer,
};
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use crate::ViewerConfig;

const CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.08, 1.0];

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
];

struct Triangle {
    pipeline: Arc<PipelineState>,
    vertices: VertexBuffer,
}

/// Everything alive while the window is open.
///
/// Command buffers and the triangle drop before the device, the device
/// before the window whose surface it presents to.
pub struct Viewer {
    command_buffers: Vec<CommandBuffer>,
    triangle: Option<Triangle>,
    device: RenderDevice,
    window: Arc<Window>,
    needs_rebuild: bool,
    pending_size: Option<(u32, u32)>,
}

impl Viewer {
    pub fn new(event_loop: &ActiveEventLoop, config: &ViewerConfig) -> anyhow::Result<Self> {
        let attrs = Window::default_attributes()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let size = window.inner_size();
        let device = RenderDevice::builder()
            .app_name(config.title.clone())
            .validation(config.validation)
            .frame_count(config.frame_count)
            .extent(size.width, size.height)
            .build_with_window(window.as_ref())?;
        info!("Rendering on {}", device.device_name());

        let triangle = match &config.shaders {
            Some((vertex, fragment)) => Some(Self::create_triangle(&device, vertex, fragment)?),
            None => None,
        };

        let mut viewer = Self {
            command_buffers: Vec::new(),
            triangle,
            device,
            window,
            needs_rebuild: false,
            pending_size: None,
        };
        viewer.sync_command_buffers()?;
        Ok(viewer)
    }

    fn create_triangle(
        device: &RenderDevice,
        vertex: &std::path::Path,
        fragment: &std::path::Path,
    ) -> anyhow::Result<Triangle> {
        let shader = device.create_shader(&ShaderDesc {
            vertex: std::fs::read(vertex)
                .with_context(|| format!("failed to read {}", vertex.display()))?,
            fragment: std::fs::read(fragment)
                .with_context(|| format!("failed to read {}", fragment.display()))?,
            ..ShaderDesc::default()
        })?;
        let render_pass = device
            .back_buffer_pass()
            .context("device has no back-buffer pass")?;

        let mut desc = PipelineStateDesc::new(shader, Arc::clone(render_pass));
        desc.vertex_buffers = vec![VertexBufferLayout {
            attributes: vec![
                VertexAttribute::new(0, Format::R32G32Float),
                VertexAttribute::new(1, Format::R32G32B32Float),
            ],
            ..VertexBufferLayout::default()
        }];
        desc.rasterizer = RasterizerState {
            cull_mode: CullMode::None,
            ..RasterizerState::default()
        };
        let pipeline = device.create_pipeline_state(&desc)?;

        let bytes: &[u8] = bytemuck::cast_slice(&TRIANGLE);
        let vertices = device.create_vertex_buffer(&VertexBufferDesc {
            size: bytes.len() as u64,
            stride: std::mem::size_of::<Vertex>() as u32,
        })?;
        vertices.update(bytes)?;
        info!("Triangle pipeline ready");

        Ok(Triangle { pipeline, vertices })
    }

    /// One primary command buffer per frame in flight.
    fn sync_command_buffers(&mut self) -> anyhow::Result<()> {
        let frame_count = self.device.frame_count();
        if self.command_buffers.len() == frame_count {
            return Ok(());
        }
        debug!(
            "Allocating {} command buffers (was {})",
            frame_count,
            self.command_buffers.len()
        );
        self.command_buffers.clear();
        for _ in 0..frame_count {
            self.command_buffers
                .push(self.device.create_command_buffer(CommandListType::Direct)?);
        }
        Ok(())
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.pending_size = Some((width, height));
        self.needs_rebuild = true;
    }

    fn rebuild(&mut self) -> anyhow::Result<bool> {
        let (width, height) = self.pending_size.unwrap_or_else(|| {
            let size = self.window.inner_size();
            (size.width, size.height)
        });
        if width == 0 || height == 0 {
            return Ok(false);
        }
        self.device.resize(width, height)?;
        self.sync_command_buffers()?;
        self.needs_rebuild = false;
        self.pending_size = None;
        debug!("Swap chain rebuilt at {width}x{height}");
        Ok(true)
    }

    pub fn render_frame(&mut self) -> anyhow::Result<()> {
        if self.needs_rebuild && !self.rebuild()? {
            return Ok(());
        }

        self.device.move_to_next_frame()?;
        if self.device.acquire_next_image()? == AcquireStatus::NeedsRebuild {
            self.needs_rebuild = true;
            return Ok(());
        }

        let frame = self.device.frame_index();
        let cmd = self
            .command_buffers
            .get_mut(frame)
            .context("no command buffer for the current frame")?;

        if cmd.state().state() == RecordingState::Initial {
            cmd.begin()?;
        } else {
            cmd.reset(None)?;
        }

        cmd.begin_swap_chain_pass(&[CLEAR_COLOR])?;
        if let Some(triangle) = &self.triangle {
            cmd.set_pipeline_state(&triangle.pipeline)?;
            cmd.set_vertex_buffer(0, &triangle.vertices)?;
            cmd.draw_instanced(3, 1, 0, 0)?;
        }
        cmd.end_render_pass()?;
        cmd.resource_barrier_swap_chain(Transition::render_target_to_present())?;
        cmd.close()?;

        if cmd.present()? == PresentStatus::NeedsRebuild {
            warn!("Swap chain out of date after present");
            self.needs_rebuild = true;
        }
        Ok(())
    }

    pub fn shutdown(mut self) {
        self.command_buffers.clear();
        self.triangle = None;
        self.device.shutdown();
        info!("Viewer shut down");
    }
}
