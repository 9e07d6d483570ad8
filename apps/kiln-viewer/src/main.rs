//! Kiln viewer
//!
//! Opens a window and drives the frame loop: acquire, record, present and
//! rebuild on resize. With two SPIR-V files it also draws a triangle.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p kiln-viewer -- [OPTIONS] [VERTEX.spv FRAGMENT.spv]
//! ```
//!
//! The vertex shader reads a `vec2` position at location 0 and a `vec3`
//! color at location 1; both stages use the entry point `main`.
//!
//! ## Options
//!
//! - `--frames <N>`: Requested swap-chain image count (default: 2)
//! - `--validation` / `--no-validation`: Toggle the validation layer
//!   (default: on in debug builds)
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use crate::app::Viewer;

/// Viewer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub validation: bool,
    pub frame_count: u32,
    /// Vertex and fragment SPIR-V of the triangle.
    pub shaders: Option<(PathBuf, PathBuf)>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "Kiln Viewer".to_string(),
            width: 1280,
            height: 720,
            validation: cfg!(debug_assertions),
            frame_count: 2,
            shaders: None,
        }
    }
}

impl ViewerConfig {
    /// Parse options and shader paths, excluding the program name.
    pub fn from_args<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut paths = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--validation" => config.validation = true,
                "--no-validation" => config.validation = false,
                "--frames" => {
                    let value = args.next().context("--frames needs a value")?;
                    config.frame_count = value
                        .parse()
                        .with_context(|| format!("invalid frame count '{value}'"))?;
                    if config.frame_count == 0 {
                        bail!("frame count must be at least 1");
                    }
                }
                other if other.starts_with('-') => bail!("unknown option '{other}'"),
                _ => paths.push(PathBuf::from(arg)),
            }
        }

        config.shaders = match paths.len() {
            0 => None,
            2 => {
                let fragment = paths.pop();
                let vertex = paths.pop();
                vertex.zip(fragment)
            }
            n => bail!("expected a vertex and a fragment shader, got {n} paths"),
        };
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ViewerConfig::from_args(std::env::args().skip(1))?;
    info!("{} starting...", config.title);

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = ViewerRunner {
        config,
        viewer: None,
    };
    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }
    Ok(())
}

fn print_help() {
    eprintln!(
        "Kiln viewer

USAGE:
    kiln-viewer [OPTIONS] [VERTEX.spv FRAGMENT.spv]

OPTIONS:
    --frames <N>       Requested swap-chain image count (default: 2)
    --validation       Enable the Vulkan validation layer
    --no-validation    Disable the Vulkan validation layer
    -h, --help         Print this help message"
    );
}

struct ViewerRunner {
    config: ViewerConfig,
    viewer: Option<Viewer>,
}

impl ApplicationHandler for ViewerRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        match Viewer::new(event_loop, &self.config) {
            Ok(viewer) => {
                self.viewer = Some(viewer);
                info!("Viewer ready");
            }
            Err(e) => {
                error!("Failed to initialize viewer: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(viewer) = self.viewer.take() {
                    viewer.shutdown();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(viewer) = &mut self.viewer {
                    if let Err(e) = viewer.render_frame() {
                        error!("Render error: {e:#}");
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.request_resize(size.width, size.height);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = &self.viewer {
            viewer.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn defaults_without_arguments() {
        let config = ViewerConfig::from_args(Vec::new()).unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert!(config.shaders.is_none());
    }

    #[test]
    fn shader_pair_and_options() {
        let config = ViewerConfig::from_args(args(&[
            "--frames",
            "3",
            "--no-validation",
            "tri.vert.spv",
            "tri.frag.spv",
        ]))
        .unwrap();
        assert_eq!(config.frame_count, 3);
        assert!(!config.validation);
        assert_eq!(
            config.shaders,
            Some((
                PathBuf::from("tri.vert.spv"),
                PathBuf::from("tri.frag.spv")
            ))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ViewerConfig::from_args(args(&["only-one.spv"])).is_err());
        assert!(ViewerConfig::from_args(args(&["--frames"])).is_err());
        assert!(ViewerConfig::from_args(args(&["--frames", "0"])).is_err());
        assert!(ViewerConfig::from_args(args(&["--vsync"])).is_err());
    }
}
