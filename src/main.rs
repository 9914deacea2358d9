// =============================================================================
// GPU PRESENT - Vulkan bootstrap and presentation core
// =============================================================================
//
// Brings a window on screen with a ready-to-use swapchain.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (App)                                         │
// │    └── GraphicsContext (instance, GPU, device, queue)           │
// │          └── PresentationSurface (surface, swapchain, views)    │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Resize events mark the surface stale
// 2. Before a frame, a stale or swapchain-less surface is recreated
//    (an unbound surface is left alone)
// 3. A minimized window (zero framebuffer) skips the frame
//
// =============================================================================

mod logging;

mod backend;
mod config;
mod window;

use anyhow::Result;
use backend::{GraphicsContext, OrTerminate, PresentationSurface, SurfaceState};
use config::Config;
use raw_window_handle::HasRawDisplayHandle;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    logging::init_logging(&config.debug);
    log::info!("Starting {}", config.graphics.application_name);
    log::info!(
        "Window: {}x{} (resizable: {}, maximized: {})",
        config.window.width,
        config.window.height,
        config.window.resizable,
        config.window.maximized
    );
    log::info!("Preferred present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Owns the window, the one GraphicsContext and the window's surface.
///
/// The surface holds an Arc to the context, so dropping the surface first
/// lets the context go last.
pub struct App {
    config: Config,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW & SURFACE
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    surface: Option<PresentationSurface<Window>>,
    /// Set by resize events; the next frame rebuilds the swapchain
    surface_stale: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    context: Option<Arc<GraphicsContext>>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            surface: None,
            surface_stale: false,
            context: None,
        }
    }

    /// Context first, then the surface for `window`. Both are fatal on error.
    fn init_graphics(&mut self, window: Arc<Window>) {
        let context = match &self.context {
            Some(context) => Arc::clone(context),
            None => {
                let settings = self.config.context_settings();
                let context = GraphicsContext::new(&settings, window.raw_display_handle()).or_terminate();
                log::info!(
                    "Rendering on {} (graphics queue {:?}, diagnostics {})",
                    context.gpu().name,
                    context.graphics_queue(),
                    if context.has_diagnostics() { "on" } else { "off" }
                );
                self.context = Some(Arc::clone(&context));
                context
            }
        };

        let surface =
            PresentationSurface::new(context, Arc::clone(&window), self.config.get_present_mode())
                .or_terminate();
        if surface.state() == SurfaceState::Invalid {
            log::error!("Window has no surface; nothing will be presented");
        } else {
            log_surface(&surface);
        }

        self.surface = Some(surface);
        self.window = Some(window);
    }

    /// Brings the surface up to date before a frame.
    ///
    /// Returns false when there is nothing to render into this frame.
    fn prepare_frame(&mut self) -> bool {
        let Some(surface) = &mut self.surface else {
            return false;
        };
        let Some(window) = surface.window() else {
            return false;
        };

        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return false;
        }

        if surface.needs_recreate(self.surface_stale) {
            self.surface_stale = false;
            if surface.recreate() == SurfaceState::SwapchainReady {
                log_surface(surface);
            }
        }

        surface.is_valid()
    }

    /// Surface before context: the reverse of creation.
    fn teardown(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.exit();
        }
        if let Some(context) = self.context.take() {
            if Arc::strong_count(&context) > 1 {
                log::warn!("GraphicsContext still referenced at shutdown");
            }
        }
        self.window = None;
    }
}

fn log_surface(surface: &PresentationSurface<Window>) {
    log::info!(
        "Swapchain {:?} on {:?}: {} images, {} views, {:?}/{:?}, {}x{}, {:?}",
        surface.swapchain(),
        surface.surface(),
        surface.images().len(),
        surface.image_views().len(),
        surface.format().format,
        surface.format().color_space,
        surface.extent().width,
        surface.extent().height,
        surface.present_mode()
    );
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match event_loop.create_window(window::window_attributes(&self.config.window)) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        self.init_graphics(window);
    }

    /// Handle window events.
    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.teardown();
                event_loop.exit();
            }

            // ─────────────────────────────────────────────────────────────────
            // WINDOW RESIZED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.surface_stale = true;
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => {
                // Rendering itself lives above this layer
                self.prepare_frame();
            }

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.teardown();
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        self.teardown();
        log::info!("Cleanup complete");
    }
}
