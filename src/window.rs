// Window - winit glue for the presentation surface

use crate::backend::PresentTarget;
use crate::config::WindowConfig;
use ash::vk;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowAttributes};

/// Attributes for the main window, from the [window] config section.
pub fn window_attributes(config: &WindowConfig) -> WindowAttributes {
    Window::default_attributes()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .with_resizable(config.resizable)
        .with_decorations(config.decorated)
        .with_maximized(config.maximized)
}

impl PresentTarget for Window {
    fn framebuffer_size(&self) -> vk::Extent2D {
        let size = self.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_follow_config() {
        let config = WindowConfig {
            title: "Demo".to_string(),
            width: 640,
            height: 480,
            resizable: false,
            decorated: false,
            maximized: true,
        };

        let attributes = window_attributes(&config);
        assert_eq!(attributes.title, "Demo");
        assert!(!attributes.resizable);
        assert!(!attributes.decorations);
        assert!(attributes.maximized);
        assert_eq!(
            attributes.inner_size,
            Some(PhysicalSize::new(640u32, 480u32).into())
        );
    }
}
