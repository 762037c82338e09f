//! Minimal application shell: animated clear color.
//!
//! Exercises the full frame loop (acquire, record, submit, present), the
//! minimize/restore gate, and the resize protocol from a winit event loop.

use ember_renderer::ash::vk;
use ember_renderer::{prelude::*, WindowSurfaceProvider};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

/// Clears the presentable image to a slowly pulsing blue.
struct ClearRecorder;

impl FrameRecorder for ClearRecorder {
    fn record(&mut self, ctx: &mut RecordContext<'_>) -> Result<()> {
        if ctx.image == vk::Image::null() {
            return Ok(());
        }

        let flash = ((ctx.frame_number as f32) / 120.0).sin().abs();
        let clear_value = vk::ClearColorValue {
            float32: [0.0, 0.0, flash, 1.0],
        };
        let range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(1)
            .layer_count(1);

        // Clear wants TRANSFER_DST; hand the image back in the layout the
        // core gave it to us.
        ctx.cmd.transition_image(
            ctx.image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        unsafe {
            ctx.device.cmd_clear_color_image(
                ctx.cmd.handle(),
                ctx.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_value,
                &[range],
            );
        }
        ctx.cmd.transition_image(
            ctx.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        Ok(())
    }
}

#[derive(Default)]
struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    recorder: Option<ClearRecorder>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window_attrs = Window::default_attributes()
            .with_title("Ember Renderer - Clear")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = event_loop.create_window(window_attrs).unwrap();
        let size = window.inner_size();
        let surface_provider = WindowSurfaceProvider::new(&window, size.width, size.height);

        match Renderer::new(&surface_provider) {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                self.recorder = Some(ClearRecorder);
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Failed to create renderer: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    if size.width == 0 || size.height == 0 {
                        renderer.on_minimize();
                    } else {
                        renderer.on_restore();
                    }
                    renderer.on_resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let (Some(renderer), Some(recorder)) = (&mut self.renderer, &mut self.recorder)
                else {
                    return;
                };

                if !renderer.should_render() {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                    return;
                }

                if let Err(e) = renderer.render_frame(recorder, None) {
                    log::error!("Fatal render error: {e}");
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {e}");
    }
}
