use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Report;
use color_eyre::Result;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::renderer::config::{WINDOW_HEIGHT, WINDOW_TITLE, WINDOW_WIDTH};
use crate::renderer::Renderer;

/// How long to sleep per loop iteration while the window is minimized,
/// instead of busy-spinning on the event queue.
const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Event-loop driver. Owns the window and the renderer and decides, per
/// iteration, whether a frame gets drawn at all.
pub struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,

    // State
    stop_rendering: bool,
    close_requested: bool,
    key_press_count: u32,
    failure: Option<Report>,
}

impl App {
    pub fn new() -> Result<Self> {
        Ok(Self {
            window: None,
            renderer: None,

            stop_rendering: false,
            close_requested: false,
            key_press_count: 0,
            failure: None,
        })
    }

    /// Runs until the window closes or a fatal GPU error unwinds out of a
    /// frame. The error is returned after the loop exits so logs flush
    /// before the process dies.
    pub fn run(&mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(self)?;

        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        log::error!("shutting down: {:#}", err);
        self.failure = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let attributes = Window::default_attributes()
                .with_title(WINDOW_TITLE)
                .with_inner_size(PhysicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT));
            match event_loop.create_window(attributes) {
                Ok(window) => self.window = Some(Arc::new(window)),
                Err(err) => {
                    self.fail(event_loop, err.into());
                    return;
                }
            }
        }

        if self.renderer.is_none() {
            let window = self.window.as_ref().unwrap();
            match Renderer::new(window) {
                Ok(renderer) => self.renderer = Some(renderer),
                Err(err) => self.fail(event_loop, err),
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Occluded(occluded) => {
                // Minimized: stall drawing entirely until restored.
                self.stop_rendering = occluded;
            }
            WindowEvent::RedrawRequested => {
                if self.stop_rendering {
                    return;
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(err) = renderer.draw() {
                        self.fail(event_loop, err.into());
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.key_press_count += 1;
                log::info!("click {}", self.key_press_count);
                if let Key::Named(NamedKey::Escape) = key {
                    self.close_requested = true;
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }

        if self.stop_rendering {
            std::thread::sleep(MINIMIZED_POLL_INTERVAL);
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
