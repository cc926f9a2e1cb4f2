use std::num::NonZeroU32;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window, WindowId};
use softbuffer::Surface;

use crate::cache::WindowCache;
use crate::codec::Size;
use crate::debounce::EventFilter;
use crate::error::TagError;
use crate::picture::PictureState;

pub mod render;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What a key press asks the controller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Step(isize),
    First,
    Last,
    Rate(i32),
    Rotate,
    Mirror,
    SetCaption(String),
    ToggleFullscreen,
    Quit,
}

/// Events delivered to the winit loop from other threads.
#[derive(Debug)]
pub enum UserEvent {
    /// A resize that has stopped changing.
    Resized(Size),
    Command(Command),
    ImageReady(usize),
}

pub fn command_for_key(key: &Key) -> Option<Command> {
    match key {
        Key::Named(named) => match named {
            NamedKey::ArrowRight | NamedKey::Space => Some(Command::Step(1)),
            NamedKey::ArrowLeft | NamedKey::Backspace => Some(Command::Step(-1)),
            NamedKey::ArrowDown | NamedKey::PageDown => Some(Command::Step(10)),
            NamedKey::ArrowUp | NamedKey::PageUp => Some(Command::Step(-10)),
            NamedKey::Home => Some(Command::First),
            NamedKey::End => Some(Command::Last),
            NamedKey::Escape => Some(Command::Quit),
            _ => None,
        },
        Key::Character(s) => match s.to_lowercase().as_str() {
            "n" => Some(Command::Step(1)),
            "p" => Some(Command::Step(-1)),
            "-" => Some(Command::Rate(-1)),
            d @ ("0" | "1" | "2" | "3" | "4" | "5") => d.parse().ok().map(Command::Rate),
            "r" => Some(Command::Rotate),
            "m" => Some(Command::Mirror),
            "f" => Some(Command::ToggleFullscreen),
            "q" => Some(Command::Quit),
            _ => None,
        },
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Application handler (winit 0.30 style)
// ---------------------------------------------------------------------------

pub struct App {
    cache: WindowCache,
    filter: EventFilter<Command>,
    initial_size: Size,
    fullscreen: bool,
    /// Size last given to `surface.resize`; nothing is drawn before one.
    surface_size: Option<(NonZeroU32, NonZeroU32)>,
    /// Caption text being typed, if editing.
    caption_edit: Option<String>,
    window: Option<Arc<Window>>,
    context: Option<softbuffer::Context<Arc<Window>>>,
    surface: Option<Surface<Arc<Window>, Arc<Window>>>,
}

impl App {
    pub fn new(
        cache: WindowCache,
        filter: EventFilter<Command>,
        initial_size: Size,
        fullscreen: bool,
    ) -> Self {
        Self {
            cache,
            filter,
            initial_size,
            fullscreen,
            surface_size: None,
            caption_edit: None,
            window: None,
            context: None,
            surface: None,
        }
    }

    fn request_redraw(&self) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn forward(&self, cmd: Command) {
        if self.filter.forward(cmd).is_err() {
            log::error!("event filter has stopped");
        }
    }

    fn report(&self, what: &str, result: Result<(), TagError>) {
        if let Err(e) = result {
            let name = self.cache.current_picture().map(|p| p.name()).unwrap_or("-");
            log::error!("{}: {}: {}", name, what, e);
        }
    }

    fn apply(&mut self, cmd: Command, event_loop: &ActiveEventLoop) {
        match cmd {
            Command::Step(delta) => self.cache.step(delta),
            Command::First => self.cache.set_current_index(0),
            Command::Last => self.cache.set_current_index(self.cache.len() as isize - 1),
            Command::Rate(n) => {
                let result = self.cache.rate(n);
                self.report("failed to set rating", result);
            }
            Command::Rotate => {
                let result = self.cache.rotate();
                self.report("rotate", result);
            }
            Command::Mirror => {
                let result = self.cache.mirror();
                self.report("mirror", result);
            }
            Command::SetCaption(text) => {
                let result = self.cache.set_caption(&text);
                self.report("failed to set caption", result);
            }
            Command::ToggleFullscreen => {
                self.fullscreen = !self.fullscreen;
                if let Some(ref window) = self.window {
                    window.set_fullscreen(self.fullscreen.then_some(Fullscreen::Borderless(None)));
                }
            }
            Command::Quit => {
                event_loop.exit();
                return;
            }
        }
        self.request_redraw();
    }

    /// Keys while the caption is being edited. Returns false to fall
    /// through to normal handling.
    fn edit_caption(&mut self, key: &Key) -> bool {
        let Some(text) = self.caption_edit.as_mut() else {
            return false;
        };
        match key {
            Key::Named(NamedKey::Enter) => {
                let text = std::mem::take(text);
                self.caption_edit = None;
                self.forward(Command::SetCaption(text));
            }
            Key::Named(NamedKey::Escape) => self.caption_edit = None,
            Key::Named(NamedKey::Backspace) => {
                text.pop();
            }
            Key::Named(NamedKey::Space) => text.push(' '),
            Key::Character(s) => text.push_str(s),
            _ => {}
        }
        self.request_redraw();
        true
    }

    fn title(&self) -> String {
        let Some(p) = self.cache.current_picture() else {
            return "ptag".to_string();
        };
        let mut title = p.title().to_string();
        if let Some(err) = p.error() {
            title.push_str(&format!("  [{}]", err));
            return title;
        }
        if p.state() == PictureState::Unloaded {
            return title;
        }
        match self.cache.rating() {
            Ok(Some(r)) => title.push_str(&format!("  Rating: {}", r)),
            _ => title.push_str("  Rating: -"),
        }
        match self.caption_edit {
            Some(ref text) => title.push_str(&format!("  Caption: {}_", text)),
            None => {
                let caption = self.cache.caption().unwrap_or_default();
                if !caption.is_empty() {
                    title.push_str(&format!("  {}", caption));
                }
            }
        }
        title
    }

    fn redraw(&mut self) {
        let Some(window) = self.window.clone() else { return };
        let Some((w, h)) = self.surface_size else { return };
        let (fb_w, fb_h) = (w.get(), h.get());
        let Some(surface) = self.surface.as_mut() else { return };
        let mut buffer = match surface.buffer_mut() {
            Ok(buffer) => buffer,
            Err(e) => {
                log::error!("surface: {}", e);
                return;
            }
        };
        buffer.fill(render::BG_COLOR);

        if let Some(p) = self.cache.current_picture() {
            match p.await_ready() {
                Ok(()) => {
                    if let Some(frame) = p.frame() {
                        log::debug!(
                            "{} ({}): Showing {}x{} image",
                            p.name(),
                            p.index(),
                            frame.source_size.width,
                            frame.source_size.height
                        );
                        render::draw_frame(&mut buffer, fb_w, fb_h, &frame);
                    }
                }
                Err(e) => {
                    log::error!("{}: load err: {}", p.name(), e);
                    render::draw_error(&mut buffer, fb_w, fb_h);
                }
            }
        }
        if let Err(e) = buffer.present() {
            log::error!("present: {}", e);
        }
        window.set_title(&self.title());
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let mut attrs = Window::default_attributes()
            .with_title("ptag")
            .with_inner_size(LogicalSize::new(self.initial_size.width, self.initial_size.height));
        if self.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attrs).expect("create window"));
        let context = softbuffer::Context::new(Arc::clone(&window)).expect("create context");
        let mut surface = Surface::new(&context, Arc::clone(&window)).expect("create surface");

        // Nothing is loaded until the first size settles.
        let size = window.inner_size();
        if let (Some(w), Some(h)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height)) {
            match surface.resize(w, h) {
                Ok(()) => self.surface_size = Some((w, h)),
                Err(e) => log::error!("surface resize: {}", e),
            }
        }
        if self.filter.resize(Size::new(size.width, size.height)).is_err() {
            log::error!("event filter has stopped");
        }
        window.request_redraw();
        self.window = Some(window);
        self.context = Some(context);
        self.surface = Some(surface);
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::Resized(size) => {
                self.cache.on_settled_resize(size);
                self.request_redraw();
            }
            UserEvent::Command(cmd) => self.apply(cmd, event_loop),
            UserEvent::ImageReady(idx) => {
                if let Some(p) = self.cache.picture(idx) {
                    log::debug!("{} ({}): ready", p.name(), idx);
                }
                if idx == self.cache.current_index() {
                    self.request_redraw();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(PhysicalSize { width, height }) => {
                let (w, h) = (width.max(1), height.max(1));
                if let (Some(surface), Some(w), Some(h)) =
                    (self.surface.as_mut(), NonZeroU32::new(w), NonZeroU32::new(h))
                {
                    match surface.resize(w, h) {
                        Ok(()) => self.surface_size = Some((w, h)),
                        Err(e) => log::error!("surface resize: {}", e),
                    }
                }
                if self.filter.resize(Size::new(w, h)).is_err() {
                    log::error!("event filter has stopped");
                }
                self.request_redraw();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                if self.edit_caption(&event.logical_key) {
                    return;
                }
                if let Key::Character(ref s) = event.logical_key {
                    if s.eq_ignore_ascii_case("c") && !event.repeat {
                        let current = self.cache.caption().unwrap_or_default();
                        self.caption_edit = Some(current);
                        self.request_redraw();
                        return;
                    }
                }
                if let Some(cmd) = command_for_key(&event.logical_key) {
                    log::debug!("Key: {:?}", event.logical_key);
                    self.forward(cmd);
                }
            }

            WindowEvent::RedrawRequested => self.redraw(),

            _ => {}
        }
    }
}
