use winit::{
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    keyboard::{Key, ModifiersState, NamedKey},
};

use crate::{
    cmd::Cmd,
    config::{Bindings, CommandVerb, KeyChord},
    math::{vec2, Vec2d},
};

/// Touchpad pixels per scroll line.
const PIXELS_PER_LINE: f64 = 20.0;

/// Turns raw window events into [`Cmd`]s.
///
/// Tracks the cursor and the held buttons and keys that make up the pan
/// chords: both mouse buttons, or Space with the left button.
#[derive(Debug)]
pub struct InputState {
    cursor: Vec2d,
    left: bool,
    right: bool,
    space: bool,
    ctrl: bool,
    panning: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self {
            cursor: vec2(0.0, 0.0),
            left: false,
            right: false,
            space: false,
            ctrl: false,
            panning: false,
        }
    }

    /// Last known cursor position in screen pixels.
    pub fn cursor(&self) -> Vec2d {
        self.cursor
    }

    pub fn is_panning(&self) -> bool {
        self.panning
    }

    pub fn handle_window_event(
        &mut self,
        event: &WindowEvent,
        bindings: &Bindings,
        mut send_cmd: impl FnMut(Cmd),
    ) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(vec2(position.x, position.y), &mut send_cmd);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.mouse_input(*state, *button, &mut send_cmd);
            }
            WindowEvent::MouseWheel { delta, .. } => self.scroll(*delta, &mut send_cmd),
            WindowEvent::ModifiersChanged(modifiers) => self.modifiers(modifiers.state()),
            WindowEvent::KeyboardInput { event, .. } => self.key(
                &event.logical_key,
                event.state,
                event.repeat,
                bindings,
                &mut send_cmd,
            ),
            WindowEvent::Focused(false) => {
                // Releases are not delivered while unfocused.
                self.left = false;
                self.right = false;
                self.space = false;
                self.ctrl = false;
                if !self.panning {
                    send_cmd(Cmd::PointerUp);
                }
                self.panning = false;
            }
            _ => {}
        }
    }

    pub fn cursor_moved(&mut self, position: Vec2d, mut send_cmd: impl FnMut(Cmd)) {
        let delta = position - self.cursor;
        self.cursor = position;
        if self.panning {
            send_cmd(Cmd::PanBy { delta });
        } else {
            send_cmd(Cmd::PointerMove { position });
        }
    }

    pub fn mouse_input(
        &mut self,
        state: ElementState,
        button: MouseButton,
        mut send_cmd: impl FnMut(Cmd),
    ) {
        let pressed = state.is_pressed();
        match button {
            MouseButton::Left => self.left = pressed,
            MouseButton::Right => self.right = pressed,
            _ => return,
        }

        if self.pan_chord_held() {
            self.begin_pan(&mut send_cmd);
        } else if self.panning {
            // Stay in pan mode until every button is up, so a leftover button never draws.
            self.panning = self.left || self.right;
        } else if button == MouseButton::Left {
            send_cmd(if pressed {
                Cmd::PointerDown {
                    position: self.cursor,
                }
            } else {
                Cmd::PointerUp
            });
        }
    }

    pub fn modifiers(&mut self, state: ModifiersState) {
        self.ctrl = state.control_key();
    }

    pub fn key(
        &mut self,
        key: &Key,
        state: ElementState,
        repeat: bool,
        bindings: &Bindings,
        mut send_cmd: impl FnMut(Cmd),
    ) {
        let pressed = state.is_pressed();
        if let Key::Named(NamedKey::Space) = key {
            self.space = pressed;
            if self.pan_chord_held() {
                self.begin_pan(&mut send_cmd);
            } else if !pressed && self.panning {
                self.panning = self.left || self.right;
            }
        }

        if !pressed || repeat {
            return;
        }
        let Some(name) = key_name(key) else { return };
        let chord = KeyChord::new(self.ctrl, &name);
        if let Some(verb) = bindings.get(&chord) {
            log::debug!("{chord} -> {verb:?}");
            send_cmd(match verb {
                CommandVerb::Undo => Cmd::Undo,
                CommandVerb::Redo => Cmd::Redo,
                CommandVerb::ToolEraser => Cmd::ToggleEraser,
                CommandVerb::ResetView => Cmd::ResetView,
                CommandVerb::Clear => Cmd::Clear,
                CommandVerb::Thicker => Cmd::Thicker,
                CommandVerb::Thinner => Cmd::Thinner,
                CommandVerb::Quit => Cmd::Quit,
            });
        }
    }

    pub fn scroll(&mut self, delta: MouseScrollDelta, mut send_cmd: impl FnMut(Cmd)) {
        let lines = match delta {
            MouseScrollDelta::LineDelta(x, y) => vec2(f64::from(x), f64::from(y)),
            MouseScrollDelta::PixelDelta(px) => {
                vec2(px.x / PIXELS_PER_LINE, px.y / PIXELS_PER_LINE)
            }
        };

        if self.ctrl {
            if lines.y() != 0.0 {
                send_cmd(Cmd::Zoom {
                    anchor: self.cursor,
                    direction: lines.y().signum(),
                });
            }
        } else {
            send_cmd(Cmd::Scroll { delta: lines });
        }
    }

    fn pan_chord_held(&self) -> bool {
        self.left && (self.right || self.space)
    }

    fn begin_pan(&mut self, send_cmd: &mut impl FnMut(Cmd)) {
        if !self.panning {
            self.panning = true;
            send_cmd(Cmd::BeginPan);
        }
    }
}

/// Lower-case name used in key bindings, e.g. `z`, `=` or `escape`.
fn key_name(key: &Key) -> Option<String> {
    match key {
        Key::Character(c) => Some(c.to_lowercase()),
        Key::Named(named) => Some(format!("{named:?}").to_lowercase()),
        _ => None,
    }
}
