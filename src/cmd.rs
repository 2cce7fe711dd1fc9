use crate::math::Vec2d;

/// High-level actions produced by the input layer and applied by the window.
///
/// Positions and deltas are in physical screen pixels, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cmd {
    /// Left button pressed without a pan chord held.
    PointerDown {
        position: Vec2d,
    },
    PointerMove {
        position: Vec2d,
    },
    PointerUp,

    /// A pan chord (both buttons, or Space + left) became active.
    BeginPan,
    /// The cursor moved while panning.
    PanBy {
        delta: Vec2d,
    },
    /// Wheel or touchpad scroll, in lines.
    Scroll {
        delta: Vec2d,
    },
    /// Ctrl + wheel. `direction > 0` zooms in.
    Zoom {
        anchor: Vec2d,
        direction: f64,
    },
    ResetView,

    Undo,
    Redo,
    Clear,

    ToggleEraser,
    Thicker,
    Thinner,

    Quit,
}
