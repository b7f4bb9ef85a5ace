//! Shared runtime state: viewport size and pixel ratio.

use std::cell::Cell;

use crate::resources::config::MAX_PIXEL_RATIO;

/// Drawing viewport in CSS-style pixels plus device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub dpr: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 0,
            height: 0,
            dpr: 1.0,
        }
    }
}

impl Viewport {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// Copy of the state at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    pub viewport: Viewport,
}

/// State shared by the device and runtime.
#[derive(Debug, Default)]
pub struct State {
    viewport: Cell<Viewport>,
}

impl State {
    pub fn new(dpr: f32) -> Self {
        let state = State::default();
        state.viewport.set(Viewport {
            dpr: dpr.min(MAX_PIXEL_RATIO),
            ..Viewport::default()
        });
        state
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport.get()
    }

    /// Update the size, and the pixel ratio when given.
    pub fn set_viewport(&self, width: u32, height: u32, dpr: Option<f32>) {
        let mut viewport = self.viewport.get();
        viewport.width = width;
        viewport.height = height;
        if let Some(dpr) = dpr {
            viewport.dpr = dpr.min(MAX_PIXEL_RATIO);
        }
        self.viewport.set(viewport);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            viewport: self.viewport(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_viewport_keeps_dpr_unless_given() {
        let state = State::new(3.0);
        assert_eq!(state.viewport().dpr, MAX_PIXEL_RATIO);
        state.set_viewport(800, 400, None);
        assert_eq!(state.viewport().dpr, MAX_PIXEL_RATIO);
        state.set_viewport(800, 400, Some(1.0));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.viewport.dpr, 1.0);
        assert_eq!(snapshot.viewport.aspect_ratio(), 2.0);
    }
}
