//! Bridge between a pointer adapter thread and the input hub.
//!
//! Adapters (a window event loop, a scripted driver, a test) send normalized
//! [`PointerCmd`]s through a channel from any thread. The runtime calls
//! [`InputBridge::drain_into`] at the start of every frame, which converts
//! pixel positions to normalized coordinates, advances pointer smoothing and
//! forwards everything to [`Input`] on the engine thread.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use log::debug;

use crate::events::input::{Input, MouseButton};

/// Fraction of the remaining distance the smoothed pointer covers per frame.
const SMOOTHING: f32 = 0.35;
/// How long `mouse_moved` stays set after the last move, in milliseconds.
const MOUSE_MOVED_COOLDOWN_MS: f64 = 420.0;

/// Commands an adapter sends to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerCmd {
    /// Pointer moved to pixel coordinates within the viewport.
    Move { x: f32, y: f32 },
    Button { button: MouseButton, pressed: bool },
    Wheel { delta_y: f32 },
}

/// Channel endpoints plus the adapter-side pointer smoothing state.
#[derive(Debug)]
pub struct InputBridge {
    tx: Sender<PointerCmd>,
    rx: Receiver<PointerCmd>,
    viewport: (f32, f32),
    target: (f32, f32),
    smooth: (f32, f32),
    last_move_ms: Option<f64>,
}

impl Default for InputBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBridge {
    pub fn new() -> Self {
        let (tx, rx) = unbounded::<PointerCmd>();
        Self {
            tx,
            rx,
            viewport: (1.0, 1.0),
            target: (0.0, 0.0),
            smooth: (0.0, 0.0),
            last_move_ms: None,
        }
    }

    /// Sender an adapter thread can own.
    pub fn sender(&self) -> Sender<PointerCmd> {
        self.tx.clone()
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1) as f32, height.max(1) as f32);
    }

    fn normalize(&self, x: f32, y: f32) -> (f32, f32) {
        let (w, h) = self.viewport;
        ((x / w) * 2.0 - 1.0, -(y / h) * 2.0 + 1.0)
    }

    /// Forward every pending command to `input`. Returns how many were applied.
    pub fn drain_into(&mut self, input: &Input, now_ms: f64) -> usize {
        let mut applied = 0;
        loop {
            let cmd = match self.rx.try_recv() {
                Ok(cmd) => cmd,
                Err(TryRecvError::Empty) => break,
                // Unreachable while `self.tx` lives.
                Err(TryRecvError::Disconnected) => break,
            };
            applied += 1;
            match cmd {
                PointerCmd::Move { x, y } => {
                    let (nx, ny) = self.normalize(x, y);
                    self.target = (x, y);
                    self.last_move_ms = Some(now_ms);
                    input.set_mouse_position(x, y, nx, ny);
                    input.set_mouse_moved(true);
                    input.emit_mouse_move();
                }
                PointerCmd::Button { button, pressed } => input.set_mouse_button(button, pressed),
                PointerCmd::Wheel { delta_y } => input.set_wheel(delta_y),
            }
        }

        self.smooth.0 += (self.target.0 - self.smooth.0) * SMOOTHING;
        self.smooth.1 += (self.target.1 - self.smooth.1) * SMOOTHING;
        let (snx, sny) = self.normalize(self.smooth.0, self.smooth.1);
        input.set_smooth_mouse_position(self.smooth.0, self.smooth.1, snx, sny);

        if let Some(last) = self.last_move_ms
            && now_ms - last > MOUSE_MOVED_COOLDOWN_MS
        {
            self.last_move_ms = None;
            input.set_mouse_moved(false);
        }

        if applied > 0 {
            debug!("drained {} pointer command(s)", applied);
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::input::{InputEvent, InputEventKind};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn commands_from_another_thread_reach_the_hub() {
        let mut bridge = InputBridge::new();
        bridge.set_viewport(200, 100);
        let input = Input::new();
        let downs = Rc::new(Cell::new(0));
        let d = downs.clone();
        let _sub = input.subscribe(InputEventKind::MouseDown, move |e| {
            if let InputEvent::MouseDown(p) = e {
                assert_eq!(p.button, Some(MouseButton::Left));
            }
            d.set(d.get() + 1);
        });

        let tx = bridge.sender();
        std::thread::spawn(move || {
            tx.send(PointerCmd::Move { x: 150.0, y: 25.0 }).unwrap();
            tx.send(PointerCmd::Button {
                button: MouseButton::Left,
                pressed: true,
            })
            .unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(bridge.drain_into(&input, 0.0), 2);
        let mouse = input.mouse();
        assert_eq!((mouse.nx, mouse.ny), (0.5, 0.5));
        assert!(input.mouse_moved());
        assert_eq!(downs.get(), 1);
    }

    #[test]
    fn mouse_moved_clears_after_cooldown() {
        let mut bridge = InputBridge::new();
        let input = Input::new();
        bridge.sender().send(PointerCmd::Move { x: 1.0, y: 1.0 }).unwrap();
        bridge.drain_into(&input, 0.0);
        bridge.drain_into(&input, 100.0);
        assert!(input.mouse_moved());
        bridge.drain_into(&input, 1000.0);
        assert!(!input.mouse_moved());
    }

    #[test]
    fn smoothing_approaches_target() {
        let mut bridge = InputBridge::new();
        let input = Input::new();
        bridge.sender().send(PointerCmd::Move { x: 100.0, y: 0.0 }).unwrap();
        bridge.drain_into(&input, 0.0);
        let first = input.smooth_mouse().x;
        bridge.drain_into(&input, 16.0);
        let second = input.smooth_mouse().x;
        assert!(first > 0.0 && first < second && second < 100.0);
    }
}
