//! Pointer input hub.
//!
//! [`Input`] stores the current pointer state and is the publish/subscribe
//! registry nodes use to react to pointer events. It is fed by an adapter
//! (see [`InputBridge`](crate::resources::inputbridge::InputBridge)) and
//! flushed once per frame by [`Input::update`], which clears per-frame deltas.
//!
//! Subscribing returns a [`Subscription`]; calling
//! [`Subscription::unsubscribe`] more than once is harmless.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use log::warn;
use rustc_hash::FxHashMap;

/// Event names a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputEventKind {
    MouseMove,
    MouseDown,
    MouseUp,
    Wheel,
}

/// Pointer buttons tracked by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// Pressed state of each pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonState {
    pub left: bool,
    pub middle: bool,
    pub right: bool,
}

/// Raw pointer state in pixels and normalized device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MouseState {
    pub x: f32,
    pub y: f32,
    /// Normalized x in `[-1, 1]`, left to right.
    pub nx: f32,
    /// Normalized y in `[-1, 1]`, bottom to top.
    pub ny: f32,
    pub delta_x: f32,
    pub delta_y: f32,
    pub wheel: f32,
    pub buttons: ButtonState,
}

/// Pointer position after adapter-side smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SmoothMouseState {
    pub x: f32,
    pub y: f32,
    pub nx: f32,
    pub ny: f32,
}

/// Payload of move/down/up events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub mouse: MouseState,
    pub smooth: SmoothMouseState,
    pub mouse_moved: bool,
    /// Button that changed, for down/up events.
    pub button: Option<MouseButton>,
}

/// Payload of wheel events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub delta_y: f32,
    pub mouse: MouseState,
}

/// Event delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    MouseMove(PointerEvent),
    MouseDown(PointerEvent),
    MouseUp(PointerEvent),
    Wheel(WheelEvent),
}

impl InputEvent {
    pub fn kind(&self) -> InputEventKind {
        match self {
            InputEvent::MouseMove(_) => InputEventKind::MouseMove,
            InputEvent::MouseDown(_) => InputEventKind::MouseDown,
            InputEvent::MouseUp(_) => InputEventKind::MouseUp,
            InputEvent::Wheel(_) => InputEventKind::Wheel,
        }
    }
}

type Handler = Rc<RefCell<dyn FnMut(&InputEvent)>>;

#[derive(Default)]
struct HubState {
    listeners: FxHashMap<InputEventKind, Vec<(u64, Handler)>>,
    next_listener: u64,
    mouse: MouseState,
    smooth: SmoothMouseState,
    mouse_moved: bool,
}

impl HubState {
    fn remove_listener(&mut self, kind: InputEventKind, id: u64) {
        if let Some(list) = self.listeners.get_mut(&kind) {
            list.retain(|(listener, _)| *listener != id);
            if list.is_empty() {
                self.listeners.remove(&kind);
            }
        }
    }

    fn pointer_event(&self, button: Option<MouseButton>) -> PointerEvent {
        PointerEvent {
            mouse: self.mouse,
            smooth: self.smooth,
            mouse_moved: self.mouse_moved,
            button,
        }
    }
}

/// Pointer state + event registry. Cloning yields another handle to the same hub.
#[derive(Clone, Default)]
pub struct Input {
    state: Rc<RefCell<HubState>>,
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Input")
            .field("mouse", &state.mouse)
            .field("smooth", &state.smooth)
            .field("mouse_moved", &state.mouse_moved)
            .field("listeners", &state.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mouse(&self) -> MouseState {
        self.state.borrow().mouse
    }

    pub fn smooth_mouse(&self) -> SmoothMouseState {
        self.state.borrow().smooth
    }

    pub fn mouse_moved(&self) -> bool {
        self.state.borrow().mouse_moved
    }

    /// Number of live handlers for `kind`.
    pub fn listener_count(&self, kind: InputEventKind) -> usize {
        self.state
            .borrow()
            .listeners
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Register `handler` for `kind`.
    pub fn subscribe<F>(&self, kind: InputEventKind, handler: F) -> Subscription
    where
        F: FnMut(&InputEvent) + 'static,
    {
        let mut state = self.state.borrow_mut();
        state.next_listener += 1;
        let id = state.next_listener;
        let handler: Handler = Rc::new(RefCell::new(handler));
        state.listeners.entry(kind).or_default().push((id, handler));
        Subscription {
            hub: Rc::downgrade(&self.state),
            kind,
            id,
        }
    }

    /// Deliver an event produced outside the hub's own setters.
    pub fn emit(&self, event: InputEvent) {
        // Snapshot so handlers may subscribe or unsubscribe while dispatching.
        let handlers: Vec<Handler> = match self.state.borrow().listeners.get(&event.kind()) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        for handler in handlers {
            match handler.try_borrow_mut() {
                Ok(mut handler) => (*handler)(&event),
                Err(_) => warn!("skipping re-entrant {:?} handler", event.kind()),
            }
        }
    }

    pub fn set_mouse_position(&self, x: f32, y: f32, nx: f32, ny: f32) {
        let mut state = self.state.borrow_mut();
        let mouse = &mut state.mouse;
        mouse.delta_x = x - mouse.x;
        mouse.delta_y = y - mouse.y;
        mouse.x = x;
        mouse.y = y;
        mouse.nx = nx;
        mouse.ny = ny;
    }

    pub fn set_smooth_mouse_position(&self, x: f32, y: f32, nx: f32, ny: f32) {
        self.state.borrow_mut().smooth = SmoothMouseState { x, y, nx, ny };
    }

    pub fn set_mouse_moved(&self, moved: bool) {
        self.state.borrow_mut().mouse_moved = moved;
    }

    /// Emit a `MouseMove` with the current state.
    pub fn emit_mouse_move(&self) {
        let event = self.state.borrow().pointer_event(None);
        self.emit(InputEvent::MouseMove(event));
    }

    /// Update a button and emit `MouseDown`/`MouseUp`.
    pub fn set_mouse_button(&self, button: MouseButton, pressed: bool) {
        let event = {
            let mut state = self.state.borrow_mut();
            let buttons = &mut state.mouse.buttons;
            match button {
                MouseButton::Left => buttons.left = pressed,
                MouseButton::Middle => buttons.middle = pressed,
                MouseButton::Right => buttons.right = pressed,
            }
            state.pointer_event(Some(button))
        };
        if pressed {
            self.emit(InputEvent::MouseDown(event));
        } else {
            self.emit(InputEvent::MouseUp(event));
        }
    }

    pub fn set_wheel(&self, delta_y: f32) {
        let mouse = {
            let mut state = self.state.borrow_mut();
            state.mouse.wheel = delta_y;
            state.mouse
        };
        self.emit(InputEvent::Wheel(WheelEvent { delta_y, mouse }));
    }

    /// Per-frame flush: clears deltas and wheel.
    pub fn update(&self, _time: f64, _dt: f64) {
        let mut state = self.state.borrow_mut();
        state.mouse.delta_x = 0.0;
        state.mouse.delta_y = 0.0;
        state.mouse.wheel = 0.0;
    }

    /// Drop every listener.
    pub fn dispose(&self) {
        self.state.borrow_mut().listeners.clear();
    }
}

/// Handle returned by [`Input::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    hub: Weak<RefCell<HubState>>,
    kind: InputEventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> InputEventKind {
        self.kind
    }

    /// Remove the handler. No-op if it is already gone or the hub was dropped.
    pub fn unsubscribe(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.borrow_mut().remove_listener(self.kind, self.id);
        }
    }
}

/// Subscriptions owned by one node, released together on unmount/dispose.
#[derive(Debug, Default)]
pub struct InputSubscriptions {
    subs: Vec<Subscription>,
}

impl InputSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sub: Subscription) {
        self.subs.push(sub);
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    pub fn clear(&mut self) {
        for sub in self.subs.drain(..) {
            sub.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn subscribers_receive_only_their_kind() {
        let input = Input::new();
        let downs = Rc::new(Cell::new(0));
        let wheels = Rc::new(Cell::new(0.0f32));
        let d = downs.clone();
        let w = wheels.clone();
        let _a = input.subscribe(InputEventKind::MouseDown, move |_| d.set(d.get() + 1));
        let _b = input.subscribe(InputEventKind::Wheel, move |e| {
            if let InputEvent::Wheel(wheel) = e {
                w.set(wheel.delta_y);
            }
        });

        input.set_mouse_button(MouseButton::Left, true);
        input.set_mouse_button(MouseButton::Left, false);
        input.set_wheel(3.5);

        assert_eq!(downs.get(), 1);
        assert_eq!(wheels.get(), 3.5);
        assert!(!input.mouse().buttons.left);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_drops_empty_kinds() {
        let input = Input::new();
        let sub = input.subscribe(InputEventKind::MouseMove, |_| {});
        assert_eq!(input.listener_count(InputEventKind::MouseMove), 1);
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(input.listener_count(InputEventKind::MouseMove), 0);
    }

    #[test]
    fn handler_can_unsubscribe_during_dispatch() {
        let input = Input::new();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let hits = Rc::new(Cell::new(0));
        let (s, h) = (slot.clone(), hits.clone());
        let sub = input.subscribe(InputEventKind::MouseDown, move |_| {
            h.set(h.get() + 1);
            if let Some(sub) = s.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        *slot.borrow_mut() = Some(sub);

        input.set_mouse_button(MouseButton::Left, true);
        input.set_mouse_button(MouseButton::Left, true);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn update_flushes_deltas_but_keeps_position() {
        let input = Input::new();
        input.set_mouse_position(10.0, 20.0, 0.0, 0.0);
        input.set_mouse_position(15.0, 18.0, 0.1, 0.2);
        input.set_wheel(1.0);
        assert_eq!(input.mouse().delta_x, 5.0);

        input.update(0.0, 16.0);
        let mouse = input.mouse();
        assert_eq!((mouse.delta_x, mouse.delta_y, mouse.wheel), (0.0, 0.0, 0.0));
        assert_eq!((mouse.x, mouse.y), (15.0, 18.0));
    }

    #[test]
    fn input_subscriptions_clear_releases_all() {
        let input = Input::new();
        let mut subs = InputSubscriptions::new();
        subs.push(input.subscribe(InputEventKind::MouseDown, |_| {}));
        subs.push(input.subscribe(InputEventKind::MouseUp, |_| {}));
        subs.clear();
        assert!(subs.is_empty());
        assert_eq!(input.listener_count(InputEventKind::MouseDown), 0);
        assert_eq!(input.listener_count(InputEventKind::MouseUp), 0);
    }
}
