//! The node capability: a mountable, updatable, disposable unit.
//!
//! Hooks that may take time ([`Node::before_mount`], [`Node::before_unmount`])
//! return a [`HookFuture`]. The graph calls the hook while holding the node
//! mutably, releases the borrow, then awaits the future, so the future must
//! own everything it touches (typically `Rc` clones of the node's state).

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;

use crate::backend::ObjectHandle;
use crate::error::LifecycleError;

/// Awaitable lifecycle hook.
pub type HookFuture = LocalBoxFuture<'static, Result<(), LifecycleError>>;

/// Background work started by [`Node::on_mounted`]. The graph spawns it and
/// never awaits it; it is aborted when the node starts unmounting.
pub type EntryEffect = LocalBoxFuture<'static, ()>;

/// Hook that completes immediately.
pub fn ready() -> HookFuture {
    futures_util::future::ready(Ok(())).boxed_local()
}

pub trait Node {
    /// Unique within a graph.
    fn id(&self) -> &str;

    fn name(&self) -> &str {
        self.id()
    }

    fn active(&self) -> bool {
        true
    }

    /// Object to attach to the scene while mounted. Queried once, when the
    /// node is added to a graph.
    fn renderable(&self) -> Option<ObjectHandle> {
        None
    }

    /// Setup before attachment. Must not start visible animation.
    fn before_mount(&mut self) -> HookFuture {
        ready()
    }

    /// Called right after attachment.
    fn on_mounted(&mut self) -> Option<EntryEffect> {
        None
    }

    /// Exit work, awaited before detachment.
    fn before_unmount(&mut self) -> HookFuture {
        ready()
    }

    fn on_unmounted(&mut self) {}

    fn update(&mut self, _time: f64, _dt: f64) {}

    /// Called for every registered node, mounted or not.
    fn resize(&mut self, _width: u32, _height: u32) {}

    fn dispose(&mut self) {}
}
