//! Box nodes of the demo scene.
//!
//! Each box starts hidden (scale 0), grows in from `on_mounted` without
//! being awaited and shrinks out in `before_unmount`, which the graph awaits
//! before detaching it.

use std::cell::Cell;
use std::rc::Rc;

use futures_util::FutureExt;

use crate::backend::ObjectHandle;
use crate::nodes::node::{EntryEffect, HookFuture, Node, ready};
use crate::nodes::tween::{self, Easing, Tween};

pub const NODE_1: &str = "node-1";
pub const NODE_1B: &str = "node-1b";
pub const NODE_2: &str = "node-2";

/// Radians added to the box rotation every frame.
const SPIN_PER_FRAME: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
struct Motion {
    seconds: f32,
    easing: Easing,
}

pub struct BoxNode {
    id: &'static str,
    name: &'static str,
    object: ObjectHandle,
    enter: Motion,
    exit: Motion,
    scale: Rc<Cell<f32>>,
    rotation: f32,
}

impl BoxNode {
    fn new(
        id: &'static str,
        name: &'static str,
        object: ObjectHandle,
        enter: Motion,
        exit: Motion,
    ) -> Self {
        Self {
            id,
            name,
            object,
            enter,
            exit,
            scale: Rc::new(Cell::new(0.0)),
            rotation: 0.0,
        }
    }

    /// Pops in with an overshoot, leaves slowly.
    pub fn node_1(object: ObjectHandle) -> Self {
        Self::new(
            NODE_1,
            "Node 1",
            object,
            Motion {
                seconds: 0.8,
                easing: Easing::BackOut(1.7),
            },
            Motion {
                seconds: 1.4,
                easing: Easing::CubicIn,
            },
        )
    }

    pub fn node_1b(object: ObjectHandle) -> Self {
        Self::new(
            NODE_1B,
            "Node 1B",
            object,
            Motion {
                seconds: 1.1,
                easing: Easing::ExpoOut,
            },
            Motion {
                seconds: 0.6,
                easing: Easing::QuadIn,
            },
        )
    }

    pub fn node_2(object: ObjectHandle) -> Self {
        Self::new(
            NODE_2,
            "Node 2",
            object,
            Motion {
                seconds: 1.6,
                easing: Easing::ExpoOut,
            },
            Motion {
                seconds: 0.5,
                easing: Easing::QuadIn,
            },
        )
    }

    /// Shared handle to the current uniform scale.
    pub fn scale(&self) -> Rc<Cell<f32>> {
        self.scale.clone()
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }
}

fn scale_to(scale: Rc<Cell<f32>>, to: f32, motion: Motion) -> impl Future<Output = ()> {
    let tween = Tween::new(scale.get(), to, motion.seconds).with_easing(motion.easing);
    tween::play(tween, move |value| scale.set(value))
}

impl Node for BoxNode {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn renderable(&self) -> Option<ObjectHandle> {
        Some(self.object)
    }

    fn before_mount(&mut self) -> HookFuture {
        // Entry always starts from hidden.
        self.scale.set(0.0);
        ready()
    }

    fn on_mounted(&mut self) -> Option<EntryEffect> {
        Some(scale_to(self.scale.clone(), 1.0, self.enter).boxed_local())
    }

    fn before_unmount(&mut self) -> HookFuture {
        let exit = scale_to(self.scale.clone(), 0.0, self.exit);
        async move {
            exit.await;
            Ok(())
        }
        .boxed_local()
    }

    fn update(&mut self, _time: f64, _dt: f64) {
        self.rotation += SPIN_PER_FRAME;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn exit_shrinks_from_current_scale() {
        let mut node = BoxNode::node_2(ObjectHandle(1));
        node.scale().set(0.75);
        let exit = node.before_unmount();
        exit.await.unwrap();
        assert_eq!(node.scale().get(), 0.0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn entry_grows_to_full_size() {
        let mut node = BoxNode::node_1b(ObjectHandle(1));
        node.before_mount().await.unwrap();
        let effect = node.on_mounted().unwrap();
        let scale = node.scale();
        let start = tokio::time::Instant::now();
        effect.await;
        assert!((scale.get() - 1.0).abs() < 1e-4);
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
