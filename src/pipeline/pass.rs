//! Render passes and the ordered pipeline that runs them.

use std::cell::RefCell;

use futures_util::FutureExt;
use futures_util::future::join_all;

use crate::backend::{CameraHandle, FrameTiming, RenderTarget, SceneHandle};
use crate::error::LifecycleError;
use crate::nodes::node::{HookFuture, ready};

/// What a pass renders this frame.
pub struct PassContext<'a> {
    pub scene: SceneHandle,
    pub camera: CameraHandle,
    pub target: &'a RefCell<dyn RenderTarget>,
}

/// One step of a pipeline. Lifecycle hooks mirror [`Node`](crate::nodes::node::Node).
pub trait Pass {
    fn name(&self) -> &str;

    fn before_mount(&mut self) -> HookFuture {
        ready()
    }

    fn on_mounted(&mut self) {}

    fn before_unmount(&mut self) -> HookFuture {
        ready()
    }

    fn on_unmounted(&mut self) {}

    /// Must not fail: problems degrade to a simpler render.
    fn render(&mut self, frame: &FrameTiming, ctx: &PassContext<'_>);

    fn resize(&mut self, _width: u32, _height: u32) {}

    fn dispose(&mut self) {}
}

/// Ordered passes run once per frame.
#[derive(Default)]
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.passes.iter().map(|p| p.name()))
            .finish()
    }
}

async fn settle(hooks: Vec<HookFuture>) -> Result<(), LifecycleError> {
    join_all(hooks).await.into_iter().collect()
}

impl Pipeline {
    pub fn new(passes: Vec<Box<dyn Pass>>) -> Self {
        Self { passes }
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Setup every pass concurrently.
    pub fn before_mount(&mut self) -> HookFuture {
        let hooks: Vec<HookFuture> = self.passes.iter_mut().map(|p| p.before_mount()).collect();
        settle(hooks).boxed_local()
    }

    pub fn on_mounted(&mut self) {
        for pass in &mut self.passes {
            pass.on_mounted();
        }
    }

    pub fn before_unmount(&mut self) -> HookFuture {
        let hooks: Vec<HookFuture> = self.passes.iter_mut().map(|p| p.before_unmount()).collect();
        settle(hooks).boxed_local()
    }

    pub fn on_unmounted(&mut self) {
        for pass in &mut self.passes {
            pass.on_unmounted();
        }
    }

    pub fn render(&mut self, frame: &FrameTiming, ctx: &PassContext<'_>) {
        for pass in &mut self.passes {
            pass.render(frame, ctx);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        for pass in &mut self.passes {
            pass.resize(width, height);
        }
    }

    pub fn dispose(&mut self) {
        for pass in &mut self.passes {
            pass.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LifecycleStage;
    use std::rc::Rc;

    struct Counting {
        name: &'static str,
        renders: Rc<RefCell<Vec<&'static str>>>,
        fail_setup: bool,
    }

    impl Pass for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn before_mount(&mut self) -> HookFuture {
            if self.fail_setup {
                let err = LifecycleError::new(LifecycleStage::BeforeMount, self.name, "no shader");
                return futures_util::future::ready(Err(err)).boxed_local();
            }
            ready()
        }

        fn render(&mut self, _frame: &FrameTiming, _ctx: &PassContext<'_>) {
            self.renders.borrow_mut().push(self.name);
        }
    }

    #[test]
    fn passes_render_in_order() {
        let renders = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = Pipeline::new(vec![
            Box::new(Counting {
                name: "first",
                renders: renders.clone(),
                fail_setup: false,
            }),
            Box::new(Counting {
                name: "second",
                renders: renders.clone(),
                fail_setup: false,
            }),
        ]);
        let target = RefCell::new(crate::backend::headless::HeadlessTarget::new(1, 1));
        let ctx = PassContext {
            scene: SceneHandle(1),
            camera: CameraHandle(2),
            target: &target,
        };
        pipeline.render(&FrameTiming::default(), &ctx);
        assert_eq!(*renders.borrow(), vec!["first", "second"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn setup_failure_surfaces_after_all_passes() {
        let renders = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = Pipeline::new(vec![
            Box::new(Counting {
                name: "bad",
                renders: renders.clone(),
                fail_setup: true,
            }),
            Box::new(Counting {
                name: "good",
                renders,
                fail_setup: false,
            }),
        ]);
        let err = pipeline.before_mount().await.unwrap_err();
        assert_eq!(err.subject, "bad");
    }
}
