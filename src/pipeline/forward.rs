//! Direct scene render.

use crate::backend::FrameTiming;
use crate::pipeline::pass::{Pass, PassContext};

/// Renders the context's scene through its camera straight to the target.
#[derive(Debug, Default)]
pub struct ForwardRenderPass;

impl ForwardRenderPass {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for ForwardRenderPass {
    fn name(&self) -> &str {
        "forward"
    }

    fn render(&mut self, frame: &FrameTiming, ctx: &PassContext<'_>) {
        ctx.target.borrow_mut().render(ctx.scene, ctx.camera, frame);
    }
}
