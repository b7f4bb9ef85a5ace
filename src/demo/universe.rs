//! The main demo universe: three boxes and two contracts, toggled by click.

use std::rc::{Rc, Weak};

use log::info;

use crate::backend::{CameraHandle, ObjectHandle, SharedScene};
use crate::demo::nodes::{BoxNode, NODE_1, NODE_1B, NODE_2};
use crate::events::input::{Input, InputEventKind, InputSubscriptions};
use crate::nodes::node::{HookFuture, Node, ready};
use crate::pipeline::forward::ForwardRenderPass;
use crate::pipeline::pass::{Pass, Pipeline};
use crate::systems::device::DeviceSlice;
use crate::universes::contract::Contract;
use crate::universes::universe::{Universe, UniverseBuilder, UniverseHooks};

pub const MAIN_UNIVERSE: &str = "main";
pub const MAIN_PRELOAD_GROUP: &str = "universe:main";

/// Backend objects the main universe renders.
#[derive(Debug, Clone, Copy)]
pub struct MainSceneParts {
    pub camera: CameraHandle,
    pub boxes: [ObjectHandle; 3],
}

struct MainHooks {
    input: Input,
    boxes: [ObjectHandle; 3],
    registered: bool,
    subscriptions: InputSubscriptions,
}

impl UniverseHooks for MainHooks {
    fn setup(&mut self, universe: &Universe) -> HookFuture {
        if !self.registered {
            let [a, b, c] = self.boxes;
            let nodes: [Box<dyn Node>; 3] = [
                Box::new(BoxNode::node_1(a)),
                Box::new(BoxNode::node_1b(b)),
                Box::new(BoxNode::node_2(c)),
            ];
            universe.graph().add_many(nodes);
            self.registered = true;
        }
        ready()
    }

    fn on_mounted(&mut self, universe: &Rc<Universe>) {
        let universe: Weak<Universe> = Rc::downgrade(universe);
        let sub = self.input.subscribe(InputEventKind::MouseDown, move |_| {
            let Some(universe) = universe.upgrade() else {
                return;
            };
            let next = next_contract(universe.current_contract_id().as_deref());
            info!("click: swapping to {}", next);
            universe.spawn_contract(next);
        });
        self.subscriptions.push(sub);
    }

    fn before_unmount(&mut self, _universe: &Universe) {
        self.subscriptions.clear();
    }
}

/// Contract the click toggles to from `current`.
pub fn next_contract(current: Option<&str>) -> &'static str {
    match current {
        Some(NODE_1) => NODE_2,
        _ => NODE_1,
    }
}

/// Build the main universe on `scene`.
pub fn main_universe(
    slice: &DeviceSlice,
    scene: SharedScene,
    parts: MainSceneParts,
) -> Rc<Universe> {
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(ForwardRenderPass::new())];
    UniverseBuilder::new(MAIN_UNIVERSE, scene, parts.camera)
        .pipeline(Pipeline::new(passes))
        .assets(slice.assets.clone())
        .preload_group(MAIN_PRELOAD_GROUP)
        .contract(Contract::new(NODE_1, [NODE_1, NODE_1B]))
        .contract(Contract::new(NODE_2, [NODE_1B, NODE_2]))
        .initial_contract(NODE_1)
        .hooks(MainHooks {
            input: slice.input.clone(),
            boxes: parts.boxes,
            registered: false,
            subscriptions: InputSubscriptions::new(),
        })
        .build()
}
