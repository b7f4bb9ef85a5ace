//! Lazy universe factory and instance cache.
//!
//! Definitions are registered up front; an instance is built the first time
//! its id is requested and reused afterwards. The registry does not drive
//! lifecycle, update or render.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::universes::universe::Universe;

pub type UniverseFactory = Rc<dyn Fn() -> Rc<Universe>>;

#[derive(Default)]
struct RegistryState {
    order: Vec<String>,
    definitions: FxHashMap<String, UniverseFactory>,
    instances: FxHashMap<String, Rc<Universe>>,
    default_id: Option<String>,
}

#[derive(Default)]
pub struct UniverseRegistry {
    state: RefCell<RegistryState>,
}

impl std::fmt::Debug for UniverseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("UniverseRegistry")
            .field("order", &state.order)
            .field("instances", &state.instances.len())
            .field("default_id", &state.default_id)
            .finish()
    }
}

impl UniverseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. The first definition flagged `is_default` wins.
    pub fn define(
        &self,
        id: impl Into<String>,
        factory: impl Fn() -> Rc<Universe> + 'static,
        is_default: bool,
    ) {
        let id = id.into();
        let mut state = self.state.borrow_mut();
        if state.definitions.insert(id.clone(), Rc::new(factory)).is_none() {
            state.order.push(id.clone());
        }
        if is_default && state.default_id.is_none() {
            state.default_id = Some(id);
        }
    }

    /// The id flagged default, or the first defined.
    pub fn default_id(&self) -> Option<String> {
        let state = self.state.borrow();
        state
            .default_id
            .clone()
            .or_else(|| state.order.first().cloned())
    }

    pub fn ids(&self) -> Vec<String> {
        self.state.borrow().order.clone()
    }

    /// Existing instance, or a new one from the definition.
    pub fn get_or_create(&self, id: &str) -> Option<Rc<Universe>> {
        let factory = {
            let state = self.state.borrow();
            if let Some(universe) = state.instances.get(id) {
                return Some(universe.clone());
            }
            state.definitions.get(id).cloned()?
        };
        debug!("creating universe {}", id);
        let universe = factory();
        let mut state = self.state.borrow_mut();
        // A factory that resolved the same id re-entrantly already stored one.
        Some(
            state
                .instances
                .entry(id.to_string())
                .or_insert(universe)
                .clone(),
        )
    }

    pub fn get_instance(&self, id: &str) -> Option<Rc<Universe>> {
        self.state.borrow().instances.get(id).cloned()
    }

    /// Dispose every instance and forget every definition.
    pub fn dispose_all(&self) {
        let instances: Vec<Rc<Universe>> = {
            let mut state = self.state.borrow_mut();
            let instances = state.instances.drain().map(|(_, u)| u).collect();
            state.definitions.clear();
            state.order.clear();
            state.default_id = None;
            instances
        };
        for universe in instances {
            universe.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HandleAllocator, HeadlessScene, as_shared};
    use crate::universes::universe::UniverseBuilder;
    use std::cell::Cell;

    fn factory(
        ids: &HandleAllocator,
        name: &'static str,
        calls: &Rc<Cell<usize>>,
    ) -> impl Fn() -> Rc<Universe> + 'static {
        let ids = ids.clone();
        let calls = calls.clone();
        move || {
            calls.set(calls.get() + 1);
            let scene = as_shared(&HeadlessScene::shared(ids.scene()));
            UniverseBuilder::new(name, scene, ids.camera()).build()
        }
    }

    #[test]
    fn instances_are_created_once() {
        let ids = HandleAllocator::new();
        let calls = Rc::new(Cell::new(0));
        let registry = UniverseRegistry::new();
        registry.define("main", factory(&ids, "main", &calls), false);

        let a = registry.get_or_create("main").unwrap();
        let b = registry.get_or_create("main").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);
        assert!(registry.get_or_create("other").is_none());
        assert!(registry.get_instance("other").is_none());
    }

    #[test]
    fn default_falls_back_to_first_definition() {
        let ids = HandleAllocator::new();
        let calls = Rc::new(Cell::new(0));
        let registry = UniverseRegistry::new();
        assert_eq!(registry.default_id(), None);
        registry.define("a", factory(&ids, "a", &calls), false);
        registry.define("b", factory(&ids, "b", &calls), false);
        assert_eq!(registry.default_id().as_deref(), Some("a"));
        registry.define("c", factory(&ids, "c", &calls), true);
        registry.define("d", factory(&ids, "d", &calls), true);
        assert_eq!(registry.default_id().as_deref(), Some("c"));
    }

    #[test]
    fn dispose_all_forgets_everything() {
        let ids = HandleAllocator::new();
        let calls = Rc::new(Cell::new(0));
        let registry = UniverseRegistry::new();
        registry.define("main", factory(&ids, "main", &calls), true);
        registry.get_or_create("main").unwrap();
        registry.dispose_all();
        assert!(registry.get_instance("main").is_none());
        assert!(registry.ids().is_empty());
        assert_eq!(registry.default_id(), None);
    }
}
