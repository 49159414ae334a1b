//! The explicit context handed to every mind.

use std::rc::Rc;

use chorus_bus::EventBus;
use chorus_world::WorldState;

use crate::stage::{NullStage, Stage};

/// Shared handles a mind needs to perceive and act.
///
/// Cloning is cheap: every field is a reference-counted handle onto the
/// same bus, world and stage.
#[derive(Clone)]
pub struct Context {
    /// The message bus.
    pub bus: EventBus,
    /// The shared world document.
    pub world: WorldState,
    /// The audio/visual collaborator.
    pub stage: Rc<dyn Stage>,
}

impl Context {
    /// A context with no output backend attached.
    pub fn new(bus: EventBus, world: WorldState) -> Self {
        Self::with_stage(bus, world, Rc::new(NullStage::new()))
    }

    /// A context with an explicit stage.
    pub fn with_stage(bus: EventBus, world: WorldState, stage: Rc<dyn Stage>) -> Self {
        Self { bus, world, stage }
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("bus", &self.bus)
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}
