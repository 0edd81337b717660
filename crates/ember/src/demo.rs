//! Native types the bundled scripts mirror.

use ember_core::{Component, Engine, EngineResult, FrameContext, System, SystemError, WorldId};
use tracing::debug;

/// Human-readable label.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugName {
    /// The label.
    pub label: String,
}

impl Component for DebugName {
    const TYPE_NAME: &'static str = "Game.DebugName";
}

/// Seconds an entity has left to live.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Lifetime {
    /// Remaining time, never negative.
    pub remaining: f32,
}

impl Component for Lifetime {
    const TYPE_NAME: &'static str = "Game.Lifetime";
}

/// Added by scripts to an entity whose lifetime ran out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Expired;

impl Component for Expired {
    const TYPE_NAME: &'static str = "Game.Expired";
}

/// Counts lifetimes down every frame.
#[derive(Debug, Default)]
pub struct SceneSystem {
    /// Entities whose lifetime reached zero during the last update.
    pub expired_last_frame: usize,
    /// Named entities seen during the last draw.
    pub named: usize,
}

impl System for SceneSystem {
    const TYPE_NAME: &'static str = "Game.SceneSystem";

    fn init(&mut self, world: Option<WorldId>) {
        debug!(?world, "scene system attached");
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        let delta = ctx.delta_time;
        let Some((store, _)) = ctx.store_mut() else {
            return Err("scene system needs a world".into());
        };

        self.expired_last_frame = 0;
        for (_, lifetime) in store.iter_mut::<Lifetime>() {
            if lifetime.remaining > 0.0 {
                lifetime.remaining = (lifetime.remaining - delta).max(0.0);
                if lifetime.remaining <= 0.0 {
                    self.expired_last_frame += 1;
                }
            }
        }
        Ok(())
    }

    fn draw(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        let frame = ctx.frame;
        if let Some((store, _)) = ctx.store_mut() {
            self.named = store.len::<DebugName>();
            debug!(frame, named = self.named, "scene drawn");
        }
        Ok(())
    }
}

/// Registers every demo type so scripts can add them by hash.
///
/// # Errors
///
/// A type collision with an already registered type.
pub fn register(engine: &mut Engine) -> EngineResult<()> {
    engine.register_component::<DebugName>()?;
    engine.register_component::<Lifetime>()?;
    engine.register_component::<Expired>()?;
    engine.register_system::<SceneSystem>()?;
    Ok(())
}

/// Creates a world with `count` named entities, each living one second longer
/// than the previous one.
///
/// # Errors
///
/// Never in practice; the world is created just before it is looked up.
pub fn populate(engine: &mut Engine, name: &str, count: u32) -> EngineResult<WorldId> {
    let id = engine.create_world(name);
    let world = engine.world_mut(id)?;
    world.add_system::<SceneSystem>();
    for i in 0..count {
        let entity = world.create_entity();
        world.add_component_with(entity, || DebugName {
            label: format!("{name}-{i}"),
        });
        #[allow(clippy::cast_precision_loss)]
        let remaining = (i + 1) as f32;
        world.add_component_with(entity, || Lifetime { remaining });
    }
    Ok(id)
}
