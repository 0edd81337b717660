//! Hot-reload scenarios driven through the public engine API.
//!
//! The scripting side is the line-oriented recording runtime, so every test
//! can see exactly which mirrors were created, invoked and released.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use ember_core::script::recording::{Journal, RecordingRuntime};
use ember_core::{
    BindContext, BindingFailure, Bridge, BridgeState, Component, ComponentStore, Engine,
    EngineError, EntityId, FrameContext, Hook, ImageSource, MirrorOwner, NativeTable, ReloadKind,
    ReloadPhase, System, SystemError, TypeKind,
};

const GAME: &str = "\
component Game.DebugName init destroy
component Game.Orphan
system    Game.SceneSystem enable disable update
system    Game.Broken fail:update
";

#[derive(Debug, Default)]
struct DebugName {
    name: String,
}

impl Component for DebugName {
    const TYPE_NAME: &'static str = "Game.DebugName";
}

#[derive(Debug, Default, PartialEq)]
struct Orphan(u32);

impl Component for Orphan {
    const TYPE_NAME: &'static str = "Game.Orphan";
}

#[derive(Default)]
struct SceneSystem {
    frames: u64,
}

impl System for SceneSystem {
    const TYPE_NAME: &'static str = "Game.SceneSystem";

    fn update(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        self.frames += 1;
        Ok(())
    }
}

#[derive(Default)]
struct Broken;

impl System for Broken {
    const TYPE_NAME: &'static str = "Game.Broken";
}

fn engine_with(image: ImageSource) -> (Engine, Journal) {
    let runtime = RecordingRuntime::new();
    let journal = runtime.journal();
    let engine = Engine::builder()
        .runtime(runtime)
        .image(image)
        .build()
        .expect("engine starts");
    (engine, journal)
}

fn game_engine() -> (Engine, Journal) {
    engine_with(ImageSource::inline("game", GAME))
}

struct TempImage(PathBuf);

impl TempImage {
    fn new(name: &str, text: &str) -> Self {
        let path =
            std::env::temp_dir().join(format!("ember-core-{}-{name}.txt", std::process::id()));
        std::fs::write(&path, text).unwrap();
        Self(path)
    }

    fn rewrite(&self, text: &str) {
        std::fs::write(&self.0, text).unwrap();
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn test_reload_preserves_native_component_state() {
    let (mut engine, journal) = game_engine();
    let w = engine.create_world("main");

    let world = engine.get_world_mut(w).unwrap();
    let e1 = world.create_entity();
    world.add_component::<DebugName>(e1).unwrap().name = "x".into();
    assert!(world.mirror_bound::<DebugName>(e1));
    let before = world.store().mirror::<DebugName>(e1).unwrap();

    let report = engine.reload().expect("engine is running");
    assert_eq!(report.kind, ReloadKind::Forced);
    assert_eq!(report.generation, 2);
    assert_eq!(report.released, 1);
    assert_eq!(report.rebound, 1);
    assert!(report.is_clean());

    let world = engine.get_world_mut(w).unwrap();
    assert!(world.has_entity(e1));
    assert_eq!(world.get_component::<DebugName>(e1).unwrap().name, "x");
    assert!(world.mirror_bound::<DebugName>(e1));

    let after = world.store().mirror::<DebugName>(e1).unwrap();
    assert_ne!(before.object(), after.object());
    assert_eq!(after.generation(), 2);
    assert!(!engine.bridge().is_current(before));

    // Init ran once per generation; the reload released without Destroy.
    assert_eq!(journal.count("Game.DebugName", Hook::Init), 2);
    assert_eq!(journal.count("Game.DebugName", Hook::Destroy), 0);
}

#[test]
fn test_binding_failure_leaves_instance_inert() {
    let image = TempImage::new("binding", GAME);
    let (mut engine, journal) = engine_with(ImageSource::file(&image.0));
    let w = engine.create_world("main");

    let world = engine.get_world_mut(w).unwrap();
    let e = world.create_entity();
    world.add_component_with(e, || Orphan(7));
    assert!(world.mirror_bound::<Orphan>(e));

    image.rewrite(&GAME.replace("component Game.Orphan\n", ""));
    let report = engine.reload_if_changed().expect("image changed");
    assert_eq!(report.unbound, vec![Orphan::INFO.hash]);
    assert_eq!(report.failed, 1);
    assert!(report.image_errors.is_empty());

    let world = engine.get_world_mut(w).unwrap();
    assert_eq!(world.get_component::<Orphan>(e), Some(&mut Orphan(7)));
    assert!(!world.mirror_bound::<Orphan>(e));

    // Nothing changed on disk: no reload.
    assert!(engine.reload_if_changed().is_none());

    // The type comes back, and so does the mirror.
    image.rewrite(GAME);
    let report = engine.reload_if_changed().expect("image changed");
    assert!(report.unbound.is_empty());
    assert!(engine.get_world(w).unwrap().mirror_bound::<Orphan>(e));
    assert_eq!(journal.created("Game.Orphan"), 2);
}

#[test]
fn test_broken_image_on_reload_is_not_fatal() {
    let image = TempImage::new("broken", GAME);
    let (mut engine, _) = engine_with(ImageSource::file(&image.0));
    let w = engine.create_world("main");
    let world = engine.get_world_mut(w).unwrap();
    let e = world.create_entity();
    world.add_component::<DebugName>(e);

    image.rewrite("component Game.DebugName bogus_hook");
    let report = engine.reload().expect("engine is running");
    assert_eq!(report.image_errors.len(), 1);
    assert!(!report.is_clean());

    let world = engine.get_world_mut(w).unwrap();
    assert!(world.has_component::<DebugName>(e));
    assert!(!world.mirror_bound::<DebugName>(e));
    assert_eq!(engine.run_frame(0.016).update.failed, 0);
}

#[test]
fn test_worlds_have_independent_system_registries() {
    let (mut engine, _) = game_engine();
    let w1 = engine.create_world("one");
    let w2 = engine.create_world("two");
    engine.get_world_mut(w1).unwrap().add_system::<SceneSystem>();
    engine.get_world_mut(w2).unwrap().add_system::<SceneSystem>();

    assert!(engine.get_world_mut(w1).unwrap().remove_system::<SceneSystem>());

    let two = engine.get_world(w2).unwrap();
    assert!(two.system::<SceneSystem>().is_some());
    assert!(two.systems().mirror_bound::<SceneSystem>(engine.bridge()));
    assert!(engine.get_world(w1).unwrap().system::<SceneSystem>().is_none());

    engine.run_frame(0.016);
    let frames = engine.get_world(w2).unwrap().system::<SceneSystem>().unwrap().frames;
    assert_eq!(frames, 1);
}

#[test]
fn test_failing_hook_does_not_stop_the_pass() {
    let (mut engine, journal) = game_engine();
    engine.add_global_system::<Broken>();
    engine.add_global_system::<SceneSystem>();

    let report = engine.run_frame(0.016);
    assert_eq!(report.update.failed, 1);
    assert_eq!(report.update.ran, 1);
    assert_eq!(journal.count("Game.SceneSystem", Hook::Update), 1);
    assert_eq!(engine.global_systems().len(), 2);

    // Still registered, still failing, every frame.
    assert_eq!(engine.run_frame(0.016).update.failed, 1);
}

#[test]
fn test_system_lifecycle_hooks_reach_the_mirror() {
    let (mut engine, journal) = game_engine();
    let w = engine.create_world("main");
    engine.get_world_mut(w).unwrap().add_system::<SceneSystem>();
    engine.get_world_mut(w).unwrap().set_active(false);
    engine.get_world_mut(w).unwrap().set_active(true);
    engine.destroy_world(w);

    assert_eq!(
        journal.hooks_of("Game.SceneSystem"),
        vec![Hook::Enable, Hook::Disable, Hook::Enable, Hook::Disable]
    );
}

#[test]
fn test_inactive_world_binds_lazily() {
    let (mut engine, _) = game_engine();
    let w = engine.create_world("staging");
    let world = engine.get_world_mut(w).unwrap();
    world.set_active(false);

    let a = world.create_entity();
    let b = world.create_entity();
    world.add_component::<DebugName>(a);
    world.add_component::<DebugName>(b);
    assert!(!world.mirror_bound::<DebugName>(a));

    // First access binds.
    world.get_component::<DebugName>(a);
    assert!(world.mirror_bound::<DebugName>(a));
    assert!(!world.mirror_bound::<DebugName>(b));

    // Activation binds the rest.
    world.set_active(true);
    assert!(world.mirror_bound::<DebugName>(b));
}

#[test]
fn test_destroy_entity_fires_destroy_and_clears_queries() {
    let (mut engine, journal) = game_engine();
    let w = engine.create_world("main");
    let world = engine.get_world_mut(w).unwrap();
    let e = world.create_entity();
    world.add_component::<DebugName>(e);
    world.add_component::<Orphan>(e);

    assert!(world.destroy_entity(e));
    assert!(!world.has_component::<DebugName>(e));
    assert!(!world.has_component::<Orphan>(e));
    assert!(world.entities_with(&[DebugName::INFO.hash]).is_empty());
    assert!(world.entities_with(&[Orphan::INFO.hash]).is_empty());
    assert_eq!(journal.count("Game.DebugName", Hook::Destroy), 1);
    assert_eq!(engine.bridge().live_objects(), 0);
}

#[test]
fn test_recreate_mirror_round_trip() {
    let runtime = RecordingRuntime::new();
    let bridge = Bridge::new(Box::new(runtime), NativeTable::default());
    bridge.start(vec![ImageSource::inline("game", GAME)]).unwrap();
    let ctx = BindContext::new(&bridge, None, true);

    let mut store = ComponentStore::new();
    let e = EntityId::new(0, 0);
    store.add_with(ctx, e, || DebugName { name: "kept".into() });
    let before = store.mirror::<DebugName>(e).unwrap();

    let (released, report) = store.recreate_all_mirrors(ctx);
    assert_eq!(released, 1);
    assert_eq!(report.bound, 1);

    let after = store.mirror::<DebugName>(e).unwrap();
    assert_ne!(before, after);
    assert!(bridge.is_current(after));
    assert_eq!(after.generation(), bridge.generation());
    assert_eq!(store.get_ref::<DebugName>(e).unwrap().name, "kept");
}

#[test]
fn test_signal_drives_reload_between_frames() {
    let (mut engine, _) = game_engine();
    let signal = engine.signal().clone();

    // A plain request with unchanged images is dropped.
    signal.request();
    assert!(engine.run_frame(0.016).reload.is_none());
    assert!(!signal.is_pending());

    signal.force();
    let report = engine.run_frame(0.016).reload.expect("forced reload");
    assert_eq!(report.generation, 2);
}

#[test]
fn test_reload_callbacks_bracket_the_reload() {
    let (mut engine, _) = game_engine();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let pre = Arc::clone(&seen);
    let bridge = Arc::clone(engine.bridge());
    engine.on_pre_reload(move |event| {
        pre.lock().push((event.phase, event.generation, bridge.state()));
    });
    let post = Arc::clone(&seen);
    engine.on_post_reload(move |event| {
        post.lock().push((event.phase, event.generation, BridgeState::Loaded));
    });

    engine.reload();
    assert_eq!(
        *seen.lock(),
        vec![
            (ReloadPhase::Pre, 1, BridgeState::Loaded),
            (ReloadPhase::Post, 2, BridgeState::Loaded),
        ]
    );
}

#[test]
fn test_startup_failures_are_fatal() {
    let err = Engine::builder()
        .runtime(RecordingRuntime::refusing_start())
        .build()
        .unwrap_err();
    assert!(matches!(err, EngineError::FatalInit(_)));

    let err = Engine::builder()
        .runtime(RecordingRuntime::new())
        .image(ImageSource::file("/no/such/dir/game.txt"))
        .build()
        .unwrap_err();
    assert!(matches!(err, EngineError::FatalInit(_)));
}

#[test]
fn test_shutdown_unloads_everything() {
    let (mut engine, journal) = game_engine();
    let w = engine.create_world("main");
    let world = engine.get_world_mut(w).unwrap();
    let e = world.create_entity();
    world.add_component::<DebugName>(e);
    engine.add_global_system::<SceneSystem>();

    let bridge = Arc::clone(engine.bridge());
    engine.shutdown();
    assert_eq!(bridge.state(), BridgeState::Unloaded);
    assert_eq!(bridge.live_objects(), 0);
    assert_eq!(bridge.stats().live_mirrors, 0);
    assert_eq!(journal.count("Game.DebugName", Hook::Destroy), 1);
    assert_eq!(journal.count("Game.SceneSystem", Hook::Disable), 1);
}

#[test]
fn test_reload_releases_system_and_component_mirrors() {
    let (mut engine, journal) = game_engine();
    engine.add_global_system::<SceneSystem>();
    let w = engine.create_world("main");
    let world = engine.get_world_mut(w).unwrap();
    world.add_system::<SceneSystem>();
    let e = world.create_entity();
    world.add_component::<DebugName>(e);
    world.add_component::<Orphan>(e);

    let report = engine.reload().expect("engine is running");
    assert_eq!(report.released, 4);
    assert_eq!(report.rebound, 4);
    assert_eq!(engine.bridge().stats().live_mirrors, 4);

    // A second pass finds nothing stale left to release.
    let world = engine.get_world_mut(w).unwrap();
    assert_eq!(world.invalidate_mirrors(), 3);
    assert_eq!(world.invalidate_mirrors(), 0);
    assert_eq!(journal.count("Game.DebugName", Hook::Destroy), 0);
}

#[test]
fn test_remove_entity_releases_every_mirror() {
    let runtime = RecordingRuntime::new();
    let journal = runtime.journal();
    let bridge = Bridge::new(Box::new(runtime), NativeTable::default());
    bridge.start(vec![ImageSource::inline("game", GAME)]).unwrap();
    let ctx = BindContext::new(&bridge, None, true);

    let mut store = ComponentStore::new();
    let e = EntityId::new(0, 0);
    let other = EntityId::new(1, 0);
    store.add_with(ctx, e, DebugName::default);
    store.add_with(ctx, e, || Orphan(1));
    store.add_with(ctx, other, || Orphan(2));
    assert_eq!(bridge.stats().live_mirrors, 3);

    assert_eq!(store.remove_entity(&bridge, e), 2);
    assert_eq!(store.remove_entity(&bridge, e), 0);
    assert!(!store.view().has_component(e, DebugName::INFO.hash));
    assert!(store.view().has_component(other, Orphan::INFO.hash));
    assert_eq!(bridge.stats().live_mirrors, 1);
    assert_eq!(journal.count("Game.DebugName", Hook::Destroy), 1);
}

#[test]
fn test_source_file_edit_is_a_change() {
    let script = TempImage::new("names.src", "version 1");
    let image = TempImage::new(
        "sourced",
        &format!("source {}\ncomponent Game.DebugName init destroy\n", script.0.display()),
    );
    let (mut engine, _) = engine_with(ImageSource::file(&image.0));
    assert!(engine.bridge().sources().contains(&script.0));
    assert!(engine.bridge().watch_list().paths().contains(&image.0));
    assert!(engine.reload_if_changed().is_none());

    // The image text is untouched; only the file it names changes.
    script.rewrite("version 2");
    assert!(engine.bridge().images_changed());
    let report = engine.reload_if_changed().expect("source changed");
    assert_eq!(report.generation, 2);
    assert!(engine.reload_if_changed().is_none());

    // Missing and restored sources both count.
    std::fs::remove_file(&script.0).unwrap();
    assert!(engine.reload_if_changed().is_some());
    script.rewrite("version 2");
    assert!(engine.reload_if_changed().is_some());
    assert_eq!(engine.bridge().generation(), 4);
}

#[test]
fn test_no_reload_after_shutdown() {
    let (mut engine, journal) = game_engine();
    let bridge = Arc::clone(engine.bridge());
    let signal = engine.signal().clone();
    engine.shutdown();
    assert!(engine.is_shut_down());
    let loads = journal.events().len();

    signal.force();
    assert!(engine.run_frame(0.016).reload.is_none());
    assert!(!signal.is_pending());

    signal.request();
    assert!(engine.poll_reload().is_none());
    assert!(engine.reload().is_none());
    assert!(engine.reload_if_changed().is_none());

    assert_eq!(bridge.state(), BridgeState::Unloaded);
    assert_eq!(bridge.generation(), 1);
    assert_eq!(bridge.stats().reloads, 0);
    assert_eq!(journal.events().len(), loads);
    assert!(engine.directory().is_empty());
}

#[test]
fn test_kind_mismatch_is_a_binding_failure() {
    // DebugName is a native component; the image declares a system of that name.
    let (mut engine, journal) = engine_with(ImageSource::inline(
        "game",
        "system Game.DebugName init\nsystem Game.SceneSystem update\n",
    ));
    let w = engine.create_world("main");
    let world = engine.get_world_mut(w).unwrap();
    let e = world.create_entity();
    world.add_component::<DebugName>(e);
    world.add_system::<SceneSystem>();
    assert!(world.has_component::<DebugName>(e));
    assert!(!world.mirror_bound::<DebugName>(e));
    assert!(world.systems().mirror_bound::<SceneSystem>(world.bridge()));
    assert_eq!(journal.created("Game.DebugName"), 0);

    let owner = MirrorOwner {
        world: Some(w),
        entity: Some(e),
        type_hash: DebugName::INFO.hash,
    };
    assert_eq!(owner.kind(), TypeKind::Component);
    assert!(matches!(
        engine.bridge().create_mirror(&owner),
        Err(BindingFailure::KindMismatch {
            native: TypeKind::Component,
            declared: TypeKind::System,
            ..
        })
    ));

    let report = engine.reload().expect("engine is running");
    assert_eq!(report.unbound, vec![DebugName::INFO.hash]);
    assert_eq!(report.failed, 1);
    assert_eq!(engine.run_frame(0.016).update.failed, 0);
}
