//! # Rhai Runtime
//!
//! Every loaded generation lives in one [`Domain`]: a Rhai engine with the
//! native table registered, the compiled AST of every declared type and the
//! object heap. Unloading drops the domain as a whole.
//!
//! ## Hook convention
//!
//! A hook is a script function named after the hook that takes the object
//! state and a context map and returns the new state:
//!
//! ```text
//! fn on_update(state, ctx) {
//!     state.frames += 1;
//!     state
//! }
//! ```
//!
//! `ctx` carries `world`, `entity`, `type_hash`, `frame` and `delta_time`.
//! World 0 and entity `-1` stand for "none". Returning `()` keeps the old
//! state.

use std::collections::HashMap;
use std::path::Path;

use ember_core::{
    DeclaredType, EntityId, Hook, HookArgs, HookSet, ImageSource, LoadedImage, MirrorOwner,
    NativeTable, ObjectId, ScriptError, ScriptRuntime, ScriptTypeId, TypeHash,
};
use rhai::{CallFnOptions, Dynamic, Engine, Map, Scope, AST, INT};
use tracing::{debug, info, warn};

use crate::manifest::{read_source, source_path, ImageManifest};

/// Tunables of the Rhai engine, applied to every domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RhaiConfig {
    /// Operation budget per hook call, 0 for unlimited.
    pub max_operations: u64,
    /// Maximum call stack depth.
    pub max_call_levels: usize,
}

impl Default for RhaiConfig {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
        }
    }
}

struct CompiledType {
    qualified_name: String,
    ast: AST,
    hooks: HookSet,
}

struct ScriptObject {
    script_type: ScriptTypeId,
    owner: MirrorOwner,
    state: Dynamic,
}

/// One loaded generation.
struct Domain {
    engine: Engine,
    types: Vec<CompiledType>,
    objects: HashMap<ObjectId, ScriptObject>,
}

impl Domain {
    fn new(config: RhaiConfig, natives: &NativeTable) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(config.max_operations);
        engine.set_max_call_levels(config.max_call_levels);
        engine.on_print(|text| info!(target: "ember_script", "{text}"));
        engine.on_debug(|text, source, pos| {
            debug!(target: "ember_script", source = source.unwrap_or(""), %pos, "{text}");
        });
        engine.register_fn("type_hash", |name: &str| to_int(TypeHash::of(name).get()));
        engine.register_fn("log", |message: &str| info!(target: "ember_script", "{message}"));
        register_natives(&mut engine, natives);

        Self {
            engine,
            types: Vec::new(),
            objects: HashMap::new(),
        }
    }
}

/// Exposes every native entry point to scripts, one Rhai function per entry.
fn register_natives(engine: &mut Engine, natives: &NativeTable) {
    for entry in natives.entries() {
        let func = entry.func;
        let ctx = natives.context().clone();
        match entry.arity {
            0 => {
                engine.register_fn(entry.name, move || func(&ctx, &[]));
            }
            1 => {
                engine.register_fn(entry.name, move |a: INT| func(&ctx, &[a]));
            }
            2 => {
                engine.register_fn(entry.name, move |a: INT, b: INT| func(&ctx, &[a, b]));
            }
            3 => {
                engine.register_fn(entry.name, move |a: INT, b: INT, c: INT| {
                    func(&ctx, &[a, b, c])
                });
            }
            arity => warn!(native = entry.name, arity, "native entry point not exposed to scripts"),
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn to_int(bits: u64) -> INT {
    bits as INT
}

fn context_map(owner: &MirrorOwner, args: &HookArgs) -> Map {
    let mut map = Map::new();
    map.insert("world".into(), Dynamic::from(to_int(owner.world.map_or(0, |w| w.get()))));
    map.insert(
        "entity".into(),
        Dynamic::from(owner.entity.map_or(-1, |e: EntityId| to_int(e.to_bits()))),
    );
    map.insert("type_hash".into(), Dynamic::from(to_int(owner.type_hash.get())));
    map.insert("frame".into(), Dynamic::from(to_int(args.frame)));
    map.insert("delta_time".into(), Dynamic::from(f64::from(args.delta_time)));
    map
}

/// Scripting runtime backed by Rhai.
pub struct RhaiRuntime {
    config: RhaiConfig,
    started: bool,
    domain: Option<Domain>,
    next_object: u64,
}

impl RhaiRuntime {
    /// Creates a runtime with `config`.
    #[must_use]
    pub fn new(config: RhaiConfig) -> Self {
        Self {
            config,
            started: false,
            domain: None,
            next_object: 0,
        }
    }

    /// Current state of a live object.
    #[must_use]
    pub fn state(&self, object: ObjectId) -> Option<&Dynamic> {
        self.domain.as_ref()?.objects.get(&object).map(|o| &o.state)
    }

    /// Qualified names of every type loaded in the current domain.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        self.domain
            .as_ref()
            .map(|d| d.types.iter().map(|t| t.qualified_name.as_str()).collect())
            .unwrap_or_default()
    }
}

impl Default for RhaiRuntime {
    fn default() -> Self {
        Self::new(RhaiConfig::default())
    }
}

impl std::fmt::Debug for RhaiRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiRuntime")
            .field("config", &self.config)
            .field("started", &self.started)
            .field("types", &self.type_names())
            .field("objects", &self.live_objects())
            .finish()
    }
}

impl ScriptRuntime for RhaiRuntime {
    fn name(&self) -> &str {
        "rhai"
    }

    fn start(&mut self) -> Result<(), ScriptError> {
        self.started = true;
        info!(max_operations = self.config.max_operations, "rhai runtime started");
        Ok(())
    }

    fn load_image(
        &mut self,
        image: &ImageSource,
        natives: &NativeTable,
    ) -> Result<LoadedImage, ScriptError> {
        if !self.started {
            return Err(ScriptError::NotStarted);
        }
        let text = image.read_text()?;
        let manifest = ImageManifest::parse(&image.name, &text)?;
        let base = image.path().and_then(Path::parent);

        // A broken image contributes no types.
        let config = self.config;
        let domain = self.domain.get_or_insert_with(|| Domain::new(config, natives));
        let mut compiled = Vec::with_capacity(manifest.types.len());
        let mut sources = Vec::new();
        for decl in &manifest.types {
            let qualified_name = decl.qualified_name();
            sources.extend(source_path(decl, base));
            let source = read_source(&image.name, decl, base)?;
            let ast = domain.engine.compile(&source).map_err(|err| ScriptError::Compile {
                name: qualified_name.clone(),
                reason: err.to_string(),
            })?;

            let mut hooks = HookSet::EMPTY;
            for function in ast.iter_functions() {
                let Some(hook) = Hook::from_name(function.name) else {
                    continue;
                };
                if function.params.len() == 2 {
                    hooks.insert(hook);
                } else {
                    warn!(
                        image = %image.name,
                        type_name = %qualified_name,
                        hook = function.name,
                        "hook must take (state, ctx), ignored"
                    );
                }
            }
            compiled.push((decl.kind, CompiledType { qualified_name, ast, hooks }));
        }

        let mut declared = Vec::with_capacity(compiled.len());
        for (kind, ty) in compiled {
            let index = u32::try_from(domain.types.len()).map_err(|_| ScriptError::InvalidImage {
                image: image.name.clone(),
                reason: "too many types".into(),
            })?;
            declared.push(DeclaredType {
                qualified_name: ty.qualified_name.clone(),
                kind: kind.into(),
                script_type: ScriptTypeId(index),
                hooks: ty.hooks,
            });
            domain.types.push(ty);
        }

        debug!(
            image = %image.name,
            manifest = manifest.name.as_deref().unwrap_or(""),
            types = declared.len(),
            "image compiled"
        );
        Ok(LoadedImage {
            types: declared,
            sources,
        })
    }

    fn create_object(
        &mut self,
        script_type: ScriptTypeId,
        owner: &MirrorOwner,
    ) -> Result<ObjectId, ScriptError> {
        let domain = self.domain.as_mut().ok_or(ScriptError::NotStarted)?;
        if domain.types.get(script_type.0 as usize).is_none() {
            return Err(ScriptError::UnknownType(script_type));
        }

        self.next_object += 1;
        let object = ObjectId::new(self.next_object);
        domain.objects.insert(
            object,
            ScriptObject {
                script_type,
                owner: *owner,
                state: Dynamic::from_map(Map::new()),
            },
        );
        Ok(object)
    }

    fn release_object(&mut self, object: ObjectId) -> bool {
        self.domain
            .as_mut()
            .is_some_and(|domain| domain.objects.remove(&object).is_some())
    }

    fn invoke(&mut self, object: ObjectId, hook: Hook, args: &HookArgs) -> Result<(), ScriptError> {
        let domain = self.domain.as_mut().ok_or(ScriptError::NotStarted)?;
        let Domain {
            engine,
            types,
            objects,
        } = domain;

        let target = objects.get_mut(&object).ok_or(ScriptError::UnknownObject(object))?;
        let compiled = types
            .get(target.script_type.0 as usize)
            .ok_or(ScriptError::UnknownType(target.script_type))?;
        if !compiled.hooks.contains(hook) {
            return Ok(());
        }

        let ctx = context_map(&target.owner, args);
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let mut scope = Scope::new();
        let result = engine.call_fn_with_options::<Dynamic>(
            options,
            &mut scope,
            &compiled.ast,
            hook.name(),
            (target.state.clone(), ctx),
        );

        match result {
            Ok(state) if state.is_unit() => Ok(()),
            Ok(state) => {
                target.state = state;
                Ok(())
            }
            Err(err) => Err(ScriptError::Hook {
                hook: hook.name(),
                reason: err.to_string(),
            }),
        }
    }

    fn is_object_live(&self, object: ObjectId) -> bool {
        self.domain
            .as_ref()
            .is_some_and(|domain| domain.objects.contains_key(&object))
    }

    fn live_objects(&self) -> usize {
        self.domain.as_ref().map_or(0, |domain| domain.objects.len())
    }

    fn unload(&mut self) {
        if let Some(domain) = self.domain.take() {
            debug!(
                types = domain.types.len(),
                objects = domain.objects.len(),
                "rhai domain dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use ember_core::{CommandQueue, NativeContext, ReloadSignal, ScriptCommand, WorldId};

    use super::*;

    const IMAGE: &str = r#"
[[types]]
namespace = "Game"
name = "Counter"
kind = "component"
source = '''
fn on_init(state, ctx) {
    state.count = 0;
    state
}

fn on_update(state, ctx) {
    state.count += 1;
    if state.count == 2 {
        destroy_entity(ctx.world, ctx.entity);
    }
    state
}

fn helper(x) { x }
'''

[[types]]
namespace = "Game"
name = "Faulty"
kind = "system"
source = '''
fn on_update(state, ctx) {
    throw "boom";
}

fn on_draw(state) { state }
'''
"#;

    fn started(queue: &CommandQueue) -> (RhaiRuntime, Vec<DeclaredType>) {
        let natives = NativeTable::standard(NativeContext::new(queue.clone(), ReloadSignal::new()));
        let mut runtime = RhaiRuntime::default();
        runtime.start().unwrap();
        let types = runtime
            .load_image(&ImageSource::inline("game", IMAGE), &natives)
            .unwrap()
            .types;
        (runtime, types)
    }

    #[test]
    fn test_hooks_resolved_by_name_and_arity() {
        let (_, types) = started(&CommandQueue::new());
        assert_eq!(types[0].qualified_name, "Game.Counter");
        assert!(types[0].hooks.contains(Hook::Init));
        assert!(types[0].hooks.contains(Hook::Update));
        assert!(!types[0].hooks.contains(Hook::Draw));
        // `on_draw(state)` has the wrong arity.
        assert!(!types[1].hooks.contains(Hook::Draw));
    }

    #[test]
    fn test_state_survives_calls_and_natives_enqueue() {
        let queue = CommandQueue::new();
        let (mut runtime, types) = started(&queue);
        let entity = EntityId::new(3, 1);
        let owner = MirrorOwner {
            world: Some(WorldId::new(1)),
            entity: Some(entity),
            type_hash: types[0].hash(),
        };

        let object = runtime.create_object(types[0].script_type, &owner).unwrap();
        let args = HookArgs::default();
        runtime.invoke(object, Hook::Init, &args).unwrap();
        runtime.invoke(object, Hook::Update, &args).unwrap();
        assert!(queue.is_empty());
        runtime.invoke(object, Hook::Update, &args).unwrap();

        let state = runtime.state(object).unwrap().clone_cast::<Map>();
        assert_eq!(state["count"].as_int(), Ok(2));
        assert_eq!(
            queue.drain(),
            vec![ScriptCommand::DestroyEntity {
                world: WorldId::new(1),
                entity,
            }]
        );
    }

    #[test]
    fn test_thrown_error_becomes_hook_error() {
        let (mut runtime, types) = started(&CommandQueue::new());
        let owner = MirrorOwner {
            world: None,
            entity: None,
            type_hash: types[1].hash(),
        };
        let object = runtime.create_object(types[1].script_type, &owner).unwrap();
        let err = runtime.invoke(object, Hook::Update, &HookArgs::default()).unwrap_err();
        assert!(matches!(err, ScriptError::Hook { hook: "on_update", .. }));
        assert!(runtime.is_object_live(object));
    }

    #[test]
    fn test_unload_drops_domain_but_ids_stay_unique() {
        let queue = CommandQueue::new();
        let (mut runtime, types) = started(&queue);
        let owner = MirrorOwner {
            world: None,
            entity: None,
            type_hash: types[1].hash(),
        };
        let first = runtime.create_object(types[1].script_type, &owner).unwrap();
        runtime.unload();
        assert_eq!(runtime.live_objects(), 0);
        assert!(runtime.type_names().is_empty());
        assert!(matches!(
            runtime.create_object(types[1].script_type, &owner),
            Err(ScriptError::NotStarted)
        ));

        let natives = NativeTable::standard(NativeContext::new(queue, ReloadSignal::new()));
        let types = runtime
            .load_image(&ImageSource::inline("game", IMAGE), &natives)
            .unwrap()
            .types;
        let second = runtime.create_object(types[1].script_type, &owner).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_compile_error_is_reported() {
        let mut runtime = RhaiRuntime::default();
        runtime.start().unwrap();
        let image = ImageSource::inline(
            "bad",
            "[[types]]\nnamespace = \"Game\"\nname = \"Bad\"\nkind = \"system\"\n\
             source = \"fn on_update(state, ctx) {\"",
        );
        let err = runtime.load_image(&image, &NativeTable::default()).unwrap_err();
        assert!(matches!(err, ScriptError::Compile { ref name, .. } if name == "Game.Bad"));
    }

    #[test]
    fn test_file_sources_are_reported() {
        let dir = std::env::temp_dir().join(format!("ember-rhai-sources-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tick.rhai"), "fn on_update(state, ctx) { state }").unwrap();
        let manifest = dir.join("game.toml");
        std::fs::write(
            &manifest,
            "[[types]]\nnamespace = \"Game\"\nname = \"Tick\"\nkind = \"system\"\n\
             file = \"tick.rhai\"\n\n\
             [[types]]\nnamespace = \"Game\"\nname = \"Inline\"\nkind = \"component\"\n\
             source = \"\"\n",
        )
        .unwrap();

        let mut runtime = RhaiRuntime::default();
        runtime.start().unwrap();
        let loaded = runtime
            .load_image(&ImageSource::file(&manifest), &NativeTable::default())
            .unwrap();
        assert_eq!(loaded.types.len(), 2);
        assert!(loaded.types[0].hooks.contains(Hook::Update));
        assert_eq!(loaded.sources, vec![dir.join("tick.rhai")]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
