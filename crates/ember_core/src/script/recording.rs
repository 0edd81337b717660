//! A line-oriented scripting runtime that records every call it receives.
//!
//! It has no language at all: an image is a list of type declarations, one
//! per line.
//!
//! ```text
//! # kind      qualified name     hooks
//! component   Game.DebugName     init destroy
//! system      Game.SceneSystem   enable disable update fail:draw
//! ```
//!
//! `fail:<hook>` declares the hook and makes every call to it fail. Useful
//! wherever a real interpreter would get in the way of observing the bridge.
//!
//! `source <path>` names a file the image depends on, relative to the image's
//! directory. Its content is never read here; it only joins the sources the
//! bridge digests and watches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    DeclaredType, Hook, HookArgs, HookSet, ImageSource, LoadedImage, MirrorOwner, NativeTable,
    ScriptRuntime, ScriptTypeId,
};
use crate::error::ScriptError;
use crate::id::ObjectId;
use crate::type_id::TypeKind;

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalEvent {
    /// `start` succeeded.
    Started,
    /// An image was loaded.
    Loaded {
        /// Image name.
        image: String,
        /// Number of types it declared.
        types: usize,
    },
    /// An object was created.
    Created {
        /// The new object.
        object: ObjectId,
        /// Its type.
        type_name: String,
        /// Who the object mirrors.
        owner: MirrorOwner,
    },
    /// A hook ran (or failed).
    Invoked {
        /// Target object.
        object: ObjectId,
        /// Its type.
        type_name: String,
        /// The hook.
        hook: Hook,
    },
    /// An object was released.
    Released {
        /// The released object.
        object: ObjectId,
        /// Its type.
        type_name: String,
    },
    /// The domain was torn down.
    Unloaded,
}

/// Shared, clonable view of everything a [`RecordingRuntime`] saw.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<JournalEvent>>>,
}

impl Journal {
    fn push(&self, event: JournalEvent) {
        self.events.lock().push(event);
    }

    /// Snapshot of every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<JournalEvent> {
        self.events.lock().clone()
    }

    /// Hooks invoked on objects of `type_name`, in call order.
    #[must_use]
    pub fn hooks_of(&self, type_name: &str) -> Vec<Hook> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                JournalEvent::Invoked { type_name: t, hook, .. } if t == type_name => Some(*hook),
                _ => None,
            })
            .collect()
    }

    /// Number of times `hook` ran on objects of `type_name`.
    #[must_use]
    pub fn count(&self, type_name: &str, hook: Hook) -> usize {
        self.hooks_of(type_name).into_iter().filter(|h| *h == hook).count()
    }

    /// Owners of every object of `type_name` created so far.
    #[must_use]
    pub fn owners(&self, type_name: &str) -> Vec<MirrorOwner> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                JournalEvent::Created { type_name: t, owner, .. } if t == type_name => Some(*owner),
                _ => None,
            })
            .collect()
    }

    /// Number of objects of `type_name` created so far.
    #[must_use]
    pub fn created(&self, type_name: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| {
                matches!(event, JournalEvent::Created { type_name: t, .. } if t == type_name)
            })
            .count()
    }

    /// Forgets every event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[derive(Debug)]
struct RecordedType {
    name: String,
    failing: HookSet,
}

#[derive(Debug)]
struct LiveObject {
    script_type: ScriptTypeId,
}

/// Scripting runtime driven by declaration lines. See the module docs.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    journal: Journal,
    started: bool,
    refuse_start: bool,
    silent: bool,
    types: Vec<RecordedType>,
    objects: HashMap<ObjectId, LiveObject>,
    next_object: u64,
}

impl RecordingRuntime {
    /// Creates a runtime with an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The journal this runtime writes to. Take it before handing the
    /// runtime to an engine.
    #[must_use]
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// A runtime whose `start` always fails.
    #[must_use]
    pub fn refusing_start() -> Self {
        Self {
            refuse_start: true,
            ..Self::default()
        }
    }

    /// A runtime that keeps no journal, for long-running loops.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    fn record(&self, event: JournalEvent) {
        if !self.silent {
            self.journal.push(event);
        }
    }

    fn type_name(&self, object: ObjectId) -> String {
        self.objects
            .get(&object)
            .and_then(|o| self.types.get(o.script_type.0 as usize))
            .map_or_else(String::new, |t| t.name.clone())
    }
}

enum Line {
    Declare {
        name: String,
        kind: TypeKind,
        hooks: HookSet,
        failing: HookSet,
    },
    Source(PathBuf),
}

fn parse_line(image: &str, line: &str) -> Result<Line, ScriptError> {
    let invalid = |reason: String| ScriptError::InvalidImage {
        image: image.to_owned(),
        reason,
    };

    let mut words = line.split_whitespace();
    let kind = match words.next() {
        Some("component") => TypeKind::Component,
        Some("system") => TypeKind::System,
        Some("source") => {
            let path = words
                .next()
                .ok_or_else(|| invalid(format!("missing path in `{line}`")))?;
            return Ok(Line::Source(PathBuf::from(path)));
        }
        other => {
            return Err(invalid(format!(
                "expected `component`, `system` or `source`, found {other:?}"
            )))
        }
    };
    let name = words
        .next()
        .filter(|name| name.contains('.'))
        .ok_or_else(|| invalid(format!("missing qualified name in `{line}`")))?;

    let mut hooks = HookSet::EMPTY;
    let mut failing = HookSet::EMPTY;
    for word in words {
        let (fails, short) = match word.strip_prefix("fail:") {
            Some(short) => (true, short),
            None => (false, word),
        };
        let hook = Hook::from_name(&format!("on_{short}"))
            .ok_or_else(|| invalid(format!("unknown hook `{short}`")))?;
        hooks.insert(hook);
        if fails {
            failing.insert(hook);
        }
    }
    Ok(Line::Declare {
        name: name.to_owned(),
        kind,
        hooks,
        failing,
    })
}

impl ScriptRuntime for RecordingRuntime {
    fn name(&self) -> &str {
        "recording"
    }

    fn start(&mut self) -> Result<(), ScriptError> {
        if self.refuse_start {
            return Err(ScriptError::Startup("refused by configuration".into()));
        }
        self.started = true;
        self.record(JournalEvent::Started);
        Ok(())
    }

    fn load_image(
        &mut self,
        image: &ImageSource,
        _natives: &NativeTable,
    ) -> Result<LoadedImage, ScriptError> {
        if !self.started {
            return Err(ScriptError::NotStarted);
        }
        let text = image.read_text()?;
        let base = image.path().and_then(Path::parent).unwrap_or(Path::new(""));

        let mut declared = Vec::new();
        let mut sources = Vec::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, kind, hooks, failing) = match parse_line(&image.name, line)? {
                Line::Declare {
                    name,
                    kind,
                    hooks,
                    failing,
                } => (name, kind, hooks, failing),
                Line::Source(path) => {
                    sources.push(base.join(path));
                    continue;
                }
            };
            let index = u32::try_from(self.types.len()).map_err(|_| ScriptError::InvalidImage {
                image: image.name.clone(),
                reason: "too many types".into(),
            })?;
            declared.push(DeclaredType {
                qualified_name: name.clone(),
                kind,
                script_type: ScriptTypeId(index),
                hooks,
            });
            self.types.push(RecordedType { name, failing });
        }

        self.record(JournalEvent::Loaded {
            image: image.name.clone(),
            types: declared.len(),
        });
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
        let Some(recorded) = self.types.get(script_type.0 as usize) else {
            return Err(ScriptError::UnknownType(script_type));
        };
        self.next_object += 1;
        let object = ObjectId::new(self.next_object);
        self.record(JournalEvent::Created {
            object,
            type_name: recorded.name.clone(),
            owner: *owner,
        });
        self.objects.insert(object, LiveObject { script_type });
        Ok(object)
    }

    fn release_object(&mut self, object: ObjectId) -> bool {
        let type_name = self.type_name(object);
        if self.objects.remove(&object).is_none() {
            return false;
        }
        self.record(JournalEvent::Released { object, type_name });
        true
    }

    fn invoke(
        &mut self,
        object: ObjectId,
        hook: Hook,
        _args: &HookArgs,
    ) -> Result<(), ScriptError> {
        let Some(live) = self.objects.get(&object) else {
            return Err(ScriptError::UnknownObject(object));
        };
        let Some(recorded) = self.types.get(live.script_type.0 as usize) else {
            return Err(ScriptError::UnknownType(live.script_type));
        };
        self.record(JournalEvent::Invoked {
            object,
            type_name: recorded.name.clone(),
            hook,
        });
        if recorded.failing.contains(hook) {
            return Err(ScriptError::Hook {
                hook: hook.name(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn is_object_live(&self, object: ObjectId) -> bool {
        self.objects.contains_key(&object)
    }

    fn live_objects(&self) -> usize {
        self.objects.len()
    }

    fn unload(&mut self) {
        self.types.clear();
        self.objects.clear();
        self.record(JournalEvent::Unloaded);
    }
}
