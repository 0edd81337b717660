//! # Scripting Runtime Seam
//!
//! EMBER never talks to a scripting language directly. Everything the core
//! needs from the secondary runtime goes through [`ScriptRuntime`]:
//!
//! ```text
//!  native core                         scripting layer
//! ┌───────────────┐  load_image      ┌─────────────────┐
//! │ Bridge        │ ───────────────> │ declared types  │
//! │  TypeHash ->  │ <─────────────── │ (per generation)│
//! │  ScriptTypeId │  create_object   ├─────────────────┤
//! │               │ ───────────────> │ object heap     │
//! │ Mirror slots  │  invoke(hook)    │                 │
//! │ (ObjectId)    │ ───────────────> │ hook thunks     │
//! └───────────────┘ <── NativeTable ─┴─────────────────┘
//! ```
//!
//! Only IDs cross the boundary. A runtime may be torn down at any time with
//! [`ScriptRuntime::unload`]; every `ScriptTypeId` and `ObjectId` it handed
//! out becomes meaningless at that point.

mod native;
pub mod recording;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ScriptError;
use crate::id::{EntityId, ObjectId, WorldId};
use crate::type_id::{TypeHash, TypeKind};

pub use native::{NativeContext, NativeEntry, NativeFn, NativeTable};

/// Lifecycle hooks a script type may implement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Fired once when a mirror object is created.
    Init,
    /// The owner became live in a running simulation.
    Enable,
    /// The owner stopped being live.
    Disable,
    /// Per-frame update pass.
    Update,
    /// Per-frame draw pass.
    Draw,
    /// Fired before a mirror is released because its owner is destroyed.
    Destroy,
}

impl Hook {
    /// Every hook, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Init,
        Self::Enable,
        Self::Disable,
        Self::Update,
        Self::Draw,
        Self::Destroy,
    ];

    /// Script-side function name of the hook.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "on_init",
            Self::Enable => "on_enable",
            Self::Disable => "on_disable",
            Self::Update => "on_update",
            Self::Draw => "on_draw",
            Self::Destroy => "on_destroy",
        }
    }

    /// Resolves a script-side function name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|hook| hook.name() == name)
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of hooks a script type declares. Resolved once per generation so
/// dispatch never looks functions up by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookSet(u8);

impl HookSet {
    /// No hooks.
    pub const EMPTY: Self = Self(0);

    /// Adds a hook.
    pub fn insert(&mut self, hook: Hook) {
        self.0 |= hook.bit();
    }

    /// Returns a copy with `hook` added.
    #[must_use]
    pub const fn with(self, hook: Hook) -> Self {
        Self(self.0 | hook.bit())
    }

    /// Checks if a hook is declared.
    #[must_use]
    pub const fn contains(self, hook: Hook) -> bool {
        self.0 & hook.bit() != 0
    }

    /// Returns `true` if no hook is declared.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Hook> for HookSet {
    fn from_iter<I: IntoIterator<Item = Hook>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for hook in iter {
            set.insert(hook);
        }
        set
    }
}

/// Runtime-internal handle of a script type. Valid for one generation only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScriptTypeId(pub u32);

/// Who a mirror object belongs to, expressed in IDs only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MirrorOwner {
    /// Owning world, `None` for the global registry.
    pub world: Option<WorldId>,
    /// Owning entity, `None` for systems.
    pub entity: Option<EntityId>,
    /// Structural identity of the native type.
    pub type_hash: TypeHash,
}

impl MirrorOwner {
    /// Role of the native owner: components belong to an entity, systems don't.
    #[must_use]
    pub const fn kind(&self) -> TypeKind {
        if self.entity.is_some() {
            TypeKind::Component
        } else {
            TypeKind::System
        }
    }
}

/// Per-call arguments passed to a hook.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HookArgs {
    /// Current frame number.
    pub frame: u64,
    /// Time step in seconds.
    pub delta_time: f32,
}

/// Where an image's text comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Read from disk on every load.
    File(PathBuf),
    /// Held in memory.
    Inline(String),
}

/// One scripting image, loaded in the order it was registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSource {
    /// Display name used in logs and errors.
    pub name: String,
    /// Text origin.
    pub origin: ImageOrigin,
}

impl ImageSource {
    /// An image backed by a file. The name is the file stem.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        Self {
            name,
            origin: ImageOrigin::File(path),
        }
    }

    /// An image held in memory.
    pub fn inline(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: ImageOrigin::Inline(text.into()),
        }
    }

    /// The backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            ImageOrigin::File(path) => Some(path),
            ImageOrigin::Inline(_) => None,
        }
    }

    /// Reads the image text.
    ///
    /// # Errors
    ///
    /// [`ScriptError::ImageOpen`] if the backing file cannot be read.
    pub fn read_text(&self) -> Result<String, ScriptError> {
        match &self.origin {
            ImageOrigin::Inline(text) => Ok(text.clone()),
            ImageOrigin::File(path) => {
                std::fs::read_to_string(path).map_err(|err| ScriptError::ImageOpen {
                    image: self.name.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Content digest of the image text alone.
    #[must_use]
    pub fn digest(&self) -> Option<u64> {
        self.digest_with(&[])
    }

    /// Content digest of the image text and every file in `sources`, used to
    /// skip reloads when nothing changed. A missing source hashes as absent,
    /// so deleting or restoring it counts as a change.
    #[must_use]
    pub fn digest_with(&self, sources: &[PathBuf]) -> Option<u64> {
        let text = self.read_text().ok()?;
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        for path in sources {
            path.hash(&mut hasher);
            std::fs::read(path).ok().hash(&mut hasher);
        }
        Some(hasher.finish())
    }
}

/// What loading one image produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadedImage {
    /// Declared types, in declaration order.
    pub types: Vec<DeclaredType>,
    /// Files other than the image itself that its types were built from.
    pub sources: Vec<PathBuf>,
}

/// Every file the loaded generation was built from, shared with background
/// watchers. Republished by the bridge after each load.
#[derive(Clone, Debug, Default)]
pub struct WatchList {
    paths: Arc<RwLock<Vec<PathBuf>>>,
}

impl WatchList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current paths.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.read().clone()
    }

    /// Replaces every path.
    pub fn replace(&self, paths: Vec<PathBuf>) {
        *self.paths.write() = paths;
    }
}

/// A type declared by a loaded image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredType {
    /// Fully-qualified name, `"Namespace.Name"`.
    pub qualified_name: String,
    /// Component or system.
    pub kind: TypeKind,
    /// Handle inside the runtime.
    pub script_type: ScriptTypeId,
    /// Hooks the type implements.
    pub hooks: HookSet,
}

impl DeclaredType {
    /// Structural identity of the declared type.
    #[must_use]
    pub fn hash(&self) -> TypeHash {
        TypeHash::of(&self.qualified_name)
    }
}

/// A secondary, independently reloadable object model.
///
/// Implementations own an object heap and the compiled form of every loaded
/// image. The bridge drives them from the main loop thread only.
pub trait ScriptRuntime: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Brings the runtime up. Called once, before the first image load.
    ///
    /// # Errors
    ///
    /// Any error here is fatal to engine startup.
    fn start(&mut self) -> Result<(), ScriptError>;

    /// Loads one image and returns the types it declares together with the
    /// external files they were read from.
    ///
    /// `natives` is the table of native entry points the image may call.
    ///
    /// # Errors
    ///
    /// Fails if the image cannot be opened, parsed or compiled.
    fn load_image(
        &mut self,
        image: &ImageSource,
        natives: &NativeTable,
    ) -> Result<LoadedImage, ScriptError>;

    /// Creates an object of a declared type.
    ///
    /// # Errors
    ///
    /// Fails if the type handle is unknown to the current generation.
    fn create_object(
        &mut self,
        script_type: ScriptTypeId,
        owner: &MirrorOwner,
    ) -> Result<ObjectId, ScriptError>;

    /// Releases an object. Returns `false` if it was not live.
    fn release_object(&mut self, object: ObjectId) -> bool;

    /// Runs a hook on an object.
    ///
    /// # Errors
    ///
    /// Fails if the object is unknown or the hook raised an error.
    fn invoke(&mut self, object: ObjectId, hook: Hook, args: &HookArgs)
        -> Result<(), ScriptError>;

    /// Checks whether an object is live in the current domain.
    fn is_object_live(&self, object: ObjectId) -> bool;

    /// Number of live objects.
    fn live_objects(&self) -> usize;

    /// Tears down every loaded image and the object heap.
    fn unload(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_names_roundtrip() {
        for hook in Hook::ALL {
            assert_eq!(Hook::from_name(hook.name()), Some(hook));
        }
        assert_eq!(Hook::from_name("on_tick"), None);
    }

    #[test]
    fn test_hook_set() {
        let set: HookSet = [Hook::Init, Hook::Update].into_iter().collect();
        assert!(set.contains(Hook::Init));
        assert!(set.contains(Hook::Update));
        assert!(!set.contains(Hook::Draw));
        assert!(HookSet::EMPTY.is_empty());
        assert!(HookSet::EMPTY.with(Hook::Draw).contains(Hook::Draw));
    }

    #[test]
    fn test_missing_file_image() {
        let image = ImageSource::file("/definitely/not/here/gameplay.toml");
        assert_eq!(image.name, "gameplay");
        assert!(matches!(image.read_text(), Err(ScriptError::ImageOpen { .. })));
        assert_eq!(image.digest(), None);
    }

    #[test]
    fn test_digest_covers_sources() {
        let source =
            std::env::temp_dir().join(format!("ember-digest-{}.rhai", std::process::id()));
        std::fs::write(&source, "fn on_init(state, ctx) { state }").unwrap();
        let image = ImageSource::inline("game", "component Game.A");
        let sources = vec![source.clone()];

        let before = image.digest_with(&sources);
        assert_eq!(before, image.digest_with(&sources));
        assert_ne!(before, image.digest());

        std::fs::write(&source, "fn on_init(state, ctx) { () }").unwrap();
        let edited = image.digest_with(&sources);
        assert_ne!(before, edited);

        std::fs::remove_file(&source).unwrap();
        assert_ne!(edited, image.digest_with(&sources));
    }

    #[test]
    fn test_watch_list_is_shared() {
        let list = WatchList::new();
        let watcher = list.clone();
        list.replace(vec![PathBuf::from("a.toml"), PathBuf::from("a.rhai")]);
        assert_eq!(watcher.paths().len(), 2);
    }

    #[test]
    fn test_inline_digest_tracks_content() {
        let a = ImageSource::inline("a", "component Game.A");
        let b = ImageSource::inline("a", "component Game.B");
        assert_eq!(a.digest(), a.digest());
        assert_ne!(a.digest(), b.digest());
    }
}
