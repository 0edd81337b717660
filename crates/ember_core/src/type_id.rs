//! # Structural Type Identity
//!
//! Native component and system types are identified by the FNV-1a hash of
//! their fully-qualified name (`"Namespace.Name"`). The hash is stable across
//! process restarts and across reloads of the scripting layer, which makes it
//! the durable key the bridge uses to find a type's current script counterpart.

use std::fmt;

/// Stable hash of a fully-qualified type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(u64);

impl TypeHash {
    /// Hashes a fully-qualified name such as `"Game.DebugName"`.
    ///
    /// Usable in `const` context, so every native type can carry its hash as
    /// an associated constant.
    #[inline]
    #[must_use]
    pub const fn of(qualified_name: &str) -> Self {
        Self(const_fnv1a_hash::fnv1a_hash_str_64(qualified_name))
    }

    /// Hashes a namespace and a name joined with a dot.
    #[must_use]
    pub fn of_parts(namespace: &str, name: &str) -> Self {
        if namespace.is_empty() {
            Self::of(name)
        } else {
            Self::of(&format!("{namespace}.{name}"))
        }
    }

    /// Wraps a raw hash value (as handed back by scripts).
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw hash value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// What role a type plays in a world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Data attached to exactly one entity.
    Component,
    /// Behavior owned by a registry, at most one instance per type.
    System,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component => f.write_str("component"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Static description of a native type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    /// Structural hash of `name`.
    pub hash: TypeHash,
    /// Fully-qualified name, `"Namespace.Name"`.
    pub name: &'static str,
    /// Component or system.
    pub kind: TypeKind,
}

impl TypeInfo {
    /// Builds the description of a type from its qualified name.
    #[must_use]
    pub const fn new(name: &'static str, kind: TypeKind) -> Self {
        Self {
            hash: TypeHash::of(name),
            name,
            kind,
        }
    }

    /// The part of the name before the last dot (empty if there is none).
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        self.name.rsplit_once('.').map_or("", |(namespace, _)| namespace)
    }

    /// The part of the name after the last dot.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit_once('.').map_or(self.name, |(_, name)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_structural() {
        const DEBUG_NAME: TypeHash = TypeHash::of("Game.DebugName");
        assert_eq!(DEBUG_NAME, TypeHash::of_parts("Game", "DebugName"));
        assert_ne!(DEBUG_NAME, TypeHash::of("Game.Transform"));
        assert_eq!(TypeHash::from_raw(DEBUG_NAME.get()), DEBUG_NAME);
    }

    #[test]
    fn test_empty_namespace() {
        assert_eq!(TypeHash::of_parts("", "Root"), TypeHash::of("Root"));
    }

    #[test]
    fn test_name_split() {
        let info = TypeInfo::new("Game.Scene.SceneSystem", TypeKind::System);
        assert_eq!(info.namespace(), "Game.Scene");
        assert_eq!(info.short_name(), "SceneSystem");

        let bare = TypeInfo::new("Loose", TypeKind::Component);
        assert_eq!(bare.namespace(), "");
        assert_eq!(bare.short_name(), "Loose");
    }
}
