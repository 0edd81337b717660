//! # Image Manifests
//!
//! A scripting image is a TOML file declaring the script types it provides.
//!
//! ```toml
//! name = "gameplay"
//!
//! [[types]]
//! namespace = "Game"
//! name = "DebugName"
//! kind = "component"
//! source = '''
//! fn on_init(state, ctx) {
//!     state.frames = 0;
//!     state
//! }
//! '''
//! ```
//!
//! `source` may instead be given as `file`, a path relative to the manifest.

use std::path::{Path, PathBuf};

use ember_core::{ScriptError, TypeHash, TypeKind};
use serde::Deserialize;

/// Role of a declared type.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    /// Mirrors a native component.
    Component,
    /// Mirrors a native system.
    System,
}

impl From<DeclKind> for TypeKind {
    fn from(kind: DeclKind) -> Self {
        match kind {
            DeclKind::Component => Self::Component,
            DeclKind::System => Self::System,
        }
    }
}

/// One `[[types]]` entry.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDecl {
    /// Namespace, e.g. `"Game"`.
    pub namespace: String,
    /// Type name inside the namespace.
    pub name: String,
    /// Component or system.
    pub kind: DeclKind,
    /// Inline Rhai source.
    #[serde(default)]
    pub source: Option<String>,
    /// Rhai source file, relative to the manifest.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl TypeDecl {
    /// `"Namespace.Name"`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Structural identity.
    #[must_use]
    pub fn hash(&self) -> TypeHash {
        TypeHash::of_parts(&self.namespace, &self.name)
    }
}

/// A parsed image.
#[derive(Clone, Debug, Deserialize)]
pub struct ImageManifest {
    /// Optional display name, overriding the file stem.
    #[serde(default)]
    pub name: Option<String>,
    /// Declared types, in order.
    #[serde(default)]
    pub types: Vec<TypeDecl>,
}

impl ImageManifest {
    /// Parses and validates manifest text.
    ///
    /// # Errors
    ///
    /// [`ScriptError::InvalidImage`] on malformed TOML or an invalid declaration.
    pub fn parse(image: &str, text: &str) -> Result<Self, ScriptError> {
        let invalid = |reason: String| ScriptError::InvalidImage {
            image: image.to_owned(),
            reason,
        };

        let manifest: Self = toml::from_str(text).map_err(|err| invalid(err.to_string()))?;
        for decl in &manifest.types {
            if decl.namespace.is_empty() || decl.name.is_empty() {
                return Err(invalid("type namespace and name must not be empty".into()));
            }
            if decl.name.contains('.') {
                return Err(invalid(format!("type name `{}` must not contain a dot", decl.name)));
            }
            if decl.source.is_some() == decl.file.is_some() {
                return Err(invalid(format!(
                    "type `{}` needs exactly one of `source` or `file`",
                    decl.qualified_name()
                )));
            }
        }
        Ok(manifest)
    }
}

/// Where the `file` source of `decl` lives, if it has one. `base` is the
/// manifest's directory.
#[must_use]
pub fn source_path(decl: &TypeDecl, base: Option<&Path>) -> Option<PathBuf> {
    let file = decl.file.as_ref()?;
    Some(match base {
        Some(base) if file.is_relative() => base.join(file),
        _ => file.clone(),
    })
}

/// Reads the Rhai source of `decl`. `base` is the manifest's directory.
///
/// # Errors
///
/// [`ScriptError::ImageOpen`] if a `file` source cannot be read.
pub fn read_source(
    image: &str,
    decl: &TypeDecl,
    base: Option<&Path>,
) -> Result<String, ScriptError> {
    if let Some(source) = &decl.source {
        return Ok(source.clone());
    }
    let Some(path) = source_path(decl, base) else {
        return Ok(String::new());
    };
    std::fs::read_to_string(&path).map_err(|err| ScriptError::ImageOpen {
        image: image.to_owned(),
        reason: format!("{}: {err}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest = ImageManifest::parse(
            "game",
            r#"
name = "gameplay"

[[types]]
namespace = "Game"
name = "DebugName"
kind = "component"
source = "fn on_init(state, ctx) { state }"

[[types]]
namespace = "Game"
name = "SceneSystem"
kind = "system"
file = "scene.rhai"
"#,
        )
        .unwrap();

        assert_eq!(manifest.name.as_deref(), Some("gameplay"));
        assert_eq!(manifest.types.len(), 2);
        assert_eq!(manifest.types[0].qualified_name(), "Game.DebugName");
        assert_eq!(manifest.types[0].hash(), TypeHash::of("Game.DebugName"));
        assert_eq!(manifest.types[1].kind, DeclKind::System);
    }

    #[test]
    fn test_rejects_invalid_declarations() {
        let cases = [
            "[[types]]\nnamespace = \"Game\"\nname = \"A\"\nkind = \"widget\"\nsource = \"\"",
            "[[types]]\nnamespace = \"\"\nname = \"A\"\nkind = \"system\"\nsource = \"\"",
            "[[types]]\nnamespace = \"Game\"\nname = \"A.B\"\nkind = \"system\"\nsource = \"\"",
            "[[types]]\nnamespace = \"Game\"\nname = \"A\"\nkind = \"system\"",
            "types = 3",
        ];
        for text in cases {
            assert!(
                matches!(ImageManifest::parse("bad", text), Err(ScriptError::InvalidImage { .. })),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn test_missing_source_file() {
        let manifest = ImageManifest::parse(
            "game",
            "[[types]]\nnamespace = \"Game\"\nname = \"A\"\nkind = \"system\"\n\
             file = \"nope.rhai\"",
        )
        .unwrap();
        let err = read_source("game", &manifest.types[0], Some(Path::new("/definitely/missing")));
        assert!(matches!(err, Err(ScriptError::ImageOpen { .. })));
    }

    #[test]
    fn test_source_path_is_relative_to_the_manifest() {
        let manifest = ImageManifest::parse(
            "game",
            "[[types]]\nnamespace = \"Game\"\nname = \"A\"\nkind = \"system\"\n\
             file = \"a.rhai\"\n\n\
             [[types]]\nnamespace = \"Game\"\nname = \"B\"\nkind = \"system\"\nsource = \"\"",
        )
        .unwrap();
        let base = Path::new("scripts");
        assert_eq!(
            source_path(&manifest.types[0], Some(base)),
            Some(PathBuf::from("scripts/a.rhai"))
        );
        assert_eq!(source_path(&manifest.types[1], Some(base)), None);
    }
}
