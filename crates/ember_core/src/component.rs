//! # Component Types
//!
//! A component is a typed record attached to exactly one entity. Its native
//! value is the source of truth; the scripting mirror is optional and may
//! come and go with reloads.

use std::any::Any;

use crate::type_id::{TypeInfo, TypeKind};

/// Marker trait for ECS components.
///
/// Components must be:
/// - `'static + Send`: stores are owned by a world that may be moved
/// - Named: `TYPE_NAME` is the fully-qualified name the scripting layer uses
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct DebugName {
///     name: String,
/// }
///
/// impl Component for DebugName {
///     const TYPE_NAME: &'static str = "Game.DebugName";
/// }
/// ```
pub trait Component: Any + Send {
    /// Fully-qualified name, `"Namespace.Name"`.
    const TYPE_NAME: &'static str;

    /// Structural identity, derived from `TYPE_NAME`.
    const INFO: TypeInfo = TypeInfo::new(Self::TYPE_NAME, TypeKind::Component);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_id::TypeHash;

    struct Health(#[allow(dead_code)] u32);

    impl Component for Health {
        const TYPE_NAME: &'static str = "Game.Health";
    }

    #[test]
    fn test_info_is_derived_from_name() {
        assert_eq!(Health::INFO.hash, TypeHash::of("Game.Health"));
        assert_eq!(Health::INFO.kind, TypeKind::Component);
        assert_eq!(Health::INFO.short_name(), "Health");
    }
}
