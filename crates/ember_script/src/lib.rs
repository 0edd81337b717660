//! # EMBER Script
//!
//! Rhai implementation of [`ember_core::ScriptRuntime`].
//!
//! An image is a TOML manifest (see [`manifest`]) declaring script types by
//! qualified name. Each type's Rhai source defines any of the lifecycle hooks
//! as `fn on_<hook>(state, ctx)`. Native entry points from the engine's
//! [`ember_core::NativeTable`] are callable from every hook, along with
//! `type_hash(name)` for building component arguments.
//!
//! ```rust,ignore
//! use ember_core::{Engine, ImageSource};
//! use ember_script::{RhaiConfig, RhaiRuntime};
//!
//! let engine = Engine::builder()
//!     .runtime(RhaiRuntime::new(RhaiConfig::default()))
//!     .image(ImageSource::file("assets/scripts/game.toml"))
//!     .build()?;
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod manifest;
pub mod runtime;

pub use manifest::{DeclKind, ImageManifest, TypeDecl};
pub use runtime::{RhaiConfig, RhaiRuntime};
