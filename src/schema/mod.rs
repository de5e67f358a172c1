// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Schema Reflection
//!
//! Runtime type registry and generic field-by-identifier (de)serialization
//! (spec §4.F, §4.G), plus the four concrete object classes this crate
//! understands (spec §4.J) and the inheritance queries over them (spec §4.F
//! "class hierarchy").

pub mod builder;
pub mod classes;
pub mod descriptor;
pub mod hierarchy;
pub mod reflect;
pub mod registry;

pub use builder::TypeBuilder;
pub use descriptor::{Codec, Field, FieldKind, ParamMetadata, TypeDescriptor};
pub use hierarchy::ClassHierarchy;
pub use reflect::Value;
pub use registry::{bootstrap, standard_registry, SchemaRegistry};
