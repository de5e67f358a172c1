// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Concrete object classes (spec §4.J). Each module exposes a `descriptor()`
//! building a custom-codec [`crate::schema::TypeDescriptor`]; none of these
//! four classes uses the generic field-table path, since every one needs
//! version-gated or clamped behavior the generic walk can't express.

pub mod light;
pub mod material;
pub mod mesh;
pub mod sprite_text;
