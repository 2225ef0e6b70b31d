//! sv-core: layout and colouring primitives for simviz.
//!
//! Contains:
//! - color (palette stops + piecewise linear colour ramp)
//! - grid (near-square tiling planner)
//! - error (shared error types)

pub mod color;
pub mod error;
pub mod grid;

pub use color::{ColorRamp, ColorbarEntry, Palette, Rgb};
pub use error::{CoreError, CoreResult};
pub use grid::{GridLayout, GridRow, Slot, plan};
