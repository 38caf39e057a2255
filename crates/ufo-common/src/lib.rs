#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::manual_range_contains)]
// Shared math, on-disk formats and console variables used by the renderer

pub mod q_shared;
pub mod qfiles;
pub mod cvar;
