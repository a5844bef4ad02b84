//! Domain model module declarations.

pub mod step;
