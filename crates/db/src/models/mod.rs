//! Row types for the Postgres tables.
//!
//! Each row derives `FromRow` and converts into the matching
//! `glossa_core` domain type. Array columns map to `Vec<_>`.

pub mod aggregate;
pub mod annotation;
pub mod concept;
pub mod corpus;
pub mod image;
pub mod label;
pub mod work_entry;
