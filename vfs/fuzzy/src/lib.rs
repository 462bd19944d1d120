//! A [`layerfs_core::Backend`] decorator that resolves paths whose spelling
//! differs from the wrapped backend's, such as case-insensitive lookups on a
//! case-sensitive host directory.

pub mod casefold;
mod fuzzy;

pub use casefold::eq_ignore_case;
pub use fuzzy::{FuzzyBackend, NameEq};
