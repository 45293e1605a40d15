//! URL handling module for Ripple-Harvest
//!
//! This module provides URL normalization, dedup keys and the glob-based
//! include/exclude filter applied to discovered links.

mod matcher;
mod normalize;

pub use matcher::{compile_glob, FilterVerdict, UrlFilter};
pub use normalize::{apply_fragment_policy, dedup_key, normalize_url};
