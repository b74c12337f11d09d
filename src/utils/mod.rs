//! Cross-platform helpers.

pub(crate) mod path;
