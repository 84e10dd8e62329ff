//! The TWIM core: normalizing events into posts, storing them, and rendering the digest.

pub mod event;
pub mod format;
pub mod post;
pub mod store;
