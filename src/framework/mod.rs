//! Typed clients over a store
//!
//! `ModeledFramework` talks to the store on every call.
//! `CachedModeledFramework` adds a `ModeledCache` for the same subtree and
//! answers reads from it once the initial snapshot has loaded.

mod cached;
mod modeled;

pub use cached::CachedModeledFramework;
pub use modeled::ModeledFramework;
