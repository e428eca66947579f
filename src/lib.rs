//! Descriptor binding for GPU pipelines built from reflected SPIR-V.
//!
//! Shader modules are reflected with [`descry_reflect`], their bindings merged into pipeline
//! layouts, and sets of resources turned into cached descriptor sets that are dropped as soon as
//! any resource in them is destroyed. Short-lived data goes through a per-frame bump allocator.
//! All of it sits on the [`GpuApi`] trait, with a `wgpu` implementation behind the `wgpu`
//! feature.

pub use prelude::*;

mod api;
mod context;
mod frame;
#[cfg(test)]
mod mock;
mod multikey;
mod prelude;
mod reflect;
mod resources;
mod util;
#[cfg(feature = "wgpu")]
mod wgpu_api;
