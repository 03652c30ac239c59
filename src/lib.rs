//! mesh-sprite
//!
//! Renders a 3D glTF model into 2D sprite textures under image-based lighting
//! and composites the sprites onto a window, natively or in the browser.
//!
//! High-level modules
//! - `bounce`: moving a rectangle inside the viewport
//! - `camera`: perspective camera and its uniform
//! - `capture`: offscreen frame readback for window-backed tests
//! - `context`: GPU and window context holding the active camera and lighting
//! - `data_structures`: models, instances, textures and mesh sprites
//! - `demo`: two sprites sharing one model, one bouncing and one re-rendered on click
//! - `flow`: application event loop and the `GraphicsFlow` trait
//! - `lighting`: image-based lighting from diffuse and specular cubemaps
//! - `pipelines`: the mesh and sprite render pipelines
//! - `resources`: named loading of glTF models and `.cubemap` environments
//! - `render`: composition of what flows draw each frame
//!

pub mod bounce;
pub mod camera;
#[cfg(feature = "integration-tests")]
pub mod capture;
pub mod context;
pub mod data_structures;
pub mod demo;
pub mod flow;
pub mod lighting;
pub mod pipelines;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use wgpu;
pub use winit::dpi::PhysicalPosition;
pub use winit::event::DeviceEvent;
pub use winit::event::WindowEvent;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Entry point of the web build.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    flow::run(vec![demo::MeshSpriteDemo::constructor()])
        .map_err(|e| wasm_bindgen::JsValue::from_str(&format!("{:#}", e)))
}
