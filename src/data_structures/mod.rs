//! Data structures: models, instances, textures and sprites.
//!
//! - `model` contains meshes and PBR materials, the GPU side of a glTF model
//! - `instance` holds the model transform and its GPU layout
//! - `texture` contains the GPU texture wrapper and creation utilities
//! - `sprite` holds mesh sprites and the textures models are rendered into

pub mod instance;
pub mod model;
pub mod sprite;
pub mod texture;
