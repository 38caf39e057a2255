#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::manual_range_contains,
         clippy::float_cmp, clippy::type_complexity)]
// Client rendering core: map tiles, lightmaps, alias models and the frame loop

pub mod error;
pub mod r_local;
pub mod r_model_types;
pub mod r_image;
pub mod r_draw;
pub mod r_surface;
pub mod r_lightmap;
pub mod r_model_brush;
pub mod r_model_md2;
pub mod r_model_md3;
pub mod r_model_alias;
pub mod r_model;
pub mod r_bsp;
pub mod r_entity;
pub mod r_mesh;
pub mod r_particle;
pub mod r_main;

pub use error::{LightmapError, ModelError, RenderError};
pub use r_draw::{BlendMode, CommandRecorder, DrawBackend, DrawCommand};
pub use r_entity::{Entity, EntityId, RenderFlags};
pub use r_image::{ImageKind, ImageRegistry, TextureInfo, TextureProvider};
pub use r_local::{RdFlags, RefDef, RenderSettings, RenderStats};
pub use r_main::{MapTileSource, Renderer};
pub use r_model::{FileSource, MemoryFiles};
pub use r_model_alias::AnimStateId;
pub use r_model_types::ModelId;
pub use r_particle::{Particle, ParticleId, ParticleStyle};
