// error.rs — error types for asset loading and frame rendering

use thiserror::Error;
use ufo_common::qfiles::FormatError;

use crate::r_entity::EntityId;

/// Integrity errors raised while loading a map tile or an alias model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{name}: {source}")]
    Format {
        name: String,
        #[source]
        source: FormatError,
    },
    #[error("map tile {name}: {reason}")]
    BadMap { name: String, reason: String },
    #[error("model {name}: {reason}")]
    BadAliasModel { name: String, reason: String },
    #[error("tag file {name}: {reason}")]
    BadTags { name: String, reason: String },
    #[error("animation file {name}: {reason}")]
    BadAnimation { name: String, reason: String },
    #[error("model {name}: too many vertices after de-duplication ({count})")]
    TooManyVertices { name: String, count: usize },
    #[error("map tile {name}: {source}")]
    Lightmap {
        name: String,
        #[source]
        source: LightmapError,
    },
}

impl ModelError {
    pub fn format(name: &str) -> impl FnOnce(FormatError) -> ModelError + '_ {
        move |source| ModelError::Format { name: name.to_string(), source }
    }

    pub fn bad_map(name: &str, reason: impl Into<String>) -> Self {
        ModelError::BadMap { name: name.to_string(), reason: reason.into() }
    }

    pub fn bad_alias(name: &str, reason: impl Into<String>) -> Self {
        ModelError::BadAliasModel { name: name.to_string(), reason: reason.into() }
    }

    pub fn bad_tags(name: &str, reason: impl Into<String>) -> Self {
        ModelError::BadTags { name: name.to_string(), reason: reason.into() }
    }

    pub fn bad_animation(name: &str, reason: impl Into<String>) -> Self {
        ModelError::BadAnimation { name: name.to_string(), reason: reason.into() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LightmapError {
    /// The block does not fit even into an empty page.
    #[error("consecutive calls to alloc_block({width},{height}) failed (lightmap_scale: {scale})")]
    BlockTooLarge { width: usize, height: usize, scale: i32 },
    #[error("invalid lightmap block size {width}x{height}")]
    InvalidBlock { width: usize, height: usize },
    #[error("too many lightmap pages (max {max})")]
    TooManyPages { max: usize },
}

/// Errors surfaced by the per-frame API.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("ring in entity transformations at entity {0:?}")]
    TransformRing(EntityId),
    #[error("too many entities (max {max})")]
    TooManyEntities { max: usize },
    #[error("too many particles (max {max})")]
    TooManyParticles { max: usize },
    #[error("unknown entity {0:?}")]
    UnknownEntity(EntityId),
    #[error("unknown model index {0}")]
    UnknownModel(usize),
    #[error("unknown animation state {0}")]
    UnknownAnimState(usize),
    #[error("model {model} has no animation named '{name}'")]
    UnknownAnimation { model: String, name: String },
    #[error("model {0} has no animations")]
    NoAnimations(String),
    #[error("animation queue is full")]
    AnimationQueueFull,
    #[error("no map loaded")]
    NoMap,
    #[error(transparent)]
    Model(#[from] ModelError),
}
