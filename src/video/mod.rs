// src/video/mod.rs

//! Vídeo: superfícies, pipeline de buffer triplo e áreas de fundo dos sprites.

pub mod adapter;
pub mod pipeline;
pub mod snapshot;
pub mod surface;

pub use adapter::Palette;
pub use pipeline::{
    FrameBufferPipeline, FramePresenter, FrameProducer, ReadSurfaceHandle, WriteSurfaceHandle,
};
pub use snapshot::{SnapshotError, SpriteBackgroundSnapshot, SpriteSnapshots};
pub use surface::{Rect, Surface};

/// Largura da área de imagem do AGI (em pixels AGI).
pub const PICTURE_WIDTH: usize = 160;

/// Altura da área de imagem do AGI.
pub const PICTURE_HEIGHT: usize = 168;
