use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("unsupported texture atlas format: {0}")]
    UnsupportedFormat(String),

    #[error("source image `{0}` is not loaded")]
    MissingSource(String),

    #[error("unknown atlas `{0}`")]
    UnknownAtlas(String),

    #[error("invalid region key `{0}`; expected \"x,y,w,h\"")]
    InvalidRegionKey(String),

    #[error("unknown animation `{0}`")]
    UnknownAnimation(String),

    #[error("animation `{animation}` references missing region `{region}`")]
    MissingAnimationFrame { animation: String, region: String },

    #[error("spritesheet frame size {width}x{height} is invalid")]
    InvalidFrameSize { width: u32, height: u32 },

    #[error("image `{name}` has {actual} bytes of pixel data; expected {expected}")]
    InvalidImageData {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid atlas descriptor: {0}")]
    Json(#[from] serde_json::Error),
}
