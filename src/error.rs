#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("terrain fetch returned status {status}")]
    TerrainStatus { status: u16 },

    #[error("texture fetch for {key} returned status {status}")]
    TextureStatus { key: String, status: u16 },

    #[error("texture not found: {key}")]
    TextureNotFound { key: String },

    #[error("image decode error: {0}")]
    ImageDecode(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("json error: {0}")]
    Json(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("view destroyed")]
    Destroyed,
}

impl Error {
    /// A definitive "this texture does not exist" answer. Everything else may
    /// succeed on a later attempt.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::TextureNotFound { .. })
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::ImageDecode(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Base64(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
