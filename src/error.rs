use gstreamer as gst;

/// Errors produced by the surface, its renderer and the media engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create media engine: {0}")]
    EngineCreate(String),
    #[error("failed to initialize media engine: {0}")]
    EngineInit(String),
    #[error("failed to create render context: {0}")]
    RenderContext(String),
    #[error("render target is not supported by this render context")]
    UnsupportedTarget,
    #[error("property `{0}` not found")]
    PropertyNotFound(String),
    #[error("invalid value for property `{name}`: {value}")]
    InvalidValue { name: String, value: String },
    #[error("property `{0}` is not available")]
    PropertyUnavailable(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("invalid arguments for command `{0}`")]
    InvalidCommand(String),
    #[error("engine is not initialized")]
    Uninitialized,
    #[error("failed to cast gstreamer element")]
    Cast,
    #[error("failed to read media caps")]
    Caps,
    #[error(transparent)]
    Glib(#[from] glib::Error),
    #[error(transparent)]
    Bool(#[from] glib::BoolError),
    #[error(transparent)]
    StateChange(#[from] gst::StateChangeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_value(name: &str, value: impl std::fmt::Debug) -> Self {
        Error::InvalidValue {
            name: name.to_owned(),
            value: format!("{value:?}"),
        }
    }
}
