//! The boundary between the surface and the media engine it embeds.
//!
//! The engine is modelled after a C media-engine handle: every method takes
//! `&self`, values are exchanged as [`PropertyValue`]s keyed by name, and
//! property changes are queued inside the engine until [`Engine::poll_event`]
//! drains them. Dropping the engine terminates it.

use crate::Error;
use crate::property::{Format, PropertyValue};
use std::ffi::c_void;
use std::sync::Arc;

/// Callback invoked from an engine-internal thread.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Why a file stopped playing.
#[derive(Debug, Clone, PartialEq)]
pub enum EndFileReason {
    Eof,
    Stop,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

/// Events delivered by [`Engine::poll_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// An observed property changed.
    PropertyChange {
        reply_id: u64,
        name: String,
        value: PropertyValue,
    },
    StartFile,
    FileLoaded,
    EndFile { reason: EndFileReason },
    Log { level: LogLevel, message: String },
}

/// Graphics API a render context is created for.
///
/// The OpenGL resolver is borrowed from the context that is current on the
/// calling thread and is only used while the render context is created.
#[derive(Clone, Copy)]
pub enum RenderApi<'a> {
    OpenGl {
        get_proc_address: &'a dyn Fn(&str) -> *mut c_void,
    },
    Software,
}

impl std::fmt::Debug for RenderApi<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderApi::OpenGl { .. } => f.write_str("OpenGl"),
            RenderApi::Software => f.write_str("Software"),
        }
    }
}

/// Byte order of a software render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba,
    Bgra,
}

/// Output surface for a single frame.
#[derive(Debug)]
pub enum RenderTarget<'a> {
    Framebuffer {
        fbo: i32,
        width: u32,
        height: u32,
        flip_y: bool,
    },
    Software {
        pixels: &'a mut [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        flip_y: bool,
    },
}

impl RenderTarget<'_> {
    pub fn size(&self) -> (u32, u32) {
        match self {
            RenderTarget::Framebuffer { width, height, .. }
            | RenderTarget::Software { width, height, .. } => (*width, *height),
        }
    }

    pub fn flip_y(&self) -> bool {
        match self {
            RenderTarget::Framebuffer { flip_y, .. } | RenderTarget::Software { flip_y, .. } => {
                *flip_y
            }
        }
    }
}

/// An engine render context. Dropping it frees the context.
pub trait RenderContext {
    fn render(&mut self, target: RenderTarget<'_>) -> Result<(), Error>;

    /// Installs the callback invoked (off-thread) whenever a new frame is ready.
    fn set_update_callback(&mut self, callback: Option<Callback>);
}

/// The part of the engine the frame renderer is allowed to use.
pub trait RenderBackend {
    fn create_render_context(&self, api: RenderApi<'_>) -> Result<Box<dyn RenderContext>, Error>;
}

/// Property/command API of an embedded media engine.
pub trait Engine: RenderBackend + Send + Sync {
    /// Sets an option. Options may be set before [`Engine::initialize`].
    fn set_option(&self, name: &str, value: PropertyValue) -> Result<(), Error>;

    fn initialize(&self) -> Result<(), Error>;

    fn set_property(&self, name: &str, value: PropertyValue) -> Result<(), Error>;

    fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue, Error>;

    fn command(&self, args: &[&str]) -> Result<(), Error>;

    /// Starts delivering [`EngineEvent::PropertyChange`] for `name`, tagged with `reply_id`.
    fn observe_property(&self, reply_id: u64, name: &str, format: Format) -> Result<(), Error>;

    /// Pops the next queued event without blocking.
    fn poll_event(&self) -> Option<EngineEvent>;

    /// Installs the callback invoked (off-thread) when new events are queued.
    fn set_wakeup_callback(&self, callback: Option<Callback>);
}
