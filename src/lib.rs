//! # GPUI Video Surface
//!
//! An embeddable video surface for GPUI, driving a media engine through a
//! small property/command/event boundary.
//!
//! ## Features
//!
//! - Playback facade with a cached snapshot of position, duration, pause
//!   state, source, rate, volume and fill mode
//! - Change notifications raised only when a value actually changes
//! - Engine callbacks marshaled onto the UI thread through a queue
//! - Lazily created render context with off-thread frame notifications
//! - GStreamer engine with CPU NV12 conversion and resume positions
//!
//! ## Example
//!
//! ```no_run
//! use gpui_video_surface::{SurfaceConfig, Url, VideoSurface};
//!
//! let uri = Url::parse("file:///path/to/video.mp4").unwrap();
//! let mut surface = VideoSurface::new(SurfaceConfig::default().source(uri)).unwrap();
//! surface.play();
//! ```

mod bridge;
mod config;
mod dispatch;
mod element;
mod engine;
mod error;
mod gst_engine;
mod property;
mod renderer;
mod snapshot;
mod surface;
#[cfg(test)]
mod testing;
mod view;

pub use config::{SurfaceConfig, default_watch_later_dir};
pub use dispatch::{UiQueue, UiTask};
pub use element::{PaintedBounds, SurfaceElement};
pub use engine::{
    Callback, EndFileReason, Engine, EngineEvent, LogLevel, PixelFormat, RenderApi, RenderBackend,
    RenderContext, RenderTarget,
};
pub use error::Error;
pub use gst_engine::{GstEngine, SoftwareRenderContext, WatchLater};
pub use property::{Format, Property, PropertyValue};
pub use renderer::FrameRenderer;
pub use snapshot::{Changed, FillMode, PlaybackSnapshot, PlaybackState};
pub use surface::VideoSurface;
pub use view::{SurfaceEvent, VideoSurfaceView, video_surface_view};

// Re-export commonly used types
pub use gstreamer as gst;
pub use url::Url;
