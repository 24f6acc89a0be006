use crate::Error;
use crate::config::SurfaceConfig;
use crate::element::{PaintedBounds, SurfaceElement};
use crate::engine::{Callback, PixelFormat, RenderApi, RenderTarget};
use crate::snapshot::{Changed, PlaybackState};
use crate::surface::VideoSurface;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, unbounded};
use gpui::{
    App, AppContext, Context, Entity, EventEmitter, IntoElement, ParentElement, Render,
    RenderImage, Styled, Task, Window, div,
};
use std::sync::Arc;

/// Largest edge rendered, in device pixels.
const MAX_FRAME_EDGE: u32 = 4096;

/// Events emitted by a [`VideoSurfaceView`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// A mirrored playback value changed.
    Changed(Changed),
    /// A new frame was rendered.
    NewFrame,
    /// Rendering failed and was disabled.
    Error(String),
}

/// A gpui view hosting a [`VideoSurface`].
pub struct VideoSurfaceView {
    surface: VideoSurface,
    frame: Option<Arc<RenderImage>>,
    frame_size: (u32, u32),
    painted: PaintedBounds,
    pixels: Vec<u8>,
    render_failed: bool,
    _wakeups: Task<()>,
}

impl VideoSurfaceView {
    /// Wraps `surface`. Work queued by engine callbacks re-renders the view.
    pub fn new(surface: VideoSurface, cx: &mut Context<Self>) -> Self {
        let (notifier, mut wakeups) = wakeup_channel();
        surface.set_wakeup_notifier(Some(notifier));

        let wakeups = cx.spawn(async move |this, cx| {
            while wakeups.next().await.is_some() {
                if this.update(cx, |_, cx| cx.notify()).is_err() {
                    break;
                }
            }
        });

        Self {
            surface,
            frame: None,
            frame_size: (0, 0),
            painted: PaintedBounds::default(),
            pixels: Vec::new(),
            render_failed: false,
            _wakeups: wakeups,
        }
    }

    pub fn surface(&self) -> &VideoSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut VideoSurface {
        &mut self.surface
    }

    /// Frame size in device pixels for the last painted bounds.
    fn target_size(&self, window: &Window) -> Option<(u32, u32)> {
        let bounds = self.painted.get()?;
        let scale = window.scale_factor();
        let width = (f32::from(bounds.size.width) * scale).round() as u32;
        let height = (f32::from(bounds.size.height) * scale).round() as u32;
        (width > 0 && height > 0).then(|| {
            (width.min(MAX_FRAME_EDGE), height.min(MAX_FRAME_EDGE))
        })
    }

    fn render_frame(&mut self, width: u32, height: u32) -> Result<Arc<RenderImage>, Error> {
        let stride = width as usize * 4;
        self.pixels.resize(stride * height as usize, 0);

        self.surface.renderer().render_frame(
            RenderApi::Software,
            RenderTarget::Software {
                pixels: &mut self.pixels,
                width,
                height,
                stride,
                // RenderImage data is BGRA.
                format: PixelFormat::Bgra,
                flip_y: false,
            },
        )?;

        let buffer = image::ImageBuffer::<image::Rgba<u8>, _>::from_raw(width, height, self.pixels.clone())
            .ok_or(Error::UnsupportedTarget)?;
        let frames: smallvec::SmallVec<[image::Frame; 1]> =
            smallvec::SmallVec::from_elem(image::Frame::new(buffer), 1);
        Ok(Arc::new(RenderImage::new(frames)))
    }
}

impl EventEmitter<SurfaceEvent> for VideoSurfaceView {}

impl Render for VideoSurfaceView {
    fn render(&mut self, window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let frame_ready = self.surface.dispatch_pending();
        let changes = self.surface.take_changes();
        let changed = !changes.is_empty();
        for change in changes {
            cx.emit(SurfaceEvent::Changed(change));
        }

        if let Some(size) = self.target_size(window).filter(|_| !self.render_failed) {
            if frame_ready || changed || self.frame.is_none() || size != self.frame_size {
                match self.render_frame(size.0, size.1) {
                    Ok(frame) => {
                        if let Some(old) = self.frame.replace(frame) {
                            if let Err(err) = window.drop_image(old) {
                                log::debug!("failed to drop previous frame: {err}");
                            }
                        }
                        self.frame_size = size;
                        cx.emit(SurfaceEvent::NewFrame);
                    }
                    Err(err) => {
                        log::error!("video rendering disabled: {err}");
                        self.render_failed = true;
                        cx.emit(SurfaceEvent::Error(err.to_string()));
                    }
                }
            }
        }

        let animate = self.surface.playback_state() != PlaybackState::Stopped
            || self.surface.has_pending();

        div().size_full().child(
            SurfaceElement::new(self.frame.clone(), self.painted.clone())
                .id("video-surface")
                .animate(animate),
        )
    }
}

/// Creates a GStreamer-backed surface and wraps it in a view entity.
pub fn video_surface_view(
    config: SurfaceConfig,
    cx: &mut App,
) -> Result<Entity<VideoSurfaceView>, Error> {
    let surface = VideoSurface::new(config)?;
    Ok(cx.new(|cx| VideoSurfaceView::new(surface, cx)))
}

/// A notifier callable from any thread, paired with the stream it feeds.
fn wakeup_channel() -> (Callback, UnboundedReceiver<()>) {
    let (tx, rx) = unbounded();
    let notifier: Callback = Arc::new(move || {
        if tx.unbounded_send(()).is_err() {
            log::trace!("surface view is gone, dropping wakeup");
        }
    });
    (notifier, rx)
}
