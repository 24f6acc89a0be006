use crate::Error;
use crate::dispatch::{UiQueue, UiTask};
use crate::engine::{RenderApi, RenderBackend, RenderContext, RenderTarget};

/// Per-frame renderer borrowed from a [`VideoSurface`](crate::VideoSurface).
///
/// The render context lives in the surface and is created lazily on the first
/// frame, from the graphics context that is current at that point. Call
/// [`FrameRenderer::release_context`] when that graphics context goes away;
/// the next frame re-creates the render context against the new one.
pub struct FrameRenderer<'a> {
    backend: &'a dyn RenderBackend,
    context: &'a mut Option<Box<dyn RenderContext>>,
    queue: &'a UiQueue,
}

impl<'a> FrameRenderer<'a> {
    pub(crate) fn new(
        backend: &'a dyn RenderBackend,
        context: &'a mut Option<Box<dyn RenderContext>>,
        queue: &'a UiQueue,
    ) -> Self {
        Self {
            backend,
            context,
            queue,
        }
    }

    /// Renders the current frame into `target`.
    ///
    /// Fails with [`Error::RenderContext`] when the render context cannot be
    /// created; nothing can be rendered in that case.
    pub fn render_frame(&mut self, api: RenderApi<'_>, target: RenderTarget<'_>) -> Result<(), Error> {
        let context = match self.context.take() {
            Some(context) => context,
            None => self.create_context(api)?,
        };
        let context = self.context.insert(context);
        context.render(target)
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn release_context(&mut self) {
        if self.context.take().is_some() {
            log::debug!("render context released");
        }
    }

    fn create_context(&self, api: RenderApi<'_>) -> Result<Box<dyn RenderContext>, Error> {
        let mut context = self.backend.create_render_context(api).map_err(|err| {
            log::error!("failed to create {api:?} render context: {err}");
            match err {
                Error::RenderContext(_) => err,
                other => Error::RenderContext(other.to_string()),
            }
        })?;
        // New-frame notifications arrive off-thread; the redraw happens on the UI thread.
        context.set_update_callback(Some(self.queue.poster(UiTask::FrameReady)));
        log::debug!("created {api:?} render context");
        Ok(context)
    }
}
