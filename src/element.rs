use gpui::{
    Bounds, Element, ElementId, GlobalElementId, InspectorElementId, IntoElement, LayoutId,
    Pixels, RenderImage, Window,
};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

/// Shared record of where a surface was last painted.
pub type PaintedBounds = Rc<Cell<Option<Bounds<Pixels>>>>;

/// Paints the latest rendered frame of a surface, filling its parent.
pub struct SurfaceElement {
    frame: Option<Arc<RenderImage>>,
    painted: PaintedBounds,
    animate: bool,
    element_id: Option<ElementId>,
}

impl SurfaceElement {
    pub fn new(frame: Option<Arc<RenderImage>>, painted: PaintedBounds) -> Self {
        Self {
            frame,
            painted,
            animate: false,
            element_id: None,
        }
    }

    pub fn id(mut self, id: impl Into<ElementId>) -> Self {
        self.element_id = Some(id.into());
        self
    }

    /// Keep requesting animation frames so the owning view re-renders.
    pub fn animate(mut self, animate: bool) -> Self {
        self.animate = animate;
        self
    }
}

impl Element for SurfaceElement {
    type RequestLayoutState = ();
    type PrepaintState = ();

    fn id(&self) -> Option<ElementId> {
        self.element_id.clone()
    }

    fn source_location(&self) -> Option<&'static core::panic::Location<'static>> {
        None
    }

    fn request_layout(
        &mut self,
        _global_id: Option<&GlobalElementId>,
        _inspector_id: Option<&InspectorElementId>,
        window: &mut Window,
        cx: &mut gpui::App,
    ) -> (LayoutId, Self::RequestLayoutState) {
        let style = gpui::Style {
            size: gpui::Size {
                width: gpui::relative(1.).into(),
                height: gpui::relative(1.).into(),
            },
            ..Default::default()
        };

        let layout_id = window.request_layout(style, [], cx);
        (layout_id, ())
    }

    fn prepaint(
        &mut self,
        _global_id: Option<&GlobalElementId>,
        _inspector_id: Option<&InspectorElementId>,
        bounds: Bounds<Pixels>,
        _request_layout_state: &mut Self::RequestLayoutState,
        window: &mut Window,
        _cx: &mut gpui::App,
    ) -> Self::PrepaintState {
        // A resize needs a frame rendered at the new size.
        let resized = self.painted.replace(Some(bounds)) != Some(bounds);
        if self.animate || resized {
            window.request_animation_frame();
        }
    }

    fn paint(
        &mut self,
        _global_id: Option<&GlobalElementId>,
        _inspector_id: Option<&InspectorElementId>,
        bounds: Bounds<Pixels>,
        _request_layout_state: &mut Self::RequestLayoutState,
        _prepaint_state: &mut Self::PrepaintState,
        window: &mut Window,
        _cx: &mut gpui::App,
    ) {
        window.paint_quad(gpui::fill(bounds, gpui::black()));

        if let Some(frame) = self.frame.clone() {
            if let Err(err) = window.paint_image(bounds, gpui::Corners::default(), frame, 0, false) {
                log::warn!("failed to paint video frame: {err}");
            }
        }
    }
}

impl IntoElement for SurfaceElement {
    type Element = Self;

    fn into_element(self) -> Self::Element {
        self
    }
}
