use gpui::{App, Application, Context, Entity, Render, Window, WindowOptions, div, prelude::*};
use gpui_video_surface::{SurfaceConfig, VideoSurfaceView, video_surface_view};
use std::path::PathBuf;
use url::Url;

struct MinimalExample {
    view: Entity<VideoSurfaceView>,
}

impl Render for MinimalExample {
    fn render(&mut self, _window: &mut Window, _cx: &mut Context<Self>) -> impl IntoElement {
        div().size_full().child(self.view.clone())
    }
}

fn media_uri() -> Url {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/test.mp4"));
    let path = std::fs::canonicalize(&path).unwrap_or(path);
    Url::from_file_path(path).expect("invalid file path")
}

fn main() {
    env_logger::init();
    Application::new().run(|cx: &mut App| {
        let uri = media_uri();

        cx.open_window(
            WindowOptions {
                focus: true,
                ..Default::default()
            },
            |_, cx| {
                let view = video_surface_view(SurfaceConfig::default().source(uri), cx)
                    .expect("failed to create video surface");
                view.update(cx, |view, _| view.surface_mut().play());
                cx.new(|_| MinimalExample { view })
            },
        )
        .unwrap();
        cx.activate(true);
    });
}
