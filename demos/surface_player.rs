use gpui::{
    App, Application, Context, Div, Entity, Render, SharedString, Stateful, Subscription, Window,
    WindowOptions, div, prelude::*,
};
use gpui_video_surface::{
    FillMode, PlaybackState, SurfaceConfig, SurfaceEvent, VideoSurface, VideoSurfaceView,
    video_surface_view,
};
use std::path::PathBuf;
use url::Url;

const SEEK_STEP: f64 = 5.0;
const VOLUME_STEP: f64 = 0.1;

struct SurfacePlayer {
    view: Entity<VideoSurfaceView>,
    status: SharedString,
    _events: Subscription,
}

impl SurfacePlayer {
    fn new(view: Entity<VideoSurfaceView>, cx: &mut Context<Self>) -> Self {
        let events = cx.subscribe(&view, |this: &mut Self, _view, event: &SurfaceEvent, cx| {
            match event {
                SurfaceEvent::Changed(change) => {
                    log::debug!("surface changed: {change:?}");
                    cx.notify();
                }
                SurfaceEvent::NewFrame => {}
                SurfaceEvent::Error(err) => {
                    this.status = format!("Error: {err}").into();
                    cx.notify();
                }
            }
        });

        Self {
            view,
            status: SharedString::default(),
            _events: events,
        }
    }

    fn control(
        id: &'static str,
        label: impl Into<SharedString>,
        cx: &mut Context<Self>,
        action: impl Fn(&mut VideoSurface) + 'static,
    ) -> Stateful<Div> {
        div()
            .id(id)
            .px_4()
            .py_2()
            .border_1()
            .cursor_pointer()
            .child(label.into())
            .on_click(cx.listener(move |this: &mut Self, _event, _window, cx| {
                this.view.update(cx, |view, cx| {
                    action(view.surface_mut());
                    cx.notify();
                });
                cx.notify();
            }))
    }
}

fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

impl Render for SurfacePlayer {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let surface = self.view.read(cx).surface();
        let state = surface.playback_state();
        let fill = surface.fill_mode();
        let info = format!(
            "{} / {}  x{:.2}  vol {:.0}%",
            format_time(surface.position()),
            format_time(surface.duration()),
            surface.playback_rate(),
            surface.volume() * 100.0,
        );

        let play_label = if state == PlaybackState::Playing {
            "Pause"
        } else {
            "Play"
        };
        let fill_label = match fill {
            FillMode::Stretch => "Stretch",
            FillMode::PreserveAspectFit => "Fit",
            FillMode::PreserveAspectCrop => "Crop",
        };

        let controls = div()
            .flex()
            .items_center()
            .gap_3()
            .child(Self::control("btn-back", "-5s", cx, |s| s.seek(-SEEK_STEP)))
            .child(Self::control("btn-play", play_label, cx, |s| {
                if s.playback_state() == PlaybackState::Playing {
                    s.pause();
                } else {
                    s.play();
                }
            }))
            .child(Self::control("btn-stop", "Stop", cx, |s| s.stop()))
            .child(Self::control("btn-forward", "+5s", cx, |s| s.seek(SEEK_STEP)))
            .child(Self::control("btn-fill", fill_label, cx, |s| s.cycle_fill_mode()))
            .child(Self::control("btn-vol-down", "Vol-", cx, |s| {
                s.set_volume((s.volume() - VOLUME_STEP).max(0.0))
            }))
            .child(Self::control("btn-vol-up", "Vol+", cx, |s| {
                s.set_volume((s.volume() + VOLUME_STEP).min(1.0))
            }))
            .child(info)
            .child(self.status.clone());

        div()
            .size_full()
            .flex()
            .flex_col()
            .child(div().flex_1().child(self.view.clone()))
            .child(div().p_2().child(controls))
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
        let config = SurfaceConfig::default()
            .resume_playback(true)
            .save_position_on_quit(true)
            .source(media_uri());

        cx.open_window(
            WindowOptions {
                focus: true,
                ..Default::default()
            },
            |_, cx| {
                let view =
                    video_surface_view(config, cx).expect("failed to create video surface");
                cx.new(|cx| SurfacePlayer::new(view, cx))
            },
        )
        .unwrap();
        cx.activate(true);
    });
}
