use crate::Error;
use crate::bridge::{self, Changes};
use crate::config::SurfaceConfig;
use crate::dispatch::{UiQueue, UiTask};
use crate::engine::{Callback, Engine, RenderContext};
use crate::gst_engine::GstEngine;
use crate::property::{Format, Property, PropertyValue};
use crate::renderer::FrameRenderer;
use crate::snapshot::{Changed, FillMode, PlaybackSnapshot, PlaybackState};
use url::Url;

/// A video surface driving an embedded media engine.
///
/// The surface owns the engine and mirrors a subset of its state in a
/// [`PlaybackSnapshot`]. Every method must be called from the UI thread.
/// Engine callbacks only post to an internal queue that
/// [`VideoSurface::dispatch_pending`] drains.
///
/// Slots never fail: engine errors are logged and the optimistic cache update
/// stands until the engine reports otherwise.
pub struct VideoSurface<E: Engine = GstEngine> {
    engine: E,
    render_context: Option<Box<dyn RenderContext>>,
    snapshot: PlaybackSnapshot,
    changes: Changes,
    queue: UiQueue,
}

impl VideoSurface<GstEngine> {
    /// Creates a surface backed by GStreamer.
    pub fn new(config: SurfaceConfig) -> Result<Self, Error> {
        let engine = GstEngine::new().map_err(|err| {
            log::error!("failed to create media engine: {err}");
            match err {
                Error::EngineCreate(_) => err,
                other => Error::EngineCreate(other.to_string()),
            }
        })?;
        Self::with_engine(engine, config)
    }
}

impl<E: Engine> VideoSurface<E> {
    /// Wraps `engine`: applies the configured options, initializes it and
    /// starts observing the mirrored properties.
    pub fn with_engine(engine: E, config: SurfaceConfig) -> Result<Self, Error> {
        for (name, value) in config.options() {
            if let Err(err) = engine.set_option(name, PropertyValue::from(value)) {
                log::warn!("failed to set option {name}={value}: {err}");
            }
        }

        engine.initialize().map_err(|err| {
            log::error!("failed to initialize media engine: {err}");
            match err {
                Error::EngineInit(_) => err,
                other => Error::EngineInit(other.to_string()),
            }
        })?;

        for property in Property::OBSERVED {
            if let Err(err) =
                engine.observe_property(property.reply_id(), property.name(), property.format())
            {
                log::warn!("failed to observe {property}: {err}");
            }
        }

        let queue = UiQueue::new();
        engine.set_wakeup_callback(Some(queue.poster(UiTask::EngineEvents)));

        let mut surface = Self {
            engine,
            render_context: None,
            snapshot: PlaybackSnapshot::default(),
            changes: Changes::default(),
            queue,
        };
        if let Some(source) = config.initial_source() {
            surface.set_source(source.clone());
        }
        Ok(surface)
    }

    pub fn play(&mut self) {
        if !self.snapshot.paused && !self.snapshot.stopped {
            return;
        }
        log::debug!("play");

        // A stop unloads the media, so it has to be loaded again.
        if self.snapshot.stopped {
            if let Some(source) = self.snapshot.source.clone() {
                self.load(&source);
            }
        }

        self.write(Property::Pause, false.into());
        self.set_state(PlaybackState::Playing);
        if self.snapshot.paused {
            self.snapshot.paused = false;
            self.changes.raise(Changed::Paused);
        }
    }

    pub fn pause(&mut self) {
        if self.snapshot.paused {
            return;
        }
        log::debug!("pause");

        self.write(Property::Pause, true.into());
        self.snapshot.paused = true;
        if self.snapshot.playback_state != PlaybackState::Stopped {
            self.set_state(PlaybackState::Paused);
        }
        self.changes.raise(Changed::Paused);
    }

    pub fn stop(&mut self) {
        log::debug!("stop");

        self.set_position(0.0);
        self.write(Property::Stop, true.into());
        self.snapshot.stopped = true;
        self.set_state(PlaybackState::Stopped);
        self.changes.raise(Changed::Stopped);
    }

    /// Jumps to `seconds`. Does not clear `stopped`; that happens once the
    /// engine reports a position past zero.
    pub fn set_position(&mut self, seconds: f64) {
        if seconds == self.snapshot.position || !finite("position", seconds) {
            return;
        }

        self.write(Property::TimePos, seconds.into());
        self.snapshot.position = seconds;
        self.changes.raise(Changed::Position);
    }

    /// Seeks relative to the current position. The cached position is
    /// updated when the engine reports the new one.
    pub fn seek(&mut self, offset: f64) {
        if !finite("seek offset", offset) {
            return;
        }
        let offset = offset.to_string();
        self.send(&["add", Property::TimePos.name(), &offset]);
    }

    pub fn set_source(&mut self, source: Url) {
        if self.snapshot.source.as_ref() == Some(&source) {
            return;
        }
        log::debug!("loading {source}");

        self.load(&source);
        self.snapshot.source = Some(source);
        self.changes.raise(Changed::Source);
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        if rate == self.snapshot.playback_rate || !finite("playback rate", rate) {
            return;
        }

        self.write(Property::Speed, rate.into());
        self.snapshot.playback_rate = rate;
        self.changes.raise(Changed::PlaybackRate);
    }

    /// Sets the volume as a fraction; the engine takes a percentage.
    pub fn set_volume(&mut self, volume: f64) {
        if volume == self.snapshot.volume || !finite("volume", volume) {
            return;
        }

        self.write(Property::Volume, (volume * 100.0).into());
        self.snapshot.volume = volume;
        self.changes.raise(Changed::Volume);
    }

    /// Advances the fill mode one step along the fixed
    /// Stretch → PreserveAspectCrop → PreserveAspectFit cycle.
    ///
    /// Only a request for the current mode is honoured, as a no-op; any other
    /// requested mode advances the cycle from the current one.
    pub fn set_fill_mode(&mut self, mode: FillMode) {
        let current = self.snapshot.fill_mode;
        if mode == current {
            return;
        }

        let next = current.next();
        if mode != next {
            log::debug!("fill mode {mode:?} requested, advancing {current:?} -> {next:?}");
        }
        self.write(Property::VideoAspect, next.aspect_hint().into());
        self.snapshot.fill_mode = next;
        self.changes.raise(Changed::FillMode);
    }

    pub fn cycle_fill_mode(&mut self) {
        self.set_fill_mode(self.snapshot.fill_mode.next());
    }

    /// Runs the UI-thread work queued by engine callbacks, in order.
    ///
    /// Returns whether a new frame is ready and the surface should be redrawn.
    pub fn dispatch_pending(&mut self) -> bool {
        let mut redraw = false;
        for task in self.queue.take_all() {
            match task {
                UiTask::EngineEvents => {
                    let consumed =
                        bridge::drain(&self.engine, &mut self.snapshot, &mut self.changes);
                    log::trace!("handled {consumed} engine events");
                }
                UiTask::FrameReady => redraw = true,
            }
        }
        redraw
    }

    /// Whether engine callbacks queued work since the last dispatch.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Installs a callback run (off-thread) whenever work is queued, so a host
    /// event loop can schedule [`VideoSurface::dispatch_pending`].
    pub fn set_wakeup_notifier(&self, notify: Option<Callback>) {
        self.queue.set_notify(notify);
    }

    /// Change notifications raised since the last call, oldest first.
    pub fn take_changes(&mut self) -> Vec<Changed> {
        self.changes.take()
    }

    pub fn renderer(&mut self) -> FrameRenderer<'_> {
        FrameRenderer::new(&self.engine, &mut self.render_context, &self.queue)
    }

    pub fn position(&self) -> f64 {
        self.snapshot.position
    }

    pub fn duration(&self) -> f64 {
        self.snapshot.duration
    }

    pub fn paused(&self) -> bool {
        self.snapshot.paused
    }

    pub fn stopped(&self) -> bool {
        self.snapshot.stopped
    }

    pub fn source(&self) -> Option<&Url> {
        self.snapshot.source.as_ref()
    }

    pub fn playback_rate(&self) -> f64 {
        self.snapshot.playback_rate
    }

    pub fn volume(&self) -> f64 {
        self.snapshot.volume
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.snapshot.playback_state
    }

    pub fn fill_mode(&self) -> FillMode {
        self.snapshot.fill_mode
    }

    pub fn snapshot(&self) -> &PlaybackSnapshot {
        &self.snapshot
    }

    /// Sends a raw engine command.
    pub fn command(&self, args: &[&str]) -> Result<(), Error> {
        self.engine.command(args)
    }

    pub fn set_option(&self, name: &str, value: PropertyValue) -> Result<(), Error> {
        self.engine.set_option(name, value)
    }

    pub fn set_property(&self, name: &str, value: PropertyValue) -> Result<(), Error> {
        self.engine.set_property(name, value)
    }

    pub fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue, Error> {
        self.engine.get_property(name, format)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn load(&self, source: &Url) {
        let target = match source.to_file_path() {
            Ok(path) if source.scheme() == "file" => path.to_string_lossy().into_owned(),
            _ => source.to_string(),
        };
        self.send(&["loadfile", &target]);
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.snapshot.playback_state != state {
            self.snapshot.playback_state = state;
            self.changes.raise(Changed::PlaybackState);
        }
    }

    fn write(&self, property: Property, value: PropertyValue) {
        if let Err(err) = self.engine.set_property(property.name(), value) {
            log::warn!("failed to set {property}: {err}");
        }
    }

    fn send(&self, args: &[&str]) {
        if let Err(err) = self.engine.command(args) {
            log::warn!("command {args:?} failed: {err}");
        }
    }
}

fn finite(what: &str, value: f64) -> bool {
    if !value.is_finite() {
        log::warn!("ignoring non-finite {what}: {value}");
    }
    value.is_finite()
}

impl<E: Engine> Drop for VideoSurface<E> {
    fn drop(&mut self) {
        self.engine.set_wakeup_callback(None);
        // The render context must go before the engine it was created from.
        if let Some(context) = self.render_context.take() {
            drop(context);
            log::debug!("render context released");
        }
    }
}

impl<E: Engine> std::fmt::Debug for VideoSurface<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSurface")
            .field("snapshot", &self.snapshot)
            .field("has_render_context", &self.render_context.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineEvent, RenderApi, RenderTarget};
    use crate::testing::{Call, FakeEngine, FakeHandle};

    fn surface() -> (VideoSurface<FakeEngine>, FakeHandle) {
        let engine = FakeEngine::new();
        let handle = engine.handle();
        let surface = VideoSurface::with_engine(engine, SurfaceConfig::empty()).unwrap();
        handle.clear_calls();
        (surface, handle)
    }

    fn count(changes: &[Changed], changed: Changed) -> usize {
        changes.iter().filter(|c| **c == changed).count()
    }

    #[test]
    fn construction_applies_options_then_initializes_then_observes() {
        let engine = FakeEngine::new();
        let handle = engine.handle();
        let config = SurfaceConfig::empty().option("keep-open", "always");

        let _surface = VideoSurface::with_engine(engine, config).unwrap();

        let calls = handle.calls();
        assert_eq!(
            calls[0],
            Call::SetOption("keep-open".into(), PropertyValue::from("always"))
        );
        assert_eq!(calls[1], Call::Initialize);
        let observed: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Observe(_, name, _) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            observed,
            vec!["duration", "time-pos", "pause", "path", "speed", "volume"]
        );
        assert!(handle.has_wakeup_callback());
    }

    #[test]
    fn initialization_failure_aborts_construction() {
        let engine = FakeEngine::failing_init();
        let handle = engine.handle();

        let result = VideoSurface::with_engine(engine, SurfaceConfig::empty());

        assert!(matches!(result, Err(Error::EngineInit(_))));
        assert_eq!(handle.calls().last(), Some(&Call::Terminate));
    }

    #[test]
    fn setters_given_current_values_do_nothing() {
        let (mut surface, handle) = surface();
        let url = Url::parse("https://example.com/a.mp4").unwrap();
        surface.set_source(url.clone());
        surface.take_changes();
        handle.clear_calls();

        surface.set_position(0.0);
        surface.set_playback_rate(1.0);
        surface.set_volume(1.0);
        surface.set_fill_mode(FillMode::Stretch);
        surface.set_source(url);
        surface.pause();

        assert!(handle.calls().is_empty());
        assert!(surface.take_changes().is_empty());
    }

    #[test]
    fn volume_is_written_as_percentage() {
        let (mut surface, handle) = surface();

        surface.set_volume(0.5);

        assert_eq!(handle.writes("volume"), vec![PropertyValue::Double(50.0)]);
        assert_eq!(surface.volume(), 0.5);
        assert_eq!(surface.take_changes(), vec![Changed::Volume]);
    }

    #[test]
    fn engine_volume_is_mirrored_as_fraction() {
        let (mut surface, handle) = surface();

        handle.push_property(Property::Volume, PropertyValue::Double(75.0));
        surface.dispatch_pending();

        assert_eq!(surface.volume(), 0.75);
    }

    #[test]
    fn fill_mode_cycles_through_three_modes() {
        let (mut surface, handle) = surface();

        let mut seen = Vec::new();
        for _ in 0..3 {
            surface.cycle_fill_mode();
            seen.push(surface.fill_mode());
        }

        assert_eq!(
            seen,
            vec![
                FillMode::PreserveAspectCrop,
                FillMode::PreserveAspectFit,
                FillMode::Stretch
            ]
        );
        assert_eq!(
            handle.writes("video-aspect"),
            vec![
                PropertyValue::Double(2.0),
                PropertyValue::Double(1.3333),
                PropertyValue::Double(1.7777)
            ]
        );
        assert_eq!(count(&surface.take_changes(), Changed::FillMode), 3);
    }

    #[test]
    fn fill_mode_ignores_which_other_mode_was_requested() {
        let (mut surface, handle) = surface();

        surface.set_fill_mode(FillMode::PreserveAspectFit);

        assert_eq!(surface.fill_mode(), FillMode::PreserveAspectCrop);
        assert_eq!(handle.writes("video-aspect"), vec![PropertyValue::Double(2.0)]);
    }

    #[test]
    fn play_unpauses_and_reports_playing() {
        let (mut surface, handle) = surface();

        surface.play();

        assert_eq!(handle.writes("pause"), vec![PropertyValue::Flag(false)]);
        assert_eq!(surface.playback_state(), PlaybackState::Playing);
        assert_eq!(
            surface.take_changes(),
            vec![Changed::PlaybackState, Changed::Paused]
        );
    }

    #[test]
    fn play_while_playing_is_a_no_op() {
        let (mut surface, handle) = surface();
        surface.play();
        handle.push_property(Property::TimePos, PropertyValue::Double(0.5));
        surface.dispatch_pending();
        surface.take_changes();
        handle.clear_calls();

        surface.play();

        assert!(handle.calls().is_empty());
        assert!(surface.take_changes().is_empty());
    }

    #[test]
    fn play_after_stop_reloads_the_source() {
        let (mut surface, handle) = surface();
        surface.set_source(Url::parse("https://example.com/a.mp4").unwrap());
        surface.play();
        handle.push_property(Property::TimePos, PropertyValue::Double(3.0));
        surface.dispatch_pending();
        surface.stop();
        handle.clear_calls();

        surface.play();

        assert_eq!(
            handle.commands(),
            vec![vec![
                "loadfile".to_string(),
                "https://example.com/a.mp4".to_string()
            ]]
        );
        assert_eq!(surface.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn pause_before_progress_reports_paused() {
        let (mut surface, handle) = surface();
        surface.play();
        surface.take_changes();

        surface.pause();
        handle.push_property(Property::Pause, PropertyValue::Flag(true));
        surface.dispatch_pending();

        assert!(surface.paused());
        assert!(surface.stopped());
        assert_eq!(surface.playback_state(), PlaybackState::Paused);
    }

    #[test]
    fn play_while_stopped_and_unpaused_keeps_paused_quiet() {
        let (mut surface, handle) = surface();
        surface.play();
        handle.push_property(Property::TimePos, PropertyValue::Double(2.0));
        surface.dispatch_pending();
        surface.stop();
        surface.take_changes();

        surface.play();

        assert!(!surface.paused());
        assert_eq!(surface.take_changes(), vec![Changed::PlaybackState]);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let (mut surface, handle) = surface();

        surface.set_position(f64::NAN);
        surface.set_volume(f64::NAN);
        surface.set_playback_rate(f64::INFINITY);
        surface.seek(f64::NAN);

        assert!(handle.calls().is_empty());
        assert!(surface.take_changes().is_empty());
        assert_eq!(surface.position(), 0.0);
        assert_eq!(surface.volume(), 1.0);
    }

    #[test]
    fn pause_requests_pause_and_reports_paused() {
        let (mut surface, handle) = surface();
        surface.play();
        handle.push_property(Property::TimePos, PropertyValue::Double(1.0));
        surface.dispatch_pending();
        surface.take_changes();
        handle.clear_calls();

        surface.pause();

        assert_eq!(handle.writes("pause"), vec![PropertyValue::Flag(true)]);
        assert_eq!(surface.playback_state(), PlaybackState::Paused);
        assert_eq!(
            surface.take_changes(),
            vec![Changed::PlaybackState, Changed::Paused]
        );
    }

    #[test]
    fn stop_rewinds_and_marks_stopped() {
        let (mut surface, handle) = surface();
        surface.play();
        handle.push_property(Property::TimePos, PropertyValue::Double(12.0));
        surface.dispatch_pending();
        surface.take_changes();
        handle.clear_calls();

        surface.stop();

        assert_eq!(handle.writes("time-pos"), vec![PropertyValue::Double(0.0)]);
        assert_eq!(handle.writes("stop"), vec![PropertyValue::Flag(true)]);
        assert!(surface.stopped());
        assert_eq!(surface.position(), 0.0);
        assert_eq!(surface.playback_state(), PlaybackState::Stopped);
        let changes = surface.take_changes();
        assert_eq!(count(&changes, Changed::Stopped), 1);
        assert_eq!(count(&changes, Changed::Position), 1);
    }

    #[test]
    fn engine_position_after_stop_clears_stopped_once() {
        let (mut surface, handle) = surface();
        surface.stop();
        surface.take_changes();

        handle.push_property(Property::TimePos, PropertyValue::Double(0.25));
        surface.dispatch_pending();

        assert!(!surface.stopped());
        assert_eq!(count(&surface.take_changes(), Changed::Stopped), 1);
    }

    #[test]
    fn set_position_keeps_stopped() {
        let (mut surface, handle) = surface();

        surface.set_position(30.0);

        assert!(surface.stopped());
        assert_eq!(handle.writes("time-pos"), vec![PropertyValue::Double(30.0)]);
        assert_eq!(surface.take_changes(), vec![Changed::Position]);
    }

    #[test]
    fn seek_is_relative_and_leaves_the_cache_alone() {
        let (mut surface, handle) = surface();

        surface.seek(-5.0);
        surface.seek(2.5);

        assert_eq!(
            handle.commands(),
            vec![
                vec!["add".to_string(), "time-pos".into(), "-5".into()],
                vec!["add".to_string(), "time-pos".into(), "2.5".into()],
            ]
        );
        assert_eq!(surface.position(), 0.0);
        assert!(surface.take_changes().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn local_sources_load_as_paths() {
        let (mut surface, handle) = surface();

        surface.set_source(Url::from_file_path("/media/clip one.mkv").unwrap());

        assert_eq!(
            handle.commands(),
            vec![vec!["loadfile".to_string(), "/media/clip one.mkv".into()]]
        );
        assert_eq!(surface.take_changes(), vec![Changed::Source]);
    }

    #[test]
    fn playback_rate_is_written_to_speed() {
        let (mut surface, handle) = surface();

        surface.set_playback_rate(1.5);

        assert_eq!(handle.writes("speed"), vec![PropertyValue::Double(1.5)]);
        assert_eq!(surface.take_changes(), vec![Changed::PlaybackRate]);
    }

    #[test]
    fn queued_events_are_all_applied_in_one_dispatch() {
        let (mut surface, handle) = surface();
        handle.push_property(Property::Duration, PropertyValue::Double(120.0));
        handle.push_property(Property::Speed, PropertyValue::Double(0.5));

        surface.dispatch_pending();

        assert_eq!(surface.duration(), 120.0);
        assert_eq!(surface.playback_rate(), 0.5);
        assert_eq!(handle.pending_events(), 0);
        assert!(!surface.has_pending());
    }

    #[test]
    fn unobserved_and_malformed_events_change_nothing() {
        let (mut surface, handle) = surface();
        let before = surface.snapshot().clone();

        handle.push(EngineEvent::PropertyChange {
            reply_id: 99,
            name: "chapter".into(),
            value: PropertyValue::Int64(3),
        });
        handle.push_property(Property::TimePos, PropertyValue::from("soon"));
        handle.push(EngineEvent::StartFile);
        surface.dispatch_pending();

        assert_eq!(surface.snapshot(), &before);
        assert!(surface.take_changes().is_empty());
    }

    #[test]
    fn frame_ready_requests_a_redraw() {
        let (mut surface, handle) = surface();
        let mut renderer = surface.renderer();
        renderer
            .render_frame(
                RenderApi::Software,
                RenderTarget::Framebuffer {
                    fbo: 0,
                    width: 2,
                    height: 2,
                    flip_y: false,
                },
            )
            .unwrap();

        assert!(!surface.dispatch_pending());
        handle.fire_frame_ready();
        assert!(surface.dispatch_pending());
    }

    #[test]
    fn render_context_is_released_before_the_engine() {
        let (mut surface, handle) = surface();
        surface
            .renderer()
            .render_frame(
                RenderApi::Software,
                RenderTarget::Framebuffer {
                    fbo: 0,
                    width: 2,
                    height: 2,
                    flip_y: false,
                },
            )
            .unwrap();

        drop(surface);

        let calls = handle.calls();
        let freed = calls.iter().position(|c| *c == Call::FreeRenderContext);
        let terminated = calls.iter().position(|c| *c == Call::Terminate);
        assert!(freed.is_some());
        assert!(freed < terminated);
    }

    #[test]
    fn passthrough_reaches_the_engine() {
        let (surface, handle) = surface();

        surface
            .set_property("sub-visibility", PropertyValue::Flag(false))
            .unwrap();
        surface.command(&["cycle", "mute"]).unwrap();

        assert_eq!(
            surface.get_property("sub-visibility", Format::String).unwrap(),
            PropertyValue::from("no")
        );
        assert_eq!(
            handle.commands(),
            vec![vec!["cycle".to_string(), "mute".into()]]
        );
        assert!(matches!(
            surface.get_property("chapter", Format::Int64),
            Err(Error::PropertyNotFound(_))
        ));
    }
}
