//! A media engine on top of GStreamer's `playbin`.
//!
//! Exposes playbin through the name-keyed property/command API of
//! [`Engine`]. A worker thread watches the bus and publishes changes of
//! observed properties, waking the surface once per batch.

use crate::Error;
use crate::engine::{
    Callback, EndFileReason, Engine, EngineEvent, LogLevel, RenderApi, RenderBackend,
    RenderContext,
};
use crate::property::{Format, PropertyValue};
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_app::prelude::*;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

mod render;
mod watch_later;

pub use render::SoftwareRenderContext;
pub use watch_later::WatchLater;

use render::{FrameSlot, SharedFrame, UpdateSlot};

const SINK_NAME: &str = "surface_video";
const BUS_POLL_MS: u64 = 50;

/// Options that only change engine behaviour and can be set at any time.
const OPTIONS: [&str; 5] = [
    "terminal",
    "keep-open",
    "watch-later-directory",
    "resume-playback",
    "save-position-on-quit",
];

#[derive(Debug)]
struct State {
    options: HashMap<String, String>,
    initialized: bool,
    path: Option<String>,
    paused: bool,
    speed: f64,
    /// 0-100 scale.
    volume: f64,
    muted: bool,
    eof: bool,
    file_loaded: bool,
    pending_resume: Option<f64>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            options: HashMap::new(),
            initialized: false,
            path: None,
            paused: false,
            speed: 1.0,
            volume: 100.0,
            muted: false,
            eof: false,
            file_loaded: false,
            pending_resume: None,
        }
    }
}

impl State {
    fn enabled(&self, option: &str, default: bool) -> bool {
        match self.options.get(option).map(String::as_str) {
            Some("no") | Some("false") | Some("0") => false,
            Some(_) => true,
            None => default,
        }
    }

    fn watch_later(&self) -> Option<WatchLater> {
        self.options
            .get("watch-later-directory")
            .filter(|dir| !dir.is_empty())
            .map(WatchLater::new)
    }
}

struct Observer {
    reply_id: u64,
    name: String,
    format: Format,
    last: Option<PropertyValue>,
}

struct Inner {
    pipeline: gst::Pipeline,
    bus: gst::Bus,
    alive: AtomicBool,
    state: Mutex<State>,
    observers: Mutex<Vec<Observer>>,
    events: Mutex<VecDeque<EngineEvent>>,
    wakeup: Mutex<Option<Callback>>,
    frame: SharedFrame,
    frame_update: UpdateSlot,
}

/// GStreamer-backed [`Engine`].
pub struct GstEngine {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GstEngine {
    pub fn new() -> Result<Self, Error> {
        gst::init()?;

        let pipeline = format!(
            "playbin video-sink=\"videoscale ! videoconvert ! appsink name={SINK_NAME} drop=true max-buffers=1 caps=video/x-raw,format=NV12,pixel-aspect-ratio=1/1\""
        );
        let pipeline = gst::parse::launch(pipeline.as_ref())?
            .downcast::<gst::Pipeline>()
            .map_err(|_| Error::Cast)?;

        let video_sink = pipeline
            .property::<gst::Element>("video-sink")
            .downcast::<gst::Bin>()
            .map_err(|_| Error::Cast)?
            .by_name(SINK_NAME)
            .ok_or(Error::Cast)?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| Error::Cast)?;

        let bus = pipeline
            .bus()
            .ok_or_else(|| Error::EngineCreate("pipeline has no bus".into()))?;

        let frame: SharedFrame = Arc::new(Mutex::new(FrameSlot::default()));
        let frame_update: UpdateSlot = Arc::new(Mutex::new(None));

        let (sample_frame, sample_update) = (Arc::clone(&frame), Arc::clone(&frame_update));
        let (preroll_frame, preroll_update) = (Arc::clone(&frame), Arc::clone(&frame_update));
        video_sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    render::store_frame(&sample_frame, &sample_update, sample);
                    Ok(gst::FlowSuccess::Ok)
                })
                .new_preroll(move |sink| {
                    let sample = sink.pull_preroll().map_err(|_| gst::FlowError::Eos)?;
                    render::store_frame(&preroll_frame, &preroll_update, sample);
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                pipeline,
                bus,
                alive: AtomicBool::new(true),
                state: Mutex::new(State::default()),
                observers: Mutex::new(Vec::new()),
                events: Mutex::new(VecDeque::new()),
                wakeup: Mutex::new(None),
                frame,
                frame_update,
            }),
            worker: Mutex::new(None),
        })
    }

    /// The underlying playbin.
    pub fn pipeline(&self) -> gst::Pipeline {
        self.inner.pipeline.clone()
    }
}

impl Inner {
    fn wake(&self) {
        let wakeup = self.wakeup.lock().clone();
        if let Some(wakeup) = wakeup {
            wakeup();
        }
    }

    fn push_event(&self, event: EngineEvent) {
        self.events.lock().push_back(event);
        self.wake();
    }

    fn position(&self) -> Option<f64> {
        self.pipeline
            .query_position::<gst::ClockTime>()
            .map(|pos| pos.nseconds() as f64 / 1e9)
    }

    fn read_property(&self, name: &str) -> Result<PropertyValue, Error> {
        let state = self.state.lock();
        let loaded = state.path.is_some();
        let value = match name {
            "pause" => PropertyValue::Flag(state.paused),
            "speed" => PropertyValue::Double(state.speed),
            "volume" => PropertyValue::Double(state.volume),
            "mute" => PropertyValue::Flag(state.muted),
            "eof-reached" => PropertyValue::Flag(state.eof),
            "idle-active" => PropertyValue::Flag(!loaded),
            "path" => state
                .path
                .clone()
                .map_or(PropertyValue::None, PropertyValue::String),
            "time-pos" if loaded => self.position().map_or(PropertyValue::None, PropertyValue::Double),
            "duration" if loaded => self
                .pipeline
                .query_duration::<gst::ClockTime>()
                .map_or(PropertyValue::None, |d| {
                    PropertyValue::Double(d.nseconds() as f64 / 1e9)
                }),
            "time-pos" | "duration" => PropertyValue::None,
            "video-aspect" => self
                .frame
                .lock()
                .aspect_override
                .map_or(PropertyValue::None, PropertyValue::Double),
            "width" | "height" => match render::frame_size(&self.frame) {
                Some((width, _)) if name == "width" => PropertyValue::Int64(width.into()),
                Some((_, height)) => PropertyValue::Int64(height.into()),
                None => PropertyValue::None,
            },
            other => state
                .options
                .get(other)
                .cloned()
                .map(PropertyValue::String)
                .ok_or_else(|| Error::PropertyNotFound(other.to_owned()))?,
        };
        Ok(value)
    }

    /// Queues a change event for every observer whose value moved.
    fn publish_changes(&self) {
        let mut changed = Vec::new();
        {
            let mut observers = self.observers.lock();
            for observer in observers.iter_mut() {
                let value = self
                    .read_property(&observer.name)
                    .ok()
                    .and_then(|value| value.convert(observer.format))
                    .unwrap_or(PropertyValue::None);
                if observer.last.as_ref() != Some(&value) {
                    observer.last = Some(value.clone());
                    changed.push(EngineEvent::PropertyChange {
                        reply_id: observer.reply_id,
                        name: observer.name.clone(),
                        value,
                    });
                }
            }
        }

        if !changed.is_empty() {
            self.events.lock().extend(changed);
            self.wake();
        }
    }

    fn set_paused(&self, paused: bool) -> Result<(), Error> {
        let (loaded, restart) = {
            let mut state = self.state.lock();
            state.paused = paused;
            let restart = state.eof && !paused;
            if restart {
                state.eof = false;
            }
            (state.path.is_some(), restart)
        };

        if loaded {
            self.pipeline.set_state(if paused {
                gst::State::Paused
            } else {
                gst::State::Playing
            })?;
            if restart {
                self.seek_to(0.0)?;
            }
        }
        Ok(())
    }

    fn seek_to(&self, seconds: f64) -> Result<(), Error> {
        let speed = {
            let mut state = self.state.lock();
            if state.path.is_none() {
                return Err(Error::PropertyUnavailable("time-pos".into()));
            }
            state.eof = false;
            state.speed
        };

        let target = gst::ClockTime::from_nseconds((seconds.max(0.0) * 1e9) as u64);
        self.pipeline.seek(
            speed,
            gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
            gst::SeekType::Set,
            target,
            gst::SeekType::Set,
            gst::ClockTime::NONE,
        )?;
        Ok(())
    }

    fn set_speed(&self, speed: f64) -> Result<(), Error> {
        if !(speed > 0.0 && speed.is_finite()) {
            return Err(Error::invalid_value("speed", speed));
        }
        self.state.lock().speed = speed;

        if let Some(position) = self.pipeline.query_position::<gst::ClockTime>() {
            self.pipeline.seek(
                speed,
                gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                gst::SeekType::Set,
                position,
                gst::SeekType::End,
                gst::ClockTime::from_seconds(0),
            )?;
        }
        Ok(())
    }

    fn set_volume(&self, volume: f64) -> Result<(), Error> {
        if !(0.0..=1000.0).contains(&volume) {
            return Err(Error::invalid_value("volume", volume));
        }
        self.state.lock().volume = volume;
        self.pipeline.set_property("volume", volume / 100.0);
        Ok(())
    }

    fn load(&self, path: &str) -> Result<(), Error> {
        let uri = to_uri(path)?;
        log::info!("loading {uri}");

        self.pipeline.set_state(gst::State::Ready)?;
        self.pipeline.set_property("uri", uri.as_str());
        self.frame.lock().sample = None;

        let (paused, watch_later) = {
            let mut state = self.state.lock();
            state.path = Some(path.to_owned());
            state.eof = false;
            state.file_loaded = false;
            state.pending_resume = None;
            let watch_later = if state.enabled("resume-playback", true) {
                state.watch_later()
            } else {
                None
            };
            (state.paused, watch_later)
        };

        if let Some(watch_later) = watch_later {
            if let Some(start) = watch_later.load(path) {
                // A stored position is consumed by the load that resumes from it.
                if let Err(err) = watch_later.remove(path) {
                    log::warn!("failed to remove resume entry for {path}: {err}");
                }
                self.state.lock().pending_resume = Some(start);
            }
        }
        self.push_event(EngineEvent::StartFile);

        self.pipeline.set_state(if paused {
            gst::State::Paused
        } else {
            gst::State::Playing
        })?;
        Ok(())
    }

    fn stop(&self, reason: EndFileReason) -> Result<(), Error> {
        let was_loaded = {
            let mut state = self.state.lock();
            state.eof = false;
            state.file_loaded = false;
            state.pending_resume = None;
            state.path.take().is_some()
        };
        self.pipeline.set_state(gst::State::Ready)?;
        self.frame.lock().sample = None;

        if was_loaded {
            self.push_event(EngineEvent::EndFile { reason });
        }
        Ok(())
    }

    fn save_watch_later(&self) -> Result<(), Error> {
        let (path, watch_later) = {
            let state = self.state.lock();
            (state.path.clone(), state.watch_later())
        };
        let path = path.ok_or_else(|| Error::PropertyUnavailable("path".into()))?;
        let watch_later =
            watch_later.ok_or_else(|| Error::PropertyNotFound("watch-later-directory".into()))?;

        let position = self.position().unwrap_or(0.0);
        watch_later.save(&path, position)?;
        log::debug!("saved resume position {position:.3}s for {path}");
        Ok(())
    }

    fn handle_message(&self, msg: &gst::Message) {
        match msg.view() {
            gst::MessageView::Eos(_) => self.on_eos(),
            gst::MessageView::Error(err) => {
                let message = err.error().to_string();
                log::error!("GStreamer error: {message}");
                self.push_event(EngineEvent::Log {
                    level: LogLevel::Error,
                    message: message.clone(),
                });
                if let Err(err) = self.stop(EndFileReason::Error(message)) {
                    log::warn!("failed to unload after error: {err}");
                }
            }
            gst::MessageView::Warning(warning) => {
                self.push_event(EngineEvent::Log {
                    level: LogLevel::Warn,
                    message: warning.error().to_string(),
                });
            }
            gst::MessageView::AsyncDone(_) => self.on_prerolled(),
            _ => {}
        }
    }

    fn on_eos(&self) {
        let keep_open = {
            let mut state = self.state.lock();
            state.eof = true;
            let keep_open = state
                .options
                .get("keep-open")
                .is_some_and(|value| value != "no");
            if keep_open {
                state.paused = true;
            }
            keep_open
        };

        let result = if keep_open {
            self.pipeline
                .set_state(gst::State::Paused)
                .map(|_| ())
                .map_err(Error::from)
        } else {
            self.stop(EndFileReason::Eof)
        };
        if let Err(err) = result {
            log::warn!("failed to handle end of stream: {err}");
        }
    }

    fn on_prerolled(&self) {
        let (first, resume) = {
            let mut state = self.state.lock();
            let first = state.path.is_some() && !state.file_loaded;
            if first {
                state.file_loaded = true;
            }
            (first, state.pending_resume.take())
        };

        if let Some(start) = resume {
            log::debug!("resuming at {start:.3}s");
            if let Err(err) = self.seek_to(start) {
                log::warn!("failed to resume playback: {err}");
            }
        }
        if first {
            self.push_event(EngineEvent::FileLoaded);
        }
    }
}

fn run_worker(inner: Arc<Inner>) {
    while inner.alive.load(Ordering::Acquire) {
        if let Some(msg) = inner
            .bus
            .timed_pop(gst::ClockTime::from_mseconds(BUS_POLL_MS))
        {
            inner.handle_message(&msg);
        }
        inner.publish_changes();
    }
}

/// Turns an engine path (URL or local path) into a URI playbin accepts.
fn to_uri(path: &str) -> Result<url::Url, Error> {
    if path.contains("://") {
        return url::Url::parse(path).map_err(|_| Error::InvalidCommand("loadfile".into()));
    }
    let absolute = std::path::absolute(path)?;
    url::Url::from_file_path(&absolute).map_err(|_| Error::InvalidCommand("loadfile".into()))
}

fn expect(name: &str, value: &PropertyValue, format: Format) -> Result<PropertyValue, Error> {
    match value.convert(format) {
        Some(PropertyValue::None) | None => Err(Error::invalid_value(name, value)),
        Some(converted) => Ok(converted),
    }
}

fn expect_f64(name: &str, value: &PropertyValue) -> Result<f64, Error> {
    expect(name, value, Format::Double)?
        .as_f64()
        .ok_or_else(|| Error::invalid_value(name, value))
}

fn expect_flag(name: &str, value: &PropertyValue) -> Result<bool, Error> {
    expect(name, value, Format::Flag)?
        .as_bool()
        .ok_or_else(|| Error::invalid_value(name, value))
}

fn parse_f64(command: &str, arg: &str) -> Result<f64, Error> {
    arg.trim()
        .parse()
        .map_err(|_| Error::InvalidCommand(command.to_owned()))
}

impl RenderBackend for GstEngine {
    fn create_render_context(&self, api: RenderApi<'_>) -> Result<Box<dyn RenderContext>, Error> {
        match api {
            RenderApi::Software => Ok(Box::new(SoftwareRenderContext::new(
                Arc::clone(&self.inner.frame),
                Arc::clone(&self.inner.frame_update),
            ))),
            RenderApi::OpenGl { .. } => Err(Error::RenderContext(
                "the GStreamer engine only renders into software targets".into(),
            )),
        }
    }
}

impl Engine for GstEngine {
    fn set_option(&self, name: &str, value: PropertyValue) -> Result<(), Error> {
        if OPTIONS.contains(&name) {
            self.inner
                .state
                .lock()
                .options
                .insert(name.to_owned(), value.to_string());
            return Ok(());
        }
        self.set_property(name, value)
    }

    fn initialize(&self) -> Result<(), Error> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        self.inner
            .pipeline
            .set_state(gst::State::Ready)
            .map_err(|err| Error::EngineInit(err.to_string()))?;

        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("gst-engine".into())
            .spawn(move || run_worker(inner))
            .map_err(|err| Error::EngineInit(err.to_string()))?;
        *worker = Some(handle);

        self.inner.state.lock().initialized = true;
        log::debug!("media engine initialized");
        Ok(())
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> Result<(), Error> {
        let inner = &self.inner;
        match name {
            "pause" => inner.set_paused(expect_flag(name, &value)?)?,
            "time-pos" => inner.seek_to(expect_f64(name, &value)?)?,
            "speed" => inner.set_speed(expect_f64(name, &value)?)?,
            "volume" => inner.set_volume(expect_f64(name, &value)?)?,
            "mute" => {
                let muted = expect_flag(name, &value)?;
                inner.state.lock().muted = muted;
                inner.pipeline.set_property("mute", muted);
            }
            "video-aspect" => {
                let aspect = expect_f64(name, &value)?;
                inner.frame.lock().aspect_override = (aspect > 0.0).then_some(aspect);
            }
            "stop" => {
                if expect_flag(name, &value)? {
                    inner.stop(EndFileReason::Stop)?;
                }
            }
            "duration" | "path" | "eof-reached" | "idle-active" | "width" | "height" => {
                return Err(Error::invalid_value(name, &value));
            }
            option if OPTIONS.contains(&option) => {
                inner
                    .state
                    .lock()
                    .options
                    .insert(option.to_owned(), value.to_string());
            }
            other => return Err(Error::PropertyNotFound(other.to_owned())),
        }

        if inner.state.lock().initialized {
            inner.publish_changes();
        }
        Ok(())
    }

    fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue, Error> {
        let value = self.inner.read_property(name)?;
        value
            .convert(format)
            .ok_or_else(|| Error::invalid_value(name, &value))
    }

    fn command(&self, args: &[&str]) -> Result<(), Error> {
        let Some((&name, rest)) = args.split_first() else {
            return Err(Error::InvalidCommand(String::new()));
        };
        if !self.inner.state.lock().initialized {
            return Err(Error::Uninitialized);
        }
        log::debug!("command {args:?}");

        match (name, rest) {
            ("loadfile", [path, ..]) => self.inner.load(path)?,
            ("stop", []) => self.inner.stop(EndFileReason::Stop)?,
            ("add", [property, delta]) => {
                let delta = parse_f64(name, delta)?;
                let current = self
                    .inner
                    .read_property(property)?
                    .as_f64()
                    .ok_or_else(|| Error::PropertyUnavailable((*property).to_owned()))?;
                self.set_property(property, PropertyValue::Double(current + delta))?;
            }
            ("seek", [offset]) | ("seek", [offset, "relative"]) => {
                self.command(&["add", "time-pos", *offset])?;
            }
            ("seek", [target, "absolute"]) => {
                self.set_property("time-pos", PropertyValue::Double(parse_f64(name, target)?))?;
            }
            ("cycle", [property]) => {
                let current = self.get_property(property, Format::Flag)?;
                let current = expect_flag(property, &current)?;
                self.set_property(property, PropertyValue::Flag(!current))?;
            }
            ("set", [property, value]) => {
                self.set_property(property, PropertyValue::from(*value))?;
            }
            ("write-watch-later-config", []) => self.inner.save_watch_later()?,
            ("loadfile" | "stop" | "add" | "seek" | "cycle" | "set" | "write-watch-later-config", _) => {
                return Err(Error::InvalidCommand(name.to_owned()));
            }
            (other, _) => return Err(Error::UnknownCommand(other.to_owned())),
        }

        self.inner.publish_changes();
        Ok(())
    }

    fn observe_property(&self, reply_id: u64, name: &str, format: Format) -> Result<(), Error> {
        self.inner.read_property(name)?;
        self.inner.observers.lock().push(Observer {
            reply_id,
            name: name.to_owned(),
            format,
            last: None,
        });
        self.inner.publish_changes();
        Ok(())
    }

    fn poll_event(&self) -> Option<EngineEvent> {
        self.inner.events.lock().pop_front()
    }

    fn set_wakeup_callback(&self, callback: Option<Callback>) {
        *self.inner.wakeup.lock() = callback;
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        let save = {
            let state = self.inner.state.lock();
            state.path.is_some() && state.enabled("save-position-on-quit", false)
        };
        if save {
            if let Err(err) = self.inner.save_watch_later() {
                log::warn!("failed to save resume position: {err}");
            }
        }

        self.inner.alive.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            if let Err(err) = worker.join() {
                match err.downcast_ref::<String>() {
                    Some(e) => log::error!("engine thread panicked: {e}"),
                    None => log::error!("engine thread panicked with unknown reason"),
                }
            }
        }

        if let Err(err) = self.inner.pipeline.set_state(gst::State::Null) {
            log::error!("failed to shut down pipeline: {err}");
        }
        *self.inner.wakeup.lock() = None;
        log::debug!("media engine terminated");
    }
}
