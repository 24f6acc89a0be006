//! Mirrors engine property changes into the playback snapshot.

use crate::engine::{EndFileReason, Engine, EngineEvent, LogLevel};
use crate::property::{Property, PropertyValue};
use crate::snapshot::{Changed, PlaybackSnapshot, PlaybackState};
use std::path::Path;
use url::Url;

/// Notifications raised while handling events, in the order they were raised.
#[derive(Debug, Default)]
pub(crate) struct Changes(Vec<Changed>);

impl Changes {
    pub(crate) fn raise(&mut self, changed: Changed) {
        self.0.push(changed);
    }

    pub(crate) fn take(&mut self) -> Vec<Changed> {
        std::mem::take(&mut self.0)
    }

    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[Changed] {
        &self.0
    }
}

/// Typed handler for one observed property.
#[derive(Clone, Copy)]
enum Handler {
    Double(fn(&mut PlaybackSnapshot, &mut Changes, f64)),
    Flag(fn(&mut PlaybackSnapshot, &mut Changes, bool)),
    Text(fn(&mut PlaybackSnapshot, &mut Changes, &str)),
}

const HANDLERS: [(Property, Handler); 6] = [
    (Property::TimePos, Handler::Double(on_time_pos)),
    (Property::Duration, Handler::Double(on_duration)),
    (Property::Pause, Handler::Flag(on_pause)),
    (Property::Path, Handler::Text(on_path)),
    (Property::Speed, Handler::Double(on_speed)),
    (Property::Volume, Handler::Double(on_volume)),
];

fn handler(property: Property) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(p, _)| *p == property)
        .map(|(_, handler)| *handler)
}

fn on_time_pos(snapshot: &mut PlaybackSnapshot, changes: &mut Changes, seconds: f64) {
    snapshot.position = seconds;
    changes.raise(Changed::Position);

    if seconds > 0.0 && snapshot.stopped {
        snapshot.stopped = false;
        changes.raise(Changed::Stopped);
        let state = snapshot.running_state();
        set_state(snapshot, changes, state);
    }
}

fn on_duration(snapshot: &mut PlaybackSnapshot, changes: &mut Changes, seconds: f64) {
    snapshot.duration = seconds;
    changes.raise(Changed::Duration);
}

fn on_pause(snapshot: &mut PlaybackSnapshot, changes: &mut Changes, paused: bool) {
    snapshot.paused = paused;
    changes.raise(Changed::Paused);

    // Stopped is left only through play() or reported progress.
    if snapshot.playback_state != PlaybackState::Stopped {
        let state = snapshot.running_state();
        set_state(snapshot, changes, state);
    }
}

fn on_path(snapshot: &mut PlaybackSnapshot, changes: &mut Changes, path: &str) {
    let Some(url) = path_to_url(path) else {
        log::trace!("ignoring unrecognised path {path:?}");
        return;
    };
    snapshot.source = Some(url);
    changes.raise(Changed::Source);
}

fn on_speed(snapshot: &mut PlaybackSnapshot, changes: &mut Changes, rate: f64) {
    snapshot.playback_rate = rate;
    changes.raise(Changed::PlaybackRate);
}

fn on_volume(snapshot: &mut PlaybackSnapshot, changes: &mut Changes, percent: f64) {
    snapshot.volume = percent / 100.0;
    changes.raise(Changed::Volume);
}

fn set_state(snapshot: &mut PlaybackSnapshot, changes: &mut Changes, state: PlaybackState) {
    if snapshot.playback_state != state {
        snapshot.playback_state = state;
        changes.raise(Changed::PlaybackState);
    }
}

/// Engine paths are either URLs or absolute local paths.
pub(crate) fn path_to_url(path: &str) -> Option<Url> {
    // A single-letter scheme is a Windows drive, not a URL.
    match Url::parse(path) {
        Ok(url) if url.scheme().len() > 1 => Some(url),
        _ => Url::from_file_path(Path::new(path)).ok(),
    }
}

/// Applies one property change. Returns whether a handler ran.
pub(crate) fn apply(
    snapshot: &mut PlaybackSnapshot,
    changes: &mut Changes,
    name: &str,
    value: &PropertyValue,
) -> bool {
    let Some(handler) = Property::from_name(name).and_then(handler) else {
        log::trace!("discarding change of unobserved property {name}");
        return false;
    };

    match (handler, value) {
        (Handler::Double(f), PropertyValue::Double(d)) if d.is_finite() => f(snapshot, changes, *d),
        (Handler::Flag(f), PropertyValue::Flag(b)) => f(snapshot, changes, *b),
        (Handler::Text(f), PropertyValue::String(s)) => f(snapshot, changes, s),
        _ => {
            log::trace!("ignoring {name} with unexpected payload {value:?}");
            return false;
        }
    }
    true
}

/// Handles every event the engine has queued. Returns the number of events consumed.
pub(crate) fn drain<E: Engine + ?Sized>(
    engine: &E,
    snapshot: &mut PlaybackSnapshot,
    changes: &mut Changes,
) -> usize {
    let mut consumed = 0;
    while let Some(event) = engine.poll_event() {
        consumed += 1;
        match event {
            EngineEvent::PropertyChange { name, value, .. } => {
                apply(snapshot, changes, &name, &value);
            }
            EngineEvent::EndFile {
                reason: EndFileReason::Error(message),
            } => log::warn!("playback ended with error: {message}"),
            EngineEvent::Log { level, message } => match level {
                LogLevel::Error => log::error!("engine: {message}"),
                LogLevel::Warn => log::warn!("engine: {message}"),
                LogLevel::Info => log::info!("engine: {message}"),
                LogLevel::Debug => log::debug!("engine: {message}"),
            },
            other => log::trace!("discarding engine event {other:?}"),
        }
    }
    consumed
}
