use url::Url;

/// Coarse playback state exposed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// How the video is fitted into the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Stretch,
    PreserveAspectFit,
    PreserveAspectCrop,
}

impl FillMode {
    /// Next mode of the fixed Stretch → PreserveAspectCrop → PreserveAspectFit cycle.
    pub fn next(self) -> Self {
        match self {
            FillMode::Stretch => FillMode::PreserveAspectCrop,
            FillMode::PreserveAspectCrop => FillMode::PreserveAspectFit,
            FillMode::PreserveAspectFit => FillMode::Stretch,
        }
    }

    /// `video-aspect` hint written when this mode is entered.
    pub fn aspect_hint(self) -> f64 {
        match self {
            FillMode::PreserveAspectCrop => 2.0,
            FillMode::PreserveAspectFit => 1.3333,
            FillMode::Stretch => 1.7777,
        }
    }
}

/// One observable field of the snapshot. Raised once per change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Changed {
    Position,
    Duration,
    Paused,
    Stopped,
    Source,
    PlaybackRate,
    Volume,
    PlaybackState,
    FillMode,
}

/// Best-effort cache of engine-authoritative playback state.
///
/// Fields are written independently, either optimistically by a surface
/// setter or by the event bridge once the engine reports a change, so they
/// may briefly disagree with each other and with the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    /// Seconds.
    pub position: f64,
    /// Seconds.
    pub duration: f64,
    pub paused: bool,
    pub stopped: bool,
    pub source: Option<Url>,
    pub playback_rate: f64,
    /// Fraction, 1.0 is the engine's 100%.
    pub volume: f64,
    pub fill_mode: FillMode,
    pub playback_state: PlaybackState,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            position: 0.0,
            duration: 0.0,
            paused: true,
            stopped: true,
            source: None,
            playback_rate: 1.0,
            volume: 1.0,
            fill_mode: FillMode::Stretch,
            playback_state: PlaybackState::Stopped,
        }
    }
}

impl PlaybackSnapshot {
    /// State implied by `paused` once playback is no longer stopped.
    pub(crate) fn running_state(&self) -> PlaybackState {
        if self.paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }
}
