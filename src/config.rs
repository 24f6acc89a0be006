use std::path::PathBuf;
use url::Url;

/// Construction-time configuration of a [`VideoSurface`](crate::VideoSurface).
///
/// Options are handed to the engine before it is initialized, in insertion
/// order, so later entries override earlier ones.
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    options: Vec<(String, String)>,
    source: Option<Url>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        let mut config = Self {
            options: Vec::new(),
            source: None,
        }
        .option("terminal", "yes")
        .option("keep-open", "always");

        if let Some(dir) = default_watch_later_dir() {
            config = config.watch_later_dir(dir);
        }
        config
    }
}

impl SurfaceConfig {
    /// A configuration without the default options.
    pub fn empty() -> Self {
        Self {
            options: Vec::new(),
            source: None,
        }
    }

    /// Sets a raw engine option.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.options.retain(|(n, _)| *n != name);
        self.options.push((name, value.into()));
        self
    }

    /// Directory the engine uses to persist resume positions.
    pub fn watch_later_dir(self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.option("watch-later-directory", dir.to_string_lossy())
    }

    /// Whether loading a file resumes from a stored position.
    pub fn resume_playback(self, resume: bool) -> Self {
        self.option("resume-playback", yes_no(resume))
    }

    /// Whether the position is stored when the engine shuts down.
    pub fn save_position_on_quit(self, save: bool) -> Self {
        self.option("save-position-on-quit", yes_no(save))
    }

    pub fn keep_open(self, keep_open: bool) -> Self {
        self.option("keep-open", if keep_open { "always" } else { "no" })
    }

    /// Media loaded right after construction.
    pub fn source(mut self, source: Url) -> Self {
        self.source = Some(source);
        self
    }

    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn initial_source(&self) -> Option<&Url> {
        self.source.as_ref()
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// `<local data dir>/gpui-video-surface/watch_later`.
pub fn default_watch_later_dir() -> Option<PathBuf> {
    dirs_next::data_local_dir().map(|dir| dir.join("gpui-video-surface").join("watch_later"))
}
