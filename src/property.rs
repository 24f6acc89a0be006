//! Property vocabulary shared by the surface and the media engine.

use std::fmt;

/// Wire format of a property value, as requested when reading or observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    None,
    Flag,
    Int64,
    Double,
    String,
}

/// A typed property payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// The property exists but currently has no value (e.g. nothing is loaded).
    None,
    Flag(bool),
    Int64(i64),
    Double(f64),
    String(String),
}

impl PropertyValue {
    pub fn format(&self) -> Format {
        match self {
            PropertyValue::None => Format::None,
            PropertyValue::Flag(_) => Format::Flag,
            PropertyValue::Int64(_) => Format::Int64,
            PropertyValue::Double(_) => Format::Double,
            PropertyValue::String(_) => Format::String,
        }
    }

    /// Converts the value into `format`.
    ///
    /// Integers and doubles convert into each other, flags render as `yes`/`no`
    /// and strings are parsed. Returns `None` when no conversion exists.
    pub fn convert(&self, format: Format) -> Option<PropertyValue> {
        use PropertyValue as V;

        match (self, format) {
            (V::None, _) => Some(V::None),
            (value, f) if value.format() == f => Some(value.clone()),
            (_, Format::None) => Some(V::None),
            (V::Int64(i), Format::Double) => Some(V::Double(*i as f64)),
            (V::Double(d), Format::Int64) if d.is_finite() => Some(V::Int64(d.round() as i64)),
            (V::Flag(b), Format::Int64) => Some(V::Int64(i64::from(*b))),
            (V::Flag(b), Format::String) => Some(V::String(if *b { "yes" } else { "no" }.into())),
            (V::Int64(i), Format::String) => Some(V::String(i.to_string())),
            (V::Double(d), Format::String) => Some(V::String(format!("{d:.6}"))),
            (V::String(s), Format::Flag) => match s.as_str() {
                "yes" | "true" | "1" => Some(V::Flag(true)),
                "no" | "false" | "0" => Some(V::Flag(false)),
                _ => None,
            },
            (V::String(s), Format::Int64) => s.trim().parse().ok().map(V::Int64),
            (V::String(s), Format::Double) => s.trim().parse().ok().map(V::Double),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(d) => Some(*d),
            PropertyValue::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::None => f.write_str("<none>"),
            PropertyValue::Flag(b) => f.write_str(if *b { "yes" } else { "no" }),
            PropertyValue::Int64(i) => write!(f, "{i}"),
            PropertyValue::Double(d) => write!(f, "{d}"),
            PropertyValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Flag(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int64(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

/// Engine properties the surface reads, writes or observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    TimePos,
    Duration,
    Pause,
    Path,
    Speed,
    Volume,
    /// Aspect-ratio hint driven by the fill mode. Written, never observed.
    VideoAspect,
    /// Write-only stop directive.
    Stop,
}

impl Property {
    /// Properties mirrored into the playback snapshot.
    pub const OBSERVED: [Property; 6] = [
        Property::Duration,
        Property::TimePos,
        Property::Pause,
        Property::Path,
        Property::Speed,
        Property::Volume,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Property::TimePos => "time-pos",
            Property::Duration => "duration",
            Property::Pause => "pause",
            Property::Path => "path",
            Property::Speed => "speed",
            Property::Volume => "volume",
            Property::VideoAspect => "video-aspect",
            Property::Stop => "stop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "time-pos" => Property::TimePos,
            "duration" => Property::Duration,
            "pause" => Property::Pause,
            "path" => Property::Path,
            "speed" => Property::Speed,
            "volume" => Property::Volume,
            "video-aspect" => Property::VideoAspect,
            "stop" => Property::Stop,
            _ => return None,
        })
    }

    pub const fn format(self) -> Format {
        match self {
            Property::Pause | Property::Stop => Format::Flag,
            Property::Path => Format::String,
            Property::TimePos
            | Property::Duration
            | Property::Speed
            | Property::Volume
            | Property::VideoAspect => Format::Double,
        }
    }

    /// Reply id used when observing this property.
    pub const fn reply_id(self) -> u64 {
        self as u64 + 1
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
