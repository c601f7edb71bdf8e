//! TransformRecipe: the normalized, validated transformation request that
//! drives fingerprinting and upstream RPC. Collaborator concern (§3) — the
//! core treats it as an opaque, already-validated input.
//!
//! Parsing follows the teacher's `image_optimizer::params::ImageParams` dual
//! query/path syntax split: `?w=720&h=480&mode=video` or the compact
//! path-segment form `w:720,h:480,mode:video`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    RECIPE_MAX_CUSTOM_DATA_LEN, RECIPE_MAX_CUSTOM_DATA_PAIRS, RECIPE_MAX_DIMENSION,
    RECIPE_MAX_DURATION_SECS, RECIPE_MAX_TIME_SECS, RECIPE_MIN_DIMENSION,
    RECIPE_MIN_DURATION_SECS, RECIPE_MIN_TIME_SECS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeError {
    MissingSourcePath,
    InvalidParameter { param: String, message: String },
    InvalidMode { mode: String },
    DimensionOutOfRange { field: &'static str, value: u32 },
    TimeOutOfRange { value: u32 },
    DurationOutOfRange { value: u32 },
    AudioModeForbidsField { field: &'static str },
    SpritesheetModeForbidsField { field: &'static str },
    FrameModeRequiresTime,
    TooManyCustomDataPairs { count: usize },
    CustomDataValueTooLong { key: String },
    UnknownDerivative { name: String },
}

impl fmt::Display for RecipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeError::MissingSourcePath => write!(f, "sourcePath is required"),
            RecipeError::InvalidParameter { param, message } => {
                write!(f, "invalid parameter '{}': {}", param, message)
            }
            RecipeError::InvalidMode { mode } => write!(f, "unknown mode: {}", mode),
            RecipeError::DimensionOutOfRange { field, value } => write!(
                f,
                "{} {} out of range [{}, {}]",
                field, value, RECIPE_MIN_DIMENSION, RECIPE_MAX_DIMENSION
            ),
            RecipeError::TimeOutOfRange { value } => write!(
                f,
                "time {} out of range [{}, {}]",
                value, RECIPE_MIN_TIME_SECS, RECIPE_MAX_TIME_SECS
            ),
            RecipeError::DurationOutOfRange { value } => write!(
                f,
                "duration {} out of range [{}, {}]",
                value, RECIPE_MIN_DURATION_SECS, RECIPE_MAX_DURATION_SECS
            ),
            RecipeError::AudioModeForbidsField { field } => {
                write!(f, "mode=audio forbids field '{}'", field)
            }
            RecipeError::SpritesheetModeForbidsField { field } => {
                write!(f, "mode=spritesheet forbids field '{}'", field)
            }
            RecipeError::FrameModeRequiresTime => write!(f, "mode=frame requires 'time'"),
            RecipeError::TooManyCustomDataPairs { count } => write!(
                f,
                "customData has {} pairs, limit is {}",
                count, RECIPE_MAX_CUSTOM_DATA_PAIRS
            ),
            RecipeError::CustomDataValueTooLong { key } => {
                write!(f, "customData['{}'] exceeds max length", key)
            }
            RecipeError::UnknownDerivative { name } => {
                write!(f, "unknown derivative preset: {}", name)
            }
        }
    }
}

impl std::error::Error for RecipeError {}

impl RecipeError {
    fn invalid(param: &str, message: impl Into<String>) -> Self {
        RecipeError::InvalidParameter {
            param: param.to_string(),
            message: message.into(),
        }
    }
}

/// Transformation mode. Each mode permits a different subset of fields —
/// enforced by `TransformRecipe::validate`, not by the type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Video,
    Frame,
    Spritesheet,
    Audio,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Video => "video",
            Mode::Frame => "frame",
            Mode::Spritesheet => "spritesheet",
            Mode::Audio => "audio",
        }
    }
}

impl FromStr for Mode {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(Mode::Video),
            "frame" => Ok(Mode::Frame),
            "spritesheet" => Ok(Mode::Spritesheet),
            "audio" => Ok(Mode::Audio),
            other => Err(RecipeError::InvalidMode {
                mode: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    Contain,
    #[default]
    Cover,
    ScaleDown,
    Pad,
    Crop,
}

impl FitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::Contain => "contain",
            FitMode::Cover => "cover",
            FitMode::ScaleDown => "scale-down",
            FitMode::Pad => "pad",
            FitMode::Crop => "crop",
        }
    }
}

impl FromStr for FitMode {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contain" => Ok(FitMode::Contain),
            "cover" => Ok(FitMode::Cover),
            "scale-down" | "scaledown" => Ok(FitMode::ScaleDown),
            "pad" => Ok(FitMode::Pad),
            "crop" => Ok(FitMode::Crop),
            other => Err(RecipeError::invalid("fit", format!("unknown fit: {}", other))),
        }
    }
}

/// Used for both `quality` and `compression` — same small vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    High,
    Auto,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::Auto => "auto",
        }
    }
}

impl FromStr for Quality {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "auto" => Ok(Quality::Auto),
            other => Err(RecipeError::invalid(
                "quality",
                format!("unknown quality: {}", other),
            )),
        }
    }
}

/// Video-only playback hints. Unset fields participate in neither the
/// fingerprint nor validation; only explicitly-present ones do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackOptions {
    pub loop_: Option<bool>,
    pub autoplay: Option<bool>,
    pub muted: Option<bool>,
    pub audio: Option<bool>,
}

impl PlaybackOptions {
    pub fn is_empty(&self) -> bool {
        self.loop_.is_none() && self.autoplay.is_none() && self.muted.is_none() && self.audio.is_none()
    }
}

/// `time`/`duration` window for frame extraction and clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub time: Option<u32>,
    pub duration: Option<u32>,
}

/// Validated, normalized transformation request. Produced by
/// `from_query`/`from_path_options` and `validate`d before fingerprinting.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRecipe {
    pub source_path: String,
    pub mode: Mode,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: FitMode,
    pub quality: Option<Quality>,
    pub compression: Option<Quality>,
    pub bitrate: Option<u32>,
    pub format: Option<String>,
    pub window: TimeWindow,
    pub playback: PlaybackOptions,
    pub preload: Option<String>,
    pub derivative: Option<String>,
    /// Ordered `k=v` pairs; order as supplied, sorted only at fingerprint time.
    pub custom_data: Vec<(String, String)>,
    /// Spritesheet-only layout fields.
    pub cols: Option<u32>,
    pub rows: Option<u32>,
    pub interval: Option<u32>,
}

impl TransformRecipe {
    fn empty(source_path: String, mode: Mode) -> Self {
        Self {
            source_path,
            mode,
            width: None,
            height: None,
            fit: FitMode::default(),
            quality: None,
            compression: None,
            bitrate: None,
            format: None,
            window: TimeWindow::default(),
            playback: PlaybackOptions::default(),
            preload: None,
            derivative: None,
            custom_data: Vec::new(),
            cols: None,
            rows: None,
            interval: None,
        }
    }

    /// Parse from query parameters (e.g. `?mode=video&w=720&h=480`).
    pub fn from_query(source_path: &str, params: &HashMap<String, String>) -> Result<Self, RecipeError> {
        Self::parse(source_path, params)
    }

    /// Build the smallest valid recipe for a mode — no sizing, quality, or
    /// playback fields set. Used by collaborators (and tests) that only need
    /// a fingerprint-able placeholder, e.g. before any query params are known.
    pub fn from_minimal(source_path: String, mode: Mode) -> Self {
        Self::empty(source_path.trim_start_matches('/').to_string(), mode)
    }

    /// Parse from the compact path-segment form (e.g. `w:720,h:480,mode:video`).
    pub fn from_path_options(source_path: &str, options: &str) -> Result<Self, RecipeError> {
        let mut params = HashMap::new();
        for part in options.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((key, value)) = part.split_once(':') {
                params.insert(key.to_string(), value.to_string());
            } else {
                params.insert(part.to_string(), "1".to_string());
            }
        }
        Self::parse(source_path, &params)
    }

    fn parse(source_path: &str, params: &HashMap<String, String>) -> Result<Self, RecipeError> {
        let path = source_path.trim_start_matches('/');
        if path.is_empty() {
            return Err(RecipeError::MissingSourcePath);
        }

        let mode = match params.get("mode") {
            Some(m) => m.parse()?,
            None => Mode::Video,
        };

        let mut recipe = Self::empty(path.to_string(), mode);

        if let Some(name) = params.get("derivative") {
            recipe.derivative = Some(name.clone());
            apply_derivative(&mut recipe, name)?;
        }

        if let Some(w) = params.get("w").or_else(|| params.get("width")) {
            recipe.width = Some(parse_u32(w, "width")?);
        }
        if let Some(h) = params.get("h").or_else(|| params.get("height")) {
            recipe.height = Some(parse_u32(h, "height")?);
        }
        if let Some(fit) = params.get("fit") {
            recipe.fit = fit.parse()?;
        }
        if let Some(q) = params.get("q").or_else(|| params.get("quality")) {
            recipe.quality = Some(q.parse()?);
        }
        if let Some(c) = params.get("c").or_else(|| params.get("compression")) {
            recipe.compression = Some(c.parse()?);
        }
        if let Some(b) = params.get("bitrate") {
            recipe.bitrate = Some(parse_u32(b, "bitrate")?);
        }
        if let Some(f) = params.get("format") {
            recipe.format = Some(f.clone());
        }
        if let Some(t) = params.get("t").or_else(|| params.get("time")) {
            recipe.window.time = Some(parse_u32(t, "time")?);
        }
        if let Some(d) = params.get("dur").or_else(|| params.get("duration")) {
            recipe.window.duration = Some(parse_u32(d, "duration")?);
        }
        if let Some(l) = params.get("loop") {
            recipe.playback.loop_ = Some(parse_bool(l));
        }
        if let Some(a) = params.get("autoplay") {
            recipe.playback.autoplay = Some(parse_bool(a));
        }
        if let Some(m) = params.get("muted") {
            recipe.playback.muted = Some(parse_bool(m));
        }
        if let Some(a) = params.get("audio") {
            recipe.playback.audio = Some(parse_bool(a));
        }
        if let Some(p) = params.get("preload") {
            recipe.preload = Some(p.clone());
        }
        if let Some(cols) = params.get("cols") {
            recipe.cols = Some(parse_u32(cols, "cols")?);
        }
        if let Some(rows) = params.get("rows") {
            recipe.rows = Some(parse_u32(rows, "rows")?);
        }
        if let Some(interval) = params.get("interval") {
            recipe.interval = Some(parse_u32(interval, "interval")?);
        }

        const RESERVED: &[&str] = &[
            "mode", "derivative", "w", "width", "h", "height", "fit", "q", "quality", "c",
            "compression", "bitrate", "format", "t", "time", "dur", "duration", "loop",
            "autoplay", "muted", "audio", "preload", "cols", "rows", "interval", "v", "debug",
            "nocache", "no-kv-cache",
        ];
        let mut custom: Vec<(String, String)> = params
            .iter()
            .filter(|(k, _)| !RESERVED.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        custom.sort_by(|a, b| a.0.cmp(&b.0));
        recipe.custom_data = custom;

        // autoplay=true coerces muted=true rather than rejecting the recipe.
        if recipe.playback.autoplay == Some(true) {
            recipe.playback.muted = Some(true);
        }

        recipe.validate()?;
        Ok(recipe)
    }

    /// Enforce §3's per-mode field invariants. Called at the end of parsing
    /// so callers never hold a recipe that violates them.
    pub fn validate(&self) -> Result<(), RecipeError> {
        if let Some(w) = self.width {
            if !(RECIPE_MIN_DIMENSION..=RECIPE_MAX_DIMENSION).contains(&w) {
                return Err(RecipeError::DimensionOutOfRange { field: "width", value: w });
            }
        }
        if let Some(h) = self.height {
            if !(RECIPE_MIN_DIMENSION..=RECIPE_MAX_DIMENSION).contains(&h) {
                return Err(RecipeError::DimensionOutOfRange { field: "height", value: h });
            }
        }
        if let Some(t) = self.window.time {
            if t > RECIPE_MAX_TIME_SECS {
                return Err(RecipeError::TimeOutOfRange { value: t });
            }
        }
        if let Some(d) = self.window.duration {
            if !(RECIPE_MIN_DURATION_SECS..=RECIPE_MAX_DURATION_SECS).contains(&d) {
                return Err(RecipeError::DurationOutOfRange { value: d });
            }
        }

        match self.mode {
            Mode::Audio => {
                if self.width.is_some() {
                    return Err(RecipeError::AudioModeForbidsField { field: "width" });
                }
                if self.height.is_some() {
                    return Err(RecipeError::AudioModeForbidsField { field: "height" });
                }
                if !self.playback.is_empty() {
                    return Err(RecipeError::AudioModeForbidsField { field: "playback" });
                }
            }
            Mode::Spritesheet => {
                if !self.playback.is_empty() {
                    return Err(RecipeError::SpritesheetModeForbidsField { field: "playback" });
                }
            }
            Mode::Frame => {
                if self.window.time.is_none() {
                    return Err(RecipeError::FrameModeRequiresTime);
                }
            }
            Mode::Video => {}
        }

        if self.custom_data.len() > RECIPE_MAX_CUSTOM_DATA_PAIRS {
            return Err(RecipeError::TooManyCustomDataPairs {
                count: self.custom_data.len(),
            });
        }
        for (k, v) in &self.custom_data {
            if k.len() > RECIPE_MAX_CUSTOM_DATA_LEN || v.len() > RECIPE_MAX_CUSTOM_DATA_LEN {
                return Err(RecipeError::CustomDataValueTooLong { key: k.clone() });
            }
        }

        Ok(())
    }
}

fn parse_u32(s: &str, field: &str) -> Result<u32, RecipeError> {
    s.parse().map_err(|_| RecipeError::invalid(field, "must be a non-negative integer"))
}

fn parse_bool(s: &str) -> bool {
    !(s == "0" || s.eq_ignore_ascii_case("false"))
}

/// A handful of built-in named bundles, resolved to concrete fields before
/// fingerprinting unless the caller asked for `derivative` verbatim (§4.A).
/// Explicit fields set after the derivative still win — presets only fill
/// in what wasn't already specified.
fn apply_derivative(recipe: &mut TransformRecipe, name: &str) -> Result<(), RecipeError> {
    match name {
        "thumbnail" => {
            recipe.mode = Mode::Frame;
            recipe.width = Some(320);
            recipe.height = Some(180);
            recipe.window.time = Some(0);
        }
        "preview" => {
            recipe.mode = Mode::Video;
            recipe.width = Some(640);
            recipe.height = Some(360);
            recipe.quality = Some(Quality::Medium);
        }
        "hero" => {
            recipe.mode = Mode::Video;
            recipe.width = Some(1920);
            recipe.height = Some(1080);
            recipe.quality = Some(Quality::High);
        }
        "podcast" => {
            recipe.mode = Mode::Audio;
            recipe.quality = Some(Quality::Medium);
        }
        other => {
            return Err(RecipeError::UnknownDerivative {
                name: other.to_string(),
            })
        }
    }
    Ok(())
}
