use std::path::PathBuf;
use std::time::Duration;

use crate::canvas::DEFAULT_MASK_OPACITY;
use crate::components::history::DEFAULT_HISTORY_CAPACITY;
use crate::components::tools::{DEFAULT_BRUSH_DIAMETER, MAX_BRUSH_DIAMETER, MIN_BRUSH_DIAMETER};
use crate::ops::transform::{Interpolation, ResizeMode};

const SETTINGS_FILE: &str = "editor_settings.cfg";

/// Persisted editor preferences.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub history_capacity: usize,
    pub mask_opacity: f32,
    pub default_brush_diameter: f32,
    pub min_brush_diameter: f32,
    pub max_brush_diameter: f32,
    /// Zero disables the decode deadline.
    pub decode_timeout_secs: u64,
    pub stretch_filter: Interpolation,
    pub default_resize_mode: ResizeMode,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            mask_opacity: DEFAULT_MASK_OPACITY,
            default_brush_diameter: DEFAULT_BRUSH_DIAMETER,
            min_brush_diameter: MIN_BRUSH_DIAMETER,
            max_brush_diameter: MAX_BRUSH_DIAMETER,
            decode_timeout_secs: 30,
            stretch_filter: Interpolation::Bilinear,
            default_resize_mode: ResizeMode::Crop,
        }
    }
}

impl EditorSettings {
    /// `editor_settings.cfg` in the platform config directory.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("fusioneditor");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_default();
            let config_dir = PathBuf::from(appdata).join("FusionEditor");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("FusionEditor");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Bring every field back into its valid range.
    pub fn clamp(&mut self) {
        self.history_capacity = self.history_capacity.max(1);
        self.mask_opacity = if self.mask_opacity.is_finite() {
            self.mask_opacity.clamp(0.0, 1.0)
        } else {
            DEFAULT_MASK_OPACITY
        };
        if !(self.min_brush_diameter.is_finite() && self.min_brush_diameter >= MIN_BRUSH_DIAMETER) {
            self.min_brush_diameter = MIN_BRUSH_DIAMETER;
        }
        if !(self.max_brush_diameter.is_finite() && self.max_brush_diameter >= self.min_brush_diameter) {
            self.max_brush_diameter = self.min_brush_diameter.max(MAX_BRUSH_DIAMETER);
        }
        if !self.default_brush_diameter.is_finite() {
            self.default_brush_diameter = DEFAULT_BRUSH_DIAMETER;
        }
        self.default_brush_diameter = self
            .default_brush_diameter
            .clamp(self.min_brush_diameter, self.max_brush_diameter);
    }

    pub fn decode_timeout(&self) -> Option<Duration> {
        (self.decode_timeout_secs > 0).then(|| Duration::from_secs(self.decode_timeout_secs))
    }

    pub fn brush_range(&self) -> (f32, f32) {
        (self.min_brush_diameter, self.max_brush_diameter)
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "history_capacity={}\n\
             mask_opacity={}\n\
             default_brush_diameter={}\n\
             min_brush_diameter={}\n\
             max_brush_diameter={}\n\
             decode_timeout_secs={}\n\
             stretch_filter={}\n\
             default_resize_mode={}\n",
            self.history_capacity,
            self.mask_opacity,
            self.default_brush_diameter,
            self.min_brush_diameter,
            self.max_brush_diameter,
            self.decode_timeout_secs,
            self.stretch_filter.name(),
            self.default_resize_mode.name(),
        )
    }

    /// Parse `key=value` lines.  Unknown keys and unparsable values are
    /// skipped, leaving the default in place.
    pub fn from_config_string(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "history_capacity" => {
                    if let Ok(v) = val.parse() { s.history_capacity = v; }
                }
                "mask_opacity" => {
                    if let Ok(v) = val.parse() { s.mask_opacity = v; }
                }
                "default_brush_diameter" => {
                    if let Ok(v) = val.parse() { s.default_brush_diameter = v; }
                }
                "min_brush_diameter" => {
                    if let Ok(v) = val.parse() { s.min_brush_diameter = v; }
                }
                "max_brush_diameter" => {
                    if let Ok(v) = val.parse() { s.max_brush_diameter = v; }
                }
                "decode_timeout_secs" => {
                    if let Ok(v) = val.parse() { s.decode_timeout_secs = v; }
                }
                "stretch_filter" => {
                    if let Some(v) = Interpolation::from_name(val) { s.stretch_filter = v; }
                }
                "default_resize_mode" => {
                    if let Some(v) = ResizeMode::from_name(val) { s.default_resize_mode = v; }
                }
                _ => {}
            }
        }
        s.clamp();
        s
    }

    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            log_warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }

    /// Defaults when the file is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::from_config_string(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_string_round_trips() {
        let settings = EditorSettings {
            history_capacity: 4,
            mask_opacity: 0.5,
            default_brush_diameter: 8.0,
            min_brush_diameter: 2.0,
            max_brush_diameter: 64.0,
            decode_timeout_secs: 0,
            stretch_filter: Interpolation::Lanczos3,
            default_resize_mode: ResizeMode::Stretch,
        };
        let parsed = EditorSettings::from_config_string(&settings.to_config_string());
        assert_eq!(parsed, settings);
        assert_eq!(parsed.decode_timeout(), None);
    }

    #[test]
    fn corrupt_lines_fall_back_to_defaults() {
        let parsed = EditorSettings::from_config_string(
            "history_capacity=lots\n\
             garbage line\n\
             stretch_filter=sinc\n\
             theme=dark\n\
             decode_timeout_secs=5\n",
        );
        assert_eq!(parsed.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(parsed.stretch_filter, Interpolation::Bilinear);
        assert_eq!(parsed.decode_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let parsed = EditorSettings::from_config_string(
            "history_capacity=0\n\
             mask_opacity=3.5\n\
             default_brush_diameter=500\n",
        );
        assert_eq!(parsed.history_capacity, 1);
        assert_eq!(parsed.mask_opacity, 1.0);
        assert_eq!(parsed.default_brush_diameter, MAX_BRUSH_DIAMETER);
    }

    #[test]
    fn defaults_match_editor_behaviour() {
        let s = EditorSettings::default();
        assert_eq!(s.history_capacity, 12);
        assert_eq!(s.brush_range(), (1.0, 100.0));
        assert_eq!(s.default_brush_diameter, 20.0);
        assert_eq!(s.decode_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(s.default_resize_mode, ResizeMode::Crop);
    }
}
