use std::{collections::HashMap, fmt, fs, path::Path, str::FromStr};

use anyhow::{bail, Context};
use serde::{de::Visitor, Deserialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub window: WindowConfig,
    pub brush: BrushConfig,
    pub camera: CameraConfig,
    pub toolbar: ToolbarConfig,
    pub bind: Bindings,
}

impl Config {
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file `{}`", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file `{}`", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let brush = &self.brush;
        if !(brush.min_thickness > 0.0 && brush.min_thickness <= brush.max_thickness) {
            bail!(
                "brush thickness bounds must satisfy 0 < min_thickness <= max_thickness (got {}..{})",
                brush.min_thickness,
                brush.max_thickness,
            );
        }
        if !(brush.min_thickness..=brush.max_thickness).contains(&brush.thickness) {
            bail!(
                "default brush thickness {} is outside {}..{}",
                brush.thickness,
                brush.min_thickness,
                brush.max_thickness,
            );
        }
        if !(brush.grow > 1.0 && brush.shrink > 0.0 && brush.shrink < 1.0) {
            bail!("brush `grow` must be > 1 and `shrink` must be in (0, 1)");
        }
        check_color("brush color", brush.color)?;

        let camera = &self.camera;
        if !(camera.min_zoom > 0.0 && camera.min_zoom <= camera.max_zoom) {
            bail!(
                "camera zoom bounds must satisfy 0 < min_zoom <= max_zoom (got {}..{})",
                camera.min_zoom,
                camera.max_zoom,
            );
        }
        if camera.lerp_speed <= 0.0 {
            bail!("camera `lerp_speed` must be positive");
        }
        if camera.pan_speed < 0.0 {
            bail!("camera `pan_speed` must not be negative");
        }
        if !(camera.zoom_in > 0.0 && camera.zoom_in < 1.0 && camera.zoom_out > 1.0) {
            bail!(
                "camera `zoom_in` must be in (0, 1) and `zoom_out` must be > 1 (got {} and {})",
                camera.zoom_in,
                camera.zoom_out,
            );
        }

        let toolbar = &self.toolbar;
        if toolbar.palette.is_empty() {
            bail!("the toolbar palette needs at least one color");
        }
        if toolbar.columns == 0 {
            bail!("the toolbar needs at least one column");
        }
        if toolbar.box_size <= 0.0 || toolbar.padding < 0.0 {
            bail!("toolbar `box_size` must be positive and `padding` non-negative");
        }
        for (i, &color) in toolbar.palette.iter().enumerate() {
            check_color(&format!("palette color #{i}"), color)?;
        }

        Ok(())
    }
}

fn check_color(what: &str, color: [f32; 3]) -> anyhow::Result<()> {
    if color.iter().any(|c| !(0.0..=1.0).contains(c)) {
        bail!("{what} {color:?} has components outside 0..1");
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: String::from("inkstrip"),
            width: 800,
            height: 600,
        }
    }
}

/// Brush defaults. Thickness is a world-space diameter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrushConfig {
    pub color: [f32; 3],
    pub thickness: f64,
    pub min_thickness: f64,
    pub max_thickness: f64,
    /// Factor applied by the "thicker" command.
    pub grow: f64,
    /// Factor applied by the "thinner" command.
    pub shrink: f64,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            thickness: 0.05,
            min_thickness: 0.001,
            max_thickness: 10.0,
            grow: 1.2,
            shrink: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Fraction of the remaining distance covered per second (times frame time).
    pub lerp_speed: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// World units per scroll line, at zoom 1.
    pub pan_speed: f64,
    /// Zoom factor per wheel notch towards the canvas.
    pub zoom_in: f64,
    /// Zoom factor per wheel notch away from the canvas.
    pub zoom_out: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            lerp_speed: 10.0,
            min_zoom: 0.01,
            max_zoom: 100.0,
            pan_speed: 0.05,
            zoom_in: 0.9,
            zoom_out: 1.1,
        }
    }
}

/// Toolbar layout, in screen pixels from the top-left corner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolbarConfig {
    pub origin: [f64; 2],
    pub box_size: f64,
    pub padding: f64,
    pub columns: usize,
    pub tool_button: [f64; 2],
    pub palette: Vec<[f32; 3]>,
}

impl Default for ToolbarConfig {
    fn default() -> Self {
        Self {
            origin: [10.0, 10.0],
            box_size: 40.0,
            padding: 2.0,
            columns: 8,
            tool_button: [374.0, 10.0],
            palette: vec![
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 1.0, 1.0],
                [1.0, 1.0, 0.0],
                [1.0, 0.0, 1.0],
                [0.0, 1.0, 1.0],
                [0.5, 0.5, 0.5],
                [0.5, 0.0, 0.0],
                [0.0, 0.5, 0.0],
                [0.0, 0.0, 0.5],
                [0.0, 0.0, 0.0],
                [1.0, 0.5, 0.0],
                [0.5, 1.0, 0.0],
                [0.5, 0.0, 1.0],
                [0.0, 0.5, 1.0],
            ],
        }
    }
}

/// A key, optionally with Ctrl held, written like `ctrl+z` or `space`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub ctrl: bool,
    pub key: String,
}

impl KeyChord {
    pub fn new(ctrl: bool, key: &str) -> Self {
        Self {
            ctrl,
            key: key.to_lowercase(),
        }
    }
}

impl FromStr for KeyChord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (ctrl, key) = match s.strip_prefix("ctrl+") {
            Some(key) => (true, key),
            None => (false, s.as_str()),
        };
        if key.is_empty() || (key.contains('+') && key.len() > 1) {
            return Err(format!("invalid key chord '{s}'"));
        }
        Ok(Self::new(ctrl, key))
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("ctrl+")?;
        }
        f.write_str(&self.key)
    }
}

impl<'a> Deserialize<'a> for KeyChord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        struct FromStrVisitor;

        impl<'de> Visitor<'de> for FromStrVisitor {
            type Value = KeyChord;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("key chord such as `ctrl+z` or `e`")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(FromStrVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CommandVerb {
    #[serde(rename = "UNDO")]
    Undo,
    #[serde(rename = "REDO")]
    Redo,
    #[serde(rename = "TOOL_ERASER")]
    ToolEraser,
    #[serde(rename = "RESET_VIEW")]
    ResetView,
    #[serde(rename = "CLEAR")]
    Clear,
    #[serde(rename = "THICKER")]
    Thicker,
    #[serde(rename = "THINNER")]
    Thinner,
    #[serde(rename = "QUIT")]
    Quit,
}

/// Key bindings. A `[bind]` table in the config replaces the defaults wholesale.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct Bindings(HashMap<KeyChord, CommandVerb>);

impl Bindings {
    pub fn get(&self, chord: &KeyChord) -> Option<CommandVerb> {
        self.0.get(chord).copied()
    }
}

impl Default for Bindings {
    fn default() -> Self {
        let binds = [
            ("ctrl+z", CommandVerb::Undo),
            ("u", CommandVerb::Undo),
            ("ctrl+y", CommandVerb::Redo),
            ("ctrl+r", CommandVerb::Redo),
            ("e", CommandVerb::ToolEraser),
            ("0", CommandVerb::ResetView),
            ("ctrl+=", CommandVerb::Thicker),
            ("ctrl+-", CommandVerb::Thinner),
            ("escape", CommandVerb::Quit),
        ];
        Self(
            binds
                .into_iter()
                .filter_map(|(chord, verb)| Some((chord.parse().ok()?, verb)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;

    use super::*;

    fn load_str(contents: &str) -> anyhow::Result<Config> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        Config::load(file.path())
    }

    #[test]
    fn parses_example_config() {
        let config = Config::load("config.example.toml").unwrap();
        assert_eq!(config.toolbar.palette.len(), 16);
        assert_eq!(
            config.bind.get(&KeyChord::new(true, "z")),
            Some(CommandVerb::Undo)
        );
    }

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = load_str("").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.brush.thickness, 0.05);
        assert_eq!(config.bind.get(&"e".parse().unwrap()), Some(CommandVerb::ToolEraser));
    }

    #[test]
    fn bind_table_replaces_defaults() {
        let config = load_str("[bind]\n\"ctrl+Q\" = \"QUIT\"\n").unwrap();
        assert_eq!(config.bind.get(&KeyChord::new(true, "q")), Some(CommandVerb::Quit));
        assert_eq!(config.bind.get(&KeyChord::new(false, "u")), None);
    }

    #[test]
    fn rejects_empty_palette() {
        let err = load_str("[toolbar]\npalette = []\n").unwrap_err();
        assert!(format!("{err:#}").contains("palette"));
    }

    #[test]
    fn rejects_out_of_range_color() {
        assert!(load_str("[brush]\ncolor = [1.5, 0.0, 0.0]\n").is_err());
    }

    #[test]
    fn rejects_inverted_zoom_bounds() {
        assert!(load_str("[camera]\nmin_zoom = 5.0\nmax_zoom = 1.0\n").is_err());
    }

    #[rstest]
    #[case::zoom_in_at_one("zoom_in = 1.0")]
    #[case::zoom_in_above_one("zoom_in = 1.5")]
    #[case::zoom_in_zero("zoom_in = 0.0")]
    #[case::zoom_in_negative("zoom_in = -0.9")]
    #[case::zoom_out_at_one("zoom_out = 1.0")]
    #[case::zoom_out_below_one("zoom_out = 0.5")]
    #[case::zoom_out_negative("zoom_out = -1.1")]
    #[case::negative_pan_speed("pan_speed = -0.05")]
    fn rejects_bad_camera_steps(#[case] line: &str) {
        let err = load_str(&format!("[camera]\n{line}\n")).unwrap_err();
        assert!(format!("{err:#}").contains("camera"), "{err:#}");
    }

    #[test]
    fn accepts_zero_pan_speed() {
        load_str("[camera]\npan_speed = 0.0\n").unwrap();
    }

    #[test]
    fn rejects_unknown_verb() {
        assert!(load_str("[bind]\nx = \"EXPLODE\"\n").is_err());
    }

    #[test]
    fn chord_parsing() {
        assert_eq!("Ctrl+Z".parse::<KeyChord>().unwrap(), KeyChord::new(true, "z"));
        assert_eq!("space".parse::<KeyChord>().unwrap(), KeyChord::new(false, "space"));
        assert_eq!(KeyChord::new(true, "=").to_string(), "ctrl+=");
        assert!("".parse::<KeyChord>().is_err());
        assert!("ctrl+".parse::<KeyChord>().is_err());
    }
}
