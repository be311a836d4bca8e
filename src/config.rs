use crate::defaults;
use crate::page::AttributeSource;
use crate::parse::{parse_flag, parse_float_array, parse_integer, parse_number};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied configuration keys, merged last.
pub type Overrides = Map<String, Value>;

/// Fully resolved settings for one viewer element.
///
/// Keys are camelCase so the same names work in the JSON attribute, in caller
/// overrides and in the record handed back to JavaScript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerConfig {
    pub model_url: String,
    /// `x,y,z`, parsed when the model is placed
    pub position: String,
    /// Quaternion `x,y,z,w`, parsed when the model is placed
    pub orientation: String,
    #[serde(deserialize_with = "float_triplet")]
    pub camera_position: [f32; 3],
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub rotation_speed: f32,
    pub background_color: String,
    pub breakpoint: u32,
    pub desktop_min_height: u32,
    pub mobile_min_height: u32,
    pub auto_rotate: bool,
    pub responsive: bool,
    pub debug: bool,
    /// Keys nobody reads, kept so merging stays shallow and lossless
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            model_url: defaults::MODEL_URL.to_string(),
            position: defaults::MODEL_POSITION.to_string(),
            orientation: defaults::MODEL_ORIENTATION.to_string(),
            camera_position: defaults::CAMERA_POSITION,
            fov: defaults::CAMERA_FOV_DEG,
            near: defaults::CAMERA_NEAR,
            far: defaults::CAMERA_FAR,
            rotation_speed: defaults::ROTATION_SPEED,
            background_color: defaults::BACKGROUND_COLOR.to_string(),
            breakpoint: defaults::BREAKPOINT,
            desktop_min_height: defaults::DESKTOP_MIN_HEIGHT,
            mobile_min_height: defaults::MOBILE_MIN_HEIGHT,
            auto_rotate: true,
            responsive: true,
            debug: false,
            extra: Map::new(),
        }
    }
}

/// Camera position may be given as `[x, y, z]` or as `"x,y,z"`.
fn float_triplet<'de, D>(deserializer: D) -> Result<[f32; 3], D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Triplet {
        List([f32; 3]),
        Text(String),
    }

    Ok(match Triplet::deserialize(deserializer)? {
        Triplet::List(values) => values,
        Triplet::Text(text) => {
            let values = parse_float_array(&text, 3);
            [values[0], values[1], values[2]]
        }
    })
}

impl ViewerConfig {
    /// Model position as three floats.
    pub fn model_position(&self) -> [f32; 3] {
        let v = parse_float_array(&self.position, 3);
        [v[0], v[1], v[2]]
    }

    /// Model orientation as an `x,y,z,w` quaternion.
    pub fn model_orientation(&self) -> [f32; 4] {
        let v = parse_float_array(&self.orientation, 4);
        [v[0], v[1], v[2], v[3]]
    }

    pub fn lens(&self) -> Lens {
        Lens {
            fov_deg: self.fov,
            near: self.near,
            far: self.far,
        }
    }

    /// Shallow-merge `layer` into this config one key at a time.
    ///
    /// A key whose value does not fit its field is skipped, leaving the value
    /// from the previous layer in place.
    pub fn apply_layer(&mut self, layer: &Map<String, Value>, source: &str) {
        for (key, value) in layer {
            let mut merged = match serde_json::to_value(&*self) {
                Ok(Value::Object(map)) => map,
                _ => return,
            };
            merged.insert(key.clone(), value.clone());

            match serde_json::from_value::<ViewerConfig>(Value::Object(merged)) {
                Ok(next) => *self = next,
                Err(e) => log::warn!("Ignoring {} setting '{}' = {}: {}", source, key, value, e),
            }
        }
    }
}

/// Perspective parameters handed to the camera factory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lens {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

/// How an individual attribute's text becomes a JSON value.
#[derive(Debug, Clone, Copy)]
enum AttributeKind {
    Text,
    FloatList(usize),
    Float,
    Integer,
    Flag,
}

/// Individual attributes, in the order they are applied.
const ATTRIBUTES: &[(&str, &str, AttributeKind)] = &[
    ("data-model-url", "modelUrl", AttributeKind::Text),
    ("data-position", "position", AttributeKind::Text),
    ("data-orientation", "orientation", AttributeKind::Text),
    ("data-camera-position", "cameraPosition", AttributeKind::FloatList(3)),
    ("data-rotation-speed", "rotationSpeed", AttributeKind::Float),
    ("data-background-color", "backgroundColor", AttributeKind::Text),
    ("data-breakpoint", "breakpoint", AttributeKind::Integer),
    ("data-desktop-min-height", "desktopMinHeight", AttributeKind::Integer),
    ("data-mobile-min-height", "mobileMinHeight", AttributeKind::Integer),
    ("data-fov", "fov", AttributeKind::Float),
    ("data-auto-rotate", "autoRotate", AttributeKind::Flag),
    ("data-responsive", "responsive", AttributeKind::Flag),
    ("data-debug", "debug", AttributeKind::Flag),
];

impl AttributeKind {
    fn convert(self, name: &str, text: &str) -> Option<Value> {
        let value = match self {
            AttributeKind::Text => Some(Value::String(text.to_string())),
            AttributeKind::FloatList(count) => Some(Value::Array(
                parse_float_array(text, count)
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            )),
            AttributeKind::Float => parse_number(text).map(Value::from),
            AttributeKind::Integer => parse_integer(text).map(Value::from),
            AttributeKind::Flag => Some(Value::Bool(parse_flag(text))),
        };
        if value.is_none() {
            log::warn!("Ignoring attribute {}=\"{}\": not a number", name, text);
        }
        value
    }
}

/// The JSON attribute as a key map, if present and well-formed.
fn json_layer(source: &impl AttributeSource) -> Option<Map<String, Value>> {
    let text = source.attribute(defaults::CONFIG_ATTRIBUTE)?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            log::warn!(
                "{} must hold a JSON object, got {}; using defaults",
                defaults::CONFIG_ATTRIBUTE,
                other
            );
            None
        }
        Err(e) => {
            log::warn!("Failed to parse {}: {}", defaults::CONFIG_ATTRIBUTE, e);
            None
        }
    }
}

fn attribute_layer(source: &impl AttributeSource) -> Map<String, Value> {
    let mut layer = Map::new();
    for &(name, key, kind) in ATTRIBUTES {
        if let Some(text) = source.attribute(name) {
            if let Some(value) = kind.convert(name, &text) {
                layer.insert(key.to_string(), value);
            }
        }
    }
    layer
}

/// Merge defaults, the JSON attribute, individual attributes and `overrides`,
/// later sources winning.
pub fn resolve_config(source: &impl AttributeSource, overrides: Option<&Overrides>) -> ViewerConfig {
    let mut config = ViewerConfig::default();

    if let Some(layer) = json_layer(source) {
        config.apply_layer(&layer, "JSON attribute");
    }
    config.apply_layer(&attribute_layer(source), "attribute");
    if let Some(overrides) = overrides {
        config.apply_layer(overrides, "override");
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct Attrs(HashMap<&'static str, &'static str>);

    impl AttributeSource for Attrs {
        fn attribute(&self, name: &str) -> Option<String> {
            self.0.get(name).map(|v| v.to_string())
        }
    }

    fn attrs(pairs: &[(&'static str, &'static str)]) -> Attrs {
        Attrs(pairs.iter().copied().collect())
    }

    fn map(value: Value) -> Overrides {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(resolve_config(&attrs(&[]), None), ViewerConfig::default());
    }

    #[test]
    fn later_sources_win() {
        let source = attrs(&[
            (
                "data-splat-config",
                r##"{"rotationSpeed": 0.02, "backgroundColor": "#222"}"##,
            ),
            ("data-rotation-speed", "0.03"),
        ]);
        let overrides = map(json!({ "backgroundColor": "#444" }));

        let config = resolve_config(&source, Some(&overrides));

        assert_eq!(config.rotation_speed, 0.03);
        assert_eq!(config.background_color, "#444");
        assert_eq!(config.fov, defaults::CAMERA_FOV_DEG);
    }

    #[test]
    fn json_attribute_beats_defaults() {
        let source = attrs(&[(
            "data-splat-config",
            r#"{"modelUrl": "scan.ksplat", "autoRotate": false, "cameraPosition": [1, 2, 3]}"#,
        )]);
        let config = resolve_config(&source, None);
        assert_eq!(config.model_url, "scan.ksplat");
        assert!(!config.auto_rotate);
        assert_eq!(config.camera_position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn malformed_json_attribute_keeps_defaults() {
        let source = attrs(&[("data-splat-config", "{not json"), ("data-fov", "60")]);
        let config = resolve_config(&source, None);
        assert_eq!(config.fov, 60.0);
        assert_eq!(config.model_url, defaults::MODEL_URL);

        let source = attrs(&[("data-splat-config", "[1, 2]")]);
        assert_eq!(resolve_config(&source, None), ViewerConfig::default());
    }

    #[test]
    fn attribute_type_rules() {
        let source = attrs(&[
            ("data-camera-position", "1, 2"),
            ("data-desktop-min-height", "640.9"),
            ("data-mobile-min-height", "240"),
            ("data-debug", "true"),
            ("data-responsive", "no"),
            ("data-position", "1,2,3"),
        ]);
        let config = resolve_config(&source, None);
        assert_eq!(config.camera_position, [1.0, 2.0, 0.0]);
        assert_eq!(config.desktop_min_height, 640);
        assert_eq!(config.mobile_min_height, 240);
        assert!(config.debug);
        assert!(!config.responsive);
        assert_eq!(config.model_position(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn unreadable_scalars_are_skipped() {
        let source = attrs(&[
            ("data-splat-config", r#"{"fov": 50}"#),
            ("data-fov", "wide"),
            ("data-mobile-min-height", "-20"),
            ("data-camera-position", "1,x,3"),
        ]);
        let config = resolve_config(&source, None);
        assert_eq!(config.fov, 50.0);
        assert_eq!(config.mobile_min_height, defaults::MOBILE_MIN_HEIGHT);
        assert_eq!(config.camera_position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn wrongly_typed_override_keeps_previous_value() {
        let overrides = map(json!({ "near": "close", "far": 50 }));
        let config = resolve_config(&attrs(&[]), Some(&overrides));
        assert_eq!(config.near, defaults::CAMERA_NEAR);
        assert_eq!(config.far, 50.0);
    }

    #[test]
    fn unknown_keys_are_kept() {
        let source = attrs(&[("data-splat-config", r#"{"label": "lobby"}"#)]);
        let overrides = map(json!({ "tags": ["a"] }));
        let config = resolve_config(&source, Some(&overrides));
        assert_eq!(config.extra.get("label"), Some(&json!("lobby")));
        assert_eq!(config.extra.get("tags"), Some(&json!(["a"])));
    }

    #[test]
    fn camera_position_accepts_text_in_json() {
        let overrides = map(json!({ "cameraPosition": "0, 1.5" }));
        let config = resolve_config(&attrs(&[]), Some(&overrides));
        assert_eq!(config.camera_position, [0.0, 1.5, 0.0]);
    }

    #[test]
    fn orientation_is_padded() {
        let config = ViewerConfig {
            orientation: "0,1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.model_orientation(), [0.0, 1.0, 0.0, 0.0]);
    }
}
