//! Document model: app → pages → widgets.
//!
//! The serde shape of these types is the wire shape. Patch pointers such as
//! `/pages/0/body/2/props/x` address the JSON produced here, so field names
//! are camelCase and `children` is always present on a widget.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default primary color for new projects and anonymous cursors.
pub const DEFAULT_PRIMARY: &str = "#3b82f6";

/// Background color of freshly created pages.
pub const DEFAULT_PAGE_BACKGROUND: &str = "#f8fafc";

/// 2D point in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Per-page layout flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositioningMode {
    /// Flow layout: widgets stack, sizes are relative.
    #[default]
    Flex,
    /// Free-form layout: widgets carry pixel `x`/`y`/`width`/`height`.
    Absolute,
}

/// Widget vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WidgetType {
    Container,
    Row,
    Column,
    Stack,
    Card,
    ListView,
    GridView,
    Drawer,
    AppBar,
    BottomNavigationBar,
    TabBar,
    Text,
    Heading,
    Image,
    Icon,
    Button,
    FloatingActionButton,
    TextField,
    MultilineTextField,
    Checkbox,
    Switch,
    RadioGroup,
    Dropdown,
    Slider,
    DatePicker,
    ProgressIndicator,
    CircleAvatar,
    Chip,
    Divider,
    Badge,
    AlertDialog,
    ListTile,
    DataTable,
    Avatar,
}

impl WidgetType {
    /// Types that may hold children.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            WidgetType::Container
                | WidgetType::Row
                | WidgetType::Column
                | WidgetType::Stack
                | WidgetType::Card
                | WidgetType::ListView
                | WidgetType::GridView
                | WidgetType::Drawer
        )
    }

    /// App bar, bottom navigation and tab bar. Dropped at page root without
    /// an explicit position they go to the end of the body.
    pub fn is_navigation_chrome(self) -> bool {
        matches!(
            self,
            WidgetType::AppBar | WidgetType::BottomNavigationBar | WidgetType::TabBar
        )
    }

    /// Default pixel size used when a page switches to absolute positioning.
    pub fn default_size(self) -> (f64, f64) {
        if self.is_container() {
            (200.0, 150.0)
        } else {
            (150.0, 40.0)
        }
    }
}

/// Icon reference stored inline in props, e.g. `{"icon": "home", "color": "#000"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IconDescriptor {
    pub icon: String,
    pub color: String,
}

/// A single prop value.
///
/// Deserialization picks the narrowest matching variant in declaration
/// order; anything that fits none of them is kept verbatim as `Json`.
/// Colors and relative sizes ("100%", "auto") are plain `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Number(Number),
    Text(String),
    List(Vec<String>),
    Table(Vec<Vec<String>>),
    Icon(IconDescriptor),
    Json(Value),
}

impl PropValue {
    /// Normalizes an arbitrary JSON value into the narrowest variant.
    pub fn from_json(value: Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(PropValue::Json(value))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(PropValue::Json(Value::Null), PropValue::Number)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Number(Number::from(value))
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(value)
    }
}

impl From<Vec<String>> for PropValue {
    fn from(value: Vec<String>) -> Self {
        PropValue::List(value)
    }
}

impl From<IconDescriptor> for PropValue {
    fn from(value: IconDescriptor) -> Self {
        PropValue::Icon(value)
    }
}

/// Open prop map. Which keys are legal depends on the widget type and is
/// checked by the property panel, not here.
pub type Props = BTreeMap<String, PropValue>;

/// A node in a page body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: WidgetType,
    #[serde(default)]
    pub props: Props,
    #[serde(default)]
    pub children: Vec<Widget>,
}

impl Widget {
    /// New widget with a fresh UUID and no props.
    pub fn new(kind: WidgetType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            props: Props::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style prop setter.
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Builder-style child append. Callers are expected to only use this on
    /// containers.
    pub fn with_child(mut self, child: Widget) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }

    pub fn prop(&self, key: &str) -> Option<&PropValue> {
        self.props.get(key)
    }

    pub fn set_prop(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        self.props.insert(key.into(), value.into());
    }

    /// Current `x`/`y` props, when both are numeric.
    pub fn position(&self) -> Option<Point> {
        let x = self.prop("x")?.as_f64()?;
        let y = self.prop("y")?.as_f64()?;
        Some(Point::new(x, y))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fab {
    pub label: String,
    pub icon: String,
    pub snack: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Unique lowercase identity key.
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positioning_mode: Option<PositioningMode>,
    #[serde(default)]
    pub body: Vec<Widget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fab: Option<Fab>,
}

impl Page {
    /// Page with the defaults the editor uses for new pages.
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            layout: Some("scroll".to_owned()),
            background_color: Some(DEFAULT_PAGE_BACKGROUND.to_owned()),
            positioning_mode: Some(PositioningMode::Absolute),
            body: Vec::new(),
            fab: None,
        }
    }

    /// Effective mode; pages without the flag lay out as flex.
    pub fn mode(&self) -> PositioningMode {
        self.positioning_mode.unwrap_or_default()
    }

    /// Route string for this page, e.g. `/home`.
    pub fn route(&self) -> String {
        format!("/{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub primary: String,
}

/// Root of the synchronized tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub routes: Vec<String>,
    pub pages: Vec<Page>,
}

impl Default for Document {
    /// The document a brand-new project starts from.
    fn default() -> Self {
        let home = Page::new("home", "Home");
        Self {
            app_name: "New Flutter App".to_owned(),
            theme: Some(Theme {
                primary: DEFAULT_PRIMARY.to_owned(),
            }),
            routes: vec![home.route()],
            pages: vec![home],
        }
    }
}

impl Document {
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_by_name(&self, name: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.name == name)
    }

    /// Parse a document from its JSON form.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// JSON form of the document, the shape patches address.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
