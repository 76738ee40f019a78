use crate::ui::binding::binding_path;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Container,
    Heading,
    Text,
    Metric,
    Badge,
    Table,
    List,
    Divider,
    Button,
    Unknown(String),
}

impl ComponentKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Container => "Container",
            Self::Heading => "Heading",
            Self::Text => "Text",
            Self::Metric => "Metric",
            Self::Badge => "Badge",
            Self::Table => "Table",
            Self::List => "List",
            Self::Divider => "Divider",
            Self::Button => "Button",
            Self::Unknown(kind) => kind.as_str(),
        }
    }

    pub fn from_name(raw: &str) -> Self {
        match raw {
            "Container" => Self::Container,
            "Heading" => Self::Heading,
            "Text" => Self::Text,
            "Metric" => Self::Metric,
            "Badge" => Self::Badge,
            "Table" => Self::Table,
            "List" => Self::List,
            "Divider" => Self::Divider,
            "Button" => Self::Button,
            _ => Self::Unknown(raw.to_string()),
        }
    }
}

impl Serialize for ComponentKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ComponentKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw))
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropKind {
    String,
    Number,
    Boolean,
    Enum(Vec<String>),
    Array(Box<PropKind>),
    Object(BTreeMap<String, PropSpec>),
    Union(Vec<PropKind>),
    Action,
}

impl PropKind {
    pub fn enumeration(values: &[&str]) -> Self {
        Self::Enum(values.iter().map(ToString::to_string).collect())
    }

    pub fn type_label(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Enum(values) => format!("one of [{}]", values.join(", ")),
            Self::Array(inner) => format!("array of {}", inner.type_label()),
            Self::Object(fields) => {
                let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                format!("object {{{}}}", keys.join(", "))
            }
            Self::Union(options) => {
                let labels: Vec<String> = options.iter().map(PropKind::type_label).collect();
                labels.join(" | ")
            }
            Self::Action => "action ref {\"name\", \"params\"}".to_string(),
        }
    }

    // A binding object satisfies any constraint except Action; the bound
    // value is only known at render time.
    pub fn accepts(&self, value: &Value) -> bool {
        if !matches!(self, Self::Action) && binding_path(value).is_some() {
            return true;
        }
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Enum(values) => value
                .as_str()
                .map(|raw| values.iter().any(|allowed| allowed == raw))
                .unwrap_or(false),
            Self::Array(inner) => value
                .as_array()
                .map(|items| items.iter().all(|item| inner.accepts(item)))
                .unwrap_or(false),
            Self::Object(fields) => value
                .as_object()
                .map(|map| {
                    fields.iter().all(|(name, spec)| match map.get(name) {
                        Some(found) => spec.kind.accepts(found),
                        None => !spec.required,
                    })
                })
                .unwrap_or(false),
            Self::Union(options) => options.iter().any(|option| option.accepts(value)),
            Self::Action => value
                .as_object()
                .map(|map| {
                    map.get("name").map(Value::is_string).unwrap_or(false)
                        && map
                            .get("params")
                            .map(|params| params.is_object() || params.is_null())
                            .unwrap_or(true)
                })
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropSpec {
    pub kind: PropKind,
    pub required: bool,
    pub description: String,
}

impl PropSpec {
    pub fn new(kind: PropKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            required: false,
            description: description.into(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentSpec {
    pub name: String,
    pub description: String,
    pub has_children: bool,
    pub props: BTreeMap<String, PropSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    pub params: BTreeMap<String, PropSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    DuplicateName { name: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name } => {
                write!(f, "catalog entry `{name}` is already registered")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropViolation {
    UnknownProp { name: String },
    TypeMismatch { name: String, expected: String },
    MissingRequired { name: String },
}

impl fmt::Display for PropViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProp { name } => write!(f, "prop `{name}` is not in the schema"),
            Self::TypeMismatch { name, expected } => {
                write!(f, "prop `{name}` does not match `{expected}`")
            }
            Self::MissingRequired { name } => write!(f, "required prop `{name}` is missing"),
        }
    }
}

// Checks a props map against a property schema. Invalid or unknown entries
// are dropped rather than failing the whole map; missing required props are
// reported but nothing is synthesized for them.
pub fn validate_props(
    schema: &BTreeMap<String, PropSpec>,
    props: &serde_json::Map<String, Value>,
) -> (BTreeMap<String, Value>, Vec<PropViolation>) {
    let mut kept = BTreeMap::new();
    let mut violations = Vec::new();

    for (name, value) in props {
        let Some(spec) = schema.get(name) else {
            violations.push(PropViolation::UnknownProp { name: name.clone() });
            continue;
        };
        if spec.kind.accepts(value) {
            kept.insert(name.clone(), value.clone());
        } else {
            violations.push(PropViolation::TypeMismatch {
                name: name.clone(),
                expected: spec.kind.type_label(),
            });
        }
    }

    for (name, spec) in schema {
        if spec.required && !kept.contains_key(name) {
            violations.push(PropViolation::MissingRequired { name: name.clone() });
        }
    }

    (kept, violations)
}

#[derive(Debug, Default)]
pub struct Catalog {
    components: BTreeMap<String, ComponentSpec>,
    actions: BTreeMap<String, ActionSpec>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_component(&mut self, spec: ComponentSpec) -> Result<(), CatalogError> {
        if self.components.contains_key(&spec.name) {
            return Err(CatalogError::DuplicateName { name: spec.name });
        }
        self.components.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn register_action(&mut self, spec: ActionSpec) -> Result<(), CatalogError> {
        if self.actions.contains_key(&spec.name) {
            return Err(CatalogError::DuplicateName { name: spec.name });
        }
        self.actions.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.get(name)
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentSpec> {
        self.components.values()
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.values()
    }

    pub fn describe(&self) -> CatalogSummary {
        CatalogSummary {
            components: self.components.values().cloned().collect(),
            actions: self.actions.values().cloned().collect(),
        }
    }

    // The fixed dashboard catalog. Names are literals, so collisions cannot
    // happen and insertion bypasses the duplicate check.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for spec in builtin_components() {
            catalog.components.insert(spec.name.clone(), spec);
        }
        for spec in builtin_actions() {
            catalog.actions.insert(spec.name.clone(), spec);
        }
        catalog
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub components: Vec<ComponentSpec>,
    pub actions: Vec<ActionSpec>,
}

fn props(entries: Vec<(&str, PropSpec)>) -> BTreeMap<String, PropSpec> {
    entries
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect()
}

fn builtin_components() -> Vec<ComponentSpec> {
    vec![
        ComponentSpec {
            name: "Container".to_string(),
            description: "Groups child elements into a stacked or side-by-side section"
                .to_string(),
            has_children: true,
            props: props(vec![
                (
                    "title",
                    PropSpec::new(PropKind::String, "Optional section heading"),
                ),
                (
                    "direction",
                    PropSpec::new(
                        PropKind::enumeration(&["column", "row"]),
                        "Layout axis for children, defaults to column",
                    ),
                ),
            ]),
        },
        ComponentSpec {
            name: "Heading".to_string(),
            description: "Prominent title line".to_string(),
            has_children: false,
            props: props(vec![
                (
                    "text",
                    PropSpec::new(PropKind::String, "Heading text").required(),
                ),
                (
                    "level",
                    PropSpec::new(PropKind::Number, "1 (largest) to 3, defaults to 1"),
                ),
            ]),
        },
        ComponentSpec {
            name: "Text".to_string(),
            description: "Body text paragraph".to_string(),
            has_children: false,
            props: props(vec![
                (
                    "text",
                    PropSpec::new(PropKind::String, "Paragraph content").required(),
                ),
                (
                    "tone",
                    PropSpec::new(
                        PropKind::enumeration(&["default", "muted", "danger"]),
                        "Visual emphasis, defaults to default",
                    ),
                ),
            ]),
        },
        ComponentSpec {
            name: "Metric".to_string(),
            description: "Single key figure with a label".to_string(),
            has_children: false,
            props: props(vec![
                (
                    "label",
                    PropSpec::new(PropKind::String, "What the figure measures").required(),
                ),
                (
                    "value",
                    PropSpec::new(
                        PropKind::Union(vec![PropKind::String, PropKind::Number]),
                        "The figure itself",
                    )
                    .required(),
                ),
                (
                    "delta",
                    PropSpec::new(PropKind::String, "Optional change indicator, e.g. +12%"),
                ),
            ]),
        },
        ComponentSpec {
            name: "Badge".to_string(),
            description: "Small status pill".to_string(),
            has_children: false,
            props: props(vec![
                (
                    "text",
                    PropSpec::new(PropKind::String, "Badge label").required(),
                ),
                (
                    "tone",
                    PropSpec::new(
                        PropKind::enumeration(&["neutral", "success", "warning", "danger"]),
                        "Badge color, defaults to neutral",
                    ),
                ),
            ]),
        },
        ComponentSpec {
            name: "Table".to_string(),
            description: "Tabular records, usually bound to graph query rows".to_string(),
            has_children: false,
            props: props(vec![
                (
                    "columns",
                    PropSpec::new(
                        PropKind::Array(Box::new(PropKind::Object(props(vec![
                            (
                                "key",
                                PropSpec::new(PropKind::String, "Field to read from each row")
                                    .required(),
                            ),
                            (
                                "label",
                                PropSpec::new(PropKind::String, "Column header").required(),
                            ),
                        ])))),
                        "Ordered column definitions",
                    )
                    .required(),
                ),
                (
                    "rows",
                    PropSpec::new(
                        PropKind::Array(Box::new(PropKind::Object(BTreeMap::new()))),
                        "Row objects; typically a binding such as {\"$bind\": \"nodes\"}",
                    )
                    .required(),
                ),
            ]),
        },
        ComponentSpec {
            name: "List".to_string(),
            description: "Bulleted or numbered list of short strings".to_string(),
            has_children: false,
            props: props(vec![
                (
                    "items",
                    PropSpec::new(PropKind::Array(Box::new(PropKind::String)), "List entries")
                        .required(),
                ),
                (
                    "ordered",
                    PropSpec::new(PropKind::Boolean, "Numbered when true, defaults to false"),
                ),
            ]),
        },
        ComponentSpec {
            name: "Divider".to_string(),
            description: "Horizontal separator".to_string(),
            has_children: false,
            props: BTreeMap::new(),
        },
        ComponentSpec {
            name: "Button".to_string(),
            description: "Clickable action trigger".to_string(),
            has_children: false,
            props: props(vec![
                (
                    "label",
                    PropSpec::new(PropKind::String, "Button caption").required(),
                ),
                (
                    "variant",
                    PropSpec::new(
                        PropKind::enumeration(&["primary", "secondary"]),
                        "Visual weight, defaults to secondary",
                    ),
                ),
                (
                    "action",
                    PropSpec::new(PropKind::Action, "Action to dispatch on click").required(),
                ),
            ]),
        },
    ]
}

fn builtin_actions() -> Vec<ActionSpec> {
    vec![
        ActionSpec {
            name: "alert".to_string(),
            description: "Show a transient notice to the user".to_string(),
            params: props(vec![(
                "message",
                PropSpec::new(PropKind::String, "Notice text").required(),
            )]),
        },
        ActionSpec {
            name: "refresh_graph".to_string(),
            description: "Re-run the graph query feeding the dashboard".to_string(),
            params: props(vec![(
                "query",
                PropSpec::new(PropKind::String, "Optional replacement query"),
            )]),
        },
        ActionSpec {
            name: "inspect_node".to_string(),
            description: "Focus one graph node in the side panel".to_string(),
            params: props(vec![(
                "id",
                PropSpec::new(PropKind::String, "Node id from the graph data").required(),
            )]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_component_registration_fails() {
        let mut catalog = Catalog::builtin();
        let spec = ComponentSpec {
            name: "Container".to_string(),
            description: String::new(),
            has_children: true,
            props: BTreeMap::new(),
        };
        assert!(matches!(
            catalog.register_component(spec),
            Err(CatalogError::DuplicateName { .. })
        ));
    }

    #[test]
    fn duplicate_action_registration_fails() {
        let mut catalog = Catalog::builtin();
        let spec = ActionSpec {
            name: "alert".to_string(),
            description: String::new(),
            params: BTreeMap::new(),
        };
        assert!(matches!(
            catalog.register_action(spec),
            Err(CatalogError::DuplicateName { .. })
        ));
    }

    #[test]
    fn describe_covers_every_registered_entry() {
        let catalog = Catalog::builtin();
        let summary = catalog.describe();
        assert_eq!(summary.components.len(), catalog.components().count());
        assert_eq!(summary.actions.len(), catalog.actions().count());
        assert!(summary
            .components
            .iter()
            .any(|component| component.name == "Table"));
        assert!(summary.actions.iter().any(|action| action.name == "alert"));
    }

    #[test]
    fn validate_props_drops_only_offending_entries() {
        let catalog = Catalog::builtin();
        let spec = catalog.component("Metric").expect("Metric is builtin");
        let raw = json!({
            "label": "Events",
            "value": 42,
            "delta": 7,
            "surprise": true
        });
        let (kept, violations) =
            validate_props(&spec.props, raw.as_object().expect("fixture is an object"));

        assert_eq!(kept.len(), 2);
        assert!(kept.contains_key("label"));
        assert!(kept.contains_key("value"));
        assert_eq!(violations.len(), 2);
        assert!(violations
            .iter()
            .any(|violation| matches!(violation, PropViolation::TypeMismatch { name, .. } if name == "delta")));
        assert!(violations
            .iter()
            .any(|violation| matches!(violation, PropViolation::UnknownProp { name } if name == "surprise")));
    }

    #[test]
    fn validate_props_reports_missing_required() {
        let catalog = Catalog::builtin();
        let spec = catalog.component("Heading").expect("Heading is builtin");
        let raw = json!({ "level": 2 });
        let (kept, violations) =
            validate_props(&spec.props, raw.as_object().expect("fixture is an object"));

        assert_eq!(kept.len(), 1);
        assert!(violations
            .iter()
            .any(|violation| matches!(violation, PropViolation::MissingRequired { name } if name == "text")));
    }

    #[test]
    fn binding_objects_satisfy_non_action_constraints() {
        let rows = PropKind::Array(Box::new(PropKind::Object(BTreeMap::new())));
        assert!(rows.accepts(&json!({ "$bind": "nodes" })));
        assert!(!PropKind::Action.accepts(&json!({ "$bind": "nodes" })));
    }

    #[test]
    fn action_constraint_requires_name_and_object_params() {
        assert!(
            PropKind::Action.accepts(&json!({ "name": "alert", "params": { "message": "hi" } }))
        );
        assert!(PropKind::Action.accepts(&json!({ "name": "alert" })));
        assert!(!PropKind::Action.accepts(&json!({ "params": {} })));
        assert!(!PropKind::Action.accepts(&json!({ "name": "alert", "params": 3 })));
    }
}
