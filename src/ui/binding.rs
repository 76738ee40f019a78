use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BIND_KEY: &str = "$bind";

// `{"$bind": "<dot.path>"}` and nothing else makes a value a binding.
pub fn binding_path(value: &Value) -> Option<&str> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(BIND_KEY)?.as_str()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRef {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

impl ActionRef {
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let name = map.get("name")?.as_str()?.to_string();
        let params = map.get("params").cloned().unwrap_or(Value::Null);
        if !(params.is_object() || params.is_null()) {
            return None;
        }
        Some(Self { name, params })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQueryResponse {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

// Read-only lookup surface the renderer dereferences bindings against.
// Backed by one JSON document; absent paths resolve to null, never an error.
#[derive(Debug, Clone, Default)]
pub struct DataContext {
    root: Value,
}

impl DataContext {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn from_graph(graph: &GraphQueryResponse) -> Self {
        match serde_json::to_value(graph) {
            Ok(root) => Self { root },
            Err(_) => Self { root: Value::Null },
        }
    }

    pub fn resolve(&self, path: &str) -> Value {
        let mut current = &self.root;
        for segment in path.split('.').filter(|segment| !segment.is_empty()) {
            current = match current {
                Value::Object(map) => match map.get(segment) {
                    Some(next) => next,
                    None => return Value::Null,
                },
                Value::Array(items) => match segment.parse::<usize>().ok().and_then(|index| items.get(index)) {
                    Some(next) => next,
                    None => return Value::Null,
                },
                _ => return Value::Null,
            };
        }
        current.clone()
    }
}
