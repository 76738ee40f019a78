use crate::theme::Theme;
use crate::ui::binding::{binding_path, ActionRef, DataContext};
use crate::ui::catalog::{Catalog, ComponentKind, PropKind};
use crate::ui::tree::UiTree;
use eframe::egui::{self, RichText};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderFault {
    UnknownComponent { kind: String },
    Cycle,
}

// Output of the resolve pass: bindings dereferenced, action refs captured,
// children recursed depth-first. Pure data so the draw pass stays dumb and
// the interesting logic is testable without an egui context.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedElement {
    pub key: String,
    pub kind: ComponentKind,
    pub props: BTreeMap<String, Value>,
    pub actions: BTreeMap<String, ActionRef>,
    pub children: Vec<ResolvedElement>,
    pub fault: Option<RenderFault>,
}

impl ResolvedElement {
    fn faulted(key: &str, kind: ComponentKind, fault: RenderFault) -> Self {
        Self {
            key: key.to_string(),
            kind,
            props: BTreeMap::new(),
            actions: BTreeMap::new(),
            children: Vec::new(),
            fault: Some(fault),
        }
    }

    pub fn str_prop(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(Value::as_str)
    }

    pub fn num_prop(&self, name: &str) -> Option<f64> {
        self.props.get(name).and_then(Value::as_f64)
    }

    pub fn bool_prop(&self, name: &str) -> bool {
        self.props
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn array_prop(&self, name: &str) -> Vec<Value> {
        self.props
            .get(name)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

pub fn resolve_tree(
    tree: &UiTree,
    catalog: &Catalog,
    data: &DataContext,
) -> Option<ResolvedElement> {
    let root = tree.root.clone()?;
    let mut path = BTreeSet::new();
    resolve_element(&root, tree, catalog, data, &mut path)
}

fn resolve_element(
    key: &str,
    tree: &UiTree,
    catalog: &Catalog,
    data: &DataContext,
    path: &mut BTreeSet<String>,
) -> Option<ResolvedElement> {
    let Some(element) = tree.get(key) else {
        // Dangling reference: the child never arrived. Render nothing for it.
        debug!(key, "skipping dangling child reference");
        return None;
    };

    if path.contains(key) {
        // Builder-side rejection is best effort; guard the walk anyway so a
        // malformed tree costs one subtree, not the whole dashboard.
        return Some(ResolvedElement::faulted(
            key,
            element.kind.clone(),
            RenderFault::Cycle,
        ));
    }

    let Some(spec) = catalog.component(element.kind.as_str()) else {
        return Some(ResolvedElement::faulted(
            key,
            element.kind.clone(),
            RenderFault::UnknownComponent {
                kind: element.kind.as_str().to_string(),
            },
        ));
    };

    let mut props = BTreeMap::new();
    let mut actions = BTreeMap::new();
    for (name, value) in &element.props {
        let is_action_prop = spec
            .props
            .get(name)
            .map(|prop| matches!(prop.kind, PropKind::Action))
            .unwrap_or(false);
        if is_action_prop {
            if let Some(action) = ActionRef::from_value(value) {
                actions.insert(name.clone(), action);
            }
            continue;
        }
        if let Some(bind) = binding_path(value) {
            props.insert(name.clone(), data.resolve(bind));
        } else {
            props.insert(name.clone(), value.clone());
        }
    }

    let mut children = Vec::new();
    if spec.has_children {
        path.insert(key.to_string());
        for child in &element.children {
            if let Some(resolved) = resolve_element(child, tree, catalog, data, path) {
                children.push(resolved);
            }
        }
        path.remove(key);
    }

    Some(ResolvedElement {
        key: key.to_string(),
        kind: element.kind.clone(),
        props,
        actions,
        children,
        fault: None,
    })
}

fn value_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

pub struct Renderer {
    catalog: Arc<Catalog>,
}

impl Renderer {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, tree: &UiTree, data: &DataContext) -> Option<ResolvedElement> {
        resolve_tree(tree, &self.catalog, data)
    }

    pub fn show(
        &self,
        element: &ResolvedElement,
        ui: &mut egui::Ui,
        theme: &Theme,
        emit: &mut dyn FnMut(ActionRef),
    ) {
        match &element.fault {
            Some(RenderFault::UnknownComponent { kind }) => {
                self.show_marker(ui, theme, &format!("Unknown component `{kind}`"));
                return;
            }
            Some(RenderFault::Cycle) => {
                self.show_marker(
                    ui,
                    theme,
                    &format!("Cyclic reference at `{}`", element.key),
                );
                return;
            }
            None => {}
        }

        match &element.kind {
            ComponentKind::Container => self.show_container(element, ui, theme, emit),
            ComponentKind::Heading => {
                let size = match element.num_prop("level").unwrap_or(1.0) as i64 {
                    1 => 18.0,
                    2 => 16.0,
                    _ => 14.0,
                };
                ui.label(
                    RichText::new(element.str_prop("text").unwrap_or_default())
                        .color(theme.text_primary)
                        .size(size)
                        .strong(),
                );
            }
            ComponentKind::Text => {
                let color = match element.str_prop("tone") {
                    Some("muted") => theme.text_muted,
                    Some("danger") => theme.danger,
                    _ => theme.text_primary,
                };
                ui.label(
                    RichText::new(element.str_prop("text").unwrap_or_default())
                        .color(color)
                        .size(14.0),
                );
            }
            ComponentKind::Metric => {
                let frame = theme.card_frame();
                frame.show(ui, |ui| {
                    ui.label(
                        RichText::new(element.str_prop("label").unwrap_or_default())
                            .color(theme.text_muted)
                            .size(12.0),
                    );
                    ui.add_space(theme.spacing_4);
                    let value = element
                        .props
                        .get("value")
                        .map(value_display)
                        .unwrap_or_default();
                    ui.label(
                        RichText::new(value)
                            .color(theme.text_primary)
                            .size(22.0)
                            .strong(),
                    );
                    if let Some(delta) = element.str_prop("delta") {
                        let color = if delta.starts_with('-') {
                            theme.danger
                        } else {
                            theme.success
                        };
                        ui.label(RichText::new(delta).color(color).size(12.0));
                    }
                });
            }
            ComponentKind::Badge => {
                let tone = match element.str_prop("tone") {
                    Some("success") => theme.success,
                    Some("warning") => theme.warning,
                    Some("danger") => theme.danger,
                    _ => theme.text_muted,
                };
                egui::Frame::new()
                    .fill(theme.surface_3)
                    .corner_radius(egui::CornerRadius::same(theme.radius_8))
                    .inner_margin(egui::Margin::symmetric(
                        theme.spacing_8 as i8,
                        theme.spacing_4 as i8,
                    ))
                    .show(ui, |ui| {
                        ui.label(
                            RichText::new(element.str_prop("text").unwrap_or_default())
                                .color(tone)
                                .size(12.0),
                        );
                    });
            }
            ComponentKind::Table => self.show_table(element, ui, theme),
            ComponentKind::List => {
                let ordered = element.bool_prop("ordered");
                for (index, item) in element.array_prop("items").iter().enumerate() {
                    let prefix = if ordered {
                        format!("{}. ", index + 1)
                    } else {
                        "• ".to_string()
                    };
                    ui.label(
                        RichText::new(format!("{prefix}{}", value_display(item)))
                            .color(theme.text_primary)
                            .size(13.0),
                    );
                }
            }
            ComponentKind::Divider => {
                ui.separator();
            }
            ComponentKind::Button => {
                let primary = element.str_prop("variant") == Some("primary");
                let (fill, stroke, text_color) = if primary {
                    (
                        theme.accent_primary,
                        theme.primary_button_stroke(),
                        theme.text_on_accent,
                    )
                } else {
                    (
                        theme.surface_2,
                        theme.subtle_button_stroke(),
                        theme.text_primary,
                    )
                };
                let label = element.str_prop("label").unwrap_or_default();
                let widget = egui::Button::new(RichText::new(label).color(text_color).size(13.0))
                    .fill(fill)
                    .stroke(stroke)
                    .corner_radius(egui::CornerRadius::same(theme.radius_8))
                    .min_size(egui::vec2(0.0, theme.button_height));

                // A button whose action prop was dropped stays visible but inert.
                match element.actions.get("action") {
                    Some(action) => {
                        if ui.add(widget).clicked() {
                            emit(action.clone());
                        }
                    }
                    None => {
                        ui.add_enabled(false, widget);
                    }
                }
            }
            ComponentKind::Unknown(kind) => {
                self.show_marker(ui, theme, &format!("Unknown component `{kind}`"));
            }
        }
    }

    fn show_container(
        &self,
        element: &ResolvedElement,
        ui: &mut egui::Ui,
        theme: &Theme,
        emit: &mut dyn FnMut(ActionRef),
    ) {
        let frame = theme.card_frame();
        frame.show(ui, |ui| {
            if let Some(title) = element.str_prop("title") {
                ui.label(RichText::new(title).color(theme.text_primary).size(13.0));
                ui.add_space(theme.spacing_8);
            }
            if element.str_prop("direction") == Some("row") {
                ui.horizontal_wrapped(|ui| {
                    for child in &element.children {
                        self.show(child, ui, theme, emit);
                        ui.add_space(theme.spacing_8);
                    }
                });
            } else {
                for child in &element.children {
                    self.show(child, ui, theme, emit);
                    ui.add_space(theme.spacing_8);
                }
            }
        });
    }

    fn show_table(&self, element: &ResolvedElement, ui: &mut egui::Ui, theme: &Theme) {
        let columns = element.array_prop("columns");
        let rows = element.array_prop("rows");
        if columns.is_empty() {
            return;
        }

        egui::Grid::new(format!("table_{}", element.key))
            .striped(true)
            .min_col_width(60.0)
            .show(ui, |ui| {
                for column in &columns {
                    let label = column
                        .get("label")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    ui.label(
                        RichText::new(label)
                            .color(theme.text_muted)
                            .size(12.0)
                            .strong(),
                    );
                }
                ui.end_row();

                for row in &rows {
                    for column in &columns {
                        let cell = column
                            .get("key")
                            .and_then(Value::as_str)
                            .and_then(|key| row.get(key))
                            .map(value_display)
                            .unwrap_or_default();
                        ui.label(RichText::new(cell).color(theme.text_primary).size(13.0));
                    }
                    ui.end_row();
                }
            });
    }

    fn show_marker(&self, ui: &mut egui::Ui, theme: &Theme, message: &str) {
        let frame = theme.card_frame();
        frame.show(ui, |ui| {
            ui.label(RichText::new(message).color(theme.danger).size(12.0));
        });
    }
}
