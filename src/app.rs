use crate::backend::BackendClient;
use crate::event::AppEvent;
use crate::theme::Theme;
use crate::ui::action::{ActionError, ActionOutcome, ActionRegistry};
use crate::ui::binding::{ActionRef, DataContext, GraphQueryResponse};
use crate::ui::catalog::Catalog;
use crate::ui::patch::PatchDecoder;
use crate::ui::prompt;
use crate::ui::render::Renderer;
use crate::ui::tree::{Phase, TreeBuilder, TreeWarning};
use eframe::egui::{self, RichText, ScrollArea};
use serde_json::Value;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

// Side effects an action handler cannot perform itself. Handlers push
// commands into a shared queue; the app drains it after dispatch, still on
// the egui thread.
#[derive(Debug, Clone, PartialEq)]
enum AppCommand {
    RefreshGraph { query: Option<String> },
    InspectNode { id: String },
}

type CommandQueue = Arc<Mutex<Vec<AppCommand>>>;

fn register_builtin_actions(
    registry: &mut ActionRegistry,
    commands: CommandQueue,
) -> Result<(), ActionError> {
    registry.register(
        "alert",
        Arc::new(|params: &Value| {
            match params.get("message").and_then(Value::as_str) {
                Some(message) => ActionOutcome::notice(message),
                None => ActionOutcome::Failed {
                    message: "alert requires a `message` param".to_string(),
                },
            }
        }),
    )?;

    let queue = Arc::clone(&commands);
    registry.register(
        "refresh_graph",
        Arc::new(move |params: &Value| {
            let query = params
                .get("query")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Ok(mut guard) = queue.lock() {
                guard.push(AppCommand::RefreshGraph { query });
            }
            ActionOutcome::notice("Refreshing graph data")
        }),
    )?;

    let queue = Arc::clone(&commands);
    registry.register(
        "inspect_node",
        Arc::new(move |params: &Value| {
            let Some(id) = params.get("id").and_then(Value::as_str) else {
                return ActionOutcome::Failed {
                    message: "inspect_node requires an `id` param".to_string(),
                };
            };
            if let Ok(mut guard) = queue.lock() {
                guard.push(AppCommand::InspectNode { id: id.to_string() });
            }
            ActionOutcome::done()
        }),
    )?;

    Ok(())
}

pub struct GraphdeckApp {
    rx: Receiver<AppEvent>,
    backend: BackendClient,
    theme: Theme,
    catalog: Arc<Catalog>,
    renderer: Renderer,
    actions: ActionRegistry,
    commands: CommandQueue,
    instructions: String,
    decoder: PatchDecoder,
    builder: TreeBuilder,
    data: DataContext,
    graph: Option<GraphQueryResponse>,
    selected_node: Option<String>,
    current_generation: u64,
    stream_error: Option<String>,
    warnings: Vec<TreeWarning>,
    notice: Option<String>,
    prompt_buffer: String,
    diagnostics_log: Vec<String>,
    theme_applied: bool,
}

impl GraphdeckApp {
    pub fn new(rx: Receiver<AppEvent>, backend: BackendClient) -> Self {
        let catalog = Arc::new(Catalog::builtin());
        let commands: CommandQueue = Arc::new(Mutex::new(Vec::new()));
        let mut actions = ActionRegistry::new();
        let mut diagnostics_log = Vec::new();
        if let Err(err) = register_builtin_actions(&mut actions, Arc::clone(&commands)) {
            diagnostics_log.push(format!("[{}] action setup: {err}", Self::timestamp()));
        }

        Self {
            rx,
            backend,
            theme: Theme::default(),
            instructions: prompt::compile(&catalog),
            renderer: Renderer::new(Arc::clone(&catalog)),
            builder: TreeBuilder::new(Arc::clone(&catalog)),
            catalog,
            actions,
            commands,
            decoder: PatchDecoder::new(),
            data: DataContext::default(),
            graph: None,
            selected_node: None,
            current_generation: 0,
            stream_error: None,
            warnings: Vec::new(),
            notice: None,
            prompt_buffer: String::new(),
            diagnostics_log,
            theme_applied: false,
        }
    }

    fn timestamp() -> String {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_secs().to_string(),
            Err(_) => "0".to_string(),
        }
    }

    fn log_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics_log
            .push(format!("[{}] {}", Self::timestamp(), message.into()));
    }

    fn submit_prompt(&mut self, ctx: &egui::Context) {
        let prompt = self.prompt_buffer.trim().to_string();
        if prompt.is_empty() {
            return;
        }

        // Each request gets a fresh decoder and builder; the old tree stays
        // on screen until the first patch of the new stream lands.
        self.decoder = PatchDecoder::new();
        self.builder = TreeBuilder::new(Arc::clone(&self.catalog));
        self.stream_error = None;
        self.warnings.clear();
        self.current_generation = self.backend.generate(prompt, self.instructions.clone());
        self.log_diagnostic(format!("generation {} started", self.current_generation));
        self.prompt_buffer.clear();
        ctx.request_repaint();
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.apply_event(event, Some(ctx)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.log_diagnostic("event channel disconnected");
                    break;
                }
            }
        }
    }

    fn apply_event(&mut self, event: AppEvent, ctx: Option<&egui::Context>) {
        match event {
            AppEvent::StreamDelta { generation, chunk } => {
                if generation != self.current_generation {
                    self.log_diagnostic(format!("discarded chunk from stale generation {generation}"));
                    return;
                }
                for result in self.decoder.push_bytes(&chunk) {
                    match result {
                        Ok(op) => self.builder.apply(op),
                        Err(err) => self.log_diagnostic(format!("skipped patch line: {err}")),
                    }
                }
                self.warnings.extend(self.builder.drain_warnings());
                if let Some(ctx) = ctx {
                    ctx.request_repaint();
                }
            }
            AppEvent::StreamEnd { generation } => {
                if generation != self.current_generation {
                    return;
                }
                if let Some(result) = self.decoder.finish() {
                    match result {
                        Ok(op) => self.builder.apply(op),
                        Err(err) => self.log_diagnostic(format!("skipped patch tail: {err}")),
                    }
                }
                self.builder.finish();
                self.warnings.extend(self.builder.drain_warnings());
                self.log_diagnostic(format!("generation {generation} finalized"));
                if let Some(ctx) = ctx {
                    ctx.request_repaint();
                }
            }
            AppEvent::StreamError {
                generation,
                message,
            } => {
                if generation != self.current_generation {
                    return;
                }
                self.log_diagnostic(format!("generation {generation} failed: {message}"));
                self.stream_error = Some(message);
                self.builder.finish();
            }
            AppEvent::GraphLoaded(graph) => {
                self.data = DataContext::from_graph(&graph);
                self.log_diagnostic(format!(
                    "graph loaded: {} nodes, {} edges",
                    graph.nodes.len(),
                    graph.edges.len()
                ));
                self.graph = Some(graph);
            }
            AppEvent::GraphError(message) => {
                self.log_diagnostic(format!("graph query failed: {message}"));
                self.notice = Some(format!("Graph unavailable: {message}"));
            }
        }
    }

    fn dispatch_action(&mut self, action: ActionRef) {
        match self.actions.dispatch(&action) {
            Ok(ActionOutcome::Completed { notice }) => {
                if let Some(notice) = notice {
                    self.notice = Some(notice);
                }
            }
            Ok(ActionOutcome::Failed { message }) => {
                self.log_diagnostic(format!("action `{}` failed: {message}", action.name));
                self.notice = Some(message);
            }
            Err(err) => {
                // Unknown actions surface in the UI, not just the log.
                self.log_diagnostic(err.to_string());
                self.notice = Some(format!("Unsupported action `{}`", action.name));
            }
        }

        let pending: Vec<AppCommand> = match self.commands.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for command in pending {
            match command {
                AppCommand::RefreshGraph { query } => self.backend.fetch_graph(query),
                AppCommand::InspectNode { id } => self.selected_node = Some(id),
            }
        }
    }

    fn render_top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong("Graphdeck");
                ui.separator();
                let (label, color) = if self.stream_error.is_some() {
                    ("Stream error", self.theme.danger)
                } else {
                    match self.builder.phase() {
                        Phase::Empty => ("Idle", self.theme.text_muted),
                        Phase::Streaming => ("Streaming...", self.theme.warning),
                        Phase::Finalized => ("Ready", self.theme.success),
                    }
                };
                ui.label(RichText::new(label).color(color));
                if let Some(graph) = &self.graph {
                    ui.separator();
                    ui.label(
                        RichText::new(format!(
                            "{} nodes · {} edges",
                            graph.nodes.len(),
                            graph.edges.len()
                        ))
                        .color(self.theme.text_muted),
                    );
                }
            });
        });
    }

    fn render_graph_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("graph_panel")
            .resizable(true)
            .show(ctx, |ui| {
                ui.heading("Knowledge graph");
                ui.separator();

                let Some(graph) = self.graph.clone() else {
                    ui.label(RichText::new("No graph data yet").color(self.theme.text_muted));
                    if ui.button("Load graph").clicked() {
                        self.backend.fetch_graph(None);
                    }
                    return;
                };

                ScrollArea::vertical().id_salt("graph_nodes").show(ui, |ui| {
                    for node in &graph.nodes {
                        let selected = self.selected_node.as_deref() == Some(node.id.as_str());
                        if ui.selectable_label(selected, &node.label).clicked() {
                            self.selected_node = Some(node.id.clone());
                        }
                    }
                });

                if let Some(id) = self.selected_node.clone() {
                    if let Some(node) = graph.nodes.iter().find(|node| node.id == id) {
                        ui.separator();
                        ui.strong(&node.label);
                        if let Some(kind) = &node.r#type {
                            ui.label(RichText::new(kind).color(self.theme.text_muted));
                        }
                        if let Some(summary) = &node.summary {
                            ui.label(summary);
                        }
                        let degree = graph
                            .edges
                            .iter()
                            .filter(|edge| edge.from == id || edge.to == id)
                            .count();
                        ui.label(
                            RichText::new(format!("{degree} connected edges"))
                                .color(self.theme.text_muted),
                        );
                    }
                }
            });
    }

    fn render_canvas_panel(&mut self, ctx: &egui::Context) {
        let mut emitted: Vec<ActionRef> = Vec::new();
        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(notice) = self.notice.clone() {
                self.theme.banner_frame(self.theme.notice_tint).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.label(RichText::new(notice).color(self.theme.text_primary));
                        if ui.small_button("Dismiss").clicked() {
                            self.notice = None;
                        }
                    });
                });
                ui.add_space(self.theme.spacing_8);
            }

            let canvas_height = (ui.available_height() - 170.0).max(120.0);
            ScrollArea::vertical()
                .id_salt("canvas")
                .max_height(canvas_height)
                .show(ui, |ui| {
                    if let Some(message) = &self.stream_error {
                        self.theme.banner_frame(self.theme.error_tint).show(ui, |ui| {
                            ui.label(
                                RichText::new(format!("Generation failed: {message}"))
                                    .color(self.theme.danger),
                            );
                        });
                        return;
                    }

                    match self.renderer.resolve(self.builder.tree(), &self.data) {
                        Some(resolved) => {
                            self.renderer.show(&resolved, ui, &self.theme, &mut |action| {
                                emitted.push(action);
                            });
                        }
                        None => {
                            let hint = match self.builder.phase() {
                                Phase::Streaming => "Waiting for the root element...",
                                _ => "Describe the dashboard you want below.",
                            };
                            ui.label(RichText::new(hint).color(self.theme.text_muted));
                        }
                    }
                });

            ui.separator();
            egui::CollapsingHeader::new("Diagnostics")
                .default_open(false)
                .show(ui, |ui| {
                    ScrollArea::vertical()
                        .id_salt("diagnostics_log")
                        .max_height(90.0)
                        .stick_to_bottom(true)
                        .show(ui, |ui| {
                            for warning in &self.warnings {
                                ui.label(
                                    RichText::new(warning.to_string()).color(self.theme.warning),
                                );
                            }
                            for entry in &self.diagnostics_log {
                                ui.label(entry);
                            }
                        });
                });

            ui.separator();
            let streaming = self.builder.is_streaming();
            let hint = if streaming {
                "Generating..."
            } else {
                "Describe a dashboard..."
            };

            let mut send_now = false;
            self.theme.composer_frame().show(ui, |ui| {
                ui.horizontal(|ui| {
                    let response = ui.add_enabled(
                        !streaming,
                        egui::TextEdit::singleline(&mut self.prompt_buffer)
                            .desired_width(f32::INFINITY)
                            .hint_text(hint),
                    );
                    if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        send_now = true;
                    }
                    let clicked = ui
                        .add_enabled(
                            !streaming && !self.prompt_buffer.trim().is_empty(),
                            egui::Button::new("Generate"),
                        )
                        .clicked();
                    send_now |= clicked;
                });
            });

            if send_now && !streaming {
                self.submit_prompt(ctx);
            }
        });

        for action in emitted {
            self.dispatch_action(action);
        }
    }
}

impl eframe::App for GraphdeckApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            self.theme.apply_visuals(ctx);
            self.theme_applied = true;
        }
        self.drain_events(ctx);
        self.render_top_bar(ctx);
        self.render_graph_panel(ctx);
        self.render_canvas_panel(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use std::sync::mpsc;

    fn app_with_runtime() -> (GraphdeckApp, tokio::runtime::Runtime) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("test runtime");
        let (tx, rx) = mpsc::channel();
        let backend = {
            let _guard = runtime.enter();
            BackendClient::new(Config::from_env(), tx).expect("backend client")
        };
        (GraphdeckApp::new(rx, backend), runtime)
    }

    #[test]
    fn stale_generation_chunks_are_discarded() {
        let (mut app, _runtime) = app_with_runtime();
        app.current_generation = 2;

        app.apply_event(
            AppEvent::StreamDelta {
                generation: 1,
                chunk: b"{\"op\":\"set\",\"path\":\"/root\",\"value\":\"old\"}\n".to_vec(),
            },
            None,
        );
        assert!(app.builder.tree().root.is_none());

        app.apply_event(
            AppEvent::StreamDelta {
                generation: 2,
                chunk: b"{\"op\":\"set\",\"path\":\"/root\",\"value\":\"new\"}\n".to_vec(),
            },
            None,
        );
        assert_eq!(app.builder.tree().root.as_deref(), Some("new"));
    }

    #[test]
    fn malformed_lines_are_logged_and_skipped() {
        let (mut app, _runtime) = app_with_runtime();
        app.apply_event(
            AppEvent::StreamDelta {
                generation: 0,
                chunk: b"not json\n{\"op\":\"set\",\"path\":\"/root\",\"value\":\"r\"}\n".to_vec(),
            },
            None,
        );
        assert_eq!(app.builder.tree().root.as_deref(), Some("r"));
        assert!(app
            .diagnostics_log
            .iter()
            .any(|entry| entry.contains("skipped patch line")));
    }

    #[test]
    fn accented_text_survives_a_delta_boundary_inside_the_character() {
        let (mut app, _runtime) = app_with_runtime();
        let line = "{\"op\":\"set\",\"path\":\"/elements/t\",\"value\":{\"key\":\"t\",\"type\":\"Text\",\"props\":{\"text\":\"café\"}}}\n";
        let bytes = line.as_bytes();
        let cut = line.find('é').expect("fixture contains é") + 1;

        app.apply_event(
            AppEvent::StreamDelta {
                generation: 0,
                chunk: bytes[..cut].to_vec(),
            },
            None,
        );
        app.apply_event(
            AppEvent::StreamDelta {
                generation: 0,
                chunk: bytes[cut..].to_vec(),
            },
            None,
        );

        let element = app.builder.tree().get("t").expect("element should exist");
        assert_eq!(element.props.get("text"), Some(&json!("café")));
    }

    #[test]
    fn stream_error_sets_the_banner_and_finalizes() {
        let (mut app, _runtime) = app_with_runtime();
        app.apply_event(
            AppEvent::StreamError {
                generation: 0,
                message: "upstream 502".to_string(),
            },
            None,
        );
        assert_eq!(app.stream_error.as_deref(), Some("upstream 502"));
        assert_eq!(app.builder.phase(), Phase::Finalized);
    }

    #[test]
    fn graph_load_refreshes_the_data_context() {
        let (mut app, _runtime) = app_with_runtime();
        let graph: GraphQueryResponse = serde_json::from_value(json!({
            "nodes": [{ "id": "n1", "label": "Login" }],
            "edges": []
        }))
        .expect("graph payload");

        app.apply_event(AppEvent::GraphLoaded(graph), None);
        assert_eq!(app.data.resolve("nodes.0.label"), json!("Login"));
        assert!(app.graph.is_some());
    }

    #[test]
    fn unknown_action_surfaces_a_notice() {
        let (mut app, _runtime) = app_with_runtime();
        app.dispatch_action(ActionRef {
            name: "teleport".to_string(),
            params: Value::Null,
        });
        assert_eq!(app.notice.as_deref(), Some("Unsupported action `teleport`"));
    }

    #[test]
    fn refresh_graph_action_reports_a_notice() {
        let (mut app, runtime) = app_with_runtime();
        let _guard = runtime.enter();
        app.dispatch_action(ActionRef {
            name: "refresh_graph".to_string(),
            params: json!({}),
        });
        assert_eq!(app.notice.as_deref(), Some("Refreshing graph data"));
    }

    #[test]
    fn inspect_node_action_selects_the_node() {
        let (mut app, _runtime) = app_with_runtime();
        app.dispatch_action(ActionRef {
            name: "inspect_node".to_string(),
            params: json!({ "id": "n7" }),
        });
        assert_eq!(app.selected_node.as_deref(), Some("n7"));
    }
}
