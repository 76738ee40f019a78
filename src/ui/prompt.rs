use crate::ui::catalog::Catalog;

pub const WORKED_EXAMPLE: &str = r#"{"op":"set","path":"/root","value":"dash"}
{"op":"set","path":"/elements/dash","value":{"key":"dash","type":"Container","props":{"title":"Overview"},"children":["count","open"]}}
{"op":"set","path":"/elements/count","value":{"key":"count","type":"Metric","props":{"label":"Captured screens","value":{"$bind":"nodes.0.label"}}}}
{"op":"set","path":"/elements/open","value":{"key":"open","type":"Button","props":{"label":"Refresh","action":{"name":"refresh_graph","params":{}}}}}"#;

// Renders the catalog into the instruction text handed to the generating
// model. Pure and deterministic: the catalog maps are ordered, so the same
// catalog always compiles to the same string.
pub fn compile(catalog: &Catalog) -> String {
    let mut out = String::new();

    out.push_str(
        "You describe admin dashboards as a UI element tree streamed as patch operations.\n\
         Data comes from a knowledge-graph query; its result is available to the renderer\n\
         as a data context with top-level `nodes` and `edges` arrays.\n\n",
    );

    out.push_str("## Components\n\n");
    for component in catalog.components() {
        let children = if component.has_children {
            "accepts children"
        } else {
            "no children"
        };
        out.push_str(&format!(
            "### {} ({children})\n{}\n",
            component.name, component.description
        ));
        if component.props.is_empty() {
            out.push_str("Props: none\n\n");
            continue;
        }
        out.push_str("Props:\n");
        for (name, prop) in &component.props {
            let requirement = if prop.required { "required" } else { "optional" };
            out.push_str(&format!(
                "- {name} ({}, {requirement}): {}\n",
                prop.kind.type_label(),
                prop.description
            ));
        }
        out.push('\n');
    }

    out.push_str("## Actions\n\n");
    for action in catalog.actions() {
        out.push_str(&format!("### {}\n{}\n", action.name, action.description));
        if action.params.is_empty() {
            out.push_str("Params: none\n\n");
            continue;
        }
        out.push_str("Params:\n");
        for (name, param) in &action.params {
            let requirement = if param.required { "required" } else { "optional" };
            out.push_str(&format!(
                "- {name} ({}, {requirement}): {}\n",
                param.kind.type_label(),
                param.description
            ));
        }
        out.push('\n');
    }

    out.push_str(
        "## Output format\n\n\
         Emit exactly one JSON patch operation per line, nothing else: no prose,\n\
         no markdown fences, no trailing commentary. The two legal shapes are:\n\n\
         {\"op\":\"set\",\"path\":\"/root\",\"value\":\"<elementKey>\"}\n\
         {\"op\":\"set\",\"path\":\"/elements/<elementKey>\",\"value\":{\"key\":\"<elementKey>\",\"type\":\"<Component>\",\"props\":{...},\"children\":[\"<childKey>\", ...]}}\n\n\
         Rules:\n\
         - `value.key` must equal the `<elementKey>` in the path.\n\
         - Re-sending an element replaces it wholesale; there is no partial merge.\n\
         - `children` is only honored on components that accept children.\n\
         - A prop value of {\"$bind\":\"<dot.path>\"} is resolved against the data\n\
           context at render time (e.g. {\"$bind\":\"nodes\"} for table rows).\n\
         - Button-like props take an action ref: {\"name\":\"<action>\",\"params\":{...}}.\n\
         - Emit the root patch first, then elements; children may be referenced\n\
           before they are sent.\n\n",
    );

    out.push_str("## Worked example\n\n");
    out.push_str(WORKED_EXAMPLE);
    out.push('\n');

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::patch::PatchDecoder;
    use crate::ui::tree::TreeBuilder;
    use std::sync::Arc;

    #[test]
    fn compile_is_deterministic() {
        let catalog = Catalog::builtin();
        assert_eq!(compile(&catalog), compile(&catalog));
    }

    #[test]
    fn compile_lists_every_component_and_action() {
        let catalog = Catalog::builtin();
        let prompt = compile(&catalog);
        for component in catalog.components() {
            assert!(
                prompt.contains(&format!("### {}", component.name)),
                "missing component {}",
                component.name
            );
        }
        for action in catalog.actions() {
            assert!(
                prompt.contains(&format!("### {}", action.name)),
                "missing action {}",
                action.name
            );
        }
        assert!(prompt.contains("{\"op\":\"set\",\"path\":\"/root\""));
        assert!(prompt.contains(WORKED_EXAMPLE));
    }

    #[test]
    fn worked_example_round_trips_through_the_builder() {
        let mut decoder = PatchDecoder::new();
        let mut builder = TreeBuilder::new(Arc::new(Catalog::builtin()));

        for result in decoder.push_chunk(WORKED_EXAMPLE) {
            builder.apply(result.expect("example line should parse"));
        }
        if let Some(result) = decoder.finish() {
            builder.apply(result.expect("example tail should parse"));
        }
        builder.finish();

        assert_eq!(builder.tree().root.as_deref(), Some("dash"));
        assert!(builder.tree().dangling_keys().is_empty());
        assert!(builder.drain_warnings().is_empty());
    }

    #[test]
    fn prop_requirement_labels_match_the_specs() {
        let catalog = Catalog::builtin();
        let prompt = compile(&catalog);
        assert!(prompt.contains("- text (string, required): Heading text"));
        assert!(prompt.contains("- delta (string, optional)"));
    }
}
