//! Script serialization.
//!
//! Renders a [`Script`] into the compositor's text format: the `Root` block
//! first, then every node block in emission order, with `Set`/`Push` stack
//! lines interleaved where the assembler recorded them. Rendering is pure
//! string building; no I/O happens until [`write_script`].

use std::fs;
use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::ShotgraphResult;
use crate::script::graph::Script;
use crate::script::knob::KnobValue;
use crate::script::node::{Node, NodeClass};

/// Render the whole script to wire text.
pub fn render_script(script: &Script) -> String {
    let mut out = String::new();
    if let Some(root) = script.root_node() {
        render_root(script.node(root), &mut out);
    }
    for (id, node) in script.nodes() {
        if Some(id) == script.root_node() {
            continue;
        }
        match node.class {
            NodeClass::Set => render_stack_set(node, &mut out),
            NodeClass::Push => render_stack_push(node, &mut out),
            NodeClass::Backdrop => render_backdrop(node, &mut out),
            _ => render_node(node, &mut out),
        }
    }
    out
}

fn render_root(node: &Node, out: &mut String) {
    out.push_str("Root {\n");
    for (name, value) in &node.knobs {
        render_knob_line(name, value, out);
    }
    render_user_knobs(node, out);
    out.push_str("}\n");
}

fn render_node(node: &Node, out: &mut String) {
    out.push_str(node.class.class_name());
    out.push_str(" {\n");
    let slots = node.inputs.len();
    if slots != node.class.default_input_count() {
        out.push_str(&format!(" inputs {slots}\n"));
    }
    for (name, value) in &node.knobs {
        render_knob_line(name, value, out);
    }
    render_user_knobs(node, out);
    out.push_str(&format!(" name {}\n", node.name));
    if let Some(label) = &node.label {
        out.push_str(&format!(" label \"{}\"\n", escape_quotes(label)));
    }
    render_position(node, out);
    out.push_str("}\n");
}

/// Backdrops order their geometry after position, matching host output.
fn render_backdrop(node: &Node, out: &mut String) {
    out.push_str(node.class.class_name());
    out.push_str(" {\n");
    out.push_str(&format!(" name {}\n", node.name));
    for (name, value) in &node.knobs {
        render_knob_line(name, value, out);
    }
    if let Some(label) = &node.label {
        out.push_str(&format!(" label \"{}\"\n", escape_quotes(label)));
    }
    render_position(node, out);
    out.push_str(&format!(" bdwidth {}\n", node.size.width.round() as i64));
    out.push_str(&format!(" bdheight {}\n", node.size.height.round() as i64));
    out.push_str(&format!(" z_order {}\n", node.z_order));
    out.push_str("}\n");
}

fn render_stack_set(node: &Node, out: &mut String) {
    if let Some(KnobValue::Raw(label)) = node.knob_value("label") {
        out.push_str(&format!("Set {label} 0\n"));
    }
}

fn render_stack_push(node: &Node, out: &mut String) {
    if let Some(KnobValue::Raw(label)) = node.knob_value("label") {
        out.push_str(&format!("Push {label}\n"));
    }
}

fn render_knob_line(name: &str, value: &KnobValue, out: &mut String) {
    out.push_str(&format!(" {name} {}\n", value.render()));
}

/// Declarations in order; integer knobs carry their value as a separate
/// knob line directly after the declaration.
fn render_user_knobs(node: &Node, out: &mut String) {
    for knob in &node.user_knobs {
        out.push_str(&format!(" {}\n", knob.render_declaration()));
        if let Some(line) = knob.render_value_line() {
            out.push_str(&format!(" {line}\n"));
        }
    }
}

fn render_position(node: &Node, out: &mut String) {
    out.push_str(&format!(" xpos {}\n", node.position.x.round() as i64));
    out.push_str(&format!(" ypos {}\n", node.position.y.round() as i64));
}

fn escape_quotes(text: &str) -> String {
    text.replace('"', "\\\"")
}

/// Create the missing ancestors of `path`, if any.
pub fn ensure_parent_dir(path: &Path) -> ShotgraphResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating script directory {}", parent.display()))?;
    }
    Ok(())
}

/// Render and write the script, creating parent directories first.
pub fn write_script(script: &Script, path: &Path) -> ShotgraphResult<()> {
    ensure_parent_dir(path)?;
    let text = render_script(script);
    fs::write(path, text)
        .with_context(|| format!("writing script {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/script/writer.rs"]
mod tests;
