//! In-memory script graph.
//!
//! A [`Script`] owns every node destined for the exported document plus a
//! tree of layout contexts recording which nodes belong to which logical
//! grouping (sequence, view, track, clip, ...). The assembler appends nodes
//! in emission order; the writer serializes that order verbatim, so graph
//! construction order is the wire order.

use std::collections::BTreeMap;
use std::path::Path;

use crate::foundation::error::ShotgraphResult;
use crate::script::node::{Node, NodeClass, NodeId};
use crate::script::writer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Identifier for a layout context within a [`Script`].
pub struct ContextId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// What a layout context groups. Drives per-kind placement rules and
/// backdrop labelling.
pub enum LayoutContextKind {
    Sequence,
    View,
    Track,
    Clip,
    Write,
    Merge,
    EffectsTrack,
}

#[derive(Clone, Debug, Default)]
/// Auxiliary facts layout needs about a context.
pub struct ContextData {
    /// Track guid for `Track`/`EffectsTrack` contexts.
    pub track_guid: Option<String>,
    /// For `Merge` contexts, the node whose x the merge pins to.
    pub merge_input_b: Option<NodeId>,
    /// Track contexts that never join the main stream.
    pub disconnected: bool,
}

#[derive(Clone, Debug)]
/// One grouping in the layout tree.
pub struct LayoutContext {
    pub kind: LayoutContextKind,
    pub label: String,
    /// Nodes added directly to this context, in emission order.
    pub nodes: Vec<NodeId>,
    pub children: Vec<ContextId>,
    pub data: ContextData,
}

#[derive(Clone, Debug)]
/// Ordered node list plus the layout context tree built alongside it.
pub struct Script {
    nodes: Vec<Node>,
    contexts: Vec<LayoutContext>,
    context_stack: Vec<ContextId>,
    name_counters: BTreeMap<String, u32>,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    pub fn new() -> Self {
        let root = LayoutContext {
            kind: LayoutContextKind::Sequence,
            label: String::new(),
            nodes: Vec::new(),
            children: Vec::new(),
            data: ContextData::default(),
        };
        Self {
            nodes: Vec::new(),
            contexts: vec![root],
            context_stack: vec![ContextId(0)],
            name_counters: BTreeMap::new(),
        }
    }

    /// Append a node, assign it a unique name and record it in the current
    /// layout context. An empty name takes the next `Class`+counter name; a
    /// caller-supplied name already in use gets a counter suffix.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        if node.inputs.is_empty() {
            let slots = node.class.default_input_count();
            node.inputs = vec![None; slots];
        }
        if node.name.is_empty() {
            node.name = self.next_name(node.class.class_name());
        } else if self.find_node_by_name(&node.name).is_some() {
            let base = node.name.clone();
            node.name = self.next_name(&base);
        }
        let id = NodeId(self.nodes.len() as u32);
        let stack_marker = node.class.is_stack_marker();
        self.nodes.push(node);
        if !stack_marker {
            let ctx = self.current_context();
            self.contexts[ctx.0 as usize].nodes.push(id);
        }
        id
    }

    fn next_name(&mut self, stem: &str) -> String {
        loop {
            let counter = self.name_counters.entry(stem.to_owned()).or_insert(0);
            *counter += 1;
            let candidate = format!("{stem}{counter}");
            if self.find_node_by_name(&candidate).is_none() {
                return candidate;
            }
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(|i| NodeId(i as u32))
    }

    /// Nodes in emission order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut Node)> {
        self.nodes
            .iter_mut()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Open a child context under the current one and make it current.
    pub fn push_layout_context(
        &mut self,
        kind: LayoutContextKind,
        label: impl Into<String>,
        data: ContextData,
    ) -> ContextId {
        let id = ContextId(self.contexts.len() as u32);
        self.contexts.push(LayoutContext {
            kind,
            label: label.into(),
            nodes: Vec::new(),
            children: Vec::new(),
            data,
        });
        let parent = self.current_context();
        self.contexts[parent.0 as usize].children.push(id);
        self.context_stack.push(id);
        id
    }

    /// Close the current context. The root context stays open.
    pub fn pop_layout_context(&mut self) {
        if self.context_stack.len() > 1 {
            self.context_stack.pop();
        }
    }

    pub fn current_context(&self) -> ContextId {
        *self
            .context_stack
            .last()
            .unwrap_or(&ContextId(0))
    }

    pub fn root_context(&self) -> ContextId {
        ContextId(0)
    }

    pub fn context(&self, id: ContextId) -> &LayoutContext {
        &self.contexts[id.0 as usize]
    }

    pub fn context_mut(&mut self, id: ContextId) -> &mut LayoutContext {
        &mut self.contexts[id.0 as usize]
    }

    pub fn contexts(&self) -> impl Iterator<Item = (ContextId, &LayoutContext)> {
        self.contexts
            .iter()
            .enumerate()
            .map(|(i, c)| (ContextId(i as u32), c))
    }

    /// Every node reachable from `id`, including nested contexts.
    pub fn context_nodes_recursive(&self, id: ContextId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(ctx) = stack.pop() {
            let ctx = &self.contexts[ctx.0 as usize];
            out.extend(ctx.nodes.iter().copied());
            stack.extend(ctx.children.iter().copied());
        }
        out
    }

    /// The root node, if one was added.
    pub fn root_node(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.class == NodeClass::Root)
            .map(|i| NodeId(i as u32))
    }

    /// Serialize to the wire format and write to `path`.
    pub fn write_to_disk(&self, path: &Path) -> ShotgraphResult<()> {
        writer::write_script(self, path)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/script/graph.rs"]
mod tests;
