//! Deterministic placement of an assembled script.
//!
//! The engine walks the layout-context tree the assembler recorded and
//! assigns every node a canvas position. Columns stack vertically, sibling
//! contexts pack left to right, and each contained context gets a backdrop
//! sized to its contents. Positions fall out of graph order alone, so the
//! same timeline always serializes to the same script.

use crate::{
    foundation::core::{Point, Rect, Size},
    script::graph::{ContextId, LayoutContextKind, Script},
    script::knob::KnobValue,
    script::node::{AlignAxis, AlignHint, Node, NodeClass, NodeId},
};

/// Standard node width; columns centre on half of it.
const NODE_WIDTH: f64 = 80.0;

/// Tile colours for the generated backdrops.
const TRACK_TILE: &str = "0x8c0d0dff";
const CLIP_TILE: &str = "0x9c9c9cff";

/// Spacing constants the placement runs on.
#[derive(Clone, Copy, Debug)]
pub struct LayoutMetrics {
    /// Vertical distance between stacked nodes.
    pub vertical_gap: f64,
    /// Horizontal distance between sibling columns and contexts.
    pub column_gutter: f64,
    /// Horizontal offset of each write side branch from the previous one.
    pub branch_offset: f64,
    /// Backdrop padding as `(left, top, right, bottom)`.
    pub backdrop_margins: (f64, f64, f64, f64),
    /// Notional font height; drives the room left for backdrop labels.
    pub label_font: f64,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            vertical_gap: 32.0,
            column_gutter: 80.0,
            branch_offset: 100.0,
            backdrop_margins: (60.0, 110.0, 60.0, 60.0),
            label_font: 42.0,
        }
    }
}

/// Position every node, create backdrops, and straighten dot arrows.
pub fn layout_script(script: &mut Script) {
    let layouter = Layouter {
        metrics: LayoutMetrics::default(),
    };
    let root = script.root_context();
    layouter.layout_sequence(script, root, Point::ORIGIN, 0);
    layouter.align_dots(script);
}

struct Layouter {
    metrics: LayoutMetrics,
}

impl Layouter {
    /// Top-level layout: content contexts pack horizontally, then the tail
    /// column and the write fan-out stack underneath, centred on the last
    /// content context.
    fn layout_sequence(
        &self,
        script: &mut Script,
        ctx: ContextId,
        origin: Point,
        depth: i32,
    ) -> Rect {
        let children = script.context(ctx).children.clone();
        let own = script.context(ctx).nodes.clone();

        let mut cursor = origin;
        let mut body: Option<Rect> = None;
        let mut column_x = origin.x + NODE_WIDTH / 2.0;
        let mut write_ctx = None;
        for child in children {
            if script.context(child).kind == LayoutContextKind::Write {
                write_ctx = Some(child);
                continue;
            }
            let rect = self.layout_context(script, child, cursor, depth);
            cursor.x = rect.x1 + self.metrics.column_gutter;
            column_x = rect.center().x;
            body = union(body, rect);
        }

        // Tail nodes emitted before the fan-out sit above it, the viewer
        // and free-standing nodes below.
        let boundary = write_ctx.and_then(|c| script.context(c).nodes.iter().min().copied());
        let column: Vec<NodeId> = own
            .into_iter()
            .filter(|&id| {
                !matches!(
                    script.node(id).class,
                    NodeClass::Root | NodeClass::Backdrop
                )
            })
            .collect();
        let (pre, post): (Vec<NodeId>, Vec<NodeId>) = column
            .into_iter()
            .partition(|&id| boundary.is_none_or(|b| id < b));

        let mut y = body.map_or(origin.y, |r| r.y1 + self.metrics.vertical_gap);
        if let Some(rect) = self.place_column(script, &pre, column_x, y) {
            y = rect.y1 + self.metrics.vertical_gap;
            body = union(body, rect);
        }
        if let Some(write) = write_ctx {
            let rect = self.layout_write(script, write, Point::new(column_x, y), depth);
            y = rect.y1 + self.metrics.vertical_gap;
            body = union(body, rect);
        }
        if let Some(rect) = self.place_column(script, &post, column_x, y) {
            body = union(body, rect);
        }

        body.unwrap_or_else(|| Rect::from_origin_size(origin, Size::ZERO))
    }

    fn layout_context(
        &self,
        script: &mut Script,
        ctx: ContextId,
        origin: Point,
        depth: i32,
    ) -> Rect {
        match script.context(ctx).kind {
            LayoutContextKind::Sequence => self.layout_sequence(script, ctx, origin, depth),
            LayoutContextKind::View => self.layout_view(script, ctx, origin, depth),
            LayoutContextKind::Track => self.layout_track(script, ctx, origin, depth),
            LayoutContextKind::Clip => self.layout_clip(script, ctx, origin, depth),
            LayoutContextKind::Write => self.layout_write(
                script,
                ctx,
                Point::new(origin.x + NODE_WIDTH / 2.0, origin.y),
                depth,
            ),
            LayoutContextKind::Merge => self.layout_merge(script, ctx, origin),
            LayoutContextKind::EffectsTrack => {
                let center = self
                    .effects_input_center(script, ctx)
                    .unwrap_or(origin.x + NODE_WIDTH / 2.0);
                self.layout_effects(script, ctx, center, origin.y, depth)
            }
        }
    }

    /// Tracks flow left to right, top track index first. Merges pin to
    /// their B input. Disconnected tracks and, on a disconnected view,
    /// pure effect tracks stack vertically under the master track instead.
    fn layout_view(&self, script: &mut Script, ctx: ContextId, origin: Point, depth: i32) -> Rect {
        let children = script.context(ctx).children.clone();
        let disconnected = script.context(ctx).data.disconnected;

        let mut cursor = origin;
        let mut body: Option<Rect> = None;
        let mut last_track: Option<Rect> = None;
        let mut flow_bottom = origin.y;
        let mut deferred: Vec<ContextId> = Vec::new();
        for child in children {
            let rect = match script.context(child).kind {
                LayoutContextKind::Track => {
                    if script.context(child).data.disconnected {
                        deferred.push(child);
                        continue;
                    }
                    let rect = self.layout_track(script, child, cursor, depth);
                    cursor.x = rect.x1 + self.metrics.column_gutter;
                    last_track = Some(rect);
                    rect
                }
                LayoutContextKind::Merge => {
                    self.layout_merge(script, child, Point::new(cursor.x, flow_bottom))
                }
                LayoutContextKind::EffectsTrack => {
                    if disconnected {
                        deferred.push(child);
                        continue;
                    }
                    let center = self
                        .effects_input_center(script, child)
                        .unwrap_or(origin.x + NODE_WIDTH / 2.0);
                    let y = flow_bottom + self.metrics.vertical_gap;
                    self.layout_effects(script, child, center, y, depth)
                }
                _ => self.layout_context(script, child, cursor, depth),
            };
            flow_bottom = flow_bottom.max(rect.y1);
            body = union(body, rect);
        }

        // Everything that never joins the main stream hangs below it.
        let anchor_x = last_track.map_or(origin.x, |r| r.x0);
        let anchor_center = last_track.map_or(origin.x + NODE_WIDTH / 2.0, |r| r.center().x);
        let mut y = flow_bottom + self.metrics.vertical_gap;
        for child in deferred {
            let rect = match script.context(child).kind {
                LayoutContextKind::EffectsTrack => {
                    self.layout_effects(script, child, anchor_center, y, depth)
                }
                _ => self.layout_track(script, child, Point::new(anchor_x, y), depth),
            };
            y = rect.y1 + self.metrics.vertical_gap;
            body = union(body, rect);
        }
        body.unwrap_or_else(|| Rect::from_origin_size(origin, Size::ZERO))
    }

    /// Clip contexts flow left to right; the track's own joins stack in a
    /// column centred under the last clip's last node.
    fn layout_track(&self, script: &mut Script, ctx: ContextId, origin: Point, depth: i32) -> Rect {
        let children = script.context(ctx).children.clone();
        let own = script.context(ctx).nodes.clone();
        let label = script.context(ctx).label.clone();

        let (left, top, ..) = self.metrics.backdrop_margins;
        let mut cursor = Point::new(origin.x + left, origin.y + top);
        let mut body: Option<Rect> = None;
        let mut tail_node: Option<NodeId> = None;
        for child in children {
            let rect = self.layout_context(script, child, cursor, depth + 1);
            cursor.x = rect.x1 + self.metrics.column_gutter;
            tail_node = script.context(child).nodes.last().copied().or(tail_node);
            body = union(body, rect);
        }

        let center = tail_node.map_or(cursor.x + NODE_WIDTH / 2.0, |id| script.node(id).center_x());
        let y = body.map_or(cursor.y, |r| r.y1 + self.metrics.vertical_gap);
        if let Some(rect) = self.place_column(script, &own, center, y) {
            body = union(body, rect);
        }

        let inner =
            body.unwrap_or_else(|| Rect::from_origin_size(cursor, Size::ZERO));
        self.add_backdrop(script, &label, inner, depth, TRACK_TILE)
    }

    /// Two columns: gap fillers on the left, the clip body on the right.
    fn layout_clip(&self, script: &mut Script, ctx: ContextId, origin: Point, depth: i32) -> Rect {
        let nodes = script.context(ctx).nodes.clone();
        let label = script.context(ctx).label.clone();
        let (left, top, ..) = self.metrics.backdrop_margins;
        let inner_origin = Point::new(origin.x + left, origin.y + top);

        let (fillers, chain): (Vec<NodeId>, Vec<NodeId>) = nodes
            .into_iter()
            .partition(|&id| script.node(id).class == NodeClass::Constant);

        let mut body: Option<Rect> = None;
        let mut chain_center = inner_origin.x + NODE_WIDTH / 2.0;
        if !fillers.is_empty() {
            let filler_center = inner_origin.x + NODE_WIDTH / 2.0;
            body = self.place_column(script, &fillers, filler_center, inner_origin.y);
            chain_center += NODE_WIDTH + self.metrics.column_gutter;
        }
        if let Some(rect) = self.place_column(script, &chain, chain_center, inner_origin.y) {
            body = union(body, rect);
        }

        let inner =
            body.unwrap_or_else(|| Rect::from_origin_size(inner_origin, Size::ZERO));
        self.add_backdrop(script, &label, inner, depth, CLIP_TILE)
    }

    /// Merge column pinned to the x of the B input, below the flow.
    fn layout_merge(&self, script: &mut Script, ctx: ContextId, origin: Point) -> Rect {
        let nodes = script.context(ctx).nodes.clone();
        let b_input = script.context(ctx).data.merge_input_b;
        let center = b_input.map_or(origin.x + NODE_WIDTH / 2.0, |id| script.node(id).center_x());
        let rect = self
            .place_column(script, &nodes, center, origin.y + self.metrics.vertical_gap)
            .unwrap_or_else(|| Rect::from_origin_size(origin, Size::ZERO));
        if let Some(target) = b_input {
            for id in nodes {
                script.node_mut(id).align = Some(AlignHint {
                    target,
                    axis: AlignAxis::X,
                    offset: 0.0,
                });
            }
        }
        rect
    }

    /// A pure effects column; every node rides the x of its input.
    fn layout_effects(
        &self,
        script: &mut Script,
        ctx: ContextId,
        center_x: f64,
        y: f64,
        depth: i32,
    ) -> Rect {
        let nodes = script.context(ctx).nodes.clone();
        let label = script.context(ctx).label.clone();
        let rect = self.place_column(script, &nodes, center_x, y + self.metrics.backdrop_margins.1);
        for &id in &nodes {
            if let Some(target) = script.node(id).inputs.first().copied().flatten() {
                script.node_mut(id).align = Some(AlignHint {
                    target,
                    axis: AlignAxis::X,
                    offset: 0.0,
                });
            }
        }
        let inner = rect.unwrap_or_else(|| {
            Rect::from_origin_size(Point::new(center_x - NODE_WIDTH / 2.0, y), Size::ZERO)
        });
        self.add_backdrop(script, &label, inner, depth, CLIP_TILE)
    }

    /// The write fan-out. The main branch runs straight down; each side
    /// branch shifts right of the previous one and hangs off a dot row.
    fn layout_write(&self, script: &mut Script, ctx: ContextId, origin: Point, depth: i32) -> Rect {
        let nodes = script.context(ctx).nodes.clone();
        let label = script.context(ctx).label.clone();

        // Rebuild the branch runs: a node opens a new run when it is not
        // fed by the node emitted right before it.
        let mut branches: Vec<Vec<NodeId>> = Vec::new();
        let mut prev: Option<NodeId> = None;
        for id in nodes {
            let input = script.node(id).inputs.first().copied().flatten();
            let continues = input.is_some() && input == prev;
            if continues && let Some(last) = branches.last_mut() {
                last.push(id);
            } else {
                branches.push(vec![id]);
            }
            prev = Some(id);
        }

        let dot_height = NodeClass::Dot.screen_size().height;
        let branch_top = origin.y + dot_height + self.metrics.vertical_gap;
        let mut body: Option<Rect> = None;
        let mut side = 0usize;
        for branch in &branches {
            let head_is_dot = script.node(branch[0]).class == NodeClass::Dot;
            let (center, run) = if head_is_dot {
                side += 1;
                let center = origin.x + side as f64 * self.metrics.branch_offset;
                let dot = script.node_mut(branch[0]);
                dot.position = Point::new(center - dot.size.width / 2.0, origin.y);
                (center, &branch[1..])
            } else {
                (origin.x, &branch[..])
            };
            if let Some(rect) = self.place_column(script, run, center, branch_top) {
                body = union(body, rect);
            }
        }

        let inner = body.unwrap_or_else(|| {
            Rect::from_origin_size(Point::new(origin.x, origin.y), Size::ZERO)
        });
        self.add_backdrop(script, &label, inner, depth, TRACK_TILE)
    }

    /// Stack nodes vertically, centred on `center_x`. Dots get positions
    /// but stay out of the returned rect.
    fn place_column(
        &self,
        script: &mut Script,
        nodes: &[NodeId],
        center_x: f64,
        mut y: f64,
    ) -> Option<Rect> {
        let mut body: Option<Rect> = None;
        for &id in nodes {
            let node = script.node_mut(id);
            node.position = Point::new(center_x - node.size.width / 2.0, y);
            y += node.size.height + self.metrics.vertical_gap;
            if node.class != NodeClass::Dot {
                body = union(body, node.rect());
            }
        }
        body
    }

    /// Wrap `inner` in a backdrop node and return the padded extent.
    fn add_backdrop(
        &self,
        script: &mut Script,
        label: &str,
        inner: Rect,
        depth: i32,
        tile: &str,
    ) -> Rect {
        let (left, top, right, bottom) = self.metrics.backdrop_margins;
        let width = inner.width() + left + right;
        // Room for wrapped label lines beyond the first.
        let glyph = self.metrics.label_font * 0.6;
        let lines = if label.is_empty() {
            1.0
        } else {
            (label.len() as f64 * glyph / width.max(glyph)).ceil().max(1.0)
        };
        let extra = (lines - 1.0) * self.metrics.label_font;
        let outer = Rect::new(
            inner.x0 - left,
            inner.y0 - top - extra,
            inner.x1 + right,
            inner.y1 + bottom,
        );

        let mut node = Node::new(NodeClass::Backdrop);
        node.position = Point::new(outer.x0, outer.y0);
        node.size = outer.size();
        node.z_order = depth;
        node.label = (!label.is_empty()).then(|| label.to_owned());
        node.set_knob(
            "note_font_size",
            KnobValue::Int(self.metrics.label_font as i64),
        );
        node.set_knob("tile_color", KnobValue::Raw(tile.to_owned()));
        script.add_node(node);
        outer
    }

    /// Canvas x the first node of an effects context is fed from.
    fn effects_input_center(&self, script: &Script, ctx: ContextId) -> Option<f64> {
        let first = script.context(ctx).nodes.first().copied()?;
        let input = script.node(first).inputs.first().copied().flatten()?;
        Some(script.node(input).center_x())
    }

    /// Dots ride the vertical centre of their input so arrows stay
    /// straight; runs after all placement.
    fn align_dots(&self, script: &mut Script) {
        for idx in 0..script.len() {
            let id = NodeId(idx as u32);
            if script.node(id).class != NodeClass::Dot {
                continue;
            }
            let Some(target) = script.node(id).inputs.first().copied().flatten() else {
                continue;
            };
            let center = {
                let input = script.node(target);
                input.position.y + input.size.height / 2.0
            };
            let dot = script.node_mut(id);
            dot.position.y = center - dot.size.height / 2.0;
            dot.align = Some(AlignHint {
                target,
                axis: AlignAxis::Y,
                offset: 0.0,
            });
        }
    }
}

fn union(acc: Option<Rect>, rect: Rect) -> Option<Rect> {
    Some(match acc {
        Some(existing) => existing.union(rect),
        None => rect,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/layout/engine.rs"]
mod tests;
