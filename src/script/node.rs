use kurbo::{Point, Rect, Size};

use crate::script::knob::{KnobValue, UserKnob};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Identifier for a node owned by a [`crate::script::graph::Script`].
pub struct NodeId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
/// Closed set of node types the assembler emits. `Custom` covers host
/// effect classes and user-injected nodes.
pub enum NodeClass {
    Read,
    Write,
    Reformat,
    Retime,
    Merge,
    Dissolve,
    Dot,
    Viewer,
    Metadata,
    AddTimeCode,
    Precomp,
    NoOp,
    Root,
    Backdrop,
    Constant,
    /// Stack marker: labels the current stream.
    Set,
    /// Stack marker: recalls a labelled stream.
    Push,
    Custom(String),
}

impl NodeClass {
    /// Wire class name. `Merge` emits the two-input merge class and
    /// `Metadata`/`Backdrop` their host spellings.
    pub fn class_name(&self) -> &str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Reformat => "Reformat",
            Self::Retime => "Retime",
            Self::Merge => "Merge2",
            Self::Dissolve => "Dissolve",
            Self::Dot => "Dot",
            Self::Viewer => "Viewer",
            Self::Metadata => "ModifyMetaData",
            Self::AddTimeCode => "AddTimeCode",
            Self::Precomp => "Precomp",
            Self::NoOp => "NoOp",
            Self::Root => "Root",
            Self::Backdrop => "BackdropNode",
            Self::Constant => "Constant",
            Self::Set => "Set",
            Self::Push => "Push",
            Self::Custom(class) => class,
        }
    }

    /// Input count a node of this class has when the assembler does not say
    /// otherwise; the writer only emits an `inputs` knob on deviation.
    pub fn default_input_count(&self) -> usize {
        match self {
            Self::Read
            | Self::Constant
            | Self::Root
            | Self::Backdrop
            | Self::Precomp
            | Self::Set
            | Self::Push => 0,
            Self::Merge | Self::Dissolve => 2,
            _ => 1,
        }
    }

    /// Stack markers serialize as `Set`/`Push` lines and are skipped by
    /// layout except as branch demarcation.
    pub fn is_stack_marker(&self) -> bool {
        matches!(self, Self::Set | Self::Push)
    }

    /// On-canvas size for screen rendering.
    pub fn screen_size(&self) -> Size {
        match self {
            Self::Dot => Size::new(12.0, 12.0),
            Self::Backdrop => Size::ZERO, // computed from members
            _ => Size::new(80.0, 18.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Axis an alignment hint applies to.
pub enum AlignAxis {
    X,
    Y,
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// Pin one of a node's position components to another node, plus offset.
pub struct AlignHint {
    pub target: NodeId,
    pub axis: AlignAxis,
    pub offset: f64,
}

#[derive(Clone, Debug)]
/// One emitted node: class, unique name, knobs, wiring and canvas state.
pub struct Node {
    pub class: NodeClass,
    /// Unique within the script; assigned on insertion when empty.
    pub name: String,
    /// Knobs in emission order.
    pub knobs: Vec<(String, KnobValue)>,
    /// User knob declarations in emission order.
    pub user_knobs: Vec<UserKnob>,
    /// Ordered input slots; `None` keeps a slot open.
    pub inputs: Vec<Option<NodeId>>,
    /// Post-layout alignment, resolved after placement.
    pub align: Option<AlignHint>,
    pub size: Size,
    pub position: Point,
    /// Backdrop stacking; outer backdrops carry lower values.
    pub z_order: i32,
    /// On-canvas label text, when any.
    pub label: Option<String>,
}

impl Node {
    pub fn new(class: NodeClass) -> Self {
        let size = class.screen_size();
        Self {
            class,
            name: String::new(),
            knobs: Vec::new(),
            user_knobs: Vec::new(),
            inputs: Vec::new(),
            align: None,
            size,
            position: Point::ZERO,
            z_order: 0,
            label: None,
        }
    }

    /// Chainable knob setter for construction sites.
    pub fn knob(mut self, name: impl Into<String>, value: KnobValue) -> Self {
        self.set_knob(name, value);
        self
    }

    pub fn knob_value(&self, name: &str) -> Option<&KnobValue> {
        self.knobs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Replace a knob value, or append it when absent.
    pub fn set_knob(&mut self, name: impl Into<String>, value: KnobValue) {
        let name = name.into();
        if let Some(slot) = self.knobs.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.knobs.push((name, value));
        }
    }

    /// Set an input slot, growing the slot list as needed.
    pub fn set_input(&mut self, slot: usize, id: Option<NodeId>) {
        if self.inputs.len() <= slot {
            self.inputs.resize(slot + 1, None);
        }
        self.inputs[slot] = id;
    }

    /// Connected (non-empty) input count.
    pub fn connected_inputs(&self) -> usize {
        self.inputs.iter().flatten().count()
    }

    /// On-canvas rectangle at the current position.
    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    /// Canvas x of the node's horizontal centre.
    pub fn center_x(&self) -> f64 {
        self.position.x + self.size.width / 2.0
    }
}

#[cfg(test)]
#[path = "../../tests/unit/script/node.rs"]
mod tests;
