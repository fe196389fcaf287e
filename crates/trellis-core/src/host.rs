//! Contract for the external mutable tree the engine writes into.

use std::fmt;
use std::rc::Rc;

use crate::properties::PropValue;

pub type HostNodeId = usize;

/// Listener installed on a host node.
pub type Listener = Rc<dyn Fn(&HostEvent)>;

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// Event delivered to listeners by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    pub name: String,
    pub target: HostNodeId,
    /// Current `value` of the target, for input-like events.
    pub value: Option<String>,
}

impl HostEvent {
    pub fn new(name: impl Into<String>, target: HostNodeId) -> Self {
        Self {
            name: name.into(),
            target,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Imperative node operations triggered by boolean properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeOperation {
    Focus,
    Blur,
    ScrollIntoView,
    Click,
}

impl NodeOperation {
    pub fn from_property(name: &str) -> Option<Self> {
        match name {
            "focus" => Some(NodeOperation::Focus),
            "blur" => Some(NodeOperation::Blur),
            "scrollIntoView" => Some(NodeOperation::ScrollIntoView),
            "click" => Some(NodeOperation::Click),
            _ => None,
        }
    }
}

/// Host tree the engine reconciles against.
///
/// Structural operations are fallible; attribute, property and listener
/// writes on a missing node are ignored by implementations.
pub trait HostDocument {
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> HostNodeId;
    fn create_text(&mut self, text: &str) -> HostNodeId;

    /// Default mount point.
    fn root(&self) -> HostNodeId;
    fn contains(&self, node: HostNodeId) -> bool;
    fn parent(&self, node: HostNodeId) -> Option<HostNodeId>;
    fn children(&self, node: HostNodeId) -> Vec<HostNodeId>;
    /// Element tag, or an empty string for text nodes.
    fn tag_name(&self, node: HostNodeId) -> Option<String>;

    fn insert_before(
        &mut self,
        parent: HostNodeId,
        child: HostNodeId,
        anchor: Option<HostNodeId>,
    ) -> Result<(), HostError>;
    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError>;
    fn replace_child(
        &mut self,
        parent: HostNodeId,
        new_child: HostNodeId,
        old_child: HostNodeId,
    ) -> Result<(), HostError>;

    fn get_attribute(&self, node: HostNodeId, name: &str) -> Option<String>;
    fn set_attribute(&mut self, node: HostNodeId, name: &str, value: &str);
    fn set_attribute_ns(&mut self, node: HostNodeId, namespace: &str, name: &str, value: &str);
    fn remove_attribute(&mut self, node: HostNodeId, name: &str);

    fn get_property(&self, node: HostNodeId, name: &str) -> Option<PropValue>;
    fn set_property(&mut self, node: HostNodeId, name: &str, value: PropValue);
    fn set_style(&mut self, node: HostNodeId, name: &str, value: &str);

    fn add_event_listener(&mut self, node: HostNodeId, event: &str, listener: Listener);
    fn remove_event_listener(&mut self, node: HostNodeId, event: &str, listener: &Listener);

    fn invoke(&mut self, node: HostNodeId, operation: NodeOperation);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { node: HostNodeId },
    NotAChild { parent: HostNodeId, child: HostNodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { node } => write!(f, "host node {node} missing"),
            HostError::NotAChild { parent, child } => {
                write!(f, "host node {child} is not a child of {parent}")
            }
        }
    }
}

impl std::error::Error for HostError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Host(HostError),
    AlreadyMounted,
    NotMounted,
    MountPointMissing { node: HostNodeId },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Host(err) => write!(f, "host mutation failed: {err}"),
            RenderError::AlreadyMounted => f.write_str("renderer is already mounted"),
            RenderError::NotMounted => f.write_str("renderer has not been mounted"),
            RenderError::MountPointMissing { node } => {
                write!(f, "mount point {node} does not exist in the host document")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HostError> for RenderError {
    fn from(err: HostError) -> Self {
        RenderError::Host(err)
    }
}
