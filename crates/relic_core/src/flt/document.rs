//! Parse-wide state for one OpenFlight file.
//!
//! The record stream expresses hierarchy with push/pop control records
//! around a "current primary" node. [`Document`] keeps that structure
//! plus the version, the unit scale, and the pool set; everything in it
//! is file-scoped and thrown away when the parse finishes.

use super::pools::PoolSet;
use super::record::FramingError;
use crate::scene::NodeId;
use log::warn;

// Format version thresholds. Files through revision 13 wrote the small
// integer directly; 14.2 onward write major*100 + minor*10.
pub const VERSION_LEGACY_COLOR: u32 = 13;
pub const VERSION_LEGACY_UNITS: u32 = 1300;
pub const VERSION_14: u32 = 1400;
pub const VERSION_14_2: u32 = 1420;
pub const VERSION_15_1: u32 = 1510;
pub const VERSION_15_8: u32 = 1580;
pub const VERSION_16_0: u32 = 1600;
pub const VERSION_16_1: u32 = 1610;

/// Exporter release whose external references carry a meaningless
/// pool override mask.
pub const VERSION_BROKEN_OVERRIDE_MASK: u32 = 1541;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocState {
    Open,
    /// The outermost level was popped; remaining records are ignored.
    Done,
}

pub struct Document<'p> {
    pub version: u32,
    /// Multiplier from file coordinates to emitted coordinates.
    pub unit_scale: f64,
    pub pools: PoolSet<'p>,
    root: NodeId,
    state: DocState,
    current_primary: Option<NodeId>,
    level_stack: Vec<NodeId>,
    extension_stack: Vec<NodeId>,
    subface_depth: u32,
}

impl<'p> Document<'p> {
    pub fn new(root: NodeId, pools: PoolSet<'p>) -> Self {
        Self {
            version: 0,
            unit_scale: 1.0,
            pools,
            root,
            state: DocState::Open,
            current_primary: None,
            level_stack: Vec::new(),
            extension_stack: Vec::new(),
            subface_depth: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_done(&self) -> bool {
        self.state == DocState::Done
    }

    /// Node new records attach to: the innermost open extension scope,
    /// else the innermost open level, else the file root.
    pub fn attach_parent(&self) -> NodeId {
        self.extension_stack
            .last()
            .or(self.level_stack.last())
            .copied()
            .unwrap_or(self.root)
    }

    /// Most recent primary record. Ancillary records (comments, long
    /// ids, matrices) apply to it.
    pub fn current_primary(&self) -> Option<NodeId> {
        self.current_primary
    }

    pub fn set_current_primary(&mut self, node: NodeId) {
        self.current_primary = Some(node);
    }

    /// Open a level under the current primary. Children that follow
    /// attach beneath it until the matching pop.
    pub fn push_level(&mut self) {
        let parent = self.current_primary.unwrap_or_else(|| self.attach_parent());
        self.level_stack.push(parent);
    }

    /// Close the innermost level. Popping the outermost level marks the
    /// document done; popping with nothing open is stream corruption.
    pub fn pop_level(&mut self) -> Result<(), FramingError> {
        match self.level_stack.pop() {
            Some(parent) => {
                self.current_primary = Some(parent);
                if self.level_stack.is_empty() {
                    self.state = DocState::Done;
                }
                Ok(())
            }
            None => Err(FramingError::UnbalancedPop),
        }
    }

    pub fn push_subface(&mut self) {
        self.subface_depth += 1;
    }

    pub fn pop_subface(&mut self) {
        if self.subface_depth == 0 {
            warn!("subface pop with no open subface level");
            return;
        }
        self.subface_depth -= 1;
    }

    /// Nesting depth of coplanar subfaces under the current face.
    pub fn subface_depth(&self) -> u32 {
        self.subface_depth
    }

    pub fn push_extension(&mut self) {
        let parent = self.current_primary.unwrap_or_else(|| self.attach_parent());
        self.extension_stack.push(parent);
    }

    pub fn pop_extension(&mut self) {
        match self.extension_stack.pop() {
            Some(parent) => self.current_primary = Some(parent),
            None => warn!("extension pop with no open extension scope"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{SceneGraph, SceneSink};

    fn doc_with_nodes(count: usize) -> (Document<'static>, Vec<NodeId>) {
        let mut scene = SceneGraph::new("db");
        let nodes = (0..count)
            .map(|i| scene.create_container(&format!("n{i}")))
            .collect();
        (Document::new(scene.root(), PoolSet::default()), nodes)
    }

    #[test]
    fn test_outermost_pop_marks_done() {
        let (mut doc, nodes) = doc_with_nodes(2);

        doc.set_current_primary(nodes[0]);
        doc.push_level();
        assert_eq!(doc.attach_parent(), nodes[0]);

        doc.set_current_primary(nodes[1]);
        doc.push_level();
        assert_eq!(doc.attach_parent(), nodes[1]);

        doc.pop_level().unwrap();
        assert!(!doc.is_done());
        assert_eq!(doc.attach_parent(), nodes[0]);

        doc.pop_level().unwrap();
        assert!(doc.is_done());
    }

    #[test]
    fn test_unmatched_pop_is_corruption_not_underflow() {
        let (mut doc, _) = doc_with_nodes(0);
        assert!(matches!(
            doc.pop_level(),
            Err(FramingError::UnbalancedPop)
        ));
    }

    #[test]
    fn test_pop_restores_sibling_attachment() {
        // header, push, group, push, (children), pop: the next primary
        // must land beside the group, not inside it.
        let (mut doc, nodes) = doc_with_nodes(2);
        doc.set_current_primary(nodes[0]);
        doc.push_level();
        doc.set_current_primary(nodes[1]);
        doc.push_level();
        doc.pop_level().unwrap();
        assert_eq!(doc.attach_parent(), nodes[0]);
    }

    #[test]
    fn test_subface_depth_is_independent_of_levels() {
        let (mut doc, nodes) = doc_with_nodes(1);
        doc.set_current_primary(nodes[0]);
        doc.push_level();

        doc.push_subface();
        doc.push_subface();
        assert_eq!(doc.subface_depth(), 2);
        doc.pop_subface();
        assert_eq!(doc.subface_depth(), 1);
        // Levels untouched.
        assert!(!doc.is_done());
        doc.pop_subface();
        doc.pop_subface(); // warns, does not underflow
        assert_eq!(doc.subface_depth(), 0);
    }

    #[test]
    fn test_extension_scope_overrides_attach_parent() {
        let (mut doc, nodes) = doc_with_nodes(2);
        doc.set_current_primary(nodes[0]);
        doc.push_level();

        doc.set_current_primary(nodes[1]);
        doc.push_extension();
        assert_eq!(doc.attach_parent(), nodes[1]);

        doc.pop_extension();
        assert_eq!(doc.attach_parent(), nodes[0]);
        assert!(!doc.is_done());
    }
}
