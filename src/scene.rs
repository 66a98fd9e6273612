use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::error::SceneError;
use crate::lights::{Fog, Light, PlacedLight};
use crate::mesh::MeshData;

// ======================================
// === TRANSFORMS ===
// ======================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Where a loaded subtree lands. Position and scale replace the subtree
/// root's authored values; rotation is applied on top of the authored one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Vec3,
    pub scale: Vec3,
    pub rotation: Option<Quat>,
}

impl Placement {
    pub fn new(position: Vec3, uniform_scale: f32) -> Self {
        Self {
            position,
            scale: Vec3::splat(uniform_scale),
            rotation: None,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn apply(&self, transform: &mut Transform) {
        if let Some(rotation) = self.rotation {
            transform.rotation = (transform.rotation * rotation).normalize();
        }
        transform.position = self.position;
        transform.scale = self.scale;
    }
}

// ======================================
// === NODES ===
// ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root,
    Group,
    Mesh(Vec<Arc<MeshData>>),
    Light(Light),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SceneNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

// ======================================
// === SUBTREES ===
// ======================================

#[derive(Debug, Clone)]
pub struct SubtreeNode {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    parent: Option<usize>,
}

/// A detached, fully formed fragment as produced by a loader. Nodes refer
/// to each other by local index and a parent always precedes its children.
#[derive(Debug, Clone)]
pub struct Subtree {
    nodes: Vec<SubtreeNode>,
}

impl Subtree {
    pub const ROOT: usize = 0;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            nodes: vec![SubtreeNode {
                name: name.into(),
                transform: Transform::IDENTITY,
                kind: NodeKind::Group,
                parent: None,
            }],
        }
    }

    pub fn add_node(
        &mut self,
        parent: usize,
        name: impl Into<String>,
        transform: Transform,
        kind: NodeKind,
    ) -> Result<usize, SceneError> {
        if parent >= self.nodes.len() {
            return Err(SceneError::UnknownLocalNode(parent));
        }

        self.nodes.push(SubtreeNode {
            name: name.into(),
            transform,
            kind,
            parent: Some(parent),
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&SubtreeNode> {
        self.nodes.get(index)
    }

    pub fn root_mut(&mut self) -> &mut SubtreeNode {
        &mut self.nodes[Self::ROOT]
    }
}

/// Maps the local indices of an inserted subtree to their graph ids.
#[derive(Debug, Clone)]
pub struct SubtreeHandle {
    nodes: Vec<NodeId>,
}

impl SubtreeHandle {
    pub fn root(&self) -> NodeId {
        self.nodes[Subtree::ROOT]
    }

    pub fn resolve(&self, local: usize) -> Option<NodeId> {
        self.nodes.get(local).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MeshInstance {
    pub world: Mat4,
    pub mesh: Arc<MeshData>,
}

// ======================================
// === SCENE GRAPH ===
// ======================================

/// Arena-backed tree. Storage order is a valid parent-before-child order
/// because a node can only be attached to a parent that already exists.
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    fog: Option<Fog>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            nodes: vec![SceneNode {
                name: "scene".to_string(),
                transform: Transform::IDENTITY,
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
            fog: None,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(SceneNode::children).unwrap_or(&[])
    }

    pub fn fog(&self) -> Option<&Fog> {
        self.fog.as_ref()
    }

    pub fn set_fog(&mut self, fog: Option<Fog>) {
        self.fog = fog;
    }

    pub fn add_node(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        transform: Transform,
        kind: NodeKind,
    ) -> Result<NodeId, SceneError> {
        if parent.0 >= self.nodes.len() {
            return Err(SceneError::UnknownNode(parent));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(SceneNode {
            name: name.into(),
            transform,
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Attaches `subtree` under the scene root. Every node is allocated and
    /// linked before the subtree root joins the root's child list.
    pub fn insert_subtree(&mut self, subtree: Subtree, placement: &Placement) -> SubtreeHandle {
        let base = self.nodes.len();
        let root = self.root();
        let mut ids = Vec::with_capacity(subtree.nodes.len());

        for (local, mut node) in subtree.nodes.into_iter().enumerate() {
            let id = NodeId(base + local);
            let parent = match node.parent {
                Some(p) => NodeId(base + p),
                None => root,
            };

            if local == Subtree::ROOT {
                placement.apply(&mut node.transform);
            } else {
                self.nodes[parent.0].children.push(id);
            }

            self.nodes.push(SceneNode {
                name: node.name,
                transform: node.transform,
                kind: node.kind,
                parent: Some(parent),
                children: Vec::new(),
            });
            ids.push(id);
        }

        let handle = SubtreeHandle { nodes: ids };
        self.nodes[root.0].children.push(handle.root());
        handle
    }

    pub fn world_matrices(&self) -> Vec<Mat4> {
        let mut world: Vec<Mat4> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let local = node.transform.matrix();
            let matrix = match node.parent {
                Some(parent) => world[parent.0] * local,
                None => local,
            };
            world.push(matrix);
        }
        world
    }

    pub fn meshes(&self) -> Vec<MeshInstance> {
        let world = self.world_matrices();
        self.nodes
            .iter()
            .zip(world)
            .filter_map(|(node, world)| match &node.kind {
                NodeKind::Mesh(meshes) => Some(meshes.iter().map(move |mesh| MeshInstance {
                    world,
                    mesh: Arc::clone(mesh),
                })),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn lights(&self) -> Vec<PlacedLight> {
        let world = self.world_matrices();
        self.nodes
            .iter()
            .zip(world)
            .filter_map(|(node, world)| match &node.kind {
                NodeKind::Light(light) => Some(PlacedLight {
                    light: *light,
                    position: world.transform_point3(Vec3::ZERO),
                }),
                _ => None,
            })
            .collect()
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn creature() -> Subtree {
        let mut subtree = Subtree::new("creature");
        let body = subtree
            .add_node(
                Subtree::ROOT,
                "body",
                Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
                NodeKind::Group,
            )
            .unwrap();
        subtree
            .add_node(
                body,
                "head",
                Transform::from_translation(Vec3::new(0.0, 0.5, 0.0)),
                NodeKind::Group,
            )
            .unwrap();
        subtree
    }

    #[test]
    fn placement_touches_only_the_subtree_root() {
        let mut graph = SceneGraph::new();
        let handle = graph.insert_subtree(creature(), &Placement::new(Vec3::new(2.0, 0.4, 3.0), 1.5));

        let root = graph.node(handle.root()).unwrap();
        assert_eq!(root.transform.position, Vec3::new(2.0, 0.4, 3.0));
        assert_eq!(root.transform.scale, Vec3::splat(1.5));

        let body = graph.node(handle.resolve(1).unwrap()).unwrap();
        assert_eq!(body.transform, Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn inserted_subtree_is_linked_under_root() {
        let mut graph = SceneGraph::new();
        let handle = graph.insert_subtree(creature(), &Placement::new(Vec3::ZERO, 1.0));

        assert_eq!(graph.children(graph.root()), &[handle.root()]);
        let body = handle.resolve(1).unwrap();
        let head = handle.resolve(2).unwrap();
        assert_eq!(graph.children(handle.root()), &[body]);
        assert_eq!(graph.children(body), &[head]);
        assert_eq!(graph.node(head).unwrap().parent(), Some(body));
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn world_matrices_compose_through_the_placement() {
        let mut graph = SceneGraph::new();
        let handle = graph.insert_subtree(creature(), &Placement::new(Vec3::new(1.0, 0.0, 0.0), 2.0));
        let head = handle.resolve(2).unwrap();

        let world = graph.world_matrices();
        let head_pos = world[head.index()].transform_point3(Vec3::ZERO);
        assert_relative_eq!(head_pos.x, 1.0);
        assert_relative_eq!(head_pos.y, 3.0);
    }

    #[test]
    fn placement_rotation_composes_with_authored_rotation() {
        let mut subtree = Subtree::new("spun");
        subtree.root_mut().transform.rotation = Quat::from_rotation_y(0.3);

        let mut graph = SceneGraph::new();
        let placement = Placement::new(Vec3::ZERO, 1.0).with_rotation(Quat::from_rotation_y(1.2));
        let handle = graph.insert_subtree(subtree, &placement);

        let rotation = graph.node(handle.root()).unwrap().transform.rotation;
        let (axis, angle) = rotation.to_axis_angle();
        assert_relative_eq!(axis.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(angle, 1.5, epsilon = 1e-5);
    }

    #[test]
    fn add_node_rejects_unknown_parent() {
        let mut graph = SceneGraph::new();
        let missing = NodeId(42);
        assert!(matches!(
            graph.add_node(missing, "orphan", Transform::IDENTITY, NodeKind::Group),
            Err(SceneError::UnknownNode(id)) if id == missing
        ));

        let mut subtree = Subtree::new("s");
        assert!(subtree.add_node(9, "x", Transform::IDENTITY, NodeKind::Group).is_err());
    }
}
