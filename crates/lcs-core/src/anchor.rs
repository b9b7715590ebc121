//! 几何锚点
//!
//! 坐标系可以绑定到几何实体（面、边、顶点、对象）而不是自由点。
//! 锚点的数值位置由外部 [`GeometryProvider`] 解析，引擎不缓存解析结果。

use crate::math::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 几何实体ID（由几何提供者分配，对引擎不透明）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 定位规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorRule {
    /// 面中心
    FaceCenter,
    /// 边中点
    EdgeMidpoint,
    /// 顶点
    OnVertex,
    /// 对象原点
    ObjectOrigin,
}

/// 锚点：几何实体引用
///
/// 实体类型决定定位规则，见 [`Anchor::rule`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anchor {
    Face(EntityId),
    Edge(EntityId),
    Vertex(EntityId),
    Object(EntityId),
}

impl Anchor {
    pub fn id(&self) -> EntityId {
        match self {
            Anchor::Face(id) | Anchor::Edge(id) | Anchor::Vertex(id) | Anchor::Object(id) => *id,
        }
    }

    pub fn rule(&self) -> AnchorRule {
        match self {
            Anchor::Face(_) => AnchorRule::FaceCenter,
            Anchor::Edge(_) => AnchorRule::EdgeMidpoint,
            Anchor::Vertex(_) => AnchorRule::OnVertex,
            Anchor::Object(_) => AnchorRule::ObjectOrigin,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Anchor::Face(_) => "Face",
            Anchor::Edge(_) => "Edge",
            Anchor::Vertex(_) => "Vertex",
            Anchor::Object(_) => "Object",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.id())
    }
}

/// 几何提供者
///
/// 所有坐标都在全局坐标系中，使用提供者自己的长度单位。
/// 返回 `None` 表示实体当前无法解析。
pub trait GeometryProvider: Send + Sync {
    /// 按锚点规则求位置
    fn locate(&self, anchor: Anchor) -> Option<Point3>;

    /// 面的外法向
    fn face_normal(&self, face: EntityId) -> Option<Vector3>;

    /// 实体所属的对象
    fn owning_object(&self, anchor: Anchor) -> Option<EntityId>;

    /// 实体是否位于指定面上；面未知时返回 `None`
    fn lies_on_face(&self, anchor: Anchor, face: EntityId) -> Option<bool>;
}

/// 空几何提供者：任何锚点都无法解析
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeometry;

impl GeometryProvider for NoGeometry {
    fn locate(&self, _anchor: Anchor) -> Option<Point3> {
        None
    }

    fn face_normal(&self, _face: EntityId) -> Option<Vector3> {
        None
    }

    fn owning_object(&self, _anchor: Anchor) -> Option<EntityId> {
        None
    }

    fn lies_on_face(&self, _anchor: Anchor, _face: EntityId) -> Option<bool> {
        None
    }
}

#[derive(Debug, Clone)]
struct FaceRecord {
    object: EntityId,
    center: Point3,
    normal: Vector3,
}

#[derive(Debug, Clone)]
struct EdgeRecord {
    object: EntityId,
    start: Point3,
    end: Point3,
    faces: Vec<EntityId>,
}

#[derive(Debug, Clone)]
struct VertexRecord {
    object: EntityId,
    position: Point3,
    faces: Vec<EntityId>,
}

/// 内存几何表
///
/// 适用于宿主程序缓存的几何快照和测试。
#[derive(Debug, Clone, Default)]
pub struct GeometryTable {
    /// 对象ID -> 对象原点
    objects: HashMap<EntityId, Point3>,
    faces: HashMap<EntityId, FaceRecord>,
    edges: HashMap<EntityId, EdgeRecord>,
    vertices: HashMap<EntityId, VertexRecord>,
}

impl GeometryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加对象
    pub fn add_object(&mut self, id: EntityId, origin: Point3) {
        self.objects.insert(id, origin);
    }

    /// 添加面
    pub fn add_face(&mut self, id: EntityId, object: EntityId, center: Point3, normal: Vector3) {
        self.faces.insert(
            id,
            FaceRecord {
                object,
                center,
                normal,
            },
        );
    }

    /// 添加边
    pub fn add_edge(
        &mut self,
        id: EntityId,
        object: EntityId,
        start: Point3,
        end: Point3,
        faces: &[EntityId],
    ) {
        self.edges.insert(
            id,
            EdgeRecord {
                object,
                start,
                end,
                faces: faces.to_vec(),
            },
        );
    }

    /// 添加顶点
    pub fn add_vertex(&mut self, id: EntityId, object: EntityId, position: Point3, faces: &[EntityId]) {
        self.vertices.insert(
            id,
            VertexRecord {
                object,
                position,
                faces: faces.to_vec(),
            },
        );
    }

    /// 平移对象及其所有实体
    pub fn translate_object(&mut self, object: EntityId, delta: Vector3) -> bool {
        let Some(origin) = self.objects.get_mut(&object) else {
            return false;
        };
        *origin += delta;

        for face in self.faces.values_mut().filter(|f| f.object == object) {
            face.center += delta;
        }
        for edge in self.edges.values_mut().filter(|e| e.object == object) {
            edge.start += delta;
            edge.end += delta;
        }
        for vertex in self.vertices.values_mut().filter(|v| v.object == object) {
            vertex.position += delta;
        }
        true
    }

    /// 移除对象及其所有实体
    pub fn remove_object(&mut self, object: EntityId) -> bool {
        self.faces.retain(|_, f| f.object != object);
        self.edges.retain(|_, e| e.object != object);
        self.vertices.retain(|_, v| v.object != object);
        self.objects.remove(&object).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl GeometryProvider for GeometryTable {
    fn locate(&self, anchor: Anchor) -> Option<Point3> {
        match anchor {
            Anchor::Face(id) => self.faces.get(&id).map(|f| f.center),
            Anchor::Edge(id) => self.edges.get(&id).map(|e| nalgebra::center(&e.start, &e.end)),
            Anchor::Vertex(id) => self.vertices.get(&id).map(|v| v.position),
            Anchor::Object(id) => self.objects.get(&id).copied(),
        }
    }

    fn face_normal(&self, face: EntityId) -> Option<Vector3> {
        self.faces.get(&face).map(|f| f.normal)
    }

    fn owning_object(&self, anchor: Anchor) -> Option<EntityId> {
        match anchor {
            Anchor::Face(id) => self.faces.get(&id).map(|f| f.object),
            Anchor::Edge(id) => self.edges.get(&id).map(|e| e.object),
            Anchor::Vertex(id) => self.vertices.get(&id).map(|v| v.object),
            Anchor::Object(id) => self.objects.contains_key(&id).then_some(id),
        }
    }

    fn lies_on_face(&self, anchor: Anchor, face: EntityId) -> Option<bool> {
        if !self.faces.contains_key(&face) {
            return None;
        }
        match anchor {
            Anchor::Face(id) => Some(id == face),
            Anchor::Edge(id) => self.edges.get(&id).map(|e| e.faces.contains(&face)),
            Anchor::Vertex(id) => self.vertices.get(&id).map(|v| v.faces.contains(&face)),
            Anchor::Object(_) => Some(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box_top() -> GeometryTable {
        let body = EntityId(1);
        let top = EntityId(10);
        let side = EntityId(11);

        let mut geometry = GeometryTable::new();
        geometry.add_object(body, Point3::origin());
        geometry.add_face(top, body, Point3::new(0.5, 0.5, 1.0), Vector3::z());
        geometry.add_face(side, body, Point3::new(1.0, 0.5, 0.5), Vector3::x());
        geometry.add_edge(
            EntityId(20),
            body,
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            &[top, side],
        );
        geometry.add_vertex(EntityId(30), body, Point3::new(0.0, 0.0, 1.0), &[top]);
        geometry
    }

    #[test]
    fn test_anchor_rules() {
        assert_eq!(Anchor::Face(EntityId(1)).rule(), AnchorRule::FaceCenter);
        assert_eq!(Anchor::Edge(EntityId(1)).rule(), AnchorRule::EdgeMidpoint);
        assert_eq!(Anchor::Vertex(EntityId(1)).rule(), AnchorRule::OnVertex);
        assert_eq!(Anchor::Object(EntityId(1)).rule(), AnchorRule::ObjectOrigin);
        assert_eq!(Anchor::Edge(EntityId(7)).to_string(), "Edge(7)");
    }

    #[test]
    fn test_locate() {
        let geometry = unit_box_top();
        assert_eq!(
            geometry.locate(Anchor::Edge(EntityId(20))),
            Some(Point3::new(1.0, 0.5, 1.0))
        );
        assert_eq!(
            geometry.locate(Anchor::Vertex(EntityId(30))),
            Some(Point3::new(0.0, 0.0, 1.0))
        );
        assert_eq!(geometry.locate(Anchor::Vertex(EntityId(99))), None);
        assert_eq!(NoGeometry.locate(Anchor::Object(EntityId(1))), None);
    }

    #[test]
    fn test_membership() {
        let geometry = unit_box_top();
        let top = EntityId(10);
        assert_eq!(geometry.lies_on_face(Anchor::Edge(EntityId(20)), top), Some(true));
        assert_eq!(geometry.lies_on_face(Anchor::Vertex(EntityId(30)), EntityId(11)), Some(false));
        assert_eq!(geometry.lies_on_face(Anchor::Vertex(EntityId(30)), EntityId(99)), None);
        assert_eq!(geometry.owning_object(Anchor::Face(top)), Some(EntityId(1)));
    }

    #[test]
    fn test_translate_object() {
        let mut geometry = unit_box_top();
        assert!(geometry.translate_object(EntityId(1), Vector3::new(0.0, 0.0, 2.0)));
        assert_eq!(
            geometry.locate(Anchor::Face(EntityId(10))),
            Some(Point3::new(0.5, 0.5, 3.0))
        );
        assert!(!geometry.translate_object(EntityId(42), Vector3::x()));

        assert!(geometry.remove_object(EntityId(1)));
        assert!(geometry.is_empty());
        assert_eq!(geometry.locate(Anchor::Edge(EntityId(20))), None);
    }
}
