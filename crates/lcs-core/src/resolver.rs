//! 坐标变换解析
//!
//! 沿父链计算坐标系与 Global 之间的点/方向映射：
//! - 正向：局部坐标 -> 全局坐标
//! - 逆向：全局坐标 -> 局部坐标
//! - 展平：把嵌套坐标系的定义直接表示为相对 Global
//!
//! 每个查询都是当前注册表状态的纯函数。锚定实体在每次查询时向几何提供者解析，
//! 无法解析时返回 [`FrameError::AnchorUnresolved`]，不会退回到 Global。

use crate::anchor::Anchor;
use crate::definition::{
    evaluate_point, FaceAxis, FrameDefinition, Offset, Orientation, OrientationMode, Origin,
};
use crate::error::{FrameError, Result};
use crate::math::{self, Point3, Quaternion, Vector3};
use crate::registry::{Frame, FrameId, Registry};

/// 刚体位姿：原点 + 方向
///
/// 把子坐标系中的点映射到父坐标系：`p_parent = origin + q·p_local·q*`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub origin: Point3,
    pub rotation: Quaternion,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(origin: Point3, rotation: Quaternion) -> Self {
        Self { origin, rotation }
    }

    pub fn identity() -> Self {
        Self::new(Point3::origin(), Quaternion::identity())
    }

    /// 局部 -> 父
    pub fn apply(&self, point: &Point3) -> Point3 {
        self.origin + math::q_rotate(&self.rotation, &point.coords)
    }

    /// 父 -> 局部
    pub fn apply_inverse(&self, point: &Point3) -> Point3 {
        Point3::from(math::q_rotate_inverse(&self.rotation, &(point - self.origin)))
    }

    /// `self ∘ child`：先应用 child，再应用 self
    pub fn compose(&self, child: &Pose) -> Pose {
        Pose::new(
            self.apply(&child.origin),
            math::canonical(self.rotation * child.rotation),
        )
    }

    /// 逆变换：平移取 `-q*·origin·q`，方向取共轭
    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose::new(
            Point3::from(-math::q_rotate(&rotation, &self.origin.coords)),
            rotation,
        )
    }

    /// 坐标轴（在父坐标系中表示）
    pub fn axes(&self) -> (Vector3, Vector3, Vector3) {
        math::quaternion_to_axis(&self.rotation)
    }
}

/// 坐标变换解析器
///
/// 借用注册表，查询期间注册表不可修改。
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    fn frame(&self, id: FrameId) -> Result<&'a Frame> {
        self.registry.get(id).ok_or(FrameError::UnknownFrame(id))
    }

    fn locate(&self, anchor: Anchor) -> Result<Point3> {
        self.registry.geometry().locate(anchor).ok_or_else(|| {
            tracing::warn!("Geometry provider could not resolve {}", anchor);
            FrameError::AnchorUnresolved(anchor)
        })
    }

    /// 相对直接父坐标系的方向四元数
    pub fn quaternion_of(&self, id: FrameId) -> Result<Quaternion> {
        if id.is_global() {
            return Ok(Quaternion::identity());
        }
        let frame = self.frame(id)?;
        if let Some(q) = frame.cached_quaternion() {
            return Ok(*q);
        }

        match frame.definition() {
            FrameDefinition::Free { orientation, .. } => {
                let q = orientation.to_quaternion(self.registry.evaluator())?;
                frame.store_quaternion(q);
                Ok(q)
            }
            _ => Ok(self.local_pose(id)?.rotation),
        }
    }

    /// 相对直接父坐标系的原点
    pub fn origin_of(&self, id: FrameId) -> Result<Point3> {
        Ok(self.local_pose(id)?.origin)
    }

    /// 相对直接父坐标系的位姿
    pub fn local_pose(&self, id: FrameId) -> Result<Pose> {
        if id.is_global() {
            return Ok(Pose::identity());
        }
        let frame = self.frame(id)?;

        match frame.definition() {
            FrameDefinition::Free {
                origin: Origin::Point(coords),
                ..
            } => Ok(Pose::new(
                evaluate_point(coords, self.registry.evaluator())?,
                self.quaternion_of(id)?,
            )),
            FrameDefinition::Free {
                origin: Origin::Anchor(anchor),
                ..
            } => {
                let global = self.locate(*anchor)?;
                let parent = self.global_pose(frame.parent_id())?;
                Ok(Pose::new(parent.apply_inverse(&global), self.quaternion_of(id)?))
            }
            anchored => {
                let global = self.anchored_pose(anchored)?;
                let parent = self.global_pose(frame.parent_id())?;
                Ok(parent.inverse().compose(&global))
            }
        }
    }

    /// 相对 Global 的位姿
    ///
    /// 自上而下沿父链累积，每层只解析一次。
    pub fn global_pose(&self, id: FrameId) -> Result<Pose> {
        let mut chain = Vec::new();
        let mut current = id;
        while !current.is_global() {
            let frame = self.frame(current)?;
            if !matches!(frame.definition(), FrameDefinition::Free { .. }) {
                // 锚定几何本身就在全局坐标中，更上层无关
                chain.push(frame);
                break;
            }
            chain.push(frame);
            current = frame.parent_id();
        }

        let mut pose = Pose::identity();
        for frame in chain.iter().rev() {
            pose = self.pose_under(frame, &pose)?;
        }
        Ok(pose)
    }

    /// 已知父坐标系全局位姿时，坐标系的全局位姿
    fn pose_under(&self, frame: &Frame, parent: &Pose) -> Result<Pose> {
        match frame.definition() {
            FrameDefinition::Free {
                origin: Origin::Point(coords),
                ..
            } => {
                let local = Pose::new(
                    evaluate_point(coords, self.registry.evaluator())?,
                    self.quaternion_of(frame.id())?,
                );
                Ok(parent.compose(&local))
            }
            FrameDefinition::Free {
                origin: Origin::Anchor(anchor),
                ..
            } => Ok(Pose::new(
                self.locate(*anchor)?,
                math::canonical(parent.rotation * self.quaternion_of(frame.id())?),
            )),
            anchored => self.anchored_pose(anchored),
        }
    }

    /// 坐标轴在 Global 中的方向
    pub fn global_axes(&self, id: FrameId) -> Result<(Vector3, Vector3, Vector3)> {
        Ok(self.global_pose(id)?.axes())
    }

    /// 局部坐标 -> 全局坐标
    pub fn to_global(&self, id: FrameId, local_point: &Point3) -> Result<Point3> {
        Ok(self.global_pose(id)?.apply(local_point))
    }

    /// 全局坐标 -> 局部坐标
    pub fn to_local(&self, id: FrameId, global_point: &Point3) -> Result<Point3> {
        Ok(self.global_pose(id)?.apply_inverse(global_point))
    }

    /// 把 `from` 中的点换算到 `to` 中
    pub fn convert(&self, from: FrameId, to: FrameId, point: &Point3) -> Result<Point3> {
        let global = self.to_global(from, point)?;
        self.to_local(to, &global)
    }

    /// 展平为直接相对 Global 的定义
    ///
    /// 自由坐标系得到轴/位置形式（锚定原点保持不变）；
    /// 锚定坐标系的几何本来就在全局中，定义原样保留。
    pub fn flatten_to_global(&self, id: FrameId) -> Result<FrameDefinition> {
        self.reexpress(id, FrameId::GLOBAL, Some(OrientationMode::AxisPosition))
    }

    /// 把坐标系改为相对 `new_parent` 的定义，全局位姿不变
    ///
    /// 方向保持原有模式，其中的表达式求值为数值。
    pub fn rebase(&self, id: FrameId, new_parent: FrameId) -> Result<FrameDefinition> {
        self.reexpress(id, new_parent, None)
    }

    fn reexpress(
        &self,
        id: FrameId,
        new_parent: FrameId,
        mode: Option<OrientationMode>,
    ) -> Result<FrameDefinition> {
        if id.is_global() {
            return Err(FrameError::GlobalImmutable);
        }
        let frame = self.frame(id)?;
        let global = self.global_pose(id)?;

        match frame.definition() {
            FrameDefinition::Free {
                origin,
                orientation,
            } => {
                let local = self.global_pose(new_parent)?.inverse().compose(&global);
                let origin = match origin {
                    Origin::Anchor(anchor) => Origin::Anchor(*anchor),
                    Origin::Point(_) => Origin::from_point(&local.origin),
                };
                Ok(FrameDefinition::Free {
                    origin,
                    orientation: Orientation::from_quaternion(
                        mode.unwrap_or_else(|| orientation.mode()),
                        &local.rotation,
                    ),
                })
            }
            anchored => Ok(anchored.clone()),
        }
    }

    /// 逆位姿
    ///
    /// `to_global = false`：相对直接父坐标系位姿的逆，在 `id` 下用它定义的坐标系与父坐标系重合；
    /// `to_global = true`：相对 Global 位姿的逆，在 `id` 下用它定义的坐标系与 Global 重合。
    pub fn invert(&self, id: FrameId, to_global: bool) -> Result<(Point3, Quaternion)> {
        let pose = if to_global {
            self.global_pose(id)?
        } else {
            self.local_pose(id)?
        };
        let inverse = pose.inverse();
        Ok((inverse.origin, inverse.rotation))
    }

    /// 锚定坐标系在 Global 中的位姿
    fn anchored_pose(&self, definition: &FrameDefinition) -> Result<Pose> {
        match definition {
            FrameDefinition::FaceAnchored(face) => {
                let origin = self.locate(face.origin)?;
                let normal = self
                    .registry
                    .geometry()
                    .face_normal(face.face)
                    .and_then(|n| math::normalize(&n))
                    .ok_or(FrameError::AnchorUnresolved(Anchor::Face(face.face)))?;
                let target = self.locate(face.axis_target)?;

                // 方向点投影到面内
                let towards = target - origin;
                let in_plane = towards - normal * towards.dot(&normal);
                let direction = math::normalize(&in_plane).ok_or(FrameError::DegenerateAxes)?;

                let (x, y) = match face.axis {
                    FaceAxis::X => (direction, normal.cross(&direction)),
                    FaceAxis::Y => (direction.cross(&normal), direction),
                };
                self.offset_pose(origin, x, y, normal, &face.offset)
            }
            FrameDefinition::ObjectAnchored(object) => {
                let origin = self.locate(object.origin)?;
                let mut x_ptr = self.locate(object.x_target)? - origin;
                let mut y_ptr = self.locate(object.y_target)? - origin;
                if object.reverse_x {
                    x_ptr = -x_ptr;
                }
                if object.reverse_y {
                    y_ptr = -y_ptr;
                }
                let (x, y, z) = math::pointing_to_axis(&x_ptr, &y_ptr)?;
                self.offset_pose(origin, x, y, z, &object.offset)
            }
            FrameDefinition::Free { .. } => Err(FrameError::InvalidMode {
                expected: "FaceAnchored or ObjectAnchored",
                found: "Free",
            }),
        }
    }

    /// 平面内偏移：沿基准 X/Y 平移后绕 Z 旋转
    fn offset_pose(
        &self,
        origin: Point3,
        x: Vector3,
        y: Vector3,
        z: Vector3,
        offset: &Offset,
    ) -> Result<Pose> {
        let (dx, dy, rotation) = offset.evaluate(self.registry.evaluator())?;
        let origin = origin + x * dx + y * dy;

        let (s, c) = math::deg_to_rad(rotation).sin_cos();
        let x_rot = x * c + y * s;
        let y_rot = z.cross(&x_rot);
        Ok(Pose::new(origin, math::axes_to_quaternion(&x_rot, &y_rot, &z)))
    }
}
