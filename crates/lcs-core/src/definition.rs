//! 坐标系定义
//!
//! 描述一个坐标系相对其父坐标系的原点与方向：
//! - 自由坐标系 (Free)：原点为点或锚点，方向由用户指定
//! - 面坐标系 (FaceAnchored)：原点与方向点都在同一个面上，Z 轴为面法向
//! - 对象坐标系 (ObjectAnchored)：原点与轴由同一对象的实体确定
//!
//! 用户可用六种方式给出方向（[`OrientationSpec`]），构建时统一规范化为
//! 三种存储形式（[`Orientation`]）：视图预设转为轴/位置，绕轴旋转转为 ZYZ 欧拉角。

use crate::anchor::{Anchor, EntityId, GeometryProvider};
use crate::error::{FrameError, Result};
use crate::expression::Evaluator;
use crate::math::{self, EulerAngles, Point3, Quaternion, Vector3};
use serde::{Deserialize, Serialize};

/// 数值或表达式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Num(f64),
    Expr(String),
}

impl Scalar {
    /// 求值为长度（模型单位）
    pub fn length(&self, evaluator: &dyn Evaluator) -> Result<f64> {
        match self {
            Scalar::Num(value) => Ok(*value),
            Scalar::Expr(expr) => Ok(evaluator.eval_length(expr)?),
        }
    }

    /// 求值为角度（度）
    pub fn angle(&self, evaluator: &dyn Evaluator) -> Result<f64> {
        match self {
            Scalar::Num(value) => Ok(*value),
            Scalar::Expr(expr) => Ok(evaluator.eval_angle(expr)?),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Num(_))
    }
}

impl Default for Scalar {
    fn default() -> Self {
        Scalar::Num(0.0)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Num(value)
    }
}

impl From<&str> for Scalar {
    fn from(expr: &str) -> Self {
        Scalar::Expr(expr.to_string())
    }
}

impl From<String> for Scalar {
    fn from(expr: String) -> Self {
        Scalar::Expr(expr)
    }
}

/// 坐标系原点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Origin {
    /// 父坐标系中的点
    Point([Scalar; 3]),
    /// 绑定到几何实体（全局坐标）
    Anchor(Anchor),
}

impl Origin {
    pub fn point(x: impl Into<Scalar>, y: impl Into<Scalar>, z: impl Into<Scalar>) -> Self {
        Origin::Point([x.into(), y.into(), z.into()])
    }

    pub fn from_point(p: &Point3) -> Self {
        Origin::point(p.x, p.y, p.z)
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            Origin::Point(coords) => coords.iter().all(Scalar::is_numeric),
            Origin::Anchor(_) => false,
        }
    }
}

impl Default for Origin {
    fn default() -> Self {
        Origin::point(0.0, 0.0, 0.0)
    }
}

/// 求值点坐标
pub(crate) fn evaluate_point(coords: &[Scalar; 3], evaluator: &dyn Evaluator) -> Result<Point3> {
    Ok(Point3::new(
        coords[0].length(evaluator)?,
        coords[1].length(evaluator)?,
        coords[2].length(evaluator)?,
    ))
}

/// 视图预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewPreset {
    XY,
    XZ,
    YZ,
    Iso,
}

impl ViewPreset {
    /// 预设对应的 X/Y 指向向量
    pub fn pointing(&self) -> (Vector3, Vector3) {
        match self {
            ViewPreset::XY => (Vector3::x(), Vector3::y()),
            ViewPreset::XZ => (Vector3::z(), Vector3::x()),
            ViewPreset::YZ => (Vector3::y(), Vector3::z()),
            ViewPreset::Iso => (Vector3::new(2.0, -1.0, -1.0), Vector3::new(0.0, 1.0, -1.0)),
        }
    }
}

/// 用户给出的方向
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrientationSpec {
    /// X/Y 指向向量
    AxisPosition { x_axis: Vector3, y_axis: Vector3 },
    /// ZXZ 欧拉角（度）
    EulerZXZ { phi: Scalar, theta: Scalar, psi: Scalar },
    /// ZYZ 欧拉角（度）
    EulerZYZ { phi: Scalar, theta: Scalar, psi: Scalar },
    /// 视图预设
    View(ViewPreset),
    /// 绕过原点的任意轴旋转 `angle` 度
    AxisRotation { axis: Vector3, angle: f64 },
}

/// 规范化后的方向
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Orientation {
    AxisPosition { x_axis: Vector3, y_axis: Vector3 },
    EulerZXZ { phi: Scalar, theta: Scalar, psi: Scalar },
    EulerZYZ { phi: Scalar, theta: Scalar, psi: Scalar },
}

/// 方向模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrientationMode {
    AxisPosition,
    EulerZXZ,
    EulerZYZ,
}

impl OrientationMode {
    pub fn name(&self) -> &'static str {
        match self {
            OrientationMode::AxisPosition => "AxisPosition",
            OrientationMode::EulerZXZ => "EulerZXZ",
            OrientationMode::EulerZYZ => "EulerZYZ",
        }
    }
}

impl Orientation {
    /// 规范化用户方向，拒绝退化的轴
    pub fn canonicalize(spec: OrientationSpec) -> Result<Self> {
        let orientation = match spec {
            OrientationSpec::AxisPosition { x_axis, y_axis } => {
                Orientation::AxisPosition { x_axis, y_axis }
            }
            OrientationSpec::EulerZXZ { phi, theta, psi } => {
                Orientation::EulerZXZ { phi, theta, psi }
            }
            OrientationSpec::EulerZYZ { phi, theta, psi } => {
                Orientation::EulerZYZ { phi, theta, psi }
            }
            OrientationSpec::View(preset) => {
                let (x_axis, y_axis) = preset.pointing();
                Orientation::AxisPosition { x_axis, y_axis }
            }
            OrientationSpec::AxisRotation { axis, angle } => {
                let q = math::axis_angle_to_quaternion(&axis, math::deg_to_rad(angle))?;
                let EulerAngles { phi, theta, psi } = math::quaternion_to_euler_zyz(&q).to_degrees();
                Orientation::EulerZYZ {
                    phi: phi.into(),
                    theta: theta.into(),
                    psi: psi.into(),
                }
            }
        };

        if let Orientation::AxisPosition { x_axis, y_axis } = &orientation {
            math::pointing_to_axis(x_axis, y_axis)?;
        }
        Ok(orientation)
    }

    /// 由四元数得到指定模式的方向
    pub fn from_quaternion(mode: OrientationMode, q: &Quaternion) -> Self {
        match mode {
            OrientationMode::AxisPosition => {
                let (x_axis, y_axis, _) = math::quaternion_to_axis(q);
                Orientation::AxisPosition { x_axis, y_axis }
            }
            OrientationMode::EulerZXZ => {
                let EulerAngles { phi, theta, psi } = math::quaternion_to_euler_zxz(q).to_degrees();
                Orientation::EulerZXZ {
                    phi: phi.into(),
                    theta: theta.into(),
                    psi: psi.into(),
                }
            }
            OrientationMode::EulerZYZ => {
                let EulerAngles { phi, theta, psi } = math::quaternion_to_euler_zyz(q).to_degrees();
                Orientation::EulerZYZ {
                    phi: phi.into(),
                    theta: theta.into(),
                    psi: psi.into(),
                }
            }
        }
    }

    pub fn mode(&self) -> OrientationMode {
        match self {
            Orientation::AxisPosition { .. } => OrientationMode::AxisPosition,
            Orientation::EulerZXZ { .. } => OrientationMode::EulerZXZ,
            Orientation::EulerZYZ { .. } => OrientationMode::EulerZYZ,
        }
    }

    /// 不含表达式（结果可缓存）
    pub fn is_numeric(&self) -> bool {
        match self {
            Orientation::AxisPosition { .. } => true,
            Orientation::EulerZXZ { phi, theta, psi } | Orientation::EulerZYZ { phi, theta, psi } => {
                phi.is_numeric() && theta.is_numeric() && psi.is_numeric()
            }
        }
    }

    /// 相对父坐标系的四元数
    pub fn to_quaternion(&self, evaluator: &dyn Evaluator) -> Result<Quaternion> {
        match self {
            Orientation::AxisPosition { x_axis, y_axis } => {
                let (x, y, z) = math::pointing_to_axis(x_axis, y_axis)?;
                Ok(math::axes_to_quaternion(&x, &y, &z))
            }
            Orientation::EulerZXZ { phi, theta, psi } => {
                let angles = evaluate_angles(phi, theta, psi, evaluator)?;
                Ok(math::euler_zxz_to_quaternion(angles.to_radians()))
            }
            Orientation::EulerZYZ { phi, theta, psi } => {
                let angles = evaluate_angles(phi, theta, psi, evaluator)?;
                Ok(math::euler_zyz_to_quaternion(angles.to_radians()))
            }
        }
    }
}

fn evaluate_angles(
    phi: &Scalar,
    theta: &Scalar,
    psi: &Scalar,
    evaluator: &dyn Evaluator,
) -> Result<EulerAngles> {
    Ok(EulerAngles::new(
        phi.angle(evaluator)?,
        theta.angle(evaluator)?,
        psi.angle(evaluator)?,
    ))
}

/// 锚定坐标系的平面内偏移
///
/// 先沿基准 X/Y 轴平移，再绕 Z 轴旋转 `rotation` 度。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: Scalar,
    pub y: Scalar,
    pub rotation: Scalar,
}

impl Offset {
    pub fn new(x: impl Into<Scalar>, y: impl Into<Scalar>, rotation: impl Into<Scalar>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            rotation: rotation.into(),
        }
    }

    /// 求值为 (dx, dy, 旋转角度)
    pub fn evaluate(&self, evaluator: &dyn Evaluator) -> Result<(f64, f64, f64)> {
        Ok((
            self.x.length(evaluator)?,
            self.y.length(evaluator)?,
            self.rotation.angle(evaluator)?,
        ))
    }
}

/// 面坐标系中指向方向点的轴
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceAxis {
    #[default]
    X,
    Y,
}

/// 面坐标系
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAnchor {
    /// 所在面
    pub face: EntityId,
    /// 原点实体（面、边或顶点）
    pub origin: Anchor,
    /// 方向点实体（边或顶点）
    pub axis_target: Anchor,
    /// 指向方向点的轴
    pub axis: FaceAxis,
    pub offset: Offset,
    pub always_move_with_entity: bool,
}

impl FaceAnchor {
    pub fn new(face: EntityId, origin: Anchor, axis_target: Anchor) -> Self {
        Self {
            face,
            origin,
            axis_target,
            axis: FaceAxis::X,
            offset: Offset::default(),
            always_move_with_entity: true,
        }
    }

    pub fn axis(mut self, axis: FaceAxis) -> Self {
        self.axis = axis;
        self
    }

    pub fn offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    pub fn always_move_with_entity(mut self, value: bool) -> Self {
        self.always_move_with_entity = value;
        self
    }

    fn validate(&self) -> Result<()> {
        let owner = Anchor::Face(self.face);
        match self.origin {
            Anchor::Face(id) if id != self.face => {
                return Err(FrameError::AnchorMismatch {
                    anchor: self.origin,
                    owner,
                })
            }
            Anchor::Object(_) => {
                return Err(FrameError::AnchorMismatch {
                    anchor: self.origin,
                    owner,
                })
            }
            _ => {}
        }
        if !matches!(self.axis_target, Anchor::Edge(_) | Anchor::Vertex(_)) {
            return Err(FrameError::AnchorMismatch {
                anchor: self.axis_target,
                owner,
            });
        }
        if self.axis_target == self.origin {
            return Err(FrameError::DegenerateAxes);
        }
        Ok(())
    }
}

/// 对象坐标系
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectAnchor {
    pub object: EntityId,
    /// 原点实体
    pub origin: Anchor,
    /// X 轴指向的实体
    pub x_target: Anchor,
    /// Y 轴指向的实体
    pub y_target: Anchor,
    pub reverse_x: bool,
    pub reverse_y: bool,
    pub offset: Offset,
    pub always_move_with_entity: bool,
}

impl ObjectAnchor {
    pub fn new(object: EntityId, origin: Anchor, x_target: Anchor, y_target: Anchor) -> Self {
        Self {
            object,
            origin,
            x_target,
            y_target,
            reverse_x: false,
            reverse_y: false,
            offset: Offset::default(),
            always_move_with_entity: true,
        }
    }

    pub fn reverse_x(mut self, value: bool) -> Self {
        self.reverse_x = value;
        self
    }

    pub fn reverse_y(mut self, value: bool) -> Self {
        self.reverse_y = value;
        self
    }

    pub fn offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    pub fn always_move_with_entity(mut self, value: bool) -> Self {
        self.always_move_with_entity = value;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.x_target == self.origin || self.y_target == self.origin || self.x_target == self.y_target {
            return Err(FrameError::DegenerateAxes);
        }
        Ok(())
    }
}

/// 坐标系类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    Free,
    FaceAnchored,
    ObjectAnchored,
}

impl FrameKind {
    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::Free => "Free",
            FrameKind::FaceAnchored => "FaceAnchored",
            FrameKind::ObjectAnchored => "ObjectAnchored",
        }
    }
}

/// 坐标系定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameDefinition {
    Free {
        origin: Origin,
        orientation: Orientation,
    },
    FaceAnchored(FaceAnchor),
    ObjectAnchored(ObjectAnchor),
}

impl FrameDefinition {
    /// 自由坐标系构建器
    pub fn free() -> FrameBuilder {
        FrameBuilder::default()
    }

    /// 与父坐标系重合的坐标系
    pub fn identity() -> Self {
        FrameDefinition::Free {
            origin: Origin::default(),
            orientation: Orientation::AxisPosition {
                x_axis: Vector3::x(),
                y_axis: Vector3::y(),
            },
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            FrameDefinition::Free { .. } => FrameKind::Free,
            FrameDefinition::FaceAnchored(_) => FrameKind::FaceAnchored,
            FrameDefinition::ObjectAnchored(_) => FrameKind::ObjectAnchored,
        }
    }

    fn invalid_mode(&self, expected: &'static str) -> FrameError {
        FrameError::InvalidMode {
            expected,
            found: self.found_name(),
        }
    }

    fn found_name(&self) -> &'static str {
        match self {
            FrameDefinition::Free { orientation, .. } => orientation.mode().name(),
            _ => self.kind().name(),
        }
    }

    /// 方向（仅自由坐标系）
    pub fn orientation(&self) -> Result<&Orientation> {
        match self {
            FrameDefinition::Free { orientation, .. } => Ok(orientation),
            _ => Err(self.invalid_mode(FrameKind::Free.name())),
        }
    }

    pub fn mode(&self) -> Result<OrientationMode> {
        self.orientation().map(Orientation::mode)
    }

    /// 原点（仅自由坐标系）
    pub fn origin(&self) -> Result<&Origin> {
        match self {
            FrameDefinition::Free { origin, .. } => Ok(origin),
            _ => Err(self.invalid_mode(FrameKind::Free.name())),
        }
    }

    /// X/Y 指向向量（仅轴/位置模式）
    pub fn axes(&self) -> Result<(Vector3, Vector3)> {
        match self {
            FrameDefinition::Free {
                orientation: Orientation::AxisPosition { x_axis, y_axis },
                ..
            } => Ok((*x_axis, *y_axis)),
            _ => Err(self.invalid_mode(OrientationMode::AxisPosition.name())),
        }
    }

    /// 欧拉角 (phi, theta, psi)（仅欧拉模式）
    pub fn euler_angles(&self) -> Result<(&Scalar, &Scalar, &Scalar)> {
        match self {
            FrameDefinition::Free {
                orientation:
                    Orientation::EulerZXZ { phi, theta, psi } | Orientation::EulerZYZ { phi, theta, psi },
                ..
            } => Ok((phi, theta, psi)),
            _ => Err(self.invalid_mode("EulerZXZ or EulerZYZ")),
        }
    }

    pub fn face_anchor(&self) -> Result<&FaceAnchor> {
        match self {
            FrameDefinition::FaceAnchored(anchor) => Ok(anchor),
            _ => Err(self.invalid_mode(FrameKind::FaceAnchored.name())),
        }
    }

    pub fn object_anchor(&self) -> Result<&ObjectAnchor> {
        match self {
            FrameDefinition::ObjectAnchored(anchor) => Ok(anchor),
            _ => Err(self.invalid_mode(FrameKind::ObjectAnchored.name())),
        }
    }

    /// 偏移（仅锚定坐标系）
    pub fn offset(&self) -> Result<&Offset> {
        match self {
            FrameDefinition::FaceAnchored(anchor) => Ok(&anchor.offset),
            FrameDefinition::ObjectAnchored(anchor) => Ok(&anchor.offset),
            _ => Err(self.invalid_mode("FaceAnchored or ObjectAnchored")),
        }
    }

    /// 是否随几何实体移动
    pub fn always_move_with_entity(&self) -> bool {
        match self {
            FrameDefinition::Free { .. } => false,
            FrameDefinition::FaceAnchored(anchor) => anchor.always_move_with_entity,
            FrameDefinition::ObjectAnchored(anchor) => anchor.always_move_with_entity,
        }
    }

    /// 依赖的几何实体
    pub fn anchors(&self) -> Vec<Anchor> {
        match self {
            FrameDefinition::Free {
                origin: Origin::Anchor(anchor),
                ..
            } => vec![*anchor],
            FrameDefinition::Free { .. } => Vec::new(),
            FrameDefinition::FaceAnchored(a) => {
                vec![Anchor::Face(a.face), a.origin, a.axis_target]
            }
            FrameDefinition::ObjectAnchored(a) => {
                vec![Anchor::Object(a.object), a.origin, a.x_target, a.y_target]
            }
        }
    }

    /// 方向四元数可缓存（自由坐标系且方向不含表达式）
    pub fn is_cacheable(&self) -> bool {
        matches!(self, FrameDefinition::Free { orientation, .. } if orientation.is_numeric())
    }

    /// 定义自身的一致性检查（不需要几何）
    pub fn validate(&self) -> Result<()> {
        match self {
            FrameDefinition::Free {
                orientation: Orientation::AxisPosition { x_axis, y_axis },
                ..
            } => math::pointing_to_axis(x_axis, y_axis).map(|_| ()),
            FrameDefinition::Free { .. } => Ok(()),
            FrameDefinition::FaceAnchored(anchor) => anchor.validate(),
            FrameDefinition::ObjectAnchored(anchor) => anchor.validate(),
        }
    }

    /// 通过几何提供者检查锚点实体归属
    pub fn validate_anchors(&self, geometry: &dyn GeometryProvider) -> Result<()> {
        match self {
            FrameDefinition::Free {
                origin: Origin::Anchor(anchor),
                ..
            } => {
                geometry
                    .locate(*anchor)
                    .ok_or(FrameError::AnchorUnresolved(*anchor))?;
                Ok(())
            }
            FrameDefinition::Free { .. } => Ok(()),
            FrameDefinition::FaceAnchored(a) => {
                let owner = Anchor::Face(a.face);
                geometry
                    .face_normal(a.face)
                    .ok_or(FrameError::AnchorUnresolved(owner))?;
                for anchor in [a.origin, a.axis_target] {
                    match geometry.lies_on_face(anchor, a.face) {
                        Some(true) => {}
                        Some(false) => return Err(FrameError::AnchorMismatch { anchor, owner }),
                        None => return Err(FrameError::AnchorUnresolved(anchor)),
                    }
                }
                Ok(())
            }
            FrameDefinition::ObjectAnchored(a) => {
                let owner = Anchor::Object(a.object);
                for anchor in [a.origin, a.x_target, a.y_target] {
                    match geometry.owning_object(anchor) {
                        Some(object) if object == a.object => {}
                        Some(_) => return Err(FrameError::AnchorMismatch { anchor, owner }),
                        None => return Err(FrameError::AnchorUnresolved(anchor)),
                    }
                }
                Ok(())
            }
        }
    }

    /// 替换方向，得到新的自由坐标系定义
    pub fn with_orientation(&self, spec: OrientationSpec) -> Result<Self> {
        let origin = self.origin()?.clone();
        Ok(FrameDefinition::Free {
            origin,
            orientation: Orientation::canonicalize(spec)?,
        })
    }

    /// 替换原点
    pub fn with_origin(&self, origin: Origin) -> Result<Self> {
        let orientation = self.orientation()?.clone();
        Ok(FrameDefinition::Free {
            origin,
            orientation,
        })
    }

    /// 替换偏移
    pub fn with_offset(&self, offset: Offset) -> Result<Self> {
        match self {
            FrameDefinition::FaceAnchored(anchor) => {
                Ok(FrameDefinition::FaceAnchored(anchor.clone().offset(offset)))
            }
            FrameDefinition::ObjectAnchored(anchor) => {
                Ok(FrameDefinition::ObjectAnchored(anchor.clone().offset(offset)))
            }
            _ => Err(self.invalid_mode("FaceAnchored or ObjectAnchored")),
        }
    }

    /// 替换“随实体移动”标志
    pub fn with_always_move_with_entity(&self, value: bool) -> Result<Self> {
        match self {
            FrameDefinition::FaceAnchored(anchor) => Ok(FrameDefinition::FaceAnchored(
                anchor.clone().always_move_with_entity(value),
            )),
            FrameDefinition::ObjectAnchored(anchor) => Ok(FrameDefinition::ObjectAnchored(
                anchor.clone().always_move_with_entity(value),
            )),
            _ => Err(self.invalid_mode("FaceAnchored or ObjectAnchored")),
        }
    }
}

impl From<FaceAnchor> for FrameDefinition {
    fn from(anchor: FaceAnchor) -> Self {
        FrameDefinition::FaceAnchored(anchor)
    }
}

impl From<ObjectAnchor> for FrameDefinition {
    fn from(anchor: ObjectAnchor) -> Self {
        FrameDefinition::ObjectAnchored(anchor)
    }
}

/// 自由坐标系构建器
///
/// ```rust
/// use lcs_core::prelude::*;
///
/// let definition = FrameDefinition::free()
///     .origin(-1.0, -2.6, 1.0)
///     .axes(Vector3::new(-0.7071, -0.7071, 0.0), Vector3::new(-0.7071, 0.7071, 0.0))
///     .build()
///     .unwrap();
/// assert_eq!(definition.kind(), FrameKind::Free);
/// ```
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    origin: Origin,
    orientation: OrientationSpec,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self {
            origin: Origin::default(),
            orientation: OrientationSpec::View(ViewPreset::XY),
        }
    }
}

impl FrameBuilder {
    pub fn origin(mut self, x: impl Into<Scalar>, y: impl Into<Scalar>, z: impl Into<Scalar>) -> Self {
        self.origin = Origin::point(x, y, z);
        self
    }

    pub fn origin_anchor(mut self, anchor: Anchor) -> Self {
        self.origin = Origin::Anchor(anchor);
        self
    }

    pub fn orientation(mut self, spec: OrientationSpec) -> Self {
        self.orientation = spec;
        self
    }

    pub fn axes(self, x_axis: Vector3, y_axis: Vector3) -> Self {
        self.orientation(OrientationSpec::AxisPosition { x_axis, y_axis })
    }

    pub fn euler_zxz(self, phi: impl Into<Scalar>, theta: impl Into<Scalar>, psi: impl Into<Scalar>) -> Self {
        self.orientation(OrientationSpec::EulerZXZ {
            phi: phi.into(),
            theta: theta.into(),
            psi: psi.into(),
        })
    }

    pub fn euler_zyz(self, phi: impl Into<Scalar>, theta: impl Into<Scalar>, psi: impl Into<Scalar>) -> Self {
        self.orientation(OrientationSpec::EulerZYZ {
            phi: phi.into(),
            theta: theta.into(),
            psi: psi.into(),
        })
    }

    pub fn view(self, preset: ViewPreset) -> Self {
        self.orientation(OrientationSpec::View(preset))
    }

    pub fn axis_rotation(self, axis: Vector3, angle: f64) -> Self {
        self.orientation(OrientationSpec::AxisRotation { axis, angle })
    }

    /// 校验并规范化
    pub fn build(self) -> Result<FrameDefinition> {
        Ok(FrameDefinition::Free {
            origin: self.origin,
            orientation: Orientation::canonicalize(self.orientation)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::GeometryTable;
    use crate::expression::UnitEvaluator;

    #[test]
    fn test_view_presets_are_right_handed() {
        for preset in [ViewPreset::XY, ViewPreset::XZ, ViewPreset::YZ, ViewPreset::Iso] {
            let definition = FrameDefinition::free().view(preset).build().unwrap();
            assert_eq!(definition.mode().unwrap(), OrientationMode::AxisPosition);
        }

        let (x, y) = ViewPreset::Iso.pointing();
        let (_, _, z) = math::pointing_to_axis(&x, &y).unwrap();
        let expected = Vector3::new(1.0, 1.0, 1.0).normalize();
        assert!((z - expected).norm() < 1e-12);

        let (x, y) = ViewPreset::XZ.pointing();
        let (_, _, z) = math::pointing_to_axis(&x, &y).unwrap();
        assert!((z - Vector3::y()).norm() < 1e-12);
    }

    #[test]
    fn test_axis_rotation_becomes_zyz() {
        let axis = Vector3::new(1.0, 1.0, 0.0);
        let definition = FrameDefinition::free()
            .axis_rotation(axis, 30.0)
            .build()
            .unwrap();
        assert_eq!(definition.mode().unwrap(), OrientationMode::EulerZYZ);

        let q = definition
            .orientation()
            .unwrap()
            .to_quaternion(&UnitEvaluator::default())
            .unwrap();
        let expected = math::axis_angle_to_quaternion(&axis, math::deg_to_rad(30.0)).unwrap();
        assert!(math::same_rotation(&q, &expected, 1e-9));
    }

    #[test]
    fn test_degenerate_axes_rejected() {
        let result = FrameDefinition::free()
            .axes(Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0))
            .build();
        assert_eq!(result, Err(FrameError::DegenerateAxes));

        let result = FrameDefinition::free()
            .axis_rotation(Vector3::zeros(), 45.0)
            .build();
        assert_eq!(result, Err(FrameError::DegenerateAxes));
    }

    #[test]
    fn test_mode_accessors() {
        let axis = FrameDefinition::free().build().unwrap();
        assert!(axis.axes().is_ok());
        assert_eq!(
            axis.euler_angles(),
            Err(FrameError::InvalidMode {
                expected: "EulerZXZ or EulerZYZ",
                found: "AxisPosition",
            })
        );
        assert!(axis.offset().is_err());

        let euler = FrameDefinition::free()
            .euler_zxz(10.0, "20deg", 30.0)
            .build()
            .unwrap();
        let (phi, theta, _) = euler.euler_angles().unwrap();
        assert_eq!(phi, &Scalar::Num(10.0));
        assert_eq!(theta, &Scalar::Expr("20deg".to_string()));
        assert!(!euler.is_cacheable());
        assert!(matches!(euler.axes(), Err(FrameError::InvalidMode { .. })));
    }

    #[test]
    fn test_expression_angles() {
        let definition = FrameDefinition::free()
            .euler_zyz("pi / 2 * 1rad", 0.0, 0.0)
            .build()
            .unwrap();
        let q = definition
            .orientation()
            .unwrap()
            .to_quaternion(&UnitEvaluator::default())
            .unwrap();
        let rotated = math::q_rotate(&q, &Vector3::x());
        assert!((rotated - Vector3::y()).norm() < 1e-12);
    }

    #[test]
    fn test_face_anchor_validation() {
        let body = EntityId(1);
        let top = EntityId(10);
        let side = EntityId(11);
        let mut geometry = GeometryTable::new();
        geometry.add_object(body, Point3::origin());
        geometry.add_face(top, body, Point3::new(0.5, 0.5, 1.0), Vector3::z());
        geometry.add_face(side, body, Point3::new(1.0, 0.5, 0.5), Vector3::x());
        geometry.add_vertex(EntityId(30), body, Point3::new(0.0, 0.0, 1.0), &[top]);
        geometry.add_vertex(EntityId(31), body, Point3::new(1.0, 0.0, 0.0), &[side]);

        let on_top: FrameDefinition =
            FaceAnchor::new(top, Anchor::Face(top), Anchor::Vertex(EntityId(30))).into();
        assert!(on_top.validate().is_ok());
        assert!(on_top.validate_anchors(&geometry).is_ok());

        let off_face: FrameDefinition =
            FaceAnchor::new(top, Anchor::Face(top), Anchor::Vertex(EntityId(31))).into();
        assert_eq!(
            off_face.validate_anchors(&geometry),
            Err(FrameError::AnchorMismatch {
                anchor: Anchor::Vertex(EntityId(31)),
                owner: Anchor::Face(top),
            })
        );

        let unknown: FrameDefinition =
            FaceAnchor::new(top, Anchor::Face(top), Anchor::Vertex(EntityId(99))).into();
        assert_eq!(
            unknown.validate_anchors(&geometry),
            Err(FrameError::AnchorUnresolved(Anchor::Vertex(EntityId(99))))
        );

        let wrong_kind: FrameDefinition =
            FaceAnchor::new(top, Anchor::Object(body), Anchor::Vertex(EntityId(30))).into();
        assert!(matches!(
            wrong_kind.validate(),
            Err(FrameError::AnchorMismatch { .. })
        ));
    }

    #[test]
    fn test_object_anchor_validation() {
        let mut geometry = GeometryTable::new();
        geometry.add_object(EntityId(1), Point3::origin());
        geometry.add_object(EntityId(2), Point3::new(5.0, 0.0, 0.0));
        geometry.add_vertex(EntityId(30), EntityId(1), Point3::new(1.0, 0.0, 0.0), &[]);
        geometry.add_vertex(EntityId(31), EntityId(1), Point3::new(0.0, 1.0, 0.0), &[]);
        geometry.add_vertex(EntityId(40), EntityId(2), Point3::new(5.0, 1.0, 0.0), &[]);

        let valid: FrameDefinition = ObjectAnchor::new(
            EntityId(1),
            Anchor::Object(EntityId(1)),
            Anchor::Vertex(EntityId(30)),
            Anchor::Vertex(EntityId(31)),
        )
        .into();
        assert!(valid.validate_anchors(&geometry).is_ok());
        assert_eq!(valid.anchors().len(), 4);
        assert!(valid.always_move_with_entity());

        let foreign: FrameDefinition = ObjectAnchor::new(
            EntityId(1),
            Anchor::Object(EntityId(1)),
            Anchor::Vertex(EntityId(30)),
            Anchor::Vertex(EntityId(40)),
        )
        .into();
        assert!(matches!(
            foreign.validate_anchors(&geometry),
            Err(FrameError::AnchorMismatch { .. })
        ));
    }

    #[test]
    fn test_definition_serializes() {
        let definition = FrameDefinition::free()
            .origin(1.0, "2mm", 3.0)
            .euler_zxz(10.0, 20.0, 30.0)
            .build()
            .unwrap();
        let json = serde_json::to_string(&definition).unwrap();
        let restored: FrameDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(definition, restored);
    }
}
