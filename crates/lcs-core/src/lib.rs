//! 局部坐标系引擎
//!
//! 管理以隐式 Global 为根的命名坐标系树，并在任意坐标系之间换算点坐标。
//!
//! # 架构设计
//!
//! - `math`: 指向向量、正交轴、欧拉角与四元数之间的转换
//! - `definition`: 坐标系相对父坐标系的原点与方向（自由 / 面锚定 / 对象锚定）
//! - `registry`: 坐标系 arena，负责命名、父子关系与修改校验
//! - `resolver`: 沿父链做正向/逆向变换、展平与求逆
//! - `anchor` / `expression`: 外部几何与表达式求值的接口
//!
//! # 示例
//!
//! ```rust
//! use lcs_core::prelude::*;
//!
//! let mut registry = Registry::new();
//! let cs1 = registry
//!     .create(
//!         FrameDefinition::free()
//!             .origin(-1.0, -2.6, 1.0)
//!             .axes(Vector3::new(-0.7071, -0.7071, 0.0), Vector3::new(-0.7071, 0.7071, 0.0))
//!             .build()
//!             .unwrap(),
//!         Some("CS1"),
//!         FrameId::GLOBAL,
//!     )
//!     .unwrap();
//!
//! let local = registry.resolver().to_local(cs1, &Point3::origin()).unwrap();
//! assert!((local.x + 2.5455844).abs() < 1e-6);
//! ```

pub mod anchor;
pub mod definition;
pub mod error;
pub mod expression;
pub mod math;
pub mod registry;
pub mod resolver;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::anchor::{Anchor, EntityId, GeometryProvider, GeometryTable, NoGeometry};
    pub use crate::definition::{
        FaceAnchor, FaceAxis, FrameBuilder, FrameDefinition, FrameKind, ObjectAnchor, Offset,
        Orientation, OrientationMode, OrientationSpec, Origin, Scalar, ViewPreset,
    };
    pub use crate::error::FrameError;
    pub use crate::expression::{EvalError, Evaluator, LengthUnit, UnitEvaluator, VariableTable};
    pub use crate::math::{EulerAngles, Point3, Quaternion, Vector3};
    pub use crate::registry::{DeletePolicy, Frame, FrameEdit, FrameId, Registry, RegistryConfig};
    pub use crate::resolver::{Pose, Resolver};
}
