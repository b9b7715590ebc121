//! 向量与四元数数学
//!
//! 方向表示之间的纯函数转换：
//! - 指向向量 -> 正交轴 (Gram–Schmidt)
//! - 正交轴 <-> 单位四元数
//! - 欧拉角 ZXZ / ZYZ <-> 单位四元数
//! - 点的四元数旋转（正向 / 逆向）
//!
//! 本模块所有角度均为弧度，角度制与弧度制之间只通过
//! [`deg_to_rad`] / [`rad_to_deg`] 显式转换。
//!
//! 四元数统一规范化为 `w >= 0`。

use crate::error::{FrameError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub type Vector3 = nalgebra::Vector3<f64>;
pub type Point3 = nalgebra::Point3<f64>;
pub type Quaternion = nalgebra::UnitQuaternion<f64>;

/// 退化判定容差（叉积模长、零向量、万向锁）
pub const EPSILON: f64 = 1e-10;

/// 缓存四元数的单位长度容差
pub const QUATERNION_TOLERANCE: f64 = 1e-9;

/// 角度转弧度
pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

/// 弧度转角度
pub fn rad_to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}

/// 将角度归一化到 (-π, π]
pub fn wrap_angle(angle: f64) -> f64 {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped <= -PI {
        wrapped += 2.0 * PI;
    } else if wrapped > PI {
        wrapped -= 2.0 * PI;
    }
    wrapped
}

/// 欧拉角三元组
///
/// 单位由上下文决定：math 中的函数使用弧度，坐标系定义中存储角度。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub phi: f64,
    pub theta: f64,
    pub psi: f64,
}

impl EulerAngles {
    pub fn new(phi: f64, theta: f64, psi: f64) -> Self {
        Self { phi, theta, psi }
    }

    /// 弧度 -> 角度
    pub fn to_degrees(self) -> Self {
        Self::new(
            rad_to_deg(self.phi),
            rad_to_deg(self.theta),
            rad_to_deg(self.psi),
        )
    }

    /// 角度 -> 弧度
    pub fn to_radians(self) -> Self {
        Self::new(
            deg_to_rad(self.phi),
            deg_to_rad(self.theta),
            deg_to_rad(self.psi),
        )
    }
}

/// 单位化向量，长度小于 [`EPSILON`] 时返回 `None`
pub fn normalize(v: &Vector3) -> Option<Vector3> {
    let norm = v.norm();
    if norm < EPSILON {
        None
    } else {
        Some(v / norm)
    }
}

/// 由两个指向向量求正交轴
///
/// X 直接单位化，Z = normalize(X × Y指向)，Y = Z × X。
/// 即使 `y_ptr` 与 `x_ptr` 不正交，结果仍是右手正交基。
pub fn pointing_to_axis(x_ptr: &Vector3, y_ptr: &Vector3) -> Result<(Vector3, Vector3, Vector3)> {
    let x = normalize(x_ptr).ok_or(FrameError::DegenerateAxes)?;
    let z = normalize(&x.cross(y_ptr)).ok_or(FrameError::DegenerateAxes)?;
    let y = z.cross(&x);
    Ok((x, y, z))
}

/// 规范化四元数符号（w >= 0）
pub fn canonical(q: Quaternion) -> Quaternion {
    if q.w < 0.0 {
        Quaternion::new_unchecked(-q.into_inner())
    } else {
        q
    }
}

/// 由右手正交基求四元数
///
/// 调用者需保证 `x`、`y`、`z` 为单位正交基（例如 [`pointing_to_axis`] 的输出）。
pub fn axes_to_quaternion(x: &Vector3, y: &Vector3, z: &Vector3) -> Quaternion {
    let rotation = nalgebra::Rotation3::from_basis_unchecked(&[*x, *y, *z]);
    canonical(Quaternion::from_rotation_matrix(&rotation))
}

/// 四元数对应的坐标轴（旋转后的 X、Y、Z）
pub fn quaternion_to_axis(q: &Quaternion) -> (Vector3, Vector3, Vector3) {
    (q * Vector3::x(), q * Vector3::y(), q * Vector3::z())
}

fn from_wxyz(w: f64, x: f64, y: f64, z: f64) -> Quaternion {
    canonical(Quaternion::from_quaternion(nalgebra::Quaternion::new(w, x, y, z)))
}

/// ZXZ 欧拉角（弧度）-> 四元数，R = Rz(phi)·Rx(theta)·Rz(psi)
pub fn euler_zxz_to_quaternion(angles: EulerAngles) -> Quaternion {
    let EulerAngles { phi, theta, psi } = angles;
    let (s, c) = (theta / 2.0).sin_cos();
    from_wxyz(
        ((phi + psi) / 2.0).cos() * c,
        ((phi - psi) / 2.0).cos() * s,
        ((phi - psi) / 2.0).sin() * s,
        ((phi + psi) / 2.0).sin() * c,
    )
}

/// ZYZ 欧拉角（弧度）-> 四元数，R = Rz(phi)·Ry(theta)·Rz(psi)
pub fn euler_zyz_to_quaternion(angles: EulerAngles) -> Quaternion {
    let EulerAngles { phi, theta, psi } = angles;
    let (s, c) = (theta / 2.0).sin_cos();
    from_wxyz(
        ((phi + psi) / 2.0).cos() * c,
        -((phi - psi) / 2.0).sin() * s,
        ((phi - psi) / 2.0).cos() * s,
        ((phi + psi) / 2.0).sin() * c,
    )
}

/// 欧拉角提取的公共部分
///
/// 四元数写成 `(c·cos a, s·…, s·…, c·sin a)`，其中 `a = (phi+psi)/2`，
/// `b = (phi-psi)/2`。`b_sin`/`b_cos` 是 b 的正弦/余弦分量（已乘 s）。
///
/// 万向锁（theta ≈ 0 或 180°）时 phi 取 0，psi 承担全部旋转。
fn extract_euler(w: f64, z: f64, b_sin: f64, b_cos: f64) -> EulerAngles {
    let half_sin = b_sin.hypot(b_cos);
    let half_cos = w.hypot(z);

    if half_sin < EPSILON {
        let psi = wrap_angle(2.0 * z.atan2(w));
        return EulerAngles::new(0.0, 0.0, psi);
    }
    if half_cos < EPSILON {
        let psi = wrap_angle(-2.0 * b_sin.atan2(b_cos));
        return EulerAngles::new(0.0, PI, psi);
    }

    let sum = 2.0 * z.atan2(w);
    let diff = 2.0 * b_sin.atan2(b_cos);
    EulerAngles::new(
        wrap_angle((sum + diff) / 2.0),
        2.0 * half_sin.atan2(half_cos),
        wrap_angle((sum - diff) / 2.0),
    )
}

/// 四元数 -> ZXZ 欧拉角（弧度）
pub fn quaternion_to_euler_zxz(q: &Quaternion) -> EulerAngles {
    extract_euler(q.w, q.k, q.j, q.i)
}

/// 四元数 -> ZYZ 欧拉角（弧度）
pub fn quaternion_to_euler_zyz(q: &Quaternion) -> EulerAngles {
    extract_euler(q.w, q.k, -q.i, q.j)
}

/// 正交轴 -> ZXZ 欧拉角（弧度）
pub fn axis_to_euler_zxz(x: &Vector3, y: &Vector3, z: &Vector3) -> EulerAngles {
    quaternion_to_euler_zxz(&axes_to_quaternion(x, y, z))
}

/// 正交轴 -> ZYZ 欧拉角（弧度）
pub fn axis_to_euler_zyz(x: &Vector3, y: &Vector3, z: &Vector3) -> EulerAngles {
    quaternion_to_euler_zyz(&axes_to_quaternion(x, y, z))
}

/// 绕任意轴旋转 `angle`（弧度）的四元数
pub fn axis_angle_to_quaternion(axis: &Vector3, angle: f64) -> Result<Quaternion> {
    let axis = nalgebra::Unit::try_new(*axis, EPSILON).ok_or(FrameError::DegenerateAxes)?;
    Ok(canonical(Quaternion::from_axis_angle(&axis, angle)))
}

/// 用四元数旋转点：q·v·q*
pub fn q_rotate(q: &Quaternion, v: &Vector3) -> Vector3 {
    q.transform_vector(v)
}

/// 用共轭四元数旋转点：q*·v·q
pub fn q_rotate_inverse(q: &Quaternion, v: &Vector3) -> Vector3 {
    q.inverse_transform_vector(v)
}

/// 检查四元数是否为单位长度
pub fn is_unit(q: &Quaternion) -> bool {
    (q.quaternion().norm() - 1.0).abs() < QUATERNION_TOLERANCE
}

/// 两个四元数是否表示同一旋转（q 与 -q 等价）
pub fn same_rotation(a: &Quaternion, b: &Quaternion, tolerance: f64) -> bool {
    let (a, b) = (a.quaternion(), b.quaternion());
    (a - b).norm() < tolerance || (a + b).norm() < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn assert_vec_eq(a: &Vector3, b: &Vector3) {
        assert!((a - b).norm() < TOL, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_pointing_to_axis_orthonormalizes() {
        // Y指向不与X正交
        let (x, y, z) =
            pointing_to_axis(&Vector3::new(2.0, 0.0, 0.0), &Vector3::new(1.0, 3.0, 0.0)).unwrap();
        assert_vec_eq(&x, &Vector3::x());
        assert_vec_eq(&y, &Vector3::y());
        assert_vec_eq(&z, &Vector3::z());
    }

    #[test]
    fn test_pointing_to_axis_degenerate() {
        let parallel =
            pointing_to_axis(&Vector3::new(1.0, 0.0, 0.0), &Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(parallel, Err(FrameError::DegenerateAxes));

        let zero = pointing_to_axis(&Vector3::zeros(), &Vector3::y());
        assert_eq!(zero, Err(FrameError::DegenerateAxes));
    }

    #[test]
    fn test_euler_zxz_rotation() {
        // Rz(90°)
        let q = euler_zxz_to_quaternion(EulerAngles::new(90.0, 0.0, 0.0).to_radians());
        assert_vec_eq(&q_rotate(&q, &Vector3::x()), &Vector3::y());

        // Rz(90°)·Rx(90°)：Z 轴指向 Rz(90°)(0,-1,0) = (1,0,0)
        let q = euler_zxz_to_quaternion(EulerAngles::new(90.0, 90.0, 0.0).to_radians());
        let (_, _, z) = quaternion_to_axis(&q);
        assert_vec_eq(&z, &Vector3::x());
    }

    #[test]
    fn test_euler_zyz_rotation() {
        let q = euler_zyz_to_quaternion(EulerAngles::new(90.0, 90.0, 0.0).to_radians());
        let (x, _, z) = quaternion_to_axis(&q);
        assert_vec_eq(&x, &Vector3::new(0.0, 0.0, -1.0));
        assert_vec_eq(&z, &Vector3::y());
    }

    #[test]
    fn test_axis_euler_round_trip() {
        let pointing = [
            (Vector3::new(1.0, 2.0, 3.0), Vector3::new(-2.0, 1.0, 0.5)),
            (Vector3::new(0.3, -0.2, 0.9), Vector3::new(0.0, 1.0, 0.0)),
            (Vector3::new(-0.7071, -0.7071, 0.0), Vector3::new(-0.7071, 0.7071, 0.0)),
            (Vector3::new(0.0, 1.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
            (Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0)),
        ];

        for (x_ptr, y_ptr) in pointing {
            let (x, y, z) = pointing_to_axis(&x_ptr, &y_ptr).unwrap();
            let q = axes_to_quaternion(&x, &y, &z);
            assert!(is_unit(&q));

            let zyz = euler_zyz_to_quaternion(axis_to_euler_zyz(&x, &y, &z));
            assert!(same_rotation(&q, &zyz, TOL), "zyz {:?} vs {:?}", q, zyz);

            let zxz = euler_zxz_to_quaternion(axis_to_euler_zxz(&x, &y, &z));
            assert!(same_rotation(&q, &zxz, TOL), "zxz {:?} vs {:?}", q, zxz);

            let (rx, ry, rz) = quaternion_to_axis(&q);
            assert_vec_eq(&rx, &x);
            assert_vec_eq(&ry, &y);
            assert_vec_eq(&rz, &z);
        }
    }

    #[test]
    fn test_gimbal_lock_convention() {
        // theta = 0：Z 轴不变，绕 Z 旋转 90°
        let angles = axis_to_euler_zxz(&Vector3::y(), &-Vector3::x(), &Vector3::z());
        assert_eq!(angles.phi, 0.0);
        assert_eq!(angles.theta, 0.0);
        assert!((angles.psi - PI / 2.0).abs() < TOL);

        // theta = 180°：R = Rz(90°)·Rx(180°)
        let angles = axis_to_euler_zxz(&Vector3::y(), &Vector3::x(), &-Vector3::z());
        assert_eq!(angles.phi, 0.0);
        assert!((angles.theta - PI).abs() < TOL);
        assert!((angles.psi + PI / 2.0).abs() < TOL);

        let angles = axis_to_euler_zyz(&Vector3::y(), &Vector3::x(), &-Vector3::z());
        assert_eq!(angles.phi, 0.0);
        let q = euler_zyz_to_quaternion(angles);
        let (x, _, _) = quaternion_to_axis(&q);
        assert_vec_eq(&x, &Vector3::y());
    }

    #[test]
    fn test_axis_angle() {
        let q = axis_angle_to_quaternion(&Vector3::new(0.0, 0.0, 2.0), PI / 2.0).unwrap();
        assert_vec_eq(&q_rotate(&q, &Vector3::x()), &Vector3::y());
        assert_vec_eq(&q_rotate_inverse(&q, &Vector3::y()), &Vector3::x());

        assert!(axis_angle_to_quaternion(&Vector3::zeros(), 1.0).is_err());
    }

    #[test]
    fn test_canonical_sign() {
        // 绕 Z 旋转 350° 的四元数 w < 0
        let q = axis_angle_to_quaternion(&Vector3::z(), deg_to_rad(350.0)).unwrap();
        assert!(q.w >= 0.0);
        assert_vec_eq(
            &q_rotate(&q, &Vector3::x()),
            &Vector3::new(deg_to_rad(-10.0).cos(), deg_to_rad(-10.0).sin(), 0.0),
        );
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(2.5 * PI) - PI / 2.0).abs() < TOL);
        assert!((wrap_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < TOL);
        assert_eq!(wrap_angle(0.5), 0.5);
    }
}
