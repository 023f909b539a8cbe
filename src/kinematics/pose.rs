//! 末端位姿
//!
//! 平移毫米，姿态为 ZYX 外旋欧拉角（对外度、内部弧度）。矩阵 ↔ 位姿的
//! 两个方向都在这里：`to_matrix` 构造 `R = Rz·Ry·Rx` 的齐次变换，
//! `from_matrix` 按固定公式抽取欧拉角。

use crate::types::Deg;
use nalgebra::Matrix4;

/// 末端位姿 `(x, y, z, rx, ry, rz)`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    /// X 平移（毫米）
    pub x: f64,
    /// Y 平移（毫米）
    pub y: f64,
    /// Z 平移（毫米）
    pub z: f64,
    /// 绕 X 欧拉角
    pub rx: Deg,
    /// 绕 Y 欧拉角
    pub ry: Deg,
    /// 绕 Z 欧拉角
    pub rz: Deg,
}

impl Pose {
    /// 由六个分量构造（角度单位：度）
    pub fn new(x: f64, y: f64, z: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Pose {
            x,
            y,
            z,
            rx: Deg(rx),
            ry: Deg(ry),
            rz: Deg(rz),
        }
    }

    /// 构造齐次变换（ZYX 外旋：`R = Rz(rz)·Ry(ry)·Rx(rx)`）
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let (sx, cx) = self.rx.to_rad().0.sin_cos();
        let (sy, cy) = self.ry.to_rad().0.sin_cos();
        let (sz, cz) = self.rz.to_rad().0.sin_cos();
        Matrix4::new(
            cz * cy, cz * sy * sx - sz * cx, cz * sy * cx + sz * sx, self.x,
            sz * cy, sz * sy * sx + cz * cx, sz * sy * cx - cz * sx, self.y,
            -sy, cy * sx, cy * cx, self.z,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// 从齐次变换抽取位姿
    ///
    /// `ry = atan2(-m20, √(m00² + m10²))`，`rx`/`rz` 各分量除以 `cos(ry)`
    /// 后取 atan2。`ry = ±90°` 为万向锁：`rx` 与 `rz` 的分解在此处无定义。
    pub fn from_matrix(m: &Matrix4<f64>) -> Self {
        let ry = (-m[(2, 0)]).atan2((m[(0, 0)].powi(2) + m[(1, 0)].powi(2)).sqrt());
        let cy = ry.cos();
        let rx = (m[(2, 1)] / cy).atan2(m[(2, 2)] / cy);
        let rz = (m[(1, 0)] / cy).atan2(m[(0, 0)] / cy);
        Pose {
            x: m[(0, 3)],
            y: m[(1, 3)],
            z: m[(2, 3)],
            rx: Deg(rx.to_degrees()),
            ry: Deg(ry.to_degrees()),
            rz: Deg(rz.to_degrees()),
        }
    }

    /// 分量线性插值（`s ∈ [0, 1]`）
    ///
    /// 欧拉角同样按分量插值，不做角度展开：跨 ±180° 接缝的移动由调用方
    /// 避免。
    pub fn lerp(&self, other: &Pose, s: f64) -> Pose {
        let t = 1.0 - s;
        Pose {
            x: t * self.x + s * other.x,
            y: t * self.y + s * other.y,
            z: t * self.z + s * other.z,
            rx: Deg(t * self.rx.0 + s * other.rx.0),
            ry: Deg(t * self.ry.0 + s * other.ry.0),
            rz: Deg(t * self.rz.0 + s * other.rz.0),
        }
    }

    /// 把幅值小于 1e-10 的分量归零（测试基准用）
    pub fn normalized(&self) -> Pose {
        let snap = |v: f64| if v.abs() < 1e-10 { 0.0 } else { v };
        Pose {
            x: snap(self.x),
            y: snap(self.y),
            z: snap(self.z),
            rx: Deg(snap(self.rx.0)),
            ry: Deg(snap(self.ry.0)),
            rz: Deg(snap(self.rz.0)),
        }
    }

    /// 平移分量间的欧氏距离（毫米）
    pub fn distance_mm(&self, other: &Pose) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}
