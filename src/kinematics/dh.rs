//! DH 链定义
//!
//! 标准 Denavit-Hartenberg 参数：`T = Rz(θ)·Tz(d)·Tx(a)·Rx(α)`，关节角
//! `q_i` 叠加在 `theta_offset_i` 上。长度单位毫米，角度单位弧度。

use nalgebra::Matrix4;

/// 单连杆 DH 参数（不可变）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhLink {
    /// θ 偏置（弧度）
    pub theta_offset: f64,
    /// 连杆扭角 α（弧度）
    pub alpha: f64,
    /// 连杆偏距 d（毫米）
    pub d: f64,
    /// 连杆长度 a（毫米）
    pub a: f64,
}

impl DhLink {
    pub const fn new(theta_offset: f64, alpha: f64, d: f64, a: f64) -> Self {
        DhLink {
            theta_offset,
            alpha,
            d,
            a,
        }
    }

    /// 该连杆在关节角 `q`（弧度）下的齐次变换
    pub fn matrix(&self, q: f64) -> Matrix4<f64> {
        let theta = q + self.theta_offset;
        let (st, ct) = theta.sin_cos();
        let (sa, ca) = self.alpha.sin_cos();
        Matrix4::new(
            ct, -st * ca, st * sa, self.a * ct,
            st, ct * ca, -ct * sa, self.a * st,
            0.0, sa, ca, self.d,
            0.0, 0.0, 0.0, 1.0,
        )
    }
}

use std::f64::consts::{FRAC_PI_2, PI};

/// Atlas A6 的 DH 链
///
/// | i | θ偏置 | α    | d       | a     |
/// |---|-------|------|---------|-------|
/// | 1 | 0     | -90° | 184.0   | 65.0  |
/// | 2 | -90°  | 0    | 0       | 300.0 |
/// | 3 | 180°  | +90° | 0       | 0     |
/// | 4 | 0     | -90° | 227.328 | 0     |
/// | 5 | 0     | +90° | 0       | 0     |
/// | 6 | 0     | 0    | 43.0    | 0     |
pub const ATLAS_A6_CHAIN: [DhLink; 6] = [
    DhLink::new(0.0, -FRAC_PI_2, 184.0, 65.0),
    DhLink::new(-FRAC_PI_2, 0.0, 0.0, 300.0),
    DhLink::new(PI, FRAC_PI_2, 0.0, 0.0),
    DhLink::new(0.0, -FRAC_PI_2, 227.328, 0.0),
    DhLink::new(0.0, FRAC_PI_2, 0.0, 0.0),
    DhLink::new(0.0, 0.0, 43.0, 0.0),
];

/// 把幅值小于 1e-10 的矩阵元素归零（测试基准用）
pub fn snap_small(m: &Matrix4<f64>) -> Matrix4<f64> {
    m.map(|v| if v.abs() < 1e-10 { 0.0 } else { v })
}

/// 齐次变换求逆（旋转转置 + 平移反变换）
pub fn invert_homogeneous(m: &Matrix4<f64>) -> Matrix4<f64> {
    let r = m.fixed_view::<3, 3>(0, 0).transpose();
    let p = m.fixed_view::<3, 1>(0, 3);
    let t = -(r * p);
    let mut out = Matrix4::identity();
    out.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
    out.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
    out
}
