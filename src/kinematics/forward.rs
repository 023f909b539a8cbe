//! 正运动学
//!
//! `T_base_tool = T_0_1 · … · T_5_6 · T_tool`，逐连杆累乘。

use crate::kinematics::dh::DhLink;
use nalgebra::Matrix4;

/// 前 `n` 个连杆的累乘（弧度输入）
///
/// 逆解里用 `n = 3` 求 `T_0_3`。
pub fn forward_partial(links: &[DhLink; 6], q_rad: &[f64; 6], n: usize) -> Matrix4<f64> {
    let mut t = Matrix4::identity();
    for i in 0..n {
        t *= links[i].matrix(q_rad[i]);
    }
    t
}

/// 完整正解：六连杆 + 工具坐标系（弧度输入）
pub fn forward(links: &[DhLink; 6], tool: &Matrix4<f64>, q_rad: &[f64; 6]) -> Matrix4<f64> {
    forward_partial(links, q_rad, 6) * tool
}
