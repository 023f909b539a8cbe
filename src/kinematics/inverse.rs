//! 解析逆运动学（球腕 6 轴）
//!
//! 位置/姿态解耦：先由腕心求 q1-q3（平面三角形 + 余弦定理），再由
//! `R_3_6 = R_0_3ᵀ · T_0_6` 求腕角 q4-q6。腕配置（F/NF）给出 q5 符号相反
//! 的两支解；所选配置越界时翻转重算一次，仍越界则报错。
//!
//! 已知局限：腕奇异（`r33 ≈ ±1`）处 q4 与 q6 耦合，按解析公式取到的分配
//! 无定义；不做奇异感知的再分配。

use crate::kinematics::dh::{DhLink, invert_homogeneous};
use crate::kinematics::forward::forward_partial;
use crate::kinematics::pose::Pose;
use crate::types::{Deg, Joint, JointArray};
use nalgebra::Matrix4;

/// 运动学错误
#[derive(Debug, thiserror::Error)]
pub enum KinematicsError {
    /// 解出的关节角越出行程（腕配置翻转后仍越界）
    #[error("{joint}: IK solution {angle:.3}° outside range [{min}, {max}]")]
    OutOfRange {
        joint: Joint,
        angle: f64,
        min: f64,
        max: f64,
    },

    /// 目标位置不可达（三角形闭合失败）
    #[error("target unreachable: wrist centre beyond arm extent")]
    Unreachable,
}

/// 腕配置
///
/// 两支逆解的选择，q5 符号相反，q4/q6 相应偏转。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WristConfig {
    /// F（flip）
    #[default]
    Flip,
    /// NF（no-flip）
    NoFlip,
}

impl WristConfig {
    /// 另一支配置
    pub fn other(self) -> Self {
        match self {
            WristConfig::Flip => WristConfig::NoFlip,
            WristConfig::NoFlip => WristConfig::Flip,
        }
    }
}

/// J1 方位角：象限完备的反正切（输入毫米，输出度，范围 (-180, 180]）
///
/// 负 x 轴上有 ±180° 接缝；x = 0 时取 -90°。
pub fn j1_angle(x: f64, y: f64) -> f64 {
    if x == 0.0 {
        return -90.0;
    }
    let at = (y / x).atan().to_degrees();
    if x > 0.0 {
        at
    } else if y <= 0.0 {
        -180.0 + at
    } else {
        180.0 + at
    }
}

/// 解析逆解
///
/// # 参数
///
/// - `links`: DH 链
/// - `tool`: 工具坐标系（法兰后附加）
/// - `pose`: 目标位姿（度）
/// - `wrist`: 首选腕配置
/// - `ranges`: 各关节行程（度）
///
/// # 返回
///
/// 六个关节角（度）。任一关节越界（含翻转重试后）返回
/// [`KinematicsError::OutOfRange`]，位置不可达返回
/// [`KinematicsError::Unreachable`]。
pub fn inverse(
    links: &[DhLink; 6],
    tool: &Matrix4<f64>,
    pose: &Pose,
    wrist: WristConfig,
    ranges: &JointArray<(f64, f64)>,
) -> Result<JointArray<Deg>, KinematicsError> {
    let a1 = links[0].a;
    let a2 = links[1].a;
    let a3 = links[2].a;
    let d1 = links[0].d;
    let d4 = links[3].d;
    let d6 = links[5].d;

    // 1. 目标变换除去工具：T_0_6 = T_goal · T_tool⁻¹
    let t06 = pose.to_matrix() * invert_homogeneous(tool);

    // 2. 球腕中心 W = T_0_6 · Translate(0, 0, -d6)
    let wx = t06[(0, 3)] - d6 * t06[(0, 2)];
    let wy = t06[(1, 3)] - d6 * t06[(1, 2)];
    let wz = t06[(2, 3)] - d6 * t06[(2, 2)];

    // 3. 基座角
    let q1 = j1_angle(wx, wy);

    // 4. 转入 J1 零位平面
    let (s1, c1) = (-q1.to_radians()).sin_cos();
    let wx1 = c1 * wx - s1 * wy;
    let l1 = wx1 - a1;
    let l4 = wz - d1;
    let l2 = (l1 * l1 + l4 * l4).sqrt();
    let l3 = (a3 * a3 + d4 * d4).sqrt();

    // 5. 余弦定理
    let theta_b = l1.atan2(l4).to_degrees();
    let cos_c = (a2 * a2 + l2 * l2 - l3 * l3) / (2.0 * a2 * l2);
    let cos_d = (l3 * l3 + a2 * a2 - l2 * l2) / (2.0 * l3 * a2);
    if !(-1.0..=1.0).contains(&cos_c) || !(-1.0..=1.0).contains(&cos_d) {
        return Err(KinematicsError::Unreachable);
    }
    let theta_c = cos_c.acos().to_degrees();
    let theta_d = cos_d.acos().to_degrees();
    let theta_e = a3.atan2(d4).to_degrees();

    // 6. 肩角按腕心位置分支
    let q2 = if wx1 > a1 && l4 > 0.0 {
        theta_b - theta_c
    } else if wx1 > a1 {
        theta_b - theta_c + 180.0
    } else {
        -(theta_b + theta_c)
    };

    // 7. 肘角
    let q3 = -(theta_d + theta_e) + 90.0;

    // 8. R_3_6 = R_0_3ᵀ · T_0_6（齐次乘积，平移列不取用）
    let q_rad = [
        q1.to_radians(),
        q2.to_radians(),
        q3.to_radians(),
        0.0,
        0.0,
        0.0,
    ];
    let t03 = forward_partial(links, &q_rad, 3);
    let r36 = invert_homogeneous(&t03) * t06;
    let r13 = r36[(0, 2)];
    let r23 = r36[(1, 2)];
    let r31 = r36[(2, 0)];
    let r32 = r36[(2, 1)];
    let r33 = r36[(2, 2)];

    // 9. 腕角
    let wrist_angles = |config: WristConfig| -> (f64, f64, f64) {
        let s5 = (1.0 - r33 * r33).max(0.0).sqrt();
        match config {
            WristConfig::Flip => (
                r23.atan2(r13).to_degrees(),
                s5.atan2(r33).to_degrees(),
                r32.atan2(-r31).to_degrees(),
            ),
            WristConfig::NoFlip => (
                (-r23).atan2(-r13).to_degrees(),
                (-s5).atan2(r33).to_degrees(),
                (-r32).atan2(r31).to_degrees(),
            ),
        }
    };

    let in_range = |joint: Joint, angle: f64| {
        let (min, max) = ranges[joint];
        angle >= min && angle <= max
    };

    // 10. 所选配置越界时翻转一次
    let (mut q4, mut q5, mut q6) = wrist_angles(wrist);
    if !(in_range(Joint::J4, q4) && in_range(Joint::J5, q5) && in_range(Joint::J6, q6)) {
        (q4, q5, q6) = wrist_angles(wrist.other());
    }

    // 11. 全部关节行程校验
    let solution = JointArray::new([q1, q2, q3, q4, q5, q6]);
    for joint in Joint::ALL {
        let angle = solution[joint];
        if !in_range(joint, angle) {
            let (min, max) = ranges[joint];
            return Err(KinematicsError::OutOfRange {
                joint,
                angle,
                min,
                max,
            });
        }
    }
    Ok(solution.map(Deg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_j1_angle_quadrants() {
        // 正 x 半平面
        assert!((j1_angle(100.0, 0.0)).abs() < 1e-9);
        assert!((j1_angle(100.0, 100.0) - 45.0).abs() < 1e-9);
        // x = 0 取 -90°
        assert_eq!(j1_angle(0.0, 123.0), -90.0);
        assert_eq!(j1_angle(0.0, -123.0), -90.0);
        // 负 x 半平面
        assert!((j1_angle(-100.0, 100.0) - 135.0).abs() < 1e-9);
        assert!((j1_angle(-100.0, -100.0) + 135.0).abs() < 1e-9);
    }

    #[test]
    fn test_j1_angle_spec_points() {
        assert!((j1_angle(-113.262, 196.176) - 120.0).abs() < 1e-3);
        assert!((j1_angle(-39.335, -223.083) + 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_j1_angle_output_interval() {
        // 接缝在负 x 轴：y 从正侧逼近 → +180，负侧 → -180
        assert!(j1_angle(-100.0, 1e-9) > 179.9);
        assert!(j1_angle(-100.0, -1e-9) < -179.9);
        assert!(j1_angle(-100.0, 0.0) <= -179.9);
        for (x, y) in [(1.0, 5.0), (-3.0, 2.0), (-3.0, -2.0), (4.0, -1.0), (0.0, 7.0)] {
            let a = j1_angle(x, y);
            assert!(a > -180.0 - 1e-9 && a <= 180.0 + 1e-9);
        }
    }

    #[test]
    fn test_wrist_config_other() {
        assert_eq!(WristConfig::Flip.other(), WristConfig::NoFlip);
        assert_eq!(WristConfig::NoFlip.other(), WristConfig::Flip);
    }
}
