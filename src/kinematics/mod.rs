//! 运动学引擎
//!
//! DH 链正运动学 + 球腕解析逆运动学。引擎除工具坐标系外无状态；角度对外
//! 用度、内部用弧度，只在边界换算。

pub mod dh;
pub mod forward;
pub mod inverse;
pub mod pose;

pub use dh::{ATLAS_A6_CHAIN, DhLink};
pub use inverse::{KinematicsError, WristConfig, j1_angle};
pub use pose::Pose;

use crate::types::{Deg, JointArray};
use nalgebra::Matrix4;

/// 运动学引擎
///
/// 持有 DH 链与工具坐标系。工具坐标系是唯一可变量，附加在连杆 6 之后。
#[derive(Debug, Clone)]
pub struct KinematicsEngine {
    links: [DhLink; 6],
    tool: Matrix4<f64>,
}

impl KinematicsEngine {
    /// 用给定 DH 链构造（工具坐标系为单位阵）
    pub fn new(links: [DhLink; 6]) -> Self {
        KinematicsEngine {
            links,
            tool: Matrix4::identity(),
        }
    }

    /// 设置工具坐标系
    pub fn set_tool_frame(&mut self, tool: Matrix4<f64>) {
        self.tool = tool;
    }

    /// 当前工具坐标系
    pub fn tool_frame(&self) -> &Matrix4<f64> {
        &self.tool
    }

    /// DH 链
    pub fn links(&self) -> &[DhLink; 6] {
        &self.links
    }

    /// 正解：关节角（度）→ 齐次变换
    pub fn forward(&self, q: &JointArray<Deg>) -> Matrix4<f64> {
        let q_rad: [f64; 6] = std::array::from_fn(|i| q[i].to_rad().0);
        forward::forward(&self.links, &self.tool, &q_rad)
    }

    /// 正解到位姿
    pub fn pose(&self, q: &JointArray<Deg>) -> Pose {
        Pose::from_matrix(&self.forward(q))
    }

    /// 逆解：目标位姿 + 腕配置 → 关节角（度）
    pub fn inverse(
        &self,
        pose: &Pose,
        wrist: WristConfig,
        ranges: &JointArray<(f64, f64)>,
    ) -> Result<JointArray<Deg>, KinematicsError> {
        inverse::inverse(&self.links, &self.tool, pose, wrist, ranges)
    }
}

impl Default for KinematicsEngine {
    /// Atlas A6 的链
    fn default() -> Self {
        KinematicsEngine::new(ATLAS_A6_CHAIN)
    }
}
