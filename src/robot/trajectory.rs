//! 笛卡尔直线轨迹规划
//!
//! 在**笛卡尔空间**按归一化时间均匀插值（分量线性，含欧拉角），逐点逆解
//! 得到关节角序列。规划期逐点验证：任何中间位姿无解则整条轨迹拒绝，不会
//! 下发任何命令。
//!
//! 时间参数化：每关节行程除以其最大速度取最慢者为总时长，下限 0.5 秒；
//! 按 50Hz 控制周期采样。
//!
//! 直线性的来源：AccelStepper 的梯形规划在**关节空间**成形，单次 stepTo
//! 不保证笛卡尔直线；以 50Hz 逐拍重定向逼近直线路径。

use crate::kinematics::{KinematicsEngine, KinematicsError, Pose, WristConfig};
use crate::types::{Deg, Joint, JointArray};
use std::time::Duration;

/// 控制循环频率（Hz）
pub const CONTROL_FREQUENCY_HZ: f64 = 50.0;

/// 控制周期
pub const TICK_PERIOD: Duration = Duration::from_millis(20);

/// 轨迹时长下限（秒）
pub const MIN_DURATION_S: f64 = 0.5;

/// 轨迹规划错误
#[derive(Debug, thiserror::Error)]
pub enum TrajectoryError {
    /// 端点位姿无逆解
    #[error("endpoint IK failed: {0}")]
    Endpoint(#[from] KinematicsError),

    /// 中间插值位姿无逆解
    #[error("interpolated pose at tick {tick} has no IK solution: {source}")]
    Invalid {
        tick: usize,
        source: KinematicsError,
    },

    /// 最大速度为零但行程非零
    #[error("{joint}: zero max speed with non-zero travel")]
    ZeroSpeed { joint: Joint },
}

/// 一条已验证的直线轨迹
///
/// `q[0..=N]` 的关节角序列 + 控制周期。迭代器逐拍产出目标角向量。
#[derive(Debug, Clone)]
pub struct LinearTrajectory {
    ticks: Vec<JointArray<Deg>>,
    duration: Duration,
    current: usize,
}

impl LinearTrajectory {
    /// 规划从 `start` 到 `target` 的直线轨迹
    ///
    /// 两端点先逆解（失败 → [`TrajectoryError::Endpoint`]），再对
    /// `i ∈ 0..=N` 的每个插值位姿逆解（失败 → [`TrajectoryError::Invalid`]）。
    pub fn plan(
        engine: &KinematicsEngine,
        ranges: &JointArray<(f64, f64)>,
        max_speeds: &JointArray<f64>,
        start: &Pose,
        target: &Pose,
        wrist: WristConfig,
    ) -> Result<Self, TrajectoryError> {
        let q_start = engine.inverse(start, wrist, ranges)?;
        let q_end = engine.inverse(target, wrist, ranges)?;

        // 最慢关节决定总时长
        let mut slowest = 0.0f64;
        for joint in Joint::ALL {
            let travel = (q_end[joint].0 - q_start[joint].0).abs();
            let speed = max_speeds[joint];
            if speed <= 0.0 {
                if travel > 0.0 {
                    return Err(TrajectoryError::ZeroSpeed { joint });
                }
                continue;
            }
            slowest = slowest.max(travel / speed);
        }
        let duration_s = slowest.max(MIN_DURATION_S);
        let n = (duration_s * CONTROL_FREQUENCY_HZ).ceil() as usize;

        let mut ticks = Vec::with_capacity(n + 1);
        for i in 0..=n {
            let s = i as f64 / n as f64;
            let pose_i = start.lerp(target, s);
            let q_i = engine
                .inverse(&pose_i, wrist, ranges)
                .map_err(|source| TrajectoryError::Invalid { tick: i, source })?;
            ticks.push(q_i);
        }

        Ok(LinearTrajectory {
            ticks,
            duration: Duration::from_secs_f64(duration_s),
            current: 0,
        })
    }

    /// 采样点数（N + 1）
    pub fn tick_count(&self) -> usize {
        self.ticks.len()
    }

    /// 总时长
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// 控制周期
    pub fn period(&self) -> Duration {
        TICK_PERIOD
    }

    /// 末拍关节角
    pub fn end_angles(&self) -> &JointArray<Deg> {
        // plan 至少产出两端点
        &self.ticks[self.ticks.len() - 1]
    }
}

impl Iterator for LinearTrajectory {
    type Item = JointArray<Deg>;

    fn next(&mut self) -> Option<Self::Item> {
        let tick = self.ticks.get(self.current)?;
        self.current += 1;
        Some(*tick)
    }
}
