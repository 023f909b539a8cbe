//! 机器人协调层
//!
//! 独占六个关节控制器与运动学引擎，提供 `home` / `move_j` / `move_l` /
//! `halt` 与位姿查询。跨关节并发用 scoped thread 展开；`move_l` 的 50Hz
//! 调度用 spin_sleep 低抖动定时。

pub mod trajectory;

pub use trajectory::{
    CONTROL_FREQUENCY_HZ, LinearTrajectory, MIN_DURATION_S, TICK_PERIOD, TrajectoryError,
};

use crate::config::{ArmConfig, ConfigError};
use crate::firmata::{StepperGateway, Transport};
use crate::joint::{JointController, JointError};
use crate::kinematics::{KinematicsEngine, KinematicsError, Pose, WristConfig};
use crate::switch::SwitchEvent;
use crate::types::{Deg, Joint, JointArray};
use crossbeam_channel::Receiver;
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// `move_l` 结束后等待微控制器物理沉降的缓冲
const SETTLE_BUFFER: Duration = Duration::from_millis(500);

/// 协调层错误
#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    /// 端点位姿逆解失败
    #[error("IK failed: {0}")]
    IkFailed(#[source] KinematicsError),

    /// 轨迹中间位姿逆解失败（规划期拒绝，未下发任何命令）
    #[error("trajectory invalid at tick {tick}: {source}")]
    TrajectoryInvalid {
        tick: usize,
        source: KinematicsError,
    },

    /// 最大速度为零但行程非零
    #[error("{joint}: zero max speed with non-zero travel")]
    ZeroSpeed { joint: Joint },

    /// 关节层错误
    #[error(transparent)]
    Joint(#[from] JointError),

    /// 配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 运动被 `halt` 取消
    #[error("motion halted")]
    Halted,
}

impl From<TrajectoryError> for RobotError {
    fn from(e: TrajectoryError) -> Self {
        match e {
            TrajectoryError::Endpoint(source) => RobotError::IkFailed(source),
            TrajectoryError::Invalid { tick, source } => {
                RobotError::TrajectoryInvalid { tick, source }
            }
            TrajectoryError::ZeroSpeed { joint } => RobotError::ZeroSpeed { joint },
        }
    }
}

/// 机器人协调器
///
/// 所有权结构：协调器独占关节控制器与运动学引擎；关节共享网关只读句柄；
/// 无环。
pub struct Robot {
    joints: JointArray<JointController>,
    kinematics: KinematicsEngine,
    ranges: JointArray<(f64, f64)>,
    max_speeds: JointArray<f64>,
    halt_flag: AtomicBool,
    gateway: Arc<StepperGateway>,
}

impl Robot {
    /// 按配置构造：启动网关、建立六个关节控制器
    pub fn new(config: ArmConfig, transport: impl Transport + 'static) -> Result<Self, RobotError> {
        config.validate()?;
        let gateway = Arc::new(StepperGateway::new(transport));

        let mut joints = Vec::with_capacity(6);
        for cfg in config.joints.iter() {
            joints.push(JointController::new(cfg.clone(), gateway.clone())?);
        }
        let joints = match <[JointController; 6]>::try_from(joints) {
            Ok(array) => JointArray::new(array),
            Err(_) => unreachable!("exactly six joints constructed"),
        };

        Ok(Robot {
            joints,
            kinematics: KinematicsEngine::default(),
            ranges: config.ranges(),
            max_speeds: config.max_speeds(),
            halt_flag: AtomicBool::new(false),
            gateway,
        })
    }

    /// 关节控制器
    pub fn joint(&self, joint: Joint) -> &JointController {
        &self.joints[joint]
    }

    /// 运动学引擎
    pub fn kinematics(&self) -> &KinematicsEngine {
        &self.kinematics
    }

    /// 可变运动学引擎（设置工具坐标系用）
    pub fn kinematics_mut(&mut self) -> &mut KinematicsEngine {
        &mut self.kinematics
    }

    /// 网关句柄
    pub fn gateway(&self) -> &Arc<StepperGateway> {
        &self.gateway
    }

    /// 绑定某关节的限位开关事件流
    pub fn attach_switch(&self, joint: Joint, events: Receiver<SwitchEvent>) {
        self.joints[joint].attach_switch(events);
    }

    /// 当前关节角（最近一次已知值）
    pub fn current_angles(&self) -> JointArray<Deg> {
        self.joints.clone().map(|j| j.last_known_angle())
    }

    /// 当前末端位姿：按需正解，不缓存
    pub fn pose(&self) -> Pose {
        self.kinematics.pose(&self.current_angles())
    }

    /// 全机回零
    ///
    /// 先 J1-J3 并发，再 J4-J6 并发：基座段寻零时腕部保持不动，避免干涉。
    pub fn home(&self) -> Result<(), RobotError> {
        info!("homing: base phase (J1-J3)");
        self.for_each_joint(&[Joint::J1, Joint::J2, Joint::J3], |j| j.home())?;
        info!("homing: wrist phase (J4-J6)");
        self.for_each_joint(&[Joint::J4, Joint::J5, Joint::J6], |j| j.home())?;
        Ok(())
    }

    /// 点到点关节运动：六关节并发 rotate_to，全部完成后返回
    pub fn move_j(&self, targets: JointArray<Deg>) -> Result<(), RobotError> {
        self.for_each_joint(&Joint::ALL, |j| {
            j.rotate_to(targets[j.name()]).map(|_| ())
        })
    }

    /// 笛卡尔直线运动
    ///
    /// 规划（两端点 + 全部中间位姿逆解验证）后以 50Hz 逐拍下发绝对重定向，
    /// 不等待逐拍完成；上一拍未尽的运动被固件优雅重定向。拍完后再等
    /// `T + 500ms` 让微控制器物理收敛。被 [`halt`](Self::halt) 取消时返回
    /// [`RobotError::Halted`]。
    pub fn move_l(&self, target: Pose) -> Result<(), RobotError> {
        let start = self.pose();
        let traj = LinearTrajectory::plan(
            &self.kinematics,
            &self.ranges,
            &self.max_speeds,
            &start,
            &target,
            WristConfig::default(),
        )?;
        let duration = traj.duration();
        info!(
            duration_s = duration.as_secs_f64(),
            ticks = traj.tick_count(),
            "moveL planned"
        );

        self.halt_flag.store(false, Ordering::SeqCst);
        let sleeper = SpinSleeper::default();
        let period = traj.period();
        for q in traj {
            if self.halt_flag.load(Ordering::SeqCst) {
                debug!("moveL cancelled by halt");
                return Err(RobotError::Halted);
            }
            for joint in Joint::ALL {
                self.joints[joint].track_to(q[joint])?;
            }
            sleeper.sleep(period);
        }

        thread::sleep(duration + SETTLE_BUFFER);
        if self.halt_flag.load(Ordering::SeqCst) {
            return Err(RobotError::Halted);
        }
        Ok(())
    }

    /// 急停
    ///
    /// 取消进行中的 `move_l` 调度，然后六关节并发执行停止流程。幂等；
    /// 个别关节停止失败不阻断其余关节，完成后报告第一个错误。
    pub fn halt(&self) -> Result<(), RobotError> {
        info!("halt requested");
        self.halt_flag.store(true, Ordering::SeqCst);
        self.for_each_joint(&Joint::ALL, |j| j.stop())
    }

    /// 在给定关节集合上并发执行操作，全部结束后报告第一个错误
    fn for_each_joint<F>(&self, joints: &[Joint], op: F) -> Result<(), RobotError>
    where
        F: Fn(&JointController) -> Result<(), JointError> + Sync,
    {
        let mut first_error = None;
        thread::scope(|scope| {
            let handles: Vec<_> = joints
                .iter()
                .map(|&joint| {
                    let controller = &self.joints[joint];
                    let op = &op;
                    scope.spawn(move || op(controller))
                })
                .collect();
            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
        });
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
