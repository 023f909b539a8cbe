//! 关节控制器
//!
//! 单轴单元：捆绑一台步进设备、一路限位开关、行程与标定参数，以及回零
//! 状态机。所有角度参数在度域；发给网关前换算为步。
//!
//! # 停止流程
//!
//! AccelStepper 引擎在 stop 之后保留斜坡状态，这里用"零加速度 + 零步围栏"
//! 把它排干：(1) 发 stop；(2) 保存当前加速度；(3) 加速度置 0；(4) 零步围栏
//! 等待回报；(5) 恢复加速度。围栏回报同时唤醒被打断运动的等待者。

use crate::config::{ConfigError, JointConfig};
use crate::firmata::{GatewayError, StepperGateway};
use crate::joint::state::JointState;
use crate::switch::SwitchEvent;
use crate::types::{Deg, Joint};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 回零触发后的机械沉降时间
const SETTLE: Duration = Duration::from_millis(500);

/// 开机压住限位开关时的退避角度（度）
const PRECHECK_BACKOFF_DEG: f64 = 15.0;

/// 关节层错误
#[derive(Debug, thiserror::Error)]
pub enum JointError {
    /// 未回零的关节收到运动请求（零步围栏除外）
    #[error("{joint} is not homed")]
    NotHomed { joint: Joint },

    /// 目标角度超出行程
    #[error("{joint}: target {target:.3}° outside range [{min}, {max}]")]
    OutOfRange {
        joint: Joint,
        target: f64,
        min: f64,
        max: f64,
    },

    /// 回零失败：行程走完仍未触发限位
    #[error("{joint} homing failed: {reason}")]
    HomingFailed { joint: Joint, reason: &'static str },

    /// 配置非法
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 网关错误
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

struct JointInner {
    config: JointConfig,
    state: Arc<Mutex<JointState>>,
    gateway: Arc<StepperGateway>,
    /// 停止流程持有此锁直到围栏回报；普通运动命令发出前短暂取锁，
    /// 保证停止窗口内不会从外部注入 rotate
    stop_gate: Mutex<()>,
}

/// 关节控制器（可克隆，内部共享）
#[derive(Clone)]
pub struct JointController {
    inner: Arc<JointInner>,
}

impl JointController {
    /// 创建控制器：校验配置、下发设备配置与默认速度/加速度、注册位置钩子
    pub fn new(config: JointConfig, gateway: Arc<StepperGateway>) -> Result<Self, JointError> {
        config.validate()?;

        let device = config.device_index;
        gateway.configure_stepper(device, config.step_pin, config.dir_pin)?;

        let state = Arc::new(Mutex::new(JointState::default()));

        // 位置钩子：任何携带位置的回报都从整数步数反算角度，
        // 包括未被等待的流式重定向完成
        let hook_state = state.clone();
        let steps_per_deg = config.steps_per_deg();
        gateway.set_position_hook(
            device,
            Box::new(move |steps| {
                hook_state.lock().last_known_angle_deg = steps as f64 / steps_per_deg;
            }),
        );

        let controller = JointController {
            inner: Arc::new(JointInner {
                config,
                state,
                gateway,
                stop_gate: Mutex::new(()),
            }),
        };
        controller.set_speed(controller.inner.config.max_speed_deg_per_s)?;
        controller.set_acceleration(controller.inner.config.max_accel_deg_per_s2)?;
        Ok(controller)
    }

    /// 关节名
    pub fn name(&self) -> Joint {
        self.inner.config.name
    }

    /// 静态配置
    pub fn config(&self) -> &JointConfig {
        &self.inner.config
    }

    /// 状态快照
    pub fn state(&self) -> JointState {
        self.inner.state.lock().clone()
    }

    /// 是否已回零
    pub fn homed(&self) -> bool {
        self.inner.state.lock().homed
    }

    /// 最近一次已知角度
    pub fn last_known_angle(&self) -> Deg {
        Deg(self.inner.state.lock().last_known_angle_deg)
    }

    /// 绑定限位开关事件流
    ///
    /// 监视线程在事件通道断开时退出。`Press` 置位 `home_switch_active` 并
    /// 立即执行停止流程（硬件打断运动的唯一路径）；`Release` 清标志。
    pub fn attach_switch(&self, events: Receiver<SwitchEvent>) {
        let ctrl = self.clone();
        thread::spawn(move || {
            let joint = ctrl.name();
            for event in events.iter() {
                match event {
                    SwitchEvent::Press => {
                        ctrl.inner.state.lock().home_switch_active = true;
                        debug!(%joint, "limit switch pressed, stopping");
                        if let Err(e) = ctrl.stop() {
                            warn!(%joint, "stop after switch press failed: {e}");
                        }
                    }
                    SwitchEvent::Release => {
                        ctrl.inner.state.lock().home_switch_active = false;
                    }
                }
            }
            debug!(%joint, "switch channel closed, monitor exiting");
        });
    }

    /// 设置速度（度/秒）。无前置条件。
    pub fn set_speed(&self, deg_per_s: f64) -> Result<(), JointError> {
        let cfg = &self.inner.config;
        self.inner
            .gateway
            .set_speed(cfg.device_index, deg_per_s * cfg.steps_per_deg())?;
        self.inner.state.lock().current_speed_deg_per_s = deg_per_s;
        Ok(())
    }

    /// 设置加速度（度/秒²）。无前置条件。
    pub fn set_acceleration(&self, deg_per_s2: f64) -> Result<(), JointError> {
        let cfg = &self.inner.config;
        self.inner
            .gateway
            .set_acceleration(cfg.device_index, deg_per_s2 * cfg.steps_per_deg())?;
        self.inner.state.lock().current_accel_deg_per_s2 = deg_per_s2;
        Ok(())
    }

    /// 相对转动
    ///
    /// 前置条件（`delta = 0` 或回零中除外）：已回零且目标在行程内。
    /// 返回 `true` 当且仅当回报角度与指令目标在一步精度内一致。
    /// `delta = 0` 是纯完成围栏：不查回零、不查行程。
    pub fn rotate_by(&self, delta: Deg) -> Result<bool, JointError> {
        let delta = delta.0;
        if delta == 0.0 {
            self.fence()?;
            return Ok(true);
        }

        let cfg = &self.inner.config;
        let pre_steps;
        {
            let st = self.inner.state.lock();
            pre_steps = cfg.deg_to_steps(st.last_known_angle_deg);
            if !st.is_homing {
                if !st.homed {
                    return Err(JointError::NotHomed { joint: cfg.name });
                }
                let target = st.last_known_angle_deg + delta;
                if !cfg.in_range(target) {
                    return Err(JointError::OutOfRange {
                        joint: cfg.name,
                        target,
                        min: cfg.min_deg,
                        max: cfg.max_deg,
                    });
                }
            }
        }

        let delta_steps = cfg.deg_to_steps(delta);
        let future = {
            let _gate = self.inner.stop_gate.lock();
            self.inner.gateway.step_relative(cfg.device_index, delta_steps)?
        };
        let reported = future.wait()?;
        Ok((reported - (pre_steps + delta_steps)).abs() <= 1)
    }

    /// 绝对转动
    ///
    /// 前置条件（回零中除外）：已回零且目标在行程内。完成语义同
    /// [`rotate_by`](Self::rotate_by)。
    pub fn rotate_to(&self, target: Deg) -> Result<bool, JointError> {
        let target_steps = self.check_target(target)?;
        let future = {
            let _gate = self.inner.stop_gate.lock();
            self.inner
                .gateway
                .step_to(self.inner.config.device_index, target_steps)?
        };
        let reported = future.wait()?;
        Ok((reported - target_steps).abs() <= 1)
    }

    /// 绝对重定向，不等待完成
    ///
    /// 轨迹流式下发专用：上一拍未完成的运动被固件优雅重定向。完成回报
    /// 到达时仍会经位置钩子更新角度。
    pub fn track_to(&self, target: Deg) -> Result<(), JointError> {
        let target_steps = self.check_target(target)?;
        let _gate = self.inner.stop_gate.lock();
        self.inner
            .gateway
            .step_to_nowait(self.inner.config.device_index, target_steps)?;
        Ok(())
    }

    /// 停止流程（见模块文档）
    pub fn stop(&self) -> Result<(), JointError> {
        let _gate = self.inner.stop_gate.lock();
        let cfg = &self.inner.config;
        self.inner.gateway.stop(cfg.device_index)?;
        let saved_accel = self.inner.state.lock().current_accel_deg_per_s2;
        self.set_acceleration(0.0)?;
        self.fence()?;
        self.set_acceleration(saved_accel)?;
        Ok(())
    }

    /// 查询当前角度（经微控制器往返）
    pub fn report_angle(&self) -> Result<Deg, JointError> {
        let cfg = &self.inner.config;
        let future = self.inner.gateway.report_position(cfg.device_index)?;
        let steps = future.wait()?;
        Ok(Deg(cfg.steps_to_deg(steps)))
    }

    /// 移动到就绪位
    pub fn go_to_ready(&self) -> Result<bool, JointError> {
        self.rotate_to(Deg(self.inner.config.ready_position_deg))
    }

    /// 回零状态机
    ///
    /// `Idle → PreCheck → SeekLimit → Settle → Calibrated`，失败进 `Failed`
    /// （`homed` 保持 false）。成功后移动到就绪位。无论成败，退出时清
    /// `is_homing`。
    pub fn home(&self) -> Result<(), JointError> {
        let joint = self.name();
        info!(%joint, "homing started");
        {
            let mut st = self.inner.state.lock();
            st.is_homing = true;
            st.homed = false;
        }

        let result = self.home_cycle();
        self.inner.state.lock().is_homing = false;

        match &result {
            Ok(()) => info!(%joint, "homing calibrated"),
            Err(e) => warn!(%joint, "homing failed: {e}"),
        }
        result?;

        self.go_to_ready()?;
        Ok(())
    }

    /// 跳过回零直接置位（单元测试用）
    #[cfg(test)]
    pub(crate) fn force_homed_at(&self, angle_deg: f64) {
        let mut st = self.inner.state.lock();
        st.homed = true;
        st.last_known_angle_deg = angle_deg;
    }

    /// 目标角度检查 + 换算
    fn check_target(&self, target: Deg) -> Result<i64, JointError> {
        let cfg = &self.inner.config;
        let st = self.inner.state.lock();
        if !st.is_homing {
            if !st.homed {
                return Err(JointError::NotHomed { joint: cfg.name });
            }
            if !cfg.in_range(target.0) {
                return Err(JointError::OutOfRange {
                    joint: cfg.name,
                    target: target.0,
                    min: cfg.min_deg,
                    max: cfg.max_deg,
                });
            }
        }
        Ok(cfg.deg_to_steps(target.0))
    }

    /// 零步围栏：排干排队中的完成回报
    fn fence(&self) -> Result<(), JointError> {
        let future = self.inner.gateway.step_relative(self.inner.config.device_index, 0)?;
        future.wait()?;
        Ok(())
    }

    /// 相对移动（回零内部用，不取 stop_gate、不做行程检查）
    fn rotate_raw_by(&self, delta_deg: f64) -> Result<i64, JointError> {
        let cfg = &self.inner.config;
        let future = self
            .inner
            .gateway
            .step_relative(cfg.device_index, cfg.deg_to_steps(delta_deg))?;
        Ok(future.wait()?)
    }

    fn home_cycle(&self) -> Result<(), JointError> {
        let cfg = &self.inner.config;
        let joint = cfg.name;

        // PreCheck：开机压在开关上时先退开，再重新进入
        while self.inner.state.lock().home_switch_active {
            debug!(%joint, "switch active before seek, backing off");
            self.rotate_raw_by(PRECHECK_BACKOFF_DEG * -cfg.homing_direction.sign())?;
        }

        // SeekLimit：匀速寻找限位，行程覆盖全范围加余量。
        // 限位触发时开关监视线程用停止流程打断，寻找等待由围栏回报唤醒。
        self.set_speed(cfg.homing_speed_deg_per_s)?;
        self.set_acceleration(0.0)?;
        debug!(%joint, seek_deg = cfg.homing_seek_deg(), "seeking limit switch");
        let seek = self.rotate_raw_by(cfg.homing_seek_deg());

        // 等待可能仍在进行的停止流程收尾，再恢复运行参数
        drop(self.inner.stop_gate.lock());
        self.set_speed(cfg.max_speed_deg_per_s)?;
        self.set_acceleration(cfg.max_accel_deg_per_s2)?;
        seek?;

        if !self.inner.state.lock().home_switch_active {
            return Err(JointError::HomingFailed {
                joint,
                reason: "travel exceeded, switch not hit",
            });
        }

        // Settle：消抖 + 机械沉降，然后用标定偏置拉回零位并清计数器
        thread::sleep(SETTLE);
        self.rotate_raw_by(cfg.homing_calibration_move_deg())?;
        self.inner.gateway.zero(cfg.device_index)?;
        {
            let mut st = self.inner.state.lock();
            st.last_known_angle_deg = 0.0;
            st.homed = true;
        }
        Ok(())
    }
}
