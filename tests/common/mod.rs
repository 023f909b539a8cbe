//! 集成测试基础设施
//!
//! `ScriptedFirmware` 模拟运行 AccelStepper 的微控制器：维护每台设备的
//! 位置计数器，可按设备"挂起"运动（不自动完成），由测试脚本推进位置、
//! 触发限位，复现回零中断等时序。

use atlas_sdk::firmata::messages::{
    self, ACCELSTEPPER_DATA, END_SYSEX, START_SYSEX, STEPPER_CONFIG, STEPPER_MOVE_COMPLETE,
    STEPPER_REPORT_POSITION, STEPPER_SET_ACCELERATION, STEPPER_SET_SPEED, STEPPER_STEP,
    STEPPER_STOP, STEPPER_TO, STEPPER_ZERO,
};
use atlas_sdk::firmata::{Transport, TransportError};
use atlas_sdk::switch::SwitchEvent;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 已解析的下行命令（到达顺序）
#[derive(Debug, Clone, PartialEq)]
pub enum FwCommand {
    Config,
    Zero,
    Step(i64),
    StepTo(i64),
    Stop,
    Report,
    SetSpeed(f64),
    SetAcceleration(f64),
}

#[derive(Debug, Clone)]
pub struct LoggedCommand {
    pub device: u8,
    pub command: FwCommand,
}

/// 挂起中的运动
#[derive(Debug, Clone, Copy)]
pub struct PendingMove {
    pub from: i64,
    pub target: i64,
}

#[derive(Default)]
struct Inner {
    positions: [i64; 6],
    held: [bool; 6],
    pending: [Option<PendingMove>; 6],
    replies: VecDeque<Vec<u8>>,
    log: Vec<LoggedCommand>,
}

impl Inner {
    fn reply(&mut self, kind: u8, device: u8) {
        let mut frame = vec![START_SYSEX, ACCELSTEPPER_DATA, kind, device];
        frame.extend_from_slice(&messages::encode_i32(self.positions[device as usize] as i32));
        frame.push(END_SYSEX);
        self.replies.push_back(frame);
    }
}

/// 脚本化假固件
#[derive(Clone, Default)]
pub struct ScriptedFirmware {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedFirmware {
    pub fn new() -> Self {
        Self::default()
    }

    /// 挂起设备：后续运动命令只登记不完成（零步命令除外）
    pub fn hold(&self, device: u8) {
        self.inner.lock().held[device as usize] = true;
    }

    /// 解除挂起（已登记的运动保持挂起，直到 stop 丢弃）
    pub fn release(&self, device: u8) {
        self.inner.lock().held[device as usize] = false;
    }

    pub fn position(&self, device: u8) -> i64 {
        self.inner.lock().positions[device as usize]
    }

    pub fn set_position(&self, device: u8, steps: i64) {
        self.inner.lock().positions[device as usize] = steps;
    }

    pub fn pending(&self, device: u8) -> Option<PendingMove> {
        self.inner.lock().pending[device as usize]
    }

    /// 把挂起中的运动推进到终点并回报完成
    pub fn complete_pending(&self, device: u8) {
        let mut inner = self.inner.lock();
        if let Some(pending) = inner.pending[device as usize].take() {
            inner.positions[device as usize] = pending.target;
            inner.reply(STEPPER_MOVE_COMPLETE, device);
        }
    }

    pub fn log(&self) -> Vec<LoggedCommand> {
        self.inner.lock().log.clone()
    }

    /// 清空命令日志（阶段性断言用）
    pub fn clear_log(&self) {
        self.inner.lock().log.clear();
    }

    /// 某设备的运动命令计数（step / stepTo）
    pub fn motion_count(&self, device: u8) -> usize {
        self.log()
            .iter()
            .filter(|c| c.device == device)
            .filter(|c| matches!(c.command, FwCommand::Step(_) | FwCommand::StepTo(_)))
            .count()
    }
}

impl Transport for ScriptedFirmware {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        let subcmd = bytes[2];
        let device = bytes[3];
        let idx = device as usize;
        let command = match subcmd {
            STEPPER_CONFIG => FwCommand::Config,
            STEPPER_ZERO => {
                inner.positions[idx] = 0;
                FwCommand::Zero
            }
            STEPPER_STEP | STEPPER_TO => {
                let raw: [u8; 5] = bytes[4..9].try_into().unwrap();
                let value = messages::decode_i32(&raw) as i64;
                let from = inner.positions[idx];
                let target = if subcmd == STEPPER_STEP { from + value } else { value };
                if value == 0 && subcmd == STEPPER_STEP {
                    // 零步围栏：即使设备挂起也立即完成
                    inner.reply(STEPPER_MOVE_COMPLETE, device);
                } else if inner.held[idx] {
                    inner.pending[idx] = Some(PendingMove { from, target });
                } else {
                    inner.positions[idx] = target;
                    inner.reply(STEPPER_MOVE_COMPLETE, device);
                }
                if subcmd == STEPPER_STEP {
                    FwCommand::Step(value)
                } else {
                    FwCommand::StepTo(value)
                }
            }
            STEPPER_STOP => {
                // 在途运动被丢弃，不补发完成回报
                inner.pending[idx] = None;
                FwCommand::Stop
            }
            STEPPER_REPORT_POSITION => {
                inner.reply(STEPPER_REPORT_POSITION, device);
                FwCommand::Report
            }
            STEPPER_SET_SPEED => {
                let raw: [u8; 4] = bytes[4..8].try_into().unwrap();
                FwCommand::SetSpeed(messages::decode_custom_float(&raw))
            }
            STEPPER_SET_ACCELERATION => {
                let raw: [u8; 4] = bytes[4..8].try_into().unwrap();
                FwCommand::SetAcceleration(messages::decode_custom_float(&raw))
            }
            other => panic!("unexpected subcommand 0x{other:02X}"),
        };
        inner.log.push(LoggedCommand { device, command });
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        match self.inner.lock().replies.pop_front() {
            Some(frame) => Ok(frame),
            None => {
                std::thread::sleep(Duration::from_millis(1));
                Err(TransportError::Timeout)
            }
        }
    }
}

/// 轮询直到谓词成立或超时
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// 模拟一组限位开关
///
/// 监视各设备挂起中的寻零运动；行程推进到 `fraction` 时把位置计数器推到
/// 对应值、发出 `Press`，随后解除该设备挂起（后续标定移动自动完成）。
pub fn spawn_switch_simulator(
    firmware: ScriptedFirmware,
    senders: Vec<(u8, Sender<SwitchEvent>)>,
    fraction: f64,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut triggered = [false; 6];
        let deadline = Instant::now() + Duration::from_secs(30);
        while Instant::now() < deadline {
            let all_done = senders.iter().all(|(d, _)| triggered[*d as usize]);
            if all_done {
                return;
            }
            for (device, sender) in &senders {
                let idx = *device as usize;
                if triggered[idx] {
                    continue;
                }
                if let Some(pending) = firmware.pending(*device) {
                    let travelled =
                        pending.from + ((pending.target - pending.from) as f64 * fraction) as i64;
                    firmware.set_position(*device, travelled);
                    triggered[idx] = true;
                    sender.send(SwitchEvent::Press).expect("switch channel open");
                    firmware.release(*device);
                }
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    })
}
