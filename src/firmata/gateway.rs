//! 步进网关
//!
//! 对外提供 AccelStepper 的八个操作（configure / speed / accel / step /
//! stepTo / stop / reportPosition / zero），封装后台 IO 线程与完成回报的
//! 分发细节。网关是唯一接触传输层的组件，所有写入经命令队列串行化。
//!
//! # 完成分发
//!
//! 每个设备一个槽位：携带位置的回报（运动完成 0x0A、位置回报 0x06）先调用
//! 该设备注册的状态钩子，再唤醒该设备**全部**挂起的等待者。停止流程依赖
//! 这一点：被 `stop` 打断的运动不会再收到自己的完成回报，其等待者由随后
//! 零步围栏的完成统一唤醒。
//!
//! # 失效语义
//!
//! 传输层致命错误后网关进入永久 down 状态：所有挂起等待者收到
//! [`GatewayError::Down`]，后续命令直接拒绝。网关不做重试。

use crate::firmata::messages::{self, ReplyKind};
use crate::firmata::transport::{Transport, TransportError};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// 网关错误
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 网关已失效（传输层致命错误后的永久状态）
    #[error("Gateway down")]
    Down,

    /// 等待完成超时
    #[error("Completion timeout")]
    Timeout,

    /// 步数超出线路协议的 32 位表示
    #[error("Step count {0} outside wire range")]
    StepsOutOfRange(i64),
}

/// 位置回报钩子：IO 线程收到任何携带位置的回报时调用
pub type PositionHook = Box<dyn Fn(i64) + Send + Sync>;

/// 完成句柄
///
/// 在微控制器回报到达时解析为绝对步数。网关失效时解析为
/// [`GatewayError::Down`]。
#[derive(Debug)]
pub struct StepFuture {
    rx: Receiver<Result<i64, GatewayError>>,
}

impl StepFuture {
    /// 阻塞等待完成，返回绝对步数
    pub fn wait(self) -> Result<i64, GatewayError> {
        match self.rx.recv() {
            Ok(result) => result,
            // 发送端随 IO 线程一起消失
            Err(_) => Err(GatewayError::Down),
        }
    }

    /// 带超时的等待
    pub fn wait_timeout(self, timeout: Duration) -> Result<i64, GatewayError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(GatewayError::Timeout),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(GatewayError::Down),
        }
    }
}

#[derive(Default)]
struct DeviceSlot {
    waiters: Mutex<Vec<Sender<Result<i64, GatewayError>>>>,
    hook: Mutex<Option<PositionHook>>,
}

impl DeviceSlot {
    /// 分发一个位置：先钩子，后唤醒全部等待者
    fn deliver(&self, position: i64) {
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(position);
        }
        for waiter in self.waiters.lock().drain(..) {
            // 等待者可能已放弃（fire-and-forget），忽略发送失败
            let _ = waiter.send(Ok(position));
        }
    }

    /// 网关失效时的兜底
    fn fail_all(&self) {
        for waiter in self.waiters.lock().drain(..) {
            let _ = waiter.send(Err(GatewayError::Down));
        }
    }
}

/// 步进网关（对外 API）
pub struct StepperGateway {
    /// 命令发送通道（向 IO 线程发送已编码的报文）
    ///
    /// Drop 时需要**提前关闭通道**（在 join IO 线程之前），否则 IO 循环
    /// 可能永远收不到 `Disconnected` 而导致退出卡住。
    cmd_tx: ManuallyDrop<Sender<Vec<u8>>>,
    slots: Arc<[DeviceSlot; 6]>,
    down: Arc<AtomicBool>,
    io_thread: Option<JoinHandle<()>>,
}

impl StepperGateway {
    /// 创建网关并启动 IO 线程
    ///
    /// `transport` 被移动进 IO 线程；其 `receive()` 必须带内部超时。
    pub fn new(transport: impl Transport + 'static) -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(32);
        let slots: Arc<[DeviceSlot; 6]> = Arc::new(Default::default());
        let down = Arc::new(AtomicBool::new(false));

        let slots_clone = slots.clone();
        let down_clone = down.clone();
        let io_thread = spawn(move || {
            io_loop(transport, cmd_rx, slots_clone, down_clone);
        });

        StepperGateway {
            cmd_tx: ManuallyDrop::new(cmd_tx),
            slots,
            down,
            io_thread: Some(io_thread),
        }
    }

    /// 网关是否已失效
    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::Acquire)
    }

    /// 注册设备的位置回报钩子（每设备一个，重复注册覆盖）
    pub fn set_position_hook(&self, device: u8, hook: PositionHook) {
        *self.slot(device).hook.lock() = Some(hook);
    }

    /// 一次性配置：step/dir 两线驱动
    pub fn configure_stepper(
        &self,
        device: u8,
        step_pin: u8,
        dir_pin: u8,
    ) -> Result<(), GatewayError> {
        self.send_cmd(messages::configure(device, step_pin, dir_pin))
    }

    /// 设置速度（步/秒），fire-and-forget
    pub fn set_speed(&self, device: u8, steps_per_s: f64) -> Result<(), GatewayError> {
        self.send_cmd(messages::set_speed(device, steps_per_s))
    }

    /// 设置加速度（步/秒²），fire-and-forget
    pub fn set_acceleration(&self, device: u8, steps_per_s2: f64) -> Result<(), GatewayError> {
        self.send_cmd(messages::set_acceleration(device, steps_per_s2))
    }

    /// 相对步进；完成回报到达时句柄解析为绝对步数
    ///
    /// `steps = 0` 也会得到完成回报，是停止流程使用的围栏原语。
    pub fn step_relative(&self, device: u8, steps: i64) -> Result<StepFuture, GatewayError> {
        let steps = wire_steps(steps)?;
        let future = self.register_waiter(device);
        self.send_cmd(messages::step(device, steps))?;
        Ok(future)
    }

    /// 绝对步进
    pub fn step_to(&self, device: u8, position: i64) -> Result<StepFuture, GatewayError> {
        let position = wire_steps(position)?;
        let future = self.register_waiter(device);
        self.send_cmd(messages::step_to(device, position))?;
        Ok(future)
    }

    /// 绝对步进，不注册等待者
    ///
    /// 轨迹流式重定向专用：50Hz 的逐拍命令不等待完成，由固件优雅重定向，
    /// 最终完成回报仍会走状态钩子。
    pub fn step_to_nowait(&self, device: u8, position: i64) -> Result<(), GatewayError> {
        let position = wire_steps(position)?;
        self.send_cmd(messages::step_to(device, position))
    }

    /// 停止步进
    ///
    /// 不会为在途运动补发完成回报；在途等待者由随后的零步围栏唤醒。
    pub fn stop(&self, device: u8) -> Result<(), GatewayError> {
        self.send_cmd(messages::stop(device))
    }

    /// 查询绝对位置
    pub fn report_position(&self, device: u8) -> Result<StepFuture, GatewayError> {
        let future = self.register_waiter(device);
        self.send_cmd(messages::report_position(device))?;
        Ok(future)
    }

    /// 微控制器侧位置计数器清零
    pub fn zero(&self, device: u8) -> Result<(), GatewayError> {
        self.send_cmd(messages::zero(device))
    }

    fn slot(&self, device: u8) -> &DeviceSlot {
        &self.slots[device as usize]
    }

    /// 先注册等待者再发命令，避免错过早到的回报
    fn register_waiter(&self, device: u8) -> StepFuture {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.slot(device).waiters.lock().push(tx);
        StepFuture { rx }
    }

    fn send_cmd(&self, bytes: Vec<u8>) -> Result<(), GatewayError> {
        if self.is_down() {
            return Err(GatewayError::Down);
        }
        self.cmd_tx.send(bytes).map_err(|_| GatewayError::Down)
    }
}

impl Drop for StepperGateway {
    fn drop(&mut self) {
        // 先关闭命令通道，IO 循环在下一次排空时退出
        unsafe { ManuallyDrop::drop(&mut self.cmd_tx) };
        if let Some(handle) = self.io_thread.take()
            && handle.join().is_err()
        {
            error!("Gateway IO thread panicked");
        }
    }
}

fn wire_steps(steps: i64) -> Result<i32, GatewayError> {
    i32::try_from(steps).map_err(|_| GatewayError::StepsOutOfRange(steps))
}

/// IO 线程循环
///
/// 轮询传输层（带超时），把收到的字节组帧、解析、按设备号分发；每轮非阻塞
/// 排空命令队列写入传输层。传输层致命错误 → 标记 down、兜底全部等待者、
/// 退出。
fn io_loop(
    mut transport: impl Transport,
    cmd_rx: Receiver<Vec<u8>>,
    slots: Arc<[DeviceSlot; 6]>,
    down: Arc<AtomicBool>,
) {
    let mut parser = messages::SysexParser::new();

    let shutdown = |slots: &[DeviceSlot; 6], down: &AtomicBool, fatal: bool| {
        if fatal {
            down.store(true, Ordering::Release);
        }
        for slot in slots.iter() {
            slot.fail_all();
        }
    };

    loop {
        match transport.receive() {
            Ok(chunk) => {
                for byte in chunk {
                    let Some(frame) = parser.feed(byte) else {
                        continue;
                    };
                    match messages::parse_reply(&frame) {
                        Some(reply) if (reply.device as usize) < slots.len() => {
                            trace!(
                                device = reply.device,
                                position = reply.position,
                                kind = ?reply.kind,
                                "stepper reply"
                            );
                            if reply.kind == ReplyKind::MoveComplete
                                || reply.kind == ReplyKind::Position
                            {
                                slots[reply.device as usize].deliver(reply.position as i64);
                            }
                        }
                        Some(reply) => {
                            warn!(device = reply.device, "reply for unknown device");
                        }
                        None => {
                            trace!(len = frame.len(), "ignoring non-stepper sysex");
                        }
                    }
                }
            }
            Err(TransportError::Timeout) => {
                // 超时是正常情况，落到命令排空
            }
            Err(e) => {
                error!("Transport failure, gateway going down: {e}");
                shutdown(&slots, &down, true);
                return;
            }
        }

        // 非阻塞排空命令队列
        loop {
            match cmd_rx.try_recv() {
                Ok(bytes) => {
                    if let Err(e) = transport.send(&bytes) {
                        error!("Transport write failure, gateway going down: {e}");
                        shutdown(&slots, &down, true);
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Command channel closed, gateway IO thread exiting");
                    shutdown(&slots, &down, false);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmata::messages::{
        ACCELSTEPPER_DATA, END_SYSEX, START_SYSEX, STEPPER_MOVE_COMPLETE, encode_i32,
    };
    use parking_lot::Mutex as PlMutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    /// 测试用传输层：预置接收队列 + 记录发送的字节
    #[derive(Clone, Default)]
    struct MockTransport {
        inner: Arc<PlMutex<MockTransportInner>>,
    }

    #[derive(Default)]
    struct MockTransportInner {
        receive_queue: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
        fail_next_send: bool,
    }

    impl MockTransport {
        fn queue_reply(&self, device: u8, position: i32) {
            let mut frame = vec![START_SYSEX, ACCELSTEPPER_DATA, STEPPER_MOVE_COMPLETE, device];
            frame.extend_from_slice(&encode_i32(position));
            frame.push(END_SYSEX);
            self.inner.lock().receive_queue.push_back(frame);
        }

        fn sent_frames(&self) -> Vec<Vec<u8>> {
            self.inner.lock().sent.clone()
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            let mut inner = self.inner.lock();
            if inner.fail_next_send {
                return Err(TransportError::Closed);
            }
            inner.sent.push(bytes.to_vec());
            Ok(())
        }

        fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
            match self.inner.lock().receive_queue.pop_front() {
                Some(chunk) => Ok(chunk),
                None => {
                    // 模拟带超时的阻塞读
                    std::thread::sleep(Duration::from_millis(1));
                    Err(TransportError::Timeout)
                }
            }
        }
    }

    #[test]
    fn test_step_future_resolves_on_completion() {
        let transport = MockTransport::default();
        let gateway = StepperGateway::new(transport.clone());

        let future = gateway.step_relative(2, 4000).unwrap();
        transport.queue_reply(2, 4000);

        assert_eq!(future.wait_timeout(Duration::from_secs(1)).unwrap(), 4000);
    }

    #[test]
    fn test_zero_step_fence_resolves() {
        let transport = MockTransport::default();
        let gateway = StepperGateway::new(transport.clone());

        let future = gateway.step_relative(0, 0).unwrap();
        transport.queue_reply(0, 123);
        assert_eq!(future.wait_timeout(Duration::from_secs(1)).unwrap(), 123);
    }

    #[test]
    fn test_completion_wakes_all_waiters() {
        // 被 stop 打断的运动等待者与围栏等待者由同一条回报唤醒
        let transport = MockTransport::default();
        let gateway = StepperGateway::new(transport.clone());

        let interrupted = gateway.step_relative(1, 10_000).unwrap();
        gateway.stop(1).unwrap();
        let fence = gateway.step_relative(1, 0).unwrap();

        transport.queue_reply(1, 3777);
        assert_eq!(interrupted.wait_timeout(Duration::from_secs(1)).unwrap(), 3777);
        assert_eq!(fence.wait_timeout(Duration::from_secs(1)).unwrap(), 3777);
    }

    #[test]
    fn test_completions_demultiplexed_by_device() {
        let transport = MockTransport::default();
        let gateway = StepperGateway::new(transport.clone());

        let f0 = gateway.step_relative(0, 100).unwrap();
        let f5 = gateway.step_relative(5, 200).unwrap();

        transport.queue_reply(5, 200);
        transport.queue_reply(0, 100);

        assert_eq!(f5.wait_timeout(Duration::from_secs(1)).unwrap(), 200);
        assert_eq!(f0.wait_timeout(Duration::from_secs(1)).unwrap(), 100);
    }

    #[test]
    fn test_position_hook_called() {
        let transport = MockTransport::default();
        let gateway = StepperGateway::new(transport.clone());

        let seen = Arc::new(PlMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        gateway.set_position_hook(
            3,
            Box::new(move |pos| {
                seen_clone.lock().push(pos);
            }),
        );

        let future = gateway.step_to(3, -500).unwrap();
        transport.queue_reply(3, -500);
        future.wait_timeout(Duration::from_secs(1)).unwrap();

        assert_eq!(*seen.lock(), vec![-500]);
    }

    #[test]
    fn test_transport_failure_is_terminal() {
        let transport = MockTransport::default();
        transport.inner.lock().fail_next_send = true;
        let gateway = StepperGateway::new(transport.clone());

        let future = gateway.step_relative(0, 10).unwrap();
        assert!(matches!(
            future.wait_timeout(Duration::from_secs(1)),
            Err(GatewayError::Down)
        ));

        // down 是永久状态
        std::thread::sleep(Duration::from_millis(20));
        assert!(gateway.is_down());
        assert!(matches!(gateway.stop(0), Err(GatewayError::Down)));
    }

    #[test]
    fn test_commands_serialized_in_order() {
        let transport = MockTransport::default();
        let gateway = StepperGateway::new(transport.clone());

        gateway.set_speed(0, 100.0).unwrap();
        gateway.set_acceleration(0, 50.0).unwrap();
        gateway.stop(0).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let sent = transport.sent_frames();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0][2], crate::firmata::messages::STEPPER_SET_SPEED);
        assert_eq!(sent[1][2], crate::firmata::messages::STEPPER_SET_ACCELERATION);
        assert_eq!(sent[2][2], crate::firmata::messages::STEPPER_STOP);
    }

    #[test]
    fn test_steps_outside_wire_range_rejected() {
        let transport = MockTransport::default();
        let gateway = StepperGateway::new(transport);
        assert!(matches!(
            gateway.step_relative(0, i64::from(i32::MAX) + 1),
            Err(GatewayError::StepsOutOfRange(_))
        ));
    }
}
