//! 限位开关输入
//!
//! 每个关节一路数字输入（内部上拉，闭合拉低）。消抖与边沿检测由外部输入
//! 库完成，本 crate 只消费它交付的事件流。

use crossbeam_channel::{Receiver, Sender};

/// 限位开关边沿事件（已消抖）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchEvent {
    /// 开关闭合
    Press,
    /// 开关断开
    Release,
}

/// 建立一条开关事件通道
///
/// 发送端交给边沿检测库（或测试脚本），接收端交给
/// [`JointController::attach_switch`](crate::joint::JointController::attach_switch)。
pub fn switch_channel() -> (Sender<SwitchEvent>, Receiver<SwitchEvent>) {
    crossbeam_channel::unbounded()
}
