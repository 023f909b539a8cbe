//! 串口传输抽象
//!
//! 到微控制器的串口链路由上层提供（打开、波特率、重连都不在本 crate 职责
//! 内），网关只通过本 trait 收发原始字节。

use thiserror::Error;

/// 传输层错误
#[derive(Error, Debug)]
pub enum TransportError {
    /// IO 底层错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 读取超时（非致命，可以重试）
    #[error("Read timeout")]
    Timeout,

    /// 链路已关闭（致命）
    #[error("Transport closed")]
    Closed,
}

/// 串口传输 Trait
///
/// 语义（与网关 IO 线程的轮询循环配套）：
/// - `send()`: 把字节写入链路，写入成功即返回
/// - `receive()`: 阻塞直到收到任意一段字节或超时；超时必须返回
///   [`TransportError::Timeout`]，否则网关无法退出
///
/// 字节流不保证按帧切分，SysEx 组帧由网关内部完成。
pub trait Transport: Send {
    /// 发送一段字节
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// 接收一段字节（带内部超时）
    fn receive(&mut self) -> Result<Vec<u8>, TransportError>;
}
