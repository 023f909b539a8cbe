//! 线路层：Firmata AccelStepper 协议与步进网关
//!
//! - [`messages`]: SysEx 报文编解码
//! - [`transport`]: 串口传输抽象（由上层提供实现）
//! - [`gateway`]: 后台 IO 线程 + 完成分发

pub mod gateway;
pub mod messages;
pub mod transport;

pub use gateway::{GatewayError, PositionHook, StepFuture, StepperGateway};
pub use transport::{Transport, TransportError};
