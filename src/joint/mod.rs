//! 关节层：单轴控制单元
//!
//! - [`state`]: 运行时状态
//! - [`controller`]: 控制器（运动、停止流程、回零状态机）

pub mod controller;
pub mod state;

pub use controller::{JointController, JointError};
pub use state::JointState;
