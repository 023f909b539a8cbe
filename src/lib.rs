//! Atlas SDK - Atlas A6 机械臂 Rust SDK
//!
//! 主机侧控制核心：六轴步进机械臂由运行 Firmata AccelStepper 子系统的
//! 微控制器执行底层步进，主机负责电机生命周期、回零状态机、行程保护、
//! 运动学以及笛卡尔直线轨迹。
//!
//! # 架构层次
//!
//! - **线路层** (`firmata`): AccelStepper 线路协议编解码 + 后台 IO 线程
//! - **关节层** (`joint`, `switch`): 单轴状态机（回零、行程保护、停止流程）
//! - **运动学** (`kinematics`): DH 链正运动学 + 球腕解析逆运动学
//! - **协调层** (`robot`): moveJ / moveL / home / halt 与位姿查询

pub mod config;
pub mod firmata;
pub mod joint;
pub mod kinematics;
pub mod robot;
pub mod switch;
pub mod types;

// Re-export 核心类型（简化用户导入）
pub use config::{ArmConfig, ConfigError, HomingDirection, JointConfig};
pub use firmata::{GatewayError, StepperGateway, Transport, TransportError};
pub use joint::{JointController, JointError};
pub use kinematics::{KinematicsEngine, KinematicsError, Pose, WristConfig};
pub use robot::{Robot, RobotError};
pub use switch::SwitchEvent;
pub use types::{Deg, Joint, JointArray, Rad};
