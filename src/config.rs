//! 静态关节配置
//!
//! 每个关节一份 `JointConfig`（引脚、减速比、行程、回零方向等），六份合成
//! `ArmConfig`。所有校验在构造期完成；配置文件的加载由上层负责。

use crate::types::{Deg, Joint, JointArray};
use thiserror::Error;

/// 配置错误（构造期检测）
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 行程区间非法（要求 min < max）
    #[error("{joint}: invalid range [{min}, {max}] (min must be < max)")]
    InvalidRange { joint: Joint, min: f64, max: f64 },

    /// 就绪位不在行程内
    #[error("{joint}: ready position {ready} outside range [{min}, {max}]")]
    ReadyOutOfRange {
        joint: Joint,
        ready: f64,
        min: f64,
        max: f64,
    },

    /// 每圈步数非法
    #[error("{joint}: steps_per_rev must be positive, got {steps_per_rev}")]
    InvalidStepsPerRev { joint: Joint, steps_per_rev: u32 },

    /// 速度/加速度非法
    #[error("{joint}: invalid {what}: {value}")]
    InvalidRate {
        joint: Joint,
        what: &'static str,
        value: f64,
    },

    /// 回零速度超过最大速度
    #[error("{joint}: homing speed {homing} exceeds max speed {max}")]
    HomingSpeedTooHigh { joint: Joint, homing: f64, max: f64 },

    /// 设备号与关节不符或重复
    #[error("{joint}: invalid device index {device}")]
    InvalidDeviceIndex { joint: Joint, device: u8 },
}

/// 回零方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HomingDirection {
    /// 向行程正端寻找限位
    Positive,
    /// 向行程负端寻找限位
    Negative,
}

impl HomingDirection {
    /// 方向符号（+1.0 / -1.0）
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            HomingDirection::Positive => 1.0,
            HomingDirection::Negative => -1.0,
        }
    }
}

/// 单关节静态配置（不可变）
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointConfig {
    /// 关节名
    pub name: Joint,
    /// AccelStepper 设备号（0-5，与关节索引一致）
    pub device_index: u8,
    /// 步进脉冲引脚
    pub step_pin: u8,
    /// 方向引脚
    pub dir_pin: u8,
    /// 限位开关输入引脚（内部上拉，闭合时拉低）
    pub home_switch_pin: u8,
    /// 输出轴每圈步数（含细分与减速比）
    pub steps_per_rev: u32,
    /// 最大速度（度/秒）
    pub max_speed_deg_per_s: f64,
    /// 最大加速度（度/秒²）
    pub max_accel_deg_per_s2: f64,
    /// 回零寻找速度（度/秒，不超过最大速度）
    pub homing_speed_deg_per_s: f64,
    /// 回零方向
    pub homing_direction: HomingDirection,
    /// 行程下限（度）
    pub min_deg: f64,
    /// 行程上限（度）
    pub max_deg: f64,
    /// 就绪位（度，必须在行程内）
    pub ready_position_deg: f64,
    /// 标定偏置（度，出厂逐台微调）
    pub calibration_offset_deg: f64,
}

impl JointConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_deg >= self.max_deg {
            return Err(ConfigError::InvalidRange {
                joint: self.name,
                min: self.min_deg,
                max: self.max_deg,
            });
        }
        if self.steps_per_rev == 0 {
            return Err(ConfigError::InvalidStepsPerRev {
                joint: self.name,
                steps_per_rev: self.steps_per_rev,
            });
        }
        if !(self.max_speed_deg_per_s > 0.0) {
            return Err(ConfigError::InvalidRate {
                joint: self.name,
                what: "max speed",
                value: self.max_speed_deg_per_s,
            });
        }
        if !(self.max_accel_deg_per_s2 >= 0.0) {
            return Err(ConfigError::InvalidRate {
                joint: self.name,
                what: "max acceleration",
                value: self.max_accel_deg_per_s2,
            });
        }
        if !(self.homing_speed_deg_per_s > 0.0) {
            return Err(ConfigError::InvalidRate {
                joint: self.name,
                what: "homing speed",
                value: self.homing_speed_deg_per_s,
            });
        }
        if self.homing_speed_deg_per_s > self.max_speed_deg_per_s {
            return Err(ConfigError::HomingSpeedTooHigh {
                joint: self.name,
                homing: self.homing_speed_deg_per_s,
                max: self.max_speed_deg_per_s,
            });
        }
        if self.ready_position_deg < self.min_deg || self.ready_position_deg > self.max_deg {
            return Err(ConfigError::ReadyOutOfRange {
                joint: self.name,
                ready: self.ready_position_deg,
                min: self.min_deg,
                max: self.max_deg,
            });
        }
        if self.device_index as usize != self.name.index() {
            return Err(ConfigError::InvalidDeviceIndex {
                joint: self.name,
                device: self.device_index,
            });
        }
        Ok(())
    }

    /// 每度步数
    #[inline]
    pub fn steps_per_deg(&self) -> f64 {
        self.steps_per_rev as f64 / 360.0
    }

    /// 度 → 步（就近取整）
    ///
    /// 换算在浮点域完成，只在发送前取整一次。
    #[inline]
    pub fn deg_to_steps(&self, deg: f64) -> i64 {
        (deg * self.steps_per_deg()).round() as i64
    }

    /// 步 → 度
    ///
    /// `last_known_angle_deg` 始终从微控制器返回的整数步数反算，避免累积漂移。
    #[inline]
    pub fn steps_to_deg(&self, steps: i64) -> f64 {
        steps as f64 / self.steps_per_deg()
    }

    /// 一步对应的角度（取整精度判定用）
    #[inline]
    pub fn one_step_deg(&self) -> f64 {
        360.0 / self.steps_per_rev as f64
    }

    /// 目标角度是否在行程内
    #[inline]
    pub fn in_range(&self, deg: f64) -> bool {
        deg >= self.min_deg && deg <= self.max_deg
    }

    /// 回零寻找行程（度，带方向），覆盖全行程再加 5° 余量
    pub fn homing_seek_deg(&self) -> f64 {
        (self.min_deg.abs() + self.max_deg.abs() + 5.0) * self.homing_direction.sign()
    }

    /// 回零标定移动量（度）：把触发限位的位置拉回标定后的零位
    pub fn homing_calibration_move_deg(&self) -> f64 {
        match self.homing_direction {
            HomingDirection::Negative => -self.min_deg + self.calibration_offset_deg,
            HomingDirection::Positive => -self.max_deg + self.calibration_offset_deg,
        }
    }
}

/// 整机配置：六个关节
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArmConfig {
    pub joints: JointArray<JointConfig>,
}

impl ArmConfig {
    /// 校验所有关节配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        for cfg in self.joints.iter() {
            cfg.validate()?;
        }
        Ok(())
    }

    /// 各关节最大速度（度/秒）
    pub fn max_speeds(&self) -> JointArray<f64> {
        self.joints.clone().map(|c| c.max_speed_deg_per_s)
    }

    /// 各关节行程
    pub fn ranges(&self) -> JointArray<(f64, f64)> {
        self.joints.clone().map(|c| (c.min_deg, c.max_deg))
    }

    /// 就绪位姿（关节角）
    pub fn ready_positions(&self) -> JointArray<Deg> {
        self.joints.clone().map(|c| Deg(c.ready_position_deg))
    }
}

impl Default for ArmConfig {
    /// Atlas A6 出厂配置
    fn default() -> Self {
        let table = [
            // (joint, step, dir, switch, steps/rev, vmax, amax, vhome, dir, min, max, ready, calib)
            (Joint::J1, 2u8, 3u8, 22u8, 16_000u32, 20.0, 10.0, 5.0, HomingDirection::Negative, -170.0, 170.0, 0.0, -1.2),
            (Joint::J2, 4, 5, 23, 20_000, 15.0, 10.0, 4.0, HomingDirection::Negative, -42.0, 90.0, 0.0, 0.4),
            (Joint::J3, 6, 7, 24, 20_000, 15.0, 10.0, 4.0, HomingDirection::Positive, -89.0, 52.0, 0.0, -0.6),
            (Joint::J4, 8, 9, 25, 16_000, 25.0, 20.0, 8.0, HomingDirection::Negative, -165.0, 165.0, 0.0, 0.0),
            (Joint::J5, 10, 11, 26, 8_000, 25.0, 20.0, 8.0, HomingDirection::Negative, -105.0, 105.0, 90.0, 0.9),
            (Joint::J6, 12, 13, 27, 8_000, 30.0, 30.0, 10.0, HomingDirection::Negative, -155.0, 155.0, 0.0, 0.0),
        ];
        ArmConfig {
            joints: JointArray::new(table.map(
                |(name, step_pin, dir_pin, home_switch_pin, steps_per_rev, vmax, amax, vhome, homing_direction, min_deg, max_deg, ready, calib)| {
                    JointConfig {
                        name,
                        device_index: name.index() as u8,
                        step_pin,
                        dir_pin,
                        home_switch_pin,
                        steps_per_rev,
                        max_speed_deg_per_s: vmax,
                        max_accel_deg_per_s2: amax,
                        homing_speed_deg_per_s: vhome,
                        homing_direction,
                        min_deg,
                        max_deg,
                        ready_position_deg: ready,
                        calibration_offset_deg: calib,
                    }
                },
            )),
        }
    }
}
