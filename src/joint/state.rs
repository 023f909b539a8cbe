//! 单关节运行时状态

/// 关节可变状态
///
/// 不变式：
/// - `homed == true` 时 `last_known_angle_deg` 落在行程内（步进取整窗口内
///   允许一步以内的越界）
/// - `is_homing == true` 时行程检查被旁路
#[derive(Debug, Clone, Default)]
pub struct JointState {
    /// 回零完成
    pub homed: bool,
    /// 回零进行中（旁路行程检查）
    pub is_homing: bool,
    /// 限位开关当前闭合
    pub home_switch_active: bool,
    /// 当前速度（度/秒）
    pub current_speed_deg_per_s: f64,
    /// 当前加速度（度/秒²）
    pub current_accel_deg_per_s2: f64,
    /// 最近一次已知角度（度）
    ///
    /// 只在运动完成或位置回报时从微控制器的整数步数反算。
    pub last_known_angle_deg: f64,
}
