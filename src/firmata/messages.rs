//! AccelStepper 线路协议编解码
//!
//! Firmata AccelStepper 子系统的 SysEx 报文：配置、调速、调加速度、相对/
//! 绝对步进、停止、位置查询与清零，以及两种回报（位置回报、运动完成）。
//!
//! # 编码格式
//!
//! - 位置：32 位有符号整数拆成 5 个 7 bit 字节（第 5 字节的 bit 3 为符号位）
//! - 速度/加速度：AccelStepper "custom float"（23 bit 十进制有效数 +
//!   4 bit 十进制指数，指数偏置 11，最高位为符号）

/// SysEx 起始字节
pub const START_SYSEX: u8 = 0xF0;
/// SysEx 结束字节
pub const END_SYSEX: u8 = 0xF7;
/// AccelStepper 子系统命令号
pub const ACCELSTEPPER_DATA: u8 = 0x62;

/// 子命令：配置步进设备
pub const STEPPER_CONFIG: u8 = 0x00;
/// 子命令：位置计数器清零
pub const STEPPER_ZERO: u8 = 0x01;
/// 子命令：相对步进
pub const STEPPER_STEP: u8 = 0x02;
/// 子命令：绝对步进
pub const STEPPER_TO: u8 = 0x03;
/// 子命令：停止
pub const STEPPER_STOP: u8 = 0x05;
/// 子命令：位置查询；同码用于位置回报
pub const STEPPER_REPORT_POSITION: u8 = 0x06;
/// 子命令：设置加速度
pub const STEPPER_SET_ACCELERATION: u8 = 0x08;
/// 子命令：设置速度
pub const STEPPER_SET_SPEED: u8 = 0x09;
/// 回报：运动完成
pub const STEPPER_MOVE_COMPLETE: u8 = 0x0A;

/// 驱动器接口类型（step + dir 两线驱动，整步）
const INTERFACE_DRIVER: u8 = 0x01 << 4;

const MAX_SIGNIFICAND: f64 = (1u32 << 23) as f64;

/// 32 位有符号整数 → 5×7bit
pub fn encode_i32(value: i32) -> [u8; 5] {
    let negative = value < 0;
    let v = value.unsigned_abs();
    let mut encoded = [
        (v & 0x7F) as u8,
        ((v >> 7) & 0x7F) as u8,
        ((v >> 14) & 0x7F) as u8,
        ((v >> 21) & 0x7F) as u8,
        ((v >> 28) & 0x07) as u8,
    ];
    if negative {
        encoded[4] |= 0x08;
    }
    encoded
}

/// 5×7bit → 32 位有符号整数
pub fn decode_i32(bytes: &[u8; 5]) -> i32 {
    let v = (bytes[0] as u32 & 0x7F)
        | ((bytes[1] as u32 & 0x7F) << 7)
        | ((bytes[2] as u32 & 0x7F) << 14)
        | ((bytes[3] as u32 & 0x7F) << 21)
        | ((bytes[4] as u32 & 0x07) << 28);
    if bytes[4] & 0x08 != 0 {
        -(v as i64) as i32
    } else {
        v as i32
    }
}

/// 浮点 → AccelStepper custom float
///
/// 有效数限制在 2²³ 以内，十进制指数范围 [-11, 4]。0 编码为全零有效数。
pub fn encode_custom_float(value: f64) -> [u8; 4] {
    if value == 0.0 {
        // 有效数 0，指数字段取偏置值本身
        return [0, 0, 0, (11 & 0x0F) << 2];
    }
    let sign: u32 = if value < 0.0 { 1 } else { 0 };
    let mut v = value.abs();
    let base10 = v.log10().floor() as i32;
    let mut exponent = base10;
    v /= 10f64.powi(base10);
    while v.fract() != 0.0 && v < MAX_SIGNIFICAND {
        exponent -= 1;
        v *= 10.0;
    }
    while v > MAX_SIGNIFICAND {
        exponent += 1;
        v /= 10.0;
    }
    let significand = v.trunc() as u32;
    let exponent = (exponent + 11) as u32;
    [
        (significand & 0x7F) as u8,
        ((significand >> 7) & 0x7F) as u8,
        ((significand >> 14) & 0x7F) as u8,
        (((significand >> 21) & 0x03) | ((exponent & 0x0F) << 2) | ((sign & 0x01) << 6)) as u8,
    ]
}

/// AccelStepper custom float → 浮点
pub fn decode_custom_float(bytes: &[u8; 4]) -> f64 {
    let significand = (bytes[0] as u32 & 0x7F)
        | ((bytes[1] as u32 & 0x7F) << 7)
        | ((bytes[2] as u32 & 0x7F) << 14)
        | ((bytes[3] as u32 & 0x03) << 21);
    let exponent = ((bytes[3] >> 2) & 0x0F) as i32 - 11;
    let sign = if bytes[3] & 0x40 != 0 { -1.0 } else { 1.0 };
    sign * significand as f64 * 10f64.powi(exponent)
}

fn sysex(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push(START_SYSEX);
    frame.extend_from_slice(payload);
    frame.push(END_SYSEX);
    frame
}

/// 配置报文（step/dir 两线驱动）
pub fn configure(device: u8, step_pin: u8, dir_pin: u8) -> Vec<u8> {
    sysex(&[
        ACCELSTEPPER_DATA,
        STEPPER_CONFIG,
        device,
        INTERFACE_DRIVER,
        step_pin,
        dir_pin,
    ])
}

/// 清零报文
pub fn zero(device: u8) -> Vec<u8> {
    sysex(&[ACCELSTEPPER_DATA, STEPPER_ZERO, device])
}

/// 相对步进报文
pub fn step(device: u8, steps: i32) -> Vec<u8> {
    let mut payload = vec![ACCELSTEPPER_DATA, STEPPER_STEP, device];
    payload.extend_from_slice(&encode_i32(steps));
    sysex(&payload)
}

/// 绝对步进报文
pub fn step_to(device: u8, position: i32) -> Vec<u8> {
    let mut payload = vec![ACCELSTEPPER_DATA, STEPPER_TO, device];
    payload.extend_from_slice(&encode_i32(position));
    sysex(&payload)
}

/// 停止报文
pub fn stop(device: u8) -> Vec<u8> {
    sysex(&[ACCELSTEPPER_DATA, STEPPER_STOP, device])
}

/// 位置查询报文
pub fn report_position(device: u8) -> Vec<u8> {
    sysex(&[ACCELSTEPPER_DATA, STEPPER_REPORT_POSITION, device])
}

/// 调速报文（步/秒）
pub fn set_speed(device: u8, steps_per_s: f64) -> Vec<u8> {
    let mut payload = vec![ACCELSTEPPER_DATA, STEPPER_SET_SPEED, device];
    payload.extend_from_slice(&encode_custom_float(steps_per_s));
    sysex(&payload)
}

/// 调加速度报文（步/秒²）
pub fn set_acceleration(device: u8, steps_per_s2: f64) -> Vec<u8> {
    let mut payload = vec![ACCELSTEPPER_DATA, STEPPER_SET_ACCELERATION, device];
    payload.extend_from_slice(&encode_custom_float(steps_per_s2));
    sysex(&payload)
}

/// 回报种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// 运动完成（0x0A）
    MoveComplete,
    /// 位置回报（0x06）
    Position,
}

/// 微控制器回报：设备号 + 绝对步数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperReply {
    pub kind: ReplyKind,
    pub device: u8,
    pub position: i32,
}

/// 解析一帧 SysEx 内容（不含 0xF0/0xF7）
///
/// 非 AccelStepper 回报返回 `None`。
pub fn parse_reply(payload: &[u8]) -> Option<StepperReply> {
    if payload.len() < 8 || payload[0] != ACCELSTEPPER_DATA {
        return None;
    }
    let kind = match payload[1] {
        STEPPER_MOVE_COMPLETE => ReplyKind::MoveComplete,
        STEPPER_REPORT_POSITION => ReplyKind::Position,
        _ => return None,
    };
    let device = payload[2];
    let bytes: [u8; 5] = payload[3..8].try_into().ok()?;
    Some(StepperReply {
        kind,
        device,
        position: decode_i32(&bytes),
    })
}

/// SysEx 增量组帧器
///
/// 串口按任意长度分片交付字节，这里逐字节累积出完整帧内容。SysEx 之外的
/// 字节（版本报告等旁路消息）直接丢弃。
#[derive(Debug, Default)]
pub struct SysexParser {
    buffer: Vec<u8>,
    in_sysex: bool,
}

impl SysexParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一个字节；凑满一帧时返回帧内容（不含 0xF0/0xF7）
    pub fn feed(&mut self, byte: u8) -> Option<Vec<u8>> {
        match byte {
            START_SYSEX => {
                self.buffer.clear();
                self.in_sysex = true;
                None
            }
            END_SYSEX if self.in_sysex => {
                self.in_sysex = false;
                Some(std::mem::take(&mut self.buffer))
            }
            b if self.in_sysex => {
                self.buffer.push(b);
                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_i32_positive() {
        // 4000 = 0b0001_1111_0100000
        let encoded = encode_i32(4000);
        assert_eq!(encoded, [0x20, 0x1F, 0x00, 0x00, 0x00]);
        assert_eq!(decode_i32(&encoded), 4000);
    }

    #[test]
    fn test_encode_i32_negative() {
        let encoded = encode_i32(-4000);
        assert_eq!(encoded[4] & 0x08, 0x08);
        assert_eq!(decode_i32(&encoded), -4000);
    }

    #[test]
    fn test_encode_i32_extremes() {
        assert_eq!(decode_i32(&encode_i32(0)), 0);
        assert_eq!(decode_i32(&encode_i32(i32::MAX)), i32::MAX);
        assert_eq!(decode_i32(&encode_i32(-i32::MAX)), -i32::MAX);
    }

    #[test]
    fn test_custom_float_integers() {
        // 整数速度逐位可逆
        for v in [0.0, 1.0, 21.0, 500.0, 8_388_607.0] {
            let decoded = decode_custom_float(&encode_custom_float(v));
            assert!((decoded - v).abs() < 1e-9, "value {v} decoded as {decoded}");
        }
    }

    #[test]
    fn test_custom_float_fraction() {
        let decoded = decode_custom_float(&encode_custom_float(0.5));
        assert!((decoded - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_custom_float_negative() {
        let decoded = decode_custom_float(&encode_custom_float(-123.25));
        assert!((decoded + 123.25).abs() < 1e-9);
    }

    #[test]
    fn test_custom_float_zero_is_clean() {
        // 加速度 0 用于匀速寻零与停止流程，必须可编码
        let encoded = encode_custom_float(0.0);
        assert_eq!(decode_custom_float(&encoded), 0.0);
    }

    #[test]
    fn test_configure_frame_layout() {
        let frame = configure(2, 6, 7);
        assert_eq!(
            frame,
            vec![START_SYSEX, ACCELSTEPPER_DATA, STEPPER_CONFIG, 2, 0x10, 6, 7, END_SYSEX]
        );
    }

    #[test]
    fn test_step_frame_roundtrip() {
        let frame = step(3, -15_000);
        assert_eq!(frame[0], START_SYSEX);
        assert_eq!(*frame.last().unwrap(), END_SYSEX);
        let bytes: [u8; 5] = frame[4..9].try_into().unwrap();
        assert_eq!(decode_i32(&bytes), -15_000);
    }

    #[test]
    fn test_parse_move_complete() {
        let mut payload = vec![ACCELSTEPPER_DATA, STEPPER_MOVE_COMPLETE, 4];
        payload.extend_from_slice(&encode_i32(-321));
        let reply = parse_reply(&payload).unwrap();
        assert_eq!(reply.kind, ReplyKind::MoveComplete);
        assert_eq!(reply.device, 4);
        assert_eq!(reply.position, -321);
    }

    #[test]
    fn test_parse_ignores_foreign_sysex() {
        assert!(parse_reply(&[0x79, 0x02, 0x05]).is_none());
        // AccelStepper 命令回环也不是回报
        assert!(parse_reply(&stop(1)[1..4]).is_none());
    }

    #[test]
    fn test_sysex_parser_reassembles_split_frames() {
        let mut parser = SysexParser::new();
        let frame = {
            let mut payload = vec![ACCELSTEPPER_DATA, STEPPER_MOVE_COMPLETE, 0];
            payload.extend_from_slice(&encode_i32(77));
            sysex(&payload)
        };
        // 一次一个字节地喂入，最后一个字节产出帧
        let mut out = None;
        for &b in &frame {
            out = parser.feed(b);
        }
        let reply = parse_reply(&out.unwrap()).unwrap();
        assert_eq!(reply.position, 77);
    }

    #[test]
    fn test_sysex_parser_skips_stray_bytes() {
        let mut parser = SysexParser::new();
        // 帧外杂散字节（如模拟口回报）被丢弃
        assert!(parser.feed(0xE0).is_none());
        assert!(parser.feed(0x12).is_none());
        assert!(parser.feed(START_SYSEX).is_none());
        assert!(parser.feed(0x42).is_none());
        let frame = parser.feed(END_SYSEX).unwrap();
        assert_eq!(frame, vec![0x42]);
    }
}
