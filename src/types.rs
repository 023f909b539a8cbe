//! 关节索引、关节数组与角度单位
//!
//! `Joint`/`JointArray` 提供编译期安全的六轴索引，`Deg`/`Rad` 用 NewType
//! 模式防止单位混淆。公开 API 一律使用度（`Deg`），运动学内部使用弧度。

use std::fmt;
use std::ops::{Add, Index, IndexMut, Mul, Neg, Sub};

/// 关节枚举
///
/// Atlas A6 的六个关节。设备号（`device_index`）与 `index()` 一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Joint {
    /// 关节 1（基座旋转）
    J1 = 0,
    /// 关节 2（肩部俯仰）
    J2 = 1,
    /// 关节 3（肘部俯仰）
    J3 = 2,
    /// 关节 4（腕部旋转）
    J4 = 3,
    /// 关节 5（腕部俯仰）
    J5 = 4,
    /// 关节 6（末端旋转）
    J6 = 5,
}

impl Joint {
    /// 所有关节，按设备号排序
    pub const ALL: [Joint; 6] = [
        Joint::J1,
        Joint::J2,
        Joint::J3,
        Joint::J4,
        Joint::J5,
        Joint::J6,
    ];

    /// 关节索引（0-5）
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 从索引创建关节（范围检查）
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Joint::J1),
            1 => Some(Joint::J2),
            2 => Some(Joint::J3),
            3 => Some(Joint::J4),
            4 => Some(Joint::J5),
            5 => Some(Joint::J6),
            _ => None,
        }
    }

    /// 关节名称
    pub const fn name(self) -> &'static str {
        match self {
            Joint::J1 => "J1",
            Joint::J2 => "J2",
            Joint::J3 => "J3",
            Joint::J4 => "J4",
            Joint::J5 => "J5",
            Joint::J6 => "J6",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 关节数组
///
/// 类型安全的六元素容器，支持按 `Joint` 索引、迭代和映射。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointArray<T> {
    data: [T; 6],
}

impl<T: Copy> Copy for JointArray<T> {}

impl<T> JointArray<T> {
    /// 创建新的关节数组
    #[inline]
    pub const fn new(data: [T; 6]) -> Self {
        JointArray { data }
    }

    /// 内部数组的引用
    #[inline]
    pub fn as_array(&self) -> &[T; 6] {
        &self.data
    }

    /// 迭代器
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// 映射转换
    pub fn map<U, F>(self, f: F) -> JointArray<U>
    where
        F: FnMut(T) -> U,
    {
        JointArray::new(self.data.map(f))
    }

    /// 带关节号的映射转换
    pub fn map_with_joint<U, F>(self, mut f: F) -> JointArray<U>
    where
        F: FnMut(Joint, T) -> U,
    {
        let [a, b, c, d, e, g] = self.data;
        JointArray::new([
            f(Joint::J1, a),
            f(Joint::J2, b),
            f(Joint::J3, c),
            f(Joint::J4, d),
            f(Joint::J5, e),
            f(Joint::J6, g),
        ])
    }

    /// 与另一个数组逐元素映射
    pub fn map_with<U, V, F>(self, other: JointArray<U>, mut f: F) -> JointArray<V>
    where
        F: FnMut(T, U) -> V,
    {
        let [a1, b1, c1, d1, e1, f1] = self.data;
        let [a2, b2, c2, d2, e2, f2] = other.data;
        JointArray::new([
            f(a1, a2),
            f(b1, b2),
            f(c1, c2),
            f(d1, d2),
            f(e1, e2),
            f(f1, f2),
        ])
    }
}

impl<T: Copy> JointArray<T> {
    /// 所有元素相同的数组
    #[inline]
    pub const fn splat(value: T) -> Self {
        JointArray::new([value; 6])
    }
}

impl<T: Default> Default for JointArray<T> {
    fn default() -> Self {
        JointArray::new(std::array::from_fn(|_| T::default()))
    }
}

impl<T> Index<Joint> for JointArray<T> {
    type Output = T;

    #[inline]
    fn index(&self, joint: Joint) -> &T {
        &self.data[joint.index()]
    }
}

impl<T> IndexMut<Joint> for JointArray<T> {
    #[inline]
    fn index_mut(&mut self, joint: Joint) -> &mut T {
        &mut self.data[joint.index()]
    }
}

impl<T> Index<usize> for JointArray<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for JointArray<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

impl<T> From<[T; 6]> for JointArray<T> {
    #[inline]
    fn from(data: [T; 6]) -> Self {
        JointArray::new(data)
    }
}

impl<T> From<JointArray<T>> for [T; 6] {
    #[inline]
    fn from(arr: JointArray<T>) -> Self {
        arr.data
    }
}

impl<T> IntoIterator for JointArray<T> {
    type Item = T;
    type IntoIter = std::array::IntoIter<T, 6>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a JointArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

/// 度（NewType）
///
/// 外部边界统一使用度；与 `Rad` 不可隐式混用。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Deg(pub f64);

impl Deg {
    /// 零度常量
    pub const ZERO: Self = Deg(0.0);

    /// 转换为弧度
    #[inline]
    pub fn to_rad(self) -> Rad {
        Rad(self.0.to_radians())
    }

    /// 原始值
    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }

    /// 取绝对值
    #[inline]
    pub fn abs(self) -> Self {
        Deg(self.0.abs())
    }
}

impl fmt::Display for Deg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}°", self.0)
    }
}

impl Add for Deg {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Deg(self.0 + rhs.0)
    }
}

impl Sub for Deg {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Deg(self.0 - rhs.0)
    }
}

impl Neg for Deg {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Deg(-self.0)
    }
}

impl Mul<f64> for Deg {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f64) -> Self {
        Deg(self.0 * rhs)
    }
}

/// 弧度（NewType）
///
/// 运动学引擎内部单位，只在 API 边界与 `Deg` 互转。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rad(pub f64);

impl Rad {
    /// 零弧度常量
    pub const ZERO: Self = Rad(0.0);

    /// 转换为度
    #[inline]
    pub fn to_deg(self) -> Deg {
        Deg(self.0.to_degrees())
    }

    /// 原始值
    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Rad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} rad", self.0)
    }
}

impl Add for Rad {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Rad(self.0 + rhs.0)
    }
}

impl Sub for Rad {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Rad(self.0 - rhs.0)
    }
}

impl Neg for Rad {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Rad(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_index() {
        assert_eq!(Joint::J1.index(), 0);
        assert_eq!(Joint::J6.index(), 5);
    }

    #[test]
    fn test_joint_from_index() {
        assert_eq!(Joint::from_index(0), Some(Joint::J1));
        assert_eq!(Joint::from_index(5), Some(Joint::J6));
        assert_eq!(Joint::from_index(6), None);
    }

    #[test]
    fn test_joint_name() {
        assert_eq!(Joint::J2.name(), "J2");
        assert_eq!(format!("{}", Joint::J5), "J5");
    }

    #[test]
    fn test_joint_array_indexing() {
        let mut arr = JointArray::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(arr[Joint::J1], 1);
        assert_eq!(arr[Joint::J6], 6);
        assert_eq!(arr[3], 4);

        arr[Joint::J3] = 30;
        assert_eq!(arr[2], 30);
    }

    #[test]
    fn test_joint_array_map() {
        let deg = JointArray::new([Deg(0.0), Deg(90.0), Deg(180.0), Deg(45.0), Deg(30.0), Deg(60.0)]);
        let rad = deg.map(|d| d.to_rad());
        assert!((rad[Joint::J3].0 - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn test_joint_array_map_with() {
        let a = JointArray::new([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = JointArray::splat(2.0);
        let c = a.map_with(b, |x, y| x * y);
        assert_eq!(c[Joint::J2], 4.0);
        assert_eq!(c[Joint::J6], 12.0);
    }

    #[test]
    fn test_joint_array_map_with_joint() {
        let arr = JointArray::splat(10.0);
        let scaled = arr.map_with_joint(|joint, v| v * (joint.index() + 1) as f64);
        assert_eq!(scaled[Joint::J1], 10.0);
        assert_eq!(scaled[Joint::J6], 60.0);
    }

    #[test]
    fn test_deg_rad_conversion() {
        let d = Deg(180.0);
        assert!((d.to_rad().0 - std::f64::consts::PI).abs() < 1e-12);
        let r = Rad(std::f64::consts::FRAC_PI_2);
        assert!((r.to_deg().0 - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_deg_arithmetic() {
        assert_eq!(Deg(10.0) + Deg(5.0), Deg(15.0));
        assert_eq!(Deg(10.0) - Deg(5.0), Deg(5.0));
        assert_eq!(-Deg(10.0), Deg(-10.0));
        assert_eq!(Deg(-3.0).abs(), Deg(3.0));
        assert_eq!(Deg(2.0) * 1.5, Deg(3.0));
    }
}
