// crates/vp_field/src/expr.rs

//! 惰性逐元素表达式
//!
//! 表达式描述每单元的公式，赋值时才在内部域上求值：
//!
//! ```ignore
//! rho.assign(a.expr() * 2.0 - b.expr());
//! ```
//!
//! 组合子只覆盖求解器与驱动需要的最小集合：加、减、乘、
//! 标量缩放、取负与常量。

use crate::field::Field;
use std::ops::{Add, Mul, Neg, Sub};

/// 逐元素表达式
pub trait FieldExpr<T, const D: usize>: Sync {
    /// 在全局索引处求值
    fn eval(&self, idx: [i64; D]) -> T;
}

/// 表达式包装（承载运算符重载）
#[derive(Clone, Copy)]
pub struct Expr<E>(pub E);

impl<T, E: FieldExpr<T, D>, const D: usize> FieldExpr<T, D> for Expr<E> {
    #[inline]
    fn eval(&self, idx: [i64; D]) -> T {
        self.0.eval(idx)
    }
}

/// 场引用表达式
pub struct FieldRef<'a, T, const D: usize>(&'a Field<T, D>);

impl<T: bytemuck::Pod + Send + Sync, const D: usize> FieldExpr<T, D> for FieldRef<'_, T, D> {
    #[inline]
    fn eval(&self, idx: [i64; D]) -> T {
        self.0.at(idx)
    }
}

impl<T: bytemuck::Pod + Send + Sync, const D: usize> Field<T, D> {
    /// 以本场为叶子构造表达式
    pub fn expr(&self) -> Expr<FieldRef<'_, T, D>> {
        Expr(FieldRef(self))
    }
}

/// 常量表达式
#[derive(Clone, Copy)]
pub struct Const<T>(pub T);

impl<T: Copy + Sync, const D: usize> FieldExpr<T, D> for Const<T> {
    #[inline]
    fn eval(&self, _idx: [i64; D]) -> T {
        self.0
    }
}

/// 二元逐元素和
pub struct AddExpr<A, B>(A, B);
/// 二元逐元素差
pub struct SubExpr<A, B>(A, B);
/// 二元逐元素积
pub struct MulExpr<A, B>(A, B);
/// 标量缩放
pub struct ScaleExpr<A, T>(A, T);
/// 取负
pub struct NegExpr<A>(A);

impl<T, A, B, const D: usize> FieldExpr<T, D> for AddExpr<A, B>
where
    T: Add<Output = T>,
    A: FieldExpr<T, D>,
    B: FieldExpr<T, D>,
{
    #[inline]
    fn eval(&self, idx: [i64; D]) -> T {
        self.0.eval(idx) + self.1.eval(idx)
    }
}

impl<T, A, B, const D: usize> FieldExpr<T, D> for SubExpr<A, B>
where
    T: Sub<Output = T>,
    A: FieldExpr<T, D>,
    B: FieldExpr<T, D>,
{
    #[inline]
    fn eval(&self, idx: [i64; D]) -> T {
        self.0.eval(idx) - self.1.eval(idx)
    }
}

impl<T, A, B, const D: usize> FieldExpr<T, D> for MulExpr<A, B>
where
    T: Mul<Output = T>,
    A: FieldExpr<T, D>,
    B: FieldExpr<T, D>,
{
    #[inline]
    fn eval(&self, idx: [i64; D]) -> T {
        self.0.eval(idx) * self.1.eval(idx)
    }
}

impl<T, A, const D: usize> FieldExpr<T, D> for ScaleExpr<A, T>
where
    T: Mul<Output = T> + Copy + Sync,
    A: FieldExpr<T, D>,
{
    #[inline]
    fn eval(&self, idx: [i64; D]) -> T {
        self.0.eval(idx) * self.1
    }
}

impl<T, A, const D: usize> FieldExpr<T, D> for NegExpr<A>
where
    T: Neg<Output = T>,
    A: FieldExpr<T, D>,
{
    #[inline]
    fn eval(&self, idx: [i64; D]) -> T {
        -self.0.eval(idx)
    }
}

// ============================================================================
// 运算符重载
// ============================================================================

impl<A, B> Add<Expr<B>> for Expr<A> {
    type Output = Expr<AddExpr<A, B>>;
    fn add(self, rhs: Expr<B>) -> Self::Output {
        Expr(AddExpr(self.0, rhs.0))
    }
}

impl<A, B> Sub<Expr<B>> for Expr<A> {
    type Output = Expr<SubExpr<A, B>>;
    fn sub(self, rhs: Expr<B>) -> Self::Output {
        Expr(SubExpr(self.0, rhs.0))
    }
}

impl<A, B> Mul<Expr<B>> for Expr<A> {
    type Output = Expr<MulExpr<A, B>>;
    fn mul(self, rhs: Expr<B>) -> Self::Output {
        Expr(MulExpr(self.0, rhs.0))
    }
}

impl<A> Mul<f64> for Expr<A> {
    type Output = Expr<ScaleExpr<A, f64>>;
    fn mul(self, rhs: f64) -> Self::Output {
        Expr(ScaleExpr(self.0, rhs))
    }
}

impl<A> Add<f64> for Expr<A> {
    type Output = Expr<AddExpr<A, Const<f64>>>;
    fn add(self, rhs: f64) -> Self::Output {
        Expr(AddExpr(self.0, Const(rhs)))
    }
}

impl<A> Sub<f64> for Expr<A> {
    type Output = Expr<SubExpr<A, Const<f64>>>;
    fn sub(self, rhs: f64) -> Self::Output {
        Expr(SubExpr(self.0, Const(rhs)))
    }
}

impl<A> Neg for Expr<A> {
    type Output = Expr<NegExpr<A>>;
    fn neg(self) -> Self::Output {
        Expr(NegExpr(self.0))
    }
}

// ============================================================================
// 测试
// ============================================================================
