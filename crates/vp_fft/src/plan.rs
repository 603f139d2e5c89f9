// crates/vp_fft/src/plan.rs

//! FFT 计划
//!
//! 四种变换共用一个抽象计划：内部单元拷入稠密暂存块、逐轴
//! 后端调用、结果拷回。分布轴先重分布成该轴连续的 pencil
//! （或 slab）分布再做 1D 变换；重分布选项只在这里解析一次。
//!
//! 归一化约定：前向乘 1/N（正弦、余弦变换的逻辑尺寸分别为
//! 2(n+1) 与 2(n−1)），逆向不缩放。

use crate::brick::DenseBrick;
use crate::error::FftError;
use crate::reshape::{reshape, ReshapeAlgorithm};
use crate::Complex64;
use rustfft::FftPlanner;
use std::sync::Arc;
use vp_core::{Comm, ParameterList};
use vp_field::layout::{AxisDecomp, BoundaryPolicy, FieldLayout};
use vp_field::Field;
use vp_foundation::{IndexRange, NDIndex};

/// 解析后的 FFT 选项
#[derive(Debug, Clone, Copy)]
pub struct FftOptions {
    /// 中间分布使用 pencil（否则 slab）
    pub use_pencils: bool,
    /// 线变换前整块重排为连续布局
    pub use_reorder: bool,
    /// 记录设备感知通信意愿（CPU 后端不生效）
    pub use_gpu_aware: bool,
    /// 重分布算法
    pub comm: ReshapeAlgorithm,
    /// r2c 减半轴
    pub r2c_direction: usize,
}

impl FftOptions {
    /// 服务的默认参数表
    pub fn default_parameters() -> ParameterList {
        let mut p = ParameterList::new();
        p.add("use_heffte_defaults", true)
            .add("use_pencils", true)
            .add("use_reorder", true)
            .add("use_gpu_aware", false)
            .add("comm", "ALL_TO_ALL_V")
            .add("r2c_direction", 0usize);
        p
    }

    /// 从参数表解析
    ///
    /// `use_heffte_defaults` 为真时其余重分布键被忽略；
    /// 为假时各键必须齐备。
    pub fn from_params(params: &ParameterList) -> Result<Self, FftError> {
        let r2c_direction = params.get_or::<usize>("r2c_direction", 0);
        if params.get_or::<bool>("use_heffte_defaults", true) {
            return Ok(Self {
                use_pencils: true,
                use_reorder: true,
                use_gpu_aware: false,
                comm: ReshapeAlgorithm::AllToAllV,
                r2c_direction,
            });
        }
        let comm = match params.get::<String>("comm") {
            Ok(tag) => ReshapeAlgorithm::parse(&tag)?,
            Err(_) => ReshapeAlgorithm::parse_int(params.get::<i64>("comm")?)?,
        };
        Ok(Self {
            use_pencils: params.get::<bool>("use_pencils")?,
            use_reorder: params.get::<bool>("use_reorder")?,
            use_gpu_aware: params.get_or::<bool>("use_gpu_aware", false),
            comm,
            r2c_direction,
        })
    }
}

#[inline]
fn parse_direction(direction: i32) -> Result<bool, FftError> {
    match direction {
        1 => Ok(true),
        -1 => Ok(false),
        other => Err(FftError::UnknownDirection(other)),
    }
}

fn axis_full<const D: usize>(domains: &[NDIndex<D>], global: &NDIndex<D>, axis: usize) -> bool {
    domains.iter().all(|dom| dom[axis] == global[axis])
}

/// 抽象计划：选项、后端计划缓存与可复用工作区
struct PlanBase<const D: usize> {
    comm: Comm,
    options: FftOptions,
    planner: FftPlanner<f64>,
    /// rustfft 原位工作区（单调增长）
    scratch: Vec<Complex64>,
    /// DST/DCT 扩展缓冲（单调增长）
    ext: Vec<Complex64>,
}

impl<const D: usize> PlanBase<D> {
    fn new(comm: Comm, options: FftOptions) -> Self {
        Self {
            comm,
            options,
            planner: FftPlanner::new(),
            scratch: Vec::new(),
            ext: Vec::new(),
        }
    }

    /// 1D 复变换（原位，不缩放）
    fn fft_line(&mut self, line: &mut [Complex64], forward: bool) {
        let plan = if forward {
            self.planner.plan_fft_forward(line.len())
        } else {
            self.planner.plan_fft_inverse(line.len())
        };
        let need = plan.get_inplace_scratch_len();
        if self.scratch.len() < need {
            self.scratch.resize(need, Complex64::new(0.0, 0.0));
        }
        plan.process_with_scratch(line, &mut self.scratch[..need]);
    }

    /// DST-I（FFTW RODFT00 约定，原位，不缩放）
    fn dst1_line(&mut self, line: &mut [f64]) {
        let n = line.len();
        let m = 2 * (n + 1);
        let mut ext = std::mem::take(&mut self.ext);
        if ext.len() < m {
            ext.resize(m, Complex64::new(0.0, 0.0));
        }
        let buf = &mut ext[..m];
        buf[0] = Complex64::new(0.0, 0.0);
        buf[n + 1] = Complex64::new(0.0, 0.0);
        for j in 0..n {
            buf[j + 1] = Complex64::new(line[j], 0.0);
            buf[m - 1 - j] = Complex64::new(-line[j], 0.0);
        }
        self.fft_line(buf, true);
        for (k, v) in line.iter_mut().enumerate() {
            *v = -buf[k + 1].im;
        }
        self.ext = ext;
    }

    /// DCT-I（FFTW REDFT00 约定，原位，不缩放）；线长至少 2
    fn dct1_line(&mut self, line: &mut [f64]) {
        let n = line.len();
        let m = 2 * (n - 1);
        let mut ext = std::mem::take(&mut self.ext);
        if ext.len() < m {
            ext.resize(m, Complex64::new(0.0, 0.0));
        }
        let buf = &mut ext[..m];
        for j in 0..n {
            buf[j] = Complex64::new(line[j], 0.0);
        }
        for j in 1..n.saturating_sub(1) {
            buf[n - 1 + j] = Complex64::new(line[n - 1 - j], 0.0);
        }
        self.fft_line(buf, true);
        for (k, v) in line.iter_mut().enumerate() {
            *v = buf[k].re;
        }
        self.ext = ext;
    }

    /// 轴连续的中间分布
    fn pencil_domains(
        &self,
        global: &NDIndex<D>,
        axis: usize,
    ) -> Result<Vec<NDIndex<D>>, FftError> {
        let build = |decomp: [AxisDecomp; D]| {
            FieldLayout::new(
                self.comm.clone(),
                *global,
                decomp,
                [[BoundaryPolicy::None; 2]; D],
                0,
            )
            .map(|l| l.domains().to_vec())
        };

        let mut decomp = [AxisDecomp::Parallel; D];
        decomp[axis] = AxisDecomp::Serial;
        if !self.options.use_pencils {
            // slab：除变换轴外只切一个轴
            for d in 0..D {
                if d != axis {
                    decomp[d] = AxisDecomp::Serial;
                }
            }
            if let Some(sa) = (0..D).find(|&d| d != axis) {
                decomp[sa] = AxisDecomp::Parallel;
            }
        }

        match build(decomp) {
            Ok(domains) => Ok(domains),
            Err(_) if !self.options.use_pencils => {
                // slab 容不下全部秩时退回 pencil
                let mut dc = [AxisDecomp::Parallel; D];
                dc[axis] = AxisDecomp::Serial;
                build(dc).map_err(|e| FftError::Backend {
                    operation: "pencil_domains",
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(FftError::Backend {
                operation: "pencil_domains",
                reason: e.to_string(),
            }),
        }
    }

    /// 沿给定轴序做复变换，分布轴先 pencil 重分布
    fn complex_pass(
        &mut self,
        mut brick: DenseBrick<Complex64, D>,
        mut current: Vec<NDIndex<D>>,
        global: &NDIndex<D>,
        axes: &[usize],
        forward: bool,
    ) -> Result<(DenseBrick<Complex64, D>, Vec<NDIndex<D>>), FftError> {
        let reorder = self.options.use_reorder;
        for &axis in axes {
            if !axis_full(&current, global, axis) {
                let pencil = self.pencil_domains(global, axis)?;
                brick = reshape(&self.comm, &brick, &current, &pencil, self.options.comm)?;
                current = pencil;
            }
            brick.for_each_line_mut(axis, reorder, |_, line| self.fft_line(line, forward));
        }
        Ok((brick, current))
    }

    /// 沿所有轴做实到实变换（DST-I / DCT-I）
    fn real_pass(
        &mut self,
        mut brick: DenseBrick<f64, D>,
        mut current: Vec<NDIndex<D>>,
        global: &NDIndex<D>,
        cosine: bool,
    ) -> Result<(DenseBrick<f64, D>, Vec<NDIndex<D>>), FftError> {
        let reorder = self.options.use_reorder;
        for axis in 0..D {
            if !axis_full(&current, global, axis) {
                let pencil = self.pencil_domains(global, axis)?;
                brick = reshape(&self.comm, &brick, &current, &pencil, self.options.comm)?;
                current = pencil;
            }
            if cosine {
                brick.for_each_line_mut(axis, reorder, |_, line| self.dct1_line(line));
            } else {
                brick.for_each_line_mut(axis, reorder, |_, line| self.dst1_line(line));
            }
        }
        Ok((brick, current))
    }

    /// 回到给定分布（已一致时原样返回）
    fn restore<T: bytemuck::Pod>(
        &mut self,
        brick: DenseBrick<T, D>,
        current: &[NDIndex<D>],
        target: &[NDIndex<D>],
    ) -> Result<DenseBrick<T, D>, FftError> {
        if current == target {
            Ok(brick)
        } else {
            reshape(&self.comm, &brick, current, target, self.options.comm)
        }
    }
}

fn check_dim<const D: usize>() -> Result<(), FftError> {
    if D > 3 || D == 0 {
        Err(FftError::UnsupportedDim(D))
    } else {
        Ok(())
    }
}

// ============================================================================
// 复到复
// ============================================================================

/// 复到复 FFT，单场原位
pub struct FftCC<const D: usize> {
    base: PlanBase<D>,
    layout: Arc<FieldLayout<D>>,
}

impl<const D: usize> FftCC<D> {
    /// 在布局上创建计划
    pub fn new(layout: Arc<FieldLayout<D>>, params: &ParameterList) -> Result<Self, FftError> {
        check_dim::<D>()?;
        let options = FftOptions::from_params(params)?;
        Ok(Self {
            base: PlanBase::new(layout.comm().clone(), options),
            layout,
        })
    }

    /// 原位变换；`direction` 为 +1 前向或 -1 逆向
    pub fn transform(
        &mut self,
        direction: i32,
        f: &mut Field<Complex64, D>,
    ) -> Result<(), FftError> {
        let forward = parse_direction(direction)?;
        if !f.layout().same_as(&self.layout) {
            return Err(FftError::LayoutMismatch {
                operation: "FftCC::transform",
                reason: "场布局与计划布局不一致".to_string(),
            });
        }
        let global = *self.layout.global_domain();
        let domains = self.layout.domains().to_vec();

        let brick = DenseBrick::from_parts(*f.owned_domain(), f.interior_values());
        let axes: Vec<usize> = (0..D).collect();
        let (brick, current) =
            self.base
                .complex_pass(brick, domains.clone(), &global, &axes, forward)?;
        let mut brick = self.base.restore(brick, &current, &domains)?;

        if forward {
            let scale = 1.0 / global.size() as f64;
            for v in brick.data_mut() {
                *v *= scale;
            }
        }
        f.set_interior(brick.data())?;
        Ok(())
    }
}

// ============================================================================
// 实到复
// ============================================================================

/// 实 ↔ 复 FFT，输入输出布局各异
pub struct FftRC<const D: usize> {
    base: PlanBase<D>,
    layout_in: Arc<FieldLayout<D>>,
    layout_out: Arc<FieldLayout<D>>,
    r2c_axis: usize,
}

impl<const D: usize> FftRC<D> {
    /// 创建计划；`layout_out` 的 r2c 轴长度须为 n/2 + 1
    pub fn new(
        layout_in: Arc<FieldLayout<D>>,
        layout_out: Arc<FieldLayout<D>>,
        params: &ParameterList,
    ) -> Result<Self, FftError> {
        check_dim::<D>()?;
        let options = FftOptions::from_params(params)?;
        let axis = options.r2c_direction;
        if axis >= D {
            return Err(FftError::Config(vp_core::ConfigError::InvalidValue {
                key: "r2c_direction".to_string(),
                reason: format!("轴 {axis} 超出维度 {D}"),
            }));
        }
        let gin = layout_in.global_domain();
        let gout = layout_out.global_domain();
        for d in 0..D {
            let expect = if d == axis {
                gin[d].length() / 2 + 1
            } else {
                gin[d].length()
            };
            if gout[d].length() != expect {
                return Err(FftError::LayoutMismatch {
                    operation: "FftRC::new",
                    reason: format!(
                        "输出布局轴 {d} 长度 {}, 期望 {expect}",
                        gout[d].length()
                    ),
                });
            }
        }
        Ok(Self {
            base: PlanBase::new(layout_in.comm().clone(), options),
            layout_in,
            layout_out,
            r2c_axis: axis,
        })
    }

    /// 半谱全局域
    fn half_global(&self) -> NDIndex<D> {
        let gin = self.layout_in.global_domain();
        let n = gin[self.r2c_axis].length();
        let f0 = gin[self.r2c_axis].first();
        gin.with_axis(
            self.r2c_axis,
            IndexRange::new(f0, f0 + (n / 2) as i64),
        )
    }

    /// 变换；前向 `f → g`，逆向 `g → f`
    pub fn transform(
        &mut self,
        direction: i32,
        f: &mut Field<f64, D>,
        g: &mut Field<Complex64, D>,
    ) -> Result<(), FftError> {
        let forward = parse_direction(direction)?;
        if !f.layout().same_as(&self.layout_in) || !g.layout().same_as(&self.layout_out) {
            return Err(FftError::LayoutMismatch {
                operation: "FftRC::transform",
                reason: "场布局与计划布局不一致".to_string(),
            });
        }
        if forward {
            self.forward(f, g)
        } else {
            self.backward(f, g)
        }
    }

    fn forward(
        &mut self,
        f: &Field<f64, D>,
        g: &mut Field<Complex64, D>,
    ) -> Result<(), FftError> {
        let axis = self.r2c_axis;
        let global_in = *self.layout_in.global_domain();
        let global_h = self.half_global();
        let in_domains = self.layout_in.domains().to_vec();
        let out_domains = self.layout_out.domains().to_vec();
        let n = global_in[axis].length();
        let half = n / 2 + 1;

        // 实数据先搬成 r2c 轴连续
        let mut rbrick = DenseBrick::from_parts(*f.owned_domain(), f.interior_values());
        let mut current_r = in_domains;
        if !axis_full(&current_r, &global_in, axis) {
            let pencil = self.base.pencil_domains(&global_in, axis)?;
            rbrick = reshape(
                &self.base.comm,
                &rbrick,
                &current_r,
                &pencil,
                self.base.options.comm,
            )?;
            current_r = pencil;
        }

        // 沿 r2c 轴取半谱
        let half_range = global_h[axis];
        let mut half_lines: Vec<Vec<Complex64>> = Vec::new();
        {
            let base = &mut self.base;
            rbrick.for_each_line_mut(axis, false, |l, line| {
                let mut cline: Vec<Complex64> =
                    line.iter().map(|&v| Complex64::new(v, 0.0)).collect();
                base.fft_line(&mut cline, true);
                cline.truncate(half);
                debug_assert_eq!(l, half_lines.len());
                half_lines.push(cline);
            });
        }
        let mut cbrick =
            DenseBrick::<Complex64, D>::zeroed(rbrick.domain().with_axis(axis, half_range));
        cbrick.for_each_line_mut(axis, false, |l, line| {
            line.copy_from_slice(&half_lines[l]);
        });
        let current_c: Vec<NDIndex<D>> = current_r
            .iter()
            .map(|dom| dom.with_axis(axis, half_range))
            .collect();

        // 其余轴 CC 前向
        let axes_rest: Vec<usize> = (0..D).filter(|&d| d != axis).collect();
        let (mut cbrick2, cur) =
            self.base
                .complex_pass(cbrick, current_c, &global_h, &axes_rest, true)?;
        let scale = 1.0 / global_in.size() as f64;
        for v in cbrick2.data_mut() {
            *v *= scale;
        }

        let cbrick2 = self.base.restore(cbrick2, &cur, &out_domains)?;
        g.set_interior(cbrick2.data())?;
        Ok(())
    }

    fn backward(
        &mut self,
        f: &mut Field<f64, D>,
        g: &Field<Complex64, D>,
    ) -> Result<(), FftError> {
        let axis = self.r2c_axis;
        let global_in = *self.layout_in.global_domain();
        let global_h = self.half_global();
        let in_domains = self.layout_in.domains().to_vec();
        let out_domains = self.layout_out.domains().to_vec();
        let n = global_in[axis].length();

        // 其余轴 CC 逆向
        let cbrick = DenseBrick::from_parts(*g.owned_domain(), g.interior_values());
        let axes_rest: Vec<usize> = (0..D).filter(|&d| d != axis).collect();
        let (mut cbrick, mut current_c) =
            self.base
                .complex_pass(cbrick, out_domains, &global_h, &axes_rest, false)?;

        // r2c 轴连续后做 c2r 线变换
        if !axis_full(&current_c, &global_h, axis) {
            let pencil = self.base.pencil_domains(&global_h, axis)?;
            cbrick = reshape(
                &self.base.comm,
                &cbrick,
                &current_c,
                &pencil,
                self.base.options.comm,
            )?;
            current_c = pencil;
        }

        let mut real_lines: Vec<Vec<f64>> = Vec::new();
        {
            let base = &mut self.base;
            cbrick.for_each_line_mut(axis, false, |l, half| {
                // 共轭对称补全整谱
                let mut full = vec![Complex64::new(0.0, 0.0); n];
                full[..half.len()].copy_from_slice(half);
                for k in half.len()..n {
                    full[k] = full[n - k].conj();
                }
                base.fft_line(&mut full, false);
                debug_assert_eq!(l, real_lines.len());
                real_lines.push(full.iter().map(|c| c.re).collect());
            });
        }
        let full_range = global_in[axis];
        let mut rbrick =
            DenseBrick::<f64, D>::zeroed(cbrick.domain().with_axis(axis, full_range));
        rbrick.for_each_line_mut(axis, false, |l, line| {
            line.copy_from_slice(&real_lines[l]);
        });
        let current_r: Vec<NDIndex<D>> = current_c
            .iter()
            .map(|dom| dom.with_axis(axis, full_range))
            .collect();

        let rbrick = self.base.restore(rbrick, &current_r, &in_domains)?;
        f.set_interior(rbrick.data())?;
        Ok(())
    }
}

// ============================================================================
// 正弦 / 余弦
// ============================================================================

/// 实到实 DST-I，单场原位
pub struct FftSine<const D: usize> {
    base: PlanBase<D>,
    layout: Arc<FieldLayout<D>>,
}

/// 实到实 DCT-I，单场原位
pub struct FftCos<const D: usize> {
    base: PlanBase<D>,
    layout: Arc<FieldLayout<D>>,
}

fn real_transform<const D: usize>(
    base: &mut PlanBase<D>,
    layout: &FieldLayout<D>,
    direction: i32,
    f: &mut Field<f64, D>,
    cosine: bool,
) -> Result<(), FftError> {
    let forward = parse_direction(direction)?;
    if !f.layout().same_as(layout) {
        return Err(FftError::LayoutMismatch {
            operation: "real_transform",
            reason: "场布局与计划布局不一致".to_string(),
        });
    }
    let global = *layout.global_domain();
    let domains = layout.domains().to_vec();

    let brick = DenseBrick::from_parts(*f.owned_domain(), f.interior_values());
    let (brick, current) = base.real_pass(brick, domains.clone(), &global, cosine)?;
    let mut brick = base.restore(brick, &current, &domains)?;

    if forward {
        // 逻辑尺寸: DST-I 为 2(n+1), DCT-I 为 2(n-1)
        let mut scale = 1.0;
        for d in 0..D {
            let n = global[d].length();
            scale /= if cosine {
                2.0 * (n as f64 - 1.0)
            } else {
                2.0 * (n as f64 + 1.0)
            };
        }
        for v in brick.data_mut() {
            *v *= scale;
        }
    }
    f.set_interior(brick.data())?;
    Ok(())
}

impl<const D: usize> FftSine<D> {
    /// 在布局上创建计划
    pub fn new(layout: Arc<FieldLayout<D>>, params: &ParameterList) -> Result<Self, FftError> {
        check_dim::<D>()?;
        let options = FftOptions::from_params(params)?;
        Ok(Self {
            base: PlanBase::new(layout.comm().clone(), options),
            layout,
        })
    }

    /// 原位变换；`direction` 为 +1 前向或 -1 逆向
    pub fn transform(&mut self, direction: i32, f: &mut Field<f64, D>) -> Result<(), FftError> {
        real_transform(&mut self.base, &self.layout, direction, f, false)
    }
}

impl<const D: usize> FftCos<D> {
    /// 在布局上创建计划；每轴长度至少为 2
    pub fn new(layout: Arc<FieldLayout<D>>, params: &ParameterList) -> Result<Self, FftError> {
        check_dim::<D>()?;
        for d in 0..D {
            if layout.global_domain()[d].length() < 2 {
                return Err(FftError::Backend {
                    operation: "FftCos::new",
                    reason: format!("DCT-I 要求轴 {d} 长度至少为 2"),
                });
            }
        }
        let options = FftOptions::from_params(params)?;
        Ok(Self {
            base: PlanBase::new(layout.comm().clone(), options),
            layout,
        })
    }

    /// 原位变换；`direction` 为 +1 前向或 -1 逆向
    pub fn transform(&mut self, direction: i32, f: &mut Field<f64, D>) -> Result<(), FftError> {
        real_transform(&mut self.base, &self.layout, direction, f, true)
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use vp_core::ThreadComm;
    use vp_mesh::{Centering, UniformCartesian};

    fn layout3(comm: Comm, lens: [usize; 3]) -> Arc<FieldLayout<3>> {
        Arc::new(
            FieldLayout::all_periodic(
                comm,
                NDIndex::with_lengths(lens),
                [AxisDecomp::Parallel; 3],
                1,
            )
            .unwrap(),
        )
    }

    fn mesh3(lens: [usize; 3]) -> UniformCartesian<3> {
        let h = [1.0 / lens[0] as f64, 1.0 / lens[1] as f64, 1.0 / lens[2] as f64];
        UniformCartesian::new(NDIndex::with_lengths(lens), h, [0.0; 3])
    }

    fn max_cdiff(a: &[Complex64], b: &[Complex64]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).norm())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_cc_forward_backward_identity() {
        let comm = Comm::single();
        let layout = layout3(comm, [8, 8, 8]);
        let mesh = mesh3([8, 8, 8]);
        let mut f: Field<Complex64, 3> = Field::new(mesh, layout.clone(), Centering::Cell);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let original: Vec<Complex64> = (0..f.owned_domain().size())
            .map(|_| Complex64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5))
            .collect();
        f.set_interior(&original).unwrap();

        let mut plan = FftCC::new(layout, &FftOptions::default_parameters()).unwrap();
        plan.transform(1, &mut f).unwrap();
        plan.transform(-1, &mut f).unwrap();

        assert!(max_cdiff(&f.interior_values(), &original) < 1e-12);
    }

    #[test]
    fn test_cc_backward_forward_identity() {
        let comm = Comm::single();
        let layout = layout3(comm, [8, 4, 4]);
        let mesh = mesh3([8, 4, 4]);
        let mut f: Field<Complex64, 3> = Field::new(mesh, layout.clone(), Centering::Cell);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let original: Vec<Complex64> = (0..f.owned_domain().size())
            .map(|_| Complex64::new(rng.gen(), rng.gen()))
            .collect();
        f.set_interior(&original).unwrap();

        let mut plan = FftCC::new(layout, &FftOptions::default_parameters()).unwrap();
        plan.transform(-1, &mut f).unwrap();
        plan.transform(1, &mut f).unwrap();
        assert!(max_cdiff(&f.interior_values(), &original) < 1e-12);
    }

    #[test]
    fn test_cc_plane_wave_spectrum() {
        // e^{2πi k·x/N} 的前向谱在 k 处为 1，其余为 0
        let comm = Comm::single();
        let n = 8usize;
        let layout = layout3(comm, [n, n, n]);
        let mesh = mesh3([n, n, n]);
        let mut f: Field<Complex64, 3> = Field::new(mesh, layout.clone(), Centering::Cell);
        let kv = [2i64, 1, 3];
        f.apply_mut(|idx, v| {
            let phase = 2.0 * std::f64::consts::PI
                * (idx[0] * kv[0] + idx[1] * kv[1] + idx[2] * kv[2]) as f64
                / n as f64;
            *v = Complex64::new(phase.cos(), phase.sin());
        });

        let mut plan = FftCC::new(layout, &FftOptions::default_parameters()).unwrap();
        plan.transform(1, &mut f).unwrap();

        assert!((f.at(kv) - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        assert!(f.at([0, 0, 0]).norm() < 1e-12);
        assert!(f.at([3, 3, 3]).norm() < 1e-12);
    }

    #[test]
    fn test_cc_unknown_direction() {
        let comm = Comm::single();
        let layout = layout3(comm, [4, 4, 4]);
        let mesh = mesh3([4, 4, 4]);
        let mut f: Field<Complex64, 3> = Field::new(mesh, layout.clone(), Centering::Cell);
        let mut plan = FftCC::new(layout, &FftOptions::default_parameters()).unwrap();
        assert!(matches!(
            plan.transform(2, &mut f),
            Err(FftError::UnknownDirection(2))
        ));
    }

    #[test]
    fn test_cc_distributed_matches_serial() {
        // 2 秩结果与单秩一致
        let n = 8usize;
        let value = |idx: [i64; 3]| {
            Complex64::new(
                ((idx[0] * 31 + idx[1] * 7 + idx[2]) as f64 * 0.13).sin(),
                ((idx[0] + idx[1] * 5 + idx[2] * 11) as f64 * 0.07).cos(),
            )
        };

        // 单秩参考
        let reference = {
            let comm = Comm::single();
            let layout = layout3(comm, [n, n, n]);
            let mesh = mesh3([n, n, n]);
            let mut f: Field<Complex64, 3> = Field::new(mesh, layout.clone(), Centering::Cell);
            f.apply_mut(|idx, v| *v = value(idx));
            let mut plan = FftCC::new(layout, &FftOptions::default_parameters()).unwrap();
            plan.transform(1, &mut f).unwrap();
            f
        };
        let global = *reference.owned_domain();
        let ref_vals = reference.interior_values();

        for comm_tag in ["ALL_TO_ALL", "ALL_TO_ALL_V", "P2P", "P2P_PIPELINED"] {
            let comms = ThreadComm::world(2);
            let ref_vals = ref_vals.clone();
            std::thread::scope(|s| {
                for comm in comms {
                    let ref_vals = ref_vals.clone();
                    s.spawn(move || {
                        let layout = layout3(comm, [n, n, n]);
                        let mesh = mesh3([n, n, n]);
                        let mut f: Field<Complex64, 3> =
                            Field::new(mesh, layout.clone(), Centering::Cell);
                        f.apply_mut(|idx, v| *v = value(idx));

                        let mut params = FftOptions::default_parameters();
                        params
                            .add("use_heffte_defaults", false)
                            .add("use_pencils", true)
                            .add("use_reorder", false)
                            .add("comm", comm_tag);
                        let mut plan = FftCC::new(layout.clone(), &params).unwrap();
                        plan.transform(1, &mut f).unwrap();

                        // 与单秩参考对比本秩拥有的部分
                        let owned = *f.owned_domain();
                        for flat in 0..owned.size() {
                            let idx = owned.unflatten(flat);
                            let rf = ref_vals[global.flatten(idx)];
                            let diff = (f.at(idx) - rf).norm();
                            assert!(diff < 1e-12, "comm={comm_tag} idx={idx:?} diff={diff}");
                        }
                    });
                }
            });
        }
    }

    #[test]
    fn test_rc_roundtrip() {
        let comm = Comm::single();
        let n = 8usize;
        let layout_in = layout3(comm.clone(), [n, n, n]);
        let layout_out = layout3(comm, [n / 2 + 1, n, n]);
        let mesh_in = mesh3([n, n, n]);
        let mesh_out = mesh3([n / 2 + 1, n, n]);

        let mut f: Field<f64, 3> = Field::new(mesh_in, layout_in.clone(), Centering::Cell);
        let mut g: Field<Complex64, 3> = Field::new(mesh_out, layout_out.clone(), Centering::Cell);

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let original: Vec<f64> = (0..f.owned_domain().size())
            .map(|_| rng.gen::<f64>() - 0.5)
            .collect();
        f.set_interior(&original).unwrap();

        let mut plan = FftRC::new(layout_in, layout_out, &FftOptions::default_parameters()).unwrap();
        plan.transform(1, &mut f, &mut g).unwrap();
        // 破坏 f 以确认逆向真正写回
        f.fill(0.0);
        plan.transform(-1, &mut f, &mut g).unwrap();

        let back = f.interior_values();
        let err = original
            .iter()
            .zip(&back)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(err < 1e-10, "r2c 往返误差 {err}");
    }

    #[test]
    fn test_rc_dc_mode_is_mean() {
        // 前向缩放 1/N：k=0 模应等于场均值
        let comm = Comm::single();
        let n = 4usize;
        let layout_in = layout3(comm.clone(), [n, n, n]);
        let layout_out = layout3(comm, [n / 2 + 1, n, n]);
        let mut f: Field<f64, 3> = Field::new(mesh3([n, n, n]), layout_in.clone(), Centering::Cell);
        let mut g: Field<Complex64, 3> =
            Field::new(mesh3([n / 2 + 1, n, n]), layout_out.clone(), Centering::Cell);
        f.apply_mut(|idx, v| *v = 1.0 + idx[0] as f64);

        let mut plan = FftRC::new(layout_in, layout_out, &FftOptions::default_parameters()).unwrap();
        plan.transform(1, &mut f, &mut g).unwrap();
        // 均值 = 1 + (0+1+2+3)/4 = 2.5
        assert!((g.at([0, 0, 0]).re - 2.5).abs() < 1e-12);
        assert!(g.at([0, 0, 0]).im.abs() < 1e-14);
    }

    #[test]
    fn test_rc_distributed_roundtrip() {
        let n = 8usize;
        let comms = ThreadComm::world(2);
        std::thread::scope(|s| {
            for comm in comms {
                s.spawn(move || {
                    let layout_in = layout3(comm.clone(), [n, n, n]);
                    let layout_out = layout3(comm, [n / 2 + 1, n, n]);
                    let mut f: Field<f64, 3> =
                        Field::new(mesh3([n, n, n]), layout_in.clone(), Centering::Cell);
                    let mut g: Field<Complex64, 3> = Field::new(
                        mesh3([n / 2 + 1, n, n]),
                        layout_out.clone(),
                        Centering::Cell,
                    );
                    f.apply_mut(|idx, v| {
                        *v = ((idx[0] * 17 + idx[1] * 3 + idx[2] * 7) as f64 * 0.11).sin()
                    });
                    let original = f.interior_values();

                    let mut plan =
                        FftRC::new(layout_in, layout_out, &FftOptions::default_parameters())
                            .unwrap();
                    plan.transform(1, &mut f, &mut g).unwrap();
                    f.fill(0.0);
                    plan.transform(-1, &mut f, &mut g).unwrap();

                    let back = f.interior_values();
                    let err = original
                        .iter()
                        .zip(&back)
                        .map(|(a, b)| (a - b).abs())
                        .fold(0.0, f64::max);
                    assert!(err < 1e-10);
                });
            }
        });
    }

    #[test]
    fn test_sine_roundtrip() {
        let comm = Comm::single();
        let layout = layout3(comm, [6, 6, 6]);
        let mut f: Field<f64, 3> = Field::new(mesh3([6, 6, 6]), layout.clone(), Centering::Cell);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let original: Vec<f64> = (0..f.owned_domain().size())
            .map(|_| rng.gen::<f64>() - 0.5)
            .collect();
        f.set_interior(&original).unwrap();

        let mut plan = FftSine::new(layout, &FftOptions::default_parameters()).unwrap();
        plan.transform(1, &mut f).unwrap();
        plan.transform(-1, &mut f).unwrap();

        let err = original
            .iter()
            .zip(&f.interior_values())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(err < 1e-12, "DST 往返误差 {err}");
    }

    #[test]
    fn test_sine_mode_is_eigenvector() {
        // sin(π (i+1) k / (n+1)) 是 DST-I 的本征向量
        let comm = Comm::single();
        let n = 7usize;
        let layout = layout3(comm, [n, n, n]);
        let mut f: Field<f64, 3> = Field::new(mesh3([n, n, n]), layout.clone(), Centering::Cell);
        let k = 2usize;
        f.apply_mut(|idx, v| {
            let s = |i: i64| {
                (std::f64::consts::PI * (i + 1) as f64 * k as f64 / (n + 1) as f64).sin()
            };
            *v = s(idx[0]) * s(idx[1]) * s(idx[2]);
        });
        let mut plan = FftSine::new(layout, &FftOptions::default_parameters()).unwrap();
        plan.transform(1, &mut f).unwrap();
        // 每轴谱系数 (n+1) 经 1/(2(n+1)) 缩放后为 1/2，三轴共 1/8
        let peak = f.at([(k - 1) as i64; 3]);
        assert!((peak - 0.125).abs() < 1e-12, "peak={peak}");
    }

    #[test]
    fn test_cosine_roundtrip() {
        let comm = Comm::single();
        let layout = layout3(comm, [6, 6, 6]);
        let mut f: Field<f64, 3> = Field::new(mesh3([6, 6, 6]), layout.clone(), Centering::Cell);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let original: Vec<f64> = (0..f.owned_domain().size())
            .map(|_| rng.gen::<f64>() - 0.5)
            .collect();
        f.set_interior(&original).unwrap();

        let mut plan = FftCos::new(layout, &FftOptions::default_parameters()).unwrap();
        plan.transform(1, &mut f).unwrap();
        plan.transform(-1, &mut f).unwrap();

        let err = original
            .iter()
            .zip(&f.interior_values())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(err < 1e-12, "DCT 往返误差 {err}");
    }

    #[test]
    fn test_options_rejects_unknown_comm() {
        let mut p = ParameterList::new();
        p.add("use_heffte_defaults", false)
            .add("use_pencils", true)
            .add("use_reorder", true)
            .add("comm", "RING");
        assert!(matches!(
            FftOptions::from_params(&p),
            Err(FftError::UnknownComm(_))
        ));
    }
}
