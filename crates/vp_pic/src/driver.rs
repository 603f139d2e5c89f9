// crates/vp_pic/src/driver.rs

//! PIC 驱动（蛙跳）
//!
//! 常数荷质比 −1 粒子系综在时刻 t 以步长 Δt 推进一步：
//!
//! 1. 半步 kick：P ← P − ½Δt·E_p（可选摩擦桩）
//! 2. 漂移：R ← R + Δt·P
//! 3. 粒子跨秩重分布
//! 4. 可选：按密度权重正交递归二分并重建布局
//! 5. 清零 ρ → scatter q → 除以单元体积得密度；全周期时减去
//!    均匀背景 Q_total/V 以强制零均值
//! 6. Poisson 求解 → 网格 E
//! 7. gather E → 粒子 E_p
//! 8. 半步 kick
//!
//! 场求解器按配置分派到周期谱、CG、开边界或 P3M。

use crate::config::PicConfig;
use crate::error::PicError;
use crate::orb::OrbBalancer;
use std::sync::Arc;
use vp_field::halo::fill_halo;
use vp_field::layout::FieldLayout;
use vp_field::Field;
use vp_mesh::{Centering, UniformCartesian};
use vp_particle::{gather, scatter, AttribHandle, ParticleContainer};
use vp_solver::{
    CgPoissonSolver, FrictionStub, OpenPoissonSolver, P3MSolver, PeriodicPoissonSolver,
    SolverError,
};

/// 场求解器分派
pub enum FieldSolver<const D: usize> {
    /// 周期谱求解器
    Fft(PeriodicPoissonSolver<D>),
    /// 共轭梯度求解器
    Cg(CgPoissonSolver<D>),
    /// 开边界求解器
    Open(OpenPoissonSolver<D>),
    /// P3M 混合求解器
    P3m(P3MSolver<D>),
}

impl<const D: usize> FieldSolver<D> {
    /// 按种类标签创建求解器
    pub fn from_kind(
        kind: &str,
        mesh: UniformCartesian<D>,
        layout: Arc<FieldLayout<D>>,
    ) -> Result<Self, PicError> {
        match kind {
            "FFT" => Ok(Self::Fft(PeriodicPoissonSolver::new(mesh, layout))),
            "CG" => {
                let mut solver = CgPoissonSolver::new(mesh, layout);
                let mut p = vp_core::ParameterList::new();
                p.add("output_type", "SOL_AND_GRAD");
                solver.merge_parameters(&p);
                Ok(Self::Cg(solver))
            }
            "OPEN" => Ok(Self::Open(OpenPoissonSolver::new(mesh, layout))),
            "P3M" => Ok(Self::P3m(P3MSolver::new(mesh, layout))),
            other => Err(PicError::Config {
                operation: "FieldSolver::from_kind",
                source: vp_core::ConfigError::InvalidValue {
                    key: "solver".to_string(),
                    reason: format!("未知求解器种类 {other}"),
                },
            }),
        }
    }

    /// 初始化内部计划
    pub fn initialize(&mut self) -> Result<(), SolverError> {
        match self {
            Self::Fft(s) => s.initialize(),
            Self::Cg(s) => s.initialize(),
            Self::Open(s) => s.initialize(),
            Self::P3m(s) => s.initialize(),
        }
    }

    /// 求解一次；E 写入 `e`，CG 路径同时写 `phi`
    pub fn solve(
        &mut self,
        rho: &mut Field<f64, D>,
        phi: &mut Field<f64, D>,
        e: &mut Field<[f64; D], D>,
    ) -> Result<(), SolverError> {
        match self {
            Self::Fft(s) => s.solve(rho, None, Some(e)),
            Self::Cg(s) => s.solve(rho, phi, Some(e)),
            Self::Open(s) => s.solve(rho, None, Some(e)),
            Self::P3m(s) => s.solve(rho, None, Some(e)),
        }
    }

    /// 布局变更
    pub fn relayout(&mut self, mesh: UniformCartesian<D>, layout: Arc<FieldLayout<D>>) {
        match self {
            Self::Fft(s) => s.relayout(mesh, layout),
            Self::Cg(s) => s.relayout(mesh, layout),
            Self::Open(s) => s.relayout(mesh, layout),
            Self::P3m(s) => s.relayout(mesh, layout),
        }
    }
}

/// PIC 驱动
pub struct PicDriver<const D: usize> {
    config: PicConfig,
    mesh: UniformCartesian<D>,
    layout: Arc<FieldLayout<D>>,
    /// 粒子容器（位置、电荷、速度与粒子上的场）
    pub particles: ParticleContainer<D>,
    q: AttribHandle<f64>,
    vel: AttribHandle<[f64; D]>,
    e_p: AttribHandle<[f64; D]>,
    /// 密度场 ρ
    pub rho: Field<f64, D>,
    /// 电势 φ（CG 路径写入）
    pub phi: Field<f64, D>,
    /// 电场 E
    pub e_field: Field<[f64; D], D>,
    solver: FieldSolver<D>,
    balancer: OrbBalancer<D>,
    friction: FrictionStub,
    /// scatter 后、体积换算前的全局电荷和（诊断）
    pub scattered_charge: f64,
    time: f64,
    iteration: usize,
}

impl<const D: usize> PicDriver<D> {
    /// 创建驱动并注册粒子属性
    pub fn new(
        config: PicConfig,
        mesh: UniformCartesian<D>,
        layout: Arc<FieldLayout<D>>,
    ) -> Result<Self, PicError> {
        let mut particles = ParticleContainer::new(mesh.clone(), layout.clone());
        let q = particles.register::<f64>()?;
        let vel = particles.register::<[f64; D]>()?;
        let e_p = particles.register::<[f64; D]>()?;

        let rho = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        let phi = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        let e_field = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        let solver = FieldSolver::from_kind(&config.solver, mesh.clone(), layout.clone())?;
        let balancer = OrbBalancer::new(config.rebalance_threshold, config.axes_eligible)?;
        let friction = FrictionStub::new(config.friction_gamma);

        Ok(Self {
            config,
            mesh,
            layout,
            particles,
            q,
            vel,
            e_p,
            rho,
            phi,
            e_field,
            solver,
            balancer,
            friction,
            scattered_charge: 0.0,
            time: 0.0,
            iteration: 0,
        })
    }

    /// 电荷属性句柄
    pub fn charge_handle(&self) -> AttribHandle<f64> {
        self.q
    }

    /// 速度属性句柄
    pub fn velocity_handle(&self) -> AttribHandle<[f64; D]> {
        self.vel
    }

    /// 粒子上电场属性句柄
    pub fn e_handle(&self) -> AttribHandle<[f64; D]> {
        self.e_p
    }

    /// 已推进的物理时间
    pub fn time(&self) -> f64 {
        self.time
    }

    /// 已完成的步数
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// 时间步长
    pub fn dt(&self) -> f64 {
        self.config.dt
    }

    /// 初始化求解器
    pub fn initialize(&mut self) -> Result<(), PicError> {
        self.solver.initialize()?;
        Ok(())
    }

    /// 初始分布就位后的首次场求解
    ///
    /// 粒子创建并 `update` 之后调用一次，使 E_p 在第一次
    /// 半步 kick 前有定义。
    pub fn pre_run(&mut self) -> Result<(), PicError> {
        self.particles.update()?;
        self.par2grid()?;
        self.solve_field()?;
        self.grid2par()?;
        tracing::info!(
            particles = self.particles.local_num(),
            charge = self.scattered_charge,
            "PIC 驱动就绪"
        );
        Ok(())
    }

    /// 半步 kick：P ← P − ½Δt·E_p（荷质比 −1）
    pub fn kick(&mut self, half_dt: f64) {
        let e_vals = self.particles.view(self.e_p).to_vec();
        let vel = self.particles.view_mut(self.vel);
        for (v, e) in vel.iter_mut().zip(&e_vals) {
            for d in 0..D {
                v[d] -= half_dt * e[d];
            }
        }
        if self.friction.is_active() {
            self.friction.apply(vel, half_dt);
        }
    }

    /// 漂移：R ← R + Δt·P
    pub fn drift(&mut self, dt: f64) {
        let v_vals = self.particles.view(self.vel).to_vec();
        let positions = self.particles.positions_mut();
        for (r, v) in positions.iter_mut().zip(&v_vals) {
            for d in 0..D {
                r[d] += dt * v[d];
            }
        }
    }

    /// scatter：粒子电荷 → 密度场
    ///
    /// scatter 后记录全局电荷和，再除以单元体积换算为密度；
    /// 每个面均为周期时减去均匀背景以强制零均值。
    pub fn par2grid(&mut self) -> Result<(), PicError> {
        self.rho.fill(0.0);
        let q_vals = self.particles.view(self.q).to_vec();
        scatter(&q_vals, &mut self.rho, self.particles.positions())?;
        self.scattered_charge = self.rho.sum()?;

        let cell_vol = self.mesh.cell_volume();
        self.rho.apply_mut(|_, v| *v /= cell_vol);

        // 背景减除只在每个面都是周期时进行
        if self.layout.is_all_periodic() {
            let background = self.scattered_charge / self.mesh.total_volume();
            self.rho.apply_mut(|_, v| *v -= background);
        }
        Ok(())
    }

    /// Poisson 求解并为 gather 填充 E 场 halo
    pub fn solve_field(&mut self) -> Result<(), PicError> {
        self.solver
            .solve(&mut self.rho, &mut self.phi, &mut self.e_field)?;
        fill_halo(&mut self.e_field)?;
        Ok(())
    }

    /// gather：网格 E → 粒子 E_p
    pub fn grid2par(&mut self) -> Result<(), PicError> {
        let positions = self.particles.positions().to_vec();
        let out = self.particles.view_mut(self.e_p);
        gather(out, &self.e_field, &positions)?;
        Ok(())
    }

    /// 推进一个时间步
    pub fn step(&mut self) -> Result<(), PicError> {
        let dt = self.config.dt;

        self.kick(0.5 * dt);
        self.drift(dt);
        self.particles.update()?;

        if self.balancer.enabled() {
            let load = self.particles.local_num() as f64;
            if self.balancer.should_rebalance(&self.layout, load)? {
                self.rebalance()?;
            }
        }

        self.par2grid()?;
        self.solve_field()?;
        self.grid2par()?;
        self.kick(0.5 * dt);

        self.time += dt;
        self.iteration += 1;
        Ok(())
    }

    /// 按密度权重再划分布局并迁移场与粒子
    pub fn rebalance(&mut self) -> Result<(), PicError> {
        // 以电荷幅值的 scatter 结果为权重
        self.rho.fill(0.0);
        let w_vals: Vec<f64> = self
            .particles
            .view(self.q)
            .iter()
            .map(|q| q.abs())
            .collect();
        scatter(&w_vals, &mut self.rho, self.particles.positions())?;

        let domains = self.balancer.partition(&self.rho)?;
        let new_layout = Arc::new(self.layout.rebuild_with_domains(domains)?);

        self.rho.remap(new_layout.clone())?;
        self.phi.remap(new_layout.clone())?;
        self.e_field.remap(new_layout.clone())?;
        self.solver.relayout(self.mesh.clone(), new_layout.clone());
        self.solver.initialize()?;
        self.particles.set_layout(new_layout.clone());
        self.particles.update()?;
        self.layout = new_layout;
        tracing::info!(iteration = self.iteration, "布局已再均衡");
        Ok(())
    }

    /// 全局粒子电荷和（诊断）
    pub fn total_charge(&self) -> Result<f64, PicError> {
        let local = vp_foundation::pairwise_sum(self.particles.view(self.q));
        Ok(self.layout.comm().all_reduce_sum(local)?)
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
    use vp_field::layout::AxisDecomp;
    use vp_foundation::NDIndex;

    fn make_driver(n: usize, np: usize, dt: f64) -> PicDriver<3> {
        let comm = vp_core::Comm::single();
        let global = NDIndex::with_lengths([n, n, n]);
        let layout = Arc::new(
            FieldLayout::all_periodic(comm, global, [AxisDecomp::Parallel; 3], 1).unwrap(),
        );
        let h = 1.0 / n as f64;
        let mesh = UniformCartesian::new(global, [h; 3], [0.0; 3]);
        let config = PicConfig {
            dt,
            ..PicConfig::default()
        };
        let mut driver = PicDriver::new(config, mesh, layout).unwrap();
        driver.initialize().unwrap();

        // 均匀随机粒子，单位总电荷
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        driver.particles.create(np);
        let positions: Vec<[f64; 3]> = (0..np)
            .map(|_| [rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()])
            .collect();
        driver.particles.positions_mut().copy_from_slice(&positions);
        let qh = driver.charge_handle();
        let q_each = 1.0 / np as f64;
        for q in driver.particles.view_mut(qh) {
            *q = q_each;
        }
        driver
    }

    #[test]
    fn test_charge_conservation_through_scatter() {
        // scatter 进 ρ 的总电荷（体积换算前）必须等于 Σq
        let mut driver = make_driver(8, 1000, 0.05);
        driver.pre_run().unwrap();
        let total_q = driver.total_charge().unwrap();
        assert!(
            (driver.scattered_charge - total_q).abs() / total_q.abs() < 1e-12,
            "scatter 电荷 {} vs Σq {total_q}",
            driver.scattered_charge
        );
    }

    #[test]
    fn test_periodic_field_integral_is_zero() {
        // 全周期、电荷中性背景下 E 的全域积分为零
        let mut driver = make_driver(8, 500, 0.05);
        driver.pre_run().unwrap();
        let owned = *driver.e_field.owned_domain();
        let mut sums = [0.0f64; 3];
        for flat in 0..owned.size() {
            let idx = owned.unflatten(flat);
            for d in 0..3 {
                sums[d] += driver.e_field.at(idx)[d];
            }
        }
        for d in 0..3 {
            assert!(sums[d].abs() < 1e-8, "E_{d} 积分 = {}", sums[d]);
        }
    }

    #[test]
    fn test_leapfrog_time_reversibility_on_frozen_field() {
        // 冻结 E_p 下前进 N 步、速度取反再前进 N 步应回到原位
        let mut driver = make_driver(8, 50, 0.02);
        // 施加固定的非平凡 E_p
        let eh = driver.e_handle();
        for (i, e) in driver.particles.view_mut(eh).iter_mut().enumerate() {
            *e = [0.3 + 0.01 * i as f64, -0.2, 0.1];
        }
        let r0: Vec<[f64; 3]> = driver.particles.positions().to_vec();
        let ids0: Vec<u64> = driver.particles.ids().to_vec();

        let n_steps = 10;
        let dt = 0.02;
        for _ in 0..n_steps {
            driver.kick(0.5 * dt);
            driver.drift(dt);
            driver.kick(0.5 * dt);
        }
        // 速度取反；E_p 保持不变（力只依赖位置的时间反演）
        let vh = driver.velocity_handle();
        for v in driver.particles.view_mut(vh) {
            for x in v.iter_mut() {
                *x = -*x;
            }
        }
        for _ in 0..n_steps {
            driver.kick(0.5 * dt);
            driver.drift(dt);
            driver.kick(0.5 * dt);
        }

        // 粒子顺序未变（无 update 调用），逐粒子比较
        assert_eq!(driver.particles.ids(), &ids0[..]);
        for (r, r_init) in driver.particles.positions().iter().zip(&r0) {
            for d in 0..3 {
                let err = (r[d] - r_init[d]).abs();
                assert!(err < 1e-10, "位置回归误差 {err}");
            }
        }
    }

    #[test]
    fn test_step_advances_time_and_conserves_charge() {
        let mut driver = make_driver(8, 400, 0.01);
        driver.pre_run().unwrap();
        let q0 = driver.total_charge().unwrap();
        for _ in 0..3 {
            driver.step().unwrap();
        }
        assert_eq!(driver.iteration(), 3);
        assert!((driver.time() - 0.03).abs() < 1e-14);
        let q1 = driver.total_charge().unwrap();
        assert!((q0 - q1).abs() < 1e-14);
        // 每一步 scatter 的电荷都与 Σq 一致
        assert!((driver.scattered_charge - q1).abs() / q1.abs() < 1e-12);
    }

    #[test]
    fn test_unknown_solver_kind_rejected() {
        let comm = vp_core::Comm::single();
        let global = NDIndex::with_lengths([4, 4, 4]);
        let layout = Arc::new(
            FieldLayout::all_periodic(comm, global, [AxisDecomp::Parallel; 3], 1).unwrap(),
        );
        let mesh = UniformCartesian::new(global, [0.25; 3], [0.0; 3]);
        let config = PicConfig {
            solver: "MAGIC".to_string(),
            ..PicConfig::default()
        };
        assert!(matches!(
            PicDriver::<3>::new(config, mesh, layout),
            Err(PicError::Config { .. })
        ));
    }

    #[test]
    fn test_cg_solver_path_matches_fft_coarsely() {
        // CG 与谱求解器对同一密度给出同阶的电场
        let comm = vp_core::Comm::single();
        let n = 8usize;
        let global = NDIndex::with_lengths([n, n, n]);
        let layout = Arc::new(
            FieldLayout::all_periodic(comm, global, [AxisDecomp::Parallel; 3], 1).unwrap(),
        );
        let h = 1.0 / n as f64;
        let mesh = UniformCartesian::new(global, [h; 3], [0.0; 3]);

        let mut rho = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        let mesh_c = mesh.clone();
        rho.apply_mut(|idx, v| {
            *v = (2.0 * std::f64::consts::PI * mesh_c.cell_center(idx)[0]).cos()
        });
        let mut phi = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        let mut e_fft: Field<[f64; 3], 3> = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        let mut e_cg: Field<[f64; 3], 3> = Field::new(mesh.clone(), layout.clone(), Centering::Cell);

        let mut fft = FieldSolver::from_kind("FFT", mesh.clone(), layout.clone()).unwrap();
        fft.initialize().unwrap();
        fft.solve(&mut rho, &mut phi, &mut e_fft).unwrap();

        let mut cg = FieldSolver::from_kind("CG", mesh, layout).unwrap();
        cg.initialize().unwrap();
        cg.solve(&mut rho, &mut phi, &mut e_cg).unwrap();

        // 谱解与二阶差分解在粗网格上相差 O(h²)
        let owned = *e_fft.owned_domain();
        for flat in 0..owned.size() {
            let idx = owned.unflatten(flat);
            let a = e_fft.at(idx)[0];
            let b = e_cg.at(idx)[0];
            assert!((a - b).abs() < 0.1 * a.abs().max(0.05));
        }
    }
}
