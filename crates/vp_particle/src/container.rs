// crates/vp_particle/src/container.rs

//! 粒子容器
//!
//! 以名义不变的粒子身份（ID 属性）组织的一组等长属性数组。
//! 位置属性 R 是首个槽位；挂接空间布局后，每个粒子的 R 必须
//! 落在拥有秩的局部域内（容差半个单元）。
//!
//! 生命周期：
//! - `create(n)` / `global_create(n)`: 追加槽位并签发全局唯一 ID
//! - `destroy(mask)`: 稳定压实掉被标记的槽位
//! - `update()`: 位置越界的粒子按目标秩打包，一次 all-to-all-v
//!   重分布，接收端按注册顺序解包追加

use crate::attrib::{AttribHandle, AttribSlot, ParticleAttrib};
use crate::error::ParticleError;
use std::marker::PhantomData;
use std::sync::Arc;
use vp_field::FieldLayout;
use vp_mesh::UniformCartesian;

/// 位置属性槽位
const SLOT_R: usize = 0;
/// ID 属性槽位
const SLOT_ID: usize = 1;

/// 粒子容器
pub struct ParticleContainer<const D: usize> {
    mesh: UniformCartesian<D>,
    layout: Arc<FieldLayout<D>>,
    local_num: usize,
    create_counter: u64,
    slots: Vec<Box<dyn AttribSlot>>,
}

impl<const D: usize> ParticleContainer<D> {
    /// 在网格与布局上创建空容器
    ///
    /// 自动注册位置属性 R 与身份属性 ID。
    pub fn new(mesh: UniformCartesian<D>, layout: Arc<FieldLayout<D>>) -> Self {
        let slots: Vec<Box<dyn AttribSlot>> = vec![
            Box::new(ParticleAttrib::<[f64; D]>::new()),
            Box::new(ParticleAttrib::<u64>::new()),
        ];
        Self {
            mesh,
            layout,
            local_num: 0,
            create_counter: 0,
            slots,
        }
    }

    /// 本地粒子数
    #[inline]
    pub fn local_num(&self) -> usize {
        self.local_num
    }

    /// 空间布局
    #[inline]
    pub fn layout(&self) -> &Arc<FieldLayout<D>> {
        &self.layout
    }

    /// 网格
    #[inline]
    pub fn mesh(&self) -> &UniformCartesian<D> {
        &self.mesh
    }

    /// 替换空间布局（负载均衡后由驱动调用）
    ///
    /// 仅替换布局引用；粒子归属在下一次 [`Self::update`] 时
    /// 按新布局重建。
    pub fn set_layout(&mut self, layout: Arc<FieldLayout<D>>) {
        self.layout = layout;
    }

    /// 注册一个新属性
    ///
    /// 必须在任何粒子创建之前完成；注册顺序即跨秩线格式。
    pub fn register<T: bytemuck::Pod + Send + Sync + 'static>(
        &mut self,
    ) -> Result<AttribHandle<T>, ParticleError> {
        if self.local_num != 0 {
            return Err(ParticleError::Registration {
                operation: "register",
                reason: "粒子已创建, 属性注册必须先于创建".to_string(),
            });
        }
        let index = self.slots.len();
        self.slots.push(Box::new(ParticleAttrib::<T>::new()));
        Ok(AttribHandle {
            index,
            _marker: PhantomData,
        })
    }

    /// 属性只读视图
    pub fn view<T: bytemuck::Pod + Send + Sync + 'static>(&self, h: AttribHandle<T>) -> &[T] {
        self.slots[h.index]
            .as_any()
            .downcast_ref::<ParticleAttrib<T>>()
            .expect("属性句柄类型不匹配")
            .as_slice()
    }

    /// 属性可变视图
    pub fn view_mut<T: bytemuck::Pod + Send + Sync + 'static>(
        &mut self,
        h: AttribHandle<T>,
    ) -> &mut [T] {
        self.slots[h.index]
            .as_any_mut()
            .downcast_mut::<ParticleAttrib<T>>()
            .expect("属性句柄类型不匹配")
            .as_mut_slice()
    }

    /// 位置属性 R
    pub fn positions(&self) -> &[[f64; D]] {
        self.view(AttribHandle {
            index: SLOT_R,
            _marker: PhantomData,
        })
    }

    /// 位置属性 R（可变）
    pub fn positions_mut(&mut self) -> &mut [[f64; D]] {
        self.view_mut(AttribHandle {
            index: SLOT_R,
            _marker: PhantomData,
        })
    }

    /// 身份属性 ID
    pub fn ids(&self) -> &[u64] {
        self.view(AttribHandle {
            index: SLOT_ID,
            _marker: PhantomData,
        })
    }

    /// 追加 `n` 个本地粒子
    ///
    /// 新槽位除 ID 外零初始化，由调用方填充。ID 取
    /// `rank + k * size`，跨秩全局唯一且跨重分布不变。
    pub fn create(&mut self, n: usize) {
        for slot in &mut self.slots {
            slot.create(n);
        }
        let comm = self.layout.comm();
        let rank = comm.rank() as u64;
        let size = comm.size() as u64;
        let base = self.create_counter;
        let ids = self.view_mut(AttribHandle::<u64> {
            index: SLOT_ID,
            _marker: PhantomData,
        });
        let start = ids.len() - n;
        for k in 0..n {
            ids[start + k] = rank + (base + k as u64) * size;
        }
        self.create_counter += n as u64;
        self.local_num += n;
    }

    /// 全局创建 `n_total` 个粒子，均匀分到各秩（余数给低秩）
    pub fn global_create(&mut self, n_total: usize) {
        let comm = self.layout.comm();
        let p = comm.size();
        let rank = comm.rank();
        let n_local = n_total / p + usize::from(rank < n_total % p);
        self.create(n_local);
    }

    /// 销毁被标记的粒子并就地压实
    pub fn destroy(&mut self, mask: &[bool]) -> Result<(), ParticleError> {
        if mask.len() != self.local_num {
            return Err(ParticleError::Registration {
                operation: "destroy",
                reason: format!("掩码长度 {} 与粒子数 {} 不符", mask.len(), self.local_num),
            });
        }
        let keep: Vec<bool> = mask.iter().map(|&m| !m).collect();
        for slot in &mut self.slots {
            slot.keep(&keep);
        }
        self.local_num = self.slots[SLOT_R].len();
        Ok(())
    }

    /// 跨秩重分布
    ///
    /// 周期轴上的位置先回绕；非周期轴上越出全局域的位置报
    /// 域错误。随后按位置定位目标秩，打包、一次 all-to-all-v、
    /// 解包追加、压实。
    pub fn update(&mut self) -> Result<(), ParticleError> {
        self.apply_position_bc()?;

        let comm = self.layout.comm().clone();
        let me = comm.rank();
        let p = comm.size();
        let global = *self.layout.global_domain();

        // 目标秩
        let mut dest = vec![0usize; self.local_num];
        {
            let layout = self.layout.clone();
            let mesh = self.mesh.clone();
            for (i, r) in self.positions().iter().enumerate() {
                let mut cell = mesh.locate(*r);
                // 浮点回绕的边缘情形：钳制进全局域
                for d in 0..D {
                    cell[d] = cell[d].clamp(global[d].first(), global[d].last());
                }
                dest[i] = layout.find_owner(cell).ok_or(ParticleError::Domain {
                    operation: "update",
                    reason: format!("单元 {cell:?} 无拥有秩"),
                })?;
            }
        }

        // 按目标秩分桶
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); p];
        let mut leaving = vec![false; self.local_num];
        for (i, &r) in dest.iter().enumerate() {
            if r != me {
                buckets[r].push(i);
                leaving[i] = true;
            }
        }
        let n_leaving: usize = buckets.iter().map(|b| b.len()).sum();

        // 打包：u64 粒子数 + 按注册顺序的属性段
        let mut sends: Vec<Vec<u8>> = Vec::with_capacity(p);
        for (r, bucket) in buckets.iter().enumerate() {
            if r == me || bucket.is_empty() {
                sends.push(Vec::new());
                continue;
            }
            let mut msg = Vec::new();
            msg.extend_from_slice(&(bucket.len() as u64).to_le_bytes());
            for slot in &self.slots {
                msg.extend_from_slice(&slot.pack(bucket));
            }
            sends.push(msg);
        }

        let received = comm.all_to_all_v::<u8>(sends)?;

        // 压实掉已发出的粒子
        self.destroy(&leaving)?;

        // 解包追加
        let mut n_arriving = 0usize;
        for msg in received {
            if msg.is_empty() {
                continue;
            }
            let count = u64::from_le_bytes(msg[..8].try_into().map_err(|_| {
                ParticleError::Registration {
                    operation: "update",
                    reason: "消息头不完整".to_string(),
                }
            })?) as usize;
            let mut offset = 8usize;
            for slot in &mut self.slots {
                let chunk = count * slot.elem_size();
                if offset + chunk > msg.len() {
                    return Err(ParticleError::Registration {
                        operation: "update",
                        reason: "消息长度与属性布局不符".to_string(),
                    });
                }
                slot.unpack_append(&msg[offset..offset + chunk])?;
                offset += chunk;
            }
            n_arriving += count;
        }
        self.local_num = self.slots[SLOT_R].len();
        debug_assert!(self
            .slots
            .iter()
            .all(|s| s.len() == self.local_num));

        if n_leaving + n_arriving > 0 {
            tracing::debug!(
                rank = me,
                leaving = n_leaving,
                arriving = n_arriving,
                local = self.local_num,
                "粒子重分布完成"
            );
        }
        Ok(())
    }

    /// 位置边界条件：周期回绕或域校验
    fn apply_position_bc(&mut self) -> Result<(), ParticleError> {
        let origin = self.mesh.origin();
        let extent = self.mesh.extent();
        let layout = self.layout.clone();
        let mut violation: Option<String> = None;
        for (i, r) in self.positions_mut().iter_mut().enumerate() {
            for d in 0..D {
                if layout.is_periodic(d) {
                    r[d] = origin[d] + (r[d] - origin[d]).rem_euclid(extent[d]);
                } else if r[d] < origin[d] || r[d] > origin[d] + extent[d] {
                    violation = Some(format!("粒子 {i} 轴 {d} 位置 {} 越出全局域", r[d]));
                    break;
                }
            }
            if violation.is_some() {
                break;
            }
        }
        match violation {
            Some(reason) => Err(ParticleError::Domain {
                operation: "apply_position_bc",
                reason,
            }),
            None => Ok(()),
        }
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use vp_core::{Comm, ThreadComm};
    use vp_field::layout::AxisDecomp;
    use vp_foundation::NDIndex;

    fn container1(n: usize) -> ParticleContainer<3> {
        let comm = Comm::single();
        let global = NDIndex::with_lengths([n, n, n]);
        let layout = Arc::new(
            FieldLayout::all_periodic(comm, global, [AxisDecomp::Parallel; 3], 1).unwrap(),
        );
        let h = 1.0 / n as f64;
        let mesh = UniformCartesian::new(global, [h; 3], [0.0; 3]);
        ParticleContainer::new(mesh, layout)
    }

    #[test]
    fn test_create_assigns_unique_ids() {
        let mut c = container1(4);
        c.create(5);
        assert_eq!(c.local_num(), 5);
        assert_eq!(c.ids(), &[0, 1, 2, 3, 4]);
        c.create(2);
        assert_eq!(c.ids(), &[0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_register_after_create_rejected() {
        let mut c = container1(4);
        c.create(1);
        assert!(c.register::<f64>().is_err());
    }

    #[test]
    fn test_registered_attribute_tracks_length() {
        let mut c = container1(4);
        let q = c.register::<f64>().unwrap();
        c.create(3);
        assert_eq!(c.view(q).len(), 3);
        c.view_mut(q).copy_from_slice(&[1.0, 2.0, 3.0]);

        c.destroy(&[false, true, false]).unwrap();
        assert_eq!(c.view(q), &[1.0, 3.0]);
        // ID 随压实保持对应
        assert_eq!(c.ids(), &[0, 2]);
    }

    #[test]
    fn test_periodic_wrap_in_update() {
        let mut c = container1(4);
        c.create(1);
        c.positions_mut()[0] = [1.25, -0.25, 0.5];
        c.update().unwrap();
        let r = c.positions()[0];
        assert!((r[0] - 0.25).abs() < 1e-12);
        assert!((r[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_domain_rejected_nonperiodic() {
        let comm = Comm::single();
        let global = NDIndex::with_lengths([4, 4, 4]);
        let layout = Arc::new(
            FieldLayout::new(
                comm,
                global,
                [AxisDecomp::Parallel; 3],
                [[vp_field::BoundaryPolicy::DirichletZero; 2]; 3],
                1,
            )
            .unwrap(),
        );
        let mesh = UniformCartesian::new(global, [0.25; 3], [0.0; 3]);
        let mut c = ParticleContainer::new(mesh, layout);
        c.create(1);
        c.positions_mut()[0] = [1.5, 0.5, 0.5];
        assert!(matches!(
            c.update(),
            Err(ParticleError::Domain { .. })
        ));
    }

    #[test]
    fn test_global_create_splits_evenly() {
        let comms = ThreadComm::world(4);
        std::thread::scope(|s| {
            for comm in comms {
                s.spawn(move || {
                    let global = NDIndex::with_lengths([8, 8, 8]);
                    let layout = Arc::new(
                        FieldLayout::all_periodic(
                            comm.clone(),
                            global,
                            [AxisDecomp::Parallel; 3],
                            1,
                        )
                        .unwrap(),
                    );
                    let mesh = UniformCartesian::new(global, [0.125; 3], [0.0; 3]);
                    let mut c = ParticleContainer::new(mesh, layout);
                    c.global_create(10);
                    // 10 = 3 + 3 + 2 + 2
                    let expect = if comm.rank() < 2 { 3 } else { 2 };
                    assert_eq!(c.local_num(), expect);
                    let total = comm.all_reduce_sum(c.local_num() as f64).unwrap();
                    assert_eq!(total, 10.0);
                });
            }
        });
    }

    #[test]
    fn test_update_moves_particle_to_owner() {
        // 4 秩：粒子从 0.51L 移到 0.49L 后应归左半秩所有
        let comms = ThreadComm::world(4);
        std::thread::scope(|s| {
            for comm in comms {
                s.spawn(move || {
                    let global = NDIndex::with_lengths([8, 8, 8]);
                    let layout = Arc::new(
                        FieldLayout::all_periodic(
                            comm.clone(),
                            global,
                            [AxisDecomp::Parallel; 3],
                            1,
                        )
                        .unwrap(),
                    );
                    let mesh = UniformCartesian::new(global, [0.125; 3], [0.0; 3]);
                    let mut c = ParticleContainer::new(mesh.clone(), layout.clone());

                    // 粒子初始在 (0.51, 0.1, 0.1)，由其拥有秩创建
                    let start = [0.51, 0.1, 0.1];
                    let start_owner = layout.find_owner(mesh.locate(start)).unwrap();
                    if comm.rank() == start_owner {
                        c.create(1);
                        c.positions_mut()[0] = start;
                    }
                    c.update().unwrap();

                    // 移动越过中线
                    let moved = [0.49, 0.1, 0.1];
                    for r in c.positions_mut() {
                        *r = moved;
                    }
                    c.update().unwrap();

                    let end_owner = layout.find_owner(mesh.locate(moved)).unwrap();
                    if comm.rank() == end_owner {
                        assert_eq!(c.local_num(), 1);
                        // 身份跨迁移不变
                        assert_eq!(c.ids()[0] as usize % 4, start_owner);
                    } else {
                        assert_eq!(c.local_num(), 0);
                    }
                });
            }
        });
    }
}
