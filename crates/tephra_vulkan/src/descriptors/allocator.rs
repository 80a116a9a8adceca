use ash::vk;
use std::collections::{HashMap, VecDeque};

use super::DescriptorType;
use crate::VulkanError;

#[derive(thiserror::Error, Debug)]
pub enum DescriptorAllocatorError {
    #[error("Failed to create a descriptor pool: {0}")]
    CantCreatePool(VulkanError),
    #[error("Failed to allocate a descriptor set: {0}")]
    CantAllocate(VulkanError),
    #[error("Failed to reset a descriptor pool: {0}")]
    CantReset(VulkanError),
    #[error("Failed to free a descriptor set: {0}")]
    CantFree(VulkanError),
}

impl DescriptorAllocatorError {
    pub fn vulkan_error(&self) -> VulkanError {
        match self {
            DescriptorAllocatorError::CantCreatePool(err)
            | DescriptorAllocatorError::CantAllocate(err)
            | DescriptorAllocatorError::CantReset(err)
            | DescriptorAllocatorError::CantFree(err) => *err,
        }
    }
}

struct PoolSizeMultiplier {
    ty: DescriptorType,
    multiplier: f32,
}

impl PoolSizeMultiplier {
    /// Descriptors reserved per set for each type a shader program can bind
    pub const MULTIPLIERS: [PoolSizeMultiplier; 2] = [
        PoolSizeMultiplier {
            ty: DescriptorType::UniformBuffer,
            multiplier: 2.0,
        },
        PoolSizeMultiplier {
            ty: DescriptorType::CombinedImageSampler,
            multiplier: 4.0,
        },
    ];
}

pub(crate) fn pool_sizes(sets_per_pool: u32) -> Vec<vk::DescriptorPoolSize> {
    PoolSizeMultiplier::MULTIPLIERS
        .iter()
        .map(|size| vk::DescriptorPoolSize {
            ty: size.ty.into(),
            descriptor_count: ((sets_per_pool as f32 * size.multiplier) as u32).max(1),
        })
        .collect()
}

/// Hands out descriptor sets from a growing list of pools
///
/// A fresh pool is created whenever the current one runs out. Sets can be freed one by one; a
/// pool that isn't current anymore goes back to the free list once its last set is freed.
pub struct DescriptorAllocator {
    sets_per_pool: u32,
    current_pool: vk::DescriptorPool,
    used_pools: Vec<vk::DescriptorPool>,
    free_pools: VecDeque<vk::DescriptorPool>,
    /// Pool each live set was allocated from
    owners: HashMap<vk::DescriptorSet, vk::DescriptorPool>,
    live_sets: HashMap<vk::DescriptorPool, u32>,
    device: ash::Device,
}

impl DescriptorAllocator {
    pub fn new(device: ash::Device, sets_per_pool: u32) -> DescriptorAllocator {
        DescriptorAllocator {
            sets_per_pool: sets_per_pool.max(1),
            current_pool: vk::DescriptorPool::null(),
            used_pools: Vec::new(),
            free_pools: VecDeque::new(),
            owners: HashMap::new(),
            live_sets: HashMap::new(),
            device,
        }
    }
}

impl DescriptorAllocator {
    fn create_pool(&self) -> Result<vk::DescriptorPool, DescriptorAllocatorError> {
        let sizes = pool_sizes(self.sets_per_pool);

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(self.sets_per_pool)
            .pool_sizes(&sizes);

        let handle = unsafe {
            self.device
                .create_descriptor_pool(&create_info, None)
                .map_err(|err| DescriptorAllocatorError::CantCreatePool(err.into()))?
        };
        log::debug!("Created descriptor pool for {} sets", self.sets_per_pool);

        Ok(handle)
    }

    fn next_pool(&mut self) -> Result<vk::DescriptorPool, DescriptorAllocatorError> {
        let pool = match self.free_pools.pop_back() {
            Some(pool) => pool,
            None => self.create_pool()?,
        };
        self.current_pool = pool;
        self.used_pools.push(pool);

        Ok(pool)
    }

    fn allocate_from(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError> {
        let set_layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .set_layouts(&set_layouts)
            .descriptor_pool(pool);

        let handles = unsafe { self.device.allocate_descriptor_sets(&allocate_info)? };
        handles
            .first()
            .copied()
            .ok_or(VulkanError::Other(vk::Result::ERROR_UNKNOWN))
    }

    pub fn allocate(
        &mut self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DescriptorAllocatorError> {
        if self.current_pool == vk::DescriptorPool::null() {
            self.next_pool()?;
        }

        let pool = self.current_pool;
        let (set, pool) = match self.allocate_from(pool, layout) {
            Ok(set) => (set, pool),
            Err(VulkanError::OutOfPoolMemory) | Err(VulkanError::FragmentedPool) => {
                let pool = self.next_pool()?;
                let set = self
                    .allocate_from(pool, layout)
                    .map_err(DescriptorAllocatorError::CantAllocate)?;
                (set, pool)
            }
            Err(err) => return Err(DescriptorAllocatorError::CantAllocate(err)),
        };

        self.owners.insert(set, pool);
        *self.live_sets.entry(pool).or_insert(0) += 1;
        Ok(set)
    }

    /// Returns a single set to its pool
    ///
    /// Sets this allocator doesn't know about, for example ones invalidated by
    /// [reset_pools](DescriptorAllocator::reset_pools), are ignored.
    pub fn free(&mut self, set: vk::DescriptorSet) -> Result<(), DescriptorAllocatorError> {
        let pool = match self.owners.remove(&set) {
            Some(pool) => pool,
            None => {
                log::debug!("Ignoring free of unknown descriptor set {:?}", set);
                return Ok(());
            }
        };

        unsafe {
            self.device
                .free_descriptor_sets(pool, &[set])
                .map_err(|err| DescriptorAllocatorError::CantFree(err.into()))?;
        };

        let live = self.live_sets.entry(pool).or_insert(1);
        *live -= 1;
        if *live == 0 && pool != self.current_pool {
            self.live_sets.remove(&pool);
            self.recycle_pool(pool)?;
        }

        Ok(())
    }

    fn recycle_pool(&mut self, pool: vk::DescriptorPool) -> Result<(), DescriptorAllocatorError> {
        unsafe {
            self.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(|err| DescriptorAllocatorError::CantReset(err.into()))?;
        };

        self.used_pools.retain(|&used| used != pool);
        self.free_pools.push_back(pool);
        Ok(())
    }

    /// Returns every set handed out so far to the pools
    ///
    /// Sets allocated before the reset must not be used afterwards.
    pub fn reset_pools(&mut self) -> Result<(), DescriptorAllocatorError> {
        for &pool in self.used_pools.iter() {
            unsafe {
                self.device
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                    .map_err(|err| DescriptorAllocatorError::CantReset(err.into()))?;
            };
            self.free_pools.push_back(pool);
        }

        self.used_pools.clear();
        self.owners.clear();
        self.live_sets.clear();
        self.current_pool = vk::DescriptorPool::null();
        Ok(())
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        unsafe {
            for &pool in self.used_pools.iter() {
                self.device.destroy_descriptor_pool(pool, None);
            }

            for &pool in self.free_pools.iter() {
                self.device.destroy_descriptor_pool(pool, None);
            }
        };
    }
}
