use ash::vk;

use crate::uniform::TextureHandle;

/// Table of the textures shaders may sample, indexed by [TextureHandle]
///
/// Handles of removed textures are recycled, so a consumer holding a stale handle may end up
/// sampling whatever texture took the slot over.
#[derive(Debug, Default)]
pub struct TextureRegistry {
    slots: Vec<Option<vk::DescriptorImageInfo>>,
    free: Vec<u32>,
}

impl TextureRegistry {
    pub fn new() -> TextureRegistry {
        TextureRegistry::default()
    }

    pub fn insert(&mut self, image_info: vk::DescriptorImageInfo) -> TextureHandle {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(image_info);
                TextureHandle(index)
            }
            None => {
                self.slots.push(Some(image_info));
                TextureHandle(self.slots.len() as u32 - 1)
            }
        }
    }

    /// Points an existing handle at a new image, e.g. after the image was recreated
    pub fn replace(&mut self, texture: TextureHandle, image_info: vk::DescriptorImageInfo) -> bool {
        match self.slots.get_mut(texture.0 as usize) {
            Some(slot @ Some(_)) => {
                *slot = Some(image_info);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, texture: TextureHandle) -> Option<vk::DescriptorImageInfo> {
        let removed = self.slots.get_mut(texture.0 as usize)?.take();
        if removed.is_some() {
            self.free.push(texture.0);
        }
        removed
    }

    /// Image info for `texture`, if it is registered and has a view to sample
    pub fn resolve(&self, texture: TextureHandle) -> Option<vk::DescriptorImageInfo> {
        self.slots
            .get(texture.0 as usize)
            .copied()
            .flatten()
            .filter(|info| info.image_view != vk::ImageView::null())
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
