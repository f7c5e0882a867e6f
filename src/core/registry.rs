// src/core/registry.rs
// Explicit list of render targets to reallocate on window resize

use log::info;

use super::backend::{GpuBackend, TargetId};
use crate::error::{RenderError, RenderResult};

/// How a registered target follows the output size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    /// Matches the output extent
    Screen,
    /// Keeps its allocation size (shadow atlas and similar)
    Fixed,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    target: TargetId,
    sizing: Sizing,
    owner: &'static str,
}

/// Targets owned by the passes, resized in registration order so depth
/// owners are reallocated before targets that share their depth.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: Vec<Entry>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner: &'static str, target: TargetId, sizing: Sizing) {
        self.entries.push(Entry {
            target,
            sizing,
            owner,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn targets(&self, sizing: Sizing) -> Vec<TargetId> {
        self.entries
            .iter()
            .filter(|e| e.sizing == sizing)
            .map(|e| e.target)
            .collect()
    }

    /// Reallocate every screen-sized target. Returns the resized ids.
    ///
    /// Every new descriptor is validated before the first reallocation, so a
    /// rejected size leaves all targets at their previous extent.
    pub fn resize_all<B: GpuBackend>(
        &self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> RenderResult<Vec<TargetId>> {
        let mut pending = Vec::new();
        for entry in self.entries.iter().filter(|e| e.sizing == Sizing::Screen) {
            let desc = backend.target_desc(entry.target).ok_or_else(|| {
                RenderError::render(format!("'{}' registered unknown target {:?}", entry.owner, entry.target))
            })?;
            if (desc.width, desc.height) == (width, height) {
                continue;
            }
            let mut resized = desc.clone();
            resized.width = width;
            resized.height = height;
            resized.validate()?;
            pending.push(entry.target);
        }

        let mut resized = Vec::with_capacity(pending.len());
        for target in pending {
            backend.resize_target(target, width, height)?;
            resized.push(target);
        }
        if !resized.is_empty() {
            let owners: Vec<_> = self
                .entries
                .iter()
                .filter(|e| resized.contains(&e.target))
                .map(|e| e.owner)
                .collect();
            info!(
                "Reallocated {} targets at {}x{} ({})",
                resized.len(),
                width,
                height,
                owners.join(", ")
            );
        }
        Ok(resized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::{TargetDesc, TargetFormat};
    use crate::core::recording::RecordingBackend;

    #[test]
    fn only_screen_targets_follow_resize() {
        let mut backend = RecordingBackend::new();
        let screen = backend
            .create_target(&TargetDesc::new("screen", 64, 32).with_color(TargetFormat::Rgba8Unorm))
            .unwrap();
        let fixed = backend
            .create_target(&TargetDesc::new("atlas", 256, 256).with_color(TargetFormat::Rg32Float))
            .unwrap();
        let mut registry = ResourceRegistry::new();
        registry.register("test", screen, Sizing::Screen);
        registry.register("test", fixed, Sizing::Fixed);

        let resized = registry.resize_all(&mut backend, 128, 64).unwrap();
        assert_eq!(resized, vec![screen]);
        assert_eq!(backend.target_extent(screen), Some((128, 64)));
        assert_eq!(backend.target_extent(fixed), Some((256, 256)));

        // Same size again is a no-op
        assert!(registry.resize_all(&mut backend, 128, 64).unwrap().is_empty());
    }

    #[test]
    fn rejected_size_leaves_every_target_untouched() {
        let mut backend = RecordingBackend::new();
        let lit = backend
            .create_target(&TargetDesc::new("lit", 64, 32).with_color(TargetFormat::Rgba16Float))
            .unwrap();
        let chain = backend
            .create_target(
                &TargetDesc::new("chain", 64, 32)
                    .with_color(TargetFormat::R32Float)
                    .with_mips(5),
            )
            .unwrap();
        let mut registry = ResourceRegistry::new();
        registry.register("test", lit, Sizing::Screen);
        registry.register("test", chain, Sizing::Screen);

        // Five levels do not fit a 4x4 extent
        let err = registry.resize_all(&mut backend, 4, 4).unwrap_err();
        assert!(matches!(err, RenderError::IncompleteTarget(_)));
        assert_eq!(backend.target_extent(lit), Some((64, 32)));
        assert_eq!(backend.target_extent(chain), Some((64, 32)));
    }
}
