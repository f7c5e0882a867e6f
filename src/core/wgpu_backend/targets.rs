// src/core/wgpu_backend/targets.rs
// Texture allocation and per-subresource views for render targets

use crate::core::backend::{DepthAttachment, TargetDesc, TextureKind, TextureView};

pub(crate) struct GpuTarget {
    pub desc: TargetDesc,
    pub colors: Vec<wgpu::Texture>,
    /// Only set for targets that own their depth-stencil
    pub depth: Option<wgpu::Texture>,
}

/// Allocated size; mip chains are padded so every level covers `mip_extent`
pub(crate) fn extent(desc: &TargetDesc) -> wgpu::Extent3d {
    let (width, height) = desc.allocation_extent();
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: desc.layers,
    }
}

impl GpuTarget {
    pub fn allocate(device: &wgpu::Device, desc: &TargetDesc) -> Self {
        let colors = desc
            .color_formats
            .iter()
            .enumerate()
            .map(|(i, format)| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("{}.color{}", desc.label, i)),
                    size: extent(desc),
                    mip_level_count: desc.mip_levels,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: format.to_wgpu(),
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            })
            .collect();

        let depth = match desc.depth {
            DepthAttachment::Owned(format) => Some(device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{}.depth", desc.label)),
                size: extent(desc),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: format.to_wgpu(),
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })),
            DepthAttachment::Shared(_) | DepthAttachment::None => None,
        };

        Self {
            desc: desc.clone(),
            colors,
            depth,
        }
    }

    /// Single layer, single mip view for use as a colour attachment
    pub fn color_attachment_view(&self, index: usize, layer: u32, mip_level: u32) -> Option<wgpu::TextureView> {
        self.colors.get(index).map(|texture| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("color-attachment"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_mip_level: mip_level,
                mip_level_count: Some(1),
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            })
        })
    }

    /// Colour texture view as seen by a program slot
    pub fn sampled_color_view(&self, index: usize, kind: TextureKind, view: TextureView) -> Option<wgpu::TextureView> {
        let texture = self.colors.get(index)?;
        let descriptor = match (kind, view) {
            (TextureKind::Color2DArray, _) => wgpu::TextureViewDescriptor {
                label: Some("sampled-array"),
                dimension: Some(wgpu::TextureViewDimension::D2Array),
                ..Default::default()
            },
            (_, TextureView::Layer(layer)) => wgpu::TextureViewDescriptor {
                label: Some("sampled-layer"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            },
            (_, TextureView::Mip(mip)) => wgpu::TextureViewDescriptor {
                label: Some("sampled-mip"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_mip_level: mip,
                mip_level_count: Some(1),
                ..Default::default()
            },
            (_, TextureView::All) => wgpu::TextureViewDescriptor {
                label: Some("sampled"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                ..Default::default()
            },
        };
        Some(texture.create_view(&descriptor))
    }
}

/// Depth-stencil attachment view of one layer
pub(crate) fn depth_attachment_view(texture: &wgpu::Texture, layer: u32) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("depth-attachment"),
        dimension: Some(wgpu::TextureViewDimension::D2),
        base_array_layer: layer,
        array_layer_count: Some(1),
        ..Default::default()
    })
}

/// Depth-only view for reading depth in a program
pub(crate) fn depth_sampled_view(texture: &wgpu::Texture) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("depth-sampled"),
        dimension: Some(wgpu::TextureViewDimension::D2),
        aspect: wgpu::TextureAspect::DepthOnly,
        base_array_layer: 0,
        array_layer_count: Some(1),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::TargetFormat;

    #[test]
    fn allocated_levels_cover_the_modelled_extents() {
        for (width, height, mips) in [(641, 361, 5), (640, 360, 5), (1, 7, 3), (1920, 1080, 1)] {
            let desc = TargetDesc::new("chain", width, height)
                .with_color(TargetFormat::R32Float)
                .with_mips(mips);
            let allocated = extent(&desc);
            for level in 0..mips {
                let size = allocated.mip_level_size(level, wgpu::TextureDimension::D2);
                let (w, h) = desc.mip_extent(level);
                assert!(
                    size.width >= w && size.height >= h,
                    "{}x{} level {}: allocated {}x{}, modelled {}x{}",
                    width, height, level, size.width, size.height, w, h
                );
            }
        }
    }

    #[test]
    fn single_level_targets_are_not_padded() {
        let desc = TargetDesc::new("lit", 641, 361).with_color(TargetFormat::Rgba16Float);
        let allocated = extent(&desc);
        assert_eq!((allocated.width, allocated.height), (641, 361));
    }
}
