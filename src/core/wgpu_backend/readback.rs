// src/core/wgpu_backend/readback.rs
// Colour attachment readback into tight f32 buffers
// RELEVANT FILES: src/gpu.rs

use futures_intrusive::channel::shared::oneshot_channel;
use half::f16;

use crate::core::backend::TargetFormat;
use crate::error::{RenderError, RenderResult};
use crate::gpu::align_copy_bpr;

/// Texels of one subresource, `channels` floats per texel, rows top to bottom
#[derive(Debug, Clone, PartialEq)]
pub struct TargetReadback {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: Vec<f32>,
}

impl TargetReadback {
    pub fn texel(&self, x: u32, y: u32) -> &[f32] {
        let c = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * c;
        &self.data[start..start + c]
    }
}

fn channels(format: TargetFormat) -> RenderResult<u32> {
    match format {
        TargetFormat::Rgba8Unorm | TargetFormat::Rgba16Float => Ok(4),
        TargetFormat::Rg32Float => Ok(2),
        TargetFormat::R32Float | TargetFormat::R16Float => Ok(1),
        TargetFormat::Depth24PlusStencil8 | TargetFormat::Depth32Float => Err(
            RenderError::readback(format!("readback of depth format {:?} is unsupported", format)),
        ),
    }
}

fn decode(format: TargetFormat, row: &[u8], out: &mut Vec<f32>) {
    match format {
        TargetFormat::Rgba8Unorm => out.extend(row.iter().map(|b| *b as f32 / 255.0)),
        TargetFormat::Rgba16Float | TargetFormat::R16Float => out.extend(
            row.chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32()),
        ),
        TargetFormat::Rg32Float | TargetFormat::R32Float => out.extend(
            row.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        ),
        TargetFormat::Depth24PlusStencil8 | TargetFormat::Depth32Float => {}
    }
}

/// Copy one layer/mip of `texture` to the CPU and depad its rows.
pub(crate) fn read_color(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    format: TargetFormat,
    size: (u32, u32),
    layer: u32,
    mip_level: u32,
) -> RenderResult<TargetReadback> {
    let (width, height) = size;
    let channels = channels(format)?;
    let tight_bpr = format.bytes_per_texel() * width;
    let padded_bpr = align_copy_bpr(tight_bpr);
    let buffer_size = (padded_bpr * height) as wgpu::BufferAddress;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback-staging"),
        size: buffer_size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback-encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    pollster::block_on(receiver.receive())
        .ok_or_else(|| RenderError::readback("map_async callback channel dropped"))?
        .map_err(|e| RenderError::readback(format!("buffer map failed: {}", e)))?;

    let mapped = slice.get_mapped_range();
    let mut data = Vec::with_capacity((width * height * channels) as usize);
    for row in 0..height as usize {
        let start = row * padded_bpr as usize;
        decode(format, &mapped[start..start + tight_bpr as usize], &mut data);
    }
    drop(mapped);
    staging.unmap();

    Ok(TargetReadback {
        width,
        height,
        channels,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_half_and_unorm() {
        let mut out = Vec::new();
        let half_one = f16::from_f32(1.0).to_le_bytes();
        let half_quarter = f16::from_f32(0.25).to_le_bytes();
        decode(
            TargetFormat::R16Float,
            &[half_one[0], half_one[1], half_quarter[0], half_quarter[1]],
            &mut out,
        );
        assert_eq!(out, vec![1.0, 0.25]);

        out.clear();
        decode(TargetFormat::Rgba8Unorm, &[0, 255, 51, 0], &mut out);
        assert_eq!(out[1], 1.0);
        assert!((out[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn depth_readback_is_rejected() {
        assert!(channels(TargetFormat::Depth32Float).is_err());
    }
}
