//! wgpu implementation of [`GpuBackend`]
//!
//! Every clear and draw is recorded as its own render pass into a frame
//! encoder that is submitted by `finish_frame`. Pipelines are cached per
//! program and fixed-function state; uniforms are uploaded per draw.

mod pipelines;
mod readback;
mod targets;

use log::{debug, info};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

use self::pipelines::{GpuProgram, PipelineKey};
use self::targets::{depth_attachment_view, depth_sampled_view, GpuTarget};
use super::backend::{
    Attachment, ClearValues, DepthAttachment, DrawCommand, Geometry, GpuBackend, MeshData, MeshId,
    ProgramId, ProgramSource, TargetDesc, TargetFormat, TargetId, TextureKind,
};
use super::state::TargetBinding;
use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;

pub use self::readback::TargetReadback;

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    targets: Vec<GpuTarget>,
    programs: Vec<GpuProgram>,
    meshes: Vec<GpuMesh>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            targets: Vec::new(),
            programs: Vec::new(),
            meshes: Vec::new(),
            pipelines: HashMap::new(),
            encoder: None,
        }
    }

    pub fn from_context(ctx: GpuContext) -> Self {
        Self::new(ctx.device, ctx.queue)
    }

    pub fn headless() -> RenderResult<Self> {
        Ok(Self::from_context(GpuContext::headless()?))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn target(&self, id: TargetId) -> RenderResult<&GpuTarget> {
        self.targets
            .get(id.0 as usize)
            .ok_or_else(|| RenderError::render(format!("unknown target {:?}", id)))
    }

    /// Depth texture backing `id`, following a shared attachment to its owner
    fn depth_texture(&self, id: TargetId) -> RenderResult<Option<(&wgpu::Texture, TargetFormat)>> {
        let target = self.target(id)?;
        match target.desc.depth {
            DepthAttachment::None => Ok(None),
            DepthAttachment::Owned(format) => Ok(target.depth.as_ref().map(|t| (t, format))),
            DepthAttachment::Shared(owner) => self.depth_texture(owner),
        }
    }

    fn submit_pending(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Read one colour attachment subresource back to the CPU.
    pub fn read_target(
        &mut self,
        id: TargetId,
        color_index: u32,
        layer: u32,
        mip_level: u32,
    ) -> RenderResult<TargetReadback> {
        self.submit_pending();
        let target = self.target(id)?;
        let format = *target
            .desc
            .color_formats
            .get(color_index as usize)
            .ok_or_else(|| RenderError::readback(format!("'{}' has no colour {}", target.desc.label, color_index)))?;
        if mip_level >= target.desc.mip_levels || layer >= target.desc.layers {
            return Err(RenderError::readback(format!(
                "'{}' has no layer {} mip {}",
                target.desc.label, layer, mip_level
            )));
        }
        let texture = &target.colors[color_index as usize];
        let size = target.desc.mip_extent(mip_level);
        readback::read_color(&self.device, &self.queue, texture, format, size, layer, mip_level)
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> RenderResult<()> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        let program = self
            .programs
            .get(key.program.0 as usize)
            .ok_or_else(|| RenderError::render(format!("unknown program {:?}", key.program)))?;
        let pipeline = program.create_pipeline(&self.device, key)?;
        debug!(
            "Created pipeline for '{}' ({:?}, {:?}, {:?})",
            program.source.label, key.blend, key.depth, key.stencil
        );
        self.pipelines.insert(key.clone(), pipeline);
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> RenderResult<TargetId> {
        desc.validate()?;
        if let DepthAttachment::Shared(owner) = desc.depth {
            let owner_desc = &self.target(owner)?.desc;
            if (owner_desc.width, owner_desc.height) != (desc.width, desc.height) {
                return Err(RenderError::incomplete_target(format!(
                    "'{}' shares depth of '{}' with a different extent",
                    desc.label, owner_desc.label
                )));
            }
        }
        info!(
            "Allocating target '{}' {}x{} ({} layers, {} mips)",
            desc.label, desc.width, desc.height, desc.layers, desc.mip_levels
        );
        self.targets.push(GpuTarget::allocate(&self.device, desc));
        Ok(TargetId(self.targets.len() as u32 - 1))
    }

    fn resize_target(&mut self, id: TargetId, width: u32, height: u32) -> RenderResult<()> {
        let mut desc = self.target(id)?.desc.clone();
        desc.width = width;
        desc.height = height;
        desc.validate()?;
        self.submit_pending();
        self.targets[id.0 as usize] = GpuTarget::allocate(&self.device, &desc);
        Ok(())
    }

    fn target_desc(&self, id: TargetId) -> Option<&TargetDesc> {
        self.targets.get(id.0 as usize).map(|t| &t.desc)
    }

    fn load_program(&mut self, source: &ProgramSource) -> RenderResult<ProgramId> {
        let program = GpuProgram::compile(&self.device, source)?;
        self.programs.push(program);
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshId> {
        if mesh.positions.len() != mesh.normals.len() {
            return Err(RenderError::render(format!(
                "mesh '{}' has {} positions but {} normals",
                mesh.label,
                mesh.positions.len(),
                mesh.normals.len()
            )));
        }
        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}.vertices", mesh.label)),
            contents: bytemuck::cast_slice(&mesh.interleaved()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}.indices", mesh.label)),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.push(GpuMesh {
            vertices,
            indices,
            index_count: mesh.indices.len() as u32,
        });
        Ok(MeshId(self.meshes.len() as u32 - 1))
    }

    fn clear(&mut self, binding: TargetBinding, values: &ClearValues) -> RenderResult<()> {
        let target = self.target(binding.target)?;
        let color_views: Vec<wgpu::TextureView> = match values.color {
            Some(_) => (0..target.colors.len())
                .filter_map(|i| target.color_attachment_view(i, binding.layer, binding.mip_level))
                .collect(),
            None => Vec::new(),
        };
        let clear_color = values.color.map(|[r, g, b, a]| wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        });
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color.unwrap_or(wgpu::Color::TRANSPARENT)),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let wants_depth = values.depth.is_some() || values.stencil.is_some();
        let depth = if wants_depth {
            self.depth_texture(binding.target)?
        } else {
            None
        };
        if wants_depth && depth.is_none() {
            return Err(RenderError::render(format!(
                "depth/stencil clear on '{}' which has no depth attachment",
                target.desc.label
            )));
        }
        let depth_view = depth.map(|(texture, format)| (depth_attachment_view(texture, binding.layer), format));

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            })
        });
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_view.as_ref().map(|(view, format)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match values.depth {
                            Some(d) => wgpu::LoadOp::Clear(d),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: format.has_stencil().then(|| wgpu::Operations {
                        load: match values.stencil {
                            Some(class) => wgpu::LoadOp::Clear(class.stencil_reference()),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(())
    }

    fn draw(&mut self, cmd: &DrawCommand) -> RenderResult<()> {
        let target_desc = self.target(cmd.target.target)?.desc.clone();
        let depth_format = self.depth_texture(cmd.target.target)?.map(|(_, f)| f);
        let key = PipelineKey {
            program: cmd.program,
            blend: cmd.state.blend,
            depth: cmd.state.depth,
            stencil: cmd.state.stencil,
            color_formats: target_desc.color_formats.clone(),
            depth_format,
        };
        self.ensure_pipeline(&key)?;

        let program = &self.programs[cmd.program.0 as usize];
        let label = program.source.label;
        let uniform_bytes = program.uniform_layout.pack(label, &cmd.uniforms)?;
        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &uniform_bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut texture_views = Vec::with_capacity(program.source.textures.len());
        for decl in program.source.textures {
            let (_, tex) = cmd
                .textures
                .iter()
                .find(|(name, _)| *name == decl.name)
                .ok_or_else(|| RenderError::render(format!("'{}' texture slot '{}' is unbound", label, decl.name)))?;
            let view = match (decl.kind, tex.attachment) {
                (TextureKind::Depth2D, Attachment::Depth) => self
                    .depth_texture(tex.target)?
                    .map(|(texture, _)| depth_sampled_view(texture)),
                (kind, Attachment::Color(index)) if kind != TextureKind::Depth2D => self
                    .target(tex.target)?
                    .sampled_color_view(index as usize, kind, tex.view),
                _ => None,
            }
            .ok_or_else(|| {
                RenderError::render(format!("'{}' slot '{}' cannot read {:?}", label, decl.name, tex))
            })?;
            texture_views.push(view);
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }];
        entries.extend(texture_views.iter().enumerate().map(|(i, view)| wgpu::BindGroupEntry {
            binding: i as u32 + 1,
            resource: wgpu::BindingResource::TextureView(view),
        }));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let target = self.target(cmd.target.target)?;
        let color_views: Vec<wgpu::TextureView> = (0..target.colors.len())
            .filter_map(|i| target.color_attachment_view(i, cmd.target.layer, cmd.target.mip_level))
            .collect();
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let depth_view = self
            .depth_texture(cmd.target.target)?
            .map(|(texture, format)| (depth_attachment_view(texture, cmd.target.layer), format));
        let keep_depth = wgpu::Operations {
            load: wgpu::LoadOp::Load,
            store: wgpu::StoreOp::Store,
        };
        let keep_stencil = wgpu::Operations {
            load: wgpu::LoadOp::Load,
            store: wgpu::StoreOp::Store,
        };
        let (viewport_w, viewport_h) = target.desc.mip_extent(cmd.target.mip_level);

        let pipeline = &self.pipelines[&key];
        let mesh = match cmd.geometry {
            Geometry::Mesh(id) => Some(
                self.meshes
                    .get(id.0 as usize)
                    .ok_or_else(|| RenderError::render(format!("unknown mesh {:?}", id)))?,
            ),
            Geometry::FullScreen => None,
        };

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            })
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(cmd.label),
            color_attachments: &color_attachments,
            // Read-only aspects let the same depth texture be bound for reading
            depth_stencil_attachment: depth_view.as_ref().map(|(view, format)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: cmd.state.depth.write.then_some(keep_depth),
                    stencil_ops: (format.has_stencil() && cmd.state.stencil.writes())
                        .then_some(keep_stencil),
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        // Padded mip chains are only drawn over their modelled extent
        pass.set_viewport(0.0, 0.0, viewport_w as f32, viewport_h as f32, 0.0, 1.0);
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        if let Some(class) = cmd.state.stencil.class() {
            pass.set_stencil_reference(class.stencil_reference());
        }
        match mesh {
            Some(mesh) => {
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
            None => pass.draw(0..3, 0..1),
        }
        Ok(())
    }

    fn finish_frame(&mut self) -> RenderResult<()> {
        self.submit_pending();
        Ok(())
    }
}
