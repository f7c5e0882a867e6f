// src/core/wgpu_backend/pipelines.rs
// Program compilation and render pipelines keyed on the emulated fixed-function state

use crate::core::backend::{ProgramSource, TargetFormat, TextureKind, VertexInput};
use crate::core::state::{BlendMode, DepthCompare, DepthState, StencilMode};
use crate::core::uniforms::UniformLayout;
use crate::core::ProgramId;
use crate::error::{RenderError, RenderResult};

pub(crate) struct GpuProgram {
    pub source: ProgramSource,
    pub module: wgpu::ShaderModule,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
    pub uniform_layout: UniformLayout,
}

/// Everything a pipeline bakes in. Stencil reference stays dynamic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramId,
    pub blend: BlendMode,
    pub depth: DepthState,
    pub stencil: StencilMode,
    pub color_formats: Vec<TargetFormat>,
    pub depth_format: Option<TargetFormat>,
}

const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

fn texture_binding(kind: TextureKind) -> wgpu::BindingType {
    let (sample_type, view_dimension) = match kind {
        TextureKind::Color2D => (
            wgpu::TextureSampleType::Float { filterable: false },
            wgpu::TextureViewDimension::D2,
        ),
        TextureKind::Depth2D => (wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::D2),
        TextureKind::Color2DArray => (
            wgpu::TextureSampleType::Float { filterable: false },
            wgpu::TextureViewDimension::D2Array,
        ),
    };
    wgpu::BindingType::Texture {
        sample_type,
        view_dimension,
        multisampled: false,
    }
}

impl GpuProgram {
    /// Compile inside a validation error scope so WGSL errors surface as
    /// `ShaderCompile` instead of a device panic.
    pub fn compile(device: &wgpu::Device, source: &ProgramSource) -> RenderResult<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(source.label),
            source: wgpu::ShaderSource::Wgsl(source.source.into()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::shader(source.label, err));
        }

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        entries.extend(source.textures.iter().enumerate().map(|(i, decl)| {
            wgpu::BindGroupLayoutEntry {
                binding: i as u32 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: texture_binding(decl.kind),
                count: None,
            }
        }));
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(source.label),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(source.label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Ok(Self {
            source: *source,
            module,
            bind_group_layout,
            pipeline_layout,
            uniform_layout: UniformLayout::new(source.uniforms),
        })
    }

    pub fn create_pipeline(
        &self,
        device: &wgpu::Device,
        key: &PipelineKey,
    ) -> RenderResult<wgpu::RenderPipeline> {
        let mesh_layout = [wgpu::VertexBufferLayout {
            array_stride: 24,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &MESH_ATTRIBUTES,
        }];
        let (buffers, cull_mode): (&[wgpu::VertexBufferLayout], _) = match self.source.vertex_input {
            VertexInput::Mesh => (&mesh_layout, Some(wgpu::Face::Back)),
            VertexInput::FullScreen => (&[], None),
        };

        let blend = blend_state(key.blend);
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: format.to_wgpu(),
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format: format.to_wgpu(),
            depth_write_enabled: key.depth.write,
            depth_compare: match key.depth.test {
                None | Some(DepthCompare::Always) => wgpu::CompareFunction::Always,
                Some(DepthCompare::Less) => wgpu::CompareFunction::Less,
                Some(DepthCompare::LessEqual) => wgpu::CompareFunction::LessEqual,
            },
            stencil: if format.has_stencil() {
                stencil_state(key.stencil)
            } else {
                wgpu::StencilState::default()
            },
            bias: wgpu::DepthBiasState::default(),
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(self.source.label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.module,
                entry_point: self.source.vertex_entry,
                buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &self.module,
                entry_point: self.source.fragment_entry,
                targets: &targets,
            }),
            multiview: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::shader(self.source.label, err));
        }
        Ok(pipeline)
    }
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    match mode {
        BlendMode::Replace => None,
        BlendMode::Additive => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
        BlendMode::Multiply => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Dst,
                dst_factor: wgpu::BlendFactor::Zero,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
    }
}

fn stencil_state(mode: StencilMode) -> wgpu::StencilState {
    let face = |compare, pass_op| wgpu::StencilFaceState {
        compare,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op,
    };
    match mode {
        StencilMode::Disabled => wgpu::StencilState::default(),
        StencilMode::Write(_) => {
            let f = face(wgpu::CompareFunction::Always, wgpu::StencilOperation::Replace);
            wgpu::StencilState {
                front: f,
                back: f,
                read_mask: 0xff,
                write_mask: 0xff,
            }
        }
        StencilMode::Equal(_) => {
            let f = face(wgpu::CompareFunction::Equal, wgpu::StencilOperation::Keep);
            wgpu::StencilState {
                front: f,
                back: f,
                read_mask: 0xff,
                write_mask: 0,
            }
        }
    }
}
