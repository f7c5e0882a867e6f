// src/core/raster.rs
// CPU execution of clears and draws for the recording backend
// RELEVANT FILES: src/core/recording.rs, src/core/wgpu_backend/pipelines.rs, src/shaders/

use std::collections::HashMap;
use std::ops::Range;

use glam::{IVec2, Mat4, UVec2, Vec2, Vec3, Vec4, Vec4Swizzles};

use super::backend::{
    ClearValues, DepthAttachment, DrawCommand, Geometry, MeshData, TargetDesc, TargetFormat,
    TargetId, TextureView,
};
use super::programs;
use super::state::{BlendMode, DepthCompare, StencilMode, TargetBinding};
use super::uniforms::{UniformBlock, UniformValue};
use crate::error::{RenderError, RenderResult};
use crate::lighting::shading::{
    blinn_phong, chebyshev_upper_bound, decode_normal, encode_normal, SHININESS_SCALE,
};
use crate::post::ssao_math::{
    linearize_depth, occlusion_factor, smoothstep, view_space_radius, FAR_LIMIT,
};

/// One colour subresource, stored as RGBA f32 whatever the attachment format
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<Vec4>,
}

impl Image {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![Vec4::ZERO; (width * height) as usize],
        }
    }

    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        self.texels[(y * self.width + x) as usize]
    }

    /// `textureLoad` semantics: out-of-range coordinates read zero
    fn load(&self, coord: IVec2) -> Vec4 {
        if coord.x < 0 || coord.y < 0 || coord.x >= self.width as i32 || coord.y >= self.height as i32 {
            return Vec4::ZERO;
        }
        self.texels[(coord.y as u32 * self.width + coord.x as u32) as usize]
    }

    /// Bilinear `(r, g)` lookup at `uv`, edge texels clamped
    pub fn bilinear_rg(&self, uv: Vec2) -> Vec2 {
        let limit = IVec2::new(self.width as i32 - 1, self.height as i32 - 1);
        let size = Vec2::new(self.width as f32, self.height as f32);
        bilinear(|c| self.load(c.clamp(IVec2::ZERO, limit)).xy(), uv, size)
    }
}

fn bilinear(load: impl Fn(IVec2) -> Vec2, uv: Vec2, size: Vec2) -> Vec2 {
    let texel = uv * size - 0.5;
    let base = texel.floor();
    let f = texel - base;
    let b = base.as_ivec2();
    let top = load(b).lerp(load(b + IVec2::X), f.x);
    let bottom = load(b + IVec2::Y).lerp(load(b + IVec2::ONE), f.x);
    top.lerp(bottom, f.y)
}

#[derive(Debug, Clone)]
struct ColorPlanes {
    formats: Vec<TargetFormat>,
    layers: u32,
    mips: u32,
    /// `[attachment][layer * mips + mip]`
    images: Vec<Vec<Image>>,
}

impl ColorPlanes {
    fn new(desc: &TargetDesc) -> Self {
        let images = desc
            .color_formats
            .iter()
            .map(|_| {
                (0..desc.layers)
                    .flat_map(|_| {
                        (0..desc.mip_levels).map(move |mip| {
                            let (w, h) = desc.mip_extent(mip);
                            Image::new(w, h)
                        })
                    })
                    .collect()
            })
            .collect();
        Self {
            formats: desc.color_formats.clone(),
            layers: desc.layers,
            mips: desc.mip_levels,
            images,
        }
    }

    fn index(&self, layer: u32, mip: u32) -> Option<usize> {
        (layer < self.layers && mip < self.mips).then(|| (layer * self.mips + mip) as usize)
    }
}

#[derive(Debug, Clone)]
struct DepthPlanes {
    width: u32,
    height: u32,
    layers: u32,
    depth: Vec<f32>,
    stencil: Vec<u8>,
}

impl DepthPlanes {
    fn new(desc: &TargetDesc) -> Self {
        let n = (desc.width * desc.height * desc.layers) as usize;
        Self {
            width: desc.width,
            height: desc.height,
            layers: desc.layers,
            depth: vec![0.0; n],
            stencil: vec![0; n],
        }
    }

    fn layer_range(&self, layer: u32) -> Option<Range<usize>> {
        if layer >= self.layers {
            return None;
        }
        let size = (self.width * self.height) as usize;
        let start = layer as usize * size;
        Some(start..start + size)
    }

    fn slot(&self, layer: u32, pixel: UVec2) -> Option<usize> {
        if pixel.x >= self.width || pixel.y >= self.height {
            return None;
        }
        let range = self.layer_range(layer)?;
        Some(range.start + (pixel.y * self.width + pixel.x) as usize)
    }
}

/// Where a program texture slot reads from, resolved by the recording backend
#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotSource {
    Color {
        target: TargetId,
        attachment: usize,
        view: TextureView,
    },
    Depth {
        owner: TargetId,
    },
}

/// A draw with every id already resolved against the recorded targets
pub(crate) struct DrawJob<'a> {
    pub program: &'static str,
    pub command: &'a DrawCommand,
    pub target: &'a TargetDesc,
    pub depth_owner: Option<TargetId>,
    pub slots: Vec<(&'static str, SlotSource)>,
    pub mesh: Option<&'a MeshData>,
}

/// Image contents of every recorded target.
///
/// Draws run the CPU model of their program per covered pixel, with the
/// stencil test, depth test, blend and write masks the wgpu pipelines use.
/// Back faces of meshes are culled and triangles are clipped at the near plane.
#[derive(Debug, Default)]
pub struct Raster {
    colors: HashMap<TargetId, ColorPlanes>,
    depths: HashMap<TargetId, DepthPlanes>,
}

impl Raster {
    pub(crate) fn allocate(&mut self, id: TargetId, desc: &TargetDesc) {
        if desc.color_formats.is_empty() {
            self.colors.remove(&id);
        } else {
            self.colors.insert(id, ColorPlanes::new(desc));
        }
        match desc.depth {
            DepthAttachment::Owned(_) => {
                self.depths.insert(id, DepthPlanes::new(desc));
            }
            DepthAttachment::Shared(_) | DepthAttachment::None => {
                self.depths.remove(&id);
            }
        }
    }

    pub fn color(&self, target: TargetId, attachment: usize, layer: u32, mip: u32) -> Option<&Image> {
        let planes = self.colors.get(&target)?;
        let index = planes.index(layer, mip)?;
        planes.images.get(attachment)?.get(index)
    }

    /// Stencil of one layer of a depth-owning target, row-major
    pub fn stencil(&self, owner: TargetId, layer: u32) -> Option<&[u8]> {
        let planes = self.depths.get(&owner)?;
        Some(&planes.stencil[planes.layer_range(layer)?])
    }

    pub fn depth(&self, owner: TargetId, layer: u32) -> Option<&[f32]> {
        let planes = self.depths.get(&owner)?;
        Some(&planes.depth[planes.layer_range(layer)?])
    }

    pub(crate) fn clear(
        &mut self,
        binding: TargetBinding,
        depth_owner: Option<TargetId>,
        values: &ClearValues,
    ) {
        if let (Some(rgba), Some(planes)) = (values.color, self.colors.get_mut(&binding.target)) {
            if let Some(index) = planes.index(binding.layer, binding.mip_level) {
                for (format, images) in planes.formats.iter().zip(planes.images.iter_mut()) {
                    images[index].texels.fill(store(*format, Vec4::from(rgba)));
                }
            }
        }
        let planes = depth_owner.and_then(|owner| self.depths.get_mut(&owner));
        if let Some(planes) = planes {
            if let Some(range) = planes.layer_range(binding.layer) {
                if let Some(depth) = values.depth {
                    planes.depth[range.clone()].fill(depth);
                }
                if let Some(class) = values.stencil {
                    planes.stencil[range].fill(class as u8);
                }
            }
        }
    }

    pub(crate) fn draw(&mut self, job: &DrawJob<'_>) -> RenderResult<()> {
        let model = Model::for_program(job.program).ok_or_else(|| {
            RenderError::render(format!("no CPU model for program '{}'", job.program))
        })?;
        let cmd = job.command;
        let mut textures = HashMap::with_capacity(job.slots.len());
        for (name, source) in &job.slots {
            textures.insert(*name, self.snapshot(*source)?);
        }
        let shading = Shading {
            uniforms: &cmd.uniforms,
            textures,
        };

        let binding = cmd.target;
        let (width, height) = job.target.mip_extent(binding.mip_level);
        let fragments = match (cmd.geometry, job.mesh) {
            (Geometry::FullScreen, _) => full_screen(width, height),
            (Geometry::Mesh(_), Some(mesh)) => rasterize(model, &shading, mesh, width, height),
            (Geometry::Mesh(id), None) => {
                return Err(RenderError::render(format!("unknown mesh {:?}", id)))
            }
        };

        let mut colors = self.colors.get_mut(&binding.target);
        let image_index = colors
            .as_deref()
            .and_then(|planes| planes.index(binding.layer, binding.mip_level));
        let mut depth = job.depth_owner.and_then(|owner| self.depths.get_mut(&owner));
        let state = cmd.state;

        for fragment in fragments {
            let slot = depth
                .as_deref()
                .and_then(|planes| planes.slot(binding.layer, fragment.pixel));
            if let (Some(planes), Some(i)) = (depth.as_deref(), slot) {
                if let StencilMode::Equal(class) = state.stencil {
                    if planes.stencil[i] != class as u8 {
                        continue;
                    }
                }
                let stored = planes.depth[i];
                let passes = match state.depth.test {
                    None | Some(DepthCompare::Always) => true,
                    Some(DepthCompare::Less) => fragment.depth < stored,
                    Some(DepthCompare::LessEqual) => fragment.depth <= stored,
                };
                if !passes {
                    continue;
                }
            }

            let outputs = fragment_stage(model, &shading, &fragment);
            if let (Some(planes), Some(index)) = (colors.as_deref_mut(), image_index) {
                let pixel = (fragment.pixel.y * width + fragment.pixel.x) as usize;
                for (attachment, (format, images)) in
                    planes.formats.iter().zip(planes.images.iter_mut()).enumerate()
                {
                    let texel = &mut images[index].texels[pixel];
                    let src = store(*format, outputs[attachment.min(1)]);
                    *texel = store(*format, blend(state.blend, src, *texel));
                }
            }
            if let (Some(planes), Some(i)) = (depth.as_deref_mut(), slot) {
                if state.depth.write {
                    planes.depth[i] = fragment.depth;
                }
                if let StencilMode::Write(class) = state.stencil {
                    planes.stencil[i] = class as u8;
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self, source: SlotSource) -> RenderResult<Sampled> {
        match source {
            SlotSource::Color {
                target,
                attachment,
                view,
            } => {
                let planes = self
                    .colors
                    .get(&target)
                    .ok_or_else(|| RenderError::render(format!("target {:?} has no colour", target)))?;
                let images = planes.images.get(attachment).cloned().ok_or_else(|| {
                    RenderError::render(format!("target {:?} has no colour {}", target, attachment))
                })?;
                let (base_layer, base_mip) = match view {
                    TextureView::All => (0, 0),
                    TextureView::Layer(layer) => (layer, 0),
                    TextureView::Mip(mip) => (0, mip),
                };
                Ok(Sampled::Color {
                    layers: planes.layers,
                    mips: planes.mips,
                    base_layer,
                    base_mip,
                    images,
                })
            }
            SlotSource::Depth { owner } => {
                let planes = self
                    .depths
                    .get(&owner)
                    .ok_or_else(|| RenderError::render(format!("target {:?} has no depth", owner)))?;
                let range = planes.layer_range(0).unwrap_or(0..0);
                Ok(Sampled::Depth {
                    width: planes.width,
                    height: planes.height,
                    depth: planes.depth[range].to_vec(),
                })
            }
        }
    }
}

/// Attachment write: channels the format lacks read back as `(.., 0, 1)`
fn store(format: TargetFormat, v: Vec4) -> Vec4 {
    match format {
        TargetFormat::R32Float | TargetFormat::R16Float => Vec4::new(v.x, 0.0, 0.0, 1.0),
        TargetFormat::Rg32Float => Vec4::new(v.x, v.y, 0.0, 1.0),
        TargetFormat::Rgba8Unorm => v.clamp(Vec4::ZERO, Vec4::ONE),
        TargetFormat::Rgba16Float
        | TargetFormat::Depth24PlusStencil8
        | TargetFormat::Depth32Float => v,
    }
}

fn blend(mode: BlendMode, src: Vec4, dst: Vec4) -> Vec4 {
    match mode {
        BlendMode::Replace => src,
        BlendMode::Additive => dst + src,
        BlendMode::Multiply => (src.xyz() * dst.xyz()).extend(dst.w),
    }
}

/// A texture slot's contents copied out before the draw writes
enum Sampled {
    Color {
        layers: u32,
        mips: u32,
        base_layer: u32,
        base_mip: u32,
        images: Vec<Image>,
    },
    Depth {
        width: u32,
        height: u32,
        depth: Vec<f32>,
    },
}

impl Sampled {
    fn load(&self, coord: IVec2, layer: u32, lod: u32) -> Vec4 {
        match self {
            Sampled::Color {
                layers,
                mips,
                base_layer,
                base_mip,
                images,
            } => {
                let (layer, mip) = (base_layer + layer, base_mip + lod);
                if layer >= *layers || mip >= *mips {
                    return Vec4::ZERO;
                }
                images[(layer * mips + mip) as usize].load(coord)
            }
            Sampled::Depth { width, height, depth } => {
                if coord.x < 0 || coord.y < 0 || coord.x >= *width as i32 || coord.y >= *height as i32 {
                    return Vec4::ZERO;
                }
                let d = depth[(coord.y as u32 * width + coord.x as u32) as usize];
                Vec4::new(d, 0.0, 0.0, 1.0)
            }
        }
    }

    /// `textureDimensions` of the view's base level
    fn dimensions(&self) -> UVec2 {
        match self {
            Sampled::Color {
                mips,
                base_layer,
                base_mip,
                images,
                ..
            } => images
                .get((base_layer * mips + base_mip) as usize)
                .map(|image| UVec2::new(image.width, image.height))
                .unwrap_or(UVec2::ZERO),
            Sampled::Depth { width, height, .. } => UVec2::new(*width, *height),
        }
    }
}

/// Uniform values and texture snapshots seen by one draw
struct Shading<'a> {
    uniforms: &'a UniformBlock,
    textures: HashMap<&'static str, Sampled>,
}

// Unset uniforms read as zero, as in the packed GPU buffer
impl Shading<'_> {
    fn load(&self, name: &str, coord: IVec2, layer: u32, lod: u32) -> Vec4 {
        self.textures
            .get(name)
            .map(|t| t.load(coord, layer, lod))
            .unwrap_or(Vec4::ZERO)
    }

    fn dimensions(&self, name: &str) -> UVec2 {
        self.textures
            .get(name)
            .map(Sampled::dimensions)
            .unwrap_or(UVec2::ZERO)
    }

    fn uint(&self, name: &str) -> u32 {
        match self.uniforms.get(name) {
            Some(UniformValue::UInt(v)) => *v,
            _ => 0,
        }
    }

    fn vec4(&self, name: &str) -> Vec4 {
        match self.uniforms.get(name) {
            Some(UniformValue::Vec4(v)) => *v,
            Some(UniformValue::Vec3(v)) => v.extend(0.0),
            Some(UniformValue::Vec2(v)) => Vec4::new(v.x, v.y, 0.0, 0.0),
            Some(UniformValue::Float(v)) => Vec4::new(*v, 0.0, 0.0, 0.0),
            _ => Vec4::ZERO,
        }
    }

    fn mat4(&self, name: &str) -> Mat4 {
        match self.uniforms.get(name) {
            Some(UniformValue::Mat4(m)) => *m,
            _ => Mat4::ZERO,
        }
    }

    fn vec4_at(&self, name: &str, index: usize) -> Vec4 {
        match self.uniforms.get(name) {
            Some(UniformValue::Vec4Array(v)) => v.get(index).copied().unwrap_or(Vec4::ZERO),
            _ => Vec4::ZERO,
        }
    }

    fn mat4_at(&self, name: &str, index: usize) -> Mat4 {
        match self.uniforms.get(name) {
            Some(UniformValue::Mat4Array(v)) => v.get(index).copied().unwrap_or(Mat4::ZERO),
            _ => Mat4::ZERO,
        }
    }

    fn tap_weight(&self, i: u32) -> f32 {
        self.vec4_at("weights", (i / 4) as usize)[(i % 4) as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Model {
    GBuffer,
    ShadowMoments,
    ShadowBlur,
    LightResolve,
    LightDirectional,
    LightPoint,
    SsaoLinearize,
    SsaoDownsample,
    SsaoOcclusion,
    SsaoBlur,
    SsaoComposite,
}

const MODELS: [(&str, Model); 11] = [
    (programs::GBUFFER.label, Model::GBuffer),
    (programs::SHADOW_MOMENTS.label, Model::ShadowMoments),
    (programs::SHADOW_BLUR.label, Model::ShadowBlur),
    (programs::LIGHT_RESOLVE.label, Model::LightResolve),
    (programs::LIGHT_DIRECTIONAL.label, Model::LightDirectional),
    (programs::LIGHT_POINT.label, Model::LightPoint),
    (programs::SSAO_LINEARIZE.label, Model::SsaoLinearize),
    (programs::SSAO_DOWNSAMPLE.label, Model::SsaoDownsample),
    (programs::SSAO_OCCLUSION.label, Model::SsaoOcclusion),
    (programs::SSAO_BLUR.label, Model::SsaoBlur),
    (programs::SSAO_COMPOSITE.label, Model::SsaoComposite),
];

impl Model {
    fn for_program(label: &str) -> Option<Self> {
        MODELS
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, model)| *model)
    }
}

struct Fragment {
    pixel: UVec2,
    depth: f32,
    /// Perspective-correct interpolated vertex output
    varying: Vec3,
    /// Screen-space depth derivatives
    depth_slope: Vec2,
}

fn full_screen(width: u32, height: u32) -> Vec<Fragment> {
    (0..height)
        .flat_map(|y| {
            (0..width).map(move |x| Fragment {
                pixel: UVec2::new(x, y),
                depth: 0.0,
                varying: Vec3::ZERO,
                depth_slope: Vec2::ZERO,
            })
        })
        .collect()
}

type ClipVertex = (Vec4, Vec3);

fn vertex_stage(model: Model, s: &Shading, position: Vec3, normal: Vec3) -> ClipVertex {
    match model {
        Model::GBuffer => {
            let view_pos = s.mat4("view") * s.mat4("model") * position.extend(1.0);
            let normal_vs = (s.mat4("normal_matrix") * normal.extend(0.0)).xyz();
            (s.mat4("projection") * view_pos, normal_vs)
        }
        _ => (
            s.mat4("light_view_projection") * s.mat4("model") * position.extend(1.0),
            Vec3::ZERO,
        ),
    }
}

fn rasterize(model: Model, s: &Shading, mesh: &MeshData, width: u32, height: u32) -> Vec<Fragment> {
    let vertices: Vec<ClipVertex> = mesh
        .positions
        .iter()
        .zip(&mesh.normals)
        .map(|(p, n)| vertex_stage(model, s, *p, *n))
        .collect();
    let mut fragments = Vec::new();
    for tri in mesh.indices.chunks_exact(3) {
        let corners: Option<Vec<ClipVertex>> =
            tri.iter().map(|i| vertices.get(*i as usize).copied()).collect();
        let Some(corners) = corners else {
            continue;
        };
        let polygon = clip_near(&corners);
        for k in 1..polygon.len().saturating_sub(1) {
            raster_triangle([polygon[0], polygon[k], polygon[k + 1]], width, height, &mut fragments);
        }
    }
    fragments
}

/// Clip a convex polygon against `z >= 0` in clip space
fn clip_near(polygon: &[ClipVertex]) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for (i, &a) in polygon.iter().enumerate() {
        let b = polygon[(i + 1) % polygon.len()];
        let (da, db) = (a.0.z, b.0.z);
        if da >= 0.0 {
            out.push(a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            out.push((a.0.lerp(b.0, t), a.1.lerp(b.1, t)));
        }
    }
    out
}

fn raster_triangle(tri: [ClipVertex; 3], width: u32, height: u32, out: &mut Vec<Fragment>) {
    let ndc = tri.map(|(clip, _)| clip.xyz() / clip.w);
    // Counter-clockwise in NDC is front-facing
    let facing = (ndc[1].x - ndc[0].x) * (ndc[2].y - ndc[0].y)
        - (ndc[2].x - ndc[0].x) * (ndc[1].y - ndc[0].y);
    if !(facing > 0.0) {
        return;
    }
    let size = Vec2::new(width as f32, height as f32);
    let screen = ndc.map(|p| Vec2::new((p.x * 0.5 + 0.5) * size.x, (0.5 - p.y * 0.5) * size.y));
    let edge = |a: Vec2, b: Vec2, p: Vec2| (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let area = edge(screen[0], screen[1], screen[2]);
    if area == 0.0 {
        return;
    }

    let (d1, d2) = (screen[1] - screen[0], screen[2] - screen[0]);
    let (z1, z2) = (ndc[1].z - ndc[0].z, ndc[2].z - ndc[0].z);
    let det = d1.x * d2.y - d2.x * d1.y;
    let depth_slope = Vec2::new((z1 * d2.y - z2 * d1.y) / det, (z2 * d1.x - z1 * d2.x) / det);

    let lo = screen[0].min(screen[1]).min(screen[2]).floor().max(Vec2::ZERO);
    let hi = screen[0].max(screen[1]).max(screen[2]).ceil().min(size);
    for y in lo.y as u32..hi.y as u32 {
        for x in lo.x as u32..hi.x as u32 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let l0 = edge(screen[1], screen[2], p) / area;
            let l1 = edge(screen[2], screen[0], p) / area;
            let l2 = edge(screen[0], screen[1], p) / area;
            if l0 < 0.0 || l1 < 0.0 || l2 < 0.0 {
                continue;
            }
            let depth = l0 * ndc[0].z + l1 * ndc[1].z + l2 * ndc[2].z;
            if !(0.0..=1.0).contains(&depth) {
                continue;
            }
            let w = Vec3::new(l0 / tri[0].0.w, l1 / tri[1].0.w, l2 / tri[2].0.w);
            let varying = (tri[0].1 * w.x + tri[1].1 * w.y + tri[2].1 * w.z) / (w.x + w.y + w.z);
            out.push(Fragment {
                pixel: UVec2::new(x, y),
                depth,
                varying,
                depth_slope,
            });
        }
    }
}

/// Colour outputs per attachment; single-output programs fill slot 0
fn fragment_stage(model: Model, s: &Shading, f: &Fragment) -> [Vec4; 2] {
    let frag = f.pixel.as_vec2() + 0.5;
    let pixel = f.pixel.as_ivec2();
    let single = |v: Vec4| [v, Vec4::ZERO];
    let scalar = |v: f32| [Vec4::new(v, 0.0, 0.0, 0.0), Vec4::ZERO];
    match model {
        Model::GBuffer => {
            let diffuse = s.vec4("diffuse");
            [
                diffuse.xyz().extend((diffuse.w / SHININESS_SCALE).clamp(0.0, 1.0)),
                encode_normal(f.varying.normalize()).extend(1.0),
            ]
        }
        Model::ShadowMoments => {
            let z = f.depth;
            single(Vec4::new(z, z * z + 0.25 * f.depth_slope.length_squared(), 0.0, 0.0))
        }
        Model::ShadowBlur => single(shadow_blur(s, pixel).extend(0.0).extend(0.0)),
        Model::LightResolve => {
            let albedo = s.load("albedo", pixel, 0, 0).xyz();
            if s.uint("mode") == 1 {
                single(albedo.extend(1.0))
            } else {
                single((albedo * s.vec4("ambient").xyz()).extend(1.0))
            }
        }
        Model::LightDirectional => single(light_directional(s, frag, pixel).extend(0.0)),
        Model::LightPoint => single(light_point(s, frag, pixel).extend(0.0)),
        Model::SsaoLinearize => {
            let ndc = s.load("depth", pixel, 0, 0).x;
            let params = s.vec4("depth_params");
            let far = (params.z <= 0.5).then_some(params.y);
            scalar(linearize_depth(ndc, params.x, far))
        }
        Model::SsaoDownsample => {
            let limit = s.vec4("source_extent").xy().as_ivec2() - IVec2::ONE;
            let base = pixel * 2;
            let tap = |offset: IVec2| s.load("source", (base + offset).min(limit), 0, 0).x;
            scalar(tap(IVec2::ZERO).min(tap(IVec2::X)).min(tap(IVec2::Y)).min(tap(IVec2::ONE)))
        }
        Model::SsaoOcclusion => scalar(ssao_occlusion(s, frag, pixel)),
        Model::SsaoBlur => scalar(ssao_blur(s, pixel)),
        Model::SsaoComposite => {
            let ao = s.load("occlusion", pixel, 0, 0).x;
            let t = s.vec4("params").x.clamp(0.0, 1.0);
            let factor = 1.0 + (ao - 1.0) * t;
            single(Vec4::new(factor, factor, factor, 1.0))
        }
    }
}

fn shadow_blur(s: &Shading, centre: IVec2) -> Vec2 {
    let limit = s.dimensions("source").as_ivec2() - IVec2::ONE;
    let load = |c: IVec2| s.load("source", c.clamp(IVec2::ZERO, limit), 0, 0).xy();
    let stride = s.vec4("direction").xy().as_ivec2();
    let mut sum = load(centre) * s.tap_weight(0);
    for i in 1..=s.uint("radius") {
        let offset = stride * i as i32;
        sum += (load(centre + offset) + load(centre - offset)) * s.tap_weight(i);
    }
    sum
}

fn view_position(inverse_projection: Mat4, frag: Vec2, extent: Vec2, depth: f32) -> Vec3 {
    let ndc = Vec2::new(frag.x / extent.x * 2.0 - 1.0, 1.0 - frag.y / extent.y * 2.0);
    let p = inverse_projection * Vec4::new(ndc.x, ndc.y, depth, 1.0);
    p.xyz() / p.w
}

struct Surface {
    albedo: Vec4,
    normal: Vec3,
    position: Vec3,
}

fn surface(s: &Shading, frag: Vec2, pixel: IVec2) -> Surface {
    let extent = s.dimensions("depth").as_vec2();
    let depth = s.load("depth", pixel, 0, 0).x;
    Surface {
        albedo: s.load("albedo", pixel, 0, 0),
        normal: decode_normal(s.load("normal", pixel, 0, 0).xyz()),
        position: view_position(s.mat4("inverse_projection"), frag, extent, depth),
    }
}

fn light_directional(s: &Shading, frag: Vec2, pixel: IVec2) -> Vec3 {
    let surface = surface(s, frag, pixel);
    let world = (s.mat4("inverse_view") * surface.position.extend(1.0)).xyz();
    let v = (-surface.position).normalize();
    let l = s.vec4("light_direction").xyz().normalize();
    let lit = blinn_phong(
        surface.albedo.xyz(),
        surface.albedo.w * SHININESS_SCALE,
        surface.normal,
        l,
        v,
        s.vec4("color").xyz(),
    );
    lit * directional_visibility(s, world)
}

fn directional_visibility(s: &Shading, world: Vec3) -> f32 {
    if s.uint("shadowed") == 0 {
        return 1.0;
    }
    let params = s.vec4("shadow_params");
    let size = params.z as i32;
    for i in 0..s.uint("cascade_count") as usize {
        let sphere = s.vec4_at("cascade_spheres", i);
        if world.distance_squared(sphere.xyz()) <= sphere.w {
            let coord = s.mat4_at("cascade_matrices", i) * world.extend(1.0);
            let load = |c: IVec2| {
                let c = c.clamp(IVec2::ZERO, IVec2::splat(size - 1));
                s.load("moments", c, i as u32, 0).xy()
            };
            let moments = bilinear(load, coord.xy(), Vec2::splat(params.z));
            return chebyshev_upper_bound(moments, coord.z, params.x, params.y);
        }
    }
    1.0
}

fn light_point(s: &Shading, frag: Vec2, pixel: IVec2) -> Vec3 {
    let surface = surface(s, frag, pixel);
    let to_light = s.vec4("light_position").xyz() - surface.position;
    let dist = to_light.length();
    if dist <= 0.0 {
        return Vec3::ZERO;
    }
    let attenuation = s.vec4("attenuation");
    let scaled = attenuation.x * dist * dist;
    let falloff = if scaled <= 0.0 {
        1.0
    } else {
        1.0 / (1.0 + scaled.powf(attenuation.z))
    };
    let lit = blinn_phong(
        surface.albedo.xyz(),
        surface.albedo.w * SHININESS_SCALE,
        surface.normal,
        to_light / dist,
        (-surface.position).normalize(),
        s.vec4("color").xyz(),
    );
    lit * falloff
}

fn ssao_occlusion(s: &Shading, frag: Vec2, pixel: IVec2) -> f32 {
    let depth = s.load("linear_depth", pixel, 0, 0).x;
    if depth >= FAR_LIMIT {
        return 1.0;
    }
    let projection = s.vec4("projection");
    let params = s.vec4("params");
    let viewport = s.vec4("viewport");
    let view_from_pixel = |p: Vec2, d: f32| {
        let ndc = Vec2::new(p.x * viewport.z * 2.0 - 1.0, 1.0 - p.y * viewport.w * 2.0);
        Vec3::new(ndc.x * d / projection.x, ndc.y * d / projection.y, -d)
    };
    let pixel_from_view = |p: Vec3| {
        let inv_w = 1.0 / (-p.z).max(1.0e-6);
        let ndc = Vec2::new(p.x * projection.x * inv_w, p.y * projection.y * inv_w);
        Vec2::new((ndc.x * 0.5 + 0.5) * viewport.x, (0.5 - ndc.y * 0.5) * viewport.y)
    };

    let origin = view_from_pixel(frag, depth);
    let n = (s.load("normal", pixel, 0, 0).xyz() * 2.0 - 1.0).normalize();
    let tile = (pixel.x & 3) + (pixel.y & 3) * 4;
    let angle = tile as f32 * (std::f32::consts::TAU / 16.0);
    let seed = Vec3::new(angle.cos(), angle.sin(), 0.0);
    let helper = if seed.dot(n).abs() > 0.99 { Vec3::Z } else { seed };
    let tangent = (helper - n * helper.dot(n)).normalize();
    let bitangent = n.cross(tangent);

    let radius_view = view_space_radius(params.x, depth, projection.z);
    let mip_switch = params.w.max(1.0);
    let max_mip = s.uint("mip_levels").max(1) as i32 - 1;
    let kernel_size = s.uint("kernel_size");

    let mut occluded = 0.0;
    for i in 0..kernel_size as usize {
        let k = s.vec4_at("kernel", i).xyz();
        let offset = tangent * k.x + bitangent * k.y + n * k.z;
        let sample_view = origin + offset * radius_view;
        let sample_px = pixel_from_view(sample_view);
        if sample_px.x < 0.0 || sample_px.y < 0.0 || sample_px.x >= viewport.x || sample_px.y >= viewport.y {
            continue;
        }
        let offset_px = (sample_px - frag).length().max(1.0);
        let mip = ((offset_px / mip_switch).log2().floor() as i32).clamp(0, max_mip);
        let coord = IVec2::new(sample_px.x as i32 >> mip, sample_px.y as i32 >> mip);
        let scene_depth = s.load("linear_depth", coord, 0, mip as u32).x;
        let sample_depth = -sample_view.z;
        let range = smoothstep(radius_view / (depth - scene_depth).abs().max(1.0e-6));
        if scene_depth <= sample_depth - params.z {
            occluded += range;
        }
    }
    occlusion_factor(params.y, occluded, kernel_size as usize)
}

fn ssao_blur(s: &Shading, centre: IVec2) -> f32 {
    let limit = s.dimensions("occlusion").as_ivec2() - IVec2::ONE;
    let stride = s.vec4("direction").xy().as_ivec2();
    let params = s.vec4("params");
    let normal_at = |c: IVec2| (s.load("normal", c, 0, 0).xyz() * 2.0 - 1.0).normalize();
    let depth0 = s.load("linear_depth", centre, 0, 0).x;
    let n0 = normal_at(centre);

    let mut sum = s.load("occlusion", centre, 0, 0).x * s.tap_weight(0);
    let mut total = s.tap_weight(0);
    for i in 1..=s.uint("radius") {
        for side in [-1, 1] {
            let coord = (centre + stride * i as i32 * side).clamp(IVec2::ZERO, limit);
            let depth = s.load("linear_depth", coord, 0, 0).x;
            let depth_delta = (depth - depth0).abs() / (depth0 * params.x).max(1.0e-6);
            let w_depth = (-depth_delta * depth_delta).exp();
            let w_normal = normal_at(coord).dot(n0).max(0.0).powf(params.y);
            let w = s.tap_weight(i) * w_depth * w_normal;
            sum += s.load("occlusion", coord, 0, 0).x * w;
            total += w;
        }
    }
    sum / total.max(1.0e-6)
}
