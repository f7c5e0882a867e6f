// src/core/programs.rs
// Program catalog: WGSL sources with their uniform and texture interfaces
// Uniform declaration order must match the member order of each `struct Uniforms`

use super::backend::{ProgramSource, TextureDecl, TextureKind, VertexInput};
use super::uniforms::{UniformDecl, UniformKind};

/// Upper bound on cascades, sized into the directional light uniforms
pub const MAX_CASCADES: usize = 8;
/// Upper bound on SSAO kernel samples
pub const MAX_KERNEL_SIZE: usize = 256;
/// Packed Gaussian taps: centre plus up to 15 one-sided weights
pub const MAX_BLUR_TAPS: usize = 16;

const FULLSCREEN_VS: &str = "vs_fullscreen";

pub const GBUFFER: ProgramSource = ProgramSource {
    label: "gbuffer",
    source: include_str!("../shaders/gbuffer.wgsl"),
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("model", UniformKind::Mat4),
        UniformDecl::new("view", UniformKind::Mat4),
        UniformDecl::new("projection", UniformKind::Mat4),
        UniformDecl::new("normal_matrix", UniformKind::Mat4),
        UniformDecl::new("diffuse", UniformKind::Vec4),
    ],
    textures: &[],
    vertex_input: VertexInput::Mesh,
};

pub const SHADOW_MOMENTS: ProgramSource = ProgramSource {
    label: "shadow_moments",
    source: include_str!("../shaders/shadow_moments.wgsl"),
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("model", UniformKind::Mat4),
        UniformDecl::new("light_view_projection", UniformKind::Mat4),
    ],
    textures: &[],
    vertex_input: VertexInput::Mesh,
};

pub const SHADOW_BLUR: ProgramSource = ProgramSource {
    label: "shadow_blur",
    source: concat!(
        include_str!("../shaders/fullscreen.wgsl"),
        "\n",
        include_str!("../shaders/shadow_blur.wgsl")
    ),
    vertex_entry: FULLSCREEN_VS,
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("weights", UniformKind::Vec4Array(4)),
        UniformDecl::new("direction", UniformKind::Vec4),
        UniformDecl::new("radius", UniformKind::UInt),
    ],
    textures: &[TextureDecl::new("source", TextureKind::Color2D)],
    vertex_input: VertexInput::FullScreen,
};

pub const LIGHT_RESOLVE: ProgramSource = ProgramSource {
    label: "light_resolve",
    source: concat!(
        include_str!("../shaders/fullscreen.wgsl"),
        "\n",
        include_str!("../shaders/light_resolve.wgsl")
    ),
    vertex_entry: FULLSCREEN_VS,
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("ambient", UniformKind::Vec4),
        UniformDecl::new("mode", UniformKind::UInt),
    ],
    textures: &[TextureDecl::new("albedo", TextureKind::Color2D)],
    vertex_input: VertexInput::FullScreen,
};

pub const LIGHT_DIRECTIONAL: ProgramSource = ProgramSource {
    label: "light_directional",
    source: concat!(
        include_str!("../shaders/fullscreen.wgsl"),
        "\n",
        include_str!("../shaders/lighting_common.wgsl"),
        "\n",
        include_str!("../shaders/light_directional.wgsl")
    ),
    vertex_entry: FULLSCREEN_VS,
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("inverse_projection", UniformKind::Mat4),
        UniformDecl::new("inverse_view", UniformKind::Mat4),
        UniformDecl::new("cascade_matrices", UniformKind::Mat4Array(MAX_CASCADES as u32)),
        UniformDecl::new("cascade_spheres", UniformKind::Vec4Array(MAX_CASCADES as u32)),
        UniformDecl::new("light_direction", UniformKind::Vec4),
        UniformDecl::new("color", UniformKind::Vec4),
        UniformDecl::new("shadow_params", UniformKind::Vec4),
        UniformDecl::new("cascade_count", UniformKind::UInt),
        UniformDecl::new("shadowed", UniformKind::UInt),
    ],
    textures: &[
        TextureDecl::new("albedo", TextureKind::Color2D),
        TextureDecl::new("normal", TextureKind::Color2D),
        TextureDecl::new("depth", TextureKind::Depth2D),
        TextureDecl::new("moments", TextureKind::Color2DArray),
    ],
    vertex_input: VertexInput::FullScreen,
};

pub const LIGHT_POINT: ProgramSource = ProgramSource {
    label: "light_point",
    source: concat!(
        include_str!("../shaders/fullscreen.wgsl"),
        "\n",
        include_str!("../shaders/lighting_common.wgsl"),
        "\n",
        include_str!("../shaders/light_point.wgsl")
    ),
    vertex_entry: FULLSCREEN_VS,
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("inverse_projection", UniformKind::Mat4),
        UniformDecl::new("light_position", UniformKind::Vec4),
        UniformDecl::new("color", UniformKind::Vec4),
        UniformDecl::new("attenuation", UniformKind::Vec4),
    ],
    textures: &[
        TextureDecl::new("albedo", TextureKind::Color2D),
        TextureDecl::new("normal", TextureKind::Color2D),
        TextureDecl::new("depth", TextureKind::Depth2D),
    ],
    vertex_input: VertexInput::FullScreen,
};

pub const SSAO_LINEARIZE: ProgramSource = ProgramSource {
    label: "ssao_linearize",
    source: concat!(
        include_str!("../shaders/fullscreen.wgsl"),
        "\n",
        include_str!("../shaders/ssao_linearize.wgsl")
    ),
    vertex_entry: FULLSCREEN_VS,
    fragment_entry: "fs_main",
    uniforms: &[UniformDecl::new("depth_params", UniformKind::Vec4)],
    textures: &[TextureDecl::new("depth", TextureKind::Depth2D)],
    vertex_input: VertexInput::FullScreen,
};

pub const SSAO_DOWNSAMPLE: ProgramSource = ProgramSource {
    label: "ssao_downsample",
    source: concat!(
        include_str!("../shaders/fullscreen.wgsl"),
        "\n",
        include_str!("../shaders/ssao_downsample.wgsl")
    ),
    vertex_entry: FULLSCREEN_VS,
    fragment_entry: "fs_main",
    uniforms: &[UniformDecl::new("source_extent", UniformKind::Vec4)],
    textures: &[TextureDecl::new("source", TextureKind::Color2D)],
    vertex_input: VertexInput::FullScreen,
};

pub const SSAO_OCCLUSION: ProgramSource = ProgramSource {
    label: "ssao_occlusion",
    source: concat!(
        include_str!("../shaders/fullscreen.wgsl"),
        "\n",
        include_str!("../shaders/ssao_occlusion.wgsl")
    ),
    vertex_entry: FULLSCREEN_VS,
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("kernel", UniformKind::Vec4Array(MAX_KERNEL_SIZE as u32)),
        UniformDecl::new("projection", UniformKind::Vec4),
        UniformDecl::new("params", UniformKind::Vec4),
        UniformDecl::new("viewport", UniformKind::Vec4),
        UniformDecl::new("kernel_size", UniformKind::UInt),
        UniformDecl::new("mip_levels", UniformKind::UInt),
    ],
    textures: &[
        TextureDecl::new("linear_depth", TextureKind::Color2D),
        TextureDecl::new("normal", TextureKind::Color2D),
    ],
    vertex_input: VertexInput::FullScreen,
};

pub const SSAO_BLUR: ProgramSource = ProgramSource {
    label: "ssao_blur",
    source: concat!(
        include_str!("../shaders/fullscreen.wgsl"),
        "\n",
        include_str!("../shaders/ssao_blur.wgsl")
    ),
    vertex_entry: FULLSCREEN_VS,
    fragment_entry: "fs_main",
    uniforms: &[
        UniformDecl::new("weights", UniformKind::Vec4Array(4)),
        UniformDecl::new("direction", UniformKind::Vec4),
        UniformDecl::new("params", UniformKind::Vec4),
        UniformDecl::new("radius", UniformKind::UInt),
    ],
    textures: &[
        TextureDecl::new("occlusion", TextureKind::Color2D),
        TextureDecl::new("linear_depth", TextureKind::Color2D),
        TextureDecl::new("normal", TextureKind::Color2D),
    ],
    vertex_input: VertexInput::FullScreen,
};

pub const SSAO_COMPOSITE: ProgramSource = ProgramSource {
    label: "ssao_composite",
    source: concat!(
        include_str!("../shaders/fullscreen.wgsl"),
        "\n",
        include_str!("../shaders/ssao_composite.wgsl")
    ),
    vertex_entry: FULLSCREEN_VS,
    fragment_entry: "fs_main",
    uniforms: &[UniformDecl::new("params", UniformKind::Vec4)],
    textures: &[TextureDecl::new("occlusion", TextureKind::Color2D)],
    vertex_input: VertexInput::FullScreen,
};

/// Every program, in pipeline order
pub const ALL: [&ProgramSource; 11] = [
    &GBUFFER,
    &SHADOW_MOMENTS,
    &SHADOW_BLUR,
    &LIGHT_RESOLVE,
    &LIGHT_DIRECTIONAL,
    &LIGHT_POINT,
    &SSAO_LINEARIZE,
    &SSAO_DOWNSAMPLE,
    &SSAO_OCCLUSION,
    &SSAO_BLUR,
    &SSAO_COMPOSITE,
];

/// Pack up to [`MAX_BLUR_TAPS`] one-sided weights into four vec4s
pub fn pack_weights(weights: &[f32]) -> Vec<glam::Vec4> {
    let mut packed = [0.0f32; MAX_BLUR_TAPS];
    for (dst, w) in packed.iter_mut().zip(weights) {
        *dst = *w;
    }
    packed
        .chunks_exact(4)
        .map(|c| glam::Vec4::new(c[0], c[1], c[2], c[3]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_unique() {
        let mut labels: Vec<_> = ALL.iter().map(|p| p.label).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), ALL.len());
    }

    #[test]
    fn fullscreen_programs_share_vertex_stage() {
        for program in ALL.iter().filter(|p| p.vertex_input == VertexInput::FullScreen) {
            assert_eq!(program.vertex_entry, FULLSCREEN_VS);
            assert!(program.source.contains("fn vs_fullscreen"));
            for decl in program.textures {
                assert!(
                    program.source.contains(&format!("{}_tex", decl.name))
                        || program.source.contains(&format!("var {}:", decl.name)),
                    "{} lacks texture '{}'",
                    program.label,
                    decl.name
                );
            }
        }
    }

    #[test]
    fn weights_pack_in_order() {
        let packed = pack_weights(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(packed.len(), 4);
        assert_eq!(packed[1].x, 5.0);
        assert_eq!(packed[3], glam::Vec4::ZERO);
    }
}
