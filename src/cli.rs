// src/cli.rs
// Argument parsing, demo scene and PNG conversion for the offscreen renderer
// RELEVANT FILES: src/bin/render_offscreen.rs, src/renderer.rs

use std::path::PathBuf;

use glam::Vec3;
use thiserror::Error;

use crate::camera::{Camera, Projection};
use crate::core::backend::{GpuBackend, MeshData};
use crate::error::RenderResult;
use crate::lighting::Light;
use crate::renderer::DeferredRenderer;
use crate::scene::transform::Transform;
use crate::scene::{Material, ObjectRecord, Scene, ShadowCaster};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CliError {
    message: String,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub const USAGE: &str = "usage: render_offscreen [--config FILE] [--output FILE] \
[--width N] [--height N] [--frames N] [--no-ssao] [--no-shadows]";

/// Flags accepted by `render_offscreen`
#[derive(Debug, Clone, PartialEq)]
pub struct OffscreenArgs {
    pub config: Option<PathBuf>,
    pub output: PathBuf,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Frames rendered before readback; later frames reuse the SSAO history
    pub frames: u32,
    pub no_ssao: bool,
    pub no_shadows: bool,
    pub help: bool,
}

impl Default for OffscreenArgs {
    fn default() -> Self {
        Self {
            config: None,
            output: PathBuf::from("deferred.png"),
            width: None,
            height: None,
            frames: 1,
            no_ssao: false,
            no_shadows: false,
            help: false,
        }
    }
}

fn value<'a>(args: &'a [String], idx: usize, flag: &str) -> Result<&'a str, CliError> {
    args.get(idx + 1)
        .map(String::as_str)
        .ok_or_else(|| CliError::new(format!("missing value for {flag}")))
}

fn parse_u32(args: &[String], idx: usize, flag: &str) -> Result<u32, CliError> {
    let raw = value(args, idx, flag)?;
    let v = raw
        .parse::<u32>()
        .map_err(|_| CliError::new(format!("invalid integer value '{raw}' for {flag}")))?;
    if v == 0 {
        return Err(CliError::new(format!("{flag} must be at least 1")));
    }
    Ok(v)
}

impl OffscreenArgs {
    /// Parse a flat argument list (excluding argv[0]).
    pub fn parse(args: &[String]) -> Result<Self, CliError> {
        let mut out = OffscreenArgs::default();
        let mut i = 0usize;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    out.config = Some(PathBuf::from(value(args, i, "--config")?));
                    i += 2;
                }
                "--output" | "-o" => {
                    out.output = PathBuf::from(value(args, i, "--output")?);
                    i += 2;
                }
                "--width" => {
                    out.width = Some(parse_u32(args, i, "--width")?);
                    i += 2;
                }
                "--height" => {
                    out.height = Some(parse_u32(args, i, "--height")?);
                    i += 2;
                }
                "--frames" => {
                    out.frames = parse_u32(args, i, "--frames")?;
                    i += 2;
                }
                "--no-ssao" => {
                    out.no_ssao = true;
                    i += 1;
                }
                "--no-shadows" => {
                    out.no_shadows = true;
                    i += 1;
                }
                "--help" | "-h" => {
                    out.help = true;
                    i += 1;
                }
                other => return Err(CliError::new(format!("unknown argument '{other}'"))),
            }
        }
        Ok(out)
    }
}

/// Ground plane, a few cubes, a shadowing sun and a warm point light.
///
/// Returns the scene and a camera framing it at `aspect`.
pub fn demo_scene<B: GpuBackend>(
    renderer: &mut DeferredRenderer<B>,
    aspect: f32,
    shadows: bool,
) -> RenderResult<(Scene, Camera)> {
    let plane = renderer.upload_mesh(&MeshData::plane(20.0))?;
    let cube = renderer.upload_mesh(&MeshData::cube(0.5))?;
    let marker = renderer.upload_mesh(&MeshData::cube(0.1))?;

    let mut scene = Scene::new();
    scene.spawn(
        ObjectRecord::new()
            .with(Transform::default())
            .with(plane)
            .with(Material::new(Vec3::new(0.6, 0.6, 0.55), 0.0))
            .with(ShadowCaster(false)),
    );
    let cubes = [
        (Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.8, 0.2, 0.2), 0.0),
        (Vec3::new(2.0, 1.0, -1.5), Vec3::new(0.2, 0.6, 0.9), 45.0),
        (Vec3::new(-2.5, 0.75, 1.0), Vec3::new(0.3, 0.8, 0.3), 20.0),
    ];
    for (position, colour, yaw) in cubes {
        let scale = position.y * 2.0;
        scene.spawn(
            ObjectRecord::new()
                .with(
                    Transform::from_translation(position)
                        .with_rotation_degrees(Vec3::new(0.0, yaw, 0.0))
                        .with_scale(Vec3::splat(scale)),
                )
                .with(cube)
                .with(Material::new(colour, 64.0))
                .with(ShadowCaster(true)),
        );
    }

    let mut sun = Light::directional(Vec3::new(-0.4, 1.0, 0.3), Vec3::new(1.0, 0.95, 0.85));
    if let Light::Directional { casts_shadows, .. } = &mut sun {
        *casts_shadows = shadows;
    }
    scene.spawn(ObjectRecord::new().with(sun));
    scene.spawn(
        ObjectRecord::new()
            .with(Transform::from_translation(Vec3::new(1.0, 1.5, 2.0)))
            .with(marker)
            .with(Light::point(Vec3::new(1.0, 0.6, 0.3), 2.0, 4.0)),
    );

    let camera = Camera::look_at(
        Vec3::new(6.0, 4.5, 8.0),
        Vec3::new(0.0, 0.5, 0.0),
        Vec3::Y,
        Projection::new(50.0_f32.to_radians(), aspect, 0.1, 200.0),
    );
    Ok((scene, camera))
}

/// Reinhard tonemap and sRGB encode of RGBA float texels
pub fn tonemap_rgba8(width: u32, height: u32, texels: &[f32]) -> image::RgbaImage {
    let encode = |linear: f32| -> u8 {
        let mapped = linear.max(0.0) / (1.0 + linear.max(0.0));
        let srgb = if mapped <= 0.003_130_8 {
            mapped * 12.92
        } else {
            1.055 * mapped.powf(1.0 / 2.4) - 0.055
        };
        (srgb.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
    };
    image::RgbaImage::from_fn(width, height, |x, y| {
        let i = ((y * width + x) * 4) as usize;
        let px = texels.get(i..i + 4).unwrap_or(&[0.0, 0.0, 0.0, 1.0]);
        image::Rgba([
            encode(px[0]),
            encode(px[1]),
            encode(px[2]),
            (px[3].clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        ])
    })
}
