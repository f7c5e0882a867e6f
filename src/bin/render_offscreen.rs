use std::time::Instant;

use anyhow::{bail, Context};
use deferred_forge::cli::{demo_scene, tonemap_rgba8, OffscreenArgs, USAGE};
use deferred_forge::core::WgpuBackend;
use deferred_forge::{DeferredRenderer, RendererConfig};
use log::info;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = OffscreenArgs::parse(&raw).with_context(|| USAGE.to_string())?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => RendererConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RendererConfig::default(),
    };
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if args.no_ssao {
        config.ssao.enabled = false;
    }
    config.validate()?;

    let backend = WgpuBackend::headless().context("creating headless device")?;
    let mut renderer = DeferredRenderer::new(backend, config.clone())?;
    let aspect = config.width as f32 / config.height as f32;
    let (scene, camera) = demo_scene(&mut renderer, aspect, !args.no_shadows)?;

    let start = Instant::now();
    let mut last = None;
    for _ in 0..args.frames {
        last = Some(renderer.render_frame(&scene, &camera)?);
    }
    let Some(report) = last else {
        bail!("no frames rendered");
    };
    info!(
        "Rendered {} frame(s) in {:.1} ms; last: {} draws, {} lights",
        args.frames,
        start.elapsed().as_secs_f64() * 1000.0,
        report.commands.draws,
        report.lights
    );

    let lit = renderer.lit_target();
    let pixels = renderer.backend_mut().read_target(lit, 0, 0, 0)?;
    let image = tonemap_rgba8(pixels.width, pixels.height, &pixels.data);
    image
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("Wrote {}", args.output.display());
    Ok(())
}
