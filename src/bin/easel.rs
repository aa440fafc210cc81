use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "easel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one frame of a scene as a PNG.
    Frame(FrameArgs),
    /// Render a synthetic scene repeatedly and print performance stats.
    Stress(StressArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Parser, Debug)]
struct StressArgs {
    /// Number of synthetic objects.
    #[arg(long, default_value_t = 2000)]
    objects: usize,

    /// Number of frames to render.
    #[arg(long, default_value_t = 120)]
    frames: usize,

    /// Canvas width in pixels.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Canvas height in pixels.
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    Gpu,
}

impl From<BackendChoice> for easel::BackendKind {
    fn from(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Cpu => easel::BackendKind::Cpu,
            BackendChoice::Gpu => easel::BackendKind::Gpu,
        }
    }
}

/// On-disk scene description. Image and font values are file paths
/// resolved relative to the scene file's directory.
#[derive(Debug, serde::Deserialize)]
struct SceneDoc {
    canvas: easel::Canvas,
    #[serde(default)]
    camera: easel::Camera,
    #[serde(default)]
    settings: easel::SettingsPatch,
    objects: Vec<easel::RenderObject>,
    #[serde(default)]
    images: BTreeMap<String, PathBuf>,
    #[serde(default)]
    fonts: BTreeMap<String, PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Stress(args) => cmd_stress(args),
    }
}

fn read_scene_json(path: &Path) -> anyhow::Result<SceneDoc> {
    let f = File::open(path).with_context(|| format!("open scene '{}'", path.display()))?;
    let r = BufReader::new(f);
    let doc: SceneDoc = serde_json::from_reader(r).with_context(|| "parse scene JSON")?;
    Ok(doc)
}

fn make_engine(
    canvas: easel::Canvas,
    choice: BackendChoice,
    settings: &easel::SettingsPatch,
) -> anyhow::Result<easel::CanvasEngine> {
    let opts = easel::EngineOpts {
        settings: easel::OptimizationSettings {
            prefer_gpu: matches!(choice, BackendChoice::Gpu),
            ..easel::OptimizationSettings::default()
        },
        clear_rgba: Some([255, 255, 255, 255]),
        ..easel::EngineOpts::default()
    };
    let mut engine = easel::CanvasEngine::new(canvas, opts)?;
    engine.update_settings(settings);
    Ok(engine)
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let doc = read_scene_json(&args.in_path)?;
    for obj in &doc.objects {
        obj.validate()?;
    }

    let mut engine = make_engine(doc.canvas, args.backend, &doc.settings)?;
    if matches!(args.backend, BackendChoice::Gpu)
        && engine.render_mode() != easel::BackendKind::Gpu
    {
        eprintln!("gpu backend unavailable, rendering on cpu");
    }

    let root = args.in_path.parent().unwrap_or_else(|| Path::new("."));
    for (key, rel) in &doc.images {
        let path = root.join(rel);
        engine
            .resources_mut()
            .load_image_file(key, &path)
            .with_context(|| format!("load image '{key}' from '{}'", path.display()))?;
    }
    for (key, rel) in &doc.fonts {
        let path = root.join(rel);
        engine
            .resources_mut()
            .load_font_file(key, &path)
            .with_context(|| format!("load font '{key}' from '{}'", path.display()))?;
    }

    let frame = engine.render(&doc.objects, &doc.camera)?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_stress(args: StressArgs) -> anyhow::Result<()> {
    let canvas = easel::Canvas {
        width: args.width,
        height: args.height,
    };
    let mut engine = make_engine(canvas, args.backend, &easel::SettingsPatch::default())?;

    let objects = synthetic_objects(args.objects, canvas);
    let camera = easel::Camera::default();

    let start = std::time::Instant::now();
    for _ in 0..args.frames {
        engine.render(&objects, &camera)?;
    }
    let elapsed = start.elapsed();

    let stats = engine.performance_stats();
    eprintln!(
        "{} frames x {} objects in {:.2}s ({:.1} fps)",
        args.frames,
        args.objects,
        elapsed.as_secs_f64(),
        args.frames as f64 / elapsed.as_secs_f64().max(1e-9),
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Deterministic grid of colored rects and ellipses spread across and
/// beyond the viewport, so culling and budgeting both have work to do.
fn synthetic_objects(count: usize, canvas: easel::Canvas) -> Vec<easel::RenderObject> {
    let cols = (count as f64).sqrt().ceil().max(1.0) as usize;
    let span_x = canvas.width as f64 * 2.0;
    let span_y = canvas.height as f64 * 2.0;
    (0..count)
        .map(|i| {
            let col = i % cols;
            let row = i / cols;
            let kind = if i % 3 == 0 {
                easel::ObjectKind::Ellipse
            } else {
                easel::ObjectKind::Rect
            };
            easel::RenderObject {
                id: format!("obj-{i}"),
                z_index: (i % 32) as i32,
                transform: easel::ObjectTransform {
                    position: kurbo::Point::new(
                        col as f64 / cols as f64 * span_x - span_x / 4.0,
                        row as f64 / cols.max(1) as f64 * span_y - span_y / 4.0,
                    ),
                    width: 24.0,
                    height: 24.0,
                    ..easel::ObjectTransform::default()
                },
                style: easel::ObjectStyle {
                    fill: easel::Rgba8::rgb(
                        (i * 37 % 256) as u8,
                        (i * 101 % 256) as u8,
                        (i * 197 % 256) as u8,
                    ),
                    ..easel::ObjectStyle::default()
                },
                kind,
            }
        })
        .collect()
}
