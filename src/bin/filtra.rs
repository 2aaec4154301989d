use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use filtra::{BackendKind, Extent, FilterRegistry, GraphDoc, Image, RenderOptions, render};

#[derive(Parser, Debug)]
#[command(name = "filtra", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a graph document to a PNG.
    Render(RenderArgs),
    /// List the registered filters and their parameter schemas.
    Filters(FiltersArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Graph document JSON.
    #[arg(long)]
    graph: PathBuf,

    /// Source image, as NAME=PATH; repeat per declared source.
    #[arg(long = "input", value_name = "NAME=PATH")]
    inputs: Vec<String>,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Output region as X,Y,W,H. Defaults to the union of the source extents.
    #[arg(long, value_name = "X,Y,W,H")]
    extent: Option<String>,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Parser, Debug)]
struct FiltersArgs {
    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
}

impl From<BackendChoice> for BackendKind {
    fn from(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Cpu => BackendKind::Cpu,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Filters(args) => cmd_filters(args),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let registry = FilterRegistry::with_builtin(args.backend.into())?;

    let json = fs::read_to_string(&args.graph)
        .with_context(|| format!("read graph document '{}'", args.graph.display()))?;
    let doc = GraphDoc::from_json(&json)?;

    let mut sources = BTreeMap::new();
    for spec in &args.inputs {
        let (name, path) = spec
            .split_once('=')
            .with_context(|| format!("--input '{spec}' is not NAME=PATH"))?;
        sources.insert(name.to_string(), load_png_premul(Path::new(path))?);
    }

    let pipeline = doc.build(&registry, &sources)?;
    let options = RenderOptions {
        extent: args.extent.as_deref().map(parse_extent).transpose()?,
    };
    let result = render(&pipeline, &registry, &options)?;

    if let Some(parent) = args.out.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let straight = unpremultiply(&result.data);
    image::save_buffer_with_format(
        &args.out,
        &straight,
        result.width,
        result.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_filters(args: FiltersArgs) -> anyhow::Result<()> {
    let registry = FilterRegistry::with_builtin(args.backend.into())?;
    for spec in registry.specs() {
        let inputs = spec.image_inputs().join(", ");
        println!("{}({inputs})", spec.name());
        for p in spec.params() {
            let requirement = if p.required { "required" } else { "optional" };
            println!("  {}: {} ({requirement})", p.name, p.tag);
        }
    }
    Ok(())
}

fn load_png_premul(path: &Path) -> anyhow::Result<Image> {
    let decoded = image::open(path)
        .with_context(|| format!("decode image '{}'", path.display()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();

    let mut data = decoded.into_raw();
    for px in data.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        for c in 0..3 {
            px[c] = ((u16::from(px[c]) * a + 127) / 255) as u8;
        }
    }

    Ok(Image::from_rgba8_premul(Extent::sized(width, height), data)?)
}

fn unpremultiply(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    for px in out.chunks_exact_mut(4) {
        let a = px[3];
        if a == 0 || a == 255 {
            continue;
        }
        for c in 0..3 {
            px[c] = ((u16::from(px[c]) * 255 + u16::from(a) / 2) / u16::from(a)).min(255) as u8;
        }
    }
    out
}

fn parse_extent(spec: &str) -> anyhow::Result<Extent> {
    let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        anyhow::bail!("--extent '{spec}' is not X,Y,W,H");
    };
    Ok(Extent::new(
        x.parse().with_context(|| format!("extent x '{x}'"))?,
        y.parse().with_context(|| format!("extent y '{y}'"))?,
        w.parse().with_context(|| format!("extent width '{w}'"))?,
        h.parse().with_context(|| format!("extent height '{h}'"))?,
    ))
}
