use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use sha2::Digest as _;

#[derive(Parser, Debug)]
#[command(name = "captioner", version)]
struct Cli {
    /// Config JSON; every field is optional.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of source images (overrides config).
    #[arg(long, global = true)]
    originals: Option<PathBuf>,

    /// Output root (overrides config).
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Caption font file (overrides config).
    #[arg(long, global = true)]
    font: Option<PathBuf>,

    /// Answer with `data:` URLs instead of public paths.
    #[arg(long, global = true)]
    data_urls: bool,

    /// Worker threads for the per-image stage (0 renders sequentially).
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the originals listing as JSON.
    Originals,
    /// Caption every original with a phrase and print the produced references as JSON.
    Render(RenderArgs),
    /// Print the effective configuration as JSON.
    Config,
    /// Print diagnostics about caption font resolution (family name + SHA-256 of font bytes).
    Font,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Caption text.
    #[arg(long)]
    phrase: String,

    /// Also print every per-image failure to stderr.
    #[arg(long)]
    report: bool,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = effective_config(&cli)?;
    match &cli.cmd {
        Command::Originals => cmd_originals(&cfg),
        Command::Render(args) => cmd_render(&cfg, args),
        Command::Config => print_json(&cfg),
        Command::Font => cmd_font(&cfg),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn effective_config(cli: &Cli) -> anyhow::Result<captioner::AppConfig> {
    let mut cfg = match &cli.config {
        Some(path) => captioner::AppConfig::from_json_file(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => captioner::AppConfig::default(),
    };

    if let Some(dir) = &cli.originals {
        cfg.originals_dir = dir.clone();
    }
    if let Some(dir) = &cli.output {
        cfg.output_dir = dir.clone();
    }
    if let Some(font) = &cli.font {
        cfg.font_path = font.clone();
    }
    if cli.data_urls {
        cfg.reference_mode = captioner::ReferenceMode::DataUrl;
    }
    match cli.threads {
        Some(0) => cfg.threading.parallel = false,
        Some(n) => {
            cfg.threading.parallel = true;
            cfg.threading.threads = Some(n);
        }
        None => {}
    }

    cfg.validate().context("validate config")?;
    Ok(cfg)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output JSON")?;
    println!("{text}");
    Ok(())
}

fn cmd_originals(cfg: &captioner::AppConfig) -> anyhow::Result<()> {
    let originals = captioner::DirOriginals::new(&cfg.originals_dir);
    let list = captioner::api::originals_listing(&originals, &cfg.public_originals_prefix)
        .with_context(|| format!("list originals in '{}'", cfg.originals_dir.display()))?;
    print_json(&list)
}

fn resolve_font(cfg: &captioner::AppConfig) -> captioner::FontProvider {
    let weight = cfg.style.font_weight.round().clamp(1.0, 1000.0) as u16;
    captioner::FontProvider::resolve(&cfg.font_path, &cfg.font_dirs, weight)
}

fn cmd_render(cfg: &captioner::AppConfig, args: &RenderArgs) -> anyhow::Result<()> {
    let fonts = resolve_font(cfg);
    let store = captioner::OutputStore::open(&cfg.output_dir, cfg.keep_generations)
        .with_context(|| format!("open output store '{}'", cfg.output_dir.display()))?;
    let compositor = captioner::CaptionCompositor::new(cfg.style.clone())?;
    let renderer = captioner::BatchRenderer::new(
        captioner::DirOriginals::new(&cfg.originals_dir),
        store,
        compositor,
        fonts,
        cfg.threading.clone(),
    )?;

    let report = renderer.render(&args.phrase, &captioner::CancelToken::new())?;
    if args.report {
        eprintln!("batch {} for {:?}:", report.generation, report.phrase);
        for produced in report.produced() {
            eprintln!(
                "  ok    {} ({} lines, {} bytes)",
                produced.name, produced.lines, produced.jpeg.len()
            );
        }
        for (name, err) in report.failures() {
            eprintln!("  fail  {name}: {err}");
        }
    }

    let list =
        captioner::api::references(&report, cfg.reference_mode, &cfg.public_output_prefix);
    print_json(&list)
}

fn cmd_font(cfg: &captioner::AppConfig) -> anyhow::Result<()> {
    let fonts = resolve_font(cfg);
    let Some(face) = fonts.face() else {
        anyhow::bail!(
            "no caption font resolved from '{}' or fallbacks",
            cfg.font_path.display()
        );
    };
    eprintln!("caption font diagnostics:");
    eprintln!("  source:  {}", face.source);
    eprintln!("  family:  {}", face.family);
    eprintln!("  index:   {}", face.index);
    eprintln!("  sha256:  {}", sha256_hex(&face.bytes));
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
