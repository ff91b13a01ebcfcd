use anyhow::{anyhow, ensure, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use nback_lib::{
    batch::clean_tree,
    config::{read_config, CleanConfig},
    detectors::artifact::{clean_series_with_config, ArtifactConfig, DEFAULT_MULTIPLIER},
    io::eye::{EyeTable, LEFT_PUPIL},
    plot::{figure_from_cleaning, Figure, Series},
    recording::{simulate_samples, CsvSink, RecordingSession},
};
use nback_run::{
    create_session, generate_letter_sequence, parse_level_sequence, plan_session, read_design,
    write_plan, SessionDesign,
};
use plotters::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "nback",
    version,
    about = "Auditory N-back pupillometry tools"
)]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean every eye_data.csv below ROOT and write <stem>_clean.csv next to it
    Clean {
        root: PathBuf,
        /// TOML file with a [clean] table
        #[arg(long)]
        config: Option<PathBuf>,
        /// MAD multiplier for the jump threshold
        #[arg(long)]
        multiplier: Option<f64>,
        /// Worker threads (0 = one per core)
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Generate one N-back letter sequence as JSON
    Sequence {
        #[arg(long)]
        level: u32,
        #[arg(long, default_value_t = 10)]
        targets: usize,
        #[arg(long, default_value_t = 70)]
        length: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Create the participant folder with per-trial CSV headers and a plan.json
    SessionInit {
        #[arg(long)]
        participant: String,
        #[arg(long, default_value = "participants_data")]
        base: PathBuf,
        /// Overrides the trial count of the design
        #[arg(long)]
        trials: Option<usize>,
        /// Block order such as 1-2-3
        #[arg(long)]
        levels: Option<String>,
        /// TOML session design
        #[arg(long)]
        design: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Append a simulated gaze recording to an eye_data.csv
    Simulate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 100)]
        samples: usize,
        #[arg(long, default_value = "P00")]
        participant: String,
        #[arg(long, default_value = "Run1")]
        run: String,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Render raw and cleaned values of one channel to a PNG
    Plot {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = LEFT_PUPIL)]
        column: String,
        #[arg(long, default_value_t = DEFAULT_MULTIPLIER)]
        multiplier: f64,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Clean {
            root,
            config,
            multiplier,
            jobs,
        } => cmd_clean(&root, config.as_deref(), multiplier, jobs)?,
        Commands::Sequence {
            level,
            targets,
            length,
            seed,
        } => cmd_sequence(level, targets, length, seed)?,
        Commands::SessionInit {
            participant,
            base,
            trials,
            levels,
            design,
            seed,
        } => cmd_session_init(
            &participant,
            &base,
            trials,
            levels.as_deref(),
            design.as_deref(),
            seed,
        )?,
        Commands::Simulate {
            out,
            samples,
            participant,
            run,
            seed,
        } => cmd_simulate(&out, samples, &participant, &run, seed)?,
        Commands::Plot {
            input,
            column,
            multiplier,
            out,
        } => cmd_plot(&input, &column, multiplier, &out)?,
    }
    Ok(())
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn cmd_clean(
    root: &Path,
    config: Option<&Path>,
    multiplier: Option<f64>,
    jobs: Option<usize>,
) -> Result<()> {
    let mut cfg = match config {
        Some(path) => read_config(path)?,
        None => CleanConfig::default(),
    };
    if let Some(multiplier) = multiplier {
        cfg.multiplier = multiplier;
    }
    if let Some(jobs) = jobs {
        cfg.jobs = jobs;
    }
    let summary = clean_tree(root, &cfg)?;
    info!(
        "cleaned {}, skipped {}, failed {} of {} file(s)",
        summary.cleaned, summary.skipped, summary.failed, summary.found
    );
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_sequence(level: u32, targets: usize, length: usize, seed: Option<u64>) -> Result<()> {
    let mut rng = rng_from(seed);
    let seq = generate_letter_sequence(level, targets, length, &mut rng)?;
    println!("{}", serde_json::to_string(&seq)?);
    Ok(())
}

fn cmd_session_init(
    participant: &str,
    base: &Path,
    trials: Option<usize>,
    levels: Option<&str>,
    design: Option<&Path>,
    seed: Option<u64>,
) -> Result<()> {
    let mut design = match design {
        Some(path) => read_design(path)?,
        None => SessionDesign::default(),
    };
    if let Some(trials) = trials {
        ensure!(trials > 0, "a session needs at least one trial");
        design.trials = trials;
    }
    if let Some(levels) = levels {
        design.levels = parse_level_sequence(levels)?;
    }
    let mut rng = rng_from(seed);
    let plan = plan_session(participant, &design, &mut rng)?;
    let started = chrono::Local::now().naive_local();
    let layout = create_session(base, participant, design.trials, started)?;
    write_plan(&layout.root.join("plan.json"), &plan)?;
    println!("{}", serde_json::to_string(&layout)?);
    Ok(())
}

fn cmd_simulate(
    out: &Path,
    samples: usize,
    participant: &str,
    run: &str,
    seed: Option<u64>,
) -> Result<()> {
    let mut rng = rng_from(seed);
    let sink = CsvSink::append(out)?;
    let mut session = RecordingSession::open(participant, run, sink);
    for sample in simulate_samples(samples, &mut rng) {
        session.record(&sample)?;
    }
    let summary = session.close()?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_plot(input: &Path, column: &str, multiplier: f64, out: &Path) -> Result<()> {
    let table = EyeTable::read(input)?;
    let channel = table
        .channel(column)
        .ok_or_else(|| anyhow!("column '{}' not found in {}", column, input.display()))?;
    let raw = table.series(&channel);
    let cleaned = clean_series_with_config(&raw, &ArtifactConfig { multiplier });
    info!(
        "{}: {} of {} samples flagged",
        column,
        cleaned.report.flagged.len(),
        cleaned.report.samples
    );
    let fig = figure_from_cleaning(column, &raw, &cleaned.series, 4096);
    draw_plotters_figure(out, &fig).with_context(|| format!("rendering {}", out.display()))?;
    Ok(())
}

fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let (x_min, x_max, y_min, y_max) = fig
        .bounds()
        .ok_or_else(|| anyhow!("nothing to plot: channel has no valid samples"))?;
    let (x_min, x_max) = padded(x_min, x_max);
    let (y_min, y_max) = padded(y_min, y_max);
    let backend = BitMapBackend::new(path, (1000, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.style.color.rgb();
                let style = RGBColor(r, g, b).stroke_width(line.style.width.round().max(1.0) as u32);
                chart
                    .draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        style,
                    ))?
                    .label(line.name.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
            }
        }
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
