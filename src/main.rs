use amfibia::designer::generators::{polishing_patterns, PolishingParams};
use amfibia::milling::ImageRequest;
use amfibia::{
    build_task_list, init_logging, plan_duration, AutoConfirm, Config, CorrelationMatcher,
    EventBus, Microscope, MillingOrchestrator, Position, Project, SimulatedMicroscope,
    StageCoordinates, StateStore,
};
use amfibia_core::{format_current, format_duration};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Field width of the demo reference images.
const DEMO_FIELD_WIDTH_M: f64 = 30e-6;
/// Stage spacing between demo positions.
const DEMO_POSITION_PITCH_M: f64 = 200e-6;

#[derive(Debug, Parser)]
#[command(name = "amfibia", version, about = "FIB milling planner and run controller")]
struct Cli {
    /// Configuration file (JSON or TOML); defaults to the user config dir
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Working directory holding the state snapshot and captures
    #[arg(long, global = true)]
    working_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the pending milling tasks and the expected duration
    Plan,
    /// Mill every pending task
    Run {
        /// Use the simulated microscope
        #[arg(long)]
        simulate: bool,
    },
    /// Create a sample project with the simulated microscope
    Demo {
        /// Number of positions to create
        #[arg(long, default_value_t = 2)]
        positions: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    tracing::debug!("AmFIBia {} (built {})", amfibia::VERSION, amfibia::BUILD_DATE);

    let config = load_config(&cli)?;
    let events = Arc::new(EventBus::new());

    match cli.command {
        Command::Plan => plan(&config, events),
        Command::Run { simulate } => run(config, events, simulate).await,
        Command::Demo { positions } => demo(&config, events, positions).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let mut config = Config::load_or_default(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    if let Some(dir) = &cli.working_dir {
        config.general.working_directory = Some(dir.clone());
    }
    Ok(config)
}

/// Empty project with the configured imaging settings, plus the store of
/// the working directory.
fn new_project(config: &Config, events: Arc<EventBus>) -> anyhow::Result<(Project, StateStore)> {
    let working_dir = config.working_directory()?;
    let mut project = Project::new().with_event_bus(events.clone());
    project.set_scanning_resolution(config.imaging.resolution()?)?;
    project.set_dwell_time(config.imaging.dwell_time_s)?;
    Ok((project, StateStore::new(working_dir).with_event_bus(events)))
}

fn load_project(config: &Config, events: Arc<EventBus>) -> anyhow::Result<Project> {
    let (mut project, store) = new_project(config, events)?;
    if !store.exists() {
        bail!(
            "no saved state in {}; create one with `amfibia demo`",
            store.working_dir().display()
        );
    }
    store.load_into(&mut project)?;
    Ok(project)
}

fn plan(config: &Config, events: Arc<EventBus>) -> anyhow::Result<()> {
    let project = load_project(config, events)?;
    let tasks = build_task_list(project.positions());
    if tasks.is_empty() {
        println!("No pending milling tasks");
        return Ok(());
    }

    println!(
        "{:>4}  {:>8}  {:>5}  {:>3}  {:>10}  {:>12}  {:>12}",
        "task", "position", "group", "seq", "current", "delay", "estimate"
    );
    for (index, task) in tasks.iter().enumerate() {
        println!(
            "{:>4}  {:>8}  {:>5}  {:>3}  {:>10}  {:>12}  {:>12}",
            index + 1,
            task.position_index,
            task.group_index,
            task.sequential_group,
            format_current(task.milling_current),
            format_duration(task.delay_s as f64),
            format_duration(task.estimated_time_s)
        );
    }

    let duration = plan_duration(&tasks);
    println!();
    println!("Milling: {}", format_duration(duration.milling_s));
    println!("Delays:  {}", format_duration(duration.delay_s));
    println!("Total:   {}", format_duration(duration.total_s()));
    Ok(())
}

async fn run(config: Config, events: Arc<EventBus>, simulate: bool) -> anyhow::Result<()> {
    if !simulate {
        bail!("no microscope driver is available in this build; use --simulate");
    }
    let mut project = load_project(&config, events.clone())?;

    let microscope: Arc<dyn Microscope> = Arc::new(SimulatedMicroscope::new());
    let matcher = Arc::new(CorrelationMatcher::new(config.alignment.search_fraction));
    let orchestrator = MillingOrchestrator::new(microscope, matcher, config, events)?;

    let cancel = orchestrator.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let report = orchestrator.run(&mut project, &AutoConfirm).await?;
    println!(
        "{}: {} of {} tasks done, {} failed",
        report.message, report.done, report.tasks, report.failed
    );
    if let Some(e) = report.save_error {
        bail!("run finished but state was not saved: {}", e);
    }
    Ok(())
}

async fn demo(config: &Config, events: Arc<EventBus>, positions: usize) -> anyhow::Result<()> {
    let (mut project, store) = new_project(config, events)?;
    let microscope = SimulatedMicroscope::new();
    microscope.set_horizontal_field_width(DEMO_FIELD_WIDTH_M).await?;
    let request = ImageRequest::full_frame(project.scanning_resolution(), project.dwell_time_s());
    let params = PolishingParams::default();

    for index in 0..positions {
        let coordinates = StageCoordinates::new(
            index as f64 * DEMO_POSITION_PITCH_M,
            0.0,
            0.0,
            0.0,
            0.0,
        );
        microscope.move_stage_absolute(coordinates).await?;
        let reference = microscope.acquire_image(&request).await?;

        let position = project.add_position(Position::new(coordinates).with_reference_image(reference))?;
        let group = project.add_group(position)?;
        for pattern in polishing_patterns(&params)? {
            project.add_pattern(position, group, pattern)?;
        }
        project.set_group_current(position, group, params.current_a)?;
    }

    let path = store.save(&project)?;
    println!("Saved {} demo positions to {}", positions, path.display());
    Ok(())
}
