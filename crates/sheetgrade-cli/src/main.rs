//! sheetgrade CLI — grade captured sheets, generate printable sheets, and
//! manage the answer key and score records.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use sheetgrade::{
    render_sheet, GradeStore, Grader, IdentitySource, ItemTag, RenderConfig, SheetLayout,
    TransformModel,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "sheetgrade")]
#[command(about = "Grade bubble answer sheets from photos (fiducial registration + fill scoring)")]
#[command(version)]
struct Cli {
    /// Path to the grades database.
    #[arg(long, default_value = "sheetgrade.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a captured sheet image against the locked answer key.
    Grade(GradeArgs),

    /// Render a printable sheet raster (PNG) for a sheet code.
    Generate(GenerateArgs),

    /// Print the canonical layout geometry.
    LayoutInfo(LayoutSelect),

    /// Manage the answer key lifecycle.
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// List recorded scores, newest first.
    Records,
}

#[derive(Debug, Clone, Args)]
struct LayoutSelect {
    /// Number of items on the sheet.
    #[arg(long, default_value = "20")]
    items: usize,

    /// Choices per item.
    #[arg(long, default_value = "4")]
    choices: usize,

    /// Layout JSON file; overrides --items/--choices.
    #[arg(long)]
    layout: Option<PathBuf>,
}

impl LayoutSelect {
    fn to_layout(&self) -> CliResult<SheetLayout> {
        match &self.layout {
            Some(path) => SheetLayout::from_json_file(path),
            None => SheetLayout::with_items(self.items, self.choices).map_err(Into::into),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct GradeArgs {
    /// Path to the captured image (JPEG/PNG).
    #[arg(long)]
    image: PathBuf,

    #[command(flatten)]
    layout: LayoutSelect,

    /// Manual student identifier, used when the code strip is unreadable.
    #[arg(long)]
    student_id: Option<String>,

    /// Append the score to the database after grading.
    #[arg(long)]
    save: bool,

    /// Write the full per-item report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Minimum fill fraction for a mark to count.
    #[arg(long)]
    fill_threshold: Option<f32>,

    /// Minimum lead of the best fill over the runner-up.
    #[arg(long)]
    separation_threshold: Option<f32>,

    /// Maximum fiducial reprojection residual in pixels.
    #[arg(long)]
    max_residual_px: Option<f64>,

    /// Transform model fitted from the fiducials.
    #[arg(long, value_enum, default_value_t = TransformModelArg::Affine)]
    model: TransformModelArg,

    /// Skip code strip decoding (manual identification only).
    #[arg(long)]
    no_code_strip: bool,
}

#[derive(Debug, Clone, Args)]
struct GenerateArgs {
    /// Sheet code to embed in the identifier strip.
    #[arg(long)]
    code: u16,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    layout: LayoutSelect,

    /// Raster scale in pixels per point.
    #[arg(long, default_value = "2.0")]
    scale: f64,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Set one item's answer (before locking).
    Set {
        /// 1-based item number.
        #[arg(long)]
        item: usize,
        /// Choice letter.
        #[arg(long)]
        answer: char,
    },

    /// Freeze the key for grading.
    Lock,

    /// Clear the key and unlock it.
    Reset,

    /// Print the key and its lock state.
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransformModelArg {
    Affine,
    Perspective,
}

impl TransformModelArg {
    fn to_core(self) -> TransformModel {
        match self {
            Self::Affine => TransformModel::Affine,
            Self::Perspective => TransformModel::Perspective,
        }
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grade(args) => run_grade(&cli.db, &args),
        Commands::Generate(args) => run_generate(&args),
        Commands::LayoutInfo(select) => run_layout_info(&select),
        Commands::Key { command } => run_key(&cli.db, &command),
        Commands::Records => run_records(&cli.db),
    }
}

// ── grade ──────────────────────────────────────────────────────────────

fn run_grade(db: &Path, args: &GradeArgs) -> CliResult<()> {
    let layout = args.layout.to_layout()?;
    let mut store = GradeStore::open(db)?;
    let key = store.current_locked_key()?.ok_or_else(|| -> CliError {
        "no locked answer key; set items and run `sheetgrade key lock` first".into()
    })?;

    let mut grader = Grader::new(layout);
    let config = grader.config_mut();
    config.registration.model = args.model.to_core();
    config.registration.decode_identity = !args.no_code_strip;
    if let Some(v) = args.fill_threshold {
        config.decision.fill_threshold = v;
    }
    if let Some(v) = args.separation_threshold {
        config.decision.separation_threshold = v;
    }
    if let Some(v) = args.max_residual_px {
        config.registration.max_residual_px = v;
    }

    tracing::info!("Loading capture: {}", args.image.display());
    let bytes = std::fs::read(&args.image)?;
    let outcome = grader.grade(&bytes, &key, args.student_id.as_deref())?;

    let source = match outcome.identity_source {
        IdentitySource::Code => "code strip",
        IdentitySource::Manual => "manual",
    };
    println!(
        "student {} (via {}): {}/{}",
        outcome.student_id, source, outcome.draft.correct, outcome.draft.total
    );
    println!(
        "registration: {} markers, max residual {:.2} px",
        outcome.registration.markers_found, outcome.registration.max_residual_px
    );
    for item in &outcome.draft.items {
        let flag = match item.tag {
            ItemTag::Correct => "ok",
            ItemTag::Incorrect => "WRONG",
            ItemTag::Blank => "blank",
            ItemTag::Ambiguous => "AMBIGUOUS",
        };
        println!(
            "  {:>2}. key {}  read {:<9}  {}",
            item.item, item.expected, item.decision.to_string(), flag
        );
    }

    if let Some(path) = &args.report {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &outcome)?;
        println!("report written to {}", path.display());
    }

    if args.save {
        let record =
            store.append_record(&outcome.student_id, outcome.draft.correct, outcome.draft.total)?;
        println!(
            "saved: {} {}/{} at {}",
            record.student_id, record.correct, record.total, record.recorded_at
        );
    } else {
        println!("(dry run — pass --save to append the score record)");
    }

    Ok(())
}

// ── generate ───────────────────────────────────────────────────────────

fn run_generate(args: &GenerateArgs) -> CliResult<()> {
    let layout = args.layout.to_layout()?;
    let config = RenderConfig { scale: args.scale };
    let img = render_sheet(&layout, args.code, &config)?;
    img.save(&args.out)?;
    println!(
        "sheet {} ({} items x {} choices, layout v{}) written to {}",
        args.code,
        layout.n_items(),
        layout.n_choices(),
        layout.version(),
        args.out.display()
    );
    Ok(())
}

// ── layout-info ────────────────────────────────────────────────────────

fn run_layout_info(select: &LayoutSelect) -> CliResult<()> {
    let layout = select.to_layout()?;

    println!("sheetgrade layout");
    println!("  name:        {}", layout.name());
    println!("  version:     {}", layout.version());
    println!("  items:       {}", layout.n_items());
    println!(
        "  choices:     {} ({})",
        layout.n_choices(),
        layout.choice_letters().collect::<String>()
    );
    println!(
        "  page:        {}x{} pt",
        sheetgrade::layout::PAGE_SIZE_PT[0],
        sheetgrade::layout::PAGE_SIZE_PT[1]
    );
    println!("  fiducials:");
    for [x, y] in layout.fiducial_centers() {
        println!("    ({:6.1}, {:6.1}) pt, side {} pt", x, y, layout.fiducial_side());
    }
    let first = layout.choice_region(0, 0);
    println!(
        "  first bubble region: center ({:.1}, {:.1}) pt, half {:.1} pt",
        first.center[0], first.center[1], first.half
    );
    Ok(())
}

// ── key ────────────────────────────────────────────────────────────────

fn run_key(db: &Path, command: &KeyCommands) -> CliResult<()> {
    let mut store = GradeStore::open(db)?;
    match command {
        KeyCommands::Set { item, answer } => {
            store.set_key_item(*item, answer.to_ascii_uppercase())?;
            println!("item {} = {}", item, answer.to_ascii_uppercase());
        }
        KeyCommands::Lock => {
            store.lock_key()?;
            println!("answer key locked ({} items)", store.key_items()?.len());
        }
        KeyCommands::Reset => {
            store.reset_key()?;
            println!("answer key cleared and unlocked");
        }
        KeyCommands::Show => {
            let locked = store.is_key_locked()?;
            let items = store.key_items()?;
            println!(
                "answer key: {} items, {}",
                items.len(),
                if locked { "LOCKED" } else { "editable" }
            );
            for (item, answer) in items {
                println!("  {:>2}. {}", item, answer);
            }
        }
    }
    Ok(())
}

// ── records ────────────────────────────────────────────────────────────

fn run_records(db: &Path) -> CliResult<()> {
    let store = GradeStore::open(db)?;
    let records = store.list_records()?;
    if records.is_empty() {
        println!("no score records");
        return Ok(());
    }
    for r in records {
        println!(
            "{:>12}  {:>3}/{:<3}  at {}",
            r.student_id, r.correct, r.total, r.recorded_at
        );
    }
    Ok(())
}
