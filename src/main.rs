use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ui_autopilot::autopilot::{Autopilot, AutopilotConfig};
use ui_autopilot::cache::{BucketKey, JsonFileStore, SnapshotCache};
use ui_autopilot::config::{self, CacheMode};
use ui_autopilot::driver::{MockDriver, MockScreen};
use ui_autopilot::hash::{SnapshotHasher, normalized_distance};
use ui_autopilot::planner::{Planner, StepPlanner};
use ui_autopilot::session::{Session, cleanup_old_sessions, list_sessions};
use ui_autopilot::snapshot::{MockFramebuffer, Snapshot, write_manifest};
use ui_autopilot::vlm::{VlmClient, VlmConfig, check_health};

/// UI Autopilot - natural-language UI test automation
#[derive(Parser, Debug)]
#[command(
    name = "ui-autopilot",
    about = "Drive UI tests from natural-language goals with a cached, perceptually hashed action memory",
    after_help = "ENVIRONMENT VARIABLES:\n\
        UI_AUTOPILOT_VLM_ENDPOINT            VLM API endpoint URL\n\
        UI_AUTOPILOT_VLM_MODEL               VLM model name\n\
        UI_AUTOPILOT_VLM_IMAGES              Whether the model accepts images (true/false)\n\
        UI_AUTOPILOT_MAX_ATTEMPTS            Attempt budget per run\n\
        UI_AUTOPILOT_SIMILARITY_THRESHOLD    Default cache similarity threshold (0..1)\n\
        UI_AUTOPILOT_CACHE                   Cache mode: on, off, override\n\
        UI_AUTOPILOT_CACHE_FILE              Persistent cache file\n\
        UI_AUTOPILOT_ON_EXECUTION_FAILURE    fatal or retry\n\
        UI_AUTOPILOT_SESSION_DIR             Base directory for sessions\n\
        RUST_LOG                             Log filter (default: info)"
)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the perceptual fingerprint of one or more images
    Hash {
        /// Images to fingerprint
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two images under a similarity threshold
    Compare {
        a: PathBuf,
        b: PathBuf,

        /// Normalized distance at or below which images count as similar
        #[arg(short, long, env = "UI_AUTOPILOT_SIMILARITY_THRESHOLD")]
        threshold: Option<f64>,
    },

    /// Inspect or clear the persistent snapshot cache
    Cache {
        /// Cache file
        #[arg(long, env = "UI_AUTOPILOT_CACHE_FILE", default_value = config::DEFAULT_CACHE_FILE)]
        file: PathBuf,

        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Ask the model for the next step on a captured screen
    Plan {
        /// Goal in natural language
        #[arg(short, long)]
        goal: String,

        /// File holding the serialized view hierarchy
        #[arg(long)]
        hierarchy: PathBuf,

        /// Screenshot to attach
        #[arg(long)]
        image: Option<PathBuf>,

        /// VLM endpoint URL
        #[arg(long, env = "UI_AUTOPILOT_VLM_ENDPOINT", default_value = config::DEFAULT_VLM_ENDPOINT)]
        vlm_endpoint: String,

        /// VLM model name
        #[arg(long, env = "UI_AUTOPILOT_VLM_MODEL", default_value = config::DEFAULT_VLM_MODEL)]
        vlm_model: String,
    },

    /// Run the autopilot against the built-in mock app
    Run {
        /// Goal in natural language
        #[arg(short, long, default_value = "log in")]
        goal: String,

        /// Session directory for screenshots and the report (kept)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep the session directory after completion
        #[arg(long, short = 'k')]
        keep: bool,

        /// Attempt budget
        #[arg(long, env = "UI_AUTOPILOT_MAX_ATTEMPTS")]
        max_attempts: Option<usize>,

        /// Cache mode: on, off, override
        #[arg(long, env = "UI_AUTOPILOT_CACHE", value_parser = parse_cache_mode)]
        cache: Option<CacheMode>,

        /// Cache file
        #[arg(long, env = "UI_AUTOPILOT_CACHE_FILE", default_value = config::DEFAULT_CACHE_FILE)]
        cache_file: PathBuf,

        /// VLM endpoint URL
        #[arg(long, env = "UI_AUTOPILOT_VLM_ENDPOINT", default_value = config::DEFAULT_VLM_ENDPOINT)]
        vlm_endpoint: String,

        /// VLM model name
        #[arg(long, env = "UI_AUTOPILOT_VLM_MODEL", default_value = config::DEFAULT_VLM_MODEL)]
        vlm_model: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a mock framebuffer screenshot for testing
    Mock {
        /// Width in pixels
        #[arg(short = 'W', long, default_value = "800")]
        width: u32,

        /// Height in pixels
        #[arg(short = 'H', long, default_value = "600")]
        height: u32,

        /// Output file path
        #[arg(short, long, default_value = "./mock_screenshot.png")]
        output: PathBuf,

        /// Fill color as hex (e.g., "ff0000" for red)
        #[arg(short, long, default_value = "000000")]
        color: String,

        /// Draw a checkerboard with this cell size instead of a flat fill
        #[arg(long)]
        checker: Option<u32>,

        /// Labels to draw as buttons (also written to the view hierarchy)
        #[arg(short, long)]
        label: Vec<String>,
    },

    /// List kept session directories, optionally pruning old ones
    Sessions {
        /// Remove sessions older than this many hours
        #[arg(long)]
        prune_hours: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// List buckets and their entries
    List,

    /// Remove one bucket, or everything with --all
    Clear {
        /// Step text of the bucket to clear
        #[arg(long, conflicts_with = "all")]
        step: Option<String>,

        /// Position of the step within its run
        #[arg(long, default_value = "0")]
        position: usize,

        /// Clear every bucket
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose, args.log_json);

    match args.command {
        Some(Commands::Hash { images, json }) => {
            let hasher = SnapshotHasher::default();
            let mut fingerprints = serde_json::Map::new();
            for image in &images {
                let fingerprint = hasher.hash(image).await?;
                if json {
                    fingerprints.insert(image.display().to_string(), serde_json::to_value(&fingerprint)?);
                } else {
                    println!("{}", image.display());
                    for (algorithm, hash) in fingerprint.iter() {
                        println!("  {:<10} {}", algorithm, hash);
                    }
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&fingerprints)?);
            }
        }

        Some(Commands::Compare { a, b, threshold }) => {
            let hasher = SnapshotHasher::default();
            let threshold = threshold.unwrap_or(hasher.default_threshold());
            let (fa, fb) = tokio::try_join!(hasher.hash(&a), hasher.hash(&b))?;
            for (algorithm, hash) in fa.iter() {
                match fb.get(algorithm) {
                    Some(other) => println!("  {:<10} distance {:.4}", algorithm, normalized_distance(hash, other)),
                    None => println!("  {:<10} missing in {}", algorithm, b.display()),
                }
            }
            let similar = fa.is_similar_to(&fb, Some(threshold));
            println!("{} (threshold {})", if similar { "similar" } else { "different" }, threshold);
        }

        Some(Commands::Cache { file, action }) => {
            let mut cache = SnapshotCache::with_store(JsonFileStore::new(&file))?;
            match action {
                CacheCommand::List => {
                    println!("Cache: {} ({} buckets, {} entries)", file.display(), cache.bucket_count(), cache.entry_count());
                    for (key, entries) in cache.buckets() {
                        println!("  {}", key);
                        for (i, entry) in entries.iter().enumerate() {
                            let preview: String = entry.generated_code.chars().take(80).collect();
                            println!("    [{}] {}", i, preview);
                        }
                    }
                }
                CacheCommand::Clear { step, position, all } => {
                    if all {
                        let entries = cache.entry_count();
                        cache.clear_all();
                        println!("Cleared {} entries", entries);
                    } else if let Some(step) = step {
                        let removed = cache.clear(&BucketKey::for_step(&step, position));
                        println!("Cleared {} entries for '{}' at position {}", removed, step, position);
                    } else {
                        return Err("pass --step or --all".into());
                    }
                    cache.flush()?;
                }
            }
        }

        Some(Commands::Plan {
            goal,
            hierarchy,
            image,
            vlm_endpoint,
            vlm_model,
        }) => {
            ensure_vlm(&vlm_endpoint).await?;
            let view_hierarchy = tokio::fs::read_to_string(&hierarchy).await?;
            let planner = StepPlanner::new(VlmClient::new(VlmConfig::new(&vlm_endpoint).model(&vlm_model)));
            let plan = planner.plan_next(&goal, &view_hierarchy, image.as_deref(), &[]).await?;
            if let Some(description) = &plan.screen_description {
                println!("Screen:   {}", description);
            }
            println!("Thoughts: {}", plan.thoughts);
            println!("Action:   {}", plan.action);
        }

        Some(Commands::Run {
            goal,
            output,
            keep,
            max_attempts,
            cache,
            cache_file,
            vlm_endpoint,
            vlm_model,
            json,
        }) => {
            ensure_vlm(&vlm_endpoint).await?;

            let mut session = match &output {
                Some(dir) => Session::in_dir(dir),
                None => Session::for_goal(&goal).keep(keep),
            };
            session.init()?;

            let mut settings = AutopilotConfig::default();
            if let Some(attempts) = max_attempts {
                settings = settings.max_attempts(attempts);
            }
            if let Some(mode) = cache {
                settings = settings.cache_mode(mode);
            }
            let snapshot_cache = if settings.cache_mode == CacheMode::Disabled {
                SnapshotCache::new()
            } else {
                SnapshotCache::with_store(JsonFileStore::new(&cache_file))?
            };

            let planner = StepPlanner::new(VlmClient::new(VlmConfig::new(&vlm_endpoint).model(&vlm_model)));
            let mut autopilot = Autopilot::new(planner, demo_app(&session.snapshot_dir()))
                .config(settings)
                .cache(snapshot_cache.threshold(settings.similarity_threshold));

            let report = match autopilot.run(&goal).await {
                Ok(report) => report,
                Err(failure) => {
                    session.keep = true;
                    let path = session.write_report(&failure.report)?;
                    eprintln!("Partial report: {}", path.display());
                    return Err(failure.into());
                }
            };
            let path = session.write_report(&report)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Goal achieved: {}", report.goal);
                for (i, step) in report.steps.iter().enumerate() {
                    let source = if step.from_cache { " (cached)" } else { "" };
                    println!("  {}. {}{}", i + 1, step.plan.action, source);
                }
                if let Some(summary) = &report.summary {
                    println!("Summary: {}", summary);
                }
                println!("\nReport: {}", path.display());
            }
        }

        Some(Commands::Mock {
            width,
            height,
            output,
            color,
            checker,
            label,
        }) => {
            let color_bytes = parse_hex_color(&color)?;
            let mut fb = match checker {
                Some(cell) => MockFramebuffer::checkerboard(width, height, cell.max(1), color_bytes, [255, 255, 255]),
                None => MockFramebuffer::with_color(width, height, color_bytes),
            };

            let mut hierarchy = String::from("<screen>");
            for (row, text) in label.iter().enumerate() {
                let y = 10 + row as u32 * 20;
                fb.draw_rect(8, y - 4, (text.len() as u32 * 8) + 8, 16, [128, 128, 128]);
                fb.draw_text(12, y, text, [255, 255, 255], [128, 128, 128]);
                hierarchy.push_str(&format!("<button label=\"{}\"/>", text));
            }
            hierarchy.push_str("</screen>");

            fb.save_png(&output)?;
            let manifest_dir = output.parent().unwrap_or(Path::new("."));
            let manifest = write_manifest(&Snapshot::new(Some(output.clone()), hierarchy), manifest_dir, 0)?;

            println!("Created mock screenshot: {}", output.display());
            println!("  Size: {}x{}", fb.width(), fb.height());
            println!("  Manifest: {}", manifest.display());
        }

        Some(Commands::Sessions { prune_hours }) => {
            if let Some(hours) = prune_hours {
                let removed = cleanup_old_sessions(Duration::from_secs(hours * 3600))?;
                info!(removed, hours, "pruned old sessions");
            }
            let sessions = list_sessions()?;
            if sessions.is_empty() {
                println!("No sessions under {}", config::session_base_dir());
            }
            for path in sessions {
                println!("{}", path.display());
            }
        }

        None => {
            println!("UI Autopilot - natural-language UI test automation");
            println!();
            println!("Usage: ui-autopilot <COMMAND>");
            println!();
            println!("Commands:");
            println!("  hash     Print the perceptual fingerprint of images");
            println!("  compare  Compare two images under a similarity threshold");
            println!("  cache    Inspect or clear the persistent snapshot cache");
            println!("  plan     Ask the model for the next step on a captured screen");
            println!("  run      Run the autopilot against the built-in mock app");
            println!("  mock     Render a mock framebuffer screenshot");
            println!("  sessions List or prune kept session directories");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

async fn ensure_vlm(endpoint: &str) -> Result<(), Box<dyn Error>> {
    let target = endpoint.to_string();
    let healthy = tokio::task::spawn_blocking(move || check_health(&target, 5)).await?;
    match healthy {
        Ok(true) => {
            info!(endpoint, "VLM endpoint responding");
            Ok(())
        }
        Ok(false) | Err(_) => {
            warn!(endpoint, "VLM endpoint not responding");
            Err(format!("VLM endpoint not responding at {}", endpoint).into())
        }
    }
}

/// Three-screen login flow
fn demo_app(capture_dir: &Path) -> MockDriver {
    MockDriver::new("home", MockScreen::labelled([24, 40, 96], &["Login", "Help"]), Some(capture_dir))
        .screen("login", MockScreen::labelled([24, 96, 40], &["Email", "Password", "Submit"]))
        .screen("welcome", MockScreen::labelled([96, 40, 24], &["Logout"]))
        .screen("help", MockScreen::labelled([64, 64, 64], &["Back"]))
        .on_tap("home", "Login", "login")
        .on_tap("home", "Help", "help")
        .on_tap("help", "Back", "home")
        .on_tap("login", "Submit", "welcome")
        .on_tap("welcome", "Logout", "home")
}

fn parse_cache_mode(value: &str) -> Result<CacheMode, String> {
    CacheMode::parse(value).ok_or_else(|| format!("unknown cache mode '{}': use on, off or override", value))
}

fn parse_hex_color(hex: &str) -> Result<[u8; 3], Box<dyn Error>> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return Err("Color must be 6 hex digits (e.g., 'ff0000')".into());
    }
    let r = u8::from_str_radix(&hex[0..2], 16)?;
    let g = u8::from_str_radix(&hex[2..4], 16)?;
    let b = u8::from_str_radix(&hex[4..6], 16)?;
    Ok([r, g, b])
}
