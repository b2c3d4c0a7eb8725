//! Syllabus CLI
//!
//! Inspects and edits the module/lesson hierarchy of a course on a remote
//! course backend.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use syllabus_client::{
    Config, EditSession, EventBroadcaster, HttpStore, NormalizedResponse, RemoteStore, SyncEvent,
};
use syllabus_tree::{
    validate_module, Course, EntityId, Lesson, ModuleDeep, ModuleDeepPayload, PositionDiff,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Syllabus - course hierarchy editor
///
/// Reorders, saves and deletes the modules and lessons of a course through
/// the course API, syncing only the positions that changed.
#[derive(Parser, Debug)]
#[command(name = "syllabus")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: syllabus.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the API base URL from the configuration
    #[arg(long, value_name = "URL", global = true)]
    base_url: Option<String>,

    /// Print results as JSON (`{success, data}` / `{success, message}`)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the module and lesson outline of a course
    Outline {
        /// Course id
        course: Uuid,
    },
    /// Move a module to a new position and sync the module order
    MoveModule {
        /// Course id
        course: Uuid,
        /// Module id
        module: EntityId,
        /// New 1-based position
        position: u32,
    },
    /// Move a lesson to a new position within its module and sync the lesson order
    MoveLesson {
        /// Course id
        course: Uuid,
        /// Lesson id
        lesson: EntityId,
        /// New 1-based position
        position: u32,
    },
    /// Create or update a module with its whole subtree from a JSON file
    Push {
        /// Course id
        course: Uuid,
        /// JSON file holding the module subtree
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Delete a module and close the gap it leaves
    DeleteModule {
        /// Course id
        course: Uuid,
        /// Module id
        module: EntityId,
    },
    /// Delete a lesson and close the gap it leaves
    DeleteLesson {
        /// Course id
        course: Uuid,
        /// Lesson id
        lesson: EntityId,
    },
    /// Print a lesson with its contents, quiz and assignment
    Lesson {
        /// Course id
        course: Uuid,
        /// Lesson id
        lesson: EntityId,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (warn)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, base_url = ?args.base_url, "Starting");

    let json = args.json;
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                let failed: NormalizedResponse<()> = NormalizedResponse {
                    success: false,
                    data: None,
                    message: Some(format!("{e:#}")),
                };
                println!("{}", serde_json::to_string_pretty(&failed).unwrap_or_default());
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(base_url) = args.base_url {
        config.api_base_url = base_url;
    }
    config.validate()?;

    let store = Arc::new(HttpStore::from_config(&config)?);
    let events = EventBroadcaster::new(config.event_capacity);
    let output = Output { json: args.json };

    match args.command {
        Command::Outline { course } => {
            let session = EditSession::load(store, course, events).await?;
            let tree = session.tree().await;
            output.emit(tree.course(), || print_outline(tree.course()))
        }
        Command::MoveModule {
            course,
            module,
            position,
        } => {
            let session = EditSession::load(store, course, events).await?;
            let progress = session.subscribe();
            session.move_module(&module, position).await?;
            let diff = session.sync_module_order().await;
            report_events(progress);
            let diff = diff?;
            output.emit(&diff, || print_diff(&diff))
        }
        Command::MoveLesson {
            course,
            lesson,
            position,
        } => {
            let session = EditSession::load(store, course, events).await?;
            let progress = session.subscribe();
            let module = session.tree().await.module_of(&lesson)?;
            session.move_lesson(&lesson, position).await?;
            let diff = session.sync_lesson_order(&module).await;
            report_events(progress);
            let diff = diff?;
            output.emit(&diff, || print_diff(&diff))
        }
        Command::Push { course, file } => {
            let payload = read_payload(&file, course)?;
            validate_module(&payload)?;
            let saved = store.create_or_update_module_deep(course, &payload).await?;
            output.emit(&saved, || print_saved(&saved))
        }
        Command::DeleteModule { course, module } => {
            let session = EditSession::load(store, course, events).await?;
            let diff = session.delete_module(&module).await?;
            output.emit(&diff, || {
                println!("Deleted module {module}");
                print_diff(&diff);
            })
        }
        Command::DeleteLesson { course, lesson } => {
            let session = EditSession::load(store, course, events).await?;
            let diff = session.delete_lesson(&lesson).await?;
            output.emit(&diff, || {
                println!("Deleted lesson {lesson}");
                print_diff(&diff);
            })
        }
        Command::Lesson { course, lesson } => {
            let session = EditSession::load(store, course, events).await?;
            session.load_lesson_detail(&lesson).await?;
            let tree = session.tree().await;
            let detail = tree.lesson(&lesson)?;
            output.emit(detail, || print_lesson(detail))
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(Config::load_from_file(path)?)
        }
        None => Ok(Config::load()?),
    }
}

/// Reads a module subtree, filling in the course id from the command line.
fn read_payload(path: &Path, course: Uuid) -> anyhow::Result<ModuleDeepPayload> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read module file '{}'", path.display()))?;
    let mut value: Value = serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in module file '{}'", path.display()))?;
    let Some(object) = value.as_object_mut() else {
        anyhow::bail!(
            "Module file '{}' must hold a JSON object\n\nSuggestion: Wrap the module fields in {{ ... }}",
            path.display()
        );
    };
    object.insert(
        "course_id".to_string(),
        Value::String(course.to_string()),
    );
    serde_json::from_value(value)
        .with_context(|| format!("Module file '{}' is not a module subtree", path.display()))
}

/// Logs the sync events a command produced.
fn report_events(mut progress: broadcast::Receiver<SyncEvent>) {
    while let Ok(event) = progress.try_recv() {
        match &event {
            SyncEvent::SyncFailed(payload) => tracing::warn!(
                container = %payload.container,
                rolled_back = payload.rolled_back,
                "{}",
                payload.message
            ),
            other => tracing::debug!(event = other.event_name(), container = %other.container(), "Sync event"),
        }
    }
}

/// Chooses between JSON and human-readable output.
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize + Clone>(&self, data: &T, human: impl FnOnce()) -> anyhow::Result<()> {
        if self.json {
            let response: NormalizedResponse<T> = Ok(data.clone()).into();
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else {
            human();
        }
        Ok(())
    }
}

fn print_outline(course: &Course) {
    println!("{} ({})", course.title, course.id);
    if course.modules.is_empty() {
        println!("  (no modules)");
    }
    for module in &course.modules {
        println!("  {}. {} ({})", module.position, module.title, module.id);
        for lesson in &module.lessons {
            let mut flags = Vec::new();
            if lesson.is_free {
                flags.push("free");
            }
            if !lesson.published {
                flags.push("draft");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            println!(
                "     {}. {} ({}) {}{flags}",
                lesson.position, lesson.title, lesson.id, lesson.duration
            );
        }
    }
}

fn print_diff(diff: &PositionDiff) {
    if diff.is_empty() {
        println!("Order of {} already in sync", diff.container);
        return;
    }
    println!("Synced {} position(s) in {}:", diff.items.len(), diff.container);
    for item in &diff.items {
        println!("  {} -> {}", item.id, item.position);
    }
}

fn print_saved(saved: &ModuleDeep) {
    println!(
        "Saved module {} ({}) at position {}",
        saved.module.title, saved.module.id, saved.module.position
    );
    for lesson in &saved.lessons {
        println!(
            "  {}. {} ({})",
            lesson.lesson.position, lesson.lesson.title, lesson.lesson.id
        );
    }
}

fn print_lesson(lesson: &Lesson) {
    println!("{} ({})", lesson.title, lesson.id);
    println!("  Duration: {}", lesson.duration);
    if let Some(url) = &lesson.video_url {
        println!("  Video: {url}");
    }
    println!("  Contents: {}", lesson.contents.len());
    for content in &lesson.contents {
        println!(
            "    {}. {} [{}] {}",
            content.position,
            content.title,
            content.content_type.as_str(),
            content.url
        );
    }
    println!("  Questions: {}", lesson.questions.len());
    for question in &lesson.questions {
        println!("    {}. {}", question.position, question.text);
        for option in &question.options {
            let mark = if option.is_correct { "*" } else { " " };
            println!("       {mark} {}", option.text);
        }
    }
    match &lesson.assignment {
        Some(assignment) => println!("  Assignment: {}", assignment.title),
        None => println!("  Assignment: none"),
    }
}
