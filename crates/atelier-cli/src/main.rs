use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use atelier_contracts::chat::{parse_intent, Intent, STUDIO_HELP_COMMANDS};
use atelier_contracts::events::EventWriter;
use atelier_contracts::{GeneratedImage, ImageId, ImagePayload, ImageStatus, MimeType};
use atelier_engine::{
    AtelierConfig, DryrunImageService, FileExporter, GallerySnapshot, GalleryStore,
    GeminiImageService, ImageService, ImageSummary,
};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "atelier-rs",
    version,
    about = "Generate, edit, upscale and download AI images"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive gallery session.
    Studio(StudioArgs),
    Generate(GenerateArgs),
    Edit(EditArgs),
    Upscale(UpscaleArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// Directory for downloads and the default event log.
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Use the local stub backend (demos and tests) instead of Gemini.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Args)]
struct StudioArgs {
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Args)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    instruction: String,
    /// Prompt recorded for the source image. Defaults to its file name.
    #[arg(long)]
    prompt: Option<String>,
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Args)]
struct UpscaleArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: Option<String>,
    #[command(flatten)]
    session: SessionArgs,
}

struct Session {
    store: GalleryStore,
    service: Box<dyn ImageService>,
    exporter: FileExporter,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("atelier-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Studio(args) => {
            run_studio(args)?;
            Ok(0)
        }
        Command::Generate(args) => run_generate(args),
        Command::Edit(args) => run_edit(args),
        Command::Upscale(args) => run_upscale(args),
    }
}

fn open_session(args: &SessionArgs) -> Result<Session> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let service: Box<dyn ImageService> = if args.dryrun {
        Box::new(DryrunImageService::default())
    } else {
        let config = AtelierConfig::from_env()?;
        Box::new(GeminiImageService::new(&config)?)
    };
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let events = EventWriter::new(events_path, session_id_for(&args.out));
    Ok(Session {
        store: GalleryStore::new(events),
        service,
        exporter: FileExporter::new(&args.out),
    })
}

fn session_id_for(out: &Path) -> String {
    out.file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("session-rs")
        .to_string()
}

fn run_studio(args: StudioArgs) -> Result<()> {
    let mut session = open_session(&args.session)?;
    println!(
        "Atelier studio started ({} backend). Type a prompt to generate, /help for commands.",
        session.service.name()
    );
    println!("Downloads are saved to {}", session.exporter.dir().display());
    let stdin = io::stdin();
    studio_loop(&mut session, stdin.lock())
}

fn studio_loop(session: &mut Session, mut input: impl BufRead) -> Result<()> {
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if !handle_intent(session, &intent)? {
            break;
        }
    }
    Ok(())
}

/// Returns `false` when the session should end.
fn handle_intent(session: &mut Session, intent: &Intent) -> Result<bool> {
    let Session {
        store,
        service,
        exporter,
    } = session;
    let service: &dyn ImageService = service.as_ref();
    match intent.action.as_str() {
        "noop" => {}
        "quit" => return Ok(false),
        "help" => {
            println!("Commands: {}", STUDIO_HELP_COMMANDS.join(" "));
            println!("Any other text generates a new image from that prompt.");
        }
        "list" => print_gallery(&store.snapshot()),
        "generate" => {
            let prompt = intent.prompt.clone().unwrap_or_default();
            println!("Generating...");
            let created = store.request_generate(service, &prompt);
            report_outcome(store, created.as_ref(), "Created");
        }
        "select_for_edit" => {
            let Some(image) = resolve_target(store.images(), intent.arg("target")).cloned()
            else {
                print_missing_target("/select", intent.arg("target"));
                return Ok(true);
            };
            store.select_for_edit(&image);
            println!("Editing {}. Type /edit <instruction> or /cancel.", image.id);
        }
        "clear_edit_target" => {
            if store.edit_target().is_some() {
                store.clear_edit_target();
                println!("Edit cancelled.");
            } else {
                println!("No image selected for editing.");
            }
        }
        "edit" => {
            let Some(target) = store.edit_target().cloned() else {
                println!("/edit requires a selected image (use /select <n|id>)");
                return Ok(true);
            };
            println!("Editing...");
            let replaced = store.request_edit(service, &target, intent.arg("instruction"));
            report_outcome(store, replaced.as_ref(), "Edited");
        }
        "upscale" => {
            let Some(image) = resolve_target(store.images(), intent.arg("target")).cloned()
            else {
                print_missing_target("/upscale", intent.arg("target"));
                return Ok(true);
            };
            println!("Upscaling {}...", image.id);
            let replaced = store.request_upscale(service, &image);
            report_outcome(store, replaced.as_ref(), "Upscaled");
        }
        "download" => {
            let Some(image) = resolve_target(store.images(), intent.arg("target")) else {
                print_missing_target("/download", intent.arg("target"));
                return Ok(true);
            };
            match store.download(image, &*exporter) {
                Some(path) => println!("Saved {}", path.display()),
                None => println!("Download failed (details in the event log)."),
            }
        }
        "open" => {
            let path = intent.arg("path");
            if path.is_empty() {
                println!("/open requires a path");
                return Ok(true);
            }
            match load_image_file(Path::new(path)) {
                Ok(payload) => {
                    let id = store.adopt(payload, file_label(Path::new(path)));
                    println!("Opened {path} as {id}");
                }
                Err(err) => println!("Open failed: {err:#}"),
            }
        }
        "unknown" => {
            println!(
                "Unknown command: /{}. Type /help for commands.",
                intent.arg("command")
            );
        }
        other => println!("Unhandled action: {other}"),
    }
    Ok(true)
}

fn report_outcome(store: &GalleryStore, outcome: Option<&ImageId>, verb: &str) {
    if let Some(error) = store.last_error() {
        println!("Error: {error}");
        return;
    }
    let Some(id) = outcome else {
        println!("The source image is no longer in the gallery; result discarded.");
        return;
    };
    let snapshot = store.snapshot();
    if let Some((idx, summary)) = snapshot
        .images
        .iter()
        .enumerate()
        .find(|(_, summary)| &summary.id == id)
    {
        println!("{verb}: {}", format_gallery_row(idx, summary, &snapshot));
    }
}

fn print_missing_target(command: &str, target: &str) {
    if target.is_empty() {
        println!("{command} requires an image number or id (see /list)");
    } else {
        println!("No image matches {target:?} (see /list)");
    }
}

fn print_gallery(snapshot: &GallerySnapshot) {
    if snapshot.images.is_empty() {
        println!("Gallery is empty. Type a prompt to generate an image.");
        return;
    }
    for (idx, summary) in snapshot.images.iter().enumerate() {
        println!("{}", format_gallery_row(idx, summary, snapshot));
    }
    if let Some(error) = snapshot.last_error.as_deref() {
        println!("Last error: {error}");
    }
}

fn format_gallery_row(idx: usize, summary: &ImageSummary, snapshot: &GallerySnapshot) -> String {
    let mut flags = Vec::new();
    if snapshot.edit_target.as_ref() == Some(&summary.id) {
        flags.push("selected");
    }
    match summary.status {
        ImageStatus::Editing => flags.push("editing"),
        ImageStatus::Upscaling => flags.push("upscaling"),
        ImageStatus::Idle => {}
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    format!(
        "{:>3}. {}{flags}  {}  ({}, {} bytes)",
        idx + 1,
        summary.id,
        summary.prompt,
        summary.mime_type,
        summary.bytes
    )
}

/// 1-based gallery position or exact image id.
fn resolve_target<'a>(images: &'a [GeneratedImage], target: &str) -> Option<&'a GeneratedImage> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    if let Ok(position) = target.parse::<usize>() {
        return position.checked_sub(1).and_then(|idx| images.get(idx));
    }
    images.iter().find(|image| image.id.as_str() == target)
}

fn load_image_file(path: &Path) -> Result<ImagePayload> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or_default();
    let Some(mime_type) = MimeType::from_extension(ext) else {
        bail!("unsupported image type: {}", path.display());
    };
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("image file is empty: {}", path.display());
    }
    Ok(ImagePayload::new(mime_type, bytes))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|value| value.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut session = open_session(&args.session)?;
    let created = session
        .store
        .request_generate(session.service.as_ref(), &args.prompt);
    finish_one_shot(&session, created)
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let mut session = open_session(&args.session)?;
    let source = adopt_source(&mut session, &args.image, args.prompt)?;
    let replaced =
        session
            .store
            .request_edit(session.service.as_ref(), &source, &args.instruction);
    finish_one_shot(&session, replaced)
}

fn run_upscale(args: UpscaleArgs) -> Result<i32> {
    let mut session = open_session(&args.session)?;
    let source = adopt_source(&mut session, &args.image, args.prompt)?;
    let replaced = session
        .store
        .request_upscale(session.service.as_ref(), &source);
    finish_one_shot(&session, replaced)
}

fn adopt_source(
    session: &mut Session,
    path: &Path,
    prompt: Option<String>,
) -> Result<GeneratedImage> {
    let payload = load_image_file(path)?;
    let prompt = prompt
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| file_label(path));
    let id = session.store.adopt(payload, prompt);
    session
        .store
        .get(&id)
        .cloned()
        .with_context(|| format!("opened image {id} missing from gallery"))
}

fn finish_one_shot(session: &Session, outcome: Option<ImageId>) -> Result<i32> {
    let image = outcome.and_then(|id| session.store.get(&id).cloned());
    let Some(image) = image else {
        let message = session
            .store
            .last_error()
            .unwrap_or("No image was produced.");
        eprintln!("{message}");
        return Ok(1);
    };
    match session.store.download(&image, &session.exporter) {
        Some(path) => {
            println!("{}", path.display());
            Ok(0)
        }
        None => {
            eprintln!(
                "Download failed; see {}",
                session.store.event_writer().path().display()
            );
            Ok(1)
        }
    }
}
