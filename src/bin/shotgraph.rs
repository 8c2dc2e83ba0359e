use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "shotgraph", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a sequence (or one item on it) to a compositor script.
    Export(ExportArgs),
    /// Validate a sequence JSON file.
    Validate(ValidateArgs),
    /// Print a summary of a sequence JSON file.
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input sequence JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Export preset JSON; defaults are used when omitted.
    #[arg(long)]
    preset: Option<PathBuf>,

    /// Guid of the item to export; the whole sequence when omitted.
    #[arg(long)]
    item: Option<String>,

    /// Output script path template (resolver tokens allowed).
    #[arg(long)]
    out: String,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input sequence JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Input sequence JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
        Command::Validate(args) => cmd_validate(args),
        Command::Info(args) => cmd_info(args),
    }
}

fn read_sequence_json(path: &Path) -> anyhow::Result<shotgraph::Sequence> {
    let f = File::open(path).with_context(|| format!("open sequence '{}'", path.display()))?;
    let r = BufReader::new(f);
    let sequence: shotgraph::Sequence =
        serde_json::from_reader(r).with_context(|| "parse sequence JSON")?;
    Ok(sequence)
}

fn read_preset_json(path: &Path) -> anyhow::Result<shotgraph::ExportPreset> {
    let f = File::open(path).with_context(|| format!("open preset '{}'", path.display()))?;
    let r = BufReader::new(f);
    let preset: shotgraph::ExportPreset =
        serde_json::from_reader(r).with_context(|| "parse preset JSON")?;
    Ok(preset)
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let sequence = read_sequence_json(&args.in_path)?;
    sequence.validate()?;

    let preset = match &args.preset {
        Some(path) => read_preset_json(path)?,
        None => shotgraph::ExportPreset::init_default_properties("cli", "cli export"),
    };

    let target = match &args.item {
        Some(guid) => shotgraph::ExportTarget::Item {
            sequence: &sequence,
            item_guid: guid,
        },
        None => shotgraph::ExportTarget::Sequence(&sequence),
    };

    let token = shotgraph::MainThreadToken::acquire();
    let progress = shotgraph::NullProgress;
    let task = shotgraph::ExportTask::new(target, &preset, &args.out, &token, &progress)?;
    let outcome = task.run()?;

    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    for error in &outcome.errors {
        eprintln!("error: {error}");
    }
    if outcome.skipped {
        eprintln!("skipped: media offline");
        return Ok(());
    }
    if let Some(path) = &outcome.script_path {
        eprintln!(
            "wrote {} ({}..{})",
            path.display(),
            outcome.first_frame,
            outcome.last_frame
        );
    }
    Ok(())
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let sequence = read_sequence_json(&args.in_path)?;
    sequence.validate()?;
    eprintln!("ok: sequence '{}' is valid", sequence.name);
    Ok(())
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let sequence = read_sequence_json(&args.in_path)?;
    println!("sequence: {}", sequence.name);
    println!(
        "format:   {}x{} '{}'",
        sequence.format.width, sequence.format.height, sequence.format.name
    );
    println!("fps:      {}", sequence.framerate.script_value());
    println!("duration: {} frames", sequence.duration());
    println!("views:    {}", sequence.view_names().join(", "));
    for track in &sequence.tracks {
        println!(
            "track '{}': {} items, {} subtracks, {} transitions",
            track.name,
            track.items.len(),
            track.subtracks.len(),
            track.transitions.len()
        );
        for item in &track.items {
            println!(
                "  item '{}' [{}] timeline {}..{} source {}..{} speed {}",
                item.name,
                item.guid,
                item.timeline_in,
                item.timeline_out,
                item.source_in,
                item.source_out,
                item.playback_speed
            );
        }
    }
    Ok(())
}
