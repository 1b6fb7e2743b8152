use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use sidecar_store::{FieldChange, MetadataRepository, ScanConfig};

/// One-shot inspector and editor for sidecar metadata collections.
///
/// Each invocation opens the directory as a fresh session, so entities are
/// addressed by image filename; ids minted for images without a sidecar are
/// not stable across runs.
#[derive(Parser, Debug)]
#[command(author, version, about = "Sidecar metadata store for image collections")]
struct Args {
    /// Directory containing the image collection
    #[arg(long, short = 'd', default_value = ".")]
    dir: PathBuf,

    /// Comma-separated image extensions (overrides SIDECAR_STORE_EXTENSIONS)
    #[arg(long)]
    extensions: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List images and their metadata state
    List {
        /// Emit the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the metadata of one image
    Show { filename: String },
    /// Edit fields of one image's metadata and write the sidecar
    Set {
        filename: String,
        /// Set the author (empty string removes it)
        #[arg(long)]
        author: Option<String>,
        /// Set the universe (empty string removes it)
        #[arg(long)]
        universe: Option<String>,
        /// Replace the character list (repeatable)
        #[arg(long = "character")]
        characters: Vec<String>,
        /// Replace the tag list (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Reset one image's metadata and delete its sidecar file
    Clear { filename: String },
    /// Drop one image's metadata record and sidecar (the image is untouched)
    Delete { filename: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.extensions {
        Some(spec) => ScanConfig::from_list(spec),
        None => ScanConfig::from_env(),
    };

    let mut repo = MetadataRepository::open_with(&args.dir, &config).await?;

    match args.command {
        Command::List { json } => list(&repo, json),
        Command::Show { filename } => {
            let id = resolve(&repo, &filename)?;
            show(&repo, id)?;
        }
        Command::Set {
            filename,
            author,
            universe,
            characters,
            tags,
        } => {
            let id = resolve(&repo, &filename)?;
            let mut changes = Vec::new();
            if let Some(author) = author {
                changes.push(FieldChange::Author(none_if_empty(author)));
            }
            if let Some(universe) = universe {
                changes.push(FieldChange::Universe(none_if_empty(universe)));
            }
            if !characters.is_empty() {
                changes.push(FieldChange::Characters(characters));
            }
            if !tags.is_empty() {
                changes.push(FieldChange::Tags(tags));
            }
            if changes.is_empty() {
                bail!("nothing to change; pass at least one of --author/--universe/--character/--tag");
            }
            repo.update(id, changes)?;
            repo.commit(id).await?;
            show(&repo, id)?;
        }
        Command::Clear { filename } => {
            let id = resolve(&repo, &filename)?;
            repo.clear(id)?;
            repo.commit(id).await?;
            println!("cleared metadata for {filename}");
        }
        Command::Delete { filename } => {
            let id = resolve(&repo, &filename)?;
            repo.delete(id).await?;
            println!("deleted metadata for {filename}");
        }
    }

    Ok(())
}

/// Find the entity id for an image filename in the open session.
fn resolve(repo: &MetadataRepository, filename: &str) -> Result<Uuid> {
    repo.list()
        .iter()
        .find(|rec| rec.entity.filename == filename)
        .map(|rec| rec.entity.id)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no image named `{}` in {}",
                filename,
                repo.directory().display()
            )
        })
}

fn list(repo: &MetadataRepository, as_json: bool) {
    if as_json {
        let records: Vec<_> = repo
            .list()
            .iter()
            .map(|rec| {
                json!({
                    "entity": &rec.entity,
                    "on_disk": rec.on_disk,
                    "corrupt": rec.corrupt.as_ref().map(|err| err.to_string()),
                })
            })
            .collect();
        let listing = json!({
            "directory": repo.directory().to_string_lossy(),
            "records": records,
            "orphans": repo
                .orphans()
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&listing).unwrap_or_default());
        return;
    }

    for rec in repo.list() {
        let state = match (&rec.corrupt, rec.on_disk) {
            (Some(err), _) => format!("corrupt: {err}"),
            (None, true) => "tagged".to_string(),
            (None, false) => "untagged".to_string(),
        };
        println!("{}\t{}\t{}", rec.entity.filename, rec.entity.id, state);
    }
    for orphan in repo.orphans() {
        println!("{}\t-\torphan sidecar", orphan.display());
    }
}

fn show(repo: &MetadataRepository, id: Uuid) -> Result<()> {
    let rec = repo.get(id)?;
    println!("filename: {}", rec.entity.filename);
    println!("id:       {}", rec.entity.id);
    println!("author:   {}", rec.entity.author.as_deref().unwrap_or("-"));
    println!("universe: {}", rec.entity.universe.as_deref().unwrap_or("-"));
    println!("characters: {}", join_or_dash(&rec.entity.characters));
    println!("tags:       {}", join_or_dash(&rec.entity.tags));
    if let Some(err) = &rec.corrupt {
        println!("corrupt:  {err}");
    }
    Ok(())
}

fn join_or_dash(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}

fn none_if_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
