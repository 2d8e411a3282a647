//! Autosort CLI
//!
//! Sorts a bookmark tree stored as a JSON snapshot and edits its folder
//! exclusions.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use autosort_core::{
    BookmarkStore, ExclusionResolver, FolderExclusion, InstallState, ItemId,
    MemoryAnnotationStore, MemoryBookmarkStore, PreferenceFile, Preferences, RootKind, Scheduler,
    SchedulerConfig, Snapshot,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort every sortable folder once and print the result
    Sort {
        /// Bookmark tree (JSON snapshot)
        tree: PathBuf,
        /// Preferences file; created with defaults if missing
        #[arg(short, long)]
        prefs: Option<PathBuf>,
        /// Write the sorted tree back to TREE
        #[arg(short, long)]
        write: bool,
        /// Print the tree as JSON instead of drawing it
        #[arg(long)]
        json: bool,
    },
    /// Show or edit folder exclusions
    Folders {
        /// Bookmark tree (JSON snapshot)
        tree: PathBuf,
        /// List the children of this folder instead of the roots
        #[arg(long)]
        parent: Option<ItemId>,
        /// Stop sorting these folders
        #[arg(long, value_name = "ID")]
        exclude: Vec<ItemId>,
        /// Sort these folders again
        #[arg(long, value_name = "ID")]
        include: Vec<ItemId>,
        /// Extend exclusion of these folders to their subfolders
        #[arg(long, value_name = "ID")]
        recursive: Vec<ItemId>,
        /// Limit exclusion of these folders to the folder itself
        #[arg(long, value_name = "ID")]
        non_recursive: Vec<ItemId>,
        /// Write the changed flags back to TREE
        #[arg(short, long)]
        write: bool,
    },
}

type Stores = (Arc<MemoryBookmarkStore>, Arc<MemoryAnnotationStore>);

fn load_tree(path: &Path) -> Result<Stores, Box<dyn Error>> {
    let json = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let snapshot: Snapshot = serde_json::from_str(&json)?;
    let annotations = Arc::new(MemoryAnnotationStore::new());
    let store = Arc::new(MemoryBookmarkStore::from_snapshot(&snapshot, annotations.as_ref())?);
    Ok((store, annotations))
}

fn save_tree(path: &Path, (store, annotations): &Stores) -> Result<(), Box<dyn Error>> {
    let snapshot = store.to_snapshot(annotations)?;
    fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Load preferences, stamping the file with the running version.
fn load_preferences(path: Option<&Path>) -> Result<Preferences, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(Preferences::default());
    };

    let stored: PreferenceFile = if path.exists() {
        serde_json::from_str(&fs::read_to_string(path)?)?
    } else {
        PreferenceFile::default()
    };
    let (file, state) = stored.install_or_upgrade(env!("CARGO_PKG_VERSION"));
    file.preferences.validate()?;

    if state != InstallState::Current {
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
    }
    Ok(file.preferences)
}

async fn sort(
    tree: &Path,
    prefs: Option<&Path>,
    write: bool,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let stores = load_tree(tree)?;
    let preferences = load_preferences(prefs)?;
    let (store, annotations) = &stores;

    let scheduler = Scheduler::new(
        store.clone(),
        annotations.clone(),
        &preferences,
        SchedulerConfig::default(),
    )?;
    let report = scheduler
        .sort_now()
        .await
        .ok_or("A sort pass is already running")?;
    for failure in &report.failures {
        warn!("{}", failure);
    }
    info!(
        "{} folders visited, {} reordered, {} positions written",
        report.folders, report.moved, report.written
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&store.to_snapshot(annotations)?)?);
    } else {
        for kind in RootKind::ALL {
            print!("{}", store.format_tree(store.root_folder(kind))?);
        }
    }

    if write {
        save_tree(tree, &stores)?;
    }
    Ok(())
}

fn print_folders(rows: &[FolderExclusion]) {
    for row in rows {
        println!(
            "{:>6}  {}  {}  {}",
            row.id,
            if row.excluded { "excluded " } else { "sorted   " },
            if row.recursively_excluded { "recursive" } else { "         " },
            row.title
        );
    }
}

struct FlagEdits {
    exclude: Vec<ItemId>,
    include: Vec<ItemId>,
    recursive: Vec<ItemId>,
    non_recursive: Vec<ItemId>,
}

fn folders(
    tree: &Path,
    parent: Option<ItemId>,
    edits: FlagEdits,
    write: bool,
) -> Result<(), Box<dyn Error>> {
    let stores = load_tree(tree)?;
    let (store, annotations) = &stores;
    let resolver = ExclusionResolver::new(store.as_ref(), annotations.as_ref());

    for id in edits.exclude {
        resolver.set_sortable(id, false)?;
    }
    for id in edits.include {
        resolver.set_sortable(id, true)?;
    }
    for id in edits.recursive {
        resolver.set_recursive(id, true)?;
    }
    for id in edits.non_recursive {
        resolver.set_recursive(id, false)?;
    }

    let rows = match parent {
        Some(parent) => resolver.child_folders(parent)?,
        None => resolver.root_folders(),
    };
    print_folders(&rows);

    if write {
        save_tree(tree, &stores)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sort {
            tree,
            prefs,
            write,
            json,
        } => sort(&tree, prefs.as_deref(), write, json).await,
        Commands::Folders {
            tree,
            parent,
            exclude,
            include,
            recursive,
            non_recursive,
            write,
        } => folders(
            &tree,
            parent,
            FlagEdits {
                exclude,
                include,
                recursive,
                non_recursive,
            },
            write,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
