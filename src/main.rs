//! stepstore CLI - inspect, validate, convert and ingest STEP exchange files

mod ui;

use clap::{Parser, Subcommand};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use stepstore::config::{self, StepstoreConfig};
use stepstore::{InstanceStreamer, SchemaRegistry, Store};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ui::{Icons, Spinner, TableBuilder};

#[derive(Parser)]
#[command(name = "stepstore")]
#[command(version = "0.0.1")]
#[command(about = "Schema-typed STEP (ISO 10303-21) model store")]
#[command(long_about = r#"
stepstore decodes STEP physical files into a typed instance graph with
id, GlobalId, type and inverse indices, and can persist it in SQLite.

Example usage:
  stepstore stats model.ifc
  stepstore show model.ifc --id 42 --depth 2
  stepstore ingest model.ifc --database model.db
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Count instances per type
    Stats {
        file: PathBuf,
    },

    /// Parse a file and report unresolved references
    Validate {
        file: PathBuf,
    },

    /// Stream a file into a persistent store
    Ingest {
        file: PathBuf,

        /// Database file (defaults to the configured database)
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Print an instance and what it references
    Show {
        file: PathBuf,

        /// Instance id
        #[arg(short, long)]
        id: u32,

        /// Maximum traversal depth, negative for unlimited
        #[arg(long, default_value = "1", allow_hyphen_values = true)]
        depth: i32,
    },

    /// Print the project unit of a kind, e.g. LENGTHUNIT
    Unit {
        file: PathBuf,
        kind: String,
    },

    /// Parse and write the model back out
    Convert {
        file: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

fn load(file: &Path, config: &StepstoreConfig, registry: &SchemaRegistry) -> anyhow::Result<Store> {
    let store = Store::load(file, registry, config.loader.clone())?;
    Ok(store)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Commands::Init { force } = cli.command {
        let path = cli.config.unwrap_or_else(config::default_config_path);
        config::write_config(&path, &StepstoreConfig::default(), force)?;
        ui::success(&format!("Wrote {}", path.display()));
        return Ok(());
    }

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let registry = config.registry()?;

    match cli.command {
        Commands::Init { .. } => {}

        Commands::Stats { file } => {
            let store = load(&file, &config, &registry)?;
            ui::header(&format!("{}", file.display()));
            ui::info("Schema", store.schema().name());
            if let Some(name) = store.header().name()? {
                ui::info("File name", &name);
            }

            let mut counts: Vec<(String, usize)> = Vec::new();
            for declaration in store.declarations_present()? {
                let n = store.instances_by_type_excl_subtypes(declaration.name())?.len();
                counts.push((declaration.name().to_string(), n));
            }
            counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

            let mut table = TableBuilder::new();
            for (name, n) in &counts {
                table.add_row(name, &n.to_string());
            }
            ui::section(&format!("{} Instances", Icons::STATS));
            println!("{}", table.build());
            ui::summary_row("Total:", &store.len()?.to_string());
            ui::summary_row("Max id:", &store.max_id().to_string());
        }

        Commands::Validate { file } => {
            let data = std::fs::read(&file)?;
            let (store, stats) = Store::parse_with_stats(&data, &registry, config.loader.clone())?;
            ui::info("Instances", &store.len()?.to_string());
            println!("{}", stats);
            if stats.unresolved > 0 || stats.duplicates > 0 {
                ui::warn(&format!(
                    "{} unresolved references, {} duplicate definitions",
                    stats.unresolved, stats.duplicates
                ));
                anyhow::bail!("validation failed for {}", file.display());
            }
            ui::success("No dangling references");
        }

        Commands::Ingest { file, database } => {
            let database = database
                .or_else(|| config.database.as_ref().map(PathBuf::from))
                .ok_or_else(|| anyhow::anyhow!("no database given (use --database or set it in the config)"))?;
            config::ensure_db_dir(&database)?;

            let data = std::fs::read(&file)?;
            let mut streamer = InstanceStreamer::new(&data, &registry, config.loader.clone())?;
            let store = Store::create_persistent(&database, streamer.schema().clone())?;

            ui::header(&format!("Ingesting {}", file.display()));
            ui::info("Database", &format!("{} {}", Icons::DATABASE, database.display()));
            let spinner = Spinner::new("Streaming records");
            let stats = match store.ingest(&mut streamer) {
                Ok(stats) => stats,
                Err(e) => {
                    spinner.finish_with_message("Failed");
                    ui::error(&e.to_string());
                    return Err(e.into());
                }
            };
            spinner.finish_with_message(&format!("{} {} instances", Icons::PACKAGE, stats.instances));

            println!("{}", stats);
            println!("{}", store.kv()?.stats()?);
        }

        Commands::Show { file, id, depth } => {
            let store = load(&file, &config, &registry)?;
            let root = store.instance_by_id(id)?;
            ui::record("", &root.to_spf()?);

            let referrers = store.instances_by_reference(id)?;
            if !referrers.is_empty() {
                ui::section(&format!("{} Referenced by", Icons::LINK));
                for referrer in referrers {
                    ui::record("  ", &referrer.to_spf()?);
                }
            }

            let reachable = store.traverse(&root, depth)?;
            if reachable.len() > 1 {
                ui::section(&format!("{} References", Icons::FILE));
                for instance in reachable.iter().skip(1) {
                    ui::record("  ", &instance.to_spf()?);
                }
            }
        }

        Commands::Unit { file, kind } => {
            let store = load(&file, &config, &registry)?;
            let info = store.get_unit(&kind.to_uppercase())?;
            match info.unit {
                Some(unit) => {
                    ui::record(&format!("{} ", Icons::RULER), &unit.to_spf()?);
                    ui::summary_row("SI factor:", &info.factor.to_string());
                }
                None => ui::warn(&format!("No {} assigned in the project", kind.to_uppercase())),
            }
        }

        Commands::Convert { file, output } => {
            let store = load(&file, &config, &registry)?;
            let mut out = BufWriter::new(std::fs::File::create(&output)?);
            store.write(&mut out)?;
            ui::success(&format!("Wrote {} instances to {}", store.len()?, output.display()));
        }
    }

    Ok(())
}
