mod display;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use leadbook_core::schema::MAIN_DATA_TABLE;
use leadbook_core::{AnnotationEdit, EditOutcome, EntityKind, SortKey, ViewQuery};
use leadbook_store::{CsvStore, LeadBook, Repository};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "leadbook",
    version,
    about = "Browse scraped opposition cases and the agents and proprietors behind them."
)]
struct Cli {
    /// Directory holding the tables.
    #[arg(long, env = "LEADBOOK_DATA_DIR", default_value = "data", value_hint = clap::ValueHint::DirPath)]
    data_dir: PathBuf,

    /// Storage backend.
    #[arg(long, env = "LEADBOOK_BACKEND", value_enum, default_value_t = Backend::Csv)]
    backend: Backend,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// One CSV file per table.
    Csv,
    /// A single DuckDB database file.
    Duckdb,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace MainData with a full CSV snapshot.
    Import {
        file: PathBuf,
    },
    /// Append the complete, unseen rows of a CSV upload to MainData.
    Ingest {
        file: PathBuf,
        /// The file has no header line; columns follow MainData's order.
        #[arg(long)]
        no_header: bool,
    },
    /// Rebuild Agents and/or Proprietors from MainData.
    Derive {
        /// `agents` or `proprietors`; both when omitted.
        kind: Option<EntityKind>,
    },
    /// Set phone number, lead or notes on one agent or proprietor.
    Annotate {
        kind: EntityKind,
        /// Name of the agent or proprietor.
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        lead: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Edit as JSON, e.g. '{"PhoneNumber":"555"}'. Flags override its fields.
        #[arg(long)]
        edit: Option<String>,
    },
    /// Display a page of a table.
    Show {
        /// `main`, `agents`, `proprietors` or any stored table name.
        table: String,
        #[arg(long, short)]
        search: Option<String>,
        /// Column to sort by.
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending.
        #[arg(long, requires = "sort")]
        desc: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        per_page: usize,
    },
    /// Write a table as CSV.
    Export {
        table: String,
        /// Output file; stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete rows whose every field is empty.
    Clean {
        table: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), backend = ?cli.backend, "leadbook");

    match cli.backend {
        Backend::Csv => {
            let store = CsvStore::open(&cli.data_dir)
                .await
                .with_context(|| format!("opening data directory {}", cli.data_dir.display()))?;
            run(LeadBook::new(store), cli.command, cli.json).await
        }
        Backend::Duckdb => open_duckdb(&cli.data_dir, cli.command, cli.json).await,
    }
}

#[cfg(feature = "duckdb")]
async fn open_duckdb(dir: &Path, command: Command, json: bool) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("leadbook.duckdb");
    let store = leadbook_store::DuckStore::open_persistent(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    run(LeadBook::new(store), command, json).await
}

#[cfg(not(feature = "duckdb"))]
async fn open_duckdb(_dir: &Path, _command: Command, _json: bool) -> Result<()> {
    anyhow::bail!("this build has no DuckDB support; rebuild with `--features duckdb`")
}

async fn run<R: Repository>(book: LeadBook<R>, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Import { file } => {
            let text = read_upload(&file).await?;
            let rows = book.import_main_data(&text).await?;
            if json {
                println!("{}", serde_json::json!({ "rows": rows }));
            } else {
                println!("Imported {rows} rows into {MAIN_DATA_TABLE}");
            }
        }
        Command::Ingest { file, no_header } => {
            let text = read_upload(&file).await?;
            let report = if no_header {
                book.append_main_data(&text).await?
            } else {
                book.ingest_main_data(&text).await?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Accepted {} rows ({} now in {MAIN_DATA_TABLE})",
                    report.accepted, report.total_rows
                );
                println!(
                    "Dropped: {} without opposition number, {} incomplete, {} already known, {} repeated",
                    report.missing_identity, report.incomplete, report.already_known, report.repeated
                );
            }
        }
        Command::Derive { kind } => {
            let reports = match kind {
                Some(kind) => vec![book.derive(kind).await?],
                None => book.derive_all().await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for r in &reports {
                    println!(
                        "{:<12} {:>6} rows  {} new, {} updated, {} unchanged, {} skipped",
                        r.table, r.rows, r.inserted, r.updated, r.unchanged, r.skipped
                    );
                }
            }
        }
        Command::Annotate {
            kind,
            name,
            phone,
            lead,
            notes,
            edit,
        } => {
            let mut request = match edit {
                Some(raw) => serde_json::from_str::<AnnotationEdit>(&raw)
                    .context("parsing --edit as JSON")?,
                None => AnnotationEdit::default(),
            };
            request.identity = Some(name);
            request.phone_number = phone.or(request.phone_number);
            request.lead = lead.or(request.lead);
            request.notes = notes.or(request.notes);

            let outcome = book.annotate(kind, &request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }
            match outcome {
                EditOutcome::Updated(record) => display::print_entity_card(kind.spec(), &record),
                EditOutcome::NotFound => {
                    let name = request.identity.unwrap_or_default();
                    println!("No {} named {name:?}", kind.spec().label.to_lowercase());
                }
            }
        }
        Command::Show {
            table,
            search,
            sort,
            desc,
            page,
            per_page,
        } => {
            let name = resolve_table(&table);
            let query = ViewQuery {
                search,
                sort: sort.map(|c| if desc { SortKey::desc(c) } else { SortKey::asc(c) }),
                page,
                per_page,
            };
            let result = book.view(name, &query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let columns = book.table(name).await?.columns;
                display::print_page(&columns, &result)?;
            }
        }
        Command::Export { table, output } => {
            let name = resolve_table(&table);
            let text = book.export(name).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, text)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(table = name, path = %path.display(), "exported table");
                }
                None => print!("{text}"),
            }
        }
        Command::Clean { table } => {
            let name = resolve_table(&table);
            let removed = book.clean_blank_rows(name).await?;
            if json {
                println!("{}", serde_json::json!({ "table": name, "removed": removed }));
            } else {
                println!("Removed {removed} blank rows from {name}");
            }
        }
    }
    Ok(())
}

async fn read_upload(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

/// Map the short names used on the command line to stored table names.
fn resolve_table(name: &str) -> &str {
    if name.eq_ignore_ascii_case("main") || name.eq_ignore_ascii_case(MAIN_DATA_TABLE) {
        return MAIN_DATA_TABLE;
    }
    match name.parse::<EntityKind>() {
        Ok(kind) => kind.table(),
        Err(_) => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_table_names() {
        assert_eq!(resolve_table("main"), "MainData");
        assert_eq!(resolve_table("agents"), "Agents");
        assert_eq!(resolve_table("Proprietor"), "Proprietors");
        assert_eq!(resolve_table("Leads2024"), "Leads2024");
    }

    #[test]
    fn parses_annotate() {
        let cli = Cli::try_parse_from([
            "leadbook", "annotate", "agents", "Smith & Co", "--phone", "555",
        ])
        .unwrap();
        match cli.command {
            Command::Annotate { kind, name, phone, .. } => {
                assert_eq!(kind, EntityKind::Agent);
                assert_eq!(name, "Smith & Co");
                assert_eq!(phone.as_deref(), Some("555"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_headerless_ingest() {
        let cli = Cli::try_parse_from(["leadbook", "ingest", "rows.csv", "--no-header"]).unwrap();
        assert!(matches!(cli.command, Command::Ingest { no_header: true, .. }));
    }

    #[test]
    fn desc_requires_sort() {
        assert!(Cli::try_parse_from(["leadbook", "show", "main", "--desc"]).is_err());
    }
}
