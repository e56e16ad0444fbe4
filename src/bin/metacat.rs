//! Binary entry point for the metacat administrative CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use metacat::{
    config::StoreConfig,
    logging::{init_logging, LogFormat, LogSettings},
    migration::{self, VerificationReport},
    query::{ListOptions, OrderBy, OrderByField, Page, QueryConfig, QueryExecutor},
    source::SqliteSource,
    store,
    types::{ErrorCode, NodeKind},
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "metacat",
    version,
    about = "Administrative CLI for metacat metadata stores",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        env = "METACAT_CONFIG",
        value_name = "FILE",
        help = "Store config file (defaults to <config dir>/metacat/store.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "METACAT_LOG",
        default_value = "warn",
        help = "Log filter directive, e.g. info or metacat=debug"
    )]
    log_level: String,

    #[arg(
        long,
        global = true,
        env = "METACAT_LOG_FORMAT",
        default_value_t = LogFormat::Full,
        help = "Log line layout: full or compact"
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the catalog tables in a database, or open an existing catalog.
    Init {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        #[arg(long, help = "Upgrade an older database to the library version")]
        enable_upgrade_migration: bool,
    },
    /// Print the schema version recorded in a database.
    Version {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
    },
    /// Upgrade a database to the library's schema version.
    Upgrade {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
    },
    /// Downgrade a database to an older schema version.
    Downgrade {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        #[arg(long, value_name = "VERSION")]
        to: i64,
    },
    /// Replay the catalog's migration checks on scratch databases.
    VerifyMigrations,
    /// List node ids one page at a time.
    List(ListArgs),
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(value_name = "DB")]
    db_path: PathBuf,
    #[arg(long, value_enum)]
    kind: KindArg,
    #[arg(long, value_enum, default_value_t = OrderByArg::Id)]
    order_by: OrderByArg,
    #[arg(long, help = "Descending order")]
    desc: bool,
    #[arg(long, default_value_t = 20)]
    page_size: i64,
    #[arg(long, help = "Token printed with the previous page")]
    token: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum KindArg {
    Artifact,
    Execution,
    Context,
}

impl From<KindArg> for NodeKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Artifact => NodeKind::Artifact,
            KindArg::Execution => NodeKind::Execution,
            KindArg::Context => NodeKind::Context,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OrderByArg {
    Id,
    CreateTime,
    LastUpdateTime,
}

impl From<OrderByArg> for OrderByField {
    fn from(value: OrderByArg) -> Self {
        match value {
            OrderByArg::Id => OrderByField::Id,
            OrderByArg::CreateTime => OrderByField::CreateTime,
            OrderByArg::LastUpdateTime => OrderByField::LastUpdateTime,
        }
    }
}

#[derive(Debug, Serialize)]
struct VersionReport {
    database: String,
    schema_version: Option<i64>,
    library_version: i64,
    compatible: bool,
}

#[derive(Debug, Serialize)]
struct MigrationReport {
    database: String,
    from: Option<i64>,
    to: i64,
}

#[derive(Debug, Serialize)]
struct VerifyMigrationsReport {
    upgrade: VerificationReport,
    downgrade: VerificationReport,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&LogSettings {
        level: cli.log_level.clone(),
        format: cli.log_format,
        ansi: std::io::stderr().is_terminal(),
    })?;
    let store_config = StoreConfig::load(cli.config.clone())?;

    match cli.command {
        Command::Init {
            db_path,
            enable_upgrade_migration,
        } => {
            let mut config = with_database(&store_config, &db_path);
            config.migration.enable_upgrade_migration |= enable_upgrade_migration;
            config.migration.downgrade_to_schema_version = None;
            let mut exec = store::connect(&config)?;
            let report = version_report(&mut exec, &db_path)?;
            emit(&cli.format, &report, |fmt| print_version_text(fmt, &report))?;
        }
        Command::Version { db_path } => {
            let mut exec = open(&store_config, &db_path)?;
            let report = version_report(&mut exec, &db_path)?;
            emit(&cli.format, &report, |fmt| print_version_text(fmt, &report))?;
        }
        Command::Upgrade { db_path } => {
            let mut exec = open(&store_config, &db_path)?;
            let from = recorded_version(&mut exec)?;
            exec.in_transaction(|exec| migration::init_if_not_exists(exec, true))?;
            let report = MigrationReport {
                database: db_path.display().to_string(),
                from,
                to: migration::get_schema_version(&mut exec)?,
            };
            emit(&cli.format, &report, |fmt| print_migration_text(fmt, &report))?;
        }
        Command::Downgrade { db_path, to } => {
            let mut exec = open(&store_config, &db_path)?;
            let from = recorded_version(&mut exec)?;
            exec.in_transaction(|exec| migration::downgrade(exec, to))?;
            let report = MigrationReport {
                database: db_path.display().to_string(),
                from,
                to: migration::get_schema_version(&mut exec)?,
            };
            emit(&cli.format, &report, |fmt| print_migration_text(fmt, &report))?;
        }
        Command::VerifyMigrations => {
            let query_config = Arc::new(store_config.query_config()?);
            let mut upgrade_exec =
                QueryExecutor::new(SqliteSource::in_memory()?, Arc::clone(&query_config));
            let mut downgrade_exec = QueryExecutor::new(SqliteSource::in_memory()?, query_config);
            let report = VerifyMigrationsReport {
                upgrade: migration::verify_upgrade_path(&mut upgrade_exec)?,
                downgrade: migration::verify_downgrade_path(&mut downgrade_exec)?,
            };
            emit(&cli.format, &report, |fmt| print_verify_text(fmt, &report))?;
        }
        Command::List(args) => {
            let mut config = with_database(&store_config, &args.db_path);
            config.migration.downgrade_to_schema_version = None;
            let mut exec = store::connect(&config)?;
            let options = ListOptions {
                max_result_size: args.page_size,
                order_by: OrderBy {
                    field: args.order_by.into(),
                    is_asc: !args.desc,
                },
                next_page_token: args.token,
            };
            let page = exec.list_page(args.kind.into(), &options, None)?;
            emit(&cli.format, &page, |fmt| print_page_text(fmt, &page))?;
        }
    }

    Ok(())
}

fn with_database(base: &StoreConfig, db_path: &Path) -> StoreConfig {
    let mut config = base.clone();
    config.connection.filename_uri = db_path.display().to_string();
    config
}

/// Opens the database without touching its schema.
fn open(
    base: &StoreConfig,
    db_path: &Path,
) -> Result<QueryExecutor<SqliteSource>, Box<dyn Error>> {
    let query_config: QueryConfig = base.query_config()?;
    let source = SqliteSource::open(db_path, base.connection.connection_mode)?;
    Ok(QueryExecutor::new(source, Arc::new(query_config)))
}

fn recorded_version(
    exec: &mut QueryExecutor<SqliteSource>,
) -> Result<Option<i64>, Box<dyn Error>> {
    match migration::get_schema_version(exec) {
        Ok(version) => Ok(Some(version)),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn version_report(
    exec: &mut QueryExecutor<SqliteSource>,
    db_path: &Path,
) -> Result<VersionReport, Box<dyn Error>> {
    let library_version = exec.config().schema_version;
    let schema_version = recorded_version(exec)?;
    Ok(VersionReport {
        database: db_path.display().to_string(),
        schema_version,
        library_version,
        compatible: schema_version
            .is_some_and(|version| migration::is_compatible(version, library_version)),
    })
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn print_version_text(_: OutputFormat, report: &VersionReport) {
    match report.schema_version {
        Some(version) => println!(
            "{}: schema_version={} library_version={} compatible={}",
            report.database, version, report.library_version, report.compatible
        ),
        None => println!(
            "{}: uninitialized (library_version={})",
            report.database, report.library_version
        ),
    }
}

fn print_migration_text(_: OutputFormat, report: &MigrationReport) {
    let from = report
        .from
        .map_or_else(|| "uninitialized".to_string(), |v| v.to_string());
    println!("{}: schema version {} -> {}", report.database, from, report.to);
}

fn print_verify_text(_: OutputFormat, report: &VerifyMigrationsReport) {
    for direction in [&report.upgrade, &report.downgrade] {
        println!(
            "{} path verified against library version {}:",
            direction.direction, direction.library_version
        );
        for step in &direction.steps {
            println!(
                "  {} -> {}: setup_statements={} checks_passed={}",
                step.from, step.to, step.setup_statements, step.checks_passed
            );
        }
    }
}

fn print_page_text(_: OutputFormat, page: &Page) {
    for id in &page.ids {
        println!("{id}");
    }
    if let Some(token) = &page.next_page_token {
        println!("next_page_token: {token}");
    }
}
