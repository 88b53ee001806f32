use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use biodata_ingest::app::{App, IngestResult, LoadOptions, RollbackPolicy};
use biodata_ingest::client::RegistryHttpClient;
use biodata_ingest::config::ConfigLoader;
use biodata_ingest::domain::{Category, ReferenceId};
use biodata_ingest::error::{ErrorKind, IngestError};
use biodata_ingest::output::{ConsoleOutput, JsonOutput, OutputMode};
use biodata_ingest::registration::FileRegistration;
use biodata_ingest::scan::IndexMode;

#[derive(Parser)]
#[command(name = "biodata-ingest")]
#[command(about = "Register genomics files against a reference and group them into a project")]
#[command(version, author)]
struct Cli {
    /// Print JSON results instead of progress lines
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Register every file in a directory and save them as a project")]
    LoadDir(LoadDirArgs),
    #[command(about = "Register a single file or URL")]
    Register(RegisterArgs),
    #[command(about = "Delete a registered file")]
    Delete(DeleteArgs),
}

#[derive(Args)]
struct LoadDirArgs {
    /// Reference id the files are registered against
    reference: String,

    directory: PathBuf,

    /// Name of the project to create
    #[arg(long)]
    project: String,

    #[arg(long)]
    pretty_name: Option<String>,

    /// Parent project id
    #[arg(long)]
    parent: Option<u64>,

    /// Require indices where the format mandates one and check their extensions
    #[arg(long)]
    strict_index: bool,

    /// Delete already registered files if the batch fails
    #[arg(long)]
    rollback: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct RegisterArgs {
    reference: String,

    path: String,

    #[arg(long)]
    index: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    pretty_name: Option<String>,

    /// Build a feature index on the server (vcf and gene only)
    #[arg(long)]
    do_index: Option<bool>,
}

#[derive(Args)]
struct DeleteArgs {
    category: String,

    id: u64,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error.kind() {
        ErrorKind::InvalidArgument | ErrorKind::Configuration => 1,
        ErrorKind::RemoteRejected | ErrorKind::RemoteProtocol => 2,
        ErrorKind::Transport => 3,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let client = RegistryHttpClient::new(config)?;
    let app = App::new(client);

    match cli.command {
        Commands::LoadDir(args) => run_load_dir(args, &app, output_mode),
        Commands::Register(args) => run_register(args, &app, output_mode),
        Commands::Delete(args) => run_delete(args, &app, output_mode),
    }
}

fn run_load_dir(
    args: LoadDirArgs,
    app: &App<RegistryHttpClient>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let reference: ReferenceId = args.reference.parse()?;
    let index_mode = if args.strict_index {
        IndexMode::Strict
    } else {
        IndexMode::Lenient
    };

    if args.dry_run {
        let plan = match output_mode {
            OutputMode::NonInteractive => {
                app.plan_directory(reference, &args.directory, index_mode, &JsonOutput)?
            }
            OutputMode::Interactive => {
                app.plan_directory(reference, &args.directory, index_mode, &ConsoleOutput)?
            }
        };
        match output_mode {
            OutputMode::NonInteractive => JsonOutput::print_plan(&plan).into_diagnostic()?,
            OutputMode::Interactive => {
                for planned in &plan.registrations {
                    println!(
                        "would register {} {} index={}",
                        planned.category,
                        planned.request.path,
                        planned.request.index_path.as_deref().unwrap_or("-")
                    );
                }
                for index in &plan.skipped_indices {
                    println!("unused index {index}");
                }
            }
        }
        return Ok(());
    }

    let options = LoadOptions {
        index_mode,
        rollback: if args.rollback {
            RollbackPolicy::BestEffort
        } else {
            RollbackPolicy::Keep
        },
        pretty_name: args.pretty_name,
        parent_id: args.parent,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.load_directory(
                reference,
                &args.directory,
                &args.project,
                &options,
                &JsonOutput,
            )?;
            JsonOutput::print_ingest(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.load_directory(
                reference,
                &args.directory,
                &args.project,
                &options,
                &ConsoleOutput,
            )?;
            print_summary(&result);
        }
    }
    Ok(())
}

fn run_register(
    args: RegisterArgs,
    app: &App<RegistryHttpClient>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let reference: ReferenceId = args.reference.parse()?;
    let registration = FileRegistration {
        path: args.path,
        index: args.index,
        name: args.name,
        pretty_name: args.pretty_name,
        do_index: args.do_index,
    };
    match output_mode {
        OutputMode::NonInteractive => {
            let file = app.register_file(reference, &registration, &JsonOutput)?;
            JsonOutput::print_registered(&file).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let file = app.register_file(reference, &registration, &ConsoleOutput)?;
            println!(
                "registered {} {} as {} (bioDataItemId={})",
                file.category, file.path, file.item.name, file.item.bio_data_item_id
            );
        }
    }
    Ok(())
}

fn run_delete(
    args: DeleteArgs,
    app: &App<RegistryHttpClient>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let category: Category = args.category.parse()?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.delete(category, args.id, &JsonOutput)?;
            JsonOutput::print_delete(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            app.delete(category, args.id, &ConsoleOutput)?;
            println!("deleted {category} {}", args.id);
        }
    }
    Ok(())
}

fn print_summary(result: &IngestResult) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!(
        "{cyan}project {} (id {}) on reference {}{reset}",
        result.project.name,
        result.project.id,
        result
            .reference
            .name
            .as_deref()
            .unwrap_or("<unnamed>")
    );
    println!("{green}registered files: {}{reset}", result.items.len());
    for file in &result.items {
        println!(
            "{green}  {} {} -> {}{reset}",
            file.category, file.item.name, file.item.bio_data_item_id
        );
        if let Some(index) = &file.index_path {
            println!("     index: {index}");
        }
    }
}
