use changegate::cli::checkpoint::CheckpointCommands;
use changegate::error::{PipelineError, StageFailure};
use changegate::version::BumpKind;
use changegate::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "changegate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stage-gated change pipeline", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// More diagnostic output on stderr (-v debug, -vv trace); RUST_LOG wins
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize changegate in the current directory
    Init {
        /// Project name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Create a change (stage 0)
    New {
        /// Change ID
        change_id: String,

        /// Change title
        #[arg(short, long)]
        title: String,

        /// Owner handle (defaults to the git author)
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// List changes
    List {
        /// Show archived changes
        #[arg(short, long)]
        archived: bool,
    },

    /// Show status of a change
    Status {
        /// Change ID
        change_id: String,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Validate a change's documents (exit 1 on blocking issues)
    Validate {
        /// Change ID
        change_id: String,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Run a stage, or every remaining stage
    Run {
        /// Change ID
        change_id: String,

        /// Stage number (0-12)
        #[arg(short, long)]
        stage: Option<usize>,

        /// Show what would happen without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Version increment for the version stage
        #[arg(long, value_enum, default_value_t = BumpKind::Patch)]
        bump: BumpKind,
    },

    /// Move a change into the archive
    Archive {
        /// Change ID
        change_id: String,

        /// Skip confirmation for incomplete stages
        #[arg(short, long)]
        yes: bool,
    },

    /// Checkpoint operations
    #[command(subcommand)]
    Checkpoint(CheckpointCommands),

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "changegate=debug",
        _ => "changegate=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Stages run strictly one after another; one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    match runtime.block_on(run_async(cli)) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => std::process::exit(report_error(&e)),
    }
}

async fn run_async(cli: Cli) -> Result<i32> {
    let project_root = std::env::current_dir()?;
    let root = project_root.as_path();

    match cli.command {
        Commands::Init { name } => changegate::cli::init::run(root, name.as_deref())?,

        Commands::New {
            change_id,
            title,
            owner,
        } => changegate::cli::new::run(root, &change_id, &title, owner).await?,

        Commands::List { archived } => changegate::cli::list::run(root, archived)?,

        Commands::Status { change_id, json } => changegate::cli::status::run(root, &change_id, json)?,

        Commands::Validate { change_id, json } => {
            if !changegate::cli::validate::run(root, &change_id, json)? {
                return Ok(1);
            }
        }

        Commands::Run {
            change_id,
            stage,
            dry_run,
            bump,
        } => changegate::cli::run::run(root, &change_id, stage, dry_run, bump).await?,

        Commands::Archive { change_id, yes } => changegate::cli::archive::run(root, &change_id, yes).await?,

        Commands::Checkpoint(cmd) => changegate::cli::checkpoint::run(root, cmd)?,

        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "changegate", &mut io::stdout());
        }
    }

    Ok(0)
}

/// Print an error the way an operator can act on it; returns the exit code
fn report_error(e: &anyhow::Error) -> i32 {
    if let Some(failure) = e.downcast_ref::<StageFailure>() {
        let stage = failure.stage;
        eprintln!(
            "{}",
            format!(
                "❌ Stage {} {} {} failed: {}",
                stage.index(),
                stage.emoji(),
                stage.name(),
                failure.source
            )
            .red()
        );
        print_items(&failure.source);
        eprintln!();
        if failure.source.is_recoverable() {
            eprintln!("   Fix the above, then re-run:");
        } else {
            eprintln!("   Resolve the failure, then re-run:");
        }
        eprintln!("   {}", failure.rerun_command().bold());
        return failure.exit_code();
    }

    if let Some(err) = e.downcast_ref::<PipelineError>() {
        eprintln!("{}", format!("Error: {}", err).red());
        print_items(err);
        return err.kind().exit_code();
    }

    eprintln!("{}", format!("Error: {:#}", e).red());
    1
}

fn print_items(err: &PipelineError) {
    let items = err.items();
    if items.len() > 1 {
        for item in items {
            eprintln!("   • {}", item);
        }
    }
}
