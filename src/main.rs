use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use verdb::db::{Database, DatabaseConfig, Repl};
use verdb::logging;
use verdb::staging::{ResetOutcome, ResetRequest};
use verdb::storage::GitSignature;

#[derive(Parser, Debug)]
#[command(name = "verdb")]
#[command(version, about = "Versioned SQL tables with git-style staging")]
struct Cli {
    /// Repository directory
    #[arg(short = 'd', long = "database", default_value = ".verdb")]
    database: PathBuf,

    /// Increase logging verbosity (RUST_LOG overrides)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Commit author name
    #[arg(long, env = "VERDB_AUTHOR_NAME", default_value = "verdb")]
    author_name: String,

    /// Commit author email
    #[arg(long, env = "VERDB_AUTHOR_EMAIL", default_value = "verdb@localhost")]
    author_email: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty repository
    Init,

    /// Stage tables and docs; `.` or --all stages everything
    Add {
        tables: Vec<String>,

        #[arg(short, long, default_value_t = false)]
        all: bool,
    },

    /// Unstage tables, or move everything to a commit with --hard
    Reset {
        /// Table names for a soft reset, or a single commit for --hard
        args: Vec<String>,

        #[arg(long, default_value_t = false)]
        hard: bool,

        #[arg(long, default_value_t = false)]
        soft: bool,
    },

    /// Commit the staged root
    Commit {
        #[arg(short, long)]
        message: String,
    },

    /// Show commit history
    Log {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Run SQL, or start an interactive shell without -e
    Sql {
        #[arg(short, long)]
        execute: Option<String>,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let config = DatabaseConfig::new(&cli.database)
        .signature(GitSignature::new(cli.author_name, cli.author_email))
        .create_if_missing(false);

    if let Command::Init = cli.cmd {
        let db = Database::init(config).context("init failed")?;
        println!("Initialized empty repository in {}", db.path().display());
        return Ok(());
    }

    // validated before the repository is opened
    let reset = match &cli.cmd {
        Command::Reset { args, hard, soft } => Some(ResetRequest::from_args(*hard, *soft, args)?),
        _ => None,
    };

    let mut db = Database::open_with_config(config)
        .with_context(|| format!("cannot open repository at {}", cli.database.display()))?;

    match cli.cmd {
        Command::Init => {}
        Command::Add { tables, all } => {
            let tables = if all { vec![".".to_string()] } else { tables };
            db.stage(&tables)?;
        }
        Command::Reset { .. } => {
            if let Some(request) = reset {
                match db.reset(&request)? {
                    ResetOutcome::Hard(commit) => {
                        println!("HEAD is now at {} {}", commit.id.short(), commit.summary());
                    }
                    ResetOutcome::Soft(soft) => {
                        if let Some(report) = soft.unstaged {
                            print!("{}", report);
                        }
                    }
                }
            }
        }
        Command::Commit { message } => {
            let id = db.commit(&message)?;
            println!("[{}] {}", id.short(), message);
        }
        Command::Log { limit } => {
            for commit in db.log(limit)? {
                println!("commit {}", commit.id);
                println!("Author: {} <{}>", commit.author_name, commit.author_email);
                println!("Date:   {}", commit.timestamp.to_rfc2822());
                println!();
                println!("    {}", commit.summary());
                println!();
            }
        }
        Command::Sql { execute: Some(sql) } => {
            for result in db.execute_batch(&sql)? {
                print!("{}", result);
            }
        }
        Command::Sql { execute: None } => {
            Repl::new(db).run()?;
        }
    }

    Ok(())
}
