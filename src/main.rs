use clap::{ArgGroup, Parser, Subcommand};
use sessionrec::config::{
    load_config_for_update, save_config_to_path, Config, ConfigError, ConfigPaths,
};
use sessionrec::error::AppError;
use sessionrec::{logger, recordings};
use std::path::PathBuf;
use std::process::ExitCode;

/// sessionrec: look up, play-check and download session recordings
#[derive(Parser, Debug)]
#[command(
    name = "sessionrec",
    version,
    about = "Session recording lookup and download CLI",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create default config and paths
    Init,
    /// Store the API bearer token (or a command that prints it)
    Auth(AuthArgs),
    /// List recordings, one page at a time
    List {
        #[arg(long, default_value = "1")]
        page: u32,
        /// Defaults to `page_size` from the config
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Show the recording attached to an appointment
    Show {
        #[arg(long)]
        appointment: u64,
        #[arg(long)]
        json: bool,
    },
    /// Print the URL a player should load for an appointment's recording
    Resolve {
        #[arg(long)]
        appointment: u64,
    },
    /// Fetch a fresh signed URL and open or save it
    Download {
        #[arg(long)]
        recording: u64,
        /// Save to disk instead of handing the URL to the system opener
        #[arg(long)]
        save: bool,
        /// Target directory for --save (defaults to download.dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Resolve the source and load its metadata like the player would
    Inspect {
        #[arg(long)]
        appointment: u64,
    },
}

#[derive(Parser, Debug)]
#[command(group(
    ArgGroup::new("token-src")
        .required(true)
        .args(["token", "token_cmd"])
))]
struct AuthArgs {
    /// API base URL, e.g. https://portal.example.com/api
    #[arg(long)]
    base_url: Option<String>,
    /// Bearer token value
    #[arg(long)]
    token: Option<String>,
    /// Command that prints the token (e.g. `pass show portal/token`)
    #[arg(long)]
    token_cmd: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match Config::load_or_init().await {
        Ok(cfg) => {
            logger::init_logging(Some(&cfg));
            Some(cfg)
        }
        Err(ConfigError::MissingConfigFile(path)) => {
            logger::init_logging(None);
            if matches!(cli.command, Commands::Init) {
                println!("Created default config at {path}");
                return ExitCode::SUCCESS;
            }
            if !matches!(cli.command, Commands::Auth(_)) {
                eprintln!("sessionrec: created example config at {path}. Please edit it.");
                return ExitCode::from(10);
            }
            None
        }
        Err(e) => {
            logger::init_logging(None);
            if !matches!(cli.command, Commands::Auth(_)) {
                tracing::error!(error = %e, "config load failed");
                eprintln!("error: {e}");
                return ExitCode::from(10);
            }
            None
        }
    };

    let result = match (cli.command, cfg) {
        (Commands::Init, _) => {
            println!("Config file already exists and is valid.");
            Ok(())
        }
        (Commands::Auth(args), _) => handle_auth(args).await,
        (command, Some(cfg)) => run(command, &cfg).await,
        (_, None) => Err(AppError::Config(ConfigError::Invalid(
            "configuration unavailable".into(),
        ))),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(command: Commands, cfg: &Config) -> Result<(), AppError> {
    match command {
        Commands::List {
            page,
            page_size,
            json,
        } => recordings::run_list(cfg, page, page_size, json).await,
        Commands::Show { appointment, json } => recordings::run_show(cfg, appointment, json).await,
        Commands::Resolve { appointment } => recordings::run_resolve(cfg, appointment).await,
        Commands::Download {
            recording,
            save,
            dir,
        } => recordings::run_download(cfg, recording, save, dir).await,
        Commands::Inspect { appointment } => recordings::run_inspect(cfg, appointment).await,
        Commands::Init | Commands::Auth(_) => Ok(()),
    }
}

async fn handle_auth(args: AuthArgs) -> Result<(), AppError> {
    let paths = ConfigPaths::default()?;
    let mut cfg = load_config_for_update(&paths.config_file).await?;

    if let Some(base) = args.base_url {
        cfg.api.base_url = base;
    }
    if let Some(token) = args.token {
        cfg.api.token = Some(token);
        cfg.api.token_cmd = None;
    }
    if let Some(cmd) = args.token_cmd {
        cfg.api.token_cmd = Some(cmd);
        cfg.api.token = None;
    }

    cfg.validate()?;
    save_config_to_path(&cfg, &paths.config_file).await?;
    tracing::info!(path = %paths.config_file.display(), "saved api credentials");
    println!("saved api credentials in {}", paths.config_file.display());
    Ok(())
}
