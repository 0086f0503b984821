mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::CliError;
use devpin_core::{Engine, EvalOptions};
use devpin_schema::Platform;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "devpin",
    version,
    about = "Pinned, reproducible development shells from declarative manifests"
)]
struct Cli {
    /// Path to the devpin store directory.
    #[arg(long, default_value = "~/.local/share/devpin", global = true)]
    store: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that evaluates a shell.
#[derive(Debug, Args)]
struct EvalArgs {
    /// Path to manifest TOML file.
    #[arg(default_value = "devpin.toml")]
    manifest: PathBuf,
    /// Shell to evaluate (default: `default`, or the only shell).
    #[arg(long)]
    shell: Option<String>,
    /// Target platform as `<arch>-<os>`, overriding the manifest.
    #[arg(long)]
    system: Option<String>,
    /// Require devpin.lock and fail if the resolved state would drift.
    #[arg(long, default_value_t = false)]
    locked: bool,
}

impl EvalArgs {
    fn options(&self) -> Result<EvalOptions, CliError> {
        Ok(EvalOptions {
            shell: self.shell.clone(),
            system: parse_system(self.system.as_deref())?,
            locked: self.locked,
        })
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a starter devpin.toml in the current directory.
    Init {
        /// Template to start from: minimal, rust, gui.
        #[arg(long, default_value = "minimal")]
        template: String,
        /// Source pin to use instead of the template's.
        #[arg(long)]
        source: Option<String>,
        /// Overwrite an existing devpin.toml.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the activation script of a shell (use with `eval "$(devpin shell)"`).
    Shell(EvalArgs),
    /// List the artifacts a shell resolves to.
    Resolve(EvalArgs),
    /// Print the variables a shell sets.
    Env(EvalArgs),
    /// Resolve every shell and write devpin.lock next to the manifest.
    Lock {
        /// Path to manifest TOML file.
        #[arg(default_value = "devpin.toml")]
        manifest: PathBuf,
        /// Target platform as `<arch>-<os>`, overriding the manifest.
        #[arg(long)]
        system: Option<String>,
        /// Verify the existing lock file instead of writing it.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Show the normalized manifest, its identity and lock status.
    Inspect {
        /// Path to manifest TOML file.
        #[arg(default_value = "devpin.toml")]
        manifest: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn parse_system(system: Option<&str>) -> Result<Option<Platform>, CliError> {
    system
        .map(Platform::parse)
        .transpose()
        .map_err(|e| CliError::from(devpin_core::CoreError::from(e)))
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DEVPIN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let store_path = expand_tilde(&cli.store);
    let engine = Engine::new(&store_path);
    tracing::debug!("store: {}", engine.store_root().display());
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Init {
            template,
            source,
            force,
        } => commands::init::run(&template, source.as_deref(), force, json_output),
        Commands::Shell(args) => args
            .options()
            .and_then(|opts| commands::shell::run(&engine, &args.manifest, &opts, json_output)),
        Commands::Resolve(args) => args
            .options()
            .and_then(|opts| commands::resolve::run(&engine, &args.manifest, &opts, json_output)),
        Commands::Env(args) => args
            .options()
            .and_then(|opts| commands::env::run(&engine, &args.manifest, &opts, json_output)),
        Commands::Lock {
            manifest,
            system,
            check,
        } => parse_system(system.as_deref()).and_then(|system| {
            commands::lock::run(&engine, &manifest, system.as_ref(), check, json_output)
        }),
        Commands::Inspect { manifest } => commands::inspect::run(&engine, &manifest, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {}", err.message);
            ExitCode::from(err.code)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn expand_tilde_uses_home() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(
                expand_tilde("~/.local/share/devpin"),
                PathBuf::from(home).join(".local/share/devpin")
            );
        }
        assert_eq!(expand_tilde("/abs/store"), PathBuf::from("/abs/store"));
    }

    #[test]
    fn invalid_system_is_malformed() {
        let err = parse_system(Some("linux")).unwrap_err();
        assert_eq!(err.code, commands::EXIT_MALFORMED_SPEC);
    }
}
