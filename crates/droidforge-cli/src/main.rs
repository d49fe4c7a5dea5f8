use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use droidforge_build::Preset;
use droidforge_cli::commands;
use droidforge_core::config::SIGNING_KEY_ENV;

#[derive(Parser)]
#[command(name = "droidforge", version, about = "On-device Android APK builder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build and sign the project's APK.
    Build {
        /// Project directory containing project.properties.
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
        /// Task preset (full | debug | managed-only | native-enabled).
        #[arg(long)]
        preset: Option<String>,
        /// Build the release variant regardless of the descriptor.
        #[arg(long)]
        release: bool,
        /// Only print task boundaries.
        #[arg(long, short)]
        quiet: bool,
    },
    /// Inspect or install the SDK components.
    Toolchain {
        #[command(subcommand)]
        action: ToolchainAction,
    },
    /// Resolve declared dependencies into the local cache.
    Resolve {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
    /// Generate an Ed25519 keypair (public + private hex).
    Keygen,
    /// Sign an APK with DROIDFORGE_SIGNING_KEY.
    Sign {
        /// APK to sign.
        #[arg(long)]
        apk: PathBuf,
        /// Output path (defaults to signing in place).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check an APK's manifest digests and signature.
    Verify {
        /// APK to verify.
        #[arg(long)]
        apk: PathBuf,
        /// Expected signer public key hex.
        #[arg(long)]
        public_key: Option<String>,
    },
}

#[derive(Subcommand)]
enum ToolchainAction {
    /// Show component and tool state.
    Status {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
    /// Install missing components (all of them unless named).
    Install {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
        /// platform | build-tools | ndk; repeatable.
        #[arg(long = "component")]
        components: Vec<String>,
    },
    /// Run every usable tool with --version.
    Doctor {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
}

fn main() {
    init_tracing();
    if let Err(message) = run_cli() {
        let _ = exit_with_error(&message);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn run_cli() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Build {
            project_dir,
            preset,
            release,
            quiet,
        } => {
            let preset = match preset {
                Some(name) => Some(name.parse::<Preset>()?),
                None => None,
            };
            let output = commands::build::run(commands::build::BuildArgs {
                project_dir,
                preset,
                release,
                quiet,
            })?;
            for warning in &output.warnings {
                eprintln!("warning: {}", warning);
            }
            println!("apk={}", output.apk.display());
            println!("elapsed_ms={}", output.elapsed.as_millis());
            Ok(())
        }
        Command::Toolchain { action } => run_toolchain(action),
        Command::Resolve { project_dir } => {
            let report = commands::resolve::run(commands::resolve::ResolveArgs { project_dir })?;
            for artifact in &report.resolved {
                if let Some(jar) = &artifact.classes_jar {
                    println!("classpath={}", jar.display());
                }
                if let Some(native) = &artifact.native_dir {
                    println!("native={}", native.display());
                }
            }
            if report.failures.is_empty() {
                Ok(())
            } else {
                exit_with_error(&format!("{} dependencies failed", report.failures.len()))
            }
        }
        Command::Keygen => {
            let output = commands::keygen::run()?;
            println!("public_key={}", output.public_key_hex);
            println!("private_key={}", output.private_key_hex);
            Ok(())
        }
        Command::Sign { apk, out } => {
            let private_key_hex = std::env::var(SIGNING_KEY_ENV)
                .map_err(|_| format!("Missing {} environment variable", SIGNING_KEY_ENV))?;
            let summary = commands::sign::run(commands::sign::SignArgs {
                apk,
                out,
                private_key_hex,
            })?;
            println!("signed={}", summary.output.display());
            println!("entries={}", summary.entries_signed);
            println!("public_key={}", summary.public_key_hex);
            Ok(())
        }
        Command::Verify { apk, public_key } => {
            let report = commands::verify::run(commands::verify::VerifyArgs {
                apk,
                public_key_hex: public_key,
            })?;
            println!("OK");
            println!("entries={}", report.entries_checked);
            println!("public_key={}", report.public_key_hex);
            Ok(())
        }
    }
}

fn run_toolchain(action: ToolchainAction) -> Result<(), String> {
    match action {
        ToolchainAction::Status { project_dir } => {
            let manager = commands::toolchain::manager(&project_dir)?;
            let status = commands::toolchain::status(&manager);
            println!("install_root={}", status.install_root.display());
            for (component, state) in &status.components {
                match state {
                    droidforge_toolchain::ComponentStatus::Installed { path, .. } => {
                        println!("{}: installed at {}", component, path.display())
                    }
                    droidforge_toolchain::ComponentStatus::NotInstalled { reason } => {
                        println!("{}: missing ({})", component, reason)
                    }
                }
            }
            for tool in &status.tools {
                match &tool.path {
                    Some(path) => println!("{}: {} [{}]", tool.tool, path.display(), tool.probe.describe()),
                    None => println!("{}: not found", tool.tool),
                }
            }
            Ok(())
        }
        ToolchainAction::Install {
            project_dir,
            components,
        } => {
            let manager = commands::toolchain::manager(&project_dir)?;
            let components = commands::toolchain::parse_components(&components)?;
            let report = commands::toolchain::install(&manager, &components)?;
            for (component, state) in &report.statuses {
                if let droidforge_toolchain::ComponentStatus::Installed { path, source } = state {
                    println!("{}={} ({})", component, path.display(), source);
                }
            }
            Ok(())
        }
        ToolchainAction::Doctor { project_dir } => {
            let manager = commands::toolchain::manager(&project_dir)?;
            let lines = commands::toolchain::doctor(&manager);
            let mut failed = 0;
            for line in &lines {
                match &line.result {
                    Ok(version) => println!("{}: ok {}", line.tool, version),
                    Err(reason) => {
                        failed += 1;
                        println!("{}: FAILED {} ({})", line.tool, reason, line.path.display())
                    }
                }
            }
            if failed == 0 {
                Ok(())
            } else {
                exit_with_error(&format!("{} tools failed their smoke test", failed))
            }
        }
    }
}

fn exit_with_error(message: &str) -> Result<(), String> {
    eprintln!("{}", message);
    std::process::exit(1);
}
