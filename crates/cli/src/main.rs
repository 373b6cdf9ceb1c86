//! `cuekit` command line tool.
//!
//! Definitions are read as JSON (the serde form of `Definition`):
//!
//! ```text
//! cuekit cue webservice.json
//! cuekit manifest scaler.json --format yaml
//! cuekit render webservice.json --context ctx.json
//! cuekit export defs/*.json
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use cuekit_compiler::{Definition, EmitOptions, Registry};
use cuekit_eval::{render_template, TestContext};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "cuekit", version, about = "Compile and test CUE definitions")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ManifestFormat {
    Yaml,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the CUE text of a definition
    Cue {
        file: PathBuf,
        /// Skip the formatter pass
        #[arg(long, action = ArgAction::SetTrue)]
        raw: bool,
    },
    /// Print the Kubernetes manifest of a definition
    Manifest {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ManifestFormat::Yaml)]
        format: ManifestFormat,
    },
    /// Render a definition's template against a test context
    Render {
        file: PathBuf,
        /// JSON test context; defaults apply when omitted
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Register definitions and print the registry JSON
    Export {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "cuekit=info",
        1 => "cuekit=debug,cuekit_compiler=debug,cuekit_eval=debug",
        _ => "cuekit=trace,cuekit_compiler=trace,cuekit_eval=trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_definition(path: &Path) -> Result<Definition> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let definition: Definition = serde_json::from_str(&source)
        .with_context(|| format!("{} is not a valid definition", path.display()))?;
    debug!(name = %definition.name, kind = definition.kind.as_str(), "loaded definition");
    Ok(definition)
}

fn read_context(path: Option<&Path>) -> Result<TestContext> {
    let Some(path) = path else {
        return Ok(TestContext::new());
    };
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&source)
        .with_context(|| format!("{} is not a valid test context", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Cue { file, raw } => {
            let definition = read_definition(&file)?;
            let opts = EmitOptions {
                format: !raw,
                ..EmitOptions::default()
            };
            print!("{}", definition.to_cue_with(&opts)?);
        }
        Commands::Manifest { file, format } => {
            let definition = read_definition(&file)?;
            match format {
                ManifestFormat::Yaml => print!("{}", definition.to_yaml()?),
                ManifestFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&definition.to_manifest()?)?)
                }
            }
        }
        Commands::Render { file, context } => {
            let definition = read_definition(&file)?;
            let ctx = read_context(context.as_deref())?.build();
            let rendered = render_template(&definition.template, &ctx)
                .with_context(|| format!("failed to render {}", definition.name))?;
            info!(
                name = %definition.name,
                outputs = rendered.outputs.len(),
                "rendered template"
            );
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        Commands::Export { files } => {
            let mut registry = Registry::new();
            for file in &files {
                registry.register(read_definition(file)?)?;
            }
            info!(count = registry.len(), "exporting registry");
            println!("{}", registry.to_json()?);
        }
    }
    Ok(())
}
