use clap::{Parser, Subcommand};
use webprep::config::{self, BuildConfig};
use webprep::family::{self, AssetFamily};
use webprep::output;
use webprep::pipeline::BatchReport;
use std::path::PathBuf;

/// Shared flags for commands that run a pipeline.
#[derive(clap::Args, Clone, Copy)]
struct RunArgs {
    /// Skip unchanged inputs and prune stale outputs instead of clearing the output root
    #[arg(long)]
    incremental: bool,
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "webprep")]
#[command(about = "Prepare static web assets for deployment")]
#[command(long_about = "\
Prepare static web assets for deployment

Each asset family mirrors its source tree into an output tree:

  src/styles/   → dist/styles/     @imports inlined, lowered, minified
  src/fonts/    → dist/fonts/      subset to WOFF2 (python3 -m fontTools.subset)
  src/images/   → dist/images/     .avif + .webp + re-encoded original, SVGs optimized
  src/images/favicons/<id>/logo.svg
                → dist/favicons/<id>/   favicons, PWA manifest, <head> fragment

Files a family does not recognize are copied unchanged. A file that fails
to transform is copied unchanged and reported; the run carries on.

Set SUBSET to a unicode range list (e.g. U+0000-00FF) to subset fonts.
Set RUST_LOG for detailed logs.

Run 'webprep gen-config' to generate a documented webprep.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file; stock defaults are used when it does not exist
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bundle and minify stylesheets
    Styles(RunArgs),
    /// Subset fonts to WOFF2
    Fonts(RunArgs),
    /// Re-encode raster images and optimize SVGs
    Images(RunArgs),
    /// Generate favicons and the PWA manifest for every variant
    Favicons,
    /// Run every family: styles → fonts → images → favicons
    Build(RunArgs),
    /// Validate the config and list what each family would process
    Check,
    /// Print a stock webprep.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Styles(args) => {
            let config = config::load_config(&cli.config)?;
            run_family(AssetFamily::Styles, &config, args.incremental)?;
        }
        Command::Fonts(args) => {
            let config = config::load_config(&cli.config)?;
            run_family(AssetFamily::Fonts, &config, args.incremental)?;
        }
        Command::Images(args) => {
            let config = config::load_config(&cli.config)?;
            run_family(AssetFamily::Images, &config, args.incremental)?;
        }
        Command::Favicons => {
            let config = config::load_config(&cli.config)?;
            run_family(AssetFamily::Favicons, &config, false)?;
        }
        Command::Build(args) => {
            let config = config::load_config(&cli.config)?;
            let mut failed = 0;
            for family in AssetFamily::ALL {
                failed += run_family(family, &config, args.incremental)?.summary().failed;
            }
            println!("==> Build complete ({} failed)", failed);
        }
        Command::Check => {
            let config = config::load_config(&cli.config)?;
            println!("==> Config is valid: {}", cli.config.display());
            let mut errors = 0;
            for family in AssetFamily::ALL {
                match family::survey(family, &config) {
                    Ok(survey) => output::print_check(&survey),
                    Err(e) => {
                        errors += 1;
                        println!("{}: {}", family, e);
                    }
                }
            }
            if errors > 0 {
                return Err(format!(
                    "{} of {} families cannot run",
                    errors,
                    AssetFamily::ALL.len()
                )
                .into());
            }
            println!("==> Everything can run");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

/// Run one family with live progress, then print its summary.
fn run_family(
    family: AssetFamily,
    config: &BuildConfig,
    incremental: bool,
) -> Result<BatchReport, Box<dyn std::error::Error>> {
    let (source, output_root) = family.roots(config);
    output::print_stage_header(family.name(), &source, &output_root);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = family::run(family, config, incremental, Some(tx));
    printer
        .join()
        .map_err(|_| "output thread panicked".to_string())?;

    let report = result?;
    output::print_summary(&report);
    Ok(report)
}
