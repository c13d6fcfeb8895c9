use clap::{Parser, Subcommand};
use jxlsmig::cli;
use jxlsmig::error::MigrateResult;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jxlsmig")]
#[command(about = "Migrate JXLS 1.x Excel templates to JXLS 2.x syntax.")]
#[command(long_about = "jxlsmig - JXLS 1.x → 2.x template migration

Rewrites legacy tag directives embedded in spreadsheet cells into the
comment-based syntax JXLS 2.x reads, preserving layout and formatting.

COMMANDS:
  migrate - Convert templates (single file or a whole directory tree)
  scan    - List the directives found in a template
  detect  - Print the sniffed container format of a file

EXAMPLES:
  jxlsmig migrate templates/                   # Migrate a directory tree
  jxlsmig migrate templates/ --keep-extension  # Keep .xls names on output
  jxlsmig migrate report.xls -f -o out/        # Migrate one file
  jxlsmig migrate templates/ --dry-run         # Report without writing
  jxlsmig scan templates/invoice.xls           # Inspect a template
  jxlsmig detect templates/invoice.xls         # Check the real format")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Migrate JXLS 1.x templates to 2.x syntax.

Directory mode (default): recursively collects .xls/.xlsx files under INPUT
(skipping ~$ lock files and hidden directories), migrates each into the
output directory mirroring the relative tree, and writes Markdown + JSON
reports next to the migrated files. Per-file failures are recorded and the
batch continues.

Single-file mode (-f, or INPUT is a file): migrates one file into the
output directory, named after the source.

Output is always modern .xlsx bytes. Format detection reads the file
header, not the extension; a wrong guess is retried under the other reader
before the file is declared failed.

Use --dry-run to scan and report without writing any files.")]
    /// Migrate JXLS 1.x templates to 2.x syntax
    Migrate {
        /// Input directory or file path
        input: PathBuf,

        /// Output directory (default: <INPUT>_migrated)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Treat INPUT as a single file instead of a directory
        #[arg(short = 'f', long)]
        file: bool,

        /// Preview changes without writing any files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Keep the source extension on output names (bytes are always .xlsx)
        #[arg(long)]
        keep_extension: bool,

        /// Show verbose migration steps
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the directives found in a template
    Scan {
        /// Path to the spreadsheet to inspect
        file: PathBuf,
    },

    /// Print the detected container format of a file
    Detect {
        /// Path to the spreadsheet to sniff
        file: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "jxlsmig=debug" } else { "jxlsmig=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .init();
}

fn main() -> MigrateResult<()> {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Commands::Migrate { verbose: true, .. });
    init_tracing(verbose);

    match cli.command {
        Commands::Migrate {
            input,
            output,
            file,
            dry_run,
            keep_extension,
            verbose,
        } => cli::migrate(input, output, file, dry_run, keep_extension, verbose),

        Commands::Scan { file } => cli::scan(file),

        Commands::Detect { file } => cli::detect(file),
    }
}
