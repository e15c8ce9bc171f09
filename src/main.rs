use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use wikicorpus::batch;
use wikicorpus::cache::IndexCache;
use wikicorpus::index::SegmentIndex;
use wikicorpus::locator;
use wikicorpus::models::OutputFormat;
use wikicorpus::WikiArchive;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "wikicorpus")]
#[command(about = "Extract single articles from Wikipedia multistream dumps")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which dump and index file would be used
    Locate(DumpArgs),
    /// Build the segment index and store it in the cache
    Index(IndexArgs),
    /// Extract one article by title or URL
    Extract(ExtractArgs),
    /// Extract every article of a tab-separated request list
    Batch(BatchArgs),
}

#[derive(Args)]
struct DumpArgs {
    /// Directory containing the multistream dump and its index
    #[arg(short, long)]
    dump_dir: PathBuf,

    /// Language code of the dump, for example "nl" or "en"
    #[arg(short, long)]
    language: String,
}

#[derive(Args)]
struct CacheArgs {
    /// Directory for segment index caches
    #[arg(long, default_value = wikicorpus::config::DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Rebuild the index from the index file instead of using the cache
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct IndexArgs {
    #[command(flatten)]
    dump: DumpArgs,

    #[command(flatten)]
    cache: CacheArgs,
}

#[derive(Args)]
struct ExtractArgs {
    #[command(flatten)]
    dump: DumpArgs,

    #[command(flatten)]
    cache: CacheArgs,

    /// Article title as it appears in the index
    #[arg(long, conflicts_with = "url", required_unless_present = "url")]
    title: Option<String>,

    /// Wikipedia article URL
    #[arg(long)]
    url: Option<String>,

    /// External id to tag the record with (e.g. a Wikidata id)
    #[arg(long, default_value = "")]
    id: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Xml)]
    format: OutputFormat,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct BatchArgs {
    #[command(flatten)]
    dump: DumpArgs,

    #[command(flatten)]
    cache: CacheArgs,

    /// Tab-separated file of `external_id<TAB>title_or_url` rows
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for extracted articles
    #[arg(short, long)]
    output: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Xml)]
    format: OutputFormat,

    /// Extract but don't write output files
    #[arg(long)]
    dry_run: bool,
}

fn open_archive(dump: &DumpArgs, cache: &CacheArgs) -> Result<WikiArchive> {
    let index_cache = IndexCache::new(&cache.cache_dir);
    let cache = (!cache.no_cache).then_some(&index_cache);
    WikiArchive::open(&dump.dump_dir, &dump.language, cache).with_context(|| {
        format!(
            "Failed to open '{}' dump in {:?}",
            dump.language, dump.dump_dir
        )
    })
}

fn run_locate(args: DumpArgs) -> Result<()> {
    let archive = locator::locate(&args.dump_dir, &args.language)?;
    println!("Dump:  {}", archive.dump_path.display());
    println!("Index: {}", archive.index_path.display());
    println!("Date:  {}", archive.date);
    Ok(())
}

fn run_index(args: IndexArgs) -> Result<()> {
    let archive = locator::locate(&args.dump.dump_dir, &args.dump.language)?;
    let cache = IndexCache::new(&args.cache.cache_dir);

    let start = Instant::now();
    let index = if args.cache.no_cache {
        info!("Cache disabled, building fresh index");
        let index = SegmentIndex::build(&archive)?;
        cache
            .store(&archive.index_path, &index)
            .context("Failed to save index cache")?;
        index
    } else {
        cache.load_or_build(&archive)?
    };

    println!("Titles:   {}", index.len());
    println!("Segments: {}", index.segment_count());
    println!("Cache:    {}", cache.cache_path(&archive.index_path).display());
    println!("Time:     {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let archive = open_archive(&args.dump, &args.cache)?;

    let record = match (&args.title, &args.url) {
        (Some(title), _) => archive.extract(title, &args.id)?,
        (None, Some(url)) => archive.extract_url(url, &args.id)?,
        (None, None) => bail!("Either --title or --url is required"),
    };
    let rendered = record.render(args.format)?;

    match args.output {
        Some(path) => write_output(&path, &rendered)?,
        None => println!("{}", rendered),
    }
    Ok(())
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write: {:?}", path))
}

fn run_batch(args: BatchArgs) -> Result<()> {
    let archive = open_archive(&args.dump, &args.cache)?;
    let requests = batch::read_requests(&args.input)?;

    let start = Instant::now();
    let stats = batch::run_batch(
        &archive,
        &requests,
        &args.output,
        args.format,
        args.dry_run,
    )?;

    println!();
    println!("=== Summary ===");
    println!("Extraction time:    {:.2}s", start.elapsed().as_secs_f64());
    println!("Requests:           {}", stats.requested());
    println!("Articles extracted: {}", stats.extracted());
    println!("Unknown titles:     {}", stats.unknown());
    println!("Failures:           {}", stats.failed());
    println!("Bytes written:      {}", stats.bytes());

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Locate(args) => run_locate(args),
        Commands::Index(args) => run_index(args),
        Commands::Extract(args) => run_extract(args),
        Commands::Batch(args) => run_batch(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
