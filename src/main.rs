use anyhow::{Context, Result};
use clap::Parser;
use fundafinder::funda::{FsBlobStore, FundaSearch, GoogleTranslator, HttpPageFetcher, SearchParameters};
use fundafinder::orchestrator::{RunOptions, RunOrchestrator};
use fundafinder::repository::{CsvRepository, ListingRepository};
use fundafinder::tui::RunTUI;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Fundafinder - incremental funda.nl listing tracker")]
struct Args {
    /// Path to the CSV dataset
    #[clap(short, long, default_value = "listings.csv")]
    output: String,

    /// Directory for photos and descriptions
    #[clap(long, default_value = "data")]
    data_dir: String,

    /// Minimum asking price
    #[clap(long, default_value = "400000")]
    price_min: Option<u64>,

    /// Maximum asking price
    #[clap(long, default_value = "700000")]
    price_max: Option<u64>,

    /// Minimum number of bedrooms
    #[clap(long, default_value = "3")]
    bedrooms_min: Option<u32>,

    /// Minimum living area in m²
    #[clap(long, default_value = "100")]
    area_min: Option<u32>,

    /// City to search in
    #[clap(long, default_value = "amsterdam")]
    city: String,

    /// Search radius around the city, e.g. "2km"
    #[clap(long, default_value = "2km")]
    within_distance: Option<String>,

    /// Only listings published within this many days
    #[clap(long, default_value = "5")]
    publication_days: Option<u32>,

    /// Maximum number of search result pages
    #[clap(short, long)]
    max_pages: Option<usize>,

    /// Maximum number of listings to process
    #[clap(short = 'i', long)]
    max_items: Option<usize>,

    /// Skip photo downloads for new listings
    #[clap(long)]
    no_photos: bool,

    /// Skip translating descriptions
    #[clap(long)]
    no_translate: bool,

    /// Pause between listings in milliseconds
    #[clap(long, default_value = "500")]
    delay_ms: u64,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    /// Only log, no terminal report
    #[clap(short, long)]
    quiet: bool,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "fundafinder=debug" } else { "fundafinder=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    println!("Fundafinder - funda.nl listing tracker");
    println!("======================================");

    let mut repo = CsvRepository::open(&args.output)?;

    let params = SearchParameters {
        price_min: args.price_min,
        price_max: args.price_max,
        bedrooms_min: args.bedrooms_min,
        area_min: args.area_min,
        city: args.city.to_lowercase(),
        within_distance: args.within_distance.clone(),
        publication_days: args.publication_days,
    };

    let options = RunOptions {
        max_pages: args.max_pages,
        max_items: args.max_items,
        download_photos: !args.no_photos,
        translate: !args.no_translate,
        delay_ms: args.delay_ms,
        show_progress: !args.quiet,
        ..RunOptions::default()
    };

    let orchestrator = RunOrchestrator::new(
        FundaSearch::new().context("Failed to set up search client")?,
        HttpPageFetcher::new().context("Failed to set up page fetcher")?,
        GoogleTranslator::new().context("Failed to set up translator")?,
        FsBlobStore::new(&args.data_dir),
        options,
    );

    let mut run_tui = RunTUI::new();
    let tui = if args.quiet {
        None
    } else if let Err(e) = run_tui.show_summary(repo.len()) {
        warn!("Terminal report disabled after write error: {}", e);
        None
    } else {
        Some(&mut run_tui)
    };

    let report = orchestrator.run(&params, &mut repo, tui)?;

    println!("\n=== Summary ===");
    println!("Search pages requested: {}", report.pages_requested);
    println!("Listings processed: {}", report.listings_seen);
    println!(
        "New: {}, price updates: {}, unchanged: {}",
        report.new, report.price_changed, report.unchanged
    );
    if !report.failures.is_empty() {
        println!("Failed listings:");
        for failure in &report.failures {
            println!("  {}: {}", failure.url, failure.error);
        }
    }
    if let Some(error) = &report.enumeration_error {
        println!("Search stopped early: {}", error);
    }
    println!("Total records in dataset: {}", repo.len());
    println!("Saved to: {}", args.output);

    Ok(())
}
