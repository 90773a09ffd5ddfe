//! Storefront CLI - browse the catalog, search and read review summaries
//!
//! Usage:
//!   storefront categories                     List categories
//!   storefront genders                        List genders
//!   storefront products <category>            List products of a category
//!   storefront search --text "blue jeans"     Search by product name
//!   storefront search --image shoe.jpg        Search by a similar image
//!   storefront review <product_id>            Show reviews and their summary
//!   storefront image <product_id> -o out.jpg  Download a product image
//!
//! Database settings are read from `DB_USER`, `DB_HOST`, `DB_PORT`, `DB_NAME`
//! and `DB_PASSWORD` unless given as flags.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use storefront::{
    Notice, NoticeLevel, ReviewPage, SearchPage, Session, Storefront, StorefrontArgs,
    StorefrontError, UploadedImage,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "storefront")]
#[command(about = "Storefront - product search and review summaries")]
#[command(version)]
struct Cli {
    /// Print views as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    settings: StorefrontArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List product categories
    Categories,

    /// List genders usable as a search filter
    Genders,

    /// List products of a category
    Products {
        /// Category name
        category: String,

        /// Maximum results
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Similarity search by text or image
    Search(SearchArgs),

    /// Show a product with its reviews and generated summary
    Review {
        /// Product ID
        id: String,
    },

    /// Download a product image
    Image {
        /// Product ID
        id: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Search text
    #[arg(short, long, required_unless_present = "image", conflicts_with = "image")]
    text: Option<String>,

    /// Image file to search with (jpg, jpeg or png)
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Restrict results to a gender
    #[arg(short, long)]
    gender: Option<String>,

    /// Write fetched result images into this directory
    #[arg(long)]
    save_images: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,storefront=debug"
    } else {
        "warn,storefront=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli
        .settings
        .into_config()
        .context("invalid configuration")?;
    let storefront = Storefront::connect(config)
        .await
        .context("could not reach the database")?;

    let result = match cli.command {
        Commands::Categories => cmd_categories(&storefront, cli.json).await,
        Commands::Genders => cmd_genders(&storefront, cli.json).await,
        Commands::Products { category, limit } => {
            cmd_products(&storefront, &category, limit, cli.json).await
        }
        Commands::Search(args) => cmd_search(&storefront, args, cli.json).await,
        Commands::Review { id } => cmd_review(&storefront, &id, cli.json).await,
        Commands::Image { id, output } => cmd_image(&storefront, &id, &output).await,
    };

    storefront.close().await;
    result
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        let line = match notice.level {
            NoticeLevel::Info => notice.message.normal(),
            NoticeLevel::Warning => notice.message.yellow(),
            NoticeLevel::Error => notice.message.red(),
        };
        eprintln!("{}", line);
    }
}

async fn cmd_categories(storefront: &Storefront, json: bool) -> anyhow::Result<()> {
    let categories = storefront.catalog().list_categories().await?;
    if json {
        return print_json(&categories);
    }
    if categories.is_empty() {
        println!("{}", "No categories found".yellow());
        return Ok(());
    }
    for category in categories {
        println!("{}", category);
    }
    Ok(())
}

async fn cmd_genders(storefront: &Storefront, json: bool) -> anyhow::Result<()> {
    let genders = storefront.catalog().list_genders().await?;
    if json {
        return print_json(&genders);
    }
    println!("{}", "None".dimmed());
    for gender in genders {
        println!("{}", gender);
    }
    Ok(())
}

async fn cmd_products(
    storefront: &Storefront,
    category: &str,
    limit: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let limit = limit.unwrap_or(storefront.config().catalog_page_size);
    let tiles = storefront
        .catalog()
        .list_products_by_category(category, limit)
        .await?;

    if json {
        return print_json(&tiles);
    }
    if tiles.is_empty() {
        println!("{}", "No image available".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("{} products in {}:", tiles.len(), category)
            .bold()
            .green()
    );
    println!();
    for tile in tiles {
        println!(
            "  {} {} ({})",
            tile.product.product_id.cyan(),
            tile.product.display_name,
            tile.product.gender.dimmed()
        );
    }
    Ok(())
}

async fn cmd_search(storefront: &Storefront, args: SearchArgs, json: bool) -> anyhow::Result<()> {
    let mut session = Session::new();
    storefront
        .select_gender(&mut session, args.gender.as_deref())
        .await?;

    let page = match (args.text, args.image) {
        (Some(text), _) => {
            storefront.set_query(&mut session, &text);
            storefront.search_text(&mut session).await?
        }
        (None, Some(path)) => {
            let image = UploadedImage::from_path(&path)
                .with_context(|| format!("cannot use {} for search", path.display()))?;
            session.upload_image(image);
            storefront.search_image(&mut session).await?
        }
        (None, None) => anyhow::bail!("pass --text or --image"),
    };

    if let Some(dir) = &args.save_images {
        save_images(&page, dir)?;
    }

    if json {
        return print_json(&page);
    }
    print_search_page(&page);
    Ok(())
}

fn save_images(page: &SearchPage, dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    for row in &page.rows {
        if let Some(bytes) = &row.image_bytes {
            std::fs::write(dir.join(&row.image_key), bytes)?;
        }
    }
    Ok(())
}

fn print_search_page(page: &SearchPage) {
    print_notices(&page.notices);
    if page.rows.is_empty() {
        return;
    }

    println!(
        "{}",
        format!(
            "Found {} results in {} ms:",
            page.rows.len(),
            page.elapsed_ms
        )
        .bold()
        .green()
    );
    println!();

    for (i, row) in page.rows.iter().enumerate() {
        println!(
            "{}. {} ({} - score: {:.4})",
            i + 1,
            row.product.display_name,
            row.product.product_id.cyan(),
            row.score
        );
        println!("   Review: {}", row.review_link.dimmed());
    }
}

async fn cmd_review(storefront: &Storefront, id: &str, json: bool) -> anyhow::Result<()> {
    let page = storefront.review_page(Some(id)).await?;
    if json {
        return print_json(&page);
    }
    print_review_page(&page);
    Ok(())
}

fn print_review_page(page: &ReviewPage) {
    print_notices(&page.notices);
    let Some(product) = &page.product else {
        return;
    };

    println!("{}", product.display_name.bold().underline());
    println!("  ID:        {}", product.product_id.cyan());
    println!("  Category:  {}", product.category);
    println!("  Gender:    {}", product.gender);
    println!();

    if let Some(summary) = &page.summary.summary_text {
        println!("{}", "Summary:".bold());
        println!("  {}", summary);
    }
    if !page.summary.labels.is_empty() {
        println!("{}", "Labels:".bold());
        println!("  {}", page.summary.labels.join(", ").cyan());
    }

    println!();
    println!(
        "{}",
        format!(
            "Showing {} of {} reviews:",
            page.reviews.len(),
            page.review_count
        )
        .bold()
    );
    for review in &page.reviews {
        let stars = "*".repeat(review.rating.clamp(0, 5) as usize);
        let when = review
            .timestamp
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "  {} {} {}",
            stars.yellow(),
            review.user_id.dimmed(),
            when.dimmed()
        );
        println!("    {}", review.review_text);
    }
}

async fn cmd_image(storefront: &Storefront, id: &str, output: &Path) -> anyhow::Result<()> {
    match storefront.image(id).await {
        Ok(bytes) => {
            std::fs::write(output, &bytes)?;
            println!(
                "{}",
                format!("Saved {} bytes to {}", bytes.len(), output.display()).green()
            );
            Ok(())
        }
        Err(StorefrontError::NotFound(what)) => {
            println!("{}", format!("Image '{}' not found", what).red());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
