//! InkGrid CLI

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use inkgrid::core::io::resource_dir;
use inkgrid::{
    Analysis, AnalysisCache, AtlasConfig, AtlasSession, FeatureExtractor, FsBitmapSource, OccurrenceId,
    OccurrenceIndex, ResourceStatus, Size, build_analysis,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Output rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "inkgrid", version)]
#[command(about = "Glyph variant atlas and provenance engine", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to the nearest inkgrid.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Precompute similarity orderings and clusters for every character
    Analyze {
        /// Index resource (index.json)
        index: PathBuf,

        /// Where to write the analysis resource. Defaults to next to the index
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rank occurrences of a character by resemblance to a reference occurrence
    Similar {
        /// Index resource (index.json)
        index: PathBuf,

        /// Character label
        character: String,

        /// Identity of the reference occurrence
        reference: u32,

        /// Show at most this many entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Group occurrences of a character into variant clusters
    Clusters {
        /// Index resource (index.json)
        index: PathBuf,

        /// Character label
        character: String,
    },

    /// Map an occurrence's crop box onto a page shown in a viewer box
    Locate {
        /// Index resource (index.json)
        index: PathBuf,

        /// Occurrence identity
        id: u32,

        /// Natural page size in pixels, as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        natural: Size,

        /// On-screen box size, as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        screen: Size,
    },

    /// Show the column layout of a page
    Page {
        /// Index resource (index.json)
        index: PathBuf,

        /// Page number (image_index)
        page: u32,
    },

    /// Summarize an index
    Stats {
        /// Index resource (index.json)
        index: PathBuf,

        /// Number of most frequent characters to list
        #[arg(short, long, default_value = "10")]
        top: usize,
    },
}

fn parse_size(value: &str) -> std::result::Result<Size, String> {
    let (width, height) = value
        .split_once(|c| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: f64 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}'", width))?;
    let height: f64 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}'", height))?;
    Ok(Size::new(width, height))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<AtlasConfig> {
    match path {
        Some(path) => AtlasConfig::from_file(path).with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(AtlasConfig::discover()?.unwrap_or_default()),
    }
}

async fn open_session(index: &Path, config: AtlasConfig) -> Result<AtlasSession> {
    let session = AtlasSession::open(index, config).await?;
    if let ResourceStatus::Unavailable(reason) = session.index_status() {
        bail!("Index {} is unavailable: {}", index.display(), reason);
    }
    if let ResourceStatus::Unavailable(reason) = session.analysis_status() {
        tracing::info!("Computing analysis live, cached analysis unusable: {}", reason);
    }
    Ok(session)
}

/// Precompute the analysis resource for `index` and write it to `output`,
/// or next to the index when no output is given.
async fn write_analysis(index: &Path, output: Option<PathBuf>, config: &AtlasConfig) -> Result<(AnalysisCache, PathBuf)> {
    let catalogue = OccurrenceIndex::load(index)
        .await
        .with_context(|| format!("Failed to load index {}", index.display()))?;
    let base = resource_dir(index);
    let source = FsBitmapSource::new(&base);
    let extractor = FeatureExtractor::new(config.feature_grid_size);

    let cache = build_analysis(&catalogue, &extractor, &source, config).await?;
    let output = output.unwrap_or_else(|| base.join(&config.analysis_file_name));
    cache
        .write(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(
        "Wrote analysis for {} of {} characters to {}",
        cache.len(),
        catalogue.characters().len(),
        output.display()
    );
    Ok((cache, output))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ids(ids: &[OccurrenceId]) -> String {
    ids.iter().map(|id| format!("#{}", id)).collect::<Vec<_>>().join(" ")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze { index, output } => {
            let (cache, output) = write_analysis(&index, output, &config).await?;

            match cli.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "output": output.display().to_string(),
                    "characters": cache.len(),
                    "feature": cache.feature,
                }))?,
                OutputFormat::Text => println!(
                    "Wrote analysis for {} characters to {}",
                    cache.len(),
                    output.display()
                ),
            }
        }

        Commands::Similar {
            index,
            character,
            reference,
            limit,
        } => {
            let session = open_session(&index, config).await?;
            let mut result = session.rank_similar(&character, OccurrenceId(reference)).await;
            if let (Analysis::Ready(ranking), Some(limit)) = (&mut result, limit) {
                ranking.ranked.truncate(limit);
            }

            match (cli.format, result) {
                (OutputFormat::Json, result) => print_json(&result)?,
                (OutputFormat::Text, Analysis::Unavailable(reason)) => println!("{}: {}", character, reason),
                (OutputFormat::Text, Analysis::Ready(ranking)) => {
                    println!(
                        "{} · reference #{} ({:?})",
                        ranking.character, ranking.reference, ranking.origin
                    );
                    for (rank, entry) in ranking.ranked.iter().enumerate() {
                        match entry.distance {
                            Some(distance) => println!("{:>4}. #{:<6} {:.4}", rank + 1, entry.id, distance),
                            None => println!("{:>4}. #{}", rank + 1, entry.id),
                        }
                    }
                    if !ranking.unranked.is_empty() {
                        println!("unranked: {}", ids(&ranking.unranked));
                    }
                }
            }
        }

        Commands::Clusters { index, character } => {
            let session = open_session(&index, config).await?;
            let result = session.cluster_variants(&character).await;

            match (cli.format, result) {
                (OutputFormat::Json, result) => print_json(&result)?,
                (OutputFormat::Text, Analysis::Unavailable(reason)) => println!("{}: {}", character, reason),
                (OutputFormat::Text, Analysis::Ready(set)) => {
                    println!("{} · {} clusters ({:?})", set.character, set.clusters.len(), set.origin);
                    for cluster in &set.clusters {
                        println!(
                            "  cluster {}: {} members, representative #{}",
                            cluster.id,
                            cluster.len(),
                            cluster.representative
                        );
                        println!("    {}", ids(&cluster.members));
                    }
                    if !set.excluded.is_empty() {
                        println!("excluded: {}", ids(&set.excluded));
                    }
                }
            }
        }

        Commands::Locate {
            index,
            id,
            natural,
            screen,
        } => {
            let session = open_session(&index, config).await?;
            let id = OccurrenceId(id);
            if session.index().get(id).is_none() {
                bail!("No occurrence #{} in {}", id, index.display());
            }
            let highlight = session.locate(id, natural, screen);

            match (cli.format, highlight) {
                (OutputFormat::Json, highlight) => print_json(&serde_json::json!({ "id": id, "highlight": highlight }))?,
                (OutputFormat::Text, Some(rect)) => println!(
                    "#{}: ({:.2}, {:.2}) - ({:.2}, {:.2})",
                    id, rect.x0, rect.y0, rect.x1, rect.y1
                ),
                (OutputFormat::Text, None) => println!("#{}: no highlight (page or viewer size unknown)", id),
            }
        }

        Commands::Page { index, page } => {
            let session = open_session(&index, config).await?;
            let Some(layout) = session.page_layout(page) else {
                bail!("Page {} has no occurrences", page);
            };

            match cli.format {
                OutputFormat::Json => print_json(&layout)?,
                OutputFormat::Text => {
                    println!("page {} ({})", layout.page, layout.image);
                    for column in &layout.columns {
                        let text: String = column.cells.iter().map(|cell| cell.character.as_str()).collect();
                        println!("  col {:>2}: {}", column.col, text);
                    }
                }
            }
        }

        Commands::Stats { index, top } => {
            let session = open_session(&index, config).await?;
            let stats = session.stats(top);

            match cli.format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Text => {
                    println!("{}", if stats.name.is_empty() { "(unnamed)" } else { stats.name.as_str() });
                    println!("  occurrences: {}", stats.occurrences);
                    println!("  characters:  {}", stats.characters);
                    println!("  analyzable:  {}", stats.analyzable_characters);
                    println!("  pages:       {}", stats.pages);
                    for entry in &stats.most_frequent {
                        println!("  {} ×{}", entry.character, entry.count);
                    }
                }
            }
        }
    }

    Ok(())
}
