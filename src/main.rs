use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use audioport::api::{build_http_client, SearchOutcome, SearchPayload, SyncClient};
use audioport::feed::FeedNormalizer;
use audioport::storage::{ContentStager, RetentionSweeper};
use audioport::{AudioType, Config, ImportItem, ImportSummary, Importer, SubmissionRecord};

#[derive(Parser, Debug)]
#[command(
    name = "audioport",
    about = "Stage audio and podcast feeds and submit them to a transcript backend"
)]
struct Args {
    /// Config file (defaults to ~/.config/audioport/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy files into the upload directory and print their content keys
    Stage {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the records a podcast feed would produce
    Feed { url: String },
    /// Submit files, audio URLs or a feed to the backend
    Import {
        /// Local audio files to stage and upload
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,
        /// Remote audio files the backend downloads itself
        #[arg(long = "url", value_name = "URL")]
        urls: Vec<String>,
        /// Podcast feed whose episodes are imported
        #[arg(long, value_name = "URL")]
        feed: Option<String>,
        /// Title for uploaded files and audio URLs
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        /// Category (defaults to the first configured one)
        #[arg(long)]
        category: Option<String>,
        /// Meeting, Media or Generic (files default to Meeting, URLs to Media)
        #[arg(long)]
        audio_type: Option<AudioType>,
        /// Recording date, RFC 3339 or YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        recorded: Option<DateTime<Utc>>,
        /// Duration in seconds; replaces the value measured from the MP3
        #[arg(long, value_name = "SECONDS")]
        duration: Option<f64>,
    },
    /// Check whether the backend is reachable
    Health,
    /// Query the backend's transcripts
    Search {
        /// Keyword query
        query: String,
        /// Semantic query (defaults to the keyword query)
        #[arg(long)]
        semantic: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_parser = parse_date)]
        from: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_date)]
        to: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    /// Run one retention pass over the upload directory
    Sweep,
    /// Run the retention sweeper until interrupted
    Watch,
    /// Add a category to the config file
    AddCategory { name: String },
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| format!("'{raw}' is neither RFC 3339 nor YYYY-MM-DD"))
}

fn config_path(args: &Args) -> Result<PathBuf> {
    match &args.config {
        Some(path) => Ok(path.clone()),
        None => Config::default_path().context("HOME environment variable not set"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let path = config_path(&args)?;
    let mut config = Config::load(&path)
        .with_context(|| format!("Failed to load config from '{}'", path.display()))?;

    match args.command {
        Command::Stage { files } => {
            let stager = ContentStager::new(&config.upload_dir);
            for staged in stager.stage(&files)? {
                println!(
                    "{}  {}  {}",
                    staged.content_key,
                    staged.original_name,
                    staged.storage_path.display()
                );
            }
        }
        Command::Feed { url } => {
            let normalizer = FeedNormalizer::from_config(build_http_client()?, &config);
            for record in normalizer.normalize(&url).await? {
                println!(
                    "{}  {}  {}",
                    record.recording_time,
                    record.title,
                    record.source_url().unwrap_or("-")
                );
            }
        }
        Command::Import {
            files,
            urls,
            feed,
            title,
            summary,
            category,
            audio_type,
            recorded,
            duration,
        } => {
            if files.is_empty() && urls.is_empty() && feed.is_none() {
                bail!("Nothing to import: pass --file, --url or --feed");
            }
            let http = build_http_client()?;
            let category = category.unwrap_or_else(|| config.default_category());
            let stager = ContentStager::new(&config.upload_dir);

            let mut items = Vec::new();
            if !files.is_empty() {
                for staged in stager.stage(&files)? {
                    items.push(ImportItem::from_staged(staged, category.clone()));
                }
            }
            for url in urls {
                items.push(ImportItem::new(SubmissionRecord::from_url(url, category.clone())));
            }
            for item in items.iter_mut() {
                if let Some(audio_type) = audio_type {
                    item.record.audio_type = audio_type;
                }
                if let Some(title) = &title {
                    item.record.title = title.clone();
                }
                if let Some(summary) = &summary {
                    item.record.summary = summary.clone();
                }
                if let Some(recorded) = &recorded {
                    item.record.recording_time = audioport::util::to_iso_utc(recorded);
                }
                if let Some(duration) = duration {
                    item.record.duration_seconds = duration;
                }
            }
            if let Some(feed) = feed {
                let normalizer = FeedNormalizer::from_config(http.clone(), &config);
                items.extend(normalizer.normalize(&feed).await?.into_iter().map(ImportItem::new));
            }

            let client = SyncClient::with_http_client(http, &config)?;
            let report = Importer::new(client, stager).import(items).await;
            println!("{}", report.summary);
            if !matches!(report.summary, ImportSummary::Imported { .. }) {
                std::process::exit(1);
            }
        }
        Command::Health => {
            let client = SyncClient::new(&config)?;
            if client.health().await {
                println!("Backend at {} is healthy", config.api_base_url);
            } else {
                bail!("Backend at {} is not healthy", config.api_base_url);
            }
        }
        Command::Search {
            query,
            semantic,
            category,
            from,
            to,
            limit,
        } => {
            let client = SyncClient::new(&config)?;
            let semantic = semantic.unwrap_or_else(|| query.clone());
            let category = category.unwrap_or_else(|| config.default_category());
            let payload = SearchPayload::new(query, semantic, category, from, to, limit);

            match client.search(&payload).await {
                SearchOutcome::Found(response) => {
                    for audio in &response.full_audio_data {
                        println!("{}  {}  {}", audio.recording_date, audio.title, audio.audiofile_hash);
                    }
                    for segment in &response.top_k_segments {
                        println!(
                            "  [{:.1}s-{:.1}s] {}",
                            segment.start_in_sec, segment.end_in_sec, segment.transcript
                        );
                    }
                }
                SearchOutcome::Rejected(message) | SearchOutcome::TransportError(message) => {
                    bail!(message)
                }
            }
        }
        Command::Sweep => {
            let report = RetentionSweeper::from_config(&config).run_once().await;
            println!(
                "scanned {}, deleted {}, kept {}, vanished {}, failed {}",
                report.scanned, report.deleted, report.kept, report.vanished, report.failed
            );
        }
        Command::Watch => {
            let handle = RetentionSweeper::from_config(&config).spawn();
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            handle.shutdown().await;
        }
        Command::AddCategory { name } => {
            if config.extend_categories(&name) {
                config
                    .save(&path)
                    .with_context(|| format!("Failed to save config to '{}'", path.display()))?;
                println!("Categories: {}", config.categories_csv());
            } else {
                println!("Category already present");
            }
        }
    }

    Ok(())
}
