use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::Parser;
use folio_core::{
    Config, DiskCacheBackend, Library, LibraryEvent, RemoteFetcher,
    folio_state::{CoverImage, CoverSource, RawEntry},
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file containing the raw album entries to load
    #[arg(long)]
    library: PathBuf,

    /// Configuration file; defaults are used if it does not exist
    #[arg(long, default_value = Config::FILENAME)]
    config: PathBuf,

    /// Sort key to order artists by, instead of the configured one
    #[arg(long)]
    sort: Option<String>,

    /// Reverse the sort order
    #[arg(long)]
    reverse: bool,

    /// Artists to list albums for
    #[arg(long)]
    expand: Vec<String>,

    /// How long to wait for remote covers, in seconds
    #[arg(long, default_value_t = 30)]
    cover_wait_secs: u64,

    /// Write the catalog to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct OutputArtist {
    name: String,
    sort_name: String,
    album_count: u32,
    cover: Option<OutputCover>,
    #[serde(skip_serializing_if = "Option::is_none")]
    albums: Option<Vec<OutputAlbum>>,
}

#[derive(Serialize)]
struct OutputAlbum {
    name: String,
    year: Option<i32>,
    cover: Option<OutputCover>,
}

#[derive(Serialize)]
struct OutputCover {
    source: CoverSource,
    width: u32,
    height: u32,
}
impl OutputCover {
    fn from_image(image: &CoverImage) -> Option<Self> {
        let (width, height) = image.bitmap()?.display.dimensions();
        Some(Self {
            source: image.source().clone(),
            width,
            height,
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("folio=info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let entries: Vec<RawEntry> = serde_json::from_str(
        &std::fs::read_to_string(&args.library)
            .with_context(|| format!("Failed to read {:?}", args.library))?,
    )
    .with_context(|| format!("Failed to parse {:?}", args.library))?;

    let fetcher = RemoteFetcher::new(config.cache.remote_timeout())?;
    let backend = DiskCacheBackend::new(config.cache.dir.clone(), fetcher)?;
    let mut library = Library::from_config(&config, backend)?;

    library.events().subscribe(|event: &LibraryEvent| match event {
        LibraryEvent::LoadProgress { pass, overall, .. } => {
            tracing::debug!("{pass:?}: {:.0}%", overall * 100.0)
        }
        LibraryEvent::LoadFinished {
            artists,
            albums,
            failures,
        } => tracing::info!("Loaded {artists} artists and {albums} albums ({failures} rejected)"),
    });

    library.start_load(entries);
    library.run_until_loaded();
    for failure in library.failures() {
        tracing::warn!("{failure}");
    }

    if args.sort.is_some() || args.reverse {
        library.sort(args.sort.as_deref(), args.reverse)?;
        library.run_until_loaded();
    }
    for artist in &args.expand {
        library
            .expand(artist)
            .with_context(|| format!("Failed to expand {artist}"))?;
    }

    let deadline = Instant::now() + Duration::from_secs(args.cover_wait_secs);
    while !library.is_idle() {
        if Instant::now() >= deadline {
            tracing::warn!("Gave up waiting for covers");
            break;
        }
        library.tick();
        std::thread::sleep(Duration::from_millis(20));
    }

    let model = library.model();
    let output: Vec<OutputArtist> = model
        .filtered()
        .map(|artist| OutputArtist {
            name: artist.name.to_string(),
            sort_name: artist.effective_sort_name().to_string(),
            album_count: artist.album_count,
            cover: model
                .cover_of(&artist.name)
                .and_then(|cover| OutputCover::from_image(&cover)),
            albums: model.children(&artist.name).map(|albums| {
                albums
                    .iter()
                    .map(|album| OutputAlbum {
                        name: album.name.to_string(),
                        year: album.year,
                        cover: model
                            .path_of_album(&album.id())
                            .and_then(|path| model.cover_at(path))
                            .and_then(|cover| OutputCover::from_image(&cover)),
                    })
                    .collect()
            }),
        })
        .collect();

    let json = serde_json::to_string_pretty(&output)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write to {path:?}"))?,
        None => println!("{json}"),
    }

    Ok(())
}
