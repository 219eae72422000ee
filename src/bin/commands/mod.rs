use artist_atlas::AtlasClient;
use clap::{Subcommand, ValueEnum};
use serde::Serialize;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ProviderArg {
    /// Similarity and tag provider
    Lastfm,
    /// Catalog and media provider
    Deezer,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search artists by name
    ///
    /// Usage examples:
    /// # Deezer catalog search
    /// artist-atlas search "Boris"
    ///
    /// # Last.fm search, ten results
    /// artist-atlas search "Boris" --provider lastfm --limit 10
    Search {
        query: String,

        #[arg(long, value_enum, default_value = "deezer")]
        provider: ProviderArg,

        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Show one artist (Last.fm by name, Deezer by id)
    Artist {
        /// Artist name (lastfm) or numeric id (deezer)
        key: String,

        #[arg(long, value_enum, default_value = "deezer")]
        provider: ProviderArg,
    },

    /// List artists similar to a named artist, with scores (Last.fm)
    Similar {
        name: String,

        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show genre tags for a named artist (Last.fm)
    Tags {
        name: String,

        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Show an artist's most popular tracks
    ///
    /// Usage examples:
    /// # Deezer top tracks by artist id, with previews
    /// artist-atlas top-tracks 27
    ///
    /// # Last.fm top tracks by artist name
    /// artist-atlas top-tracks "Daft Punk" --provider lastfm
    TopTracks {
        /// Artist name (lastfm) or numeric id (deezer)
        key: String,

        #[arg(long, value_enum, default_value = "deezer")]
        provider: ProviderArg,

        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// List catalog artists related to a Deezer artist id
    Related { id: String },

    /// Resolve a free-text name to a single Deezer artist
    Match { name: String },

    /// Resolve many names to Deezer artists at once
    ///
    /// Usage examples:
    /// # Resolve three names
    /// artist-atlas enrich "Sunn O)))" "Earth" "Melvins"
    ///
    /// # Enrich the similar list of an artist directly
    /// artist-atlas enrich --similar-to "Boris"
    Enrich {
        names: Vec<String>,

        /// Use the Last.fm similar artists of this artist as the name list
        #[arg(long)]
        similar_to: Option<String>,
    },
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn execute_command(
    command: Commands,
    client: &AtlasClient,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Search {
            query,
            provider,
            limit,
        } => {
            let artists = match provider {
                ProviderArg::Lastfm => client.lastfm().search_artists(&query, limit).await,
                ProviderArg::Deezer => client.deezer().search_artists(&query, limit).await,
            };
            log::info!("{} artists found for {query:?}", artists.len());
            print_json(&artists)
        }
        Commands::Artist { key, provider } => {
            let artist = match provider {
                ProviderArg::Lastfm => client.lastfm().get_artist(&key).await,
                ProviderArg::Deezer => client.deezer().get_artist(&key).await,
            };
            print_json(&artist)
        }
        Commands::Similar { name, limit } => {
            print_json(&client.lastfm().get_similar_artists(&name, limit).await)
        }
        Commands::Tags { name, limit } => print_json(&client.lastfm().get_tags(&name, limit).await),
        Commands::TopTracks {
            key,
            provider,
            limit,
        } => {
            let tracks = match provider {
                ProviderArg::Lastfm => client.lastfm().get_top_tracks(&key, limit).await,
                ProviderArg::Deezer => client.deezer().get_artist_top_tracks(&key, limit).await,
            };
            print_json(&tracks)
        }
        Commands::Related { id } => print_json(&client.deezer().get_related_artists(&id).await),
        Commands::Match { name } => {
            let artist = client.deezer().find_artist_by_name(&name).await;
            if artist.is_none() {
                eprintln!("No confident catalog match for {name:?}");
            }
            print_json(&artist)
        }
        Commands::Enrich { names, similar_to } => {
            let mut names = names;
            if let Some(seed) = similar_to {
                let similar = client.lastfm().get_similar_artists(&seed, 50).await;
                names.extend(similar.into_iter().map(|s| s.artist.name));
            }
            if names.is_empty() {
                return Err("no names given; pass names or --similar-to".into());
            }
            let enriched = client.deezer().enrich_artists(&names).await;
            log::info!("{} of {} names matched", enriched.len(), names.len());
            print_json(&enriched)
        }
    }
}
