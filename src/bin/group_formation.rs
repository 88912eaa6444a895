// Group formation CLI
//
// Purpose: Preview or commit production groups for one cluster/season/year
// from a directory of farm-management CSV exports
// Usage: cargo run --release --bin group_formation -- \
//            <preview|commit|ungrouped> <data-dir> <cluster-id> <season-id> <year> [params.json]

use anyhow::{bail, Context, Result};
use rice_grouping::data::load_farm_data;
use rice_grouping::response::{form_groups_response, preview_response, ungrouped_response};
use rice_grouping::{CancellationToken, GroupFormationEngine, GroupingParams, GroupingRequest, InMemoryGroupStore};
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const USAGE: &str =
    "usage: group_formation <preview|commit|ungrouped> <data-dir> <cluster-id> <season-id> <year> [params.json]";

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rice_grouping=info,group_formation=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 5 {
        bail!(USAGE);
    }

    let command = args[0].as_str();
    let data_dir = Path::new(&args[1]);
    let cluster_id = Uuid::parse_str(&args[2]).with_context(|| format!("Invalid cluster id: {}", args[2]))?;
    let season_id = Uuid::parse_str(&args[3]).with_context(|| format!("Invalid season id: {}", args[3]))?;
    let year: i32 = args[4].parse().with_context(|| format!("Invalid year: {}", args[4]))?;
    let params = match args.get(5) {
        Some(path) => GroupingParams::load(Path::new(path))?,
        None => GroupingParams::default(),
    };

    tracing::info!("Configuration:");
    tracing::info!("  data dir: {:?}", data_dir);
    tracing::info!("  cluster: {}, season: {}, year: {}", cluster_id, season_id, year);
    tracing::info!("  params: {:?}", params);

    let start = Instant::now();
    let data = load_farm_data(data_dir)?;
    tracing::info!("Loaded {} plots in {:.2?}", data.plot_count(), start.elapsed());

    let engine = GroupFormationEngine::new();
    let request = GroupingRequest::new(cluster_id, season_id, year, params);
    let cancel = CancellationToken::new();

    let output = match command {
        "preview" => {
            let result = engine.preview(&data, &request, &cancel)?;
            serde_json::to_string_pretty(&preview_response(&result))?
        }
        "ungrouped" => {
            let result = engine.preview(&data, &request, &cancel)?;
            serde_json::to_string_pretty(&ungrouped_response(&result))?
        }
        "commit" => {
            let store = InMemoryGroupStore::new();
            let outcome = engine.commit(&data, &store, &request, &cancel)?;
            serde_json::to_string_pretty(&form_groups_response(&outcome))?
        }
        other => bail!("Unknown command '{}'\n{}", other, USAGE),
    };

    println!("{}", output);
    tracing::info!("Done in {:.2?}", start.elapsed());
    Ok(())
}
