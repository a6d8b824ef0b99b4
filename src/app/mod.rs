use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use crate::filter::{TagFilter, default_area_filter, default_node_filter};
use crate::mapping::LevelClassifier;
use crate::output::write_poi_file;
use crate::pipeline::import::{ImportCoordinator, ImportOptions};
use crate::poi::OsmPoi;
use crate::population::PopulationTable;
use crate::stats::level_summary;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input PBF extract
    #[arg(short, long)]
    pub input: PathBuf,

    /// Level mapping document (JSON)
    #[arg(short, long)]
    pub mapping: PathBuf,

    /// Node filter document (JSON); built-in POI filter if omitted
    #[arg(long)]
    pub filter: Option<PathBuf>,

    /// Relation filter document (JSON); built-in area filter if omitted
    #[arg(long)]
    pub area_filter: Option<PathBuf>,

    /// Optional name -> population table (tab-separated)
    #[arg(short, long)]
    pub population: Option<PathBuf>,

    /// Output file for the sorted POI set; statistics only if omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Decoded blocks buffered per pass
    #[arg(long, default_value_t = 64)]
    pub blocks_in_flight: usize,

    /// Outer-vertex guard for multipolygon assembly
    #[arg(long, default_value_t = 100)]
    pub max_ring_vertices: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(cli: &Cli) -> Result<()> {
    let classifier = LevelClassifier::load(&cli.mapping)?;
    tracing::info!(
        "Mapping: {} levels, default '{}'",
        classifier.levels().len(),
        classifier.default_level().name
    );
    tracing::debug!("Mapping tree:\n{}", classifier.dump());

    let node_filter = match &cli.filter {
        Some(path) => TagFilter::load(path)?,
        None => default_node_filter(),
    };
    let area_filter = match &cli.area_filter {
        Some(path) => TagFilter::load(path)?,
        None => default_area_filter(),
    };

    let populations = match &cli.population {
        Some(path) => {
            let table = PopulationTable::load(path)?;
            tracing::info!("Population table: {} entries", table.len());
            Some(table)
        }
        None => None,
    };

    let coordinator = ImportCoordinator {
        path: &cli.input,
        node_filter: &node_filter,
        area_filter: &area_filter,
        classifier: &classifier,
        populations: populations.as_ref(),
        options: ImportOptions {
            blocks_in_flight: cli.blocks_in_flight,
            max_ring_vertices: cli.max_ring_vertices,
        },
    };

    let start = std::time::Instant::now();
    let cancel = AtomicBool::new(false);
    let mut pois = coordinator.import(&cancel)?;
    pois.sort_by(OsmPoi::priority_cmp);
    tracing::info!(
        "Imported {} pois in {:.2}s",
        pois.len(),
        start.elapsed().as_secs_f64()
    );

    tracing::info!("{}", level_summary(&pois, &classifier));

    if let Some(output) = &cli.output {
        write_poi_file(output, &pois, &classifier)
            .with_context(|| format!("Output: failed to write {:?}", output))?;
        tracing::info!("Wrote {} pois to {:?}", pois.len(), output);
    }

    Ok(())
}
