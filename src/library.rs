//! Enumerate a whole library: walk every combination, validate and complete
//! its subgraph, and collect one record per resolved product.
//!
//! The library table is stored as Parquet: one `UInt32` column `code_i` per
//! position and a `Utf8` column `structure`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, StringArray, UInt32Array},
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};
use clap::ValueEnum;
use parquet::{arrow::ArrowWriter, errors::ParquetError};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{error, info, warn};

use crate::{
    chemistry::{Reactor, Structure},
    complete::{Completion, CompletionError, ErrorPolicy},
    config::{Config, ConfigError},
    enumerate::{
        candidate_edges, entry_edges, Combination, CombinationOverflow, Combinations,
        SharedReactions, WhitelistEntry,
    },
    graph::{Catalog, Edge, ReactionGraph},
    validate::{validate, Subgraph},
    visualize::{render_graph, write_dot, DebugMode},
};

/// Parallelization strategy over combinations.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum ParallelMode {
    /// Process combinations one after another.
    #[default]
    None,
    /// Process combinations on the rayon thread pool. Records and the first
    /// reported failure are the same as in a serial run.
    Always,
}

/// Errors that stop an enumeration run.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("combination {ordinal} (codes {codes:?}) failed: {source}")]
    Combination {
        ordinal: usize,
        codes: Vec<u32>,
        #[source]
        source: CompletionError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Overflow(#[from] CombinationOverflow),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to build library table: {0}")]
    Arrow(#[from] ArrowError),
    #[error("failed to write library table: {0}")]
    Parquet(#[from] ParquetError),
    #[error("a reactor is required to enumerate combinations")]
    NoReactor,
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> LibraryError + '_ {
    move |source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One library member: the whitelist index chosen at each position and the
/// terminal structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRecord {
    pub codes: Vec<u32>,
    pub structure: Option<Structure>,
}

/// Records in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Library {
    width: usize,
    records: Vec<LibraryRecord>,
}

impl Library {
    /// An empty library over `width` positions.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: LibraryRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[LibraryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records without a structure.
    pub fn resolved(mut self) -> Self {
        self.records.retain(|r| r.structure.is_some());
        self
    }

    /// `code_1`, ..., `code_k`, `structure`.
    pub fn header(&self) -> Vec<String> {
        (1..=self.width)
            .map(|i| format!("code_{i}"))
            .chain(["structure".to_string()])
            .collect()
    }

    /// The records as a single columnar batch, named after [`Library::header`].
    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let header = self.header();
        let (structure_name, code_names) = header
            .split_last()
            .ok_or_else(|| ArrowError::SchemaError("empty header".to_string()))?;

        let mut fields = Vec::with_capacity(header.len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(header.len());
        for (position, name) in code_names.iter().enumerate() {
            fields.push(Field::new(name, DataType::UInt32, false));
            columns.push(Arc::new(UInt32Array::from_iter(
                self.records.iter().map(|r| r.codes.get(position).copied()),
            )));
        }
        fields.push(Field::new(structure_name, DataType::Utf8, true));
        columns.push(Arc::new(StringArray::from_iter(
            self.records
                .iter()
                .map(|r| r.structure.as_ref().map(Structure::as_str)),
        )));

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
    }

    pub fn write_parquet<W: io::Write + Send>(&self, writer: W) -> Result<(), LibraryError> {
        let batch = self.to_record_batch()?;
        let mut writer = ArrowWriter::try_new(writer, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Write the table to `path` as Parquet, creating parent directories.
    pub fn to_path(&self, path: &Path) -> Result<(), LibraryError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        let file = File::create(path).map_err(io_error(path))?;
        self.write_parquet(file)
    }
}

/// Knobs of an enumeration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerateOptions {
    pub errors: ErrorPolicy,
    pub graph_only: bool,
    /// Restrict enumeration to these building-block positions.
    pub building_block_ids: Option<Vec<String>>,
    pub debug: DebugMode,
    pub overwrite: bool,
    pub parallel: ParallelMode,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The library already existed; nothing was done.
    Skipped(PathBuf),
    /// Only the catalog graphs were written, into this directory.
    GraphsOnly(PathBuf),
    Written { path: PathBuf, records: usize },
}

/// Sorted building-block positions, optionally restricted to `ids`.
pub fn positions(building_blocks: &[String], ids: Option<&[String]>) -> Vec<String> {
    let mut positions: Vec<String> = building_blocks
        .iter()
        .filter(|bb| ids.map_or(true, |ids| ids.contains(bb)))
        .cloned()
        .collect();
    positions.sort();
    positions.dedup();
    positions
}

/// Everything needed to turn a combination into a record.
pub struct Enumerator<'a> {
    graph: ReactionGraph,
    catalog: Catalog,
    shared: SharedReactions,
    positions: Vec<String>,
    whitelists: Vec<Vec<WhitelistEntry>>,
    errors: ErrorPolicy,
    debug: DebugMode,
    debug_dir: PathBuf,
    reactor: &'a dyn Reactor,
}

impl<'a> Enumerator<'a> {
    /// Load the positions' whitelists from `config` and build the catalog
    /// graph over the configured edges and every whitelist entry's edges.
    pub fn new(
        config: &Config,
        reactor: &'a dyn Reactor,
        options: &EnumerateOptions,
    ) -> Result<Self, LibraryError> {
        let positions = positions(
            &config.library.building_blocks,
            options.building_block_ids.as_deref(),
        );
        let whitelists = positions
            .iter()
            .map(|p| config.whitelist(p))
            .collect::<Result<Vec<_>, _>>()?;

        let mut edges: BTreeSet<Edge> = config
            .library
            .bb_edges
            .iter()
            .chain(&config.library.other_edges)
            .cloned()
            .collect();
        for (position, whitelist) in positions.iter().zip(&whitelists) {
            for entry in whitelist {
                edges.extend(entry_edges(position, entry));
            }
        }

        let catalog = config.catalog();
        let building_blocks = config.building_blocks();
        let graph = catalog.graph(&edges, Some(&building_blocks));
        let other_graph = catalog.graph(&config.library.other_edges, Some(&building_blocks));
        let shared = SharedReactions::new(&other_graph);

        Ok(Self {
            graph,
            catalog,
            shared,
            positions,
            whitelists,
            errors: options.errors,
            debug: options.debug,
            debug_dir: config.experiment_dir().join("library"),
            reactor,
        })
    }

    pub fn combinations(&self) -> Result<Combinations<'_>, CombinationOverflow> {
        Combinations::new(self.whitelists.iter().map(Vec::as_slice).collect())
    }

    fn write_debug(
        &self,
        combination: &Combination<'_>,
        subgraph: &Subgraph,
    ) -> Result<(), LibraryError> {
        let path = self.debug_dir.join(format!(
            "reaction_graph_combination={}_{}.dot",
            combination.ordinal(),
            combination.label()
        ));
        let dot = render_graph(&subgraph.to_reaction_graph(&self.graph));
        fs::create_dir_all(&self.debug_dir).map_err(io_error(&self.debug_dir))?;
        fs::write(&path, dot).map_err(io_error(&path))
    }

    /// Turn one combination into a record. Invalid combinations and, under
    /// [`ErrorPolicy::Ignore`], failed ones yield `Ok(None)`.
    pub fn process(
        &self,
        combination: &Combination<'_>,
    ) -> Result<Option<LibraryRecord>, LibraryError> {
        let edges = candidate_edges(&self.positions, combination, &self.shared);
        let subgraph = Subgraph::induce(&self.graph, &edges);
        let validation = validate(&subgraph);

        if self.debug.after_validation(validation.is_valid()) {
            self.write_debug(combination, &subgraph)?;
        }
        let Some(terminal) = validation.terminal else {
            warn!(
                combination = combination.ordinal(),
                codes = %combination.label(),
                sinks = validation.sinks,
                "combination does not have exactly one terminal node, skipping"
            );
            return Ok(None);
        };

        let building_blocks: BTreeMap<&str, &str> = self
            .positions
            .iter()
            .zip(combination.entries())
            .filter_map(|(position, entry)| {
                Some((position.as_str(), entry.structure.as_deref()?))
            })
            .collect();

        let completed = Completion::new(
            &self.graph,
            &subgraph,
            &self.catalog,
            &building_blocks,
            self.reactor,
        )
        .and_then(|completion| completion.run(terminal, self.reactor));
        match completed {
            Ok(structure) => Ok(Some(LibraryRecord {
                codes: combination.codes(),
                structure: Some(structure),
            })),
            Err(source) => {
                if self.debug.on_failure() {
                    self.write_debug(combination, &subgraph)?;
                }
                if source.is_fatal(self.errors) {
                    return Err(LibraryError::Combination {
                        ordinal: combination.ordinal(),
                        codes: combination.codes(),
                        source,
                    });
                }
                error!(
                    combination = combination.ordinal(),
                    codes = %combination.label(),
                    error = %source,
                    "abandoning combination"
                );
                Ok(None)
            }
        }
    }

    /// Process every combination and gather the records in enumeration order.
    pub fn run(&self, mode: ParallelMode) -> Result<Library, LibraryError> {
        let combinations = self.combinations()?;
        info!(
            positions = ?self.positions,
            combinations = combinations.total(),
            "starting enumeration of library"
        );

        let mut library = Library::new(self.positions.len());
        match mode {
            ParallelMode::None => {
                for combination in combinations {
                    if let Some(record) = self.process(&combination)? {
                        library.push(record);
                    }
                }
            }
            ParallelMode::Always => {
                let outcomes: Vec<_> = (0..combinations.total())
                    .into_par_iter()
                    .map(|i| match combinations.get(i) {
                        Some(combination) => self.process(&combination),
                        None => Ok(None),
                    })
                    .collect();
                for outcome in outcomes {
                    if let Some(record) = outcome? {
                        library.push(record);
                    }
                }
            }
        }
        Ok(library)
    }
}

/// Write the building-block, shared and full reaction graphs of `config` as
/// DOT files into `dir`.
pub fn write_catalog_graphs(config: &Config, dir: &Path) -> Result<(), LibraryError> {
    let catalog = config.catalog();
    let building_blocks = config.building_blocks();
    let bb_edges = &config.library.bb_edges;
    let other_edges = &config.library.other_edges;

    let graphs = [
        (
            "building_block_reactions_graph.dot",
            catalog.graph(bb_edges, Some(&building_blocks)),
        ),
        (
            "additional_reactions_graph.dot",
            catalog.graph(other_edges, Some(&building_blocks)),
        ),
        (
            "reaction_graph.dot",
            catalog.graph(bb_edges.iter().chain(other_edges), Some(&building_blocks)),
        ),
    ];
    for (file, graph) in &graphs {
        let path = dir.join(file);
        write_dot(graph, &path).map_err(io_error(&path))?;
    }
    Ok(())
}

/// Run a full enumeration for `config`.
///
/// The library table is only written once every combination has been
/// processed; a fatal failure leaves no table behind. `reactor` may be `None`
/// for graph-only runs.
pub fn enumerate_library(
    config: &Config,
    reactor: Option<&dyn Reactor>,
    options: &EnumerateOptions,
) -> Result<RunOutcome, LibraryError> {
    let path = config.library_path();
    if path.exists() && !options.overwrite {
        info!(path = %path.display(), "library exists");
        return Ok(RunOutcome::Skipped(path));
    }

    let dir = config.experiment_dir().join("library");
    fs::create_dir_all(&dir).map_err(io_error(&dir))?;
    write_catalog_graphs(config, &dir)?;
    info!(dir = %dir.display(), "saved reaction graph visualizations");
    if options.graph_only {
        return Ok(RunOutcome::GraphsOnly(dir));
    }

    let reactor = reactor.ok_or(LibraryError::NoReactor)?;
    let library = Enumerator::new(config, reactor, options)?
        .run(options.parallel)?
        .resolved();
    if library.is_empty() {
        warn!("no combination resolved to a library member");
    }
    library.to_path(&path)?;
    info!(path = %path.display(), records = library.len(), "saved library");

    Ok(RunOutcome::Written {
        path,
        records: library.len(),
    })
}
