//! Experiment configurations written into temporary directories.

#![allow(dead_code)]

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use arrow::array::{Array, ArrayRef, StringArray, UInt32Array};
use del_library::config::Config;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::TempDir;

/// A configuration whose experiment directory lives in a temporary directory.
pub struct Experiment {
    pub dir: TempDir,
    pub config: Config,
}

impl Experiment {
    fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("temporary directory");
        let yaml = format!(
            "experiment:\n  name: test\n  save_dir: '{}'\n{body}",
            dir.path().display()
        );
        let config = Config::from_yaml(&yaml).expect("fixture configuration");
        Self { dir, config }
    }

    pub fn library_dir(&self) -> PathBuf {
        self.config.experiment_dir().join("library")
    }

    pub fn library_path(&self) -> PathBuf {
        self.config.library_path()
    }
}

/// Position `B` is also a catalog compound and its only entry carries no
/// structure, so `R1` combines the compounds `A` and `B`.
pub fn single_step_experiment() -> Experiment {
    Experiment::new(
        r#"
library:
  bb_edges: [[B, R1], [A, R1], [R1, P1]]
  other_edges: []
  building_blocks: [B]
  products: [P1]
catalog:
  compounds:
    A: {smiles: '[A]'}
    B: {smiles: '[B]'}
  reactions:
    R1: {smirks: '[A].[B]>>[P1]'}
whitelists:
  B:
    - {index: 0, codon: AAAA, reaction: R1, educt: A, product: P1, smiles: .nan}
"#,
    )
}

/// Two positions. `B0` acylates `A` into `P1`, the shared pass-through `R2`
/// turns `P1` into `P2`, and `B1` caps `P2` into `P3`.
///
/// `extra_b1` is appended verbatim to the whitelist of `B1`, and
/// `extra_other_edges` to the shared edges.
pub fn linear_experiment(extra_b1: &str, extra_other_edges: &str) -> Experiment {
    Experiment::new(&format!(
        r#"
library:
  bb_edges: [[B0, R1], [A, R1], [R1, P1], [B1, R3], [P2, R3], [R3, P3]]
  other_edges: [[P1, R2], [R2, P2]{extra_other_edges}]
  building_blocks: [B1, B0]
  products: [P1, P2, P3, P4]
catalog:
  compounds:
    A: {{smiles: '[A]'}}
    X: {{smiles: '[X]'}}
  reactions:
    R1: {{smirks: t1}}
    R2: {{smirks: .nan}}
    R3: {{smirks: t3}}
    R4: {{smirks: t4}}
whitelists:
  B0:
    - {{index: 0, codon: AAAA, reaction: R1, educt: A, product: P1, smiles: '[b0]'}}
  B1:
    - {{index: 0, codon: CCCC, reaction: R3, educt: P2, product: P3, smiles: '[c0]'}}
    - {{index: 1, codon: GGGG, reaction: R3, educt: P2, product: P3, smiles: '[c1]'}}
{extra_b1}
  constants:
    - {{codon: TTTT}}
"#
    ))
}

/// `R0` has no template and nothing feeds it. The entry built on `A` pulls
/// `R0` in and hits an empty pass-through; the entry built on `C` does not.
pub fn unsourced_intermediate_experiment() -> Experiment {
    Experiment::new(
        r#"
library:
  bb_edges: [[B, R1], [A, R1], [R1, P1]]
  other_edges: [[R0, A]]
  building_blocks: [B]
  products: [P1]
catalog:
  compounds:
    B: {smiles: '[B]'}
    C: {smiles: '[C]'}
  reactions:
    R0: {smirks: .nan}
    R1: {smirks: '[A].[B]>>[P1]'}
whitelists:
  B:
    - {index: 0, codon: AAAA, reaction: R1, educt: A, product: P1, smiles: .nan}
    - {index: 1, codon: CCCC, reaction: R1, educt: C, product: P1, smiles: .nan}
"#,
    )
}

/// Header and rows of a written library table, with codes rendered as text.
pub fn library_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let file = File::open(path).expect("library table");
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).expect("parquet metadata");
    let header = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();

    let mut rows = Vec::new();
    for batch in builder.build().expect("parquet reader") {
        let batch = batch.expect("record batch");
        let columns: Vec<Vec<String>> = batch.columns().iter().map(column_text).collect();
        for row in 0..batch.num_rows() {
            rows.push(columns.iter().map(|c| c[row].clone()).collect());
        }
    }
    (header, rows)
}

fn column_text(column: &ArrayRef) -> Vec<String> {
    if let Some(codes) = column.as_any().downcast_ref::<UInt32Array>() {
        return codes.values().iter().map(u32::to_string).collect();
    }
    let text = column
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("code or structure column");
    (0..text.len())
        .map(|i| if text.is_null(i) { String::new() } else { text.value(i).to_string() })
        .collect()
}
