//! Experiment configuration as written by the workbook import step.
//!
//! Only the sections the enumeration needs are interpreted. Whitelists that
//! are not building blocks (constants, selection primers) are kept as raw
//! YAML and never decoded.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    enumerate::WhitelistEntry,
    graph::{AttrMap, Attrs, Catalog, Edge},
    utils::{expand_home, optional_text},
};

/// Errors raised while loading or reading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("no whitelist for building block `{0}`")]
    MissingWhitelist(String),
    #[error("malformed whitelist `{name}`: {source}")]
    Whitelist {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Experiment {
    pub name: String,
    pub save_dir: PathBuf,
}

/// Topology of the library: which edges belong to building-block steps and
/// which to shared reactions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibrarySection {
    #[serde(default)]
    pub bb_edges: Vec<Edge>,
    #[serde(default)]
    pub other_edges: Vec<Edge>,
    #[serde(default)]
    pub building_blocks: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompoundEntry {
    #[serde(default, rename = "smiles", alias = "structure", deserialize_with = "optional_text")]
    pub structure: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReactionEntry {
    #[serde(default, rename = "smirks", alias = "template", deserialize_with = "optional_text")]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSection {
    #[serde(default)]
    pub compounds: BTreeMap<String, CompoundEntry>,
    #[serde(default)]
    pub reactions: BTreeMap<String, ReactionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub experiment: Experiment,
    #[serde(default)]
    pub library: LibrarySection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub whitelists: BTreeMap<String, serde_yaml::Value>,
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// `save_dir/name`, with `~` expanded.
    pub fn experiment_dir(&self) -> PathBuf {
        expand_home(&self.experiment.save_dir).join(&self.experiment.name)
    }

    pub fn library_path(&self) -> PathBuf {
        self.experiment_dir().join("library").join("library.parquet")
    }

    /// Reactions, compounds and declared products as attribute maps.
    pub fn catalog(&self) -> Catalog {
        Catalog {
            reactions: self
                .catalog
                .reactions
                .iter()
                .map(|(name, r)| {
                    let attrs = Attrs {
                        structure: None,
                        template: r.template.clone(),
                    };
                    (name.clone(), attrs)
                })
                .collect(),
            compounds: self
                .catalog
                .compounds
                .iter()
                .map(|(name, c)| {
                    let attrs = Attrs {
                        structure: c.structure.clone(),
                        template: None,
                    };
                    (name.clone(), attrs)
                })
                .collect(),
            products: names_to_attrs(&self.library.products),
        }
    }

    /// Building-block positions with no attributes, for graph overlays.
    pub fn building_blocks(&self) -> AttrMap {
        names_to_attrs(&self.library.building_blocks)
    }

    /// Decode the whitelist of building block `name`.
    pub fn whitelist(&self, name: &str) -> Result<Vec<WhitelistEntry>, ConfigError> {
        let raw = self
            .whitelists
            .get(name)
            .ok_or_else(|| ConfigError::MissingWhitelist(name.to_string()))?;
        serde_yaml::from_value(raw.clone()).map_err(|source| ConfigError::Whitelist {
            name: name.to_string(),
            source,
        })
    }
}

fn names_to_attrs(names: &[String]) -> AttrMap {
    names
        .iter()
        .map(|n| (n.clone(), Attrs::default()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
experiment:
  name: demo
  save_dir: /tmp/del
library:
  bb_edges: [[B0, R1], [A, R1], [R1, P1]]
  other_edges: [[P1, R2], [R2, P2]]
  building_blocks: [B0]
  products: [P1, P2]
catalog:
  compounds:
    A: {smiles: CC(=O)O}
  reactions:
    R1: {smirks: '[C:1](=O)O>>[C:1](=O)N'}
    R2: {smirks: .nan}
whitelists:
  B0:
    - {index: 0, codon: ACGT, reaction: R1, educt: A, product: P1, smiles: NCC}
    - {index: 1, codon: TGCA, reaction: R1, educt: A, product: P1, smiles: .nan}
  S0:
    - {codon: AAAA, name: sel1}
"#;

    #[test]
    fn loads_the_library_sections() {
        let config = Config::from_yaml(CONFIG).unwrap();
        assert_eq!(config.library.bb_edges.len(), 3);
        assert_eq!(config.library.other_edges[0], ("P1".to_string(), "R2".to_string()));
        assert_eq!(
            config.library_path(),
            PathBuf::from("/tmp/del/demo/library/library.parquet")
        );

        let catalog = config.catalog();
        assert_eq!(catalog.compounds["A"].structure.as_deref(), Some("CC(=O)O"));
        assert!(catalog.reactions["R1"].template.is_some());
        assert_eq!(catalog.reactions["R2"].template, None);
        assert!(catalog.products.contains_key("P2"));
    }

    #[test]
    fn decodes_building_block_whitelists_only() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let whitelist = config.whitelist("B0").unwrap();
        assert_eq!(whitelist.len(), 2);
        assert_eq!(whitelist[0].reactant, "A");
        assert_eq!(whitelist[0].structure.as_deref(), Some("NCC"));
        assert_eq!(whitelist[1].structure, None);

        assert!(matches!(config.whitelist("S0"), Err(ConfigError::Whitelist { .. })));
        assert!(matches!(config.whitelist("B9"), Err(ConfigError::MissingWhitelist(_))));
    }

    #[test]
    fn missing_files_report_their_path() {
        let err = Config::from_path(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.yaml"));
    }
}
