use std::{collections::BTreeSet, path::PathBuf};

use clap::ValueEnum;
use pyo3::{
    exceptions::{PyRuntimeError, PyValueError},
    prelude::*,
};

use crate::{
    chemistry::{ReactionTemplate, Reactor, ReactorError, Structure},
    complete::ErrorPolicy,
    config::Config,
    library::{self, EnumerateOptions, RunOutcome},
    visualize::DebugMode,
};

/// Reactor delegating to a Python callable `apply(template, reactants)` that
/// returns a list of product structures.
pub struct PyReactor {
    apply: Py<PyAny>,
}

impl PyReactor {
    pub fn new(apply: Py<PyAny>) -> Self {
        Self { apply }
    }
}

impl Reactor for PyReactor {
    fn apply(
        &self,
        template: &ReactionTemplate,
        reactants: &[Structure],
    ) -> Result<BTreeSet<Structure>, ReactorError> {
        Python::with_gil(|py| {
            let reactants: Vec<&str> = reactants.iter().map(Structure::as_str).collect();
            let products = self
                .apply
                .call1(py, (template.as_str(), reactants))
                .map_err(|e| ReactorError::Failed(e.to_string()))?;
            let products: Vec<String> = products
                .extract(py)
                .map_err(|e| ReactorError::Protocol(e.to_string()))?;
            Ok(products.into_iter().map(Structure::new).collect())
        })
    }
}

fn parse_mode<T: ValueEnum>(name: &str, value: &str) -> PyResult<T> {
    <T as ValueEnum>::from_str(value, true)
        .map_err(|_| PyValueError::new_err(format!("invalid {name} `{value}`")))
}

/// Enumerate the library of the experiment at `config_path`. Returns the
/// number of records written, or `None` when nothing was enumerated.
#[pyfunction]
#[pyo3(signature = (config_path, apply, errors="raise", graph_only=false, building_block_ids=None, debug="off", overwrite=false))]
#[allow(clippy::too_many_arguments)]
fn enumerate_library(
    py: Python<'_>,
    config_path: PathBuf,
    apply: Py<PyAny>,
    errors: &str,
    graph_only: bool,
    building_block_ids: Option<Vec<String>>,
    debug: &str,
    overwrite: bool,
) -> PyResult<Option<usize>> {
    let options = EnumerateOptions {
        errors: parse_mode::<ErrorPolicy>("errors", errors)?,
        graph_only,
        building_block_ids,
        debug: parse_mode::<DebugMode>("debug", debug)?,
        overwrite,
        ..Default::default()
    };
    let config =
        Config::from_path(&config_path).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let reactor = PyReactor::new(apply);

    let outcome = py
        .allow_threads(|| library::enumerate_library(&config, Some(&reactor), &options))
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    Ok(match outcome {
        RunOutcome::Written { records, .. } => Some(records),
        RunOutcome::Skipped(_) | RunOutcome::GraphsOnly(_) => None,
    })
}

/// A Python module implemented in Rust. The name of this function must match
/// the `lib.name` setting in the `Cargo.toml`, else Python will not be able to
/// import the module.
#[pymodule]
#[pyo3(name = "del_library")]
fn _del_library(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(enumerate_library, m)?)?;

    Ok(())
}
