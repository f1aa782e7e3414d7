//! Shared fixtures for the enumeration tests.
//!
//! Experiments are small enough to check by hand: a one-position library
//! where the building block is itself a catalog compound, and a two-position
//! library joined by a template-less shared reaction.

pub mod experiments;
pub mod reactions;

pub use experiments::{
    library_rows, linear_experiment, single_step_experiment, unsourced_intermediate_experiment,
    Experiment,
};
pub use reactions::{linear_reactor, single_step_reactor, unsourced_intermediate_reactor};
