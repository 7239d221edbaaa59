//! Reducible-background estimation for four-lepton final states with the
//! opposite-sign fake-rate method.

pub mod analysis;
pub mod combinatorics;
pub mod config;
pub mod dilepton;
pub mod error;
pub mod event;
pub mod fakerate;
pub mod generate;
pub mod io;
pub mod kinematics;
pub mod lepton;
pub mod quartet;
pub mod region;
pub mod weight;

pub use error::{Error, Result};
