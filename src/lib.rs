//! Artist classification from a folder of paintings.
//!
//! `images/<artist>/<file>` is indexed into labelled samples, split 80/20,
//! augmented on load and fed to a small VGG-style network trained with Adam.
//! The trained weights are written once at the end of training and can be
//! restored with [`checkpoint::load_trained_model`].

pub mod backend;
pub mod checkpoint;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod model;
pub mod module;
pub mod training;

pub use error::{Error, Result};
