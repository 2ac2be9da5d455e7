mod preprocess;
mod rvm;
pub mod types;

pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use types::SegmentationMask;

use crate::effects::{AdapterOptions, Delegate, ModelAdapter};
use anyhow::{Context, Result};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::{Path, PathBuf};

/// Create the default segmentation adapter (RVM), loaded lazily when the
/// virtual background effect is first enabled.
pub fn create_default_adapter(model_path: impl Into<PathBuf>) -> ModelAdapter<RobustVideoMatting> {
    let model_path = model_path.into();
    ModelAdapter::new("segmentation", move |options: &AdapterOptions| {
        RobustVideoMatting::new(&model_path, options)
    })
}

/// Open an ONNX Runtime session for `path`, honouring the requested delegate.
pub(crate) fn open_session(path: &Path, options: &AdapterOptions) -> Result<Session> {
    build_session(path, options)
        .with_context(|| format!("Failed to load model from {}", path.display()))
}

fn build_session(path: &Path, options: &AdapterOptions) -> ort::Result<Session> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?;

    if options.delegate == Delegate::Gpu {
        builder = builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;
    }

    builder.commit_from_file(path)
}
