//! Errors which can happen in various parts of the library.

use thiserror::Error;

use crate::{
    io::{source_client::SourceFetchError, ScheduleError},
    pack::PackError,
    render::backend::BackendError,
    style::StyleError,
    tile::tile_parser::ParseError,
};

/// Failure of a packing task or of the work it depends on.
///
/// The affected tile is marked empty for the current frame and requested again on the next
/// visibility pass.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("fetching tile data failed")]
    Fetch(#[from] SourceFetchError),
    #[error("decoding tile data failed")]
    Decode(#[from] ParseError),
    #[error("packing task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Style(#[from] StyleError),
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
