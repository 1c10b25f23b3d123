mod catalog;
mod classifier;
mod progress;
mod results;
mod runner;
mod scheduler;
mod writer;

pub(crate) use catalog::{CommandCatalog, CommandCatalogBuilder};
pub(crate) use progress::ConsoleProgress;
pub(crate) use results::{count_by_status, CollectionStatus};
pub(crate) use runner::SessionRunner;
pub(crate) use scheduler::BatchScheduler;
pub(crate) use writer::ArtifactWriter;
