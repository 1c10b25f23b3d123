use super::progress::ProgressObserver;
use super::results::{CommandResults, DeviceResult};
use super::runner::SessionRunner;
use super::writer::ArtifactWriter;
use crate::config::Device;
use crate::sink::SinkErrors;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info};
use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::JoinError;

/// Collects an inventory batch by batch: devices of one batch run
/// concurrently, the next batch starts only once every device of the current
/// one is finished and persisted.
pub struct BatchScheduler {
    runner: SessionRunner,
    writer: ArtifactWriter,
    progress: Arc<dyn ProgressObserver>,
    batch_size: NonZeroUsize,
}

impl BatchScheduler {
    pub fn new(
        runner: SessionRunner,
        writer: ArtifactWriter,
        progress: Arc<dyn ProgressObserver>,
        batch_size: NonZeroUsize,
    ) -> BatchScheduler {
        BatchScheduler {
            runner,
            writer,
            progress,
            batch_size,
        }
    }

    pub async fn collect(&self, devices: &[Device]) -> Vec<DeviceResult> {
        let total_batches = devices.len().div_ceil(self.batch_size.get());
        let mut results = Vec::with_capacity(devices.len());

        for (index, batch) in devices.chunks(self.batch_size.get()).enumerate() {
            info!(
                "starting batch {}/{} with {} device(s)",
                index + 1,
                total_batches,
                batch.len()
            );
            self.progress.batch_started(index + 1, total_batches, batch);

            let batch_results = self.collect_batch(batch).await;
            for result in &batch_results {
                match self.writer.persist(result).await {
                    Ok(()) => {}
                    Err(SinkErrors::Incomplete { errors, .. }) => {
                        for err in errors {
                            error!("{}: unable to persist artifact: {}", result.hostname, err);
                        }
                    }
                    Err(err) => error!("{}: unable to persist artifacts: {}", result.hostname, err),
                }
            }

            results.extend(batch_results);
        }

        results
    }

    async fn collect_batch(&self, batch: &[Device]) -> Vec<DeviceResult> {
        let mut tasks: FuturesUnordered<_> = batch
            .iter()
            .cloned()
            .map(|device| {
                let runner = self.runner.clone();
                let task_device = device.clone();
                let handle = tokio::spawn(async move { runner.run(&task_device).await });

                async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(err) => unhandled_task_result(&device, err),
                    }
                }
            })
            .collect();

        let mut results = Vec::with_capacity(batch.len());
        while let Some(result) = tasks.next().await {
            self.progress.device_finished(&result);
            results.push(result);
        }

        results
    }
}

fn unhandled_task_result(device: &Device, err: JoinError) -> DeviceResult {
    let reason = if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    };
    error!(
        "{} ({}): unhandled error during collection: {}",
        device.hostname, device.platform, reason
    );

    DeviceResult::failed(
        device,
        format!("unhandled error during collection: {}", reason),
        CommandResults::new(),
    )
}

fn panic_message(payload: Box<dyn Any + Send + 'static>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(_) => "task panicked".to_owned(),
    }
}
