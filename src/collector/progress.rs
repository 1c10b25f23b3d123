use super::results::{CollectionStatus, DeviceResult};
use crate::config::Device;

/// Receives human readable progress while a collection runs.
pub trait ProgressObserver: Send + Sync {
    fn batch_started(&self, batch: usize, total_batches: usize, devices: &[Device]);
    fn device_finished(&self, result: &DeviceResult);
}

pub struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn batch_started(&self, batch: usize, total_batches: usize, devices: &[Device]) {
        println!("{}", batch_line(batch, total_batches, devices));
    }

    fn device_finished(&self, result: &DeviceResult) {
        println!("{}", device_line(result));
    }
}

fn indicator(status: CollectionStatus) -> &'static str {
    match status {
        CollectionStatus::Success => "[ OK ]",
        CollectionStatus::PartialSuccess => "[PART]",
        CollectionStatus::AllCommandsFailedExecution => "[FAIL]",
        CollectionStatus::NoCommandsForPlatform => "[SKIP]",
        CollectionStatus::Failed => "[DOWN]",
    }
}

fn batch_line(batch: usize, total_batches: usize, devices: &[Device]) -> String {
    let hostnames: Vec<&str> = devices.iter().map(|device| device.hostname.as_str()).collect();
    format!(
        "Batch {}/{}: collecting {} device(s): {}",
        batch,
        total_batches,
        devices.len(),
        hostnames.join(", ")
    )
}

fn device_line(result: &DeviceResult) -> String {
    let failed = result.commands.values().filter(|command| command.failed()).count();
    let mut line = format!(
        "  {} {} ({}) {} - {}/{} command(s) ok",
        indicator(result.status),
        result.hostname,
        result.platform,
        result.status,
        result.commands.len() - failed,
        result.commands.len()
    );
    if let Some(error) = &result.error {
        line.push_str(&format!(": {}", error));
    }
    line
}
