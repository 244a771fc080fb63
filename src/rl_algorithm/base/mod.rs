use std::collections::BTreeMap;

use chrono::Local;
use log::info;
use tensorboard_rs::summary_writer::SummaryWriter;

pub mod memory;
pub mod metric;
pub mod model;
pub mod on_policy_runner;
pub mod rl_utils;

/// Collects scalars between two `log` calls and flushes them to the log and,
/// when a log directory is configured, to TensorBoard.
pub struct EpochLogger {
    log_info: BTreeMap<(String, String), f32>,
    // samples folded into each entry since the last `log`
    counts: BTreeMap<(String, String), usize>,
    writer: Option<SummaryWriter>,
}

pub enum EpochLoggerAggMode {
    Sum,
    Mean,
    Max,
    Min,
    Replace,
}

impl Default for EpochLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

impl EpochLogger {
    /// Logger that only writes through the `log` facade.
    pub fn disabled() -> Self {
        Self {
            log_info: BTreeMap::new(),
            counts: BTreeMap::new(),
            writer: None,
        }
    }

    /// Opens a fresh run directory `<logdir>/<exp_name>_<timestamp>`.
    pub fn with_writer(logdir: &str, exp_name: &str) -> Self {
        let run_dir = format!(
            "{}/{}_{}",
            logdir,
            exp_name,
            Local::now().format("%m-%d_%H-%M-%S")
        );
        info!("tensorboard run dir={}", run_dir);
        Self {
            log_info: BTreeMap::new(),
            counts: BTreeMap::new(),
            writer: Some(SummaryWriter::new(&run_dir)),
        }
    }

    pub fn add_scalar(&mut self, main_tag_sub_tag: (&str, &str), val: f32) {
        let key = (
            main_tag_sub_tag.0.to_string(),
            main_tag_sub_tag.1.to_string(),
        );
        self.counts.insert(key.clone(), 1);
        self.log_info.insert(key, val);
    }

    /// Folds `val` into the pending entry. `Mean` is the arithmetic mean of
    /// every value added since the last `log`.
    pub fn add_scalar_agg(
        &mut self,
        main_tag_sub_tag: (&str, &str),
        mut val: f32,
        agg_mod: EpochLoggerAggMode,
    ) {
        let key = (
            main_tag_sub_tag.0.to_string(),
            main_tag_sub_tag.1.to_string(),
        );
        let count = self.counts.get(&key).copied().unwrap_or(0);
        if let Some(old_val) = self.log_info.get(&key) {
            val = match agg_mod {
                EpochLoggerAggMode::Sum => val + old_val,
                EpochLoggerAggMode::Mean => old_val + (val - old_val) / (count + 1) as f32,
                EpochLoggerAggMode::Max => val.max(*old_val),
                EpochLoggerAggMode::Min => val.min(*old_val),
                EpochLoggerAggMode::Replace => *old_val,
            }
        }
        self.counts.insert(key.clone(), count + 1);
        self.log_info.insert(key, val);
    }

    #[cfg(test)]
    pub fn get(&self, main_tag_sub_tag: (&str, &str)) -> Option<f32> {
        self.log_info
            .get(&(
                main_tag_sub_tag.0.to_string(),
                main_tag_sub_tag.1.to_string(),
            ))
            .copied()
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.log_info.len()
    }

    pub fn log(&mut self, step: usize) {
        let log_info = std::mem::take(&mut self.log_info);
        self.counts.clear();
        let line = log_info
            .iter()
            .map(|((main_tag, sub_tag), scalar)| format!("{}-{}={:.4}", main_tag, sub_tag, scalar))
            .collect::<Vec<_>>()
            .join(" ");
        info!("step={} {}", step, line);

        if let Some(writer) = self.writer.as_mut() {
            for ((main_tag, sub_tag), scalar) in log_info {
                writer.add_scalar(&format!("{}/{}", main_tag, sub_tag), scalar, step);
            }
            writer.flush();
        }
    }
}
