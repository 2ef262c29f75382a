//! Run configuration, read from a JSON file
use crate::{CpuCatalog, CpuModel, Error, MalformedInputError, NotFoundError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const TICKS_PER_SECOND: f64 = 1e12;

/// Ticks that "no limit" resolves to
pub const MAX_TICK: u64 = u64::MAX;

fn default_num_cpus() -> usize {
    1
}

fn default_cpu_type() -> String {
    crate::ATOMIC_CPU.to_string()
}

fn default_max_checkpoints() -> u32 {
    5
}

/// Every knob that shapes a run. Field names follow the gem5 command line
/// options they replace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub num_cpus: usize,
    /// model used for the measured part of the run
    pub cpu_type: String,
    /// model the checkpoint is restored onto
    pub restore_with_cpu: String,
    pub caches: bool,

    pub checkpoint_dir: Option<PathBuf>,
    pub outdir: Option<PathBuf>,
    /// 1-indexed checkpoint to restore, or an instruction count when
    /// restoring instruction-named checkpoints
    pub checkpoint_restore: Option<u64>,
    pub restore_simpoint_checkpoint: bool,
    pub at_instruction: bool,
    pub simpoint: bool,
    /// instruction count of the workload's SimPoint marker, 0 when absent
    pub workload_simpoint: u64,
    pub bench: Option<String>,

    /// `<when>,<period>` in ticks, or an instruction offset with
    /// `at_instruction`/`simpoint`
    pub take_checkpoints: Option<String>,
    pub max_checkpoints: u32,
    /// `<analysis>,<weights>,<interval length>,<warmup length>`
    pub take_simpoint_checkpoints: Option<String>,
    pub checkpoint_at_end: bool,

    pub fast_forward: Option<u64>,
    pub warmup_insts: Option<u64>,
    pub maxinsts: Option<u64>,
    /// ticks of warmup on the timing model
    pub standard_switch: Option<u64>,
    /// ticks between model swaps
    pub repeat_switch: Option<u64>,
    pub kernel_starting: bool,
    pub warmup_aftkernel: Option<u64>,
    pub repeat: Option<u32>,
    /// sample lengths of the repeat loop are ticks, not instructions
    pub period_in_ticks: bool,
    /// count instruction budgets of the measured phases on every core
    pub sync_all_cores: bool,

    pub abs_max_tick: Option<u64>,
    pub rel_max_tick: Option<u64>,
    /// seconds of simulated time
    pub maxtime: Option<f64>,
    pub initialize_only: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            num_cpus: default_num_cpus(),
            cpu_type: default_cpu_type(),
            restore_with_cpu: default_cpu_type(),
            caches: false,
            checkpoint_dir: None,
            outdir: None,
            checkpoint_restore: None,
            restore_simpoint_checkpoint: false,
            at_instruction: false,
            simpoint: false,
            workload_simpoint: 0,
            bench: None,
            take_checkpoints: None,
            max_checkpoints: default_max_checkpoints(),
            take_simpoint_checkpoints: None,
            checkpoint_at_end: false,
            fast_forward: None,
            warmup_insts: None,
            maxinsts: None,
            standard_switch: None,
            repeat_switch: None,
            kernel_starting: false,
            warmup_aftkernel: None,
            repeat: None,
            period_in_ticks: false,
            sync_all_cores: false,
            abs_max_tick: None,
            rel_max_tick: None,
            maxtime: None,
            initialize_only: false,
        }
    }
}

fn conflict(message: &str) -> Error {
    Error::ConfigurationConflict(message.to_string())
}

impl RunOptions {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|source| MalformedInputError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&content).map_err(|err| {
            MalformedInputError::OptionValue {
                value: format!("{}: {}", path.display(), err),
                expected: "a JSON object of run options",
            }
            .into()
        })
    }

    /// Whether the run names checkpoints after the benchmark and an
    /// instruction count
    pub fn instruction_named(&self) -> bool {
        self.at_instruction || self.simpoint
    }

    pub fn is_restoring(&self) -> bool {
        self.checkpoint_restore.is_some()
    }

    /// Reject every combination that cannot be run. Nothing here touches
    /// the engine.
    pub fn validate(&self, catalog: &dyn CpuCatalog) -> Result<()> {
        if self.kernel_starting && self.warmup_insts.is_some() {
            return Err(conflict(
                "Please use warmup_aftkernel to use with kernel_starting",
            ));
        }
        if self.warmup_aftkernel.is_some() && !self.kernel_starting {
            return Err(conflict(
                "Must specify kernel_starting when using warmup_aftkernel",
            ));
        }
        if self.fast_forward.is_some() && self.checkpoint_restore.is_some() {
            return Err(conflict(
                "Can't specify both fast_forward and checkpoint_restore",
            ));
        }
        if self.standard_switch.is_some() && !self.caches {
            return Err(conflict("Must specify caches when using standard_switch"));
        }
        if self.standard_switch.is_some() && self.repeat_switch.is_some() {
            return Err(conflict(
                "Can't specify both standard_switch and repeat_switch",
            ));
        }
        if self.repeat_switch.is_some() && self.take_checkpoints.is_some() {
            return Err(conflict(
                "Can't specify both repeat_switch and take_checkpoints",
            ));
        }
        if self.num_cpus == 0 {
            return Err(conflict("num_cpus must be at least 1"));
        }

        let cpu = self.cpu_model(catalog)?;
        if cpu.requires_caches() && !self.caches {
            return Err(Error::ConfigurationConflict(format!(
                "{} must be used with caches",
                cpu.name
            )));
        }
        if self.is_restoring() {
            self.restore_model(catalog)?;
        }
        if self.repeat_switch.is_some() {
            if cpu.requires_caches() && !self.caches {
                return Err(Error::ConfigurationConflict(format!(
                    "{}: Must be used with caches",
                    cpu.name
                )));
            }
            if !cpu.supports_live_switch() {
                return Err(Error::ConfigurationConflict(format!(
                    "{}: CPU switching not supported",
                    cpu.name
                )));
            }
        }
        if self.repeat.is_some()
            && !(self.kernel_starting && self.fast_forward.is_some() && self.maxinsts.is_some())
        {
            return Err(conflict(
                "repeat needs kernel_starting, fast_forward and maxinsts",
            ));
        }
        if self.instruction_named()
            && (self.take_checkpoints.is_some() || self.is_restoring())
            && self.bench.is_none()
        {
            return Err(conflict(
                "Instruction-named checkpoints need a bench name",
            ));
        }
        if self.restore_simpoint_checkpoint && !self.is_restoring() {
            return Err(conflict(
                "restore_simpoint_checkpoint needs checkpoint_restore",
            ));
        }
        if self.simpoint && self.workload_simpoint == 0 {
            return Err(NotFoundError::SimPointMarker.into());
        }
        Ok(())
    }

    pub fn cpu_model(&self, catalog: &dyn CpuCatalog) -> Result<CpuModel> {
        catalog
            .lookup(&self.cpu_type)
            .ok_or_else(|| NotFoundError::CpuModel(self.cpu_type.clone()).into())
    }

    pub fn restore_model(&self, catalog: &dyn CpuCatalog) -> Result<CpuModel> {
        catalog
            .lookup(&self.restore_with_cpu)
            .ok_or_else(|| NotFoundError::CpuModel(self.restore_with_cpu.clone()).into())
    }

    /// `(when, period)` of periodic checkpoints
    pub fn checkpoint_period(&self) -> Result<Option<(u64, u64)>> {
        let Some(value) = &self.take_checkpoints else {
            return Ok(None);
        };
        let malformed = || MalformedInputError::OptionValue {
            value: value.clone(),
            expected: "<when>,<period>",
        };
        let (when, period) = value.split_once(',').ok_or_else(malformed)?;
        Ok(Some((
            when.trim().parse().map_err(|_| malformed())?,
            period.trim().parse().map_err(|_| malformed())?,
        )))
    }

    /// Instruction offset for an instruction-named checkpoint
    pub fn checkpoint_offset(&self) -> Result<Option<u64>> {
        let Some(value) = &self.take_checkpoints else {
            return Ok(None);
        };
        value.trim().parse().map(Some).map_err(|_| {
            MalformedInputError::OptionValue {
                value: value.clone(),
                expected: "an instruction count",
            }
            .into()
        })
    }

    /// The smallest of the absolute, relative and wall-time limits, in
    /// absolute ticks. `restored_tick` is where the restored checkpoint
    /// starts.
    pub fn max_tick(&self, restored_tick: Option<u64>) -> u64 {
        let mut explicit = 0;
        let mut limits = vec![];
        if let Some(abs) = self.abs_max_tick {
            limits.push(abs);
            explicit += 1;
        }
        if let Some(rel) = self.rel_max_tick {
            let mut limit = rel;
            if let Some(start) = restored_tick {
                limit = limit.saturating_add(start);
                if self.instruction_named() {
                    warn!(
                        "Relative max tick specified with at_instruction or simpoint, \
                         these don't carry the checkpoint start tick so assuming absolute max tick"
                    );
                }
            }
            limits.push(limit);
            explicit += 1;
        }
        if let Some(seconds) = self.maxtime {
            limits.push((seconds * TICKS_PER_SECOND) as u64);
            explicit += 1;
        }
        if explicit > 1 {
            warn!("Specified multiple of abs_max_tick, rel_max_tick, maxtime. Using least");
        }
        limits.into_iter().min().unwrap_or(MAX_TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuiltinCatalog, O3_CPU};

    fn conflicts(options: &RunOptions) -> bool {
        matches!(
            options.validate(&BuiltinCatalog),
            Err(Error::ConfigurationConflict(_))
        )
    }

    #[test]
    fn defaults_are_valid() {
        let options: RunOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.num_cpus, 1);
        assert_eq!(options.max_checkpoints, 5);
        options.validate(&BuiltinCatalog).unwrap();
    }

    #[test]
    fn mutually_exclusive_options() {
        let options = RunOptions {
            fast_forward: Some(1000),
            checkpoint_restore: Some(1),
            ..Default::default()
        };
        assert!(conflicts(&options));

        let options = RunOptions {
            standard_switch: Some(100),
            repeat_switch: Some(100),
            caches: true,
            ..Default::default()
        };
        assert!(conflicts(&options));

        let options = RunOptions {
            warmup_aftkernel: Some(100),
            ..Default::default()
        };
        assert!(conflicts(&options));

        let options = RunOptions {
            repeat: Some(3),
            kernel_starting: true,
            ..Default::default()
        };
        assert!(conflicts(&options));
    }

    #[test]
    fn detailed_models_need_caches() {
        let mut options = RunOptions {
            cpu_type: O3_CPU.to_string(),
            ..Default::default()
        };
        assert!(conflicts(&options));
        options.caches = true;
        options.validate(&BuiltinCatalog).unwrap();
    }

    #[test]
    fn unknown_model_and_missing_marker() {
        let options = RunOptions {
            cpu_type: "PentiumCPU".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            options.validate(&BuiltinCatalog),
            Err(Error::NotFound(NotFoundError::CpuModel(_)))
        ));

        let options = RunOptions {
            simpoint: true,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(&BuiltinCatalog),
            Err(Error::NotFound(NotFoundError::SimPointMarker))
        ));
    }

    #[test]
    fn least_max_tick_wins() {
        let options = RunOptions::default();
        assert_eq!(options.max_tick(None), MAX_TICK);

        let options = RunOptions {
            abs_max_tick: Some(5000),
            rel_max_tick: Some(1000),
            ..Default::default()
        };
        assert_eq!(options.max_tick(None), 1000);
        assert_eq!(options.max_tick(Some(4500)), 5000);

        let options = RunOptions {
            maxtime: Some(0.5),
            ..Default::default()
        };
        assert_eq!(options.max_tick(None), 500_000_000_000);
    }

    #[test]
    fn take_checkpoints_forms() {
        let options = RunOptions {
            take_checkpoints: Some("100,50".to_string()),
            ..Default::default()
        };
        assert_eq!(options.checkpoint_period().unwrap(), Some((100, 50)));
        assert!(options.checkpoint_offset().is_err());

        let options = RunOptions {
            take_checkpoints: Some("2000".to_string()),
            ..Default::default()
        };
        assert_eq!(options.checkpoint_offset().unwrap(), Some(2000));
        assert!(options.checkpoint_period().is_err());
    }
}
