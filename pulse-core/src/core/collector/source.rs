use crate::core::collector::{CollectError, Result};
use crate::core::metrics::Metric;
use async_trait::async_trait;
use log::warn;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;
use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard};
use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind,
    System,
};

pub const RESIDENT_MEMORY: &str = "ResidentMemory";
pub const VIRTUAL_MEMORY: &str = "VirtualMemory";
pub const PROCESS_CPU: &str = "ProcessCPU";
pub const RANDOM_VALUE: &str = "RandomValue";
pub const TOTAL_MEMORY: &str = "TotalMemory";
pub const FREE_MEMORY: &str = "FreeMemory";
pub const CPU_UTILIZATION: &str = "CPUutilization";

/// A source of live readings which are refreshed into the registry on every poll tick.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait MetricSource: Debug + Send + Sync {
    /// Collect the current readings of the source.
    async fn collect(&self) -> Result<Vec<Metric>>;
}

/// The readings of the agent process itself, together with the `RandomValue` gauge.
#[derive(Debug)]
pub struct RuntimeSource {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl RuntimeSource {
    const NAME: &'static str = "runtime";

    pub fn new() -> Self {
        Self {
            pid: sysinfo::get_current_pid().ok(),
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for RuntimeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for RuntimeSource {
    async fn collect(&self) -> Result<Vec<Metric>> {
        let mut metrics = vec![Metric::gauge(RANDOM_VALUE, rand::random::<f64>())];
        match self.process_metrics() {
            Ok(e) => metrics.extend(e),
            Err(e) => warn!("Failed to collect process metrics, {}", e),
        }

        Ok(metrics)
    }
}

impl RuntimeSource {
    fn process_metrics(&self) -> Result<Vec<Metric>> {
        let pid = self.pid.ok_or_else(|| {
            CollectError::Unavailable(Self::NAME.to_string(), "process id is unknown".to_string())
        })?;

        let mut system = lock(Self::NAME, &self.system)?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
        let process = system.process(pid).ok_or_else(|| {
            CollectError::Unavailable(Self::NAME.to_string(), format!("process {} not found", pid))
        })?;

        Ok(vec![
            Metric::gauge(RESIDENT_MEMORY, process.memory() as f64),
            Metric::gauge(VIRTUAL_MEMORY, process.virtual_memory() as f64),
            Metric::gauge(PROCESS_CPU, process.cpu_usage() as f64),
        ])
    }
}

/// The readings of the host system, memory and the utilization of each logical cpu.
#[derive(Debug)]
pub struct SystemSource {
    system: Mutex<System>,
}

impl SystemSource {
    const NAME: &'static str = "system";

    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_memory(MemoryRefreshKind::everything())
            .with_cpu(CpuRefreshKind::everything());

        Self {
            system: Mutex::new(System::new_with_specifics(refresh_kind)),
        }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for SystemSource {
    async fn collect(&self) -> Result<Vec<Metric>> {
        let mut system = lock(Self::NAME, &self.system)?;
        system.refresh_memory();
        system.refresh_cpu_usage();

        let mut metrics = vec![
            Metric::gauge(TOTAL_MEMORY, system.total_memory() as f64),
            Metric::gauge(FREE_MEMORY, system.free_memory() as f64),
        ];
        metrics.extend(system.cpus().iter().enumerate().map(|(index, cpu)| {
            Metric::gauge(
                format!("{}{}", CPU_UTILIZATION, index + 1),
                cpu.cpu_usage() as f64,
            )
        }));

        Ok(metrics)
    }
}

fn lock<'a>(name: &str, system: &'a Mutex<System>) -> Result<MutexGuard<'a, System>> {
    system
        .lock()
        .map_err(|e| CollectError::Unavailable(name.to_string(), e.to_string()))
}
