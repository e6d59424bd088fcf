use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

/// Cumulative CPU time counters, in clock ticks, as found on the `cpu` line
/// of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuStats {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuStats {
    pub fn idle_ticks(&self) -> u64 {
        self.idle + self.iowait
    }

    pub fn non_idle_ticks(&self) -> u64 {
        self.user + self.nice + self.system + self.irq + self.softirq + self.steal
    }

    pub fn total_ticks(&self) -> u64 {
        self.idle_ticks() + self.non_idle_ticks()
    }

    /// Fraction of time spent busy between `earlier` and `self`.
    /// Zero when no ticks elapsed.
    pub fn usage_since(&self, earlier: &CpuStats) -> f64 {
        let total = self.total_ticks().saturating_sub(earlier.total_ticks());
        let idle = self.idle_ticks().saturating_sub(earlier.idle_ticks());
        if total == 0 {
            return 0.0;
        }
        (total as f64 - idle as f64) / total as f64
    }
}

/// Node statistics snapshot served from `GET /stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub mem_total_kb: u64,
    pub mem_available_kb: u64,
    /// Bytes.
    pub disk_total: u64,
    /// Bytes.
    pub disk_free: u64,
    pub cpu_stats: CpuStats,
    pub task_count: u64,
}

impl Stats {
    pub fn mem_used_kb(&self) -> u64 {
        self.mem_total_kb.saturating_sub(self.mem_available_kb)
    }

    pub fn mem_used_percent(&self) -> f64 {
        if self.mem_total_kb == 0 {
            return 0.0;
        }
        self.mem_used_kb() as f64 / self.mem_total_kb as f64
    }

    pub fn disk_used(&self) -> u64 {
        self.disk_total.saturating_sub(self.disk_free)
    }
}

/// Source of host statistics for a worker.
pub trait StatsProvider: Send + Sync {
    fn stats(&self) -> Stats;
}

/// Reads memory and disk totals through sysinfo and CPU ticks from
/// `/proc/stat`. Counters the host does not expose are left at zero.
#[derive(Debug, Default)]
pub struct SystemStatsProvider;

impl StatsProvider for SystemStatsProvider {
    fn stats(&self) -> Stats {
        let mut sys = System::new();
        sys.refresh_memory();

        let disks = Disks::new_with_refreshed_list();
        let disk_total = disks.iter().map(|disk| disk.total_space()).sum();
        let disk_free = disks.iter().map(|disk| disk.available_space()).sum();

        let cpu_stats = std::fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|text| parse_proc_stat(&text))
            .unwrap_or_default();

        Stats {
            mem_total_kb: sys.total_memory() / 1024,
            mem_available_kb: sys.available_memory() / 1024,
            disk_total,
            disk_free,
            cpu_stats,
            task_count: 0,
        }
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
pub fn parse_proc_stat(text: &str) -> Option<CpuStats> {
    let line = text.lines().find(|line| line.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|field| field.parse().ok())
        .collect::<Option<_>>()?;
    let field = |i: usize| fields.get(i).copied().unwrap_or(0);

    Some(CpuStats {
        user: field(0),
        nice: field(1),
        system: field(2),
        idle: field(3),
        iowait: field(4),
        irq: field(5),
        softirq: field(6),
        steal: field(7),
        guest: field(8),
        guest_nice: field(9),
    })
}
