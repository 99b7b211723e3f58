use std::convert::TryInto;
use std::ops::AddAssign;
use std::time::{Duration, Instant};

/// Accumulates the CPU time spent on individual work items, e.g. the tiles of one render phase.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WorkTimer {
    total_cpu_time: Duration,
    items_completed: u32,
}

impl WorkTimer {
    pub fn start() -> Self {
        Self::default()
    }

    pub fn total_cpu_time(&self) -> Duration {
        self.total_cpu_time
    }

    pub fn items_completed(&self) -> u32 {
        self.items_completed
    }

    pub fn complete_item(&mut self, d: Duration) {
        self.total_cpu_time += d;
        self.items_completed += 1;
    }

    /// Runs `work` and counts it as one completed item.
    pub fn time<T>(&mut self, work: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = work();
        self.complete_item(start.elapsed());
        out
    }

    pub fn average_cpu_time_us(&self) -> u32 {
        let cpu_time_us: u32 = self
            .total_cpu_time
            .as_micros()
            .try_into()
            .unwrap_or(u32::MAX);

        cpu_time_us / self.items_completed.max(1)
    }
}

impl AddAssign for WorkTimer {
    fn add_assign(&mut self, other: Self) {
        self.total_cpu_time += other.total_cpu_time;
        self.items_completed += other.items_completed;
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
