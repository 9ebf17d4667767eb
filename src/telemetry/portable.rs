use sysinfo::System;

use super::{Sample, TelemetrySampler};

pub struct HostSampler {
    sys: System,
}

impl HostSampler {
    pub fn new() -> HostSampler {
        let mut sys = System::new();
        // CPU usage is a delta between two refreshes, so prime the first one.
        sys.refresh_cpu();

        HostSampler { sys }
    }
}

impl TelemetrySampler for HostSampler {
    fn sample(&mut self) -> Sample {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        let ram = if total == 0 {
            0.0
        } else {
            let used = total.saturating_sub(self.sys.available_memory());
            (used as f64 / total as f64 * 1e2) as f32
        };

        Sample {
            cpu: self.sys.global_cpu_info().cpu_usage(),
            ram,
        }
    }
}
