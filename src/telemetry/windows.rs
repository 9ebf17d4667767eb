use std::collections::HashMap;

use log::warn;
use wmi::*;

use super::{Sample, TelemetrySampler};

const CPU_QUERY: &str =
    "SELECT PercentProcessorTime FROM Win32_PerfFormattedData_PerfOS_Processor WHERE Name = '_Total'";
const MEMORY_QUERY: &str =
    "SELECT FreePhysicalMemory, TotalVisibleMemorySize FROM Win32_OperatingSystem";

pub struct HostSampler {
    con: Option<WMIConnection>,
    last: Sample,
}

impl HostSampler {
    pub fn new() -> HostSampler {
        HostSampler {
            con: connect().map_err(|e| warn!("WMI unavailable: {}", e)).ok(),
            last: Sample::default(),
        }
    }

    fn query(con: &WMIConnection) -> Result<Sample, WMIError> {
        let cpu = con
            .raw_query::<HashMap<String, Variant>>(CPU_QUERY)?
            .first()
            .and_then(|x| x.get("PercentProcessorTime"))
            .and_then(number)
            .unwrap_or(0.0);

        let os = con.raw_query::<HashMap<String, Variant>>(MEMORY_QUERY)?;
        let os = os.first();
        let free = os.and_then(|x| x.get("FreePhysicalMemory")).and_then(number);
        let total = os.and_then(|x| x.get("TotalVisibleMemorySize")).and_then(number);

        let ram = match (free, total) {
            (Some(free), Some(total)) if total > 0.0 => (total - free) / total * 1e2,
            _ => 0.0,
        };

        Ok(Sample {
            cpu: cpu as f32,
            ram: ram as f32,
        })
    }
}

impl TelemetrySampler for HostSampler {
    fn sample(&mut self) -> Sample {
        if self.con.is_none() {
            self.con = connect().ok();
        }

        if let Some(ref con) = self.con {
            match Self::query(con) {
                Ok(sample) => self.last = sample,
                Err(e) => {
                    warn!("WMI telemetry query failed: {}", e);
                    self.con = None;
                }
            }
        }

        self.last
    }
}

fn connect() -> Result<WMIConnection, WMIError> {
    WMIConnection::new(COMLibrary::new()?.into())
}

// uint64 properties arrive as strings over COM automation.
fn number(v: &Variant) -> Option<f64> {
    match v {
        Variant::String(s) => s.trim().parse().ok(),
        Variant::UI1(n) => Some(*n as f64),
        Variant::UI2(n) => Some(*n as f64),
        Variant::UI4(n) => Some(*n as f64),
        Variant::UI8(n) => Some(*n as f64),
        Variant::I1(n) => Some(*n as f64),
        Variant::I2(n) => Some(*n as f64),
        Variant::I4(n) => Some(*n as f64),
        Variant::I8(n) => Some(*n as f64),
        Variant::R4(n) => Some(*n as f64),
        Variant::R8(n) => Some(*n),
        _ => None,
    }
}
