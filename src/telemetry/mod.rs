#[cfg(not(windows))]
mod portable;
#[cfg(windows)]
mod windows;

#[cfg(not(windows))]
pub use portable::HostSampler;
#[cfg(windows)]
pub use self::windows::HostSampler;

/// Raw utilisation percentages as the OS reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub cpu: f32,
    pub ram: f32,
}

pub trait TelemetrySampler {
    fn sample(&mut self) -> Sample;
}

/// One tick worth of telemetry; both fields are always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    cpu: u8,
    ram: u8,
}

impl Frame {
    pub const LEN: usize = 2;

    pub fn cpu(&self) -> u8 {
        self.cpu
    }

    pub fn ram(&self) -> u8 {
        self.ram
    }

    pub fn encode(&self) -> [u8; Frame::LEN] {
        [self.cpu, self.ram]
    }
}

impl From<Sample> for Frame {
    fn from(sample: Sample) -> Self {
        Frame {
            cpu: percent(sample.cpu),
            ram: percent(sample.ram),
        }
    }
}

fn percent(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }

    value.clamp(0.0, 100.0) as u8
}
