use std::io;

use log::warn;
use tokio_serial::{SerialPortInfo, SerialPortType, UsbPortInfo};

use crate::config::DeviceIdentity;

/// One enumerated serial device, as the OS describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub port: String,
    pub description: String,
}

impl Candidate {
    pub fn new(port: impl Into<String>, description: impl Into<String>) -> Self {
        Candidate {
            port: port.into(),
            description: description.into(),
        }
    }
}

pub trait DeviceLister {
    fn candidates(&self) -> io::Result<Vec<Candidate>>;
}

#[derive(Debug, Default)]
pub struct SerialLister;

impl DeviceLister for SerialLister {
    fn candidates(&self) -> io::Result<Vec<Candidate>> {
        Ok(tokio_serial::available_ports()?
            .into_iter()
            .map(|info| {
                let description = describe(&info);
                Candidate::new(info.port_name, description)
            })
            .collect())
    }
}

/// Hardware id line in the usual `USB VID:PID=XXXX:XXXX SER=...` shape.
fn describe(info: &SerialPortInfo) -> String {
    match info.port_type {
        SerialPortType::UsbPort(UsbPortInfo {
            vid,
            pid,
            ref serial_number,
            ..
        }) => match serial_number {
            Some(serial) => format!("USB VID:PID={:04X}:{:04X} SER={}", vid, pid, serial),
            None => format!("USB VID:PID={:04X}:{:04X}", vid, pid),
        },
        _ => "n/a".to_string(),
    }
}

/// First candidate, in enumeration order, whose description carries the identity.
pub fn locate<'a, I>(identity: &DeviceIdentity, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a Candidate>,
{
    let pattern = identity.match_pattern();

    candidates
        .into_iter()
        .find(|c| c.description.contains(&pattern))
        .map(|c| c.port.clone())
}

pub struct Locator<L> {
    lister: L,
}

impl<L: DeviceLister> Locator<L> {
    pub fn new(lister: L) -> Self {
        Locator { lister }
    }

    /// Enumerates afresh on every call. Enumeration errors count as not found.
    pub fn find(&self, identity: &DeviceIdentity) -> Option<String> {
        match self.lister.candidates() {
            Ok(candidates) => locate(identity, &candidates),
            Err(e) => {
                warn!("Serial port enumeration failed: {}", e);
                None
            }
        }
    }
}
