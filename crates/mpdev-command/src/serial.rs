//! Serial port helpers
//!
//! Listing the ports of the host, and stopping a running program on the
//! device before the file tool takes over the line. A MicroPython board that
//! is busy running `main.py` will not answer the raw REPL, so the file tool
//! fails until the program is interrupted.

use mpdev_core::error::{Error, Result};
use mpdev_core::RetryPolicy;
use serialport::SerialPortType;
use std::io::Write;
use std::time::Duration;

const CTRL_C: u8 = 0x03;
const INTERRUPT_COUNT: usize = 4;
const INTERRUPT_GAP: Duration = Duration::from_millis(100);
const INTERRUPT_SETTLE: Duration = Duration::from_secs(1);

/// A serial port found on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device name (`/dev/ttyUSB0`, `COM3`)
    pub name: String,
    /// Human readable description
    pub description: String,
}

/// Enumerate serial ports
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|e| Error::Connection {
        endpoint: "serial ports".to_string(),
        reason: e.to_string(),
    })?;

    Ok(ports
        .into_iter()
        .map(|p| PortInfo {
            description: describe(&p.port_type),
            name: p.port_name,
        })
        .collect())
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("USB serial");
            match usb.manufacturer.as_deref() {
                Some(m) => format!("{} ({}) [{:04x}:{:04x}]", product, m, usb.vid, usb.pid),
                None => format!("{} [{:04x}:{:04x}]", product, usb.vid, usb.pid),
            }
        }
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::Unknown => "Unknown".to_string(),
    }
}

/// Send Ctrl-C a few times to stop whatever the board is running
pub async fn interrupt_program(port: &str, baud: u32) -> Result<()> {
    let name = port.to_string();
    tokio::task::spawn_blocking(move || send_interrupts(&name, baud))
        .await
        .map_err(|e| Error::Protocol(format!("interrupt task failed: {}", e)))??;

    tokio::time::sleep(INTERRUPT_SETTLE).await;
    log::debug!("Interrupted running program on {}", port);
    Ok(())
}

/// [`interrupt_program`] under a retry policy
///
/// The board may still be resetting when the port first appears, so opening
/// it is retried.
pub async fn interrupt_with_retry(port: &str, baud: u32, policy: RetryPolicy) -> Result<()> {
    let mut attempts = policy.attempts(format!("interrupt {}", port));
    loop {
        attempts.start();
        match interrupt_program(port, baud).await {
            Ok(()) => return Ok(()),
            Err(e) => attempts.failed(e).await?,
        }
    }
}

fn send_interrupts(port: &str, baud: u32) -> Result<()> {
    let mut serial = serialport::new(port, baud)
        .timeout(Duration::from_secs(1))
        .open()
        .map_err(|e| Error::Connection {
            endpoint: port.to_string(),
            reason: e.to_string(),
        })?;

    for _ in 0..INTERRUPT_COUNT {
        serial.write_all(&[CTRL_C])?;
        serial.flush()?;
        std::thread::sleep(INTERRUPT_GAP);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpdev_core::ErrorKind;

    #[tokio::test]
    async fn test_interrupt_missing_port_is_connection_error() {
        let err = interrupt_program("/dev/mpdev-no-such-port", 115200)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
