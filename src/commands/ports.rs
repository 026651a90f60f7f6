//! Ports command implementation

use crate::transports;
use mpdev_command::available_ports;

/// List serial ports and the transports compiled in
pub fn run_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = available_ports()?;

    if ports.is_empty() {
        println!("No serial ports found");
    } else {
        println!("Serial ports:");
        println!();
        for port in &ports {
            println!("  {:<20} {}", port.name, port.description);
        }
    }

    println!();
    print!("{}", transports::transport_help());
    Ok(())
}
