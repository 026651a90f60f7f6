//! Transport registration and dispatch
//!
//! Picks the transport for an endpoint, with support for feature-gated
//! inclusion, and forwards [`Transport`] calls to it.

use crate::config::Config;
use mpdev_command::CommandTransport;
use mpdev_core::{
    Endpoint, Error, FirmwareOp, ProgressSink, Result, RetryPolicy, TransferJob, Transport,
};

#[cfg(feature = "dummy")]
use mpdev_dummy::DummyDevice;
#[cfg(feature = "socket")]
use mpdev_socket::SocketTransport;

/// Serial port name that selects the in-memory device
pub const DUMMY_ENDPOINT: &str = "dummy";

/// Information about a transport
pub struct TransportInfo {
    /// Name shown to the user
    pub name: &'static str,
    /// Endpoint forms it handles
    pub description: &'static str,
}

/// Get information about all available transports (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_transports() -> Vec<TransportInfo> {
    let mut transports = Vec::new();

    transports.push(TransportInfo {
        name: "command",
        description: "External tools over a serial port (/dev/ttyUSB0, COM3); OTA flashing via scheme://host",
    });

    #[cfg(feature = "socket")]
    transports.push(TransportInfo {
        name: "socket",
        description: "Persistent websocket to the device (host:port)",
    });

    #[cfg(feature = "dummy")]
    transports.push(TransportInfo {
        name: "dummy",
        description: "In-memory device for testing (endpoint `dummy`)",
    });

    transports
}

/// Generate help text listing all available transports
pub fn transport_help() -> String {
    let mut help = String::from("Available transports:\n");
    for t in available_transports() {
        help.push_str(&format!("  {:8} - {}\n", t.name, t.description));
    }
    help
}

/// A device transport selected at run time
pub enum DeviceTransport {
    /// One external process per operation
    Command(CommandTransport),
    /// Persistent websocket
    #[cfg(feature = "socket")]
    Socket(SocketTransport),
    /// In-memory device
    #[cfg(feature = "dummy")]
    Dummy(DummyDevice),
}

macro_rules! dispatch {
    ($self:ident, $t:ident => $call:expr) => {
        match $self {
            DeviceTransport::Command($t) => $call,
            #[cfg(feature = "socket")]
            DeviceTransport::Socket($t) => $call,
            #[cfg(feature = "dummy")]
            DeviceTransport::Dummy($t) => $call,
        }
    };
}

impl DeviceTransport {
    /// Short transport name
    pub fn name(&self) -> &'static str {
        match self {
            DeviceTransport::Command(_) => "command",
            #[cfg(feature = "socket")]
            DeviceTransport::Socket(_) => "socket",
            #[cfg(feature = "dummy")]
            DeviceTransport::Dummy(_) => "dummy",
        }
    }

    /// Retry policy for uploads over this transport
    pub fn upload_policy(&self) -> RetryPolicy {
        match self {
            #[cfg(feature = "socket")]
            DeviceTransport::Socket(_) => RetryPolicy::socket_transfer(),
            _ => RetryPolicy::file_put(),
        }
    }

    /// True if a REPL session can be opened on the same endpoint afterwards
    pub fn supports_session(&self) -> bool {
        matches!(self, DeviceTransport::Command(t) if t.endpoint().serial_port().is_some())
    }
}

/// True for the endpoint naming the in-memory device
pub fn is_dummy(endpoint: &Endpoint) -> bool {
    cfg!(feature = "dummy") && endpoint.serial_port() == Some(DUMMY_ENDPOINT)
}

/// Open the transport for file operations (list, delete, sync)
pub async fn open_files(endpoint: &Endpoint, config: &Config) -> Result<DeviceTransport> {
    #[cfg(feature = "dummy")]
    if is_dummy(endpoint) {
        return Ok(DeviceTransport::Dummy(DummyDevice::new_default()));
    }

    match endpoint {
        Endpoint::Serial(_) => Ok(DeviceTransport::Command(CommandTransport::new(
            endpoint.clone(),
            config.tool_paths(),
        ))),
        Endpoint::Socket { .. } => connect_socket(endpoint, config).await,
        Endpoint::Url { .. } => Err(Error::InvalidEndpoint(format!(
            "{} can only be used for flashing",
            endpoint
        ))),
    }
}

/// Open the transport for firmware operations
///
/// The flash tool reaches network endpoints by itself, so only the dummy
/// device is special.
pub fn open_flash(endpoint: &Endpoint, config: &Config) -> DeviceTransport {
    #[cfg(feature = "dummy")]
    if is_dummy(endpoint) {
        return DeviceTransport::Dummy(DummyDevice::new_default());
    }
    DeviceTransport::Command(CommandTransport::new(endpoint.clone(), config.tool_paths()))
}

/// Serial transport used when the socket could not be reached
pub fn serial_fallback(port: &str, config: &Config) -> DeviceTransport {
    DeviceTransport::Command(CommandTransport::new(
        Endpoint::Serial(port.to_string()),
        config.tool_paths(),
    ))
}

#[cfg(feature = "socket")]
async fn connect_socket(endpoint: &Endpoint, config: &Config) -> Result<DeviceTransport> {
    let transport = SocketTransport::connect(endpoint.clone(), config.socket_config()).await?;
    log::info!("Connected to {}", transport.url());
    Ok(DeviceTransport::Socket(transport))
}

#[cfg(not(feature = "socket"))]
async fn connect_socket(_endpoint: &Endpoint, _config: &Config) -> Result<DeviceTransport> {
    Err(Error::Unsupported(
        "socket endpoints (built without the `socket` feature)",
    ))
}

impl Transport for DeviceTransport {
    fn endpoint(&self) -> &Endpoint {
        dispatch!(self, t => t.endpoint())
    }

    async fn list_entries(&mut self, path: &str) -> Result<Vec<String>> {
        dispatch!(self, t => t.list_entries(path).await)
    }

    async fn delete_file(&mut self, path: &str) -> Result<()> {
        dispatch!(self, t => t.delete_file(path).await)
    }

    async fn delete_dir(&mut self, path: &str) -> Result<()> {
        dispatch!(self, t => t.delete_dir(path).await)
    }

    async fn make_dir(&mut self, path: &str) -> Result<()> {
        dispatch!(self, t => t.make_dir(path).await)
    }

    async fn put_file(
        &mut self,
        job: &mut TransferJob,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        dispatch!(self, t => t.put_file(job, progress).await)
    }

    async fn run_firmware_op(
        &mut self,
        op: &FirmwareOp,
        progress: &mut dyn ProgressSink,
    ) -> Result<String> {
        dispatch!(self, t => t.run_firmware_op(op, progress).await)
    }

    fn creates_parents(&self) -> bool {
        dispatch!(self, t => t.creates_parents())
    }

    async fn close(&mut self) -> Result<()> {
        dispatch!(self, t => t.close().await)
    }
}
