// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Linux RFCOMM bridge.
//
// Printers are reached through kernel RFCOMM TTYs (`/dev/rfcommN`), either
// bound explicitly in the config or found in `/proc/net/rfcomm`. Binding is
// done outside the app:
//
//   $ bluetoothctl pair 00:11:62:XX:XX:XX
//   $ sudo rfcomm bind 0 00:11:62:XX:XX:XX
//
// The TTY is switched to raw mode so bitmap bytes such as 0x11 and 0x13 are
// not eaten by software flow control.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use tinta_core::config::DeviceBinding;
use tinta_core::error::{Result, TintaError};
use tinta_core::types::{Address, AdapterState, Capability, DiscoveryEvent, Endpoint, Origin};

use crate::traits::*;

const PROC_RFCOMM: &str = "/proc/net/rfcomm";
const SYS_BLUETOOTH: &str = "/sys/class/bluetooth";

/// Largest slice handed to the TTY in one write.
const CHUNK_SIZE: usize = 4096;

/// Pause between chunks so the printer buffer keeps up.
const CHUNK_DELAY: Duration = Duration::from_millis(2);

#[derive(Debug, Clone)]
struct Binding {
    address: Address,
    name: Option<String>,
    path: PathBuf,
}

/// Bridge backed by kernel RFCOMM device nodes.
#[derive(Debug, Clone)]
pub struct RfcommBridge {
    bindings: Vec<Binding>,
}

impl RfcommBridge {
    /// Build from configured bindings. Invalid addresses are skipped with a
    /// warning so one typo doesn't take out the whole device list.
    pub fn new(devices: &[DeviceBinding]) -> Self {
        let bindings = devices
            .iter()
            .filter_map(|d| match Address::parse(&d.address) {
                Ok(address) => Some(Binding {
                    address,
                    name: d.name.clone(),
                    path: d.path.clone(),
                }),
                Err(e) => {
                    warn!(error = %e, "ignoring device binding");
                    None
                }
            })
            .collect();
        Self { bindings }
    }

    fn kernel_bindings(&self) -> Vec<(PathBuf, Address)> {
        std::fs::read_to_string(PROC_RFCOMM)
            .map(|contents| parse_proc_rfcomm(&contents))
            .unwrap_or_default()
    }

    /// Device node for an address: configured bindings first, then whatever
    /// the kernel has bound.
    fn device_path(&self, address: &Address) -> Option<PathBuf> {
        self.bindings
            .iter()
            .find(|b| &b.address == address)
            .map(|b| b.path.clone())
            .or_else(|| {
                self.kernel_bindings()
                    .into_iter()
                    .find(|(path, bound)| bound == address && path.exists())
                    .map(|(path, _)| path)
            })
    }

    fn configured_endpoints(&self) -> Vec<Endpoint> {
        self.bindings
            .iter()
            .map(|b| Endpoint::new(b.address.clone(), b.name.clone(), Origin::Paired))
            .collect()
    }
}

impl PlatformBridge for RfcommBridge {
    fn platform_name(&self) -> &str {
        "Linux RFCOMM"
    }
}

impl BluetoothAdapter for RfcommBridge {
    fn adapter_state(&self) -> AdapterState {
        match controller_state(Path::new(SYS_BLUETOOTH)) {
            // No sysfs view (containers, odd kernels) but a bound node exists.
            AdapterState::Unavailable if self.bindings.iter().any(|b| b.path.exists()) => {
                AdapterState::Enabled
            }
            state => state,
        }
    }

    fn list_paired_endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(self.configured_endpoints())
    }

    fn resolve_address(&self, address: &Address) -> Result<Endpoint> {
        if let Some(binding) = self.bindings.iter().find(|b| &b.address == address) {
            return Ok(Endpoint::new(
                binding.address.clone(),
                binding.name.clone(),
                Origin::Paired,
            ));
        }
        match self.device_path(address) {
            Some(_) => Ok(Endpoint::discovered(address.clone(), None)),
            None => Err(TintaError::EndpointNotFound(address.to_string())),
        }
    }

    /// Reports kernel RFCOMM bindings that are not in the config. Inquiry
    /// scanning needs BlueZ and is left to `bluetoothctl`.
    fn start_discovery(&self, events: UnboundedSender<DiscoveryEvent>) -> Result<()> {
        let known: Vec<Address> = self.bindings.iter().map(|b| b.address.clone()).collect();
        let found: Vec<Endpoint> = self
            .kernel_bindings()
            .into_iter()
            .filter(|(_, address)| !known.contains(address))
            .map(|(_, address)| Endpoint::discovered(address, None))
            .collect();

        info!(count = found.len(), "RFCOMM scan complete");
        std::thread::Builder::new()
            .name("rfcomm-discovery".into())
            .spawn(move || {
                for endpoint in found {
                    if events.send(DiscoveryEvent::DeviceFound(endpoint)).is_err() {
                        return;
                    }
                }
                let _ = events.send(DiscoveryEvent::DiscoveryFinished);
            })?;
        Ok(())
    }

    fn cancel_discovery(&self) -> Result<()> {
        Ok(())
    }

    fn is_discovering(&self) -> bool {
        false
    }
}

impl PermissionGate for RfcommBridge {
    fn permission_granted(&self, capability: Capability) -> bool {
        match capability {
            Capability::Scan => true,
            // Denied if any existing node is not writable (usually a missing
            // `dialout` group membership).
            Capability::Connect => self
                .bindings
                .iter()
                .filter(|b| b.path.exists())
                .all(|b| is_writable(&b.path)),
        }
    }

    fn request_permissions(&self, capabilities: &[Capability]) -> Result<()> {
        if capabilities.contains(&Capability::Connect) && !self.permission_granted(Capability::Connect) {
            warn!("RFCOMM device not writable; add this user to the group owning /dev/rfcomm*");
        }
        Ok(())
    }
}

#[async_trait]
impl SerialTransport for RfcommBridge {
    async fn open_channel(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>> {
        let path = self
            .device_path(&endpoint.address)
            .ok_or_else(|| TintaError::EndpointNotFound(endpoint.address.to_string()))?;

        debug!(path = %path.display(), "opening RFCOMM device");
        let open_path = path.clone();
        let file = tokio::task::spawn_blocking(move || open_raw(&open_path))
            .await
            .map_err(|e| TintaError::TransientIo(format!("open task failed: {e}")))?
            .map_err(|e| map_open_error(e, &endpoint.address))?;

        Ok(Box::new(RfcommChannel {
            file: tokio::fs::File::from_std(file),
            path,
        }))
    }
}

struct RfcommChannel {
    file: tokio::fs::File,
    path: PathBuf,
}

#[async_trait]
impl Channel for RfcommChannel {
    async fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut sent = 0;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            match send_chunk(&mut self.file, chunk).await {
                Ok(()) => sent += chunk.len(),
                Err(e) if sent > 0 => {
                    warn!(path = %self.path.display(), error = %e, sent, "write cut short");
                    return Ok(sent);
                }
                Err(e) => return Err(TintaError::TransientIo(format!("write failed: {e}"))),
            }
            if sent < bytes.len() {
                tokio::time::sleep(CHUNK_DELAY).await;
            }
        }
        Ok(sent)
    }

    async fn close(&mut self) -> Result<()> {
        self.file
            .flush()
            .await
            .map_err(|e| TintaError::TransientIo(format!("flush failed: {e}")))?;
        debug!(path = %self.path.display(), "RFCOMM device released");
        Ok(())
    }
}

/// Hand one chunk to the TTY and wait until the kernel has taken it. A
/// tokio file only reports a failed write on the next write or flush, so
/// every chunk is flushed before it counts as sent.
async fn send_chunk(file: &mut tokio::fs::File, chunk: &[u8]) -> io::Result<()> {
    file.write_all(chunk).await?;
    file.flush().await
}

fn map_open_error(err: io::Error, address: &Address) -> TintaError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => TintaError::PermissionDenied(Capability::Connect),
        io::ErrorKind::NotFound => TintaError::EndpointNotFound(address.to_string()),
        _ => TintaError::TransientIo(format!("open failed: {err}")),
    }
}

fn open_raw(path: &Path) -> io::Result<std::fs::File> {
    let file = OpenOptions::new().write(true).open(path)?;
    configure_tty_raw(file.as_raw_fd())?;
    Ok(file)
}

/// Controller state from sysfs. `Disabled` when every `hciN` controller is
/// rfkill-blocked. A controller powered off through BlueZ without rfkill
/// still reads as `Enabled`; that state lives in D-Bus, not sysfs.
fn controller_state(root: &Path) -> AdapterState {
    let Ok(entries) = std::fs::read_dir(root) else {
        return AdapterState::Unavailable;
    };
    let mut found = false;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        // `hci0:256` style entries are connections, not controllers.
        if !name.starts_with("hci") || name.contains(':') {
            continue;
        }
        found = true;
        if !is_rfkill_blocked(&entry.path()) {
            return AdapterState::Enabled;
        }
    }
    if found {
        AdapterState::Disabled
    } else {
        AdapterState::Unavailable
    }
}

fn is_rfkill_blocked(controller: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(controller) else {
        return false;
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("rfkill"))
        .any(|e| {
            ["soft", "hard"].iter().any(|flag| {
                std::fs::read_to_string(e.path().join(flag))
                    .map(|v| v.trim() == "1")
                    .unwrap_or(false)
            })
        })
}

fn is_writable(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

/// Put a TTY into raw 8N1 mode with no flow control or line processing.
fn configure_tty_raw(fd: i32) -> io::Result<()> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Parse `/proc/net/rfcomm` lines of the form
/// `rfcomm0: <local> -> <remote> channel 1 clean`.
fn parse_proc_rfcomm(contents: &str) -> Vec<(PathBuf, Address)> {
    contents
        .lines()
        .filter_map(|line| {
            let (device, rest) = line.split_once(": ")?;
            let device = device.trim();
            if !device.starts_with("rfcomm") {
                return None;
            }
            let remote = match rest.split_once("->") {
                Some((_, remote)) => remote,
                None => rest,
            };
            let address = remote
                .split_whitespace()
                .find_map(|token| Address::parse(token).ok())?;
            Some((PathBuf::from(format!("/dev/{device}")), address))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_on(path: &str) -> RfcommChannel {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        RfcommChannel {
            file: tokio::fs::File::from_std(file),
            path: PathBuf::from(path),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn failed_write_is_reported_by_write_not_close() {
        let mut channel = channel_on("/dev/full");
        let result = channel.write(b"HELLO RECEIPT").await;
        assert!(matches!(result, Err(TintaError::TransientIo(_))), "{result:?}");
    }

    #[tokio::test]
    async fn successful_write_counts_every_byte() {
        let mut channel = channel_on("/dev/null");
        let bytes = vec![b'x'; CHUNK_SIZE + 10];
        assert_eq!(channel.write(&bytes).await.unwrap(), bytes.len());
        channel.close().await.unwrap();
    }

    fn controller(root: &Path, name: &str, soft: &str) {
        let rfkill = root.join(name).join("rfkill0");
        std::fs::create_dir_all(&rfkill).unwrap();
        std::fs::write(rfkill.join("soft"), soft).unwrap();
        std::fs::write(rfkill.join("hard"), "0\n").unwrap();
    }

    #[test]
    fn blocked_controller_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        controller(dir.path(), "hci0", "1\n");
        assert_eq!(controller_state(dir.path()), AdapterState::Disabled);
    }

    #[test]
    fn one_unblocked_controller_is_enough() {
        let dir = tempfile::tempdir().unwrap();
        controller(dir.path(), "hci0", "1\n");
        controller(dir.path(), "hci1", "0\n");
        std::fs::create_dir_all(dir.path().join("hci0:256")).unwrap();
        assert_eq!(controller_state(dir.path()), AdapterState::Enabled);
    }

    #[test]
    fn no_controllers_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(controller_state(dir.path()), AdapterState::Unavailable);
        assert_eq!(
            controller_state(&dir.path().join("missing")),
            AdapterState::Unavailable
        );
    }

    #[test]
    fn parses_kernel_binding_table() {
        let table = "rfcomm0: 00:1A:7D:DA:71:13 -> 00:11:62:aa:bb:cc channel 1 clean\n\
                     rfcomm1: 00:1A:7D:DA:71:13 -> 66:55:44:33:22:11 channel 1 connected\n\
                     garbage line\n";
        let parsed = parse_proc_rfcomm(table);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, PathBuf::from("/dev/rfcomm0"));
        assert_eq!(parsed[0].1.as_str(), "00:11:62:AA:BB:CC");
        assert_eq!(parsed[1].1.as_str(), "66:55:44:33:22:11");
    }

    #[test]
    fn invalid_bindings_are_skipped() {
        let bridge = RfcommBridge::new(&[
            DeviceBinding {
                address: "not-an-address".into(),
                name: None,
                path: "/dev/rfcomm9".into(),
            },
            DeviceBinding {
                address: "00:11:62:aa:bb:cc".into(),
                name: Some("Counter".into()),
                path: "/dev/rfcomm0".into(),
            },
        ]);
        let paired = bridge.list_paired_endpoints().unwrap();
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0].display_name, "Counter");
    }

    #[test]
    fn configured_binding_resolves_with_name() {
        let bridge = RfcommBridge::new(&[DeviceBinding {
            address: "00:11:62:AA:BB:CC".into(),
            name: Some("Counter".into()),
            path: "/dev/rfcomm0".into(),
        }]);
        let ep = bridge
            .resolve_address(&Address::parse("00:11:62:aa:bb:cc").unwrap())
            .unwrap();
        assert_eq!(ep.display_name, "Counter");
    }
}
