//! Provedor de informações do dispositivo host.
//!
//! - `sysinfo`: CPU, RAM, uptime e hostname para o snapshot de status
//! - `/sys/class/net/*/address`: endereço de hardware da primeira interface
//!   não-loopback
//! - arquivo de série: campo bruto de 32 bytes

use luki_core::AgentConfig;
use luki_core::DeviceInfoProvider;
use luki_core::identity::{SERIAL_FIELD_LEN, SerialField};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, info, warn};

const NET_CLASS_DIR: &str = "/sys/class/net";
const NULL_ADDRESS: &str = "00:00:00:00:00:00";

/// Dispositivo host.
pub struct HostDevice {
    sys: Mutex<System>,
    hardware_address: String,
    serial_file: Option<PathBuf>,
}

impl HostDevice {
    pub fn new(config: &AgentConfig) -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        let hardware_address = if config.hardware_address.trim().is_empty() {
            match detect_hardware_address(Path::new(NET_CLASS_DIR)) {
                Some(address) => {
                    info!("✓ Endereço de hardware detectado: {address}");
                    address
                }
                None => {
                    warn!("✗ Nenhuma interface de rede com endereço, usando {NULL_ADDRESS}");
                    NULL_ADDRESS.to_string()
                }
            }
        } else {
            config.hardware_address.trim().to_string()
        };

        let serial_file = (!config.serial_file.is_empty()).then(|| PathBuf::from(&config.serial_file));

        Self {
            sys: Mutex::new(sys),
            hardware_address,
            serial_file,
        }
    }

    fn status_json(sys: &System) -> serde_json::Value {
        let total = sys.total_memory() as f64;
        let used = sys.used_memory() as f64;
        let percent = if total > 0.0 { used / total * 100.0 } else { 0.0 };

        json!({
            "hostname": System::host_name().unwrap_or_default(),
            "uptime_secs": System::uptime(),
            "cpu_usage": round1(f64::from(sys.global_cpu_usage())),
            "memory": {
                "used_mb": (used / (1024.0 * 1024.0)) as u64,
                "total_mb": (total / (1024.0 * 1024.0)) as u64,
                "percent": round1(percent),
            },
        })
    }
}

impl DeviceInfoProvider for HostDevice {
    fn hardware_address(&self) -> String {
        self.hardware_address.clone()
    }

    fn device_status_snapshot(&self) -> String {
        let mut sys = self.sys.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_cpu_all();
        sys.refresh_memory();
        Self::status_json(&sys).to_string()
    }

    fn serial_number_field(&self) -> Option<SerialField> {
        let path = self.serial_file.as_ref()?;
        match fs::read(path) {
            Ok(bytes) => Some(serial_field_from(&bytes)),
            Err(e) => {
                debug!("Arquivo de série {} ilegível: {e}", path.display());
                None
            }
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Copia até [`SERIAL_FIELD_LEN`] bytes; o restante fica zerado.
fn serial_field_from(bytes: &[u8]) -> SerialField {
    let mut field = [0u8; SERIAL_FIELD_LEN];
    let len = bytes.len().min(SERIAL_FIELD_LEN);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// Primeira interface (ordem alfabética) com endereço não nulo, ignorando `lo`.
fn detect_hardware_address(net_dir: &Path) -> Option<String> {
    let mut names: Vec<_> = fs::read_dir(net_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "lo")
        .collect();
    names.sort();

    names.into_iter().find_map(|name| {
        let address = fs::read_to_string(net_dir.join(&name).join("address")).ok()?;
        let address = address.trim();
        (!address.is_empty() && address != NULL_ADDRESS).then(|| address.to_string())
    })
}
