//! Identidade do dispositivo: client id por boot e número de série.

use std::time::{SystemTime, UNIX_EPOCH};

/// Tamanho do campo persistido que guarda o número de série.
pub const SERIAL_FIELD_LEN: usize = 32;

/// Campo bruto do número de série (bytes terminados em NUL).
pub type SerialField = [u8; SERIAL_FIELD_LEN];

/// Fonte de tempo em segundos desde a epoch.
pub trait Clock: Send + Sync {
    fn epoch_secs(&self) -> u64;
}

/// Relógio do sistema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Identidade estática incluída em todo envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub mac_address: String,
    pub serial_number: Option<String>,
}

/// Remove separadores (`:`, `-`, `.`) do endereço de hardware.
pub fn normalize_hardware_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.') && !c.is_whitespace())
        .collect()
}

/// `prefix + normalize(hw) + "_" + boot_epoch`.
///
/// O epoch de boot garante um id novo a cada boot, evitando colisão com a
/// sessão anterior ainda registrada no broker.
pub fn client_id(prefix: &str, hardware_address: &str, boot_epoch: u64) -> String {
    format!(
        "{prefix}{}_{boot_epoch}",
        normalize_hardware_address(hardware_address)
    )
}

/// Decodifica o número de série do campo persistido.
///
/// Ausente quando o campo não existe, é todo zero ou começa com NUL.
pub fn serial_number(field: Option<&SerialField>) -> Option<String> {
    let field = field?;
    if field[0] == 0 {
        return None;
    }
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let serial = String::from_utf8_lossy(&field[..end]).trim().to_string();
    (!serial.is_empty()).then_some(serial)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(text: &str) -> SerialField {
        let mut f = [0u8; SERIAL_FIELD_LEN];
        f[..text.len()].copy_from_slice(text.as_bytes());
        f
    }

    #[test]
    fn client_id_from_prefix_mac_and_boot_epoch() {
        assert_eq!(
            client_id("dev", "AA:BB:CC:DD:EE:FF", 1000),
            "devAABBCCDDEEFF_1000"
        );
    }

    #[test]
    fn normalize_strips_all_separators() {
        assert_eq!(normalize_hardware_address("aa-bb.cc:dd ee"), "aabbccddee");
    }

    #[test]
    fn serial_absent_when_unset_or_zeroed() {
        assert_eq!(serial_number(None), None);
        assert_eq!(serial_number(Some(&[0u8; SERIAL_FIELD_LEN])), None);
    }

    #[test]
    fn serial_stops_at_first_nul() {
        assert_eq!(
            serial_number(Some(&field("LK1-0042"))),
            Some("LK1-0042".to_string())
        );
    }

    #[test]
    fn serial_uses_full_field_without_terminator() {
        let full = "A".repeat(SERIAL_FIELD_LEN);
        assert_eq!(serial_number(Some(&field(&full))), Some(full));
    }
}
