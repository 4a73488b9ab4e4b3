//! Worker-id derivation for callers that don't assign one explicitly.
//!
//! None of these sources guarantee cross-process uniqueness; callers that
//! need a hard guarantee must assign worker ids themselves.

use jiff::Timestamp;
use std::fs;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Derives a worker id in `[1, max_worker_id]` from local machine identity.
///
/// Tries the low-order bits of the first usable network hardware address,
/// then an FNV-1a hash over stable host identifiers and the pid, finally
/// the clock's nanosecond remainder.
pub fn derive_worker_id(max_worker_id: u16) -> u16 {
    debug_assert!(max_worker_id >= 1);
    let raw = mac_worker_id().unwrap_or_else(host_hash_id);
    1 + (raw % u64::from(max_worker_id)) as u16
}

/// Low bits of the first non-loopback MAC address, read from sysfs.
fn mac_worker_id() -> Option<u64> {
    let entries = fs::read_dir("/sys/class/net").ok()?;
    for entry in entries.flatten() {
        let Ok(address) = fs::read_to_string(entry.path().join("address")) else {
            continue;
        };
        let octets: Vec<u64> = address
            .trim()
            .split(':')
            .filter_map(|part| u64::from_str_radix(part, 16).ok())
            .collect();
        if octets.len() != 6 || octets.iter().all(|octet| *octet == 0) {
            continue;
        }
        return Some(((octets[4] & 3) << 8) | octets[5]);
    }
    None
}

fn host_hash_id() -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut identified = false;

    if let Ok(machine_id) = fs::read_to_string("/etc/machine-id") {
        identified = true;
        hash = fnv_mix(hash, machine_id.trim().as_bytes());
    }
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        identified = true;
        hash = fnv_mix(hash, hostname.as_bytes());
    }
    // The pid keeps co-located processes apart even on identical hosts.
    hash = fnv_mix(hash, std::process::id().to_string().as_bytes());

    if !identified {
        let nanos = Timestamp::now().subsec_nanosecond();
        hash = fnv_mix(hash, &nanos.to_le_bytes());
    }

    hash
}

fn fnv_mix(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_id_stays_within_the_requested_range() {
        for max in [1, 3, 63, 1023, 32_767] {
            let id = derive_worker_id(max);
            assert!((1..=max).contains(&id), "id {id} out of range for max {max}");
        }
    }

    #[test]
    fn host_hash_is_not_trivially_zero() {
        assert_ne!(host_hash_id(), 0);
    }

    #[test]
    fn fnv_mix_differs_for_different_inputs() {
        let a = fnv_mix(FNV_OFFSET_BASIS, b"node-a");
        let b = fnv_mix(FNV_OFFSET_BASIS, b"node-b");
        assert_ne!(a, b);
    }
}
