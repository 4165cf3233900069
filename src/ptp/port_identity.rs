// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port identity construction: EUI-64 expansion of an interface MAC, or a
//! random fallback when no MAC is available.

use super::message::PortIdentity;

const FIXED_PORT_NUMBER: [u8; 2] = [0x00, 0x01];

/// `mac[0..3] | 0xFF 0xFE | mac[3..6]`, followed by the fixed port number.
pub fn from_mac(mac: [u8; 6]) -> PortIdentity {
    let mut id = [0u8; 10];
    id[0..3].copy_from_slice(&mac[0..3]);
    id[3] = 0xFF;
    id[4] = 0xFE;
    id[5..8].copy_from_slice(&mac[3..6]);
    id[8..10].copy_from_slice(&FIXED_PORT_NUMBER);
    id
}

/// A random 8-byte clock ID, used when no interface MAC is available.
pub fn random_fallback() -> PortIdentity {
    let mut id = [0u8; 10];
    let clock_id: [u8; 8] = rand::random();
    id[0..8].copy_from_slice(&clock_id);
    id[8..10].copy_from_slice(&FIXED_PORT_NUMBER);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eui64_expansion_matches_layout() {
        let mac = [0x00, 0x1B, 0x21, 0x3C, 0x4D, 0x5E];
        let id = from_mac(mac);
        assert_eq!(id, [0x00, 0x1B, 0x21, 0xFF, 0xFE, 0x3C, 0x4D, 0x5E, 0x00, 0x01]);
    }
}
