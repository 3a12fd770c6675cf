use core::fmt;

/// 128-bit vendor identifier in the firmware's mixed-endian layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self { data1, data2, data3, data4 }
    }

    /// Decodes the 16 in-memory bytes (little-endian leading fields).
    pub fn from_bytes(b: &[u8; 16]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&b[8..16]);
        Self {
            data1: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            data2: u16::from_le_bytes([b[4], b[5]]),
            data3: u16::from_le_bytes([b[6], b[7]]),
            data4,
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BACKDOOR_GUID;

    #[test]
    fn bytes_keep_mixed_endian_layout() {
        let raw = BACKDOOR_GUID.to_bytes();
        assert_eq!(&raw[..4], &[0xfb, 0x99, 0xec, 0x3d]);
        assert_eq!(Guid::from_bytes(&raw), BACKDOOR_GUID);
    }

    #[test]
    fn display_matches_registry_format() {
        assert_eq!(
            BACKDOOR_GUID.to_string(),
            "3DEC99FB-86B4-4EED-B4D8-4E6ADDE56F95"
        );
    }
}
