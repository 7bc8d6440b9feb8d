//! BTLE UUIDs: 16-bit short form and 128-bit canonical form, compared as
//! the same logical value when the 16-bit form equals the well-known bits
//! of the 128-bit Bluetooth base UUID.

/// The Bluetooth SIG base UUID, `0000xxxx-0000-1000-8000-00805F9B34FB`,
/// with the 16-bit slot zeroed.
const BASE_UUID: [u8; 16] =
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uuid {
    Short(u16),
    Full([u8; 16]),
}

impl Uuid {
    /// Expand to the canonical 128-bit byte form (big-endian, RFC 4122 field
    /// order) for comparison.
    fn expand(self) -> [u8; 16] {
        match self {
            Self::Full(bytes) => bytes,
            Self::Short(short) => {
                let mut bytes = BASE_UUID;
                bytes[2] = (short >> 8) as u8;
                bytes[3] = short as u8;
                bytes
            }
        }
    }

    /// Are `self` and `other` the same logical UUID once normalized to
    /// 128 bits?
    pub fn matches(self, other: Uuid) -> bool {
        self.expand() == other.expand()
    }

    /// Parse `0xABCD` (16-bit) or a canonical 128-bit
    /// `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` string.
    pub fn parse(s: &str) -> Option<Uuid> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u16::from_str_radix(hex, 16).ok().map(Uuid::Short);
        }
        if s.len() == 36 {
            let mut bytes = [0u8; 16];
            let hex: heapless::String<32> = s.chars().filter(|c| *c != '-').collect();
            if hex.len() != 32 {
                return None;
            }
            for i in 0..16 {
                bytes[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
            }
            return Some(Uuid::Full(bytes));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_equivalent_full_form_match() {
        let short = Uuid::Short(0x1800);
        let mut bytes = BASE_UUID;
        bytes[2] = 0x18;
        bytes[3] = 0x00;
        assert!(short.matches(Uuid::Full(bytes)));
    }

    #[test]
    fn different_short_uuids_do_not_match() {
        assert!(!Uuid::Short(0x1800).matches(Uuid::Short(0x1801)));
    }

    #[test]
    fn parse_short_form() {
        assert_eq!(Uuid::parse("0x180F"), Some(Uuid::Short(0x180F)));
    }

    #[test]
    fn parse_full_canonical_form() {
        let parsed = Uuid::parse("0000180f-0000-1000-8000-00805f9b34fb").unwrap();
        assert!(parsed.matches(Uuid::Short(0x180F)));
    }
}
