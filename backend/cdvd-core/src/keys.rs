//! Per-title disc key derivation

use bincode::{Decode, Encode};
use thiserror::Error;

pub const KEY_LEN: usize = 16;

// Title IDs look like "SLUS_200.62": 4 letters, underscore, 3 digits, period, 2 digits
const TITLE_ID_LEN: usize = 11;
const DIGIT_POSITIONS: [usize; 5] = [5, 6, 7, 9, 10];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid title identifier '{0}'; expected e.g. SLUS_200.62")]
    InvalidTitleId(String),
}

/// Last key produced by the read-key drive command, exposed through the key registers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct TitleKey {
    pub bytes: [u8; KEY_LEN],
    pub xor: u8,
}

impl TitleKey {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Strip a boot path such as `cdrom0:\SLUS_200.62;1` down to the bare title identifier.
fn normalize_title_id(title_id: &str) -> &str {
    let start = title_id.rfind(['\\', ':', '/']).map_or(0, |i| i + 1);
    let title_id = &title_id[start..];
    title_id.split(';').next().unwrap_or(title_id)
}

/// Derive the 16-byte disc key for a title.
///
/// `context_code` is the 32-bit argument passed with the read-key command; codes 75, 3075 and
/// 4246 select alternate trailer bytes.
///
/// # Errors
///
/// Returns an error if the title identifier is not in the `ABCD_123.45` format.
pub fn derive_title_key(title_id: &str, context_code: u32) -> Result<[u8; KEY_LEN], KeyError> {
    let normalized = normalize_title_id(title_id);
    let bytes = normalized.as_bytes();
    if bytes.len() < TITLE_ID_LEN
        || !DIGIT_POSITIONS.iter().all(|&i| bytes[i].is_ascii_digit())
    {
        return Err(KeyError::InvalidTitleId(title_id.into()));
    }

    let digit = |i: usize| u32::from(bytes[i] - b'0');
    let numbers =
        digit(5) * 10000 + digit(6) * 1000 + digit(7) * 100 + digit(9) * 10 + digit(10);

    let letter = |i: usize| u32::from(bytes[i] & 0x7F);
    let letters = letter(3) | (letter(2) << 7) | (letter(1) << 14) | (letter(0) << 21);

    let key_0_3 = ((numbers & 0x1FC00) >> 10) | ((letters & 0x01FFFFFF) << 7);
    let key_4 = (((numbers & 0x0001F) << 3) | ((letters & 0x0E000000) >> 25)) as u8;
    let key_14 = (((numbers & 0x003E0) >> 2) | 0x04) as u8;

    let mut key = [0; KEY_LEN];
    key[..4].copy_from_slice(&key_0_3.to_le_bytes());
    key[4] = key_4;

    match context_code {
        75 => {
            key[14] = key_14;
            key[15] = 0x05;
        }
        4246 => {
            // Sector 0x0001F2F7 with decrypt byte 0x07
            key[..5].copy_from_slice(&[0x07, 0xF7, 0xF2, 0x01, 0x00]);
            key[15] = 0x01;
        }
        // 3075 and every other code
        _ => {
            key[15] = 0x01;
        }
    }

    log::debug!("Derived key for {normalized} (code {context_code}): {key:02X?}");

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    // SLUS_200.62: numbers = 20062, letters = 'S'<<21 | 'L'<<14 | 'U'<<7 | 'S'
    const NUMBERS: u32 = 20062;
    const LETTERS: u32 = (0x53 << 21) | (0x4C << 14) | (0x55 << 7) | 0x53;

    fn expected_prefix() -> [u8; 5] {
        let key_0_3 = ((NUMBERS & 0x1FC00) >> 10) | ((LETTERS & 0x01FFFFFF) << 7);
        let key_4 = (((NUMBERS & 0x1F) << 3) | ((LETTERS & 0x0E000000) >> 25)) as u8;
        let [a, b, c, d] = key_0_3.to_le_bytes();
        [a, b, c, d, key_4]
    }

    #[test]
    fn default_context_code() {
        let key = derive_title_key("SLUS_200.62", 0).unwrap();
        assert_eq!(key[..5], expected_prefix());
        assert_eq!(key[5..14], [0; 9]);
        assert_eq!(key[14], 0);
        assert_eq!(key[15], 0x01);
    }

    #[test]
    fn context_code_75() {
        let key = derive_title_key("SLUS_200.62", 75).unwrap();
        assert_eq!(key[..5], expected_prefix());
        assert_eq!(key[14], (((NUMBERS & 0x3E0) >> 2) | 0x04) as u8);
        assert_eq!(key[15], 0x05);
    }

    #[test]
    fn context_code_3075() {
        let key = derive_title_key("SLUS_200.62", 3075).unwrap();
        assert_eq!(key[..5], expected_prefix());
        assert_eq!(key[14], 0);
        assert_eq!(key[15], 0x01);
    }

    #[test]
    fn context_code_4246() {
        let key = derive_title_key("SLUS_200.62", 4246).unwrap();
        assert_eq!(key[..5], [0x07, 0xF7, 0xF2, 0x01, 0x00]);
        assert_eq!(key[15], 0x01);
    }

    #[test]
    fn known_key_bytes() {
        // numbers = 12345 = 0x3039, letters from "SCES"
        let key = derive_title_key("SCES_123.45", 0).unwrap();
        let letters: u32 = (0x53 << 21) | (0x43 << 14) | (0x45 << 7) | 0x53;
        let key_0_3 = ((12345 & 0x1FC00) >> 10) | ((letters & 0x01FFFFFF) << 7);
        assert_eq!(key[..4], key_0_3.to_le_bytes());
        assert_eq!(key[4], (((12345 & 0x1F) << 3) | ((letters & 0x0E000000) >> 25)) as u8);
    }

    #[test]
    fn boot_path_is_normalized() {
        assert_eq!(
            derive_title_key("cdrom0:\\SLUS_200.62;1", 75),
            derive_title_key("SLUS_200.62", 75)
        );
    }

    #[test]
    fn invalid_title_id() {
        assert_eq!(
            derive_title_key("SLUS_2A0.62", 0),
            Err(KeyError::InvalidTitleId("SLUS_2A0.62".into()))
        );
        assert!(derive_title_key("SLUS", 0).is_err());
    }
}
