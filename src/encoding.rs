use std::fs;
use std::io;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

// Journal files are read through encoding auto-detection: a byte-order mark
// wins, then valid UTF-8, then CP-1252 as the 8-bit fallback.

/// Read a file to a string, auto-detecting its encoding.
pub fn read_to_string(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(decode(&bytes))
}

fn decode(bytes: &[u8]) -> String {
    if let Some((encoding, bom_length)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_length..]);
        return text.into_owned();
    }

    let (text, had_errors) = UTF_8.decode_without_bom_handling(bytes);
    if !had_errors {
        return text.into_owned();
    }

    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8() {
        assert_eq!(decode("2019/01/01 ABC  $ 1".as_bytes()), "2019/01/01 ABC  $ 1");
        assert_eq!(decode("100 kr  €".as_bytes()), "100 kr  €");
    }

    #[test]
    fn test_decode_utf8_with_bom() {
        let mut bytes = vec![0xef, 0xbb, 0xbf];
        bytes.extend_from_slice("abc".as_bytes());
        assert_eq!(decode(&bytes), "abc");
    }

    #[test]
    fn test_decode_utf16_le_with_bom() {
        let mut bytes = vec![0xff, 0xfe];
        for unit in "abc".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode(&bytes), "abc");
    }

    #[test]
    fn test_decode_cp1252_fallback() {
        // 0xe6 is not valid UTF-8 on its own; in CP-1252 it is 'æ'
        assert_eq!(decode(&[0x61, 0xe6, 0x62]), "aæb");
    }
}
