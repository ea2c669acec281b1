//! CLI command implementations
//!
//! Every command takes the attached chip and reports through stdout; errors
//! bubble up to `main` as `Box<dyn Error>`.

pub mod flash;
pub mod info;
mod list;
pub mod misc;

pub use list::list_backends;

/// Read a little-endian word image
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u16>, String> {
    if bytes.len() % 2 != 0 {
        return Err(format!("Image size {} is not a whole number of words", bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// Little-endian byte image of `words`
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_image() {
        assert_eq!(words_from_bytes(&[0x34, 0x12, 0xFF, 0x00]), Ok(vec![0x1234, 0x00FF]));
        assert_eq!(words_to_bytes(&[0x1234]), vec![0x34, 0x12]);
        assert!(words_from_bytes(&[1, 2, 3]).is_err());
    }
}
