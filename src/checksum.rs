//! Internet checksum (RFC 1071).

/// One's complement of the one's complement sum of all 16-bit big-endian
/// words in `data`. A trailing odd byte is padded with a zero low byte.
///
/// The result is meant to be written back with `to_be_bytes`.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data.chunks(2).map(|chunk| match chunk {

        &[a, b, ..] => u16::from_be_bytes([a, b]) as u32,
        &[.., a] => ((a as u32) << 8),
        &[..] => 0 as u32,

    }).fold(0u32, |n, x| n.wrapping_add(x));

    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xFFFF);
    }

    !(sum as u16)
}

/// Holds when `data` already carries a correct checksum.
pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_zeros() {
        assert_eq!(checksum(&[0u8; 8]), 0xFFFF);
    }

    #[test]
    fn test_checksum_rfc1071_example() {
        // Worked example from RFC 1071 section 3: sum is 0xDDF2.
        let data = [0x00, 0x01, 0xF2, 0x03, 0xF4, 0xF5, 0xF6, 0xF7];
        assert_eq!(checksum(&data), !0xDDF2u16);
    }

    #[test]
    fn test_checksum_known_echo_request() {
        // type 8, code 0, identifier 0x1234, sequence 1
        let data = [0x08, 0x00, 0x00, 0x00, 0x12, 0x34, 0x00, 0x01];
        assert_eq!(checksum(&data), 0xE5CA);
    }

    #[test]
    fn test_checksum_inserted_verifies() {
        let mut data = [0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00,
                        0x40, 0x06, 0x00, 0x00, 0xac, 0x10, 0x0a, 0x63,
                        0xac, 0x10, 0x0a, 0x0c];

        let sum = checksum(&data);
        data[10..12].copy_from_slice(&sum.to_be_bytes());

        assert!(verify(&data));
        assert_eq!(sum, 0xB1E6);
    }

    #[test]
    fn test_checksum_odd_length_verifies() {
        let mut data = vec![0x08, 0x00, 0x00, 0x00, 0xAB, 0xCD, 0x00, 0x07, 0x61];

        let sum = checksum(&data);
        data[2..4].copy_from_slice(&sum.to_be_bytes());

        assert!(verify(&data));
    }

    #[test]
    fn test_checksum_folds_carries() {
        assert_eq!(checksum(&[0xFFu8; 64]), 0);
    }
}
