//! Wire-format tests for byte strings and sequences, including the
//! decode-side safety limits.

#[cfg(test)]
mod tests {
    use crate::encoding::{
        Decode, Encode, EncodingError, decode_from_slice, decode_seq, encode_seq, encode_to_vec,
    };

    #[test]
    fn byte_string_round_trip() {
        let value: Vec<u8> = (0..=255).collect();
        let bytes = encode_to_vec(&value).unwrap();
        let (decoded, consumed) = decode_from_slice::<Vec<u8>>(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, 4 + 256);
    }

    #[test]
    fn sequence_round_trip() {
        let values = vec![1u64, 2, 3, u64::MAX];
        let mut buf = Vec::new();
        encode_seq(&values, &mut buf).unwrap();

        let (decoded, consumed) = decode_seq::<u64>(&buf).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn empty_sequence_round_trip() {
        let mut buf = Vec::new();
        encode_seq::<u64>(&[], &mut buf).unwrap();
        let (decoded, _) = decode_seq::<u64>(&buf).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn oversized_byte_length_rejected() {
        // Claims a 4 GiB payload that obviously is not there.
        let raw = u32::MAX.to_le_bytes().to_vec();
        let err = Vec::<u8>::decode_from(&raw).unwrap_err();
        assert!(matches!(err, EncodingError::LengthOverflow(_)));
    }

    #[test]
    fn oversized_sequence_count_rejected() {
        let mut raw = Vec::new();
        (crate::encoding::MAX_SEQ_ELEMENTS + 1)
            .encode_to(&mut raw)
            .unwrap();
        let err = decode_seq::<u64>(&raw).unwrap_err();
        assert!(matches!(err, EncodingError::LengthOverflow(_)));
    }

    #[test]
    fn sequence_of_strings_round_trip() {
        let values = vec!["a".to_string(), String::new(), "block".to_string()];
        let mut buf = Vec::new();
        encode_seq(&values, &mut buf).unwrap();
        let (decoded, _) = decode_seq::<String>(&buf).unwrap();
        assert_eq!(decoded, values);
    }
}
