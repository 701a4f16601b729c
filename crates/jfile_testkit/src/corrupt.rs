//! Byte-level damage for built journals.
//!
//! Offsets of sub-fields are relative to the object start (the 16-byte
//! common header included).

/// Offset of DATA `hash`.
pub const DATA_HASH: u64 = 16;
/// Offset of DATA `next_hash_offset`.
pub const DATA_NEXT_HASH: u64 = 24;
/// Offset of DATA `next_field_offset`.
pub const DATA_NEXT_FIELD: u64 = 32;
/// Offset of ENTRY `xor_hash`.
pub const ENTRY_XOR_HASH: u64 = 56;
/// Offset of the first ENTRY item.
pub const ENTRY_ITEMS: u64 = 64;
/// Offset of ENTRY_ARRAY `next_entry_array_offset`.
pub const ENTRY_ARRAY_NEXT: u64 = 16;
/// Offset of the object `size` field.
pub const OBJECT_SIZE: u64 = 8;

/// Overwrites the little-endian `u64` at `at`.
///
/// # Panics
///
/// If `at + 8` is past the end of `bytes`.
pub fn set_u64(bytes: &mut [u8], at: u64, value: u64) {
    let at = at as usize;
    bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// Reads the little-endian `u64` at `at`.
///
/// # Panics
///
/// If `at + 8` is past the end of `bytes`.
#[must_use]
pub fn get_u64(bytes: &[u8], at: u64) -> u64 {
    let at = at as usize;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Flips every bit of the `u64` at `at`.
pub fn flip_u64(bytes: &mut [u8], at: u64) {
    let value = get_u64(bytes, at);
    set_u64(bytes, at, !value);
}

/// Replaces the file signature.
pub fn set_signature(bytes: &mut [u8], signature: &[u8; 8]) {
    bytes[..8].copy_from_slice(signature);
}

/// Changes the type tag of the object at `offset`.
pub fn set_object_type(bytes: &mut [u8], offset: u64, tag: u8) {
    bytes[offset as usize] = tag;
}

/// Changes the declared size of the object at `offset`.
pub fn set_object_size(bytes: &mut [u8], offset: u64, size: u64) {
    set_u64(bytes, offset + OBJECT_SIZE, size);
}

/// Corrupts the stored `xor_hash` of the ENTRY at `entry`.
pub fn corrupt_entry_xor(bytes: &mut [u8], entry: u64) {
    flip_u64(bytes, entry + ENTRY_XOR_HASH);
}

/// Corrupts the stored hash of the DATA at `data`.
pub fn corrupt_data_hash(bytes: &mut [u8], data: u64) {
    flip_u64(bytes, data + DATA_HASH);
}

/// Points item `index` of the ENTRY at `entry` to `target`.
pub fn redirect_entry_item(bytes: &mut [u8], entry: u64, index: u64, target: u64) {
    set_u64(bytes, entry + ENTRY_ITEMS + index * 16, target);
}

/// Makes the ENTRY_ARRAY at `array` link to `next`.
pub fn link_entry_array(bytes: &mut [u8], array: u64, next: u64) {
    set_u64(bytes, array + ENTRY_ARRAY_NEXT, next);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_flip() {
        let mut bytes = vec![0u8; 32];
        set_u64(&mut bytes, 8, 0x0102);
        assert_eq!(get_u64(&bytes, 8), 0x0102);
        flip_u64(&mut bytes, 8);
        assert_eq!(get_u64(&bytes, 8), !0x0102);
    }

    #[test]
    fn signature_and_type() {
        let mut bytes = b"LPKSHHRH________".to_vec();
        set_signature(&mut bytes, b"XXXXXXXX");
        assert_eq!(&bytes[..8], b"XXXXXXXX");
        set_object_type(&mut bytes, 8, 9);
        assert_eq!(bytes[8], 9);
    }
}
