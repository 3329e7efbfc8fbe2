//! SDBM string hash used to place operation names.

/// Byte-wise SDBM rolling hash: `h = c + (h << 6) + (h << 16) - h`.
pub fn sdbm(key: &str) -> u64 {
    key.bytes().fold(0u64, |hash, byte| {
        u64::from(byte)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash)
    })
}

/// Home slot of `key` in a table of `capacity` slots.
pub fn home_slot(key: &str, capacity: usize) -> usize {
    (sdbm(key) % capacity as u64) as usize
}
