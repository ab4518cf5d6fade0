//! XOR stream obfuscation of file bytes and the file table.
//!
//! This is scrambling, not encryption. The stream depends only on a 32-bit
//! key and the absolute position of each byte within its file, so
//! applying it twice restores the input and any sub-range can be processed
//! independently.

/// Initial value of the key fold.
pub const OBFUSCATION_SEED: u32 = 0x5400_7b47;

/// Derive a key from a name, ignoring ASCII case.
pub fn obfuscation_key(name: &[u8]) -> u32 {
    name.iter().fold(OBFUSCATION_SEED, |key, &b| {
        key.wrapping_mul(33).wrapping_add(b.to_ascii_lowercase() as u32)
    })
}

/// Key used for the file table of a package cooked by the given build.
pub fn file_table_key(build_version_major: u32, build_changelist: u32) -> u32 {
    obfuscation_key(format!("{build_version_major}{build_changelist}").as_bytes())
}

/// Obfuscate or de-obfuscate `data`, which starts at `offset` within its file.
pub fn obfuscate(key: u32, data: &mut [u8], offset: u64) {
    for (i, byte) in data.iter_mut().enumerate() {
        let position = offset.wrapping_add(i as u64);
        let shift = (position % 4) * 8;
        let step = ((position / 4) as u32).wrapping_mul(101);
        *byte ^= (key >> shift).wrapping_add(step) as u8;
    }
}
