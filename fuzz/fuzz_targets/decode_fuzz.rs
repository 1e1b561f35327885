#![no_main]
use libfuzzer_sys::fuzz_target;
use unrepeat::decoder::{DecompressOptions, decompress};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic, and the reported count must match.
    // Cap blocks so huge markers fail fast instead of allocating.
    let opts = DecompressOptions {
        buffer_size: 7,
        max_block_len: 4096,
    };
    let mut output = Vec::new();
    if let Ok(stats) = decompress(data, &mut output, &opts) {
        assert_eq!(stats.bytes_written, output.len() as u64);
    }
});
