#![no_main]
use libfuzzer_sys::fuzz_target;
use unrepeat::marker::Marker;

fuzz_target!(|data: &[u8]| {
    if let Ok(marker) = Marker::parse_bytes(data) {
        // A parsed marker re-renders to a body that parses back the same.
        let rendered = marker.to_string();
        assert_eq!(Marker::parse(&rendered).unwrap(), marker);
    }
});
