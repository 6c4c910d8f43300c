#![no_main]
use libfuzzer_sys::fuzz_target;

use lifx_core::{Message, RawMessage};

// Whatever arrives on the socket, decoding returns an error instead of panicking.
fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = RawMessage::unpack(data) {
        assert_eq!(raw.packed_size(), data.len());
        let _ = Message::from_raw(&raw);
    }
});
