#![no_main]
use bmessage::{Message, UnflattenOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let opts = UnflattenOptions {
        max_depth: 16,
        ..Default::default()
    };
    if let Ok(msg) = Message::unflatten_with(data, &opts) {
        // Anything accepted must flatten back to the same bytes.
        assert_eq!(msg.flatten_to_vec(), data);
        let _ = msg.to_string();
    }
});
