//! Fuzz target: `Envelope::parse` + `Codec::decode`
//!
//! Treats the input as one delivered message unit, the way a socket or
//! BLE link hands it over, and decodes it against the UserService schema.
//! Malformed units and payloads must fail cleanly, never panic.
//!
//! cargo fuzz run fuzz_envelope_decode

#![no_main]

use esprpc::rpc::codec::Codec;
use esprpc::rpc::envelope::{Envelope, HEADER_SIZE, frame_len};
use esprpc::service::user;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some(envelope) = Envelope::parse(data) else {
        assert!(frame_len(data).is_none_or(|n| n > data.len()));
        return;
    };
    assert!(envelope.payload.len() <= data.len() - HEADER_SIZE);

    let codec = Codec::new(&user::schema());
    let _ = codec.decode(envelope.method_id, &envelope.payload);
    let _ = codec.decode_args(envelope.method_id, &envelope.payload);
});
