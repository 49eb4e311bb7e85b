//! Fuzz target: `StreamDecoder::feed`
//!
//! Splits arbitrary input at a fuzzer-chosen point and feeds it both in
//! one piece and in two chunks.  The decoder must never panic and must
//! extract the same frames either way.
//!
//! cargo fuzz run fuzz_stream_decoder

#![no_main]

use esprpc::config::Framing;
use esprpc::rpc::stream::StreamDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let framing = Framing::from_markers("$", "\r\n").unwrap();

    let whole = StreamDecoder::new(&framing, 256).feed(rest);

    let mut chunked = StreamDecoder::new(&framing, 256);
    let at = usize::from(split).min(rest.len());
    let mut frames = chunked.feed(&rest[..at]);
    frames.extend(chunked.feed(&rest[at..]));

    assert_eq!(whole, frames, "reassembly depends on chunking");
    for frame in &whole {
        assert!(frame.payload.len() <= usize::from(u16::MAX));
    }

    chunked.reset();
    assert_eq!(chunked.buffered(), 0);
});
