#![no_main]

use flashdrop::{Decoder, Event, MemStorage, RoutingMode, UploadSink};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The first byte picks the chunk size so that splits vary with the input.
    let (chunk, body) = match data.split_first() {
        Some((&chunk, body)) => (usize::from(chunk).max(1), body),
        None => return,
    };

    let mut decoder = Decoder::new("X-BOUNDARY").expect("valid boundary");
    let storage = MemStorage::new();
    let mut sink = UploadSink::new(RoutingMode::AcceptingUpload);
    let mut open = false;

    for piece in body.chunks(chunk) {
        let mut check = |event: Event<'_>| {
            match event {
                Event::PartStarted(_) => {
                    assert!(!open, "part started inside another part");
                    open = true;
                }
                Event::PartData(bytes) => assert!(open && !bytes.is_empty()),
                Event::PartEnded => {
                    assert!(open, "part ended without starting");
                    open = false;
                }
                Event::MessageEnded => assert!(!open),
            }
            sink.on_event(&storage, event);
        };

        if decoder.feed_all(piece, &mut check).is_err() {
            break;
        }
    }

    let _ = decoder.finish();
    sink.abandon();
});
