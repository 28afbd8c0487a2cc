// tests/common/mod.rs
//
// Shared helpers for the pipeline scenario tests: canned
// configurations, memory-backed senders, and frame decoding.

use explora::logger::{BatchPayload, Codec, MemorySender, Preamble, PREAMBLE_LENGTH};
use explora::Configuration;

/// Base configuration: no model, no background refresh, fast batch
/// flushes so the tests observe frames quickly.
pub fn base_config() -> Configuration {
    Configuration::from_pairs([
        ("ApplicationID", "test-app"),
        ("model.source", "NO_MODEL_DATA"),
        ("model.backgroundrefresh", "false"),
        ("interaction.batch.max.duration.ms", "20"),
        ("observation.batch.max.duration.ms", "20"),
        ("episode.batch.max.duration.ms", "20"),
        ("shutdown.deadline.ms", "2000"),
    ])
}

/// Decode every frame a memory sender has captured.
pub fn decode_frames(sender: &MemorySender) -> Vec<BatchPayload> {
    sender
        .frames()
        .iter()
        .map(|frame| {
            let preamble = Preamble::decode(frame).expect("valid preamble");
            let body = &frame[PREAMBLE_LENGTH..];
            assert_eq!(body.len(), preamble.payload_length as usize);
            let raw = match preamble.codec {
                Codec::Identity => body.to_vec(),
                Codec::Zstd => zstd::decode_all(body).expect("zstd payload inflates"),
            };
            serde_json::from_slice(&raw).expect("batch payload parses")
        })
        .collect()
}

/// Wait until the sender has at least `n` frames (bounded).
pub fn wait_for_frames(sender: &MemorySender, n: usize) {
    for _ in 0..100 {
        if sender.frame_count() >= n {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}
