//! Fuzz target: topic helpers
//!
//! Splits the input into a filter and a topic and checks the matcher and
//! the response-topic derivation never panic and stay consistent:
//! a topic always matches itself when it holds no wildcards, `#` matches
//! everything, and a derived response topic keeps the level count and
//! correlation id.
//!
//! cargo fuzz run fuzz_topic_match

#![no_main]

use devbridge::topics::{request_id, response_topic, topic_matches};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let (filter, topic) = s.split_once('\n').unwrap_or((s, s));

    let _ = topic_matches(filter, topic);
    assert!(topic_matches("#", topic));
    if !topic.contains(['+', '#']) {
        assert!(topic_matches(topic, topic));
    }

    if let Some(resp) = response_topic(topic) {
        assert_eq!(resp.split('/').count(), topic.split('/').count());
        let id = request_id(topic);
        let expected = if id == "request" { "response" } else { id };
        assert_eq!(request_id(&resp), expected);
    }
});
