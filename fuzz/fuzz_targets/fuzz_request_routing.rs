//! Fuzz target for request classification and legacy path rewriting.
//!
//! Arbitrary paths must never panic, and a rewritten path must never be
//! rewritten again.

#![no_main]

use libfuzzer_sys::fuzz_target;
use node_orchestrator::proxy::{classify, default_rules};

fuzz_target!(|data: &[u8]| {
    let Ok(path) = std::str::from_utf8(data) else {
        return;
    };
    let _ = classify(path);

    let rules = default_rules();
    if let Some(rewritten) = rules.iter().find_map(|rule| rule.apply(path)) {
        assert!(rules.iter().all(|rule| rule.apply(&rewritten).is_none()), "{path} rewritten twice");
    }
});
