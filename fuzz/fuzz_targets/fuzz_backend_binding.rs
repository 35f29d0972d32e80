//! Fuzz target for backend endpoint parsing.
//!
//! Whatever a manager reports as its serving endpoints, building a binding
//! must return Ok or Err without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use node_orchestrator::proxy::BackendBinding;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    if let Ok(binding) = BackendBinding::new(text.split(',')) {
        let _ = binding.next_upstream();
    }
});
