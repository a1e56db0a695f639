#![allow(dead_code)]

pub use taskforge_test_utils::{init_tracing, with_timeout};

use std::time::Duration;

/// Poll `predicate` every 10ms until it holds (5s budget).
pub async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    for _ in 0..500 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
