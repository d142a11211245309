//! Common functions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time;

#[macro_export]
macro_rules! log_trace { ($($arg:expr),*) => { $crate::log!(trace, $($arg),*) }; }
#[macro_export]
macro_rules! log_debug { ($($arg:expr),*) => { $crate::log!(debug, $($arg),*) }; }
#[macro_export]
macro_rules! log_info { ($($arg:expr),*) => { $crate::log!(info, $($arg),*) }; }
#[macro_export]
macro_rules! log_warn { ($($arg:expr),*) => { $crate::log!(warn, $($arg),*) }; }
#[macro_export]
macro_rules! log_error { ($($arg:expr),*) => { $crate::log!(error, $($arg),*) }; }

#[cfg(not(test))]
#[macro_export]
macro_rules! log {
    (trace, $($arg:expr),*) => { log::trace!($($arg),*) };
    (debug, $($arg:expr),*) => { log::debug!($($arg),*) };
    (info, $($arg:expr),*) => { log::info!($($arg),*) };
    (warn, $($arg:expr),*) => { log::warn!($($arg),*) };
    (error, $($arg:expr),*) => { log::error!($($arg),*) };
}

#[cfg(test)]
#[macro_export]
macro_rules! log {
    (trace, $($arg:expr),*) => { println!($($arg),*) };
    (debug, $($arg:expr),*) => { println!($($arg),*) };
    (info, $($arg:expr),*) => { println!($($arg),*) };
    (warn, $($arg:expr),*) => { println!($($arg),*) };
    (error, $($arg:expr),*) => { println!($($arg),*) };
}

#[inline]
pub fn format_time(secs: u64) -> String {
    let mut s = secs;
    let mut m = s / 60;
    let h = m / 60;
    s %= 60;
    m %= 60;
    format!("[{h:02}:{m:02}:{s:02}]")
}

#[inline]
pub fn elapsed_secs(start_at: time::Instant) -> u64 {
    start_at.elapsed().as_secs()
}

/// Hash of a list of text parts, order sensitive.
pub fn hash_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for p in parts {
        p.hash(&mut hasher);
    }
    hasher.finish()
}

/// Number of characters that are not whitespace.
pub fn non_whitespace_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

#[test]
fn test_format_time() {
    assert_eq!(format_time(3725), "[01:02:05]");
    assert_eq!(non_whitespace_len("a b\n c"), 3);
    assert_eq!(hash_parts(["a", "b"]), hash_parts(["a", "b"]));
    assert_ne!(hash_parts(["ab", ""]), hash_parts(["a", "b"]));
}
