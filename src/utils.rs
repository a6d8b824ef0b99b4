use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct ProgressCounter {
    label: &'static str,
    interval: u64,
    count: AtomicU64,
    visible: bool,
}

impl ProgressCounter {
    pub fn new(label: &'static str, interval: u64) -> Self {
        let counter = Self {
            label,
            interval: interval.max(1),
            count: AtomicU64::new(0),
            visible: true,
        };
        counter.print(0);
        counter
    }

    /// Counter that never writes to stderr. Concurrent passes use this so
    /// their `\r`-rewriting lines cannot interleave with the visible one.
    pub fn silent(label: &'static str) -> Self {
        Self {
            label,
            interval: 1,
            count: AtomicU64::new(0),
            visible: false,
        }
    }

    pub fn inc(&self, delta: u64) {
        let prev = self.count.fetch_add(delta, Ordering::SeqCst);
        let current = prev + delta;
        // Print if we crossed an interval boundary
        if prev / self.interval < current / self.interval {
            self.print(current);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn finish(&self) {
        if !self.visible {
            return;
        }
        self.print(self.count.load(Ordering::SeqCst));
        eprintln!();
    }

    fn print(&self, current: u64) {
        if !self.visible {
            return;
        }
        eprint!("\r{}: {}", self.label, current);
        let _ = std::io::stderr().flush();
    }
}

pub fn build_tag_map<'a, I>(tags: I) -> HashMap<String, String>
where
    I: Iterator<Item = (&'a str, &'a str)>,
{
    tags.map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Leading-integer parse with `atoi` semantics: optional sign, digits until
/// the first non-digit, anything unparsable yields 0.
pub fn leading_int(value: &str) -> i64 {
    let trimmed = value.trim_start();
    let mut end = 0;
    for (idx, ch) in trimmed.char_indices() {
        if ch.is_ascii_digit() || (idx == 0 && (ch == '-' || ch == '+')) {
            end = idx + ch.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_int_parses_plain_numbers() {
        assert_eq!(leading_int("500000"), 500_000);
        assert_eq!(leading_int("-12"), -12);
    }

    #[test]
    fn leading_int_stops_at_first_non_digit() {
        assert_eq!(leading_int("1200 (2019)"), 1200);
        assert_eq!(leading_int("50 mph"), 50);
    }

    #[test]
    fn leading_int_defaults_to_zero() {
        assert_eq!(leading_int("ca. 5000"), 0);
        assert_eq!(leading_int(""), 0);
        assert_eq!(leading_int("unknown"), 0);
    }

    #[test]
    fn silent_counter_still_counts() {
        let counter = ProgressCounter::silent("quiet");
        counter.inc(3);
        counter.inc(4);
        counter.finish();
        assert_eq!(counter.count(), 7);
    }

    #[test]
    fn build_tag_map_collects_pairs() {
        let map = build_tag_map([("place", "city"), ("name", "Essen")].into_iter());
        assert_eq!(map.get("place").map(String::as_str), Some("city"));
        assert_eq!(map.len(), 2);
    }
}
