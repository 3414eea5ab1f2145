//! Occurrence counting for FIND challenges.

/// Count non-overlapping occurrences of `symbol` in `haystack`.
///
/// Both are raw bytes. A single byte is the common case, but a longer
/// `symbol` is matched as a whole substring. An empty `symbol` matches
/// nothing.
pub fn count(symbol: &[u8], haystack: &[u8]) -> usize {
    match symbol {
        [] => 0,
        [byte] => haystack.iter().filter(|b| *b == byte).count(),
        _ => {
            let mut found = 0;
            let mut pos = 0;
            while let Some(window) = haystack.get(pos..pos + symbol.len()) {
                if window == symbol {
                    found += 1;
                    pos += symbol.len();
                } else {
                    pos += 1;
                }
            }
            found
        }
    }
}
