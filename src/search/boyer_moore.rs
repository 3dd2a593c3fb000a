//! Boyer-Moore substring search
//!
//! Tables are built once per pattern and reused for every haystack, which
//! is what makes it pay off when one term is matched against a few hundred
//! thousand paths.

/// Compiled search pattern
#[derive(Debug, Clone)]
pub struct BoyerMoore {
    pattern: Vec<u8>,
    bad_char: [usize; 256],
    good_suffix: Vec<usize>,
}

impl BoyerMoore {
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.as_bytes().to_vec();
        let bad_char = bad_char_table(&pattern);
        let good_suffix = good_suffix_table(&pattern);
        Self {
            pattern,
            bad_char,
            good_suffix,
        }
    }

    /// Offset of the first occurrence in `haystack`
    pub fn find(&self, haystack: &str) -> Option<usize> {
        let text = haystack.as_bytes();
        let m = self.pattern.len();
        let n = text.len();
        if m == 0 {
            return Some(0);
        }
        if m > n {
            return None;
        }

        let mut shift = 0;
        while shift <= n - m {
            let mut j = m;
            while j > 0 && self.pattern[j - 1] == text[shift + j - 1] {
                j -= 1;
            }
            if j == 0 {
                return Some(shift);
            }

            // Mismatch at pattern[j - 1]
            let bad = text[shift + j - 1] as usize;
            let bc_shift = (j - 1).saturating_sub(self.bad_char[bad]).max(1);
            let bc_shift = if self.bad_char[bad] == usize::MAX { j } else { bc_shift };
            shift += bc_shift.max(self.good_suffix[j]);
        }
        None
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.find(haystack).is_some()
    }
}

/// Last index of every byte in the pattern, `usize::MAX` when absent
fn bad_char_table(pattern: &[u8]) -> [usize; 256] {
    let mut table = [usize::MAX; 256];
    for (i, &b) in pattern.iter().enumerate() {
        table[b as usize] = i;
    }
    table
}

/// Shift for a mismatch right after `pattern[j..]` matched
///
/// Indexed by `j` in `0..=m`; `good_suffix[m]` (nothing matched yet) is 1.
fn good_suffix_table(pattern: &[u8]) -> Vec<usize> {
    let m = pattern.len();
    let mut shift = vec![0usize; m + 1];
    if m == 0 {
        return shift;
    }

    // border[i]: start of the widest border of pattern[i..]
    let mut border = vec![0usize; m + 1];
    let mut i = m;
    let mut j = m + 1;
    border[i] = j;
    while i > 0 {
        while j <= m && pattern[i - 1] != pattern[j - 1] {
            if shift[j] == 0 {
                shift[j] = j - i;
            }
            j = border[j];
        }
        i -= 1;
        j -= 1;
        border[i] = j;
    }

    // Suffixes that only match as a prefix of the pattern
    j = border[0];
    for i in 0..=m {
        if shift[i] == 0 {
            shift[i] = j;
        }
        if i == j {
            j = border[j];
        }
    }

    shift
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(haystack: &str, needle: &str) -> Option<usize> {
        haystack.find(needle)
    }

    #[test]
    fn test_basic_matches() {
        let bm = BoyerMoore::new("game");
        assert_eq!(bm.find("/isos/game1.iso"), Some(6));
        assert_eq!(bm.find("/isos/gam.iso"), None);
        assert!(bm.is_match("game"));
        assert!(!bm.is_match("gam"));
    }

    #[test]
    fn test_empty_pattern() {
        assert_eq!(BoyerMoore::new("").find("anything"), Some(0));
        assert_eq!(BoyerMoore::new("").find(""), Some(0));
    }

    #[test]
    fn test_repetitive_patterns() {
        let cases = [
            ("aaaaab", "aab"),
            ("abababac", "ababac"),
            ("abcabcabd", "abcabd"),
            ("xxxxxxxx", "xxx"),
            ("anpanman", "pan"),
            ("abracadabra", "abra"),
            ("abracadabra", "cad"),
            ("aabaabaab", "baab"),
        ];
        for (haystack, needle) in cases {
            assert_eq!(
                BoyerMoore::new(needle).find(haystack),
                naive(haystack, needle),
                "{} in {}",
                needle,
                haystack
            );
        }
    }

    #[test]
    fn test_agrees_with_naive_search() {
        let haystacks = [
            "/mnt/isos/Final Fantasy VII (Disc 1).iso",
            "/mnt/isos/final fantasy vii (disc 2).iso",
            "/home/user/Downloads/ubuntu-24.04-desktop-amd64.iso",
            "/data/ps2/Gran Turismo 4 (USA).iso",
        ];
        let needles = ["disc", "Disc 2", "iso", "isos/", "24.04", "(USA)", "zzz", "s", "/"];
        for haystack in haystacks {
            for needle in needles {
                assert_eq!(BoyerMoore::new(needle).find(haystack), naive(haystack, needle));
            }
        }
    }

    #[test]
    fn test_multibyte_text() {
        let bm = BoyerMoore::new("ß");
        assert_eq!(bm.find("/straße.iso"), "/straße.iso".find('ß'));
    }
}
