use std::fs;

use log::warn;

// https://www.kernel.org/doc/Documentation/vm/transhuge.txt
//
// The PMD-level THP size is exported as a textual decimal byte count:
// $ cat /sys/kernel/mm/transparent_hugepage/hpage_pmd_size
// 2097152
const PMD_SIZE_PATH: &str = "/sys/kernel/mm/transparent_hugepage/hpage_pmd_size";
const THP_ENABLED_PATH: &str = "/sys/kernel/mm/transparent_hugepage/enabled";

/// Fallback PMD-level THP size (2 MiB) used when the kernel interface is
/// unreadable.
pub const DEFAULT_PMD_SIZE: usize = 2 << 20;

/// Returns the runtime base page size.
pub fn page_size() -> usize {
    let ret = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
    if ret <= 0 {
        warn!("sysconf(_SC_PAGE_SIZE) failed, assuming 4 KiB pages");
        return 4096;
    }
    ret as usize
}

/// Returns the kernel's PMD-level transparent huge page size.
///
/// Falls back to [`DEFAULT_PMD_SIZE`] with a warning when the sysfs
/// interface is missing or unparseable. The fallback keeps the tool running
/// on such systems, possibly with degraded accuracy if the real THP size
/// differs.
pub fn pmd_size() -> usize {
    pmd_size_from(PMD_SIZE_PATH)
}

fn pmd_size_from(path: &str) -> usize {
    match fs::read_to_string(path).ok().and_then(|s| parse_pmd_size(&s)) {
        Some(size) => size,
        None => {
            warn!("Cannot read {}, assuming 2 MiB THP", path);
            DEFAULT_PMD_SIZE
        }
    }
}

fn parse_pmd_size(s: &str) -> Option<usize> {
    s.trim().parse::<usize>().ok().filter(|&size| size > 0)
}

/// Returns the system-wide transparent huge page mode.
///
/// Reads the bracketed token from the THP `enabled` sysfs file, e.g.
/// `always [madvise] never` yields `madvise`. Returns `None` when the file
/// is missing or holds no bracketed token.
pub fn thp_enabled_mode() -> Option<String> {
    let buf = fs::read_to_string(THP_ENABLED_PATH).ok()?;
    parse_enabled_mode(&buf).map(str::to_owned)
}

fn parse_enabled_mode(s: &str) -> Option<&str> {
    s.split_whitespace()
        .find(|token| token.starts_with('[') && token.ends_with(']'))
        .map(|token| token.trim_start_matches('[').trim_end_matches(']'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pmd_size() {
        // correct.
        assert_eq!(parse_pmd_size("2097152\n"), Some(2 << 20));
        assert_eq!(parse_pmd_size("1073741824"), Some(1 << 30));

        // wrong.
        assert_eq!(parse_pmd_size(""), None);
        assert_eq!(parse_pmd_size("0"), None);
        assert_eq!(parse_pmd_size("2 MB"), None);
        assert_eq!(parse_pmd_size("0x200000"), None);
    }

    #[test]
    fn test_pmd_size_fallback() {
        assert_eq!(pmd_size_from("/nonexistent/hpage_pmd_size"), DEFAULT_PMD_SIZE);
    }

    #[test]
    fn test_parse_enabled_mode() {
        assert_eq!(parse_enabled_mode("always [madvise] never\n"), Some("madvise"));
        assert_eq!(parse_enabled_mode("[always] madvise never"), Some("always"));
        assert_eq!(parse_enabled_mode("always madvise [never]"), Some("never"));
        assert_eq!(parse_enabled_mode("always madvise never"), None);
        assert_eq!(parse_enabled_mode(""), None);
    }
}
