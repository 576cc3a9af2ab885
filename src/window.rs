use std::num::NonZeroU64;

use axum_extra::headers::ContentRange;

use crate::error::{HeaderMalformed, RangeError};
use crate::header::RangeRequest;

/// Inclusive byte bounds of one response body, always within `[0, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServingWindow {
    pub start: u64,
    pub end: u64,
}

impl ServingWindow {
    /// The window served when no range was requested: the first `ceiling`
    /// bytes. `None` for an empty resource.
    pub fn leading(size: u64, ceiling: NonZeroU64) -> Option<Self> {
        let last = size.checked_sub(1)?;
        Some(ServingWindow { start: 0, end: last.min(ceiling.get() - 1) })
    }

    /// Resolves open-ended and suffix forms against `size`, then caps the
    /// window to `ceiling` bytes.
    ///
    /// A resolved start or end at or past `size` is
    /// [`RangeError::RangeUnsatisfiable`]. So is a zero-length suffix.
    /// Length-only specifiers and units other than bytes are
    /// [`RangeError::HeaderMalformed`].
    pub fn resolve(request: &RangeRequest, size: u64, ceiling: NonZeroU64) -> Result<Self, RangeError> {
        if !request.is_bytes() {
            return Err(HeaderMalformed::Unit(request.unit.clone()).into());
        }

        let unsatisfiable = RangeError::RangeUnsatisfiable { size };
        let (first, last) = match (request.first, request.last) {
            (Some(first), Some(last)) => (first, last),
            (Some(first), None) => (first, size.checked_sub(1).ok_or(unsatisfiable)?),
            (None, Some(0)) => return Err(unsatisfiable),
            // a suffix longer than the resource selects all of it
            (None, Some(suffix)) => (size.saturating_sub(suffix), size.checked_sub(1).ok_or(unsatisfiable)?),
            (None, None) => return Err(HeaderMalformed::NoPosition.into()),
        };

        if first >= size || last >= size {
            return Err(RangeError::RangeUnsatisfiable { size });
        }
        if last < first {
            return Err(HeaderMalformed::Reversed { first, last }.into());
        }

        let capped = first.saturating_add(ceiling.get() - 1);
        Ok(ServingWindow { start: first, end: last.min(capped) })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `bytes <start>-<end>/<size>`
    pub fn content_range(&self, size: u64) -> Result<ContentRange, RangeError> {
        ContentRange::bytes(self.start..=self.end, size).map_err(|_| RangeError::RangeUnsatisfiable { size })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;

    fn ceiling(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    fn resolve(header: &str, size: u64, limit: u64) -> Result<ServingWindow, RangeError> {
        let request: RangeRequest = header.parse().unwrap();
        ServingWindow::resolve(&request, size, ceiling(limit))
    }

    #[test]
    fn test_capped_window() {
        let window = resolve("bytes=200-999", 1000, 600).unwrap();
        assert_eq!(ServingWindow { start: 200, end: 799 }, window);
        assert_eq!(600, window.len());
        assert_eq!(
            ContentRange::bytes(200..800, 1000).unwrap(),
            window.content_range(1000).unwrap()
        );
    }

    #[test]
    fn test_resolved_forms() {
        let tests = [
            ("bytes=0-99", ServingWindow { start: 0, end: 99 }),
            ("bytes=900-", ServingWindow { start: 900, end: 999 }),
            ("bytes=-100", ServingWindow { start: 900, end: 999 }),
            ("bytes=-1000", ServingWindow { start: 0, end: 999 }),
            ("bytes=-5000", ServingWindow { start: 0, end: 999 }),
            ("bytes=999-999", ServingWindow { start: 999, end: 999 }),
            ("bytes=0-", ServingWindow { start: 0, end: 999 }),
        ];

        for (i, (header, expected)) in tests.iter().enumerate() {
            let window = resolve(header, 1000, 4096).unwrap();
            assert_eq!(*expected, window, "failed to resolve #{i}: {header}");
        }
    }

    #[test]
    fn test_open_end_is_capped() {
        assert_eq!(ServingWindow { start: 100, end: 163 }, resolve("bytes=100-", 1000, 64).unwrap());
    }

    #[test]
    fn test_unsatisfiable() {
        assert_matches!(resolve("bytes=1000-1200", 1000, 600), Err(RangeError::RangeUnsatisfiable { size: 1000 }));
        assert_matches!(resolve("bytes=0-1000", 1000, 600), Err(RangeError::RangeUnsatisfiable { size: 1000 }));
        assert_matches!(resolve("bytes=1000-", 1000, 600), Err(RangeError::RangeUnsatisfiable { size: 1000 }));
        assert_matches!(resolve("bytes=-0", 1000, 600), Err(RangeError::RangeUnsatisfiable { size: 1000 }));
        assert_matches!(resolve("bytes=0-", 0, 600), Err(RangeError::RangeUnsatisfiable { size: 0 }));
        assert_matches!(resolve("bytes=-10", 0, 600), Err(RangeError::RangeUnsatisfiable { size: 0 }));
    }

    #[test]
    fn test_reversed_range() {
        assert_matches!(resolve("bytes=100-50", 54, 600), Err(RangeError::RangeUnsatisfiable { size: 54 }));
        assert_matches!(resolve("bytes=60-53", 54, 600), Err(RangeError::RangeUnsatisfiable { size: 54 }));
        assert_matches!(
            resolve("bytes=30-29", 54, 600),
            Err(RangeError::HeaderMalformed(HeaderMalformed::Reversed { first: 30, last: 29 }))
        );
    }

    #[test]
    fn test_unresolvable_forms() {
        assert_matches!(resolve("bytes */1000", 1000, 600), Err(RangeError::HeaderMalformed(HeaderMalformed::NoPosition)));
        assert_matches!(resolve("items=0-10", 1000, 600), Err(RangeError::HeaderMalformed(HeaderMalformed::Unit(_))));
    }

    #[test]
    fn test_leading() {
        assert_eq!(Some(ServingWindow { start: 0, end: 599 }), ServingWindow::leading(1000, ceiling(600)));
        assert_eq!(Some(ServingWindow { start: 0, end: 99 }), ServingWindow::leading(100, ceiling(600)));
        assert_eq!(None, ServingWindow::leading(0, ceiling(600)));
    }

    proptest! {
        #[test]
        fn window_stays_inside_resource(size in 1u64..1 << 40, a in 0u64..1 << 40, span in 0u64..1 << 40, limit in 1u64..1 << 24) {
            prop_assume!(a < size);
            let b = (a + span).min(size - 1);
            let window = resolve(&format!("bytes={a}-{b}"), size, limit).unwrap();
            prop_assert_eq!(a, window.start);
            prop_assert_eq!(b.min(a + limit - 1), window.end);
            prop_assert!(window.end < size);
            prop_assert!(window.len() <= limit);
        }

        #[test]
        fn suffix_selects_tail(size in 1u64..1 << 40, n in 1u64..1 << 40) {
            prop_assume!(n <= size);
            let window = resolve(&format!("bytes=-{n}"), size, u64::MAX).unwrap();
            prop_assert_eq!(ServingWindow { start: size - n, end: size - 1 }, window);
        }
    }
}
