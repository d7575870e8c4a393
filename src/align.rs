//! Alignment arithmetic for the D-Bus wire format.

/// Number of padding bytes needed so that `offset + padding` lands on a
/// multiple of `boundary`.
///
/// `boundary` must be a power of two, which for D-Bus means 1, 2, 4, or 8.
///
/// # Examples
///
/// ```
/// use dbus_peer::align::padding;
///
/// assert_eq!(padding(0, 8), 0);
/// assert_eq!(padding(1, 4), 3);
/// assert_eq!(padding(6, 2), 0);
/// ```
#[inline]
pub const fn padding(offset: usize, boundary: usize) -> usize {
    debug_assert!(boundary.is_power_of_two());
    let mask = boundary - 1;
    (boundary - (offset & mask)) & mask
}

/// Advance `offset` to the next multiple of `boundary`.
#[inline]
pub const fn advance(offset: usize, boundary: usize) -> usize {
    offset + padding(offset, boundary)
}

#[cfg(test)]
mod tests {
    use super::{advance, padding};

    #[test]
    fn test_padding() {
        assert_eq!(padding(0, 1), 0);
        assert_eq!(padding(7, 1), 0);
        assert_eq!(padding(0, 4), 0);
        assert_eq!(padding(1, 4), 3);
        assert_eq!(padding(2, 4), 2);
        assert_eq!(padding(3, 4), 1);
        assert_eq!(padding(4, 4), 0);
        assert_eq!(padding(12, 8), 4);
        assert_eq!(padding(16, 8), 0);
        assert_eq!(padding(17, 8), 7);
    }

    #[test]
    fn test_advance() {
        assert_eq!(advance(0, 8), 0);
        assert_eq!(advance(1, 8), 8);
        assert_eq!(advance(9, 8), 16);
        assert_eq!(advance(16, 8), 16);
        assert_eq!(advance(5, 2), 6);
    }
}
