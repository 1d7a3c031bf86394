//! Alignment arithmetic shared by the bump allocators

/// Rounds `value` up to the next multiple of `align`.
///
/// Returns `None` if the rounded value does not fit in a `usize`.
/// `align` must be a power of two.
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Whether `align` is usable as an allocation alignment.
#[inline]
pub(crate) const fn is_valid_align(align: usize) -> bool {
    align != 0 && align.is_power_of_two()
}
