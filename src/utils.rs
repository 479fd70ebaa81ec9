/// Trim ASCII whitespace and line terminators from the end of a byte slice.
pub(crate) fn trim_end(bytes: &[u8]) -> &[u8] {
    let mut bytes = bytes;

    while let [head @ .., b] = bytes {
        if !matches!(*b, b'\r' | b'\n' | b' ' | b'\t') {
            break;
        }

        bytes = head;
    }

    bytes
}

/// Split a byte slice around the first occurrence of `needle`.
pub(crate) fn split_once(bytes: &[u8], needle: u8) -> Option<(&[u8], &[u8])> {
    let n = bytes.iter().position(|&b| b == needle)?;
    Some((&bytes[..n], &bytes[n + 1..]))
}

/// Calculate the padding needed to bring `len` up to `align`, which must be
/// a power of two.
#[inline(always)]
pub(crate) fn padding_to(align: usize, len: usize) -> usize {
    let mask = align - 1;
    (align - (len & mask)) & mask
}
