//! Sizing of the transfer buffer from the active link.

/// Source of the active network link's maximum transmission unit.
///
/// Queried at the start of every transfer, so a renegotiated link is picked
/// up without restarting anything.
pub trait Link {
    /// The MTU in bytes, or `None` when the interface cannot tell (e.g. a
    /// Wi-Fi module that hides its EMAC).
    fn mtu(&self) -> Option<usize>;
}

impl Link for Option<usize> {
    fn mtu(&self) -> Option<usize> {
        *self
    }
}

impl Link for usize {
    fn mtu(&self) -> Option<usize> {
        Some(*self)
    }
}

impl<L: Link + ?Sized> Link for &L {
    fn mtu(&self) -> Option<usize> {
        (**self).mtu()
    }
}

/// Computes the per-read/per-write chunk size for one transfer.
///
/// Returns `link_mtu - overhead` when the MTU is known and leaves room for
/// payload, otherwise `fallback`.
///
/// ```
/// assert_eq!(flashdrop::compute_chunk_size(Some(1500), 66, 128), 1434);
/// assert_eq!(flashdrop::compute_chunk_size(Some(60), 66, 128), 128);
/// assert_eq!(flashdrop::compute_chunk_size(None, 66, 128), 128);
/// ```
pub fn compute_chunk_size(link_mtu: Option<usize>, overhead: usize, fallback: usize) -> usize {
    match link_mtu.and_then(|mtu| mtu.checked_sub(overhead)) {
        Some(size) if size > 0 => size,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_mtu() {
        assert_eq!(compute_chunk_size(Some(1500), 66, 128), 1434);
        assert_eq!(compute_chunk_size(Some(67), 66, 128), 1);
    }

    #[test]
    fn test_falls_back_without_payload_room() {
        assert_eq!(compute_chunk_size(Some(66), 66, 128), 128);
        assert_eq!(compute_chunk_size(Some(0), 66, 128), 128);
        assert_eq!(compute_chunk_size(None, 66, 128), 128);
    }

    #[test]
    fn test_link_impls() {
        assert_eq!(Some(576usize).mtu(), Some(576));
        assert_eq!(None::<usize>.mtu(), None);
        assert_eq!(1500usize.mtu(), Some(1500));
        let link: &dyn Link = &1280usize;
        assert_eq!(link.mtu(), Some(1280));
    }
}
