//! Write-once identity fields.

/// A value that can be "unset" without being absent.
///
/// Wire payloads frequently carry `""` for identity fields they do not know
/// yet; those must not block a later real value.
pub trait Blank {
    /// Returns true if the value counts as unset.
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for &str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T> Blank for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

/// Writes `incoming` into `slot` only if the slot is still unset.
///
/// The first non-blank write wins. Later writes to an already-set slot are
/// ignored, as are blank incoming values. Returns `true` if the slot changed.
pub fn set_once<T: Blank>(slot: &mut Option<T>, incoming: Option<T>) -> bool {
    let Some(incoming) = incoming else {
        return false;
    };
    if incoming.is_blank() {
        return false;
    }
    match slot {
        Some(existing) if !existing.is_blank() => false,
        _ => {
            *slot = Some(incoming);
            true
        }
    }
}
