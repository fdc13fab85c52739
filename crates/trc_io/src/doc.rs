//! Document-level bookkeeping that has no place in `trc_core::db::Database`:
//! include-marker positions and the `<globals>` key-value table. Everything
//! else the loader reads lands directly in the database tree.

use trc_core::db::{IterId, TestId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MarkerKind {
    Start,
    End,
}

/// Which sibling list a marker's position is counted against: the test
/// children of an iteration (`None` for the root test list), or the
/// iterations of a test.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MarkerAnchor {
    Tests(Option<IterId>),
    Iters(TestId),
}

/// One `xinclude_start`/`xinclude_end` marker: `index` is how many
/// siblings under `anchor` had been seen when the marker was encountered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IncludeMarker {
    pub anchor: MarkerAnchor,
    pub index: usize,
    pub kind: MarkerKind,
}

/// Side information recovered from a loaded document, kept alongside the
/// `Database` so the serializer can re-emit markers in their original
/// bracketing positions and preserve the global tag-substitution table.
#[derive(Default, Clone)]
pub struct LoadedDocument {
    pub markers: Vec<IncludeMarker>,
    pub globals: Vec<(String, String)>,
}

impl LoadedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_marker(&mut self, anchor: MarkerAnchor, index: usize, kind: MarkerKind) {
        self.markers.push(IncludeMarker { anchor, index, kind });
    }

    /// Markers anchored at `index` within `anchor`'s sibling list, in the
    /// order they were recorded.
    pub fn markers_at(&self, anchor: MarkerAnchor, index: usize) -> impl Iterator<Item = MarkerKind> + '_ {
        self.markers
            .iter()
            .filter(move |m| m.anchor == anchor && m.index == index)
            .map(|m| m.kind)
    }
}
