//! Bookkeeping overhead counters.
//!
//! Tracks how much time the interception layer spends on its own work versus
//! inside the wrapped library, and how much of that overhead goes into each
//! registry list.

use provio_core::ObjectKind;
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;

/// Registry list a piece of bookkeeping time is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverheadList {
    Containers,
    Objects(ObjectKind),
}

impl OverheadList {
    fn index(self) -> usize {
        match self {
            OverheadList::Containers => 0,
            OverheadList::Objects(kind) => 1 + kind.index(),
        }
    }
}

const LIST_LABELS: [&str; 5] = [
    "container_list",
    "dataset_list",
    "group_list",
    "datatype_list",
    "attribute_list",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overhead {
    interception: Duration,
    library: Duration,
    lists: [Duration; 5],
}

impl Overhead {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time spent in the interception layer, excluding the library call.
    pub fn add_interception(&mut self, elapsed: Duration) {
        self.interception = self.interception.saturating_add(elapsed);
    }

    /// Time spent inside the wrapped library.
    pub fn add_library(&mut self, elapsed: Duration) {
        self.library = self.library.saturating_add(elapsed);
    }

    pub fn add_list(&mut self, list: OverheadList, elapsed: Duration) {
        let slot = &mut self.lists[list.index()];
        *slot = slot.saturating_add(elapsed);
    }

    pub fn interception(&self) -> Duration {
        self.interception
    }

    pub fn library(&self) -> Duration {
        self.library
    }

    pub fn list(&self, list: OverheadList) -> Duration {
        self.lists[list.index()]
    }

    /// Same `<name> <micros> us` layout as the stats report.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "interception_overhead {} us", self.interception.as_micros());
        let _ = writeln!(out, "library_time {} us", self.library.as_micros());
        for (label, value) in LIST_LABELS.iter().zip(self.lists.iter()) {
            let _ = writeln!(out, "{} {} us", label, value.as_micros());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_time_is_charged_per_kind() {
        let mut overhead = Overhead::new();
        overhead.add_list(OverheadList::Objects(ObjectKind::Group), Duration::from_micros(5));
        overhead.add_list(OverheadList::Objects(ObjectKind::Group), Duration::from_micros(7));
        overhead.add_list(OverheadList::Containers, Duration::from_micros(1));
        assert_eq!(
            overhead.list(OverheadList::Objects(ObjectKind::Group)),
            Duration::from_micros(12)
        );
        assert_eq!(
            overhead.list(OverheadList::Objects(ObjectKind::Dataset)),
            Duration::ZERO
        );
    }

    #[test]
    fn renders_every_counter() {
        let mut overhead = Overhead::new();
        overhead.add_interception(Duration::from_micros(30));
        overhead.add_library(Duration::from_micros(400));
        overhead.add_list(OverheadList::Objects(ObjectKind::Attribute), Duration::from_micros(2));
        insta::assert_snapshot!(overhead.render_text(), @r"
        interception_overhead 30 us
        library_time 400 us
        container_list 0 us
        dataset_list 0 us
        group_list 0 us
        datatype_list 0 us
        attribute_list 2 us
        ");
    }
}
