//! Property-based tests for syntactic path normalization.

use std::path::{Component, Path, PathBuf};

use proptest::prelude::*;

use super::normalize_syntactic;

#[derive(Debug, Clone)]
enum Segment {
    Name(String),
    Parent,
    Current,
}

fn arb_segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(Segment::Name),
        Just(Segment::Parent),
        Just(Segment::Current),
    ]
}

fn arb_rooted_path() -> impl Strategy<Value = PathBuf> {
    prop::collection::vec(arb_segment(), 0..10).prop_map(|segments| {
        let mut path = PathBuf::from("/");
        for segment in segments {
            match segment {
                Segment::Name(name) => path.push(name),
                Segment::Parent => path.push(".."),
                Segment::Current => path.push("."),
            }
        }
        path
    })
}

proptest! {
    /// Normalizing twice is the same as normalizing once.
    #[test]
    fn normalize_is_idempotent(path in arb_rooted_path()) {
        let once = normalize_syntactic(&path);
        let twice = normalize_syntactic(&once);
        prop_assert_eq!(once, twice);
    }

    /// The normalized form never carries a `.` or `..` component: every
    /// `ParentDir` either consumes a preceding `Normal` segment or is
    /// dropped outright at the root, and `CurDir` is always dropped.
    #[test]
    fn normalize_strips_dot_and_dotdot(path in arb_rooted_path()) {
        let normalized = normalize_syntactic(&path);
        for component in normalized.components() {
            prop_assert!(!matches!(component, Component::CurDir | Component::ParentDir));
        }
    }

    /// Normalization never turns a rooted path into a relative one.
    #[test]
    fn normalize_preserves_root(path in arb_rooted_path()) {
        let normalized = normalize_syntactic(&path);
        prop_assert!(normalized.starts_with(Path::new("/")));
    }
}
