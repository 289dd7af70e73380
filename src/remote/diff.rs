// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

/// Set difference of two lists keyed by an identity string
pub struct DiffCalc<'a, E, F>
where
    F: Fn(&E) -> String,
{
    first: &'a [E],
    identity: F,
}

impl<'a, E, F> DiffCalc<'a, E, F>
where
    F: Fn(&E) -> String,
{
    pub fn new(first: &'a [E], identity: F) -> Self {
        Self { first, identity }
    }

    /// Items of the first list whose identity does not occur in `second`,
    /// in their original order.
    pub fn not_existing_in(&self, second: &[E]) -> Vec<&'a E> {
        let present: HashSet<String> = second.iter().map(&self.identity).collect();
        self.first
            .iter()
            .filter(|e| !present.contains(&(self.identity)(*e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: Vec<&&str>) -> Vec<String> {
        items.into_iter().map(|s| s.to_string()).collect()
    }

    fn ident(s: &&str) -> String {
        s.to_string()
    }

    #[test]
    fn test_disjoint_lists_return_first() {
        let first = ["a", "b", "c"];
        let diff = DiffCalc::new(&first, ident);
        assert_eq!(names(diff.not_existing_in(&["d", "e"])), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_identical_lists_return_nothing() {
        let first = ["a", "b", "c"];
        let diff = DiffCalc::new(&first, ident);
        assert!(diff.not_existing_in(&first).is_empty());
    }

    #[test]
    fn test_partial_overlap_keeps_order() {
        let first = ["d", "a", "c", "b"];
        let diff = DiffCalc::new(&first, ident);
        assert_eq!(names(diff.not_existing_in(&["a", "x"])), vec!["d", "c", "b"]);
    }

    #[test]
    fn test_empty_inputs() {
        let empty: [&str; 0] = [];
        assert!(DiffCalc::new(&empty, ident).not_existing_in(&["a"]).is_empty());
        assert_eq!(
            names(DiffCalc::new(&["a"], ident).not_existing_in(&empty)),
            vec!["a"]
        );
    }

    #[test]
    fn test_identity_decides_equality() {
        let first = [("ns1", "a"), ("ns2", "a")];
        let diff = DiffCalc::new(&first, |(ns, name): &(&str, &str)| format!("{ns}/{name}"));
        let missing = diff.not_existing_in(&[("ns1", "a")]);
        assert_eq!(missing, vec![&("ns2", "a")]);
    }
}
