//! Descendant closure over the team forest.
//!
//! # Responsibility
//! - Index parent links by parent so children can be enumerated.
//! - Compute the set of teams reachable downward from a set of roots.
//!
//! # Invariants
//! - Roots are excluded from the result unless reached from another root.
//! - The walk is iterative and visits each team at most once, so it
//!   terminates on arbitrarily deep chains and even on malformed cyclic data.

use crate::model::team::{TeamId, TeamLink};
use std::collections::{BTreeSet, HashMap};

/// Parent-indexed adjacency of the whole team forest.
#[derive(Debug, Clone, Default)]
pub struct TeamForest {
    children: HashMap<TeamId, Vec<TeamId>>,
}

impl TeamForest {
    pub fn from_links<I>(links: I) -> Self
    where
        I: IntoIterator<Item = TeamLink>,
    {
        let mut children: HashMap<TeamId, Vec<TeamId>> = HashMap::new();
        for link in links {
            if let Some(parent_id) = link.parent_id {
                children.entry(parent_id).or_default().push(link.id);
            }
        }
        Self { children }
    }

    /// Direct children of `id`; empty for leaves and unknown ids.
    pub fn children_of(&self, id: TeamId) -> &[TeamId] {
        self.children.get(&id).map_or(&[], Vec::as_slice)
    }

    /// All teams below any of `roots`, at every depth.
    pub fn descendants(&self, roots: &BTreeSet<TeamId>) -> BTreeSet<TeamId> {
        let mut found = BTreeSet::new();
        let mut pending: Vec<TeamId> = roots
            .iter()
            .flat_map(|root| self.children_of(*root).iter().copied())
            .collect();

        while let Some(id) = pending.pop() {
            if found.insert(id) {
                pending.extend_from_slice(self.children_of(id));
            }
        }

        found
    }
}

/// Returns the first member of `members` that sits below another member.
///
/// `closure` must be the descendant closure of `members`.
pub fn first_nested_member(
    members: &BTreeSet<TeamId>,
    closure: &BTreeSet<TeamId>,
) -> Option<TeamId> {
    members.iter().copied().find(|id| closure.contains(id))
}

#[cfg(test)]
mod tests {
    use super::{first_nested_member, TeamForest};
    use crate::model::team::{TeamId, TeamLink};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn link(id: TeamId, parent_id: Option<TeamId>) -> TeamLink {
        TeamLink { id, parent_id }
    }

    fn set(ids: &[TeamId]) -> BTreeSet<TeamId> {
        ids.iter().copied().collect()
    }

    // 1 -> {2, 3}, 2 -> {4}, 4 -> {5}; 6 is a separate root with child 7.
    fn sample_forest() -> TeamForest {
        TeamForest::from_links([
            link(1, None),
            link(2, Some(1)),
            link(3, Some(1)),
            link(4, Some(2)),
            link(5, Some(4)),
            link(6, None),
            link(7, Some(6)),
        ])
    }

    #[test]
    fn descendants_cover_every_depth_and_exclude_the_root() {
        let forest = sample_forest();
        assert_eq!(forest.descendants(&set(&[1])), set(&[2, 3, 4, 5]));
        assert_eq!(forest.descendants(&set(&[2])), set(&[4, 5]));
    }

    #[test]
    fn leaves_and_unknown_ids_have_no_descendants() {
        let forest = sample_forest();
        assert!(forest.descendants(&set(&[5])).is_empty());
        assert!(forest.descendants(&set(&[404])).is_empty());
        assert!(forest.descendants(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn multiple_roots_are_unioned() {
        let forest = sample_forest();
        assert_eq!(forest.descendants(&set(&[2, 6])), set(&[4, 5, 7]));
    }

    #[test]
    fn root_reached_from_another_root_is_included() {
        let forest = sample_forest();
        assert_eq!(forest.descendants(&set(&[1, 4])), set(&[2, 3, 4, 5]));
    }

    #[test]
    fn first_nested_member_reports_the_descendant() {
        let forest = sample_forest();
        let members = set(&[2, 5]);
        let closure = forest.descendants(&members);
        assert_eq!(first_nested_member(&members, &closure), Some(5));

        let siblings = set(&[2, 3]);
        let closure = forest.descendants(&siblings);
        assert_eq!(first_nested_member(&siblings, &closure), None);
    }

    #[test]
    fn deep_chain_does_not_overflow_the_stack() {
        let depth: TeamId = 100_000;
        let forest = TeamForest::from_links(
            (1..=depth).map(|id| link(id, if id == 1 { None } else { Some(id - 1) })),
        );
        let closure = forest.descendants(&set(&[1]));
        assert_eq!(closure.len(), (depth - 1) as usize);
        assert!(closure.contains(&depth));
    }

    #[test]
    fn cyclic_data_still_terminates() {
        let forest = TeamForest::from_links([link(1, Some(3)), link(2, Some(1)), link(3, Some(2))]);
        assert_eq!(forest.descendants(&set(&[1])), set(&[1, 2, 3]));
    }

    /// Random forest: team `i` may only point at a parent with a smaller id.
    fn arb_forest() -> impl Strategy<Value = Vec<TeamLink>> {
        (1usize..40).prop_flat_map(|size| {
            proptest::collection::vec(proptest::option::weighted(0.8, 0usize..size), size)
                .prop_map(|parents| {
                    parents
                        .into_iter()
                        .enumerate()
                        .map(|(index, parent)| {
                            let parent_id = parent
                                .filter(|parent| *parent < index)
                                .map(|parent| parent as TeamId);
                            link(index as TeamId, parent_id)
                        })
                        .collect()
                })
        })
    }

    fn is_proper_ancestor(links: &[TeamLink], ancestor: TeamId, id: TeamId) -> bool {
        let mut cursor = links[id as usize].parent_id;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = links[current as usize].parent_id;
        }
        false
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_roots_only_appear_when_below_another_root(
            links in arb_forest(),
            picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..5),
        ) {
            let roots: BTreeSet<TeamId> =
                picks.iter().map(|pick| pick.index(links.len()) as TeamId).collect();
            let forest = TeamForest::from_links(links.iter().copied());
            let closure = forest.descendants(&roots);

            for root in &roots {
                let below_other = roots
                    .iter()
                    .any(|other| other != root && is_proper_ancestor(&links, *other, *root));
                prop_assert_eq!(closure.contains(root), below_other);
            }
        }

        #[test]
        fn prop_closure_is_exactly_the_proper_descendants(
            links in arb_forest(),
            picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..5),
        ) {
            let roots: BTreeSet<TeamId> =
                picks.iter().map(|pick| pick.index(links.len()) as TeamId).collect();
            let forest = TeamForest::from_links(links.iter().copied());
            let closure = forest.descendants(&roots);

            for candidate in &links {
                let expected = roots
                    .iter()
                    .any(|root| is_proper_ancestor(&links, *root, candidate.id));
                prop_assert_eq!(closure.contains(&candidate.id), expected);
            }
        }
    }
}
