//! Grouping strategies: which variants form each test unit.
//!
//! A [`Grouping`] is resolved against the selected variants into a
//! [`UnitPlan`], whose [`UnitPlan::units`] yields the units lazily and
//! can be called again to restart. Every selected variant lands in
//! exactly one unit. Members of a unit are ascending variant indices.

use anyhow::Result;

use ordgwas_geno::selection::Selection;
use ordgwas_geno::snpset_file::SnpSetMapping;

use super::error::ScanError;

/// Grouping mode chosen at configuration time.
#[derive(Debug, Clone, Default)]
pub enum Grouping {
    /// One unit per variant.
    #[default]
    Single,
    /// Consecutive chunks of this many selected variants; the last may be
    /// shorter.
    FixedWindow(usize),
    /// Sets from a mapping file whose rows follow the source's variant order.
    NamedSets(SnpSetMapping),
    /// One unit holding exactly these variants.
    ExplicitSet(Selection),
}

impl Grouping {
    pub fn describe(&self) -> String {
        match self {
            Grouping::Single => "single variants".to_string(),
            Grouping::FixedWindow(w) => format!("windows of {} variants", w),
            Grouping::NamedSets(m) => format!("named sets ({} mapping rows)", m.len()),
            Grouping::ExplicitSet(_) => "one explicit set".to_string(),
        }
    }

    /// Members are picked out of file order, so a forward-only source has
    /// to be materialized first.
    pub fn needs_random_access(&self) -> bool {
        matches!(self, Grouping::NamedSets(_) | Grouping::ExplicitSet(_))
    }

    /// Resolve against the selected variant indices (ascending) out of
    /// `n_variants`.
    pub fn plan(&self, selected: &[usize], n_variants: usize) -> Result<UnitPlan> {
        let kind = match self {
            Grouping::Single => PlanKind::Chunks {
                selected: selected.to_vec(),
                width: 1,
            },
            Grouping::FixedWindow(0) => {
                return Err(ScanError::Configuration("window width must be at least 1".into()).into())
            }
            Grouping::FixedWindow(w) => PlanKind::Chunks {
                selected: selected.to_vec(),
                width: *w,
            },
            Grouping::NamedSets(mapping) => {
                let mut keep = vec![false; n_variants];
                for &i in selected {
                    keep[i] = true;
                }
                let sets = mapping
                    .sets()
                    .into_iter()
                    .filter_map(|set| {
                        let members: Vec<usize> = set
                            .members
                            .into_iter()
                            .filter(|&i| keep.get(i).copied().unwrap_or(false))
                            .collect();
                        (!members.is_empty()).then_some(PlannedSet {
                            name: set.name,
                            members,
                        })
                    })
                    .collect();
                PlanKind::Sets(sets)
            }
            Grouping::ExplicitSet(selection) => {
                let explicit = selection
                    .resolve(n_variants)
                    .map_err(|e| ScanError::Configuration(format!("explicit set: {:#}", e)))?;
                let members: Vec<usize> = explicit
                    .into_iter()
                    .filter(|i| selected.binary_search(i).is_ok())
                    .collect();
                if members.is_empty() {
                    return Err(
                        ScanError::Configuration("explicit set selects no variants".into()).into(),
                    );
                }
                PlanKind::Explicit(members)
            }
        };
        Ok(UnitPlan { kind })
    }
}

#[derive(Debug, Clone)]
struct PlannedSet {
    name: String,
    members: Vec<usize>,
}

#[derive(Debug, Clone)]
enum PlanKind {
    Chunks { selected: Vec<usize>, width: usize },
    Sets(Vec<PlannedSet>),
    Explicit(Vec<usize>),
}

/// Precomputed partition of the selected variants into test units.
#[derive(Debug, Clone)]
pub struct UnitPlan {
    kind: PlanKind,
}

/// One joint hypothesis test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestUnit<'a> {
    /// Ascending variant indices.
    pub members: &'a [usize],
    /// Set id for named sets.
    pub name: Option<&'a str>,
}

impl UnitPlan {
    /// Number of units.
    pub fn len(&self) -> usize {
        match &self.kind {
            PlanKind::Chunks { selected, width } => selected.len().div_ceil(*width),
            PlanKind::Sets(sets) => sets.len(),
            PlanKind::Explicit(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widest unit.
    pub fn max_width(&self) -> usize {
        match &self.kind {
            PlanKind::Chunks { selected, width } => (*width).min(selected.len()),
            PlanKind::Sets(sets) => sets.iter().map(|s| s.members.len()).max().unwrap_or(0),
            PlanKind::Explicit(members) => members.len(),
        }
    }

    /// Iterate the units from the start.
    pub fn units(&self) -> Units<'_> {
        Units { plan: self, next: 0 }
    }
}

/// Lazy iterator over a plan's units.
pub struct Units<'a> {
    plan: &'a UnitPlan,
    next: usize,
}

impl<'a> Iterator for Units<'a> {
    type Item = TestUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let k = self.next;
        let unit = match &self.plan.kind {
            PlanKind::Chunks { selected, width } => {
                let start = k * width;
                if start >= selected.len() {
                    return None;
                }
                let end = (start + width).min(selected.len());
                TestUnit {
                    members: &selected[start..end],
                    name: None,
                }
            }
            PlanKind::Sets(sets) => {
                let set = sets.get(k)?;
                TestUnit {
                    members: &set.members,
                    name: Some(&set.name),
                }
            }
            PlanKind::Explicit(members) => {
                if k > 0 {
                    return None;
                }
                TestUnit {
                    members,
                    name: None,
                }
            }
        };
        self.next += 1;
        Some(unit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.plan.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Units<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_single_units() {
        let plan = Grouping::Single.plan(&[0, 2, 5], 6).unwrap();
        let members: Vec<Vec<usize>> = plan.units().map(|u| u.members.to_vec()).collect();
        assert_eq!(members, vec![vec![0], vec![2], vec![5]]);
        assert_eq!(plan.max_width(), 1);
    }

    #[test]
    fn test_windows_cover_selection_in_order() {
        let plan = Grouping::FixedWindow(4).plan(&all(10), 10).unwrap();
        assert_eq!(plan.len(), 3);
        let widths: Vec<usize> = plan.units().map(|u| u.members.len()).collect();
        assert_eq!(widths, vec![4, 4, 2]);
        let flat: Vec<usize> = plan.units().flat_map(|u| u.members.iter().copied()).collect();
        assert_eq!(flat, all(10));
        // Restartable.
        assert_eq!(plan.units().count(), 3);
    }

    #[test]
    fn test_windows_skip_deselected_variants() {
        let plan = Grouping::FixedWindow(2).plan(&[1, 3, 4, 8, 9], 10).unwrap();
        let members: Vec<Vec<usize>> = plan.units().map(|u| u.members.to_vec()).collect();
        assert_eq!(members, vec![vec![1, 3], vec![4, 8], vec![9]]);
    }

    #[test]
    fn test_zero_width_rejected() {
        let err = Grouping::FixedWindow(0).plan(&all(3), 3).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>(),
            Some(ScanError::Configuration(_))
        ));
    }

    #[test]
    fn test_named_sets_drop_deselected_members() {
        let mapping = SnpSetMapping::from_pairs(&[
            ("g1", "a"),
            ("g2", "b"),
            ("g1", "c"),
            ("g3", "d"),
            ("g2", "e"),
        ]);
        let plan = Grouping::NamedSets(mapping).plan(&[0, 1, 2, 4], 5).unwrap();
        let units: Vec<(Option<&str>, Vec<usize>)> =
            plan.units().map(|u| (u.name, u.members.to_vec())).collect();
        assert_eq!(
            units,
            vec![(Some("g1"), vec![0, 2]), (Some("g2"), vec![1, 4])]
        );
        assert_eq!(plan.max_width(), 2);
    }

    #[test]
    fn test_explicit_set_is_one_unit() {
        let selection = Selection::from_one_based(&[22, 4, 17]).unwrap();
        let plan = Grouping::ExplicitSet(selection).plan(&all(30), 30).unwrap();
        assert_eq!(plan.len(), 1);
        let units: Vec<TestUnit> = plan.units().collect();
        assert_eq!(units[0].members, &[3, 16, 21]);
    }

    #[test]
    fn test_explicit_set_out_of_range() {
        let selection = Selection::Indices(vec![3, 40]);
        assert!(Grouping::ExplicitSet(selection).plan(&all(30), 30).is_err());
        let mask = Selection::Mask(vec![false; 30]);
        assert!(Grouping::ExplicitSet(mask).plan(&all(30), 30).is_err());
    }
}
