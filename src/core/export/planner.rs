//! Work unit planning
//!
//! Splits an export request into an ordered, gap-free, non-overlapping list of
//! [`WorkUnit`]s: spans of at most `chunk_days` days for event exports, or one
//! unit per page for count-paginated profile exports.

use crate::domain::{DateRange, PageIndex, QuarryError, Result, UnitDescriptor, WorkUnit};
use chrono::{Days, NaiveDate};
use std::collections::HashSet;
use uuid::Uuid;

/// An ordered set of units sharing one plan id
#[derive(Debug, Clone)]
pub struct Plan {
    /// Identifies this run's units; `(id, unit.index)` is unique
    pub id: Uuid,
    pub units: Vec<WorkUnit>,
}

impl Plan {
    fn from_descriptors(descriptors: impl IntoIterator<Item = UnitDescriptor>) -> Self {
        let units = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| WorkUnit::new(index, descriptor))
            .collect();
        Self {
            id: Uuid::new_v4(),
            units,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Decomposes export requests into work units
#[derive(Debug, Clone, Copy)]
pub struct WorkUnitPlanner {
    chunk_days: u32,
}

impl WorkUnitPlanner {
    /// # Errors
    ///
    /// Returns [`QuarryError::Planning`] if `chunk_days` is zero.
    pub fn new(chunk_days: u32) -> Result<Self> {
        if chunk_days == 0 {
            return Err(QuarryError::Planning(
                "chunk_days must be greater than 0".to_string(),
            ));
        }
        Ok(Self { chunk_days })
    }

    /// Split `[from, to]` into consecutive spans of at most `chunk_days` days
    ///
    /// The last span may be shorter. A range shorter than one chunk yields
    /// exactly one unit.
    pub fn plan_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Plan> {
        let whole = DateRange::new(from, to).map_err(QuarryError::Planning)?;

        let mut descriptors = Vec::new();
        let mut start = whole.from;
        loop {
            let end = start
                .checked_add_days(Days::new(u64::from(self.chunk_days) - 1))
                .map_or(whole.to, |d| d.min(whole.to));
            descriptors.push(UnitDescriptor::Range(DateRange { from: start, to: end }));

            if end >= whole.to {
                break;
            }
            start = end.checked_add_days(Days::new(1)).ok_or_else(|| {
                QuarryError::Planning(format!("date overflow after {end}"))
            })?;
        }

        Ok(Plan::from_descriptors(descriptors))
    }

    /// One unit per page of a count-paginated source
    ///
    /// `num_units = ceil(total / page_size)`; an empty source still yields the
    /// single discovery unit.
    pub fn plan_pages(&self, total: u64, page_size: u64) -> Result<Plan> {
        let pages = if total == 0 {
            1
        } else if page_size == 0 {
            return Err(QuarryError::Planning(format!(
                "source reported {total} records with a page size of 0"
            )));
        } else {
            total.div_ceil(page_size)
        };

        Ok(Plan::from_descriptors(
            (0..pages).map(|page| UnitDescriptor::Page(PageIndex { page })),
        ))
    }

    /// Exactly the given units, typically the failures of an earlier run
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Planning`] if the list is empty, mixes date
    /// ranges with pages, or repeats a descriptor.
    pub fn plan_units(&self, descriptors: &[UnitDescriptor]) -> Result<Plan> {
        let Some(first) = descriptors.first() else {
            return Err(QuarryError::Planning("no units to export".to_string()));
        };

        let paginated = first.as_page().is_some();
        if descriptors
            .iter()
            .any(|d| d.as_page().is_some() != paginated)
        {
            return Err(QuarryError::Planning(
                "cannot mix date-range and page units in one request".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for descriptor in descriptors {
            if !seen.insert(*descriptor) {
                return Err(QuarryError::Planning(format!(
                    "unit {descriptor} is listed more than once"
                )));
            }
        }

        let mut ranges: Vec<DateRange> = descriptors
            .iter()
            .filter_map(|d| d.as_range().copied())
            .collect();
        ranges.sort_unstable();
        if let Some(pair) = ranges.windows(2).find(|pair| pair[0].overlaps(&pair[1])) {
            return Err(QuarryError::Planning(format!(
                "units {} and {} overlap",
                pair[0], pair[1]
            )));
        }

        Ok(Plan::from_descriptors(descriptors.iter().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ranges(plan: &Plan) -> Vec<(String, String)> {
        plan.units
            .iter()
            .map(|u| {
                let r = u.descriptor.as_range().unwrap();
                (r.from.to_string(), r.to.to_string())
            })
            .collect()
    }

    #[test]
    fn test_january_in_weekly_chunks() {
        let planner = WorkUnitPlanner::new(7).unwrap();
        let plan = planner
            .plan_range(date("2024-01-01"), date("2024-01-30"))
            .unwrap();

        let expected = [
            ("2024-01-01", "2024-01-07"),
            ("2024-01-08", "2024-01-14"),
            ("2024-01-15", "2024-01-21"),
            ("2024-01-22", "2024-01-28"),
            ("2024-01-29", "2024-01-30"),
        ];
        let expected: Vec<(String, String)> = expected
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        assert_eq!(ranges(&plan), expected);
        assert_eq!(
            plan.units.iter().map(|u| u.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test_case("2024-01-01", "2024-01-01", 7, 1 ; "single day")]
    #[test_case("2024-01-01", "2024-01-05", 7, 1 ; "shorter than one chunk")]
    #[test_case("2024-01-01", "2024-01-07", 7, 1 ; "exactly one chunk")]
    #[test_case("2024-01-01", "2024-01-08", 7, 2 ; "one day over")]
    #[test_case("2024-01-01", "2024-12-31", 1, 366 ; "daily over a leap year")]
    #[test_case("2023-12-25", "2024-01-10", 30, 1 ; "across a year boundary")]
    fn test_unit_count(from: &str, to: &str, chunk: u32, expected: usize) {
        let plan = WorkUnitPlanner::new(chunk)
            .unwrap()
            .plan_range(date(from), date(to))
            .unwrap();
        assert_eq!(plan.len(), expected);
    }

    #[test_case("2024-01-01", "2024-03-17", 7)]
    #[test_case("2024-02-20", "2024-03-05", 3)]
    #[test_case("2023-11-30", "2024-02-02", 11)]
    #[test_case("2024-06-01", "2024-06-01", 365)]
    fn test_units_cover_range_without_gaps(from: &str, to: &str, chunk: u32) {
        let plan = WorkUnitPlanner::new(chunk)
            .unwrap()
            .plan_range(date(from), date(to))
            .unwrap();

        let spans: Vec<DateRange> = plan
            .units
            .iter()
            .map(|u| *u.descriptor.as_range().unwrap())
            .collect();

        assert_eq!(spans.first().unwrap().from, date(from));
        assert_eq!(spans.last().unwrap().to, date(to));
        for span in &spans {
            assert!(span.days() >= 1);
            assert!(span.days() <= i64::from(chunk));
        }
        for pair in spans.windows(2) {
            assert_eq!(pair[0].to.succ_opt().unwrap(), pair[1].from);
        }
    }

    #[test]
    fn test_inverted_range_is_planning_error() {
        let planner = WorkUnitPlanner::new(7).unwrap();
        let result = planner.plan_range(date("2024-02-01"), date("2024-01-01"));
        assert!(matches!(result, Err(QuarryError::Planning(_))));
    }

    #[test]
    fn test_zero_chunk_is_planning_error() {
        assert!(matches!(
            WorkUnitPlanner::new(0),
            Err(QuarryError::Planning(_))
        ));
    }

    #[test_case(2500, 1000, 3 ; "partial last page")]
    #[test_case(3000, 1000, 3 ; "exact multiple")]
    #[test_case(1, 1000, 1 ; "single record")]
    #[test_case(0, 1000, 1 ; "empty source")]
    #[test_case(0, 0, 1 ; "empty source without page size")]
    fn test_page_count(total: u64, page_size: u64, expected: u64) {
        let plan = WorkUnitPlanner::new(7)
            .unwrap()
            .plan_pages(total, page_size)
            .unwrap();

        let pages: Vec<u64> = plan
            .units
            .iter()
            .map(|u| u.descriptor.as_page().unwrap().page)
            .collect();
        assert_eq!(pages, (0..expected).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_page_size_with_records_is_rejected() {
        let result = WorkUnitPlanner::new(7).unwrap().plan_pages(10, 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_plan_units_keeps_order_and_reindexes() {
        let planner = WorkUnitPlanner::new(7).unwrap();
        let descriptors = vec![
            UnitDescriptor::Page(PageIndex { page: 4 }),
            UnitDescriptor::Page(PageIndex { page: 1 }),
        ];

        let plan = planner.plan_units(&descriptors).unwrap();
        assert_eq!(plan.units[0].index, 0);
        assert_eq!(plan.units[0].descriptor, descriptors[0]);
        assert_eq!(plan.units[1].descriptor, descriptors[1]);
    }

    #[test]
    fn test_plan_units_rejections() {
        let planner = WorkUnitPlanner::new(7).unwrap();
        let range = UnitDescriptor::Range(
            DateRange::new(date("2024-01-15"), date("2024-01-21")).unwrap(),
        );
        let page = UnitDescriptor::Page(PageIndex { page: 2 });

        assert!(planner.plan_units(&[]).is_err());
        assert!(planner.plan_units(&[range, page]).is_err());
        assert!(planner.plan_units(&[page, page]).is_err());
        assert!(planner.plan_units(&[range]).is_ok());
    }

    #[test]
    fn test_plan_units_rejects_overlapping_ranges() {
        let planner = WorkUnitPlanner::new(7).unwrap();
        let unit = |from: &str, to: &str| {
            UnitDescriptor::Range(DateRange::new(date(from), date(to)).unwrap())
        };

        let err = planner
            .plan_units(&[unit("2024-01-05", "2024-01-10"), unit("2024-01-01", "2024-01-07")])
            .unwrap_err();
        assert!(matches!(err, QuarryError::Planning(_)));
        assert!(err.to_string().contains("overlap"));

        let adjacent = [unit("2024-01-08", "2024-01-14"), unit("2024-01-01", "2024-01-07")];
        assert_eq!(planner.plan_units(&adjacent).unwrap().units.len(), 2);
    }

    #[test]
    fn test_plans_get_distinct_ids() {
        let planner = WorkUnitPlanner::new(7).unwrap();
        let a = planner.plan_pages(0, 100).unwrap();
        let b = planner.plan_pages(0, 100).unwrap();
        assert_ne!(a.id, b.id);
    }
}
