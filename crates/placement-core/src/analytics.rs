use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grade::round2;
use crate::model::{CompanyReference, PlacementStatus, StudentResult};

/// Package-range histogram buckets in lakhs per annum, `[lower, upper)`.
/// The last bucket has no upper bound.
pub const PACKAGE_BUCKETS: [(&str, f64, Option<f64>); 6] = [
    ("0-3 LPA", 0.0, Some(3.0)),
    ("3-6 LPA", 3.0, Some(6.0)),
    ("6-10 LPA", 6.0, Some(10.0)),
    ("10-15 LPA", 10.0, Some(15.0)),
    ("15-25 LPA", 15.0, Some(25.0)),
    ("25+ LPA", 25.0, None),
];

const UNKNOWN_TIER: &str = "Unknown";
const UNSPECIFIED_BRANCH: &str = "Unspecified";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BranchStats {
    pub branch: String,
    pub total: usize,
    pub placed: usize,
    pub rate: f64,
    pub avg_package: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyStats {
    pub company: String,
    pub tier: String,
    pub hires: usize,
    pub avg_package: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageBucket {
    pub range: String,
    pub count: usize,
}

/// Population-level placement statistics. Recomputed on every call and never
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStatistics {
    pub total_students: usize,
    pub placed_students: usize,
    pub placement_rate: f64,
    pub average_package: f64,
    pub highest_package: f64,
    pub median_package: f64,
    pub branch_wise_stats: Vec<BranchStats>,
    pub company_wise_stats: Vec<CompanyStats>,
    pub package_distribution: Vec<PackageBucket>,
}

#[derive(Default)]
struct BranchTally {
    total: usize,
    placed: usize,
    packages: Vec<f64>,
}

struct CompanyTally {
    display: String,
    hires: usize,
    packages: Vec<f64>,
}

/// Computes statistics over `students`, annotating companies with tiers from
/// `companies`. An empty population yields zeroes, never an error.
///
/// Only placed students with a recorded package contribute to package
/// figures.
#[must_use]
pub fn aggregate<'a, I>(students: I, companies: &[CompanyReference]) -> AggregateStatistics
where
    I: IntoIterator<Item = &'a StudentResult>,
{
    let mut total_students = 0;
    let mut placed_students = 0;
    let mut packages = Vec::new();
    let mut branches: BTreeMap<String, BranchTally> = BTreeMap::new();
    let mut hires: BTreeMap<String, CompanyTally> = BTreeMap::new();

    for student in students {
        total_students += 1;

        let branch = match student.branch.trim() {
            "" => UNSPECIFIED_BRANCH.to_string(),
            value => value.to_string(),
        };
        let tally = branches.entry(branch).or_default();
        tally.total += 1;

        if student.placement.status != PlacementStatus::Placed {
            continue;
        }
        placed_students += 1;
        tally.placed += 1;

        let package = student.placement.package.map(|package| package.lakhs());
        if let Some(value) = package {
            packages.push(value);
            tally.packages.push(value);
        }

        if let Some(company) = student
            .placement
            .company
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            let entry = hires
                .entry(company.to_lowercase())
                .or_insert_with(|| CompanyTally {
                    display: company.to_string(),
                    hires: 0,
                    packages: Vec::new(),
                });
            entry.hires += 1;
            if let Some(value) = package {
                entry.packages.push(value);
            }
        }
    }

    packages.sort_by(f64::total_cmp);

    let branch_wise_stats = branches
        .into_iter()
        .map(|(branch, tally)| BranchStats {
            branch,
            total: tally.total,
            placed: tally.placed,
            rate: rate(tally.placed, tally.total),
            avg_package: mean(&tally.packages),
        })
        .collect();

    let mut company_wise_stats = hires
        .into_values()
        .map(|tally| CompanyStats {
            tier: tier_for(&tally.display, companies),
            company: tally.display,
            hires: tally.hires,
            avg_package: mean(&tally.packages),
        })
        .collect::<Vec<_>>();
    company_wise_stats.sort_by(|a, b| {
        b.hires
            .cmp(&a.hires)
            .then_with(|| a.company.cmp(&b.company))
    });

    AggregateStatistics {
        total_students,
        placed_students,
        placement_rate: rate(placed_students, total_students),
        average_package: mean(&packages),
        highest_package: packages.last().copied().map_or(0.0, round2),
        median_package: lower_median(&packages),
        branch_wise_stats,
        company_wise_stats,
        package_distribution: distribution(&packages),
    }
}

fn tier_for(company: &str, companies: &[CompanyReference]) -> String {
    companies
        .iter()
        .find(|reference| reference.name.trim().eq_ignore_ascii_case(company))
        .map_or_else(|| UNKNOWN_TIER.to_string(), |reference| reference.tier.clone())
}

#[allow(clippy::cast_precision_loss)]
fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 * 100.0 / whole as f64)
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().sum::<f64>() / values.len() as f64)
}

/// Index-based selection on a sorted list; even lengths take the lower middle.
fn lower_median(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    round2(sorted[(sorted.len() - 1) / 2])
}

fn distribution(packages: &[f64]) -> Vec<PackageBucket> {
    PACKAGE_BUCKETS
        .iter()
        .map(|(label, lower, upper)| PackageBucket {
            range: (*label).to_string(),
            count: packages
                .iter()
                .filter(|value| {
                    **value >= *lower
                        && match upper {
                            Some(upper) => **value < *upper,
                            None => true,
                        }
                })
                .count(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;
    use crate::model::PlacementRecord;
    use crate::package::Package;

    fn student(roll: &str, branch: &str, placed: Option<(&str, &str)>) -> StudentResult {
        let placement = match placed {
            Some((company, package)) => PlacementRecord {
                status: PlacementStatus::Placed,
                company: Some(company.to_string()),
                package: Package::parse(package).ok(),
                joining_date: None,
            },
            None => PlacementRecord::default(),
        };
        StudentResult {
            roll_number: roll.to_string(),
            name: format!("Student {roll}"),
            branch: branch.to_string(),
            placement,
            ..StudentResult::default()
        }
    }

    fn fixture() -> Vec<StudentResult> {
        vec![
            student("CS01", "CSE", Some(("Infosys", "4.5 LPA"))),
            student("CS02", "CSE", Some(("Google", "32 LPA"))),
            student("CS03", "CSE", Some((" infosys ", "₹6,00,000"))),
            student("CS04", "CSE", None),
            student("EC01", "ECE", Some(("Bosch", "not disclosed"))),
            student("EC02", "ECE", None),
            student("ME01", "", None),
        ]
    }

    fn references() -> Vec<CompanyReference> {
        vec![
            CompanyReference {
                name: "Google".to_string(),
                tier: "Tier 1".to_string(),
            },
            CompanyReference {
                name: "infosys".to_string(),
                tier: "Tier 2".to_string(),
            },
        ]
    }

    #[test]
    fn empty_population_is_all_zero() {
        let stats = aggregate(&Vec::<StudentResult>::new(), &[]);
        assert_eq!(stats.total_students, 0);
        assert_eq!(stats.placement_rate, 0.0);
        assert_eq!(stats.average_package, 0.0);
        assert_eq!(stats.median_package, 0.0);
        assert!(stats.branch_wise_stats.is_empty());
        assert!(stats.company_wise_stats.is_empty());
        assert_eq!(stats.package_distribution.len(), PACKAGE_BUCKETS.len());
        assert!(stats.package_distribution.iter().all(|bucket| bucket.count == 0));
    }

    #[test]
    fn headline_figures_skip_missing_packages() {
        let stats = aggregate(&fixture(), &references());

        assert_eq!(stats.total_students, 7);
        assert_eq!(stats.placed_students, 4);
        assert_eq!(stats.placement_rate, 57.14);
        // packages: 4.5, 6.0, 32.0; Bosch has none.
        assert_eq!(stats.average_package, 14.17);
        assert_eq!(stats.highest_package, 32.0);
        assert_eq!(stats.median_package, 6.0);
    }

    #[test]
    fn median_takes_lower_middle_on_even_count() {
        let students = vec![
            student("A", "CSE", Some(("X", "4 LPA"))),
            student("B", "CSE", Some(("X", "10 LPA"))),
        ];
        assert_eq!(aggregate(&students, &[]).median_package, 4.0);
    }

    #[test]
    fn branches_are_sorted_and_blank_branch_is_grouped() {
        let stats = aggregate(&fixture(), &references());
        let names = stats
            .branch_wise_stats
            .iter()
            .map(|stats| stats.branch.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["CSE", "ECE", "Unspecified"]);

        let cse = &stats.branch_wise_stats[0];
        assert_eq!((cse.total, cse.placed), (4, 3));
        assert_eq!(cse.rate, 75.0);
        assert_eq!(cse.avg_package, 14.17);

        let ece = &stats.branch_wise_stats[1];
        assert_eq!(ece.rate, 50.0);
        assert_eq!(ece.avg_package, 0.0);
    }

    #[test]
    fn companies_group_case_insensitively_with_tiers() {
        let stats = aggregate(&fixture(), &references());
        let companies = &stats.company_wise_stats;

        assert_eq!(companies.len(), 3);
        assert_eq!(companies[0].company, "Infosys");
        assert_eq!(companies[0].hires, 2);
        assert_eq!(companies[0].tier, "Tier 2");
        assert_eq!(companies[0].avg_package, 5.25);

        let bosch = companies.iter().find(|stats| stats.company == "Bosch");
        assert_eq!(bosch.map(|stats| stats.tier.as_str()), Some("Unknown"));
    }

    #[test]
    fn distribution_buckets_are_half_open() {
        let students = ["3 LPA", "2.99 LPA", "25 LPA", "10 LPA"]
            .iter()
            .enumerate()
            .map(|(index, package)| student(&format!("S{index}"), "CSE", Some(("X", package))))
            .collect::<Vec<_>>();
        let counts = aggregate(&students, &[])
            .package_distribution
            .iter()
            .map(|bucket| bucket.count)
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![1, 1, 0, 1, 0, 1]);
    }
}
