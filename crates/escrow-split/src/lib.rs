//! # escrow-split — Percentage Fund Splits
//!
//! Converts a total amount and a percentage table into per-recipient integer
//! amounts. All arithmetic is integer-exact: percentages are converted to
//! basis points (hundredths of a percent) once, then each share is
//! `floor(total × basis_points / 10_000)` over a `u128` intermediate.
//!
//! Flooring can leave a truncation residual of at most one smallest unit per
//! recipient. The residual is never silently dropped: [`allocate`] reports
//! it explicitly, and [`allocate_with_policy`] assigns it to a recipient
//! chosen by an explicit [`ResidualPolicy`] so the allocated sum equals the
//! total exactly.
//!
//! ## Security Invariant
//!
//! For every valid recipient set: `sum(amounts) ≤ total` and
//! `total − sum(amounts) ≤ recipients.len()` smallest units. With a residual
//! policy applied, `sum(amounts) == total` exactly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_core::{Address, Amount};

/// Basis points in one hundred percent.
pub const FULL_BASIS_POINTS: u32 = 10_000;

/// Tolerance on the percentage sum, in basis points (0.01%).
pub const SUM_TOLERANCE_BASIS_POINTS: u32 = 1;

/// A payout recipient: an address and its share of the total.
///
/// The percentage has two-decimal resolution; anything finer is rounded to
/// the nearest basis point at conversion time. The derived amount is
/// recomputed at execution time and is not authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    /// Destination address for this share.
    pub address: Address,
    /// Share of the total, in percent (0 < p ≤ 100, two-decimal resolution).
    pub percentage: f64,
}

impl Recipient {
    /// Construct a recipient entry.
    pub fn new(address: Address, percentage: f64) -> Self {
        Self {
            address,
            percentage,
        }
    }
}

/// Limits applied by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Maximum number of recipients in one split table.
    pub max_recipients: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { max_recipients: 20 }
    }
}

/// A single validation violation found in a recipient table.
///
/// [`validate`] reports every violation it finds, not just the first, so a
/// caller can surface them all in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplitViolation {
    /// The recipient table is empty.
    NoRecipients,
    /// The recipient table exceeds the configured maximum.
    TooManyRecipients {
        /// Number of entries given.
        count: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A percentage is outside (0, 100] or rounds to zero basis points.
    PercentageOutOfRange {
        /// The recipient's address.
        address: Address,
        /// The offending percentage.
        percentage: f64,
    },
    /// Two entries share an address (case-insensitive).
    DuplicateAddress {
        /// The duplicated address (first occurrence's spelling).
        address: Address,
    },
    /// The percentages do not sum to 100 within tolerance.
    SumMismatch {
        /// The actual sum, in basis points (100% = 10,000).
        sum_basis_points: u64,
    },
}

impl std::fmt::Display for SplitViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRecipients => write!(f, "recipient table is empty"),
            Self::TooManyRecipients { count, max } => {
                write!(f, "{count} recipients exceeds the maximum of {max}")
            }
            Self::PercentageOutOfRange {
                address,
                percentage,
            } => write!(f, "percentage {percentage} for {address} outside (0, 100]"),
            Self::DuplicateAddress { address } => {
                write!(f, "duplicate address {address} (case-insensitive)")
            }
            Self::SumMismatch { sum_basis_points } => write!(
                f,
                "percentages sum to {sum_basis_points} basis points, expected {FULL_BASIS_POINTS}"
            ),
        }
    }
}

/// Validation failure for a recipient table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    /// One or more violations were found. All are listed.
    #[error("invalid recipient table: {}", format_violations(violations))]
    Invalid {
        /// Every violation found, in discovery order.
        violations: Vec<SplitViolation>,
    },
}

fn format_violations(violations: &[SplitViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convert a percentage to basis points, rounding to the nearest.
///
/// `33.33% → 3333`. Two-decimal resolution is exact; finer input rounds.
pub fn basis_points(percentage: f64) -> u32 {
    if !percentage.is_finite() || percentage <= 0.0 {
        return 0;
    }
    (percentage * 100.0).round() as u32
}

/// Validate a recipient table against the configured limits.
///
/// Checks, in order: non-empty, count ≤ max, each percentage in (0, 100]
/// and at least one basis point, no case-insensitive duplicate addresses,
/// and a sum of 100% within 0.01% tolerance.
///
/// # Errors
///
/// Returns [`SplitError::Invalid`] listing *all* violations found.
pub fn validate(recipients: &[Recipient], config: &SplitConfig) -> Result<(), SplitError> {
    let mut violations = Vec::new();

    if recipients.is_empty() {
        violations.push(SplitViolation::NoRecipients);
    }
    if recipients.len() > config.max_recipients {
        violations.push(SplitViolation::TooManyRecipients {
            count: recipients.len(),
            max: config.max_recipients,
        });
    }

    let mut seen: Vec<String> = Vec::with_capacity(recipients.len());
    let mut sum_bp: u64 = 0;
    for r in recipients {
        let in_range = r.percentage.is_finite() && r.percentage > 0.0 && r.percentage <= 100.0;
        let bp = basis_points(r.percentage);
        if !in_range || bp == 0 {
            violations.push(SplitViolation::PercentageOutOfRange {
                address: r.address.clone(),
                percentage: r.percentage,
            });
        } else {
            sum_bp += u64::from(bp);
        }

        let norm = r.address.normalized();
        if seen.contains(&norm) {
            violations.push(SplitViolation::DuplicateAddress {
                address: r.address.clone(),
            });
        } else {
            seen.push(norm);
        }
    }

    // Only meaningful when every individual percentage was in range.
    let all_in_range = !violations
        .iter()
        .any(|v| matches!(v, SplitViolation::PercentageOutOfRange { .. }));
    if !recipients.is_empty() && all_in_range {
        let diff = sum_bp.abs_diff(u64::from(FULL_BASIS_POINTS));
        if diff > u64::from(SUM_TOLERANCE_BASIS_POINTS) {
            violations.push(SplitViolation::SumMismatch {
                sum_basis_points: sum_bp,
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SplitError::Invalid { violations })
    }
}

/// One recipient's computed share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitEntry {
    /// Destination address for this share.
    pub address: Address,
    /// The share in basis points, as converted from the input percentage.
    pub basis_points: u32,
    /// The floored integer amount, smallest currency unit.
    pub amount: Amount,
}

/// The result of allocating a total across a recipient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitAllocation {
    /// Per-recipient shares, in input order.
    pub entries: Vec<SplitEntry>,
    /// Truncation residual: `total − sum(entries)`. Zero when a
    /// [`ResidualPolicy`] has been applied.
    pub residual: Amount,
}

impl SplitAllocation {
    /// The sum of the allocated entry amounts.
    pub fn allocated(&self) -> Amount {
        Amount::new(self.entries.iter().map(|e| e.amount.value()).sum())
    }
}

/// Where the truncation residual goes.
///
/// Flooring never defines its own destination for the leftover smallest
/// units; the policy is an explicit caller decision and is recorded with
/// the engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResidualPolicy {
    /// Assign the residual to the first recipient in table order.
    #[default]
    AssignToFirst,
    /// Assign the residual to the recipient with the largest share
    /// (first such entry on ties).
    AssignToLargest,
}

/// Allocate `total` across `recipients` by flooring basis-point shares.
///
/// `amount_i = floor(total × basis_points_i / 10_000)` with a `u128`
/// intermediate, so no overflow is possible for any `u64` total. The sum of
/// the entries may fall short of `total` by at most one smallest unit per
/// recipient; the shortfall is reported in
/// [`residual`](SplitAllocation::residual).
///
/// The recipient table is assumed to have passed [`validate`].
pub fn allocate(total: Amount, recipients: &[Recipient]) -> SplitAllocation {
    let mut entries = Vec::with_capacity(recipients.len());
    let mut allocated: u64 = 0;
    for r in recipients {
        let bp = basis_points(r.percentage);
        let amount =
            (u128::from(total.value()) * u128::from(bp) / u128::from(FULL_BASIS_POINTS)) as u64;
        allocated += amount;
        entries.push(SplitEntry {
            address: r.address.clone(),
            basis_points: bp,
            amount: Amount::new(amount),
        });
    }
    SplitAllocation {
        entries,
        residual: Amount::new(total.value().saturating_sub(allocated)),
    }
}

/// Allocate and then fold the residual into one entry per `policy`.
///
/// The returned allocation always sums to `total` exactly and carries a
/// zero residual.
pub fn allocate_with_policy(
    total: Amount,
    recipients: &[Recipient],
    policy: ResidualPolicy,
) -> SplitAllocation {
    let mut allocation = allocate(total, recipients);
    apply_residual(&mut allocation, policy);
    allocation
}

/// Allocate `total` across bare percentages (no addresses), with the
/// residual folded in per `policy`.
///
/// Used for deriving milestone amounts from a milestone plan, where the
/// shares have no payout address of their own.
pub fn allocate_portions(total: Amount, percentages: &[f64], policy: ResidualPolicy) -> Vec<Amount> {
    let mut amounts = Vec::with_capacity(percentages.len());
    let mut bps = Vec::with_capacity(percentages.len());
    let mut allocated: u64 = 0;
    for p in percentages {
        let bp = basis_points(*p);
        let amount =
            (u128::from(total.value()) * u128::from(bp) / u128::from(FULL_BASIS_POINTS)) as u64;
        allocated += amount;
        amounts.push(amount);
        bps.push(bp);
    }
    let residual = total.value().saturating_sub(allocated);
    if residual > 0 && !amounts.is_empty() {
        let idx = match policy {
            ResidualPolicy::AssignToFirst => 0,
            ResidualPolicy::AssignToLargest => largest_index(&bps),
        };
        amounts[idx] += residual;
    }
    amounts.into_iter().map(Amount::new).collect()
}

fn apply_residual(allocation: &mut SplitAllocation, policy: ResidualPolicy) {
    let residual = allocation.residual.value();
    if residual == 0 || allocation.entries.is_empty() {
        return;
    }
    let idx = match policy {
        ResidualPolicy::AssignToFirst => 0,
        ResidualPolicy::AssignToLargest => {
            let bps: Vec<u32> = allocation.entries.iter().map(|e| e.basis_points).collect();
            largest_index(&bps)
        }
    };
    let entry = &mut allocation.entries[idx];
    entry.amount = Amount::new(entry.amount.value() + residual);
    allocation.residual = Amount::ZERO;
}

fn largest_index(bps: &[u32]) -> usize {
    let mut best = 0;
    for (i, bp) in bps.iter().enumerate() {
        if *bp > bps[best] {
            best = i;
        }
    }
    best
}
