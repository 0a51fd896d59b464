//! Rendering of the by-class ranking.

use crate::analyzer::ClassRanking;
use log::info;

/// Print one line per class, smallest retained total first so the heaviest
/// classes land at the bottom of the output.
pub fn dump_inclusive_ranking(rows: &[ClassRanking]) {
    for row in rows {
        info!("{}", format_ranking_line(row));
    }
}

pub fn format_ranking_line(row: &ClassRanking) -> String {
    format!(
        "shallowSize={:>11} retainedSize={:>11}(count={:>11})= {}",
        group_thousands(row.total_shallow),
        group_thousands(row.total_retained),
        group_thousands(row.instance_count as u64),
        row.class_name
    )
}

/// Digits grouped in threes, default locale style.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (at, digit) in digits.bytes().enumerate() {
        if at > 0 && (digits.len() - at) % 3 == 0 {
            out.push(',');
        }
        out.push(digit as char);
    }

    out
}
