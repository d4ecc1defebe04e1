//! Column sort for directory listings

use app_proto::FileStat;
use std::cmp::Ordering;

/// Sortable listing columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Name,
    Created,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Tri-state sort over a single column at a time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortState {
    active: Option<(SortColumn, SortOrder)>,
}

impl SortState {
    pub fn active(&self) -> Option<(SortColumn, SortOrder)> {
        self.active
    }

    /// Advance the column through ascending, descending and cleared
    pub fn click(&mut self, column: SortColumn) -> Option<(SortColumn, SortOrder)> {
        self.active = match self.active {
            Some((c, SortOrder::Ascending)) if c == column => Some((column, SortOrder::Descending)),
            Some((c, SortOrder::Descending)) if c == column => None,
            _ => Some((column, SortOrder::Ascending)),
        };
        self.active
    }

    /// Sorted copy of `listing`; server order when no column is active
    pub fn apply(&self, listing: &[FileStat]) -> Vec<FileStat> {
        let mut sorted = listing.to_vec();
        if let Some((column, order)) = self.active {
            // Stable, so ties keep server order in both directions
            sorted.sort_by(|a, b| {
                let cmp = compare(column, a, b);
                match order {
                    SortOrder::Ascending => cmp,
                    SortOrder::Descending => cmp.reverse(),
                }
            });
        }
        sorted
    }
}

fn compare(column: SortColumn, a: &FileStat, b: &FileStat) -> Ordering {
    match column {
        SortColumn::Name => natural_sort_key(&a.name).cmp(&natural_sort_key(&b.name)),
        SortColumn::Created => a.created.cmp(&b.created),
        SortColumn::Size => a.size.cmp(&b.size),
    }
}

/// Generate a natural sort key (handles numbers correctly)
/// "image2.jpg" < "image10.jpg"
fn natural_sort_key(s: &str) -> Vec<NaturalSortPart> {
    let mut parts = Vec::new();
    let mut current_num = String::new();
    let mut current_str = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            if !current_str.is_empty() {
                parts.push(NaturalSortPart::Str(std::mem::take(&mut current_str).to_lowercase()));
            }
            current_num.push(c);
        } else {
            if !current_num.is_empty() {
                parts.push(NaturalSortPart::number(&std::mem::take(&mut current_num)));
            }
            current_str.push(c);
        }
    }

    if !current_num.is_empty() {
        parts.push(NaturalSortPart::number(&current_num));
    }
    if !current_str.is_empty() {
        parts.push(NaturalSortPart::Str(current_str.to_lowercase()));
    }

    parts
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalSortPart {
    Num(u64),
    Str(String),
}

impl NaturalSortPart {
    // Digit runs too long for u64 fall back to text comparison
    fn number(digits: &str) -> Self {
        digits
            .parse::<u64>()
            .map(NaturalSortPart::Num)
            .unwrap_or_else(|_| NaturalSortPart::Str(digits.to_string()))
    }
}
