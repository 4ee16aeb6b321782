//! Tax-rate normalization, supplier grouping and statement totals.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Column, ColumnMap, SCHEMA_LEN};
use crate::services::normalizer::NormalizedSheet;
use crate::types::{CellValue, NormalizedRow};

/// Normalize a tax-rate cell to a whole-number percent string such as `"13%"`.
/// Bare numbers below 1 are read as ratios (`0.13` -> `13%`); text ending in `%`
/// is already a percent. Anything unparseable is `"0%"`.
pub fn normalize_tax_rate(cell: &CellValue) -> String {
    let (parsed, is_percent) = match cell {
        CellValue::Number(n) => (Some(*n), false),
        CellValue::Text(s) => {
            let s = s.trim();
            let parsed = s.trim_end_matches('%').trim().parse::<f64>().ok();
            (parsed, s.ends_with('%'))
        }
        _ => (None, false),
    };
    match parsed.filter(|v| v.is_finite()) {
        Some(v) if v < 1.0 && !is_percent => format!("{}%", truncate_percent(v * 100.0)),
        Some(v) => format!("{}%", truncate_percent(v)),
        None => "0%".to_string(),
    }
}

// 0.29 * 100 is 28.999999999999996; nudge away from zero by 1e-9 before truncating.
fn truncate_percent(value: f64) -> i64 {
    (value + value.signum() * 1e-9).trunc() as i64
}

/// Rewrite every row's tax-rate cell to its normalized form.
pub fn apply_tax_rates(sheet: &mut NormalizedSheet) {
    for row in &mut sheet.rows {
        let rate = normalize_tax_rate(row.get(Column::TaxRate));
        row.set(Column::TaxRate, CellValue::Text(rate));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKey {
    pub supplier: String,
    pub tax_rate: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: GroupKey,
    pub rows: Vec<NormalizedRow>,
}

impl Group {
    /// Distinct `YYYY-MM` values in row order.
    pub fn months(&self) -> Vec<String> {
        let mut months: Vec<String> = Vec::new();
        for month in self.rows.iter().filter_map(NormalizedRow::year_month) {
            if !months.iter().any(|m| m == month) {
                months.push(month.to_string());
            }
        }
        months
    }

    /// Warning text when the group spans more than one month.
    pub fn cross_month_warning(&self) -> Option<String> {
        let months = self.months();
        (months.len() > 1).then(|| {
            format!(
                "供应商 {} 的收货日期包含跨月数据，请核查。包含的月份有：{}",
                self.key.supplier,
                months.join(", ")
            )
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub groups: Vec<Group>,
    pub warnings: Vec<String>,
}

/// Sort by delivery date (when the column exists) and partition by
/// (supplier account, tax rate). Groups come out ordered by key; rows keep
/// their sorted order. Rows without a supplier account are left out.
pub fn group_rows(sheet: &NormalizedSheet) -> Grouping {
    let mut warnings = Vec::new();
    let mut rows: Vec<&NormalizedRow> = sheet.rows.iter().collect();

    if sheet.columns.contains(Column::DeliveryDate) {
        // Undated rows sort last.
        rows.sort_by(|a, b| match (a.delivery_date(), b.delivery_date()) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    } else {
        warnings.push("文件中缺少排序所需的列，将不按顺序处理数据。".to_string());
    }

    let mut partitions: BTreeMap<GroupKey, Vec<NormalizedRow>> = BTreeMap::new();
    let mut unassigned = 0usize;
    for row in rows {
        let supplier = row.get(Column::SupplierAccount).display().trim().to_string();
        if supplier.is_empty() {
            unassigned += 1;
            continue;
        }
        let key = GroupKey {
            supplier,
            tax_rate: normalize_tax_rate(row.get(Column::TaxRate)),
        };
        partitions.entry(key).or_default().push(row.clone());
    }
    if unassigned > 0 {
        warnings.push(format!(
            "有 {} 行缺少供应商/备用金报销账户，未计入任何对账单。",
            unassigned
        ));
    }

    Grouping {
        groups: partitions
            .into_iter()
            .map(|(key, rows)| Group { key, rows })
            .collect(),
        warnings,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

impl Totals {
    fn add(mut self, column: Column, amount: f64) -> Self {
        match column {
            Column::Subtotal => self.subtotal += amount,
            Column::Tax => self.tax += amount,
            Column::TotalWithTax => self.total += amount,
            _ => {}
        }
        self
    }
}

/// One output line in statement column order.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementLine {
    pub cells: [CellValue; SCHEMA_LEN],
    pub is_return: bool,
}

impl StatementLine {
    pub fn get(&self, column: Column) -> &CellValue {
        &self.cells[column.index()]
    }
}

/// A group ready to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub key: GroupKey,
    pub lines: Vec<StatementLine>,
    pub totals: Totals,
}

const AMOUNT_COLUMNS: [Column; 3] = [Column::Subtotal, Column::Tax, Column::TotalWithTax];
const RETURNABLE_COLUMNS: [Column; 4] = [
    Column::Quantity,
    Column::Subtotal,
    Column::Tax,
    Column::TotalWithTax,
];

fn negate(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        -value
    }
}

fn return_line(row: &NormalizedRow, parent: &StatementLine, columns: &ColumnMap) -> StatementLine {
    let mut line = parent.clone();
    line.is_return = true;
    for target in RETURNABLE_COLUMNS {
        let Some(source) = target.return_source() else {
            continue;
        };
        if columns.contains(source) {
            let amount = row.get(source).as_f64().unwrap_or(0.0);
            line.cells[target.index()] = CellValue::Number(negate(amount));
        }
    }
    line
}

/// Expand a group into statement lines (a return line directly after each
/// returned row) and fold all amounts into the totals.
pub fn build_statement(group: &Group, columns: &ColumnMap) -> Statement {
    let (lines, totals) = group.rows.iter().fold(
        (Vec::with_capacity(group.rows.len()), Totals::default()),
        |(mut lines, totals), row| {
            let parent = StatementLine {
                cells: Column::SCHEMA.map(|c| row.get(c).clone()),
                is_return: false,
            };
            let mut totals = AMOUNT_COLUMNS.into_iter().fold(totals, |t, c| {
                match parent.get(c).as_f64() {
                    Some(amount) => t.add(c, amount),
                    None => t,
                }
            });
            let returned = row.is_return.then(|| return_line(row, &parent, columns));
            lines.push(parent);
            if let Some(line) = returned {
                totals = AMOUNT_COLUMNS
                    .into_iter()
                    .filter(|c| c.return_source().map_or(false, |s| columns.contains(s)))
                    .fold(totals, |t, c| t.add(c, line.get(c).as_f64().unwrap_or(0.0)));
                lines.push(line);
            }
            (lines, totals)
        },
    );
    Statement {
        key: group.key.clone(),
        lines,
        totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_columns() -> ColumnMap {
        let mut map = ColumnMap::default();
        for (pos, c) in Column::ALL.into_iter().enumerate() {
            map.set(c, pos);
        }
        map
    }

    fn row(supplier: &str, rate: CellValue, date: &str, amounts: (f64, f64, f64)) -> NormalizedRow {
        let mut r = NormalizedRow::default();
        r.set(Column::SupplierAccount, CellValue::text(supplier));
        r.set(Column::TaxRate, rate);
        if !date.is_empty() {
            r.set(Column::DeliveryDate, CellValue::text(date));
        }
        r.set(Column::Quantity, CellValue::Number(10.0));
        r.set(Column::Subtotal, CellValue::Number(amounts.0));
        r.set(Column::Tax, CellValue::Number(amounts.1));
        r.set(Column::TotalWithTax, CellValue::Number(amounts.2));
        r
    }

    fn sheet(rows: Vec<NormalizedRow>) -> NormalizedSheet {
        NormalizedSheet {
            columns: full_columns(),
            rows,
            unexpected_return_markers: Vec::new(),
        }
    }

    #[test]
    fn tax_rate_forms_agree() {
        assert_eq!(normalize_tax_rate(&CellValue::text("13%")), "13%");
        assert_eq!(normalize_tax_rate(&CellValue::Number(0.13)), "13%");
        assert_eq!(normalize_tax_rate(&CellValue::Number(13.0)), "13%");
        assert_eq!(normalize_tax_rate(&CellValue::text("0.09")), "9%");
        assert_eq!(normalize_tax_rate(&CellValue::Number(0.29)), "29%");
        assert_eq!(normalize_tax_rate(&CellValue::Number(6.5)), "6%");
        assert_eq!(normalize_tax_rate(&CellValue::Number(0.0)), "0%");
        assert_eq!(normalize_tax_rate(&CellValue::Number(-0.05)), "-5%");
        assert_eq!(normalize_tax_rate(&CellValue::text("12.9999999")), "12%");
        assert_eq!(normalize_tax_rate(&CellValue::text("0.5%")), "0%");
    }

    #[test]
    fn tax_rate_fallbacks() {
        assert_eq!(normalize_tax_rate(&CellValue::Empty), "0%");
        assert_eq!(normalize_tax_rate(&CellValue::text("免税")), "0%");
        assert_eq!(normalize_tax_rate(&CellValue::Bool(true)), "0%");
    }

    #[test]
    fn tax_rate_is_idempotent() {
        for raw in ["13%", "0.13", "9", "abc", "", "-0.05", "-5%", "0%"] {
            let once = normalize_tax_rate(&CellValue::text(raw));
            assert_eq!(normalize_tax_rate(&CellValue::text(once.clone())), once);
        }
    }

    #[test]
    fn group_key_matches_rewritten_tax_cell() {
        let mut s = sheet(vec![row(
            "ABC Foods",
            CellValue::Number(-0.05),
            "2025-01-02",
            (1.0, 0.0, 1.0),
        )]);
        apply_tax_rates(&mut s);
        assert_eq!(s.rows[0].get(Column::TaxRate), &CellValue::text("-5%"));
        let grouping = group_rows(&s);
        assert_eq!(grouping.groups[0].key.tax_rate, "-5%");
    }

    #[test]
    fn groups_by_supplier_and_rate_sorted_by_date() {
        let s = sheet(vec![
            row("ABC Foods", CellValue::Number(0.13), "2025-01-20", (1.0, 0.0, 1.0)),
            row("ABC Foods", CellValue::text("9%"), "2025-01-05", (2.0, 0.0, 2.0)),
            row("ABC Foods", CellValue::text("13%"), "2025-01-02", (3.0, 0.0, 3.0)),
            row("Bakery", CellValue::Empty, "", (4.0, 0.0, 4.0)),
        ]);
        let grouping = group_rows(&s);
        let keys: Vec<(&str, &str)> = grouping
            .groups
            .iter()
            .map(|g| (g.key.supplier.as_str(), g.key.tax_rate.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("ABC Foods", "13%"), ("ABC Foods", "9%"), ("Bakery", "0%")]
        );
        let dates: Vec<_> = grouping.groups[0]
            .rows
            .iter()
            .map(|r| r.delivery_date().unwrap_or_default())
            .collect();
        assert_eq!(dates, vec!["2025-01-02", "2025-01-20"]);
        assert!(grouping.warnings.is_empty());
    }

    #[test]
    fn rows_without_supplier_are_reported() {
        let s = sheet(vec![
            row("", CellValue::Number(13.0), "2025-01-02", (1.0, 0.0, 1.0)),
            row("ABC Foods", CellValue::Number(13.0), "2025-01-02", (1.0, 0.0, 1.0)),
        ]);
        let grouping = group_rows(&s);
        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.warnings.len(), 1);
    }

    #[test]
    fn missing_date_column_groups_unsorted_with_warning() {
        let mut s = sheet(vec![
            row("A", CellValue::Number(13.0), "", (1.0, 0.0, 1.0)),
            row("A", CellValue::Number(13.0), "", (2.0, 0.0, 2.0)),
        ]);
        let mut columns = ColumnMap::default();
        for (pos, c) in Column::ALL.into_iter().enumerate().skip(1) {
            columns.set(c, pos);
        }
        s.columns = columns;
        let grouping = group_rows(&s);
        assert_eq!(grouping.groups[0].rows[0].get(Column::Subtotal), &CellValue::Number(1.0));
        assert_eq!(grouping.warnings.len(), 1);
    }

    #[test]
    fn cross_month_is_flagged_not_blocked() {
        let s = sheet(vec![
            row("ABC Foods", CellValue::Number(13.0), "2025-02-03", (1.0, 0.0, 1.0)),
            row("ABC Foods", CellValue::Number(13.0), "2025-01-15", (1.0, 0.0, 1.0)),
        ]);
        let group = &group_rows(&s).groups[0];
        assert_eq!(group.months(), vec!["2025-01", "2025-02"]);
        let warning = group.cross_month_warning().unwrap();
        assert!(warning.contains("ABC Foods"));
        assert!(warning.contains("2025-01, 2025-02"));
    }

    #[test]
    fn single_month_has_no_warning() {
        let s = sheet(vec![row("A", CellValue::Number(13.0), "2025-01-15", (1.0, 0.0, 1.0))]);
        assert_eq!(group_rows(&s).groups[0].cross_month_warning(), None);
    }

    #[test]
    fn plain_rows_sum_into_totals() {
        let s = sheet(vec![
            row("ABC Foods", CellValue::Number(0.13), "2025-01-15", (100.0, 13.0, 113.0)),
        ]);
        let g = &group_rows(&s).groups[0];
        assert_eq!(g.key.tax_rate, "13%");
        let statement = build_statement(g, &s.columns);
        assert_eq!(statement.lines.len(), 1);
        assert_eq!(
            statement.totals,
            Totals {
                subtotal: 100.0,
                tax: 13.0,
                total: 113.0
            }
        );
    }

    #[test]
    fn returned_row_gets_negated_line_after_parent() {
        let mut returned = row("ABC Foods", CellValue::Number(13.0), "2025-01-15", (100.0, 13.0, 113.0));
        returned.is_return = true;
        returned.set(Column::ReturnQuantity, CellValue::Number(5.0));
        returned.set(Column::ReturnSubtotal, CellValue::Number(50.0));
        returned.set(Column::ReturnTax, CellValue::text("6.5"));
        returned.set(Column::ReturnTotal, CellValue::Number(56.5));
        let other = row("ABC Foods", CellValue::Number(13.0), "2025-01-16", (10.0, 1.3, 11.3));
        let s = sheet(vec![returned, other]);
        let g = &group_rows(&s).groups[0];
        let statement = build_statement(g, &s.columns);

        let flags: Vec<bool> = statement.lines.iter().map(|l| l.is_return).collect();
        assert_eq!(flags, vec![false, true, false]);
        let ret = &statement.lines[1];
        assert_eq!(ret.get(Column::Quantity), &CellValue::Number(-5.0));
        assert_eq!(ret.get(Column::Subtotal), &CellValue::Number(-50.0));
        assert_eq!(ret.get(Column::Tax), &CellValue::Number(-6.5));
        assert_eq!(ret.get(Column::SupplierAccount), &CellValue::text("ABC Foods"));
        assert!((statement.totals.subtotal - 60.0).abs() < 1e-9);
        assert!((statement.totals.tax - 7.8).abs() < 1e-9);
        assert!((statement.totals.total - 67.8).abs() < 1e-9);
    }

    #[test]
    fn return_columns_absent_from_source_keep_parent_values() {
        let mut returned = row("A", CellValue::Number(13.0), "2025-01-15", (100.0, 13.0, 113.0));
        returned.is_return = true;
        let mut columns = ColumnMap::default();
        for c in Column::ALL.into_iter().filter(|c| *c != Column::ReturnTax) {
            columns.set(c, c.index());
        }
        returned.set(Column::ReturnSubtotal, CellValue::Number(100.0));
        let group = Group {
            key: GroupKey {
                supplier: "A".into(),
                tax_rate: "13%".into(),
            },
            rows: vec![returned],
        };
        let statement = build_statement(&group, &columns);
        let ret = &statement.lines[1];
        assert_eq!(ret.get(Column::Tax), &CellValue::Number(13.0));
        assert_eq!(ret.get(Column::Subtotal), &CellValue::Number(-100.0));
        assert_eq!(ret.get(Column::TotalWithTax), &CellValue::Number(0.0));
        assert_eq!(statement.totals.subtotal, 0.0);
        assert_eq!(statement.totals.tax, 13.0);
        assert_eq!(statement.totals.total, 113.0);
    }

    #[test]
    fn non_numeric_amounts_are_skipped() {
        let mut r = row("A", CellValue::Number(13.0), "2025-01-15", (1.0, 1.0, 1.0));
        r.set(Column::Subtotal, CellValue::text("待定"));
        let s = sheet(vec![r]);
        let statement = build_statement(&group_rows(&s).groups[0], &s.columns);
        assert_eq!(statement.totals.subtotal, 0.0);
        assert_eq!(statement.totals.tax, 1.0);
    }
}
