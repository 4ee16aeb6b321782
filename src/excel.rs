use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use std::path::Path;

use crate::config::TitleBlock;
use crate::error::ReconResult;
use crate::models::{expected_headers, Column, SCHEMA_LEN};
use crate::services::grouping::{Statement, StatementLine, Totals};
use crate::types::CellValue;

pub const SHEET_NAME: &str = "Statement";
/// Rows 1-5 carry the title block, row 6 the column headers.
pub const TITLE_ROWS: u32 = 5;
pub const HEADER_ROW: u32 = TITLE_ROWS;
/// Column F holds the hotel name and the sheet title.
const TITLE_COLUMN: u16 = 5;
pub const TOTAL_LABEL: &str = "合计";

const FONT_NAME: &str = "微软雅黑";
const DARK_FILL: u32 = 0x1F497D;
const RETURN_FILL: u32 = 0xFFFF00;
const WIDTH_PADDING: f64 = 8.0;
const A4_PAPER: u8 = 9;

/// Replace every character other than alphanumerics, space and `.` with `_`,
/// then trim underscores from both ends.
pub fn sanitize_file_component(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    replaced.trim_matches('_').to_string()
}

/// `{year-month}_{supplier}_{tax-rate}.xlsx`, skipping empty parts.
pub fn statement_file_name(year_month: &str, supplier: &str, tax_rate: &str) -> String {
    let supplier = sanitize_file_component(supplier);
    let parts: Vec<&str> = [year_month, supplier.as_str(), tax_rate]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    format!("{}.xlsx", parts.join("_"))
}

/// Drop characters that are not valid in sheet XML (control chars except tab/newline/CR).
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            c == '\t' || c == '\n' || c == '\r' || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

/// Two decimals, never `-0.00`.
pub fn format_amount(n: f64) -> String {
    let s = format!("{:.2}", n);
    if s == "-0.00" {
        "0.00".to_string()
    } else {
        s
    }
}

struct StatementFormats {
    title: Format,
    header: Format,
    body: Format,
    returned: Format,
}

impl StatementFormats {
    fn new() -> Self {
        let centered = Format::new()
            .set_font_name(FONT_NAME)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter);
        let dark = centered
            .clone()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(DARK_FILL));
        Self {
            title: dark.clone().set_font_size(18.0),
            header: dark.set_font_size(10.0),
            body: centered.clone().set_font_size(11.0),
            returned: centered
                .set_font_size(11.0)
                .set_background_color(Color::RGB(RETURN_FILL)),
        }
    }
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    format: &Format,
) -> Result<(), XlsxError> {
    match value {
        CellValue::Empty => worksheet.write_blank(row, col, format).map(|_| ()),
        CellValue::Number(n) => worksheet.write_number_with_format(row, col, *n, format).map(|_| ()),
        CellValue::Bool(b) => worksheet.write_boolean_with_format(row, col, *b, format).map(|_| ()),
        other => worksheet
            .write_string_with_format(row, col, sanitize_cell(&other.display()), format)
            .map(|_| ()),
    }
}

fn totals_row(totals: &Totals) -> [CellValue; SCHEMA_LEN] {
    let mut cells: [CellValue; SCHEMA_LEN] = Default::default();
    cells[Column::UnitPrice.index()] = CellValue::text(TOTAL_LABEL);
    cells[Column::Subtotal.index()] = CellValue::Text(format_amount(totals.subtotal));
    cells[Column::Tax.index()] = CellValue::Text(format_amount(totals.tax));
    cells[Column::TotalWithTax.index()] = CellValue::Text(format_amount(totals.total));
    cells
}

/// Longest displayed value per column from the header row down, plus padding.
fn column_widths(lines: &[StatementLine], totals: &[CellValue; SCHEMA_LEN]) -> [f64; SCHEMA_LEN] {
    let mut widths = expected_headers().map(|h| h.chars().count());
    let rows = lines.iter().map(|l| &l.cells).chain(std::iter::once(totals));
    for cells in rows {
        for (width, cell) in widths.iter_mut().zip(cells.iter()) {
            *width = (*width).max(cell.display().chars().count());
        }
    }
    widths.map(|w| w as f64 + WIDTH_PADDING)
}

fn apply_page_setup(worksheet: &mut Worksheet) -> Result<(), XlsxError> {
    worksheet.set_paper_size(A4_PAPER);
    worksheet.set_portrait();
    worksheet.set_margins(0.2, 0.0, 0.25, 1.05, 0.0, 0.5);
    worksheet.set_print_center_horizontally(true);
    worksheet.set_print_center_vertically(true);
    worksheet.set_print_fit_to_pages(1, 0);
    worksheet.set_footer("&CPage &P of &N");
    worksheet.set_repeat_rows(0, HEADER_ROW)?;
    worksheet.set_freeze_panes(HEADER_ROW + 1, 0)?;
    Ok(())
}

/// Render one statement: title block, header row, lines (returns highlighted),
/// totals row. Overwrites any existing file at `path`.
pub fn write_statement(statement: &Statement, title: &TitleBlock, path: &Path) -> ReconResult<()> {
    let formats = StatementFormats::new();
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for row in 0..TITLE_ROWS {
        for col in 0..SCHEMA_LEN as u16 {
            worksheet.write_blank(row, col, &formats.title)?;
        }
    }
    worksheet.write_string_with_format(1, TITLE_COLUMN, sanitize_cell(&title.hotel_name), &formats.title)?;
    worksheet.write_string_with_format(2, TITLE_COLUMN, sanitize_cell(&title.sheet_title), &formats.title)?;

    for (col, header) in expected_headers().iter().enumerate() {
        worksheet.write_string_with_format(HEADER_ROW, col as u16, *header, &formats.header)?;
    }

    let mut row = HEADER_ROW + 1;
    for line in &statement.lines {
        let format = if line.is_return {
            &formats.returned
        } else {
            &formats.body
        };
        for (col, value) in line.cells.iter().enumerate() {
            write_cell(worksheet, row, col as u16, value, format)?;
        }
        row += 1;
    }

    let totals = totals_row(&statement.totals);
    for (col, value) in totals.iter().enumerate() {
        write_cell(worksheet, row, col as u16, value, &formats.header)?;
    }

    for (col, width) in column_widths(&statement.lines, &totals).iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
    }
    apply_page_setup(worksheet)?;

    workbook.save(path)?;
    tracing::debug!(path = %path.display(), lines = statement.lines.len(), "statement written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grouping::GroupKey;
    use calamine::{open_workbook_auto, Data, Reader};

    #[test]
    fn sanitizes_supplier_names() {
        assert_eq!(sanitize_file_component("ABC Foods"), "ABC Foods");
        assert_eq!(sanitize_file_component("海口/备用金:张三"), "海口_备用金_张三");
        assert_eq!(sanitize_file_component("__a*b.c__"), "a_b.c");
        assert_eq!(sanitize_file_component("/??/"), "");
    }

    #[test]
    fn sanitizing_twice_is_stable() {
        for raw in ["A/B", "__x__", "供应商(海南)有限公司", "a..b  c", "*"] {
            let once = sanitize_file_component(raw);
            assert_eq!(sanitize_file_component(&once), once);
        }
    }

    #[test]
    fn file_name_skips_empty_parts() {
        assert_eq!(
            statement_file_name("2025-01", "ABC Foods", "13%"),
            "2025-01_ABC Foods_13%.xlsx"
        );
        assert_eq!(statement_file_name("", "ABC", "9%"), "ABC_9%.xlsx");
        assert_eq!(statement_file_name("2025-01", "///", "0%"), "2025-01_0%.xlsx");
    }

    #[test]
    fn amounts_have_two_decimals() {
        assert_eq!(format_amount(100.0), "100.00");
        assert_eq!(format_amount(60.004999), "60.00");
        assert_eq!(format_amount(-50.0), "-50.00");
        assert_eq!(format_amount(-0.001), "0.00");
    }

    fn line(subtotal: f64, is_return: bool) -> StatementLine {
        let mut cells: [CellValue; SCHEMA_LEN] = Default::default();
        cells[Column::DeliveryDate.index()] = CellValue::text("2025-01-15");
        cells[Column::ItemName.index()] = CellValue::text("牛奶");
        cells[Column::Subtotal.index()] = CellValue::Number(subtotal);
        cells[Column::TaxRate.index()] = CellValue::text("13%");
        cells[Column::SupplierAccount.index()] = CellValue::text("ABC Foods");
        StatementLine { cells, is_return }
    }

    #[test]
    fn writes_layout_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let statement = Statement {
            key: GroupKey {
                supplier: "ABC Foods".into(),
                tax_rate: "13%".into(),
            },
            lines: vec![line(100.0, false), line(-50.0, true)],
            totals: Totals {
                subtotal: 50.0,
                tax: 6.5,
                total: 56.5,
            },
        };
        let title = TitleBlock {
            hotel_name: "海口索菲特大酒店".into(),
            sheet_title: "供货明细表".into(),
        };
        write_statement(&statement, &title, &path).unwrap();

        let mut wb = open_workbook_auto(&path).unwrap();
        assert_eq!(wb.sheet_names(), vec![SHEET_NAME.to_string()]);
        let range = wb.worksheet_range(SHEET_NAME).unwrap();
        assert_eq!(range.get_value((1, 5)), Some(&Data::String("海口索菲特大酒店".into())));
        assert_eq!(range.get_value((2, 5)), Some(&Data::String("供货明细表".into())));
        assert_eq!(range.get_value((5, 0)), Some(&Data::String("收货日期".into())));
        assert_eq!(range.get_value((5, 12)), Some(&Data::String("商品分类".into())));
        assert_eq!(range.get_value((6, 6)), Some(&Data::Float(100.0)));
        assert_eq!(range.get_value((7, 6)), Some(&Data::Float(-50.0)));
        assert_eq!(range.get_value((8, 5)), Some(&Data::String("合计".into())));
        assert_eq!(range.get_value((8, 6)), Some(&Data::String("50.00".into())));
        assert_eq!(range.get_value((8, 7)), Some(&Data::String("6.50".into())));
        assert_eq!(range.get_value((8, 8)), Some(&Data::String("56.50".into())));
    }

    #[test]
    fn widths_follow_longest_value() {
        let lines = vec![line(1234567.5, false)];
        let totals = totals_row(&Totals::default());
        let widths = column_widths(&lines, &totals);
        // "供应商/备用金报销账户" is 11 chars, longer than "ABC Foods".
        assert_eq!(widths[Column::SupplierAccount.index()], 19.0);
        assert_eq!(widths[Column::Subtotal.index()], 9.0 + WIDTH_PADDING);
        assert_eq!(widths[Column::DeliveryDate.index()], 10.0 + WIDTH_PADDING);
    }
}
