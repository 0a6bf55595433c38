use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{ExtractionError, is_header_sentinel};
use crate::markup::{nested_text_or_own, text_of};
use crate::models::AttendanceRecord;

pub const ENDPOINT: &str = "/vtop/processViewStudentAttendance";

const SL_NO: usize = 0;
const COURSE_DETAIL: usize = 2;
const ATTENDED: usize = 5;
const TOTAL: usize = 6;
const PERCENTAGE: usize = 7;
const DEBAR: usize = 8;
const MIN_CELLS: usize = DEBAR + 1;

static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#AttendanceDetailDataTable").expect("invalid attendance table selector"));
static ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody tr").expect("invalid row selector"));
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("invalid cell selector"));
static PERCENT_SPAN: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span span").expect("invalid percentage selector"));

pub fn parse(html: &str) -> Result<Vec<AttendanceRecord>, ExtractionError> {
    let doc = Html::parse_document(html);
    let table = doc
        .select(&TABLE)
        .next()
        .ok_or(ExtractionError::MarkupShapeChanged {
            endpoint: ENDPOINT,
            expected: "#AttendanceDetailDataTable",
        })?;

    let mut records = Vec::new();
    for row in table.select(&ROWS) {
        let cells: Vec<_> = row.select(&CELLS).collect();
        if cells.len() < MIN_CELLS {
            log::debug!("attendance: skipping row with {} cells", cells.len());
            continue;
        }

        let sl_no = text_of(cells[SL_NO]);
        if sl_no.is_empty() || is_header_sentinel(&sl_no) {
            continue;
        }

        let attended = class_count(cells[ATTENDED]);
        let total = class_count(cells[TOTAL]);
        if attended.is_none() || total.is_none() {
            log::debug!("attendance: row {sl_no} has no class counts yet");
        }

        records.push(AttendanceRecord {
            sl_no,
            course_detail: text_of(cells[COURSE_DETAIL]),
            attended_classes: attended,
            total_classes: total,
            attendance_percentage: nested_text_or_own(cells[PERCENTAGE], &PERCENT_SPAN),
            debar_status: text_of(cells[DEBAR]),
        });
    }

    Ok(records)
}

fn class_count(cell: ElementRef<'_>) -> Option<u32> {
    text_of(cell).parse().ok()
}
