//! Digital assignments: a subject list plus one detail table per subject.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::{ExtractionError, is_header_sentinel};
use crate::markup::{nested_text_or_own, text_of};
use crate::models::{AssignmentEntry, AssignmentFetch, AssignmentSubject};

pub const SUBJECTS_ENDPOINT: &str = "/vtop/examinations/doDigitalAssignment";
pub const DETAIL_ENDPOINT: &str = "/vtop/examinations/processDigitalAssignment";

const SUBJECT_MIN_CELLS: usize = 4;
const DETAIL_MIN_CELLS: usize = 5;
const DUE_DATE: usize = 4;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("invalid table selector"));
static CONTENT_ROWS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody tr.tableContent").expect("invalid row selector"));
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("invalid cell selector"));
static CUSTOM_TABLES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.customTable").expect("invalid custom table selector"));
static SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span").expect("invalid span selector"));

/// Subjects with digital assignments. Rows need both a serial and a class number.
pub fn parse_subjects(html: &str) -> Result<Vec<AssignmentSubject>, ExtractionError> {
    let doc = Html::parse_document(html);
    if doc.select(&TABLE).next().is_none() {
        return Err(ExtractionError::MarkupShapeChanged {
            endpoint: SUBJECTS_ENDPOINT,
            expected: "subject table",
        });
    }

    let subjects = doc
        .select(&CONTENT_ROWS)
        .filter_map(|row| {
            let cells: Vec<_> = row.select(&CELLS).collect();
            if cells.len() < SUBJECT_MIN_CELLS {
                return None;
            }
            let cell = |idx: usize| text_of(cells[idx]);
            let sl_no = cell(0);
            let class_nbr = cell(1);
            if sl_no.is_empty() || class_nbr.is_empty() || is_header_sentinel(&sl_no) {
                return None;
            }
            Some(AssignmentSubject {
                sl_no,
                class_nbr,
                course_code: cell(2),
                course_title: cell(3),
                assignments: Vec::new(),
                fetch: AssignmentFetch::Complete,
            })
        })
        .collect();

    Ok(subjects)
}

/// Assignment rows for one subject. The first `customTable` describes the
/// course; the second one lists assignments and is absent when none exist.
pub fn parse_detail(html: &str) -> Result<Vec<AssignmentEntry>, ExtractionError> {
    let doc = Html::parse_document(html);
    let mut tables = doc.select(&CUSTOM_TABLES);
    if tables.next().is_none() {
        return Err(ExtractionError::MarkupShapeChanged {
            endpoint: DETAIL_ENDPOINT,
            expected: "table.customTable",
        });
    }
    let Some(listing) = tables.next() else {
        return Ok(Vec::new());
    };

    let entries = listing
        .select(&CONTENT_ROWS)
        .filter_map(|row| {
            let cells: Vec<_> = row.select(&CELLS).collect();
            if cells.len() < DETAIL_MIN_CELLS {
                return None;
            }
            let sl_no = text_of(cells[0]);
            if sl_no.is_empty() || is_header_sentinel(&sl_no) {
                return None;
            }
            Some(AssignmentEntry {
                sl_no,
                title: text_of(cells[1]),
                due_date: nested_text_or_own(cells[DUE_DATE], &SPAN),
            })
        })
        .collect();

    Ok(entries)
}
