use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::ExtractionError;
use crate::markup::{nested_text_or_own, text_of};
use crate::models::{ExamRecord, ExamSchedule, ExamType};

pub const MENU_ENDPOINT: &str = "/vtop/examinations/StudExamSchedule";
pub const ENDPOINT: &str = "/vtop/examinations/doSearchExamScheduleForStudent";

const MIN_CELLS: usize = 13;
const GROUP_HEADER_CLASS: &str = "panelHead-secondary";
const MISSING: &str = "-";

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("invalid table selector"));
static ROWS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody tr.tableContent").expect("invalid row selector"));
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("invalid cell selector"));
static SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span").expect("invalid span selector"));

pub fn parse(html: &str) -> Result<ExamSchedule, ExtractionError> {
    let doc = Html::parse_document(html);
    if doc.select(&TABLE).next().is_none() {
        return Err(ExtractionError::MarkupShapeChanged {
            endpoint: ENDPOINT,
            expected: "exam schedule table",
        });
    }

    let mut schedule = ExamSchedule::default();
    for exam in [ExamType::Fat, ExamType::Cat2, ExamType::Cat1] {
        schedule.groups.insert(exam, Vec::new());
    }

    // `None` until a header names a group; `Some(None)` for groups we don't keep.
    let mut current: Option<Option<ExamType>> = None;
    for row in doc.select(&ROWS) {
        let cells: Vec<_> = row.select(&CELLS).collect();

        if let [only] = cells.as_slice()
            && only.value().classes().any(|class| class == GROUP_HEADER_CLASS)
        {
            let label = text_of(*only);
            let exam = ExamType::from_label(&label);
            if exam.is_none() {
                log::debug!("exams: ignoring group '{label}'");
            }
            current = Some(exam);
            continue;
        }

        if cells.len() < MIN_CELLS {
            continue;
        }
        let Some(group) = current else {
            continue;
        };

        let record = exam_record(&cells);
        if record.sl_no.is_empty() || record.course_code.is_empty() {
            continue;
        }
        if let Some(exam) = group {
            schedule.groups.entry(exam).or_default().push(record);
        }
    }

    Ok(schedule)
}

fn exam_record(cells: &[ElementRef<'_>]) -> ExamRecord {
    let cell = |idx: usize| text_of(cells[idx]);
    let seat = |idx: usize| {
        let value = nested_text_or_own(cells[idx], &SPAN);
        if value.is_empty() {
            MISSING.to_string()
        } else {
            value
        }
    };

    ExamRecord {
        sl_no: cell(0),
        course_code: cell(1),
        course_title: cell(2),
        course_type: cell(3),
        class_id: cell(4),
        slot: cell(5),
        exam_date: cell(6),
        exam_session: cell(7),
        reporting_time: cell(8),
        exam_time: cell(9),
        venue: seat(10),
        seat_location: seat(11),
        seat_no: seat(12),
    }
}
