use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{ExtractionError, is_header_sentinel};
use crate::markup::text_of;
use crate::models::{MarkEntry, MarksRecord};

pub const ENDPOINT: &str = "/vtop/examinations/doStudentMarkView";

const SL_NO: usize = 0;
const COURSE_CODE: usize = 2;
const COURSE_TITLE: usize = 3;
const FACULTY: usize = 6;
const SLOT: usize = 7;
const MIN_CELLS: usize = SLOT + 1;

// Positions of `<output>` values inside an assessment row.
const MARK_TITLE: usize = 1;
const MARK_MAX: usize = 2;
const MARK_PERCENT: usize = 3;
const MARK_SCORED: usize = 5;
const MARK_WEIGHTAGE: usize = 6;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("invalid table selector"));
static ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody tr").expect("invalid row selector"));
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("invalid cell selector"));
static NESTED: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".customTable-level1").expect("invalid nested table selector"));
static NESTED_ROWS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".customTable-level1 tbody tr.tableContent-level1")
        .expect("invalid assessment row selector")
});
static OUTPUTS: Lazy<Selector> = Lazy::new(|| Selector::parse("output").expect("invalid output selector"));

pub fn parse(html: &str) -> Result<Vec<MarksRecord>, ExtractionError> {
    let doc = Html::parse_document(html);
    if doc.select(&TABLE).next().is_none() {
        return Err(ExtractionError::MarkupShapeChanged {
            endpoint: ENDPOINT,
            expected: "marks table",
        });
    }

    let rows: Vec<ElementRef<'_>> = doc.select(&ROWS).collect();
    let mut courses = Vec::new();
    let mut i = 0;
    while i < rows.len() {
        let row = rows[i];
        i += 1;

        if !row.value().classes().any(|class| class == "tableContent")
            || row.select(&NESTED).next().is_some()
        {
            continue;
        }

        let cells: Vec<_> = row.select(&CELLS).collect();
        if cells.len() < MIN_CELLS {
            log::debug!("marks: skipping row with {} cells", cells.len());
            continue;
        }
        let cell = |idx: usize| text_of(cells[idx]);
        let sl_no = cell(SL_NO);
        if sl_no.is_empty() || is_header_sentinel(&sl_no) {
            continue;
        }

        let mut record = MarksRecord {
            sl_no,
            course_code: cell(COURSE_CODE),
            course_title: cell(COURSE_TITLE),
            faculty: cell(FACULTY),
            slot: cell(SLOT),
            marks: Vec::new(),
        };

        // The assessment sub-table rides in the row right after its course.
        if let Some(next) = rows.get(i)
            && next.select(&NESTED).next().is_some()
        {
            record.marks = next.select(&NESTED_ROWS).map(mark_entry).collect();
            i += 1;
        }

        courses.push(record);
    }

    Ok(courses)
}

fn mark_entry(row: ElementRef<'_>) -> MarkEntry {
    let outputs: Vec<_> = row.select(&OUTPUTS).collect();
    let value = |idx: usize| outputs.get(idx).map(|o| text_of(*o)).unwrap_or_default();
    MarkEntry {
        title: value(MARK_TITLE),
        scored: value(MARK_SCORED),
        max: value(MARK_MAX),
        weightage: value(MARK_WEIGHTAGE),
        percent: value(MARK_PERCENT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course_row(sl_no: &str, code: &str) -> String {
        format!(
            "<tr class=\"tableContent\"><td>{sl_no}</td><td>CH2025</td><td>{code}</td>\
             <td>Compiler Design</td><td>Theory</td><td>ETH</td><td>Dr. Iyer</td><td>C1</td></tr>"
        )
    }

    fn assessment(title: &str, max: &str, scored: &str) -> String {
        format!(
            "<tr class=\"tableContent-level1\"><td><output>1</output></td><td><output>{title}</output></td>\
             <td><output>{max}</output></td><td><output>15</output></td><td><output>Present</output></td>\
             <td><output>{scored}</output></td><td><output>12.5</output></td></tr>"
        )
    }

    fn sub_table(rows: &[String]) -> String {
        format!(
            "<tr class=\"tableContent\"><td colspan=\"8\"><table class=\"customTable-level1\"><tbody>\
             <tr class=\"tableHeader-level1\"><td>Sl.No.</td><td>Mark Title</td></tr>{}\
             </tbody></table></td></tr>",
            rows.concat()
        )
    }

    #[test]
    fn couples_course_rows_with_following_sub_table() {
        let html = format!(
            "<table><tbody>\
             <tr class=\"tableHeader\"><td>Sl.No.</td><td>Class Nbr</td><td>Course Code</td></tr>\
             {}{}{}\
             </tbody></table>",
            course_row("1", "BCSE307L"),
            sub_table(&[assessment("CAT-1", "50", "41"), assessment("Quiz", "10", "9")]),
            course_row("2", "BCSE308L"),
        );

        let courses = parse(&html).unwrap();
        assert_eq!(courses.len(), 2);

        assert_eq!(courses[0].course_code, "BCSE307L");
        assert_eq!(courses[0].faculty, "Dr. Iyer");
        assert_eq!(courses[0].slot, "C1");
        assert_eq!(courses[0].marks.len(), 2);
        assert_eq!(
            courses[0].marks[0],
            MarkEntry {
                title: "CAT-1".into(),
                scored: "41".into(),
                max: "50".into(),
                weightage: "12.5".into(),
                percent: "15".into(),
            }
        );

        assert_eq!(courses[1].course_code, "BCSE308L");
        assert!(courses[1].marks.is_empty());
    }

    #[test]
    fn short_course_rows_are_skipped() {
        let html = format!(
            "<table><tbody><tr class=\"tableContent\"><td>1</td><td>CH</td></tr>{}</tbody></table>",
            course_row("2", "BMAT201L"),
        );
        let courses = parse(&html).unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].sl_no, "2");
        assert_eq!(courses[0].course_code, "BMAT201L");
    }

    #[test]
    fn missing_outputs_become_empty_strings() {
        let html = format!(
            "<table><tbody>{}{}</tbody></table>",
            course_row("1", "BMAT201L"),
            sub_table(&["<tr class=\"tableContent-level1\"><td><output>1</output></td><td><output>Lab</output></td></tr>".to_string()]),
        );
        let courses = parse(&html).unwrap();
        assert_eq!(courses[0].marks.len(), 1);
        assert_eq!(courses[0].marks[0].title, "Lab");
        assert_eq!(courses[0].marks[0].scored, "");
    }
}
