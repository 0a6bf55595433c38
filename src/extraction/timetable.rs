//! Weekly timetable grid.
//!
//! The grid mixes header rows (slot start/end times), per-day theory rows
//! and lab rows in one table. A lab row often shares the day cell of the
//! theory row above it through `rowspan`, in which case its first cell is
//! the `LAB` label rather than a day code.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::ExtractionError;
use crate::markup::text_of;
use crate::models::{DaySchedule, SlotEntry, Timetable, Weekday};

pub const REGISTRATION_ENDPOINT: &str = "/vtop/academics/common/CourseRegistration";
pub const MENU_ENDPOINT: &str = "/vtop/academics/common/StudentTimeTable";
pub const ENDPOINT: &str = "/vtop/processViewTimeTable";

/// Background the portal paints on cells holding a registered course.
const COURSE_BGCOLOR: &str = "#FC6C85";
const MIN_COURSE_PARTS: usize = 4;
const DEFAULT_SECTION: &str = "ALL";

static ROWS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#timeTableStyle tbody tr").expect("invalid timetable selector"));
static CONTAINER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#timeTableStyle").expect("invalid timetable selector"));
static ALL_ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody tr").expect("invalid row selector"));
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("invalid cell selector"));
static COURSE_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z0-9]+L?)\s*-\s*(.+)").expect("invalid course cell regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    Theory,
    Lab,
}

pub fn parse(html: &str) -> Result<Timetable, ExtractionError> {
    let doc = Html::parse_document(html);
    if doc.select(&CONTAINER).next().is_none() {
        return Err(ExtractionError::MarkupShapeChanged {
            endpoint: ENDPOINT,
            expected: "#timeTableStyle",
        });
    }

    let mut days: BTreeMap<Weekday, DaySchedule> = Weekday::ALL
        .into_iter()
        .map(|day| (day, DaySchedule::default()))
        .collect();
    let mut current: Option<Weekday> = None;

    for row in doc.select(&ROWS) {
        let cells: Vec<_> = row.select(&CELLS).collect();
        let Some(first) = cells.first().map(|c| text_of(*c)) else {
            continue;
        };
        let second = cells.get(1).map(|c| text_of(*c)).unwrap_or_default();

        let (day, track, schedule) = if let Some(day) = Weekday::from_code(&first) {
            let track = if second.contains("THEORY") {
                Track::Theory
            } else {
                Track::Lab
            };
            (day, track, cells.get(2..).unwrap_or_default())
        } else if is_track_label(&first) && !is_time_label(&second) {
            // Continuation row under a merged day cell.
            let Some(day) = current else {
                continue;
            };
            let track = if first.contains("THEORY") {
                Track::Theory
            } else {
                Track::Lab
            };
            (day, track, &cells[1..])
        } else {
            continue;
        };

        current = Some(day);
        let entries: Vec<SlotEntry> = schedule.iter().map(|cell| classify_cell(*cell)).collect();
        if let Some(slot) = days.get_mut(&day) {
            match track {
                Track::Theory => slot.theory = entries,
                Track::Lab => slot.lab = entries,
            }
        }
    }

    Ok(Timetable {
        days,
        course_names: BTreeMap::new(),
    })
}

fn is_track_label(text: &str) -> bool {
    text.contains("THEORY") || text.contains("LAB")
}

fn is_time_label(text: &str) -> bool {
    text.contains("Start") || text.contains("End")
}

fn classify_cell(cell: ElementRef<'_>) -> SlotEntry {
    let bgcolor = cell.value().attr("bgcolor");
    classify(&text_of(cell), bgcolor)
}

/// Tag one schedule cell by its text and background colour.
pub fn classify(content: &str, bgcolor: Option<&str>) -> SlotEntry {
    let content = content.trim();
    if content.is_empty() || content == "-" || content.eq_ignore_ascii_case("Lunch") {
        return SlotEntry::Empty;
    }

    let highlighted = bgcolor.is_some_and(|c| c.trim().eq_ignore_ascii_case(COURSE_BGCOLOR));
    if !highlighted && !content.contains('-') {
        return SlotEntry::Slot {
            content: content.to_string(),
        };
    }

    let parts: Vec<&str> = content.split('-').map(str::trim).collect();
    if parts.len() < MIN_COURSE_PARTS {
        return SlotEntry::Other {
            content: content.to_string(),
        };
    }

    SlotEntry::Course {
        slot_code: parts[0].to_string(),
        course_code: parts[1].to_string(),
        course_type: parts[2].to_string(),
        venue: parts[3].to_string(),
        section: parts
            .get(4)
            .filter(|s| !s.is_empty())
            .unwrap_or(&DEFAULT_SECTION)
            .to_string(),
    }
}

/// Course code to title from the registration view, e.g.
/// `BCSE306L - Artificial Intelligence (Theory Only)`.
pub fn parse_course_names(html: &str) -> BTreeMap<String, String> {
    let doc = Html::parse_document(html);
    let mut names = BTreeMap::new();

    for row in doc.select(&ALL_ROWS) {
        let Some(cell) = row.select(&CELLS).nth(2) else {
            continue;
        };
        let text = text_of(cell);
        let Some(caps) = COURSE_CELL.captures(&text) else {
            continue;
        };
        let title = caps[2].split('(').next().unwrap_or_default().trim();
        if !title.is_empty() {
            names.insert(caps[1].to_string(), title.to_string());
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: &str = r##"<table id="timeTableStyle"><tbody>
        <tr><td rowspan="2">THEORY</td><td>Start</td><td>08:00</td><td>09:00</td><td>10:00</td></tr>
        <tr><td>End</td><td>08:50</td><td>09:50</td><td>10:50</td></tr>
        <tr><td rowspan="2">LAB</td><td>Start</td><td>08:00</td><td>08:51</td><td>09:51</td></tr>
        <tr><td>End</td><td>08:50</td><td>09:40</td><td>10:40</td></tr>
        <tr><td rowspan="2">MON</td><td>THEORY</td>
            <td bgcolor="#FC6C85">A1-BCSE406L-TH-SJT508-ALL</td><td>F1</td><td>Lunch</td></tr>
        <tr><td>LAB</td><td>L1</td><td bgcolor="#FC6C85">L2-BCSE406P-LO-SJT318</td><td>-</td></tr>
        <tr><td>TUE</td><td>THEORY</td><td>B1</td><td>C1-X</td><td></td></tr>
    </tbody></table>"##;

    #[test]
    fn classifies_course_cell() {
        assert_eq!(
            classify("A1-BCSE406L-TH-SJT508-ALL", None),
            SlotEntry::Course {
                slot_code: "A1".into(),
                course_code: "BCSE406L".into(),
                course_type: "TH".into(),
                venue: "SJT508".into(),
                section: "ALL".into(),
            }
        );
    }

    #[test]
    fn classifies_remaining_tags() {
        assert_eq!(classify("Lunch", None), SlotEntry::Empty);
        assert_eq!(classify(" - ", None), SlotEntry::Empty);
        assert_eq!(classify("", Some(COURSE_BGCOLOR)), SlotEntry::Empty);
        assert_eq!(classify("L25", None), SlotEntry::Slot { content: "L25".into() });
        assert_eq!(classify("C1-X", None), SlotEntry::Other { content: "C1-X".into() });
        assert_eq!(
            classify("TA1", Some("#fc6c85")),
            SlotEntry::Other { content: "TA1".into() }
        );
    }

    #[test]
    fn parses_days_and_merged_lab_rows() {
        let table = parse(GRID).unwrap();
        assert_eq!(table.days.len(), 7);

        let mon = table.day(Weekday::Mon).unwrap();
        assert_eq!(mon.theory.len(), 3);
        assert!(matches!(&mon.theory[0], SlotEntry::Course { course_code, .. } if course_code == "BCSE406L"));
        assert_eq!(mon.theory[2], SlotEntry::Empty);

        assert_eq!(mon.lab.len(), 3);
        assert_eq!(mon.lab[0], SlotEntry::Slot { content: "L1".into() });
        assert!(matches!(
            &mon.lab[1],
            SlotEntry::Course { section, venue, .. } if section == "ALL" && venue == "SJT318"
        ));

        let tue = table.day(Weekday::Tue).unwrap();
        assert_eq!(tue.theory[1], SlotEntry::Other { content: "C1-X".into() });
        assert!(tue.lab.is_empty());
        assert!(table.day(Weekday::Sun).unwrap().theory.is_empty());
    }

    #[test]
    fn missing_grid_is_a_shape_change() {
        assert!(matches!(
            parse("<div>No timetable</div>"),
            Err(ExtractionError::MarkupShapeChanged { endpoint: ENDPOINT, .. })
        ));
    }

    #[test]
    fn reads_course_names_from_registration() {
        let html = r#"<table><tbody>
            <tr><td>1</td><td>CH01</td><td>BCSE306L - Artificial Intelligence (Theory Only)</td></tr>
            <tr><td>2</td><td>CH02</td><td>BCSE306P - AI Lab ( Embedded Lab )</td></tr>
            <tr><td>Total</td><td>Credits</td></tr>
        </tbody></table>"#;
        let names = parse_course_names(html);
        assert_eq!(names.get("BCSE306L").map(String::as_str), Some("Artificial Intelligence"));
        assert_eq!(names.get("BCSE306P").map(String::as_str), Some("AI Lab"));
        assert_eq!(names.len(), 2);
    }
}
