//! Normalised record types produced by extraction.
//!
//! All records are plain values built fresh per fetch. They serialise with
//! camelCase field names so they can be handed to a JSON consumer as is.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub sl_no: String,
    pub course_detail: String,
    /// `None` when the portal prints no count yet (usually `-`).
    pub attended_classes: Option<u32>,
    pub total_classes: Option<u32>,
    pub attendance_percentage: String,
    pub debar_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEntry {
    pub title: String,
    pub scored: String,
    pub max: String,
    pub weightage: String,
    pub percent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksRecord {
    pub sl_no: String,
    pub course_code: String,
    pub course_title: String,
    pub faculty: String,
    pub slot: String,
    /// Empty when no assessment has been published yet.
    pub marks: Vec<MarkEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEntry {
    pub sl_no: String,
    pub title: String,
    pub due_date: String,
}

/// How a subject's assignment list was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AssignmentFetch {
    Complete,
    /// Detail request failed; `assignments` is empty because of it.
    Partial { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSubject {
    pub sl_no: String,
    pub class_nbr: String,
    pub course_code: String,
    pub course_title: String,
    pub assignments: Vec<AssignmentEntry>,
    pub fetch: AssignmentFetch,
}

impl AssignmentSubject {
    pub fn is_partial(&self) -> bool {
        matches!(self.fetch, AssignmentFetch::Partial { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Weekday::Mon => "MON",
            Weekday::Tue => "TUE",
            Weekday::Wed => "WED",
            Weekday::Thu => "THU",
            Weekday::Fri => "FRI",
            Weekday::Sat => "SAT",
            Weekday::Sun => "SUN",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|day| day.code().eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One timetable cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SlotEntry {
    Empty,
    #[serde(rename_all = "camelCase")]
    Course {
        slot_code: String,
        course_code: String,
        course_type: String,
        venue: String,
        section: String,
    },
    Slot { content: String },
    Other { content: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaySchedule {
    pub theory: Vec<SlotEntry>,
    pub lab: Vec<SlotEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timetable {
    pub days: BTreeMap<Weekday, DaySchedule>,
    /// Course code to title, from the registration view.
    pub course_names: BTreeMap<String, String>,
}

impl Timetable {
    pub fn day(&self, day: Weekday) -> Option<&DaySchedule> {
        self.days.get(&day)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ExamType {
    #[serde(rename = "FAT")]
    Fat,
    #[serde(rename = "CAT2")]
    Cat2,
    #[serde(rename = "CAT1")]
    Cat1,
}

impl ExamType {
    pub fn label(self) -> &'static str {
        match self {
            ExamType::Fat => "FAT",
            ExamType::Cat2 => "CAT2",
            ExamType::Cat1 => "CAT1",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "FAT" => Some(ExamType::Fat),
            "CAT2" => Some(ExamType::Cat2),
            "CAT1" => Some(ExamType::Cat1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRecord {
    pub sl_no: String,
    pub course_code: String,
    pub course_title: String,
    pub course_type: String,
    pub class_id: String,
    pub slot: String,
    pub exam_date: String,
    pub exam_session: String,
    pub reporting_time: String,
    pub exam_time: String,
    pub venue: String,
    pub seat_location: String,
    pub seat_no: String,
}

/// Exams grouped by category, in portal order within each group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExamSchedule {
    pub groups: BTreeMap<ExamType, Vec<ExamRecord>>,
}

impl ExamSchedule {
    pub fn group(&self, exam: ExamType) -> &[ExamRecord] {
        self.groups.get(&exam).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryScore {
    /// Selected CGPA figure; `None` when the fragment has too few figures.
    pub cgpa: Option<String>,
    /// Every numeric figure in the fragment, in order.
    pub figures: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoginHistory {
    pub entries: Vec<String>,
}
