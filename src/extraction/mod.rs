//! Authenticated extraction of portal records.
//!
//! Each record type is fetched by POSTing a freshly signed form to one or
//! more fixed endpoints through the session's page context, then reducing
//! the returned fragment with a pure parser from the submodules below.
//! Extraction never retries; transport failures and unexpected markup are
//! reported to the caller as [`ExtractionError`].

pub mod assignments;
pub mod attendance;
pub mod exams;
pub mod history;
pub mod marks;
pub mod payload;
pub mod summary;
pub mod timetable;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::auth::{RequestSignature, SignerError};
use crate::config::DEFAULT_SEMESTER_ID;
use crate::context::{PageContext, PageError};
use crate::models::{
    AssignmentEntry, AssignmentFetch, AssignmentSubject, AttendanceRecord, ExamSchedule,
    LoginHistory, MarksRecord, SummaryScore, Timetable,
};
use payload::{Payload, portal_timestamp};

/// Literal the portal puts in the serial column of header rows.
const HEADER_SENTINEL: &str = "Sl.No.";

pub(crate) fn is_header_sentinel(text: &str) -> bool {
    let text = text.trim();
    text.eq_ignore_ascii_case(HEADER_SENTINEL) || text.eq_ignore_ascii_case("Sl.No")
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("anti-forgery token missing from the current page")]
    AuthTokenMissing,
    #[error("request to {endpoint} failed: {source}")]
    EndpointUnreachable {
        endpoint: &'static str,
        #[source]
        source: PageError,
    },
    #[error("{endpoint} no longer renders {expected}")]
    MarkupShapeChanged {
        endpoint: &'static str,
        expected: &'static str,
    },
}

impl From<SignerError> for ExtractionError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::AuthTokenMissing => ExtractionError::AuthTokenMissing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    Summary,
    Attendance,
    Marks,
    Assignments,
    Timetable,
    ExamSchedule,
    LoginHistory,
}

impl RecordType {
    pub const ALL: [RecordType; 7] = [
        RecordType::Summary,
        RecordType::Attendance,
        RecordType::Marks,
        RecordType::Assignments,
        RecordType::Timetable,
        RecordType::ExamSchedule,
        RecordType::LoginHistory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Summary => "summary",
            RecordType::Attendance => "attendance",
            RecordType::Marks => "marks",
            RecordType::Assignments => "assignments",
            RecordType::Timetable => "timetable",
            RecordType::ExamSchedule => "exam_schedule",
            RecordType::LoginHistory => "login_history",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown record type '{0}'")]
pub struct UnknownRecordType(pub String);

impl FromStr for RecordType {
    type Err = UnknownRecordType;

    /// Accepts plain names as well as router intents such as `getAttendance`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let name = normalised.strip_prefix("get").unwrap_or(&normalised);

        match name {
            "summary" | "cgpa" | "credits" => Ok(RecordType::Summary),
            "attendance" => Ok(RecordType::Attendance),
            "marks" | "markview" => Ok(RecordType::Marks),
            "assignments" | "digitalassignments" | "da" => Ok(RecordType::Assignments),
            "timetable" | "schedule" => Ok(RecordType::Timetable),
            "exams" | "examschedule" => Ok(RecordType::ExamSchedule),
            "loginhistory" | "history" => Ok(RecordType::LoginHistory),
            _ => Err(UnknownRecordType(s.to_string())),
        }
    }
}

/// Per-call extraction parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchParams {
    /// Semester to query; the pipeline default applies when unset.
    pub semester_id: Option<String>,
}

impl FetchParams {
    pub fn semester(id: impl Into<String>) -> Self {
        Self {
            semester_id: Some(id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "recordType", content = "data", rename_all = "camelCase")]
pub enum Record {
    Summary(SummaryScore),
    Attendance(Vec<AttendanceRecord>),
    Marks(Vec<MarksRecord>),
    Assignments(Vec<AssignmentSubject>),
    Timetable(Timetable),
    ExamSchedule(ExamSchedule),
    LoginHistory(LoginHistory),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Summary(_) => RecordType::Summary,
            Record::Attendance(_) => RecordType::Attendance,
            Record::Marks(_) => RecordType::Marks,
            Record::Assignments(_) => RecordType::Assignments,
            Record::Timetable(_) => RecordType::Timetable,
            Record::ExamSchedule(_) => RecordType::ExamSchedule,
            Record::LoginHistory(_) => RecordType::LoginHistory,
        }
    }
}

/// Dispatches record requests to the matching endpoint sequence and parser.
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    default_semester: String,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_SEMESTER_ID)
    }
}

impl ExtractionPipeline {
    pub fn new(default_semester: impl Into<String>) -> Self {
        Self {
            default_semester: default_semester.into(),
        }
    }

    pub fn default_semester(&self) -> &str {
        &self.default_semester
    }

    pub async fn fetch(
        &self,
        page: &mut dyn PageContext,
        record_type: RecordType,
        params: &FetchParams,
    ) -> Result<Record, ExtractionError> {
        let semester = params
            .semester_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(&self.default_semester);
        log::debug!("fetching {record_type} for semester {semester}");

        let record = match record_type {
            RecordType::Summary => Record::Summary(self.summary(page).await?),
            RecordType::Attendance => Record::Attendance(self.attendance(page, semester).await?),
            RecordType::Marks => Record::Marks(self.marks(page, semester).await?),
            RecordType::Assignments => {
                Record::Assignments(self.assignments(page, semester).await?)
            }
            RecordType::Timetable => Record::Timetable(self.timetable(page, semester).await?),
            RecordType::ExamSchedule => {
                Record::ExamSchedule(self.exam_schedule(page, semester).await?)
            }
            RecordType::LoginHistory => Record::LoginHistory(self.login_history(page).await?),
        };
        Ok(record)
    }

    pub async fn summary(&self, page: &mut dyn PageContext) -> Result<SummaryScore, ExtractionError> {
        let sig = sign(page)?;
        let body = Payload::new().authorized_id(&sig).csrf(&sig).timestamp();
        let html = post(page, summary::ENDPOINT, body).await?;
        summary::parse(&html)
    }

    pub async fn attendance(
        &self,
        page: &mut dyn PageContext,
        semester: &str,
    ) -> Result<Vec<AttendanceRecord>, ExtractionError> {
        let sig = sign(page)?;
        let body = Payload::new()
            .csrf(&sig)
            .semester(semester)
            .authorized_id(&sig)
            .timestamp();
        let html = post(page, attendance::ENDPOINT, body).await?;
        attendance::parse(&html)
    }

    pub async fn marks(
        &self,
        page: &mut dyn PageContext,
        semester: &str,
    ) -> Result<Vec<MarksRecord>, ExtractionError> {
        let sig = sign(page)?;
        let body = Payload::new()
            .csrf(&sig)
            .semester(semester)
            .authorized_id(&sig)
            .timestamp();
        let html = post(page, marks::ENDPOINT, body).await?;
        marks::parse(&html)
    }

    /// Subject list plus one detail request per subject, strictly in order.
    /// A failed detail request marks that subject partial and moves on.
    pub async fn assignments(
        &self,
        page: &mut dyn PageContext,
        semester: &str,
    ) -> Result<Vec<AssignmentSubject>, ExtractionError> {
        let sig = sign(page)?;
        let body = Payload::new()
            .authorized_id(&sig)
            .timestamp()
            .semester(semester)
            .csrf(&sig);
        let html = post(page, assignments::SUBJECTS_ENDPOINT, body).await?;
        let mut subjects = assignments::parse_subjects(&html)?;

        for subject in &mut subjects {
            match self.assignment_detail(page, &subject.class_nbr).await {
                Ok(entries) => subject.assignments = entries,
                Err(err) => {
                    log::warn!(
                        "assignments for {} ({}) unavailable: {err}",
                        subject.course_code,
                        subject.class_nbr
                    );
                    subject.assignments.clear();
                    subject.fetch = AssignmentFetch::Partial {
                        reason: err.to_string(),
                    };
                }
            }
        }

        Ok(subjects)
    }

    async fn assignment_detail(
        &self,
        page: &mut dyn PageContext,
        class_nbr: &str,
    ) -> Result<Vec<AssignmentEntry>, ExtractionError> {
        let sig = sign(page)?;
        let body = Payload::new()
            .csrf(&sig)
            .field("classId", class_nbr)
            .authorized_id(&sig)
            .timestamp();
        let html = post(page, assignments::DETAIL_ENDPOINT, body).await?;
        assignments::parse_detail(&html)
    }

    pub async fn timetable(
        &self,
        page: &mut dyn PageContext,
        semester: &str,
    ) -> Result<Timetable, ExtractionError> {
        let course_names = match self.course_names(page, semester).await {
            Ok(names) => names,
            Err(err) => {
                log::warn!("course names unavailable, timetable will carry codes only: {err}");
                BTreeMap::new()
            }
        };

        let sig = sign(page)?;
        let menu = Payload::new()
            .verify_menu()
            .authorized_id(&sig)
            .csrf(&sig);
        post(page, timetable::MENU_ENDPOINT, menu).await?;

        let sig = sign(page)?;
        let body = Payload::new()
            .csrf(&sig)
            .semester(semester)
            .authorized_id(&sig);
        let html = post(page, timetable::ENDPOINT, body).await?;

        let mut table = timetable::parse(&html)?;
        table.course_names = course_names;
        Ok(table)
    }

    async fn course_names(
        &self,
        page: &mut dyn PageContext,
        semester: &str,
    ) -> Result<BTreeMap<String, String>, ExtractionError> {
        let sig = sign(page)?;
        let body = Payload::new()
            .verify_menu()
            .authorized_id(&sig)
            .csrf(&sig)
            .semester(semester);
        let html = post(page, timetable::REGISTRATION_ENDPOINT, body).await?;
        Ok(timetable::parse_course_names(&html))
    }

    pub async fn exam_schedule(
        &self,
        page: &mut dyn PageContext,
        semester: &str,
    ) -> Result<ExamSchedule, ExtractionError> {
        let sig = sign(page)?;
        let menu = Payload::new()
            .verify_menu()
            .authorized_id(&sig)
            .csrf(&sig)
            .field("nocache", portal_timestamp(chrono::Utc::now()));
        post(page, exams::MENU_ENDPOINT, menu).await?;

        let sig = sign(page)?;
        let body = Payload::new()
            .authorized_id(&sig)
            .csrf(&sig)
            .semester(semester);
        let html = post(page, exams::ENDPOINT, body).await?;
        exams::parse(&html)
    }

    pub async fn login_history(
        &self,
        page: &mut dyn PageContext,
    ) -> Result<LoginHistory, ExtractionError> {
        let sig = sign(page)?;
        let body = Payload::new().csrf(&sig).authorized_id(&sig).timestamp();
        let html = post(page, history::ENDPOINT, body).await?;
        Ok(history::parse(&html))
    }
}

fn sign(page: &dyn PageContext) -> Result<RequestSignature, ExtractionError> {
    Ok(RequestSignature::derive(page)?)
}

async fn post(
    page: &mut dyn PageContext,
    endpoint: &'static str,
    body: Payload,
) -> Result<String, ExtractionError> {
    page.post_form(endpoint, &body.into_fields())
        .await
        .map_err(|source| ExtractionError::EndpointUnreachable { endpoint, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{DASHBOARD, FakePage};

    const SUBJECTS: &str = r#"<table><tbody>
        <tr class="tableContent"><td>1</td><td>CH01</td><td>BCSE306L</td><td>Artificial Intelligence</td></tr>
        <tr class="tableContent"><td>2</td><td>CH02</td><td>BCSE307L</td><td>Compiler Design</td></tr>
    </tbody></table>"#;

    const DETAIL_TWO: &str = r#"
        <table class="customTable"><tbody></tbody></table>
        <table class="customTable"><tbody>
          <tr class="tableContent"><td>1</td><td>DA 1</td><td>10</td><td>10</td><td><span>01-Sep-2025</span></td></tr>
          <tr class="tableContent"><td>2</td><td>DA 2</td><td>10</td><td>10</td><td><span>01-Oct-2025</span></td></tr>
        </tbody></table>"#;

    #[test]
    fn record_type_accepts_intent_names() {
        assert_eq!("getAttendance".parse(), Ok(RecordType::Attendance));
        assert_eq!("getcgpa".parse(), Ok(RecordType::Summary));
        assert_eq!(" exam_schedule ".parse(), Ok(RecordType::ExamSchedule));
        assert_eq!("getTimetable".parse(), Ok(RecordType::Timetable));
        assert_eq!("login-history".parse(), Ok(RecordType::LoginHistory));
        assert_eq!(
            "general".parse::<RecordType>(),
            Err(UnknownRecordType("general".into()))
        );
        for kind in RecordType::ALL {
            assert_eq!(kind.as_str().parse(), Ok(kind));
        }
    }

    #[tokio::test]
    async fn isolates_failing_assignment_subject() {
        let mut page = FakePage::showing(DASHBOARD)
            .route(assignments::SUBJECTS_ENDPOINT, Ok(SUBJECTS))
            .route_when(assignments::DETAIL_ENDPOINT, ("classId", "CH01"), Ok(DETAIL_TWO))
            .route_when(assignments::DETAIL_ENDPOINT, ("classId", "CH02"), Err(503));

        let pipeline = ExtractionPipeline::default();
        let record = pipeline
            .fetch(&mut page, RecordType::Assignments, &FetchParams::default())
            .await
            .unwrap();

        let Record::Assignments(subjects) = record else {
            panic!("expected assignments");
        };
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].assignments.len(), 2);
        assert_eq!(subjects[0].fetch, AssignmentFetch::Complete);
        assert!(subjects[1].assignments.is_empty());
        assert!(subjects[1].is_partial());

        // detail requests run one after another, in subject order
        let paths: Vec<_> = page.posts.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(
            paths,
            [
                assignments::SUBJECTS_ENDPOINT,
                assignments::DETAIL_ENDPOINT,
                assignments::DETAIL_ENDPOINT
            ]
        );
    }

    #[tokio::test]
    async fn signs_every_request_with_semester_override() {
        let mut page = FakePage::showing(DASHBOARD).route(
            attendance::ENDPOINT,
            Ok(r#"<table id="AttendanceDetailDataTable"><tbody></tbody></table>"#),
        );

        let pipeline = ExtractionPipeline::default();
        pipeline
            .fetch(
                &mut page,
                RecordType::Attendance,
                &FetchParams::semester("VL20242505"),
            )
            .await
            .unwrap();

        let (_, fields) = &page.posts[0];
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("_csrf"), Some("dash-token"));
        assert_eq!(get("authorizedID"), Some("21BCE1234"));
        assert_eq!(get("semesterSubId"), Some("VL20242505"));
        assert!(get("x").is_some());
    }

    #[tokio::test]
    async fn transport_failure_is_endpoint_unreachable() {
        let mut page = FakePage::showing(DASHBOARD).route(marks::ENDPOINT, Err(500));
        let err = ExtractionPipeline::default()
            .fetch(&mut page, RecordType::Marks, &FetchParams::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::EndpointUnreachable { endpoint: marks::ENDPOINT, .. }
        ));
    }

    #[tokio::test]
    async fn missing_token_stops_before_any_request() {
        let mut page = FakePage::showing("<html><body>21BCE1234</body></html>");
        let err = ExtractionPipeline::default()
            .fetch(&mut page, RecordType::Summary, &FetchParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::AuthTokenMissing));
        assert!(page.posts.is_empty());
    }

    #[tokio::test]
    async fn timetable_verifies_menu_and_tolerates_missing_names() {
        let grid = r##"<table id="timeTableStyle"><tbody>
            <tr><td>MON</td><td>THEORY</td><td bgcolor="#FC6C85">A1-BCSE306L-TH-SJT508-ALL</td></tr>
        </tbody></table>"##;
        let mut page = FakePage::showing(DASHBOARD)
            .route(timetable::REGISTRATION_ENDPOINT, Err(502))
            .route(timetable::MENU_ENDPOINT, Ok("<div>menu</div>"))
            .route(timetable::ENDPOINT, Ok(grid));

        let Record::Timetable(table) = ExtractionPipeline::default()
            .fetch(&mut page, RecordType::Timetable, &FetchParams::default())
            .await
            .unwrap()
        else {
            panic!("expected timetable");
        };

        assert!(table.course_names.is_empty());
        assert_eq!(table.day(crate::models::Weekday::Mon).unwrap().theory.len(), 1);
        let menu_fields = &page.posts[1].1;
        assert!(menu_fields.contains(&("verifyMenu".to_string(), "true".to_string())));
    }

    #[tokio::test]
    async fn exam_schedule_sends_nocache_menu_request() {
        let mut page = FakePage::showing(DASHBOARD)
            .route(exams::MENU_ENDPOINT, Ok("<div>menu</div>"))
            .route(exams::ENDPOINT, Ok("<table><tbody></tbody></table>"));

        let record = ExtractionPipeline::default()
            .fetch(&mut page, RecordType::ExamSchedule, &FetchParams::default())
            .await
            .unwrap();

        assert_eq!(record.record_type(), RecordType::ExamSchedule);
        assert_eq!(page.posts[0].0, exams::MENU_ENDPOINT);
        assert!(page.posts[0].1.iter().any(|(k, _)| k == "nocache"));
        let semester = page.posts[1]
            .1
            .iter()
            .find(|(k, _)| k == "semesterSubId")
            .map(|(_, v)| v.as_str());
        assert_eq!(semester, Some(DEFAULT_SEMESTER_ID));
    }
}
