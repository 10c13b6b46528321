use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::resp::problem::Problem;

pub mod db;

use db::problem;

pub const ATTENDANCE_COLLECTION_NAME: &str = "attendances";
pub const NOTIFICATION_COLLECTION_NAME: &str = "notifications";

pub const NOTIFICATION_TITLE: &str = "attendance";
pub const NOTIFICATION_MESSAGE: &str = "attendance submited successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceKind {
    Present,
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendance {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub teacher: ObjectId,
    pub classes: ObjectId,
    pub student: ObjectId,
    #[serde(rename = "type")]
    pub kind: AttendanceKind,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Denormalized per-student log row mirroring an Attendance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub teacher: ObjectId,
    pub classes: ObjectId,
    pub student: ObjectId,
    #[serde(rename = "type")]
    pub kind: AttendanceKind,
    pub title: String,
    pub message: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttendanceEntry {
    pub student_id: String,
    pub att_type: AttendanceKind,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttendanceSubmission {
    pub teacher_id: String,
    pub class_id: String,
    pub attlist: Vec<AttendanceEntry>,
}

/// A submission with all ids parsed.
#[derive(Debug, Clone)]
pub struct ValidSubmission {
    pub teacher: ObjectId,
    pub class: ObjectId,
    pub entries: Vec<(ObjectId, AttendanceKind)>,
}

impl AttendanceSubmission {
    pub fn validate(&self) -> Result<ValidSubmission, Problem> {
        let teacher = ObjectId::parse_str(&self.teacher_id)
            .map_err(|_| problem::bad_field("teacher_id", "Not a valid teacher id."))?;
        let class = ObjectId::parse_str(&self.class_id)
            .map_err(|_| problem::bad_field("class_id", "Not a valid class id."))?;

        if self.attlist.is_empty() {
            return Err(problem::bad_field(
                "attlist",
                "Attendance list can't be empty.",
            ));
        }

        let mut entries = Vec::with_capacity(self.attlist.len());
        for entry in &self.attlist {
            let student = ObjectId::parse_str(&entry.student_id)
                .map_err(|_| problem::bad_field("attlist", "Not a valid student id."))?;
            entries.push((student, entry.att_type));
        }

        Ok(ValidSubmission {
            teacher,
            class,
            entries,
        })
    }
}

impl ValidSubmission {
    /// Builds one Attendance and one mirrored Notification record per entry,
    /// all stamped with the same creation time.
    pub fn build_batch(&self, now: DateTime<Utc>) -> (Vec<Attendance>, Vec<Notification>) {
        let mut attendance = Vec::with_capacity(self.entries.len());
        let mut notifications = Vec::with_capacity(self.entries.len());

        for (student, kind) in &self.entries {
            attendance.push(Attendance {
                id: None,
                teacher: self.teacher,
                classes: self.class,
                student: *student,
                kind: *kind,
                created_at: now,
            });
            notifications.push(Notification {
                id: None,
                teacher: self.teacher,
                classes: self.class,
                student: *student,
                kind: *kind,
                title: NOTIFICATION_TITLE.to_string(),
                message: NOTIFICATION_MESSAGE.to_string(),
                created_at: now,
            });
        }

        (attendance, notifications)
    }
}

/// Bounds of the UTC calendar day containing `now`: midnight to
/// 23:59:59.999.
pub fn utc_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = now.date_naive();
    let start = day
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    let end = day
        .and_hms_milli_opt(23, 59, 59, 999)
        .expect("23:59:59.999 is a valid time")
        .and_utc();
    (start, end)
}

/// Filter for the attendance listing; the first present key wins, in the
/// order teacher, class, student.
pub fn listing_filter(
    teacher_id: Option<&str>,
    class_id: Option<&str>,
    student_id: Option<&str>,
) -> Result<Document, Problem> {
    if let Some(raw) = teacher_id {
        let id = ObjectId::parse_str(raw)
            .map_err(|_| problem::bad_field("teacher_id", "Not a valid teacher id."))?;
        return Ok(doc! { "teacher": id });
    }
    if let Some(raw) = class_id {
        let id = ObjectId::parse_str(raw)
            .map_err(|_| problem::bad_field("class_id", "Not a valid class id."))?;
        return Ok(doc! { "classes": id });
    }
    if let Some(raw) = student_id {
        let id = ObjectId::parse_str(raw)
            .map_err(|_| problem::bad_field("student_id", "Not a valid student id."))?;
        return Ok(doc! { "student": id });
    }
    Err(problem::bad_field(
        "teacher_id",
        "Expected a teacher_id, class_id or student_id.",
    ))
}

///////////////////////
//       TESTS
///////////////////////


#[cfg(test)]
mod batch_construction {
    use super::{
        AttendanceEntry, AttendanceKind, AttendanceSubmission, NOTIFICATION_MESSAGE,
        NOTIFICATION_TITLE,
    };
    use bson::oid::ObjectId;
    use chrono::Utc;

    fn submission(students: usize) -> AttendanceSubmission {
        AttendanceSubmission {
            teacher_id: ObjectId::new().to_hex(),
            class_id: ObjectId::new().to_hex(),
            attlist: (0..students)
                .map(|i| AttendanceEntry {
                    student_id: ObjectId::new().to_hex(),
                    att_type: if i % 2 == 0 {
                        AttendanceKind::Present
                    } else {
                        AttendanceKind::Absent
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn three_entries_produce_three_matching_pairs() {
        let submission = submission(3);
        let valid = submission.validate().expect("valid submission");
        let now = Utc::now();
        let (attendance, notifications) = valid.build_batch(now);

        assert_eq!(attendance.len(), 3);
        assert_eq!(notifications.len(), 3);

        for (row, mirror) in attendance.iter().zip(&notifications) {
            assert_eq!(row.teacher, mirror.teacher);
            assert_eq!(row.classes, mirror.classes);
            assert_eq!(row.student, mirror.student);
            assert_eq!(row.kind, mirror.kind);
            assert_eq!(row.created_at, now);
            assert_eq!(mirror.title, NOTIFICATION_TITLE);
            assert_eq!(mirror.message, NOTIFICATION_MESSAGE);
        }
    }

    #[test]
    fn empty_attlist_is_rejected() {
        assert!(submission(0).validate().is_err());
    }

    #[test]
    fn malformed_student_id_is_rejected() {
        let mut submission = submission(2);
        submission.attlist[1].student_id = "not-an-id".to_string();
        assert!(submission.validate().is_err());
    }

    #[test]
    fn malformed_teacher_or_class_id_is_rejected() {
        let mut bad_teacher = submission(1);
        bad_teacher.teacher_id = "xyz".to_string();
        assert!(bad_teacher.validate().is_err());

        let mut bad_class = submission(1);
        bad_class.class_id = "xyz".to_string();
        assert!(bad_class.validate().is_err());
    }
}

#[cfg(test)]
mod listing_filters {
    use super::listing_filter;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn teacher_wins_over_class_and_student() {
        let teacher = ObjectId::new();
        let class = ObjectId::new();
        let student = ObjectId::new();
        let query = listing_filter(
            Some(&teacher.to_hex()),
            Some(&class.to_hex()),
            Some(&student.to_hex()),
        )
        .unwrap();
        assert_eq!(query, doc! { "teacher": teacher });
    }

    #[test]
    fn class_wins_over_student() {
        let class = ObjectId::new();
        let student = ObjectId::new();
        let query = listing_filter(None, Some(&class.to_hex()), Some(&student.to_hex())).unwrap();
        assert_eq!(query, doc! { "classes": class });
    }

    #[test]
    fn student_alone_filters_on_the_reference() {
        let student = ObjectId::new();
        let query = listing_filter(None, None, Some(&student.to_hex())).unwrap();
        assert_eq!(query, doc! { "student": student });
    }

    #[test]
    fn no_arguments_is_a_client_error() {
        assert!(listing_filter(None, None, None).is_err());
    }
}

#[cfg(test)]
mod kind_serialization {
    use super::AttendanceKind;

    #[test]
    fn wire_format_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&AttendanceKind::Present).unwrap(),
            "\"present\""
        );
        assert_eq!(
            serde_json::from_str::<AttendanceKind>("\"absent\"").unwrap(),
            AttendanceKind::Absent
        );
    }
}
