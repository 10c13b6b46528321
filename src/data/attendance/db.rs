use bson::{doc, Document};
use chrono::Utc;
use mongodb::Database;
use rocket::futures::StreamExt;
use tracing::warn;

use crate::resp::problem::Problem;

use super::{
    utc_day_window, Attendance, Notification, ValidSubmission, ATTENDANCE_COLLECTION_NAME,
    NOTIFICATION_COLLECTION_NAME,
};

pub mod problem {
    use crate::resp::problem::Problem;
    use chrono::{DateTime, Utc};
    use rocket::http::Status;

    #[inline]
    pub fn already_submitted(existing: DateTime<Utc>) -> Problem {
        Problem::new_untyped(Status::Conflict, "Attendance already submitted today.")
            .insert_str("submitted_at", existing.to_rfc3339())
            .to_owned()
    }

    #[inline]
    pub fn bad_field(field: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid input field.")
            .insert_str("field", field)
            .detail(detail)
            .to_owned()
    }
}

pub trait AttendanceDbExt {
    /// Inserts the attendance batch for the current UTC day, rejecting a
    /// second submission for the same (teacher, class) within that day.
    ///
    /// The duplicate check and the inserts are not atomic: two concurrent
    /// submissions for the same (teacher, class, day) can both pass the
    /// check, and a failure between the two bulk inserts leaves Attendance
    /// rows without Notification mirrors. Neither case is compensated.
    async fn submit_attendance(&self, submission: &ValidSubmission) -> Result<usize, Problem>;

    async fn list_attendance(&self, filter: Document) -> Result<Vec<Attendance>, Problem>;

    async fn list_notifications(&self, filter: Document) -> Result<Vec<Notification>, Problem>;
}

impl AttendanceDbExt for Database {
    async fn submit_attendance(&self, submission: &ValidSubmission) -> Result<usize, Problem> {
        let now = Utc::now();
        let (start, end) = utc_day_window(now);

        let existing = self
            .collection::<Attendance>(ATTENDANCE_COLLECTION_NAME)
            .find_one(
                doc! {
                    "teacher": submission.teacher,
                    "classes": submission.class,
                    "created_at": {
                        "$gte": bson::DateTime::from_chrono(start),
                        "$lt": bson::DateTime::from_chrono(end),
                    },
                },
                None,
            )
            .await
            .map_err(Problem::from)?;

        if let Some(existing) = existing {
            return Err(problem::already_submitted(existing.created_at));
        }

        let (attendance, notifications) = submission.build_batch(now);
        let count = attendance.len();

        self.collection::<Attendance>(ATTENDANCE_COLLECTION_NAME)
            .insert_many(&attendance, None)
            .await
            .map_err(Problem::from)?;

        self.collection::<Notification>(NOTIFICATION_COLLECTION_NAME)
            .insert_many(&notifications, None)
            .await
            .map_err(Problem::from)?;

        Ok(count)
    }

    async fn list_attendance(&self, filter: Document) -> Result<Vec<Attendance>, Problem> {
        let mut cursor = self
            .collection::<Attendance>(ATTENDANCE_COLLECTION_NAME)
            .find(filter, None)
            .await
            .map_err(Problem::from)?;

        let mut rows = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(row) => rows.push(row),
                Err(_) => warn!("Unable to deserialize Attendance document."),
            }
        }

        Ok(rows)
    }

    async fn list_notifications(&self, filter: Document) -> Result<Vec<Notification>, Problem> {
        let mut cursor = self
            .collection::<Notification>(NOTIFICATION_COLLECTION_NAME)
            .find(filter, None)
            .await
            .map_err(Problem::from)?;

        let mut rows = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(row) => rows.push(row),
                Err(_) => warn!("Unable to deserialize Notification document."),
            }
        }

        Ok(rows)
    }
}
