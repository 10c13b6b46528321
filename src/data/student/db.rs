use bson::{doc, oid::ObjectId, Document};
use chrono::Utc;
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::resp::problem::Problem;

use super::{Student, StudentDocSlot, StudentLookup, STUDENT_COLLECTION_NAME};

pub mod problem {
    use crate::resp::problem::Problem;
    use bson::oid::ObjectId;
    use rocket::http::Status;

    #[inline]
    pub fn already_exists(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::Conflict, "Student already registered.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn mobile_taken(mobile: impl ToString) -> Problem {
        Problem::new_untyped(Status::Conflict, "This mobile number is already taken.")
            .insert_str("mobile", mobile)
            .to_owned()
    }

    #[inline]
    pub fn bad_mobile(mobile: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad mobile number.")
            .insert_str("mobile", mobile)
            .detail("Mobile numbers are exactly 10 digits.")
            .to_owned()
    }

    #[inline]
    pub fn bad_field(field: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid input field.")
            .insert_str("field", field)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_lookup(raw: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid input field.")
            .insert_str("argument", raw)
            .detail("Expected a 24 character id or a 10 digit mobile number.")
            .to_owned()
    }

    #[inline]
    pub fn not_found(id: ObjectId) -> Problem {
        Problem::new_untyped(Status::NotFound, "Student doesn't exist.")
            .insert_str("id", id.to_hex())
            .to_owned()
    }
}

/// Display form of a resolved Student reference on attendance and
/// notification rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StudentBrief {
    pub id: String,
    pub fname: String,
    pub lname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollno: Option<String>,
    pub father_name: String,
}

impl From<Student> for StudentBrief {
    fn from(value: Student) -> Self {
        StudentBrief {
            id: value.id.map(|it| it.to_hex()).unwrap_or_default(),
            fname: value.fname,
            lname: value.lname,
            rollno: value.rollno,
            father_name: value.father_name,
        }
    }
}

pub trait StudentDbExt {
    /// Inserts a new student after checking that no record shares the
    /// (mobile, email, parent_doc_id) triple. Input is assumed validated.
    async fn create_student(&self, record: Student) -> Result<ObjectId, Problem>;

    async fn find_student(&self, lookup: &StudentLookup) -> Result<Option<Student>, Problem>;
    async fn find_students(&self, filter: Document) -> Result<Vec<Student>, Problem>;

    /// Keyword/rollno search capped at 10 rows.
    async fn search_students(&self, filter: Document) -> Result<Vec<Student>, Problem>;

    /// Full listing sorted by `_id` ascending.
    async fn list_students(&self) -> Result<Vec<Student>, Problem>;

    /// Sets the new mobile number and returns the updated record. The
    /// uniqueness check is unscoped: a record can't "update" to the mobile
    /// it already holds.
    async fn update_student_mobile(&self, id: ObjectId, mobile: &str) -> Result<Student, Problem>;

    async fn delete_student(&self, id: ObjectId) -> Result<Student, Problem>;

    async fn set_student_doc(
        &self,
        id: ObjectId,
        slot: StudentDocSlot,
        path: &str,
    ) -> Result<(), Problem>;

    /// Clears the slot and returns the record as it was before the update,
    /// so the caller can remove the previously stored file.
    async fn clear_student_doc(&self, id: ObjectId, slot: StudentDocSlot)
        -> Result<Student, Problem>;

    async fn student_brief(&self, id: ObjectId) -> Result<Option<StudentBrief>, Problem>;
}

impl StudentDbExt for Database {
    async fn create_student(&self, record: Student) -> Result<ObjectId, Problem> {
        let students = self.collection::<Student>(STUDENT_COLLECTION_NAME);

        let exists = students
            .find_one(
                doc! {
                    "mobile": &record.mobile,
                    "email": &record.email,
                    "parent_doc_id": &record.parent_doc_id,
                },
                None,
            )
            .await
            .map_err(Problem::from)?
            .is_some();

        if exists {
            return Err(problem::already_exists("This student is already registered."));
        }

        let inserted = students
            .insert_one(&record, None)
            .await
            .map_err(Problem::from)?;

        Ok(inserted
            .inserted_id
            .as_object_id()
            .expect("inserted Student _id must be an ObjectId"))
    }

    async fn find_student(&self, lookup: &StudentLookup) -> Result<Option<Student>, Problem> {
        self.collection::<Student>(STUDENT_COLLECTION_NAME)
            .find_one(lookup.filter(), None)
            .await
            .map_err(Problem::from)
    }

    async fn find_students(&self, filter: Document) -> Result<Vec<Student>, Problem> {
        collect_students(self, filter, None).await
    }

    async fn search_students(&self, filter: Document) -> Result<Vec<Student>, Problem> {
        let options = FindOptions::builder().limit(10).build();
        collect_students(self, filter, Some(options)).await
    }

    async fn list_students(&self) -> Result<Vec<Student>, Problem> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        collect_students(self, Document::new(), Some(options)).await
    }

    async fn update_student_mobile(&self, id: ObjectId, mobile: &str) -> Result<Student, Problem> {
        let students = self.collection::<Student>(STUDENT_COLLECTION_NAME);

        let taken = students
            .find_one(doc! { "mobile": mobile }, None)
            .await
            .map_err(Problem::from)?
            .is_some();

        if taken {
            return Err(problem::mobile_taken(mobile));
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        students
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": {
                    "mobile": mobile,
                    "updated_at": bson::DateTime::from_chrono(Utc::now()),
                } },
                options,
            )
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(id))
    }

    async fn delete_student(&self, id: ObjectId) -> Result<Student, Problem> {
        self.collection::<Student>(STUDENT_COLLECTION_NAME)
            .find_one_and_delete(doc! { "_id": id }, None)
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(id))
    }

    async fn set_student_doc(
        &self,
        id: ObjectId,
        slot: StudentDocSlot,
        path: &str,
    ) -> Result<(), Problem> {
        let updated = self
            .collection::<Student>(STUDENT_COLLECTION_NAME)
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": {
                    slot.field_name(): path,
                    "updated_at": bson::DateTime::from_chrono(Utc::now()),
                } },
                None,
            )
            .await
            .map_err(Problem::from)?;

        updated.map(|_| ()).ok_or_else(|| problem::not_found(id))
    }

    async fn clear_student_doc(
        &self,
        id: ObjectId,
        slot: StudentDocSlot,
    ) -> Result<Student, Problem> {
        self.collection::<Student>(STUDENT_COLLECTION_NAME)
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": {
                    slot.field_name(): "",
                    "updated_at": bson::DateTime::from_chrono(Utc::now()),
                } },
                None,
            )
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(id))
    }

    async fn student_brief(&self, id: ObjectId) -> Result<Option<StudentBrief>, Problem> {
        let student = self
            .collection::<Student>(STUDENT_COLLECTION_NAME)
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(Problem::from)?;

        Ok(student.map(StudentBrief::from))
    }
}

async fn collect_students(
    db: &Database,
    filter: Document,
    options: Option<FindOptions>,
) -> Result<Vec<Student>, Problem> {
    let mut cursor = db
        .collection::<Student>(STUDENT_COLLECTION_NAME)
        .find(filter, options)
        .await
        .map_err(Problem::from)?;

    let mut students = vec![];
    while let Some(result) = cursor.next().await {
        match result {
            Ok(student) => students.push(student),
            Err(_) => warn!("Unable to deserialize Student document."),
        }
    }

    Ok(students)
}
