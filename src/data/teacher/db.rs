use bson::{doc, oid::ObjectId, Document};
use chrono::Utc;
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::resp::problem::Problem;

use super::{Teacher, TeacherDocSlot, TeacherUpdateData, TEACHER_COLLECTION_NAME};

pub mod problem {
    use crate::resp::problem::Problem;
    use bson::oid::ObjectId;
    use rocket::http::Status;

    #[inline]
    pub fn mobile_taken(mobile: impl ToString) -> Problem {
        Problem::new_untyped(Status::Conflict, "This mobile number is already taken.")
            .insert_str("mobile", mobile)
            .to_owned()
    }

    #[inline]
    pub fn email_taken(email: impl ToString) -> Problem {
        Problem::new_untyped(Status::Conflict, "This email id is already taken.")
            .insert_str("email", email)
            .to_owned()
    }

    #[inline]
    pub fn doc_id_taken(doc_id: impl ToString) -> Problem {
        Problem::new_untyped(Status::Conflict, "This teacher document id is already taken.")
            .insert_str("doc_id", doc_id)
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
    pub fn not_found(id: ObjectId) -> Problem {
        Problem::new_untyped(Status::NotFound, "Teacher doesn't exist.")
            .insert_str("id", id.to_hex())
            .to_owned()
    }
}

/// Display form of a resolved Teacher reference on attendance and
/// notification rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TeacherBrief {
    pub id: String,
    pub fname: String,
    pub lname: String,
    pub mobile: String,
}

impl From<Teacher> for TeacherBrief {
    fn from(value: Teacher) -> Self {
        TeacherBrief {
            id: value.id.map(|it| it.to_hex()).unwrap_or_default(),
            fname: value.fname,
            lname: value.lname,
            mobile: value.mobile,
        }
    }
}

pub trait TeacherDbExt {
    /// Inserts a new teacher after three sequential uniqueness checks:
    /// mobile, then email, then doc_id. Input is assumed validated.
    async fn create_teacher(&self, record: Teacher) -> Result<ObjectId, Problem>;

    async fn find_teacher(&self, filter: Document) -> Result<Option<Teacher>, Problem>;
    async fn find_teacher_by_id(&self, id: ObjectId) -> Result<Option<Teacher>, Problem>;

    /// Full listing sorted by `_id` ascending.
    async fn list_teachers(&self) -> Result<Vec<Teacher>, Problem>;

    /// Applies the provided fields and returns the updated record. Email and
    /// mobile are checked for uniqueness first; the checks are unscoped, so
    /// re-submitting a held value is rejected.
    async fn update_teacher(
        &self,
        id: ObjectId,
        update: &TeacherUpdateData,
    ) -> Result<Teacher, Problem>;

    async fn delete_teacher(&self, id: ObjectId) -> Result<Teacher, Problem>;

    async fn set_teacher_doc(
        &self,
        id: ObjectId,
        slot: TeacherDocSlot,
        path: &str,
    ) -> Result<(), Problem>;

    /// Clears the slot and returns the record as it was before the update.
    async fn clear_teacher_doc(&self, id: ObjectId, slot: TeacherDocSlot)
        -> Result<Teacher, Problem>;

    async fn teacher_brief(&self, id: ObjectId) -> Result<Option<TeacherBrief>, Problem>;
}

impl TeacherDbExt for Database {
    async fn create_teacher(&self, record: Teacher) -> Result<ObjectId, Problem> {
        let teachers = self.collection::<Teacher>(TEACHER_COLLECTION_NAME);

        let mobile_taken = teachers
            .find_one(doc! { "mobile": &record.mobile }, None)
            .await
            .map_err(Problem::from)?
            .is_some();
        if mobile_taken {
            return Err(problem::mobile_taken(&record.mobile));
        }

        let email_taken = teachers
            .find_one(doc! { "email": &record.email }, None)
            .await
            .map_err(Problem::from)?
            .is_some();
        if email_taken {
            return Err(problem::email_taken(&record.email));
        }

        let doc_id_taken = teachers
            .find_one(doc! { "doc_id": &record.doc_id }, None)
            .await
            .map_err(Problem::from)?
            .is_some();
        if doc_id_taken {
            return Err(problem::doc_id_taken(&record.doc_id));
        }

        let inserted = teachers
            .insert_one(&record, None)
            .await
            .map_err(Problem::from)?;

        Ok(inserted
            .inserted_id
            .as_object_id()
            .expect("inserted Teacher _id must be an ObjectId"))
    }

    async fn find_teacher(&self, filter: Document) -> Result<Option<Teacher>, Problem> {
        self.collection::<Teacher>(TEACHER_COLLECTION_NAME)
            .find_one(filter, None)
            .await
            .map_err(Problem::from)
    }

    async fn find_teacher_by_id(&self, id: ObjectId) -> Result<Option<Teacher>, Problem> {
        self.find_teacher(doc! { "_id": id }).await
    }

    async fn list_teachers(&self) -> Result<Vec<Teacher>, Problem> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();

        let mut cursor = self
            .collection::<Teacher>(TEACHER_COLLECTION_NAME)
            .find(None, options)
            .await
            .map_err(Problem::from)?;

        let mut teachers = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(teacher) => teachers.push(teacher),
                Err(_) => warn!("Unable to deserialize Teacher document."),
            }
        }

        Ok(teachers)
    }

    async fn update_teacher(
        &self,
        id: ObjectId,
        update: &TeacherUpdateData,
    ) -> Result<Teacher, Problem> {
        let teachers = self.collection::<Teacher>(TEACHER_COLLECTION_NAME);

        if let Some(mobile) = &update.mobile {
            let taken = teachers
                .find_one(doc! { "mobile": mobile }, None)
                .await
                .map_err(Problem::from)?
                .is_some();
            if taken {
                return Err(problem::mobile_taken(mobile));
            }
        }

        if let Some(email) = &update.email {
            let taken = teachers
                .find_one(doc! { "email": email }, None)
                .await
                .map_err(Problem::from)?
                .is_some();
            if taken {
                return Err(problem::email_taken(email));
            }
        }

        let mut fields = update.update_fields();
        fields.insert("updated_at", bson::DateTime::from_chrono(Utc::now()));

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        teachers
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": fields }, options)
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(id))
    }

    async fn delete_teacher(&self, id: ObjectId) -> Result<Teacher, Problem> {
        self.collection::<Teacher>(TEACHER_COLLECTION_NAME)
            .find_one_and_delete(doc! { "_id": id }, None)
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(id))
    }

    async fn set_teacher_doc(
        &self,
        id: ObjectId,
        slot: TeacherDocSlot,
        path: &str,
    ) -> Result<(), Problem> {
        let updated = self
            .collection::<Teacher>(TEACHER_COLLECTION_NAME)
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

    async fn clear_teacher_doc(
        &self,
        id: ObjectId,
        slot: TeacherDocSlot,
    ) -> Result<Teacher, Problem> {
        self.collection::<Teacher>(TEACHER_COLLECTION_NAME)
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

    async fn teacher_brief(&self, id: ObjectId) -> Result<Option<TeacherBrief>, Problem> {
        let teacher = self
            .collection::<Teacher>(TEACHER_COLLECTION_NAME)
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(Problem::from)?;

        Ok(teacher.map(TeacherBrief::from))
    }
}
