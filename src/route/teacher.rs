use bson::{doc, oid::ObjectId};
use chrono::{DateTime, Utc};
use mongodb::Database;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde::Serialize;
use utoipa::ToSchema;

use crate::data::attendance::db::AttendanceDbExt;
use crate::data::attendance::AttendanceSubmission;
use crate::data::class::db::ClassDbExt;
use crate::data::class::ClassBrief;
use crate::data::student::db::StudentDbExt;
use crate::data::teacher::db::problem as teacher_problem;
use crate::data::teacher::db::TeacherDbExt;
use crate::data::teacher::{
    teacher_filter, Teacher, TeacherCreateData, TeacherDocSlot, TeacherUpdateData,
};
use crate::resp::api::ApiResponse;
use crate::resp::problem::Problem;
use crate::route::student::{resolve_students, StudentView};
use crate::storage::FileStore;

/// Teacher record as shown to clients: hex id, resolved Class reference,
/// audit `updated_at` stripped.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeacherView {
    pub id: String,
    pub fname: String,
    pub lname: String,
    pub mobile: String,
    pub email: String,
    pub doc_id: String,
    pub qualification: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<ClassBrief>,
    pub teacher_avatar: String,
    pub teacher_doc_front: String,
    pub teacher_doc_back: String,
    pub certificate_doc_front: String,
    pub certificate_doc_back: String,
    pub created_at: DateTime<Utc>,
}

impl TeacherView {
    pub fn new(record: Teacher, classes: Option<ClassBrief>) -> TeacherView {
        TeacherView {
            id: record.id.map(|it| it.to_hex()).unwrap_or_default(),
            fname: record.fname,
            lname: record.lname,
            mobile: record.mobile,
            email: record.email,
            doc_id: record.doc_id,
            qualification: record.qualification,
            classes,
            teacher_avatar: record.teacher_avatar,
            teacher_doc_front: record.teacher_doc_front,
            teacher_doc_back: record.teacher_doc_back,
            certificate_doc_front: record.certificate_doc_front,
            certificate_doc_back: record.certificate_doc_back,
            created_at: record.created_at,
        }
    }
}

/// A teacher together with every student of their assigned class.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeacherStudentsView {
    pub teacher: TeacherView,
    pub student: Vec<StudentView>,
}

async fn resolve_teacher(db: &Database, record: Teacher) -> Result<TeacherView, Problem> {
    let classes = match record.classes {
        Some(class_id) => db.class_brief(class_id).await?,
        None => None,
    };
    Ok(TeacherView::new(record, classes))
}

fn parse_teacher_id(raw: &str) -> Result<ObjectId, Problem> {
    ObjectId::parse_str(raw)
        .map_err(|_| teacher_problem::bad_field("id", "Not a valid teacher id."))
}

/// Register a teacher
#[utoipa::path(
    request_body = TeacherCreateData,
    responses(
        (status = 201, description = "Teacher created; response carries the new id"),
        (status = 400, description = "Input failed shape validation", body = Problem),
        (status = 409, description = "Mobile, email or doc_id already taken", body = Problem),
    )
)]
#[post("/teacher", format = "application/json", data = "<teacher>")]
#[tracing::instrument(skip(db))]
pub async fn teacher_create(
    teacher: Json<TeacherCreateData>,
    db: &State<Database>,
) -> Result<(Status, Json<ApiResponse<()>>), Problem> {
    teacher.validate()?;

    let id = db.create_teacher(teacher.into_inner().into_record()).await?;

    Ok((
        Status::Created,
        Json(ApiResponse::created(
            "successfully created a teacher, please upload documents.",
            id,
        )),
    ))
}

/// Update a teacher's email, mobile and/or qualification
#[utoipa::path(
    request_body = TeacherUpdateData,
    responses(
        (status = 200, description = "Updated record", body = TeacherView),
        (status = 404, description = "Teacher doesn't exist", body = Problem),
        (status = 409, description = "Mobile or email already taken", body = Problem),
    )
)]
#[put("/teacher/<id>", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn teacher_update(
    id: &str,
    update: Json<TeacherUpdateData>,
    db: &State<Database>,
) -> Result<Json<ApiResponse<TeacherView>>, Problem> {
    update.validate()?;

    let id = parse_teacher_id(id)?;
    let record = db.update_teacher(id, &update).await?;
    let view = resolve_teacher(db, record).await?;

    Ok(Json(ApiResponse::with_data(
        "successfully updated the teacher",
        view,
    )))
}

/// Delete a teacher
#[utoipa::path(responses(
    (status = 200, description = "Teacher removed"),
    (status = 404, description = "Teacher doesn't exist", body = Problem),
))]
#[delete("/teacher/<id>")]
#[tracing::instrument(skip(db))]
pub async fn teacher_delete(
    id: &str,
    db: &State<Database>,
) -> Result<Json<ApiResponse<()>>, Problem> {
    let id = parse_teacher_id(id)?;
    db.delete_teacher(id).await?;

    Ok(Json(ApiResponse::message("successfully deleted teacher!")))
}

/// Find one teacher by teacher id or by assigned class id
#[utoipa::path(responses(
    (status = 200, description = "Matching teacher, if any", body = TeacherView),
    (status = 400, description = "Neither lookup argument was usable", body = Problem),
))]
#[get("/teacher?<teacher_id>&<class_id>")]
#[tracing::instrument(skip(db))]
pub async fn teacher_find(
    teacher_id: Option<&str>,
    class_id: Option<&str>,
    db: &State<Database>,
) -> Result<Json<ApiResponse<TeacherView>>, Problem> {
    let filter = teacher_filter(teacher_id, class_id)?;
    let record = db.find_teacher(filter).await?;

    let view = match record {
        Some(record) => Some(resolve_teacher(db, record).await?),
        None => None,
    };

    Ok(Json(ApiResponse {
        status: true,
        message: "show a teacher".to_string(),
        data: view,
        id: None,
    }))
}

/// List all teachers, sorted by id ascending
#[utoipa::path(responses(
    (status = 200, description = "All teachers", body = Vec<TeacherView>),
))]
#[get("/teachers")]
#[tracing::instrument(skip(db))]
pub async fn teacher_list(
    db: &State<Database>,
) -> Result<Json<ApiResponse<Vec<TeacherView>>>, Problem> {
    let records = db.list_teachers().await?;

    let mut views = Vec::with_capacity(records.len());
    for record in records {
        views.push(resolve_teacher(db, record).await?);
    }

    Ok(Json(ApiResponse::with_data(
        "successfully showing all teachers!",
        views,
    )))
}

/// A teacher and the students of their assigned class
#[utoipa::path(responses(
    (status = 200, description = "Teacher info plus class roster; roster is empty without an assigned class", body = TeacherStudentsView),
    (status = 404, description = "Teacher doesn't exist", body = Problem),
))]
#[get("/teacher-students/<id>")]
#[tracing::instrument(skip(db))]
pub async fn teacher_students(
    id: &str,
    db: &State<Database>,
) -> Result<Json<ApiResponse<TeacherStudentsView>>, Problem> {
    let id = parse_teacher_id(id)?;
    let record = db
        .find_teacher_by_id(id)
        .await?
        .ok_or_else(|| teacher_problem::not_found(id))?;

    // Without an assigned class the roster is empty, not an error.
    let students = match record.classes {
        Some(class_id) => {
            let records = db.find_students(doc! { "classes": class_id }).await?;
            resolve_students(db, records).await?
        }
        None => vec![],
    };

    let view = TeacherStudentsView {
        teacher: resolve_teacher(db, record).await?,
        student: students,
    };

    Ok(Json(ApiResponse::with_data(
        "show a teacher info and assigned class wise students",
        view,
    )))
}

/// Submit attendance for a class
#[utoipa::path(
    request_body = AttendanceSubmission,
    responses(
        (status = 201, description = "One Attendance and one Notification record inserted per entry"),
        (status = 400, description = "Malformed ids or empty attendance list", body = Problem),
        (status = 409, description = "Attendance already submitted for this teacher and class today", body = Problem),
    )
)]
#[post("/attendance", format = "application/json", data = "<submission>")]
#[tracing::instrument(skip(db))]
pub async fn attendance_submit(
    submission: Json<AttendanceSubmission>,
    db: &State<Database>,
) -> Result<(Status, Json<ApiResponse<()>>), Problem> {
    let valid = submission.validate()?;
    let count = db.submit_attendance(&valid).await?;

    tracing::info!(
        "attendance submitted for class {}: {} students",
        valid.class.to_hex(),
        count
    );

    Ok((
        Status::Created,
        Json(ApiResponse::message("attendance submitted successfully!")),
    ))
}

#[derive(FromForm)]
pub struct TeacherUploadForm<'r> {
    pub id: String,
    pub teacher_avatar: Option<TempFile<'r>>,
    pub teacher_doc_front: Option<TempFile<'r>>,
    pub teacher_doc_back: Option<TempFile<'r>>,
    pub certificate_doc_front: Option<TempFile<'r>>,
    pub certificate_doc_back: Option<TempFile<'r>>,
}

impl std::fmt::Debug for TeacherUploadForm<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TeacherUploadForm:{}", self.id)
    }
}

impl<'r> TeacherUploadForm<'r> {
    /// First file present, in declared key order; only that one is stored.
    fn first_file(&mut self) -> Option<(TeacherDocSlot, &mut TempFile<'r>)> {
        if let Some(file) = self.teacher_avatar.as_mut() {
            return Some((TeacherDocSlot::TeacherAvatar, file));
        }
        if let Some(file) = self.teacher_doc_front.as_mut() {
            return Some((TeacherDocSlot::TeacherDocFront, file));
        }
        if let Some(file) = self.teacher_doc_back.as_mut() {
            return Some((TeacherDocSlot::TeacherDocBack, file));
        }
        if let Some(file) = self.certificate_doc_front.as_mut() {
            return Some((TeacherDocSlot::CertificateDocFront, file));
        }
        if let Some(file) = self.certificate_doc_back.as_mut() {
            return Some((TeacherDocSlot::CertificateDocBack, file));
        }
        None
    }
}

/// Upload one teacher document or avatar
#[utoipa::path(responses(
    (status = 200, description = "File stored and the matching slot updated"),
    (status = 400, description = "No recognized file field in the form", body = Problem),
    (status = 404, description = "Teacher doesn't exist", body = Problem),
))]
#[post("/upload-teacher-file", data = "<upload>")]
#[tracing::instrument(skip(db, store))]
pub async fn teacher_upload(
    mut upload: Form<TeacherUploadForm<'_>>,
    db: &State<Database>,
    store: &State<FileStore>,
) -> Result<Json<ApiResponse<()>>, Problem> {
    let id = parse_teacher_id(&upload.id)?;

    let form = &mut *upload;
    let (slot, file) = form.first_file().ok_or_else(|| {
        teacher_problem::bad_field("file", "Expected one teacher document or avatar field.")
    })?;

    let stored = store.save(slot.field_name(), file).await?;
    db.set_teacher_doc(id, slot, &stored).await?;

    Ok(Json(ApiResponse::message("photo updated successfully!")))
}

/// Clear one uploaded teacher photo field and delete the stored file
#[utoipa::path(responses(
    (status = 200, description = "Slot cleared; file deletion failures are logged, not reported"),
    (status = 404, description = "Teacher doesn't exist", body = Problem),
))]
#[delete("/upload-teacher-file?<id>&<source>")]
#[tracing::instrument(skip(db, store))]
pub async fn teacher_photo_delete(
    id: &str,
    source: TeacherDocSlot,
    db: &State<Database>,
    store: &State<FileStore>,
) -> Result<Json<ApiResponse<()>>, Problem> {
    let id = parse_teacher_id(id)?;

    // Clear first, then delete; the reported outcome doesn't depend on the
    // file system delete.
    let record = db.clear_teacher_doc(id, source).await?;

    let old_path = source.stored_path(&record);
    if !old_path.is_empty() {
        if let Err(e) = store.delete(old_path).await {
            tracing::error!("unable to delete stored file '{}': {}", old_path, e);
        }
    }

    Ok(Json(ApiResponse::message(format!(
        "Teacher {} deleted successfully!",
        source.field_name()
    ))))
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod teacher_endpoints {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    async fn client() -> Client {
        let rocket = crate::create(None).await.expect("invalid backend");
        Client::tracked(rocket).await.expect("invalid client")
    }

    fn teacher_body(tag: &str, mobile: &str) -> String {
        json!({
            "fname": format!("test-{tag}"),
            "lname": "teacher",
            "mobile": mobile,
            "email": format!("{tag}@example.com"),
            "doc_id": format!("TD-{tag}"),
            "qualification": "M.Sc.",
        })
        .to_string()
    }

    // Needs a running MongoDB instance, see Config.
    #[rocket::async_test]
    #[ignore]
    async fn second_submission_same_day_is_rejected() {
        let client = client().await;

        let teacher = client
            .post("/api-admin/teacher")
            .header(ContentType::JSON)
            .body(teacher_body("att", "0777000111"))
            .dispatch()
            .await;
        assert_eq!(teacher.status(), Status::Created);
        let teacher_id = teacher.into_json::<serde_json::Value>().await.unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();

        let class = client
            .post("/api-admin/class")
            .header(ContentType::JSON)
            .body(json!({ "name": "test-att-class" }).to_string())
            .dispatch()
            .await;
        assert_eq!(class.status(), Status::Created);
        let class_id = class.into_json::<serde_json::Value>().await.unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();

        let submission = json!({
            "teacher_id": teacher_id,
            "class_id": class_id,
            "attlist": [
                { "student_id": bson::oid::ObjectId::new().to_hex(), "att_type": "present" },
                { "student_id": bson::oid::ObjectId::new().to_hex(), "att_type": "absent" },
                { "student_id": bson::oid::ObjectId::new().to_hex(), "att_type": "present" },
            ],
        })
        .to_string();

        let first = client
            .post("/api-admin/attendance")
            .header(ContentType::JSON)
            .body(&submission)
            .dispatch()
            .await;
        assert_eq!(first.status(), Status::Created);

        let listed = client
            .get(format!("/api-admin/attendance?teacher_id={teacher_id}"))
            .dispatch()
            .await;
        let rows = listed.into_json::<serde_json::Value>().await.unwrap();
        assert_eq!(rows["data"].as_array().unwrap().len(), 3);

        let second = client
            .post("/api-admin/attendance")
            .header(ContentType::JSON)
            .body(&submission)
            .dispatch()
            .await;
        assert_eq!(second.status(), Status::Conflict);
    }

    // Needs a running MongoDB instance, see Config.
    #[rocket::async_test]
    #[ignore]
    async fn creation_uniqueness_is_checked_mobile_first() {
        let client = client().await;

        let first = client
            .post("/api-admin/teacher")
            .header(ContentType::JSON)
            .body(teacher_body("uniq", "0777000222"))
            .dispatch()
            .await;
        assert_eq!(first.status(), Status::Created);

        // Same mobile, different email and doc_id: the mobile check fires.
        let clash = client
            .post("/api-admin/teacher")
            .header(ContentType::JSON)
            .body(teacher_body("uniq-other", "0777000222"))
            .dispatch()
            .await;
        assert_eq!(clash.status(), Status::Conflict);
    }
}
