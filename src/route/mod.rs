use std::collections::BTreeMap;

use rocket::{Build, Rocket, Route};

pub mod class;
pub mod student;
pub mod teacher;

use class::*;
use student::*;
use teacher::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        attendance::{AttendanceEntry, AttendanceKind, AttendanceSubmission},
        class::{ClassBrief, ClassCreateData},
        student::db::StudentBrief,
        student::{StudentCreateData, StudentDocSlot, StudentUpdateData},
        teacher::db::TeacherBrief,
        teacher::{TeacherCreateData, TeacherDocSlot, TeacherUpdateData},
    },
    resp::problem::Problem,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        student_create,
        student_update,
        student_delete,
        student_find_one,
        student_list,
        student_search,
        students_parent,
        student_upload,
        student_photo_delete,
        attendance_list,
        notification_list,
        teacher_create,
        teacher_update,
        teacher_delete,
        teacher_find,
        teacher_list,
        teacher_students,
        teacher_upload,
        teacher_photo_delete,
        attendance_submit,
        class_create,
        class_delete,
        class_list
    ),
    components(schemas(
        StudentCreateData,
        StudentUpdateData,
        StudentDocSlot,
        StudentView,
        StudentBrief,
        TeacherCreateData,
        TeacherUpdateData,
        TeacherDocSlot,
        TeacherView,
        TeacherStudentsView,
        TeacherBrief,
        ClassCreateData,
        ClassBrief,
        AttendanceKind,
        AttendanceEntry,
        AttendanceSubmission,
        AttendanceView,
        NotificationView,
        Problem
    )),
    modifiers(&ADMIN_PREFIX)
)]
pub struct ApiDoc;

pub struct PathPrefix(pub &'static str);
static ADMIN_PREFIX: PathPrefix = PathPrefix("/api-admin");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn api_admin() -> Vec<Route> {
    routes![
        student_create,
        student_update,
        student_delete,
        student_find_one,
        student_list,
        student_search,
        students_parent,
        student_upload,
        student_photo_delete,
        attendance_list,
        notification_list,
        teacher_create,
        teacher_update,
        teacher_delete,
        teacher_find,
        teacher_list,
        teacher_students,
        teacher_upload,
        teacher_photo_delete,
        attendance_submit,
        class_create,
        class_delete,
        class_list
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/api-admin", api_admin()).mount(
        "/",
        SwaggerUi::new("/swagger/<_..>").url("/api-admin/openapi.json", ApiDoc::openapi()),
    )
}
