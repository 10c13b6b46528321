use bson::oid::ObjectId;
use mongodb::Database;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::class::db::{problem as class_problem, ClassDbExt};
use crate::data::class::{ClassBrief, ClassCreateData};
use crate::resp::api::ApiResponse;
use crate::resp::problem::Problem;

/// Create a class
#[utoipa::path(
    request_body = ClassCreateData,
    responses(
        (status = 201, description = "Class created; response carries the new id"),
        (status = 400, description = "Class name failed validation", body = Problem),
    )
)]
#[post("/class", format = "application/json", data = "<class>")]
#[tracing::instrument(skip(db))]
pub async fn class_create(
    class: Json<ClassCreateData>,
    db: &State<Database>,
) -> Result<(Status, Json<ApiResponse<()>>), Problem> {
    class.validate()?;

    let id = db.create_class(class.into_inner()).await?;

    Ok((
        Status::Created,
        Json(ApiResponse::created("successfully created a class", id)),
    ))
}

/// Delete a class
#[utoipa::path(responses(
    (status = 200, description = "Class removed"),
    (status = 404, description = "Class doesn't exist", body = Problem),
))]
#[delete("/class/<id>")]
#[tracing::instrument(skip(db))]
pub async fn class_delete(id: &str, db: &State<Database>) -> Result<Json<ApiResponse<()>>, Problem> {
    let id = ObjectId::parse_str(id).map_err(|_| class_problem::bad_id(id))?;

    db.delete_class(id).await?;

    Ok(Json(ApiResponse::message("successfully deleted class!")))
}

/// List all classes
#[utoipa::path(responses(
    (status = 200, description = "All classes", body = Vec<ClassBrief>),
))]
#[get("/class")]
#[tracing::instrument(skip(db))]
pub async fn class_list(db: &State<Database>) -> Result<Json<ApiResponse<Vec<ClassBrief>>>, Problem> {
    let classes = db
        .list_classes()
        .await?
        .into_iter()
        .map(ClassBrief::from)
        .collect();

    Ok(Json(ApiResponse::with_data("showing all classes", classes)))
}
