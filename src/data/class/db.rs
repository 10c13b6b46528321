use bson::{doc, oid::ObjectId};
use mongodb::Database;
use rocket::futures::StreamExt;
use tracing::warn;

use crate::resp::problem::Problem;

use super::{Class, ClassBrief, ClassCreateData, CLASS_COLLECTION_NAME};

pub mod problem {
    use crate::resp::problem::Problem;
    use bson::oid::ObjectId;
    use rocket::http::Status;

    #[inline]
    pub fn bad_name(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad class name.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_id(raw: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad class id.")
            .insert_str("id", raw)
            .to_owned()
    }

    #[inline]
    pub fn not_found(id: ObjectId) -> Problem {
        Problem::new_untyped(Status::NotFound, "Class doesn't exist.")
            .insert_str("id", id.to_hex())
            .to_owned()
    }
}

pub trait ClassDbExt {
    async fn create_class(&self, data: ClassCreateData) -> Result<ObjectId, Problem>;
    async fn delete_class(&self, id: ObjectId) -> Result<Class, Problem>;
    async fn list_classes(&self) -> Result<Vec<Class>, Problem>;

    /// Resolves a stored Class reference into its display fields.
    async fn class_brief(&self, id: ObjectId) -> Result<Option<ClassBrief>, Problem>;
}

impl ClassDbExt for Database {
    async fn create_class(&self, data: ClassCreateData) -> Result<ObjectId, Problem> {
        let inserted = self
            .collection::<Class>(CLASS_COLLECTION_NAME)
            .insert_one(Class::new(data.name), None)
            .await
            .map_err(Problem::from)?;

        Ok(inserted
            .inserted_id
            .as_object_id()
            .expect("inserted Class _id must be an ObjectId"))
    }

    async fn delete_class(&self, id: ObjectId) -> Result<Class, Problem> {
        self.collection::<Class>(CLASS_COLLECTION_NAME)
            .find_one_and_delete(doc! { "_id": id }, None)
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(id))
    }

    async fn list_classes(&self) -> Result<Vec<Class>, Problem> {
        let options = mongodb::options::FindOptions::builder()
            .sort(doc! { "_id": 1 })
            .build();

        let mut cursor = self
            .collection::<Class>(CLASS_COLLECTION_NAME)
            .find(None, options)
            .await
            .map_err(Problem::from)?;

        let mut classes = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(class) => classes.push(class),
                Err(_) => warn!("Unable to deserialize Class document."),
            }
        }

        Ok(classes)
    }

    async fn class_brief(&self, id: ObjectId) -> Result<Option<ClassBrief>, Problem> {
        let class = self
            .collection::<Class>(CLASS_COLLECTION_NAME)
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(Problem::from)?;

        Ok(class.map(ClassBrief::from))
    }
}
