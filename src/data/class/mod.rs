use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod db;

pub const CLASS_COLLECTION_NAME: &str = "classes";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Class {
    pub fn new(name: impl ToString) -> Class {
        Class {
            id: None,
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Display form of a resolved Class reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassBrief {
    pub id: String,
    pub name: String,
}

impl From<Class> for ClassBrief {
    fn from(value: Class) -> Self {
        ClassBrief {
            id: value.id.map(|it| it.to_hex()).unwrap_or_default(),
            name: value.name,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClassCreateData {
    pub name: String,
}

impl ClassCreateData {
    pub fn validate(&self) -> Result<(), crate::resp::problem::Problem> {
        if self.name.trim().is_empty() {
            return Err(db::problem::bad_name("Class name can't be empty."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod class_payload {
    use super::ClassCreateData;

    #[test]
    fn blank_name_is_rejected() {
        let blank = ClassCreateData {
            name: "  ".to_string(),
        };
        assert!(blank.validate().is_err());

        let named = ClassCreateData {
            name: "Grade 5-B".to_string(),
        };
        assert!(named.validate().is_ok());
    }
}
