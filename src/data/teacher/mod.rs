use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::data::is_valid_mobile;
use crate::resp::problem::Problem;

pub mod db;

use db::problem;

pub const TEACHER_COLLECTION_NAME: &str = "teachers";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teacher {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub fname: String,
    pub lname: String,
    pub mobile: String,
    pub email: String,
    pub doc_id: String,
    pub qualification: String,
    /// Reference to the Class the teacher is assigned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<ObjectId>,

    // Document slots; empty string means not uploaded.
    #[serde(default)]
    pub teacher_avatar: String,
    #[serde(default)]
    pub teacher_doc_front: String,
    #[serde(default)]
    pub teacher_doc_back: String,
    #[serde(default)]
    pub certificate_doc_front: String,
    #[serde(default)]
    pub certificate_doc_back: String,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// The closed set of uploadable document fields on a Teacher record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromFormField, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TeacherDocSlot {
    #[field(value = "teacher_avatar")]
    TeacherAvatar,
    #[field(value = "teacher_doc_front")]
    TeacherDocFront,
    #[field(value = "teacher_doc_back")]
    TeacherDocBack,
    #[field(value = "certificate_doc_front")]
    CertificateDocFront,
    #[field(value = "certificate_doc_back")]
    CertificateDocBack,
}

impl TeacherDocSlot {
    pub const ALL: [TeacherDocSlot; 5] = [
        TeacherDocSlot::TeacherAvatar,
        TeacherDocSlot::TeacherDocFront,
        TeacherDocSlot::TeacherDocBack,
        TeacherDocSlot::CertificateDocFront,
        TeacherDocSlot::CertificateDocBack,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            TeacherDocSlot::TeacherAvatar => "teacher_avatar",
            TeacherDocSlot::TeacherDocFront => "teacher_doc_front",
            TeacherDocSlot::TeacherDocBack => "teacher_doc_back",
            TeacherDocSlot::CertificateDocFront => "certificate_doc_front",
            TeacherDocSlot::CertificateDocBack => "certificate_doc_back",
        }
    }

    /// Currently stored path for this slot, empty if nothing was uploaded.
    pub fn stored_path(self, record: &Teacher) -> &str {
        match self {
            TeacherDocSlot::TeacherAvatar => &record.teacher_avatar,
            TeacherDocSlot::TeacherDocFront => &record.teacher_doc_front,
            TeacherDocSlot::TeacherDocBack => &record.teacher_doc_back,
            TeacherDocSlot::CertificateDocFront => &record.certificate_doc_front,
            TeacherDocSlot::CertificateDocBack => &record.certificate_doc_back,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TeacherCreateData {
    pub fname: String,
    pub lname: String,
    pub mobile: String,
    pub email: String,
    pub doc_id: String,
    pub qualification: String,
    /// Hex id of the Class the teacher is assigned to.
    #[serde(default)]
    pub classes: Option<String>,
}

impl TeacherCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.fname.trim().is_empty() || self.lname.trim().is_empty() {
            return Err(problem::bad_field(
                "name",
                "First and last name can't be empty.",
            ));
        }

        if !is_valid_mobile(&self.mobile) {
            return Err(problem::bad_mobile(&self.mobile));
        }

        if !self.email.contains('@') {
            return Err(problem::bad_field("email", "Not a valid e-mail address."));
        }

        if self.doc_id.trim().is_empty() {
            return Err(problem::bad_field(
                "doc_id",
                "Teacher document id can't be empty.",
            ));
        }

        if let Some(classes) = &self.classes {
            ObjectId::parse_str(classes)
                .map_err(|_| problem::bad_field("classes", "Not a valid class id."))?;
        }

        Ok(())
    }

    pub fn into_record(self) -> Teacher {
        let now = Utc::now();
        let classes = self
            .classes
            .as_deref()
            .and_then(|it| ObjectId::parse_str(it).ok());

        Teacher {
            id: None,
            fname: self.fname,
            lname: self.lname,
            mobile: self.mobile,
            email: self.email,
            doc_id: self.doc_id,
            qualification: self.qualification,
            classes,
            teacher_avatar: String::new(),
            teacher_doc_front: String::new(),
            teacher_doc_back: String::new(),
            certificate_doc_front: String::new(),
            certificate_doc_back: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; only provided fields are validated and applied.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TeacherUpdateData {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub qualification: Option<String>,
}

impl TeacherUpdateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.email.is_none() && self.mobile.is_none() && self.qualification.is_none() {
            return Err(problem::bad_field(
                "body",
                "Expected at least one of email, mobile or qualification.",
            ));
        }

        if let Some(email) = &self.email {
            if email.len() < 3 || email.len() > 25 || !email.contains('@') {
                return Err(problem::bad_field("email", "Not a valid e-mail address."));
            }
        }

        if let Some(mobile) = &self.mobile {
            if !is_valid_mobile(mobile) {
                return Err(problem::bad_mobile(mobile));
            }
        }

        if let Some(qualification) = &self.qualification {
            if qualification.len() < 3 || qualification.len() > 15 {
                return Err(problem::bad_field(
                    "qualification",
                    "Qualification must be between 3 and 15 characters.",
                ));
            }
        }

        Ok(())
    }

    pub fn update_fields(&self) -> Document {
        let mut fields = Document::new();
        if let Some(email) = &self.email {
            fields.insert("email", email);
        }
        if let Some(mobile) = &self.mobile {
            fields.insert("mobile", mobile);
        }
        if let Some(qualification) = &self.qualification {
            fields.insert("qualification", qualification);
        }
        fields
    }
}

/// Filter for `/teacher`: an explicit teacher id wins over a class id.
pub fn teacher_filter(teacher_id: Option<&str>, class_id: Option<&str>) -> Result<Document, Problem> {
    if let Some(raw) = teacher_id {
        let id = ObjectId::parse_str(raw)
            .map_err(|_| problem::bad_field("teacher_id", "Not a valid teacher id."))?;
        return Ok(doc! { "_id": id });
    }
    if let Some(raw) = class_id {
        let id = ObjectId::parse_str(raw)
            .map_err(|_| problem::bad_field("class_id", "Not a valid class id."))?;
        return Ok(doc! { "classes": id });
    }
    Err(problem::bad_field(
        "teacher_id",
        "Expected a teacher_id or a class_id.",
    ))
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod update_validation {
    use super::TeacherUpdateData;

    #[test]
    fn empty_update_is_rejected() {
        assert!(TeacherUpdateData::default().validate().is_err());
    }

    #[test]
    fn single_field_updates_are_accepted() {
        let update = TeacherUpdateData {
            qualification: Some("M.Sc.".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
        assert_eq!(update.update_fields().len(), 1);
        assert_eq!(update.update_fields().get_str("qualification").unwrap(), "M.Sc.");
    }

    #[test]
    fn email_bounds_are_enforced() {
        let too_long = TeacherUpdateData {
            email: Some("a.very.long.address@example.com".to_string()),
            ..Default::default()
        };
        assert!(too_long.validate().is_err());

        let no_at = TeacherUpdateData {
            email: Some("not-an-address".to_string()),
            ..Default::default()
        };
        assert!(no_at.validate().is_err());

        let fine = TeacherUpdateData {
            email: Some("t@example.com".to_string()),
            ..Default::default()
        };
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn qualification_bounds_are_enforced() {
        let short = TeacherUpdateData {
            qualification: Some("MS".to_string()),
            ..Default::default()
        };
        assert!(short.validate().is_err());

        let long = TeacherUpdateData {
            qualification: Some("a".repeat(16)),
            ..Default::default()
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn only_provided_fields_appear_in_the_update() {
        let update = TeacherUpdateData {
            email: Some("t@example.com".to_string()),
            mobile: Some("0123456789".to_string()),
            qualification: None,
        };
        let fields = update.update_fields();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("mobile"));
        assert!(!fields.contains_key("qualification"));
    }
}


#[cfg(test)]
mod doc_slots {
    use super::{Teacher, TeacherCreateData, TeacherDocSlot};

    fn example_teacher() -> Teacher {
        TeacherCreateData {
            fname: "Grace".to_string(),
            lname: "Hopper".to_string(),
            mobile: "0987654321".to_string(),
            email: "grace@example.com".to_string(),
            doc_id: "TD-0001".to_string(),
            qualification: "PhD".to_string(),
            classes: None,
        }
        .into_record()
    }

    #[test]
    fn every_slot_maps_to_its_own_field() {
        let mut record = example_teacher();
        record.teacher_avatar = "uploads/a".to_string();
        record.teacher_doc_front = "uploads/b".to_string();
        record.teacher_doc_back = "uploads/c".to_string();
        record.certificate_doc_front = "uploads/d".to_string();
        record.certificate_doc_back = "uploads/e".to_string();

        let paths: Vec<&str> = TeacherDocSlot::ALL
            .iter()
            .map(|slot| slot.stored_path(&record))
            .collect();

        assert_eq!(
            paths,
            vec!["uploads/a", "uploads/b", "uploads/c", "uploads/d", "uploads/e"]
        );
    }

    #[test]
    fn field_names_match_the_wire_format() {
        assert_eq!(
            TeacherDocSlot::ALL.map(TeacherDocSlot::field_name),
            [
                "teacher_avatar",
                "teacher_doc_front",
                "teacher_doc_back",
                "certificate_doc_front",
                "certificate_doc_back"
            ]
        );
    }
}
