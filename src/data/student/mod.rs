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

pub const STUDENT_COLLECTION_NAME: &str = "students";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub fname: String,
    pub lname: String,
    pub mobile: String,
    pub email: String,
    pub father_name: String,
    pub parent_doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollno: Option<String>,
    /// Reference to the Class the student belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<ObjectId>,

    // Document slots; empty string means not uploaded.
    #[serde(default)]
    pub student_avatar: String,
    #[serde(default)]
    pub parent_avatar: String,
    #[serde(default)]
    pub student_doc_front: String,
    #[serde(default)]
    pub student_doc_back: String,
    #[serde(default)]
    pub parent_doc_front: String,
    #[serde(default)]
    pub parent_doc_back: String,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// The closed set of uploadable document fields on a Student record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromFormField, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StudentDocSlot {
    #[field(value = "student_avatar")]
    StudentAvatar,
    #[field(value = "parent_avatar")]
    ParentAvatar,
    #[field(value = "student_doc_front")]
    StudentDocFront,
    #[field(value = "student_doc_back")]
    StudentDocBack,
    #[field(value = "parent_doc_front")]
    ParentDocFront,
    #[field(value = "parent_doc_back")]
    ParentDocBack,
}

impl StudentDocSlot {
    pub const ALL: [StudentDocSlot; 6] = [
        StudentDocSlot::StudentAvatar,
        StudentDocSlot::ParentAvatar,
        StudentDocSlot::StudentDocFront,
        StudentDocSlot::StudentDocBack,
        StudentDocSlot::ParentDocFront,
        StudentDocSlot::ParentDocBack,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            StudentDocSlot::StudentAvatar => "student_avatar",
            StudentDocSlot::ParentAvatar => "parent_avatar",
            StudentDocSlot::StudentDocFront => "student_doc_front",
            StudentDocSlot::StudentDocBack => "student_doc_back",
            StudentDocSlot::ParentDocFront => "parent_doc_front",
            StudentDocSlot::ParentDocBack => "parent_doc_back",
        }
    }

    /// Currently stored path for this slot, empty if nothing was uploaded.
    pub fn stored_path(self, record: &Student) -> &str {
        match self {
            StudentDocSlot::StudentAvatar => &record.student_avatar,
            StudentDocSlot::ParentAvatar => &record.parent_avatar,
            StudentDocSlot::StudentDocFront => &record.student_doc_front,
            StudentDocSlot::StudentDocBack => &record.student_doc_back,
            StudentDocSlot::ParentDocFront => &record.parent_doc_front,
            StudentDocSlot::ParentDocBack => &record.parent_doc_back,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StudentCreateData {
    pub fname: String,
    pub lname: String,
    pub mobile: String,
    pub email: String,
    pub father_name: String,
    pub parent_doc_id: String,
    #[serde(default)]
    pub rollno: Option<String>,
    /// Hex id of the Class the student is enrolled in.
    #[serde(default)]
    pub classes: Option<String>,
}

impl StudentCreateData {
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

        if self.parent_doc_id.len() < 5 {
            return Err(problem::bad_field(
                "parent_doc_id",
                "Parent document id must be at least 5 characters long.",
            ));
        }

        if let Some(classes) = &self.classes {
            ObjectId::parse_str(classes)
                .map_err(|_| problem::bad_field("classes", "Not a valid class id."))?;
        }

        Ok(())
    }

    pub fn into_record(self) -> Student {
        let now = Utc::now();
        let classes = self
            .classes
            .as_deref()
            .and_then(|it| ObjectId::parse_str(it).ok());

        Student {
            id: None,
            fname: self.fname,
            lname: self.lname,
            mobile: self.mobile,
            email: self.email,
            father_name: self.father_name,
            parent_doc_id: self.parent_doc_id,
            rollno: self.rollno,
            classes,
            student_avatar: String::new(),
            parent_avatar: String::new(),
            student_doc_front: String::new(),
            student_doc_back: String::new(),
            parent_doc_front: String::new(),
            parent_doc_back: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StudentUpdateData {
    pub mobile: String,
}

impl StudentUpdateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if !is_valid_mobile(&self.mobile) {
            return Err(problem::bad_mobile(&self.mobile));
        }
        Ok(())
    }
}

/// How a `/student/<id>` path argument resolves: 24 characters are treated as
/// a record id, 10 characters as a mobile number. Anything else is a client
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentLookup {
    Id(ObjectId),
    Mobile(String),
}

impl StudentLookup {
    pub fn parse(raw: &str) -> Result<StudentLookup, Problem> {
        let raw = raw.trim();
        match raw.len() {
            24 => ObjectId::parse_str(raw)
                .map(StudentLookup::Id)
                .map_err(|_| problem::bad_lookup(raw)),
            10 => Ok(StudentLookup::Mobile(raw.to_string())),
            _ => Err(problem::bad_lookup(raw)),
        }
    }

    pub fn filter(&self) -> Document {
        match self {
            StudentLookup::Id(id) => doc! { "_id": id },
            StudentLookup::Mobile(mobile) => doc! { "mobile": mobile },
        }
    }
}

/// Filter for the parent lookup: a parent document id of at least 5
/// characters wins over a 10 digit mobile number.
pub fn parent_filter(
    parent_doc_id: Option<&str>,
    mobile: Option<&str>,
) -> Result<Document, Problem> {
    if let Some(doc_id) = parent_doc_id.filter(|it| it.len() >= 5) {
        return Ok(doc! { "parent_doc_id": doc_id });
    }
    if let Some(mobile) = mobile.filter(|it| it.len() == 10) {
        return Ok(doc! { "mobile": mobile });
    }
    Err(problem::bad_field(
        "parent_doc_id",
        "Expected a parent_doc_id of at least 5 characters or a 10 digit mobile.",
    ))
}

/// Builds the `/search-students` filter. An exact rollno match and the
/// keyword `$or` block are ANDed when both are present; with neither the
/// filter is empty and the (capped) listing returns the first rows.
pub fn search_filter(rollno: Option<&str>, keyword: Option<&str>) -> Document {
    let mut query = Document::new();

    if let Some(rollno) = rollno {
        query.insert("rollno", rollno);
    }

    if let Some(keyword) = keyword {
        query.insert(
            "$or",
            vec![
                doc! { "fname": { "$regex": keyword, "$options": "i" } },
                doc! { "lname": { "$regex": keyword, "$options": "i" } },
                doc! { "mobile": { "$regex": keyword } },
                doc! { "email": { "$regex": keyword, "$options": "i" } },
                doc! { "father_name": { "$regex": keyword, "$options": "i" } },
            ],
        );
    }

    query
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod lookup_dispatch {
    use super::StudentLookup;
    use bson::oid::ObjectId;

    #[test]
    fn twenty_four_characters_resolve_by_id() {
        let id = ObjectId::new();
        let parsed = StudentLookup::parse(&id.to_hex()).expect("valid hex id");
        assert_eq!(parsed, StudentLookup::Id(id));
    }

    #[test]
    fn ten_characters_resolve_by_mobile() {
        let parsed = StudentLookup::parse("0123456789").expect("valid mobile");
        assert_eq!(parsed, StudentLookup::Mobile("0123456789".to_string()));
    }

    #[test]
    fn boundary_lengths_are_client_errors() {
        for raw in [
            "aaaaaaaaaaaaaaaaaaaaaaa",   // 23
            "aaaaaaaaaaaaaaaaaaaaaaaaa", // 25
            "012345678",                 // 9
            "01234567891",               // 11
        ] {
            assert!(StudentLookup::parse(raw).is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn twenty_four_non_hex_characters_are_rejected() {
        assert!(StudentLookup::parse("zzzzzzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let id = ObjectId::new();
        let padded = format!(" {} ", id.to_hex());
        assert_eq!(
            StudentLookup::parse(&padded).expect("valid after trim"),
            StudentLookup::Id(id)
        );
    }
}

#[cfg(test)]
mod filters {
    use super::{parent_filter, search_filter};
    use bson::doc;

    #[test]
    fn search_combines_rollno_and_keyword() {
        let query = search_filter(Some("17"), Some("smith"));
        assert_eq!(query.get_str("rollno").unwrap(), "17");
        assert_eq!(query.get_array("$or").unwrap().len(), 5);
    }

    #[test]
    fn search_without_arguments_is_unfiltered() {
        assert!(search_filter(None, None).is_empty());
    }

    #[test]
    fn keyword_matches_are_case_insensitive_except_mobile() {
        let query = search_filter(None, Some("ada"));
        let or = query.get_array("$or").unwrap();

        let fname = or[0].as_document().unwrap().get_document("fname").unwrap();
        assert_eq!(fname.get_str("$options").unwrap(), "i");

        let mobile = or[2].as_document().unwrap().get_document("mobile").unwrap();
        assert!(!mobile.contains_key("$options"));
    }

    #[test]
    fn parent_doc_id_wins_over_mobile() {
        let query = parent_filter(Some("PD-001"), Some("0123456789")).unwrap();
        assert_eq!(query, doc! { "parent_doc_id": "PD-001" });
    }

    #[test]
    fn short_parent_doc_id_falls_back_to_mobile() {
        let query = parent_filter(Some("PD"), Some("0123456789")).unwrap();
        assert_eq!(query, doc! { "mobile": "0123456789" });
    }

    #[test]
    fn neither_argument_is_a_client_error() {
        assert!(parent_filter(None, None).is_err());
        assert!(parent_filter(Some("PD"), Some("012")).is_err());
    }
}

#[cfg(test)]
mod doc_slots {
    use super::{Student, StudentCreateData, StudentDocSlot};

    fn example_student() -> Student {
        StudentCreateData {
            fname: "Ada".to_string(),
            lname: "Lovelace".to_string(),
            mobile: "0123456789".to_string(),
            email: "ada@example.com".to_string(),
            father_name: "George".to_string(),
            parent_doc_id: "PD-0001".to_string(),
            rollno: None,
            classes: None,
        }
        .into_record()
    }

    #[test]
    fn every_slot_maps_to_its_own_field() {
        let mut record = example_student();
        record.student_avatar = "uploads/a".to_string();
        record.parent_avatar = "uploads/b".to_string();
        record.student_doc_front = "uploads/c".to_string();
        record.student_doc_back = "uploads/d".to_string();
        record.parent_doc_front = "uploads/e".to_string();
        record.parent_doc_back = "uploads/f".to_string();

        let paths: Vec<&str> = StudentDocSlot::ALL
            .iter()
            .map(|slot| slot.stored_path(&record))
            .collect();

        assert_eq!(
            paths,
            vec![
                "uploads/a",
                "uploads/b",
                "uploads/c",
                "uploads/d",
                "uploads/e",
                "uploads/f"
            ]
        );
    }

    #[test]
    fn field_names_match_the_wire_format() {
        assert_eq!(
            StudentDocSlot::ALL.map(StudentDocSlot::field_name),
            [
                "student_avatar",
                "parent_avatar",
                "student_doc_front",
                "student_doc_back",
                "parent_doc_front",
                "parent_doc_back"
            ]
        );
    }

    #[test]
    fn new_records_have_empty_slots() {
        let record = example_student();
        for slot in StudentDocSlot::ALL {
            assert!(slot.stored_path(&record).is_empty());
        }
    }
}

#[cfg(test)]
mod create_validation {
    use super::StudentCreateData;

    fn valid() -> StudentCreateData {
        StudentCreateData {
            fname: "Ada".to_string(),
            lname: "Lovelace".to_string(),
            mobile: "0123456789".to_string(),
            email: "ada@example.com".to_string(),
            father_name: "George".to_string(),
            parent_doc_id: "PD-0001".to_string(),
            rollno: Some("17".to_string()),
            classes: None,
        }
    }

    #[test]
    fn accepts_well_formed_data() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_bad_mobile() {
        let mut data = valid();
        data.mobile = "12345".to_string();
        assert!(data.validate().is_err());
    }

    #[test]
    fn rejects_mail_without_at() {
        let mut data = valid();
        data.email = "ada.example.com".to_string();
        assert!(data.validate().is_err());
    }

    #[test]
    fn rejects_short_parent_doc_id() {
        let mut data = valid();
        data.parent_doc_id = "PD".to_string();
        assert!(data.validate().is_err());
    }

    #[test]
    fn rejects_malformed_class_reference() {
        let mut data = valid();
        data.classes = Some("not-an-id".to_string());
        assert!(data.validate().is_err());
    }
}
