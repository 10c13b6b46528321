use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// JSON envelope shared by every successful response:
/// `{status, message, data?, id?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T = ()> {
    pub status: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ApiResponse<()> {
    pub fn message(message: impl ToString) -> ApiResponse<()> {
        ApiResponse {
            status: true,
            message: message.to_string(),
            data: None,
            id: None,
        }
    }

    pub fn created(message: impl ToString, id: ObjectId) -> ApiResponse<()> {
        ApiResponse {
            status: true,
            message: message.to_string(),
            data: None,
            id: Some(id.to_hex()),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn with_data(message: impl ToString, data: T) -> ApiResponse<T> {
        ApiResponse {
            status: true,
            message: message.to_string(),
            data: Some(data),
            id: None,
        }
    }
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod envelope {
    use super::ApiResponse;
    use bson::oid::ObjectId;
    use serde_json::{json, Value};

    #[test]
    fn message_only_omits_data_and_id() {
        let body = serde_json::to_value(ApiResponse::message("done")).unwrap();
        assert_eq!(body, json!({ "status": true, "message": "done" }));
    }

    #[test]
    fn created_carries_a_hex_id() {
        let id = ObjectId::new();
        let body = serde_json::to_value(ApiResponse::created("created", id)).unwrap();
        assert_eq!(body["id"], Value::String(id.to_hex()));
        assert_eq!(body["status"], Value::Bool(true));
        assert!(body.get("data").is_none());
    }

    #[test]
    fn data_payload_is_embedded() {
        let body = serde_json::to_value(ApiResponse::with_data("finds success", vec![1, 2, 3]))
            .unwrap();
        assert_eq!(body["data"], json!([1, 2, 3]));
        assert!(body.get("id").is_none());
    }
}
