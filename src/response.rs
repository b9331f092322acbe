//! Standard response envelope and page shape.

use crate::query::total_pages;
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Code carried by every successful envelope.
pub const SUCCESS_CODE: i32 = 0;

/// Uniform `{code, message, data}` wrapper returned by every operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: i32,
    pub message: String,
    pub data: Value,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Envelope {
            code: SUCCESS_CODE,
            message: "success".to_string(),
            data,
        }
    }

    pub fn failure(code: i32, message: String) -> Self {
        Envelope {
            code,
            message,
            data: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// One page of a list operation. `totalPages` is derived on serialization.
#[derive(Clone, Debug, PartialEq)]
pub struct PageResult<T> {
    pub page_num: i64,
    pub page_size: i64,
    pub total: i64,
    pub data: Vec<T>,
}

impl<T> PageResult<T> {
    pub fn total_pages(&self) -> i64 {
        total_pages(self.total, self.page_size)
    }
}

impl<T: Serialize> Serialize for PageResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire<'a, T> {
            page_num: i64,
            page_size: i64,
            total: i64,
            total_pages: i64,
            data: &'a [T],
        }
        Wire {
            page_num: self.page_num,
            page_size: self.page_size,
            total: self.total,
            total_pages: self.total_pages(),
            data: &self.data,
        }
        .serialize(serializer)
    }
}

/// Wire form of a finished operation.
pub fn reply(status: StatusCode, envelope: Envelope) -> (StatusCode, Json<Envelope>) {
    (status, Json(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_result_serializes_computed_total_pages() {
        let page = PageResult {
            page_num: 2,
            page_size: 10,
            total: 11,
            data: vec![json!({"id": 11})],
        };
        let v = serde_json::to_value(&page).unwrap();
        assert_eq!(
            v,
            json!({"pageNum": 2, "pageSize": 10, "total": 11, "totalPages": 2, "data": [{"id": 11}]})
        );
    }

    #[test]
    fn test_failure_envelope() {
        let env = Envelope::failure(404, "not found: 7".into());
        assert!(!env.is_success());
        assert_eq!(env.data, Value::Null);
    }
}
