use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 金额上限（分）：票价、固定折扣、最低消费
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

/// 统一响应包装
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
        }
    }

    /// 业务拒绝（如票号已被占用）：附带说明数据
    pub fn rejected(code: &str, message: impl Into<String>, data: T) -> Self {
        Self {
            success: false,
            data: Some(data),
            message: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope() {
        let v = serde_json::to_value(ApiResponse::success(json!({"id": 1}))).unwrap();
        assert_eq!(v, json!({"success": true, "data": {"id": 1}}));
    }

    #[test]
    fn test_rejected_envelope_keeps_data() {
        let v = serde_json::to_value(ApiResponse::rejected(
            "CONFLICT",
            "Tickets no longer available",
            json!({"unavailable_indices": [7]}),
        ))
        .unwrap();
        assert_eq!(v["success"], json!(false));
        assert_eq!(v["error"]["code"], json!("CONFLICT"));
        assert_eq!(v["data"]["unavailable_indices"], json!([7]));
    }
}
