use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response wire format:
/// `{ id, success, result?, error?: { code: String, message } }`
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

// Standard JSON-RPC error codes plus gateway-specific rejections.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const BUSY: i32 = -32001;
pub const SESSION_NOT_FOUND: i32 = -32002;

pub fn error_code_to_string(code: i32) -> &'static str {
    match code {
        PARSE_ERROR => "PARSE_ERROR",
        INVALID_REQUEST => "INVALID_REQUEST",
        METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
        INVALID_PARAMS => "INVALID_PARAMS",
        INTERNAL_ERROR => "INTERNAL_ERROR",
        BUSY => "BUSY",
        SESSION_NOT_FOUND => "SESSION_NOT_FOUND",
        _ => "UNKNOWN_ERROR",
    }
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: error_code_to_string(code).to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    pub fn internal_error(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, msg)
    }

    pub fn busy(id: Option<serde_json::Value>, session_id: &str) -> Self {
        Self::error(
            id,
            BUSY,
            format!("session {session_id} already has a generation in flight"),
        )
    }

    pub fn session_not_found(id: Option<serde_json::Value>, session_id: &str) -> Self {
        Self::error(id, SESSION_NOT_FOUND, format!("unknown session {session_id}"))
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error")
    }
}

/// Extract a required string param from the RPC params object.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rpc_request() {
        let json = r#"{"method":"chat","params":{"messages":[],"stream":true},"id":1}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "chat");
        assert!(req.params.is_some());
        assert_eq!(req.id, Some(serde_json::json!(1)));
    }

    #[test]
    fn success_response_shape() {
        let resp = RpcResponse::success(Some(serde_json::json!(1)), serde_json::json!({"ok": true}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert!(json["result"].is_object());
        assert!(json.get("error").is_none() || json["error"].is_null());
    }

    #[test]
    fn busy_response_shape() {
        let resp = RpcResponse::busy(Some(serde_json::json!(7)), "sess_abc");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "BUSY");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("sess_abc"));
    }

    #[test]
    fn session_not_found_response_shape() {
        let resp = RpcResponse::session_not_found(None, "sess_missing");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], "SESSION_NOT_FOUND");
    }

    #[test]
    fn error_code_maps_to_string() {
        assert_eq!(error_code_to_string(PARSE_ERROR), "PARSE_ERROR");
        assert_eq!(error_code_to_string(METHOD_NOT_FOUND), "METHOD_NOT_FOUND");
        assert_eq!(error_code_to_string(BUSY), "BUSY");
        assert_eq!(error_code_to_string(SESSION_NOT_FOUND), "SESSION_NOT_FOUND");
        assert_eq!(error_code_to_string(-99999), "UNKNOWN_ERROR");
    }

    #[test]
    fn require_str_extracts() {
        let params = serde_json::json!({"session_id": "sess_1", "count": 5});
        assert_eq!(require_str(&params, "session_id").unwrap(), "sess_1");
        assert!(require_str(&params, "missing").is_err());
        assert!(require_str(&params, "count").is_err());
    }

    #[test]
    fn parse_error_has_no_id() {
        let resp = RpcResponse::parse_error();
        assert!(resp.id.is_none());
        assert_eq!(resp.error.as_ref().unwrap().code, "PARSE_ERROR");
        assert!(!resp.success);
    }
}
