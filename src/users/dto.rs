use serde_json::Value;

/// Username/password pair pulled out of a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Parses a create/login body: both fields present, strings, and non-empty
/// after trimming. Values are kept untrimmed.
pub fn user_body(body: &Value) -> Option<Credentials> {
    let creds = string_fields(body)?;
    if creds.username.trim().is_empty() || creds.password.trim().is_empty() {
        return None;
    }
    Some(creds)
}

/// Parses a reset body. Only presence and string type are checked unless
/// `require_non_empty` is set.
pub fn reset_body(body: &Value, require_non_empty: bool) -> Option<Credentials> {
    if require_non_empty {
        user_body(body)
    } else {
        string_fields(body)
    }
}

fn string_fields(body: &Value) -> Option<Credentials> {
    let username = body.get("username")?.as_str()?;
    let password = body.get("password")?.as_str()?;
    Some(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}
